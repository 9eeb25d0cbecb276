//! Shared multi-year pipeline logic used by the CLI front-end.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! locate dataset -> sniff -> dictionary -> resolve schema -> stream records
//! -> duplicate detection -> aggregate, then the cross-year merge, shaping
//! and exports.
//!
//! Per-year state is fully isolated, so years run on the rayon pool when
//! requested; the merge afterwards is a plain reduce, and a failed year
//! contributes nothing while the others proceed.

use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::dictionary;
use crate::domain::{
    ColumnProjection, DictionaryField, PipelineStage, RunConfig, StageStatus,
};
use crate::error::{PipelineError, Result};
use crate::io::export;
use crate::io::loader::{self, DatasetSource, RowError};
use crate::report::{self, NamedAggregation, ViewModel};
use crate::sanitize::{DuplicateDetector, DuplicateReport};
use crate::schema;
use crate::stats::{self, Aggregator, BucketMap};

/// Everything computed for one dataset-year.
#[derive(Debug)]
pub struct YearReport {
    pub year: u16,
    pub source: String,
    pub dictionary_fields: usize,
    pub metric_description: Option<String>,
    pub projected_columns: usize,
    pub rows_read: usize,
    pub rows_kept: usize,
    pub row_errors: Vec<RowError>,
    pub duplicates: DuplicateReport,
    /// Totals keyed by `[year_field]`.
    pub by_year: BucketMap,
    /// Totals keyed by `[cluster_field, year_field]` when configured and
    /// resolvable.
    pub by_cluster: Option<BucketMap>,
}

/// Outcome of one dataset-year; failures are contained here.
#[derive(Debug)]
pub enum YearOutcome {
    Completed(Box<YearReport>),
    Failed { year: u16, error: PipelineError },
}

impl YearOutcome {
    pub fn year(&self) -> u16 {
        match self {
            YearOutcome::Completed(report) => report.year,
            YearOutcome::Failed { year, .. } => *year,
        }
    }

    pub fn report(&self) -> Option<&YearReport> {
        match self {
            YearOutcome::Completed(report) => Some(report),
            YearOutcome::Failed { .. } => None,
        }
    }
}

/// All computed outputs of a `censo analyze` run.
#[derive(Debug)]
pub struct RunOutput {
    pub outcomes: Vec<YearOutcome>,
    /// Cross-year merge of the per-year totals.
    pub merged: BucketMap,
    pub merged_cluster: Option<BucketMap>,
    pub views: ViewModel,
    pub stages: Vec<PipelineStage>,
}

/// Execute the full multi-year pipeline and write exports.
pub fn run(config: &RunConfig) -> Result<RunOutput> {
    let mut stages = vec![
        PipelineStage::pending("dictionary", "Search Metadata"),
        PipelineStage::pending("sanitize", "Sanitize Data"),
        PipelineStage::pending("aggregate", "Process Records"),
        PipelineStage::pending("export", "Export Results"),
    ];

    let outcomes: Vec<YearOutcome> = if config.parallel {
        config
            .years
            .par_iter()
            .map(|year| run_year_outcome(config, *year))
            .collect()
    } else {
        config
            .years
            .iter()
            .map(|year| run_year_outcome(config, *year))
            .collect()
    };

    let any_completed = outcomes.iter().any(|o| o.report().is_some());
    let processing_status = if any_completed {
        StageStatus::Completed
    } else {
        StageStatus::Error
    };
    for stage in stages.iter_mut().take(3) {
        stage.status = processing_status;
    }

    // Cross-year merge: sum-of-sums over independently-produced buckets.
    let merged = stats::merge(
        outcomes
            .iter()
            .filter_map(|o| o.report())
            .map(|r| r.by_year.clone()),
    );
    let cluster_parts: Vec<BucketMap> = outcomes
        .iter()
        .filter_map(|o| o.report())
        .filter_map(|r| r.by_cluster.clone())
        .collect();
    let merged_cluster = if cluster_parts.is_empty() {
        None
    } else {
        Some(stats::merge(cluster_parts))
    };

    let views = shape_views(config, &outcomes, &merged, merged_cluster.as_ref());

    let export_result = write_final_exports(config, &merged, &views);
    stages[3].status = match &export_result {
        Ok(()) => StageStatus::Completed,
        Err(_) => StageStatus::Error,
    };

    if let Some(out_dir) = &config.output_dir {
        let status_path = out_dir.join("pipeline_graph.json");
        if let Err(e) = export::write_status_json(&status_path, &stages) {
            warn!(error = %e, "failed to write pipeline status export");
        }
    }
    export_result?;

    Ok(RunOutput {
        outcomes,
        merged,
        merged_cluster,
        views,
        stages,
    })
}

fn run_year_outcome(config: &RunConfig, year: u16) -> YearOutcome {
    match run_year(config, year) {
        Ok(report) => YearOutcome::Completed(Box::new(report)),
        Err(error) => {
            warn!(year, error = %error, "dataset-year failed, continuing with the others");
            YearOutcome::Failed { year, error }
        }
    }
}

/// Process one dataset-year end to end.
pub fn run_year(config: &RunConfig, year: u16) -> Result<YearReport> {
    let (source, dictionary_location) = locate_dataset(config, year)?;
    info!(year, source = %source.describe(), "processing dataset-year");

    let (format, headers) = loader::read_headers(&source)?;
    info!(
        year,
        delimiter = %format.delimiter_char(),
        encoding = format.encoding.name(),
        columns = headers.len(),
        "sniffed dataset format"
    );

    let dictionary_fields = load_dictionary(config, year, dictionary_location.as_ref());
    let metric_description =
        schema::find_field_description(&dictionary_fields, &config.metric_field)
            .map(str::to_string);

    let projection = build_projection(config, &dictionary_fields, &headers)?;
    let has_cluster = match &config.cluster_field {
        Some(cluster) if projection.contains(cluster) => true,
        Some(cluster) => {
            warn!(year, field = %cluster, "cluster field not resolvable, skipping pivot for this year");
            false
        }
        None => false,
    };
    let key_fields = select_key_fields(config, &projection);

    let (rows_read, row_errors, rows_kept, duplicates, by_year, by_cluster) =
        loader::with_record_stream(&source, &projection, |stream| {
            let schema = stream.schema().clone();
            let mut detector = (!config.skip_dedup)
                .then(|| DuplicateDetector::new(&schema, &key_fields, config.key_tracking));
            let mut year_agg =
                Aggregator::new(&schema, &[config.year_field.clone()], &config.metric_field);
            let mut cluster_agg = has_cluster.then(|| {
                Aggregator::new(
                    &schema,
                    &[
                        config.cluster_field.clone().unwrap_or_default(),
                        config.year_field.clone(),
                    ],
                    &config.metric_field,
                )
            });

            let mut rows_kept = 0usize;
            for record in stream.by_ref() {
                if let Some(detector) = detector.as_mut() {
                    if !detector.observe(&record) {
                        continue;
                    }
                }
                rows_kept += 1;
                year_agg.fold(&record);
                if let Some(agg) = cluster_agg.as_mut() {
                    agg.fold(&record);
                }
            }

            let duplicates = detector
                .map(DuplicateDetector::into_report)
                .unwrap_or_else(|| DuplicateReport {
                    skipped: Some("disabled".to_string()),
                    ..DuplicateReport::default()
                });

            (
                stream.rows_read(),
                stream.take_row_errors(),
                rows_kept,
                duplicates,
                year_agg.finish(),
                cluster_agg.map(Aggregator::finish),
            )
        })?;

    if !row_errors.is_empty() {
        warn!(year, count = row_errors.len(), "rows failed to parse and were skipped");
    }
    if by_year.coercion_failures > 0 {
        info!(
            year,
            count = by_year.coercion_failures,
            "metric cells failed numeric coercion and contributed 0"
        );
    }

    if let Some(out_dir) = &config.output_dir {
        let path = out_dir.join(format!("duplicates_{year}.json"));
        if let Err(e) = export::write_duplicates_json(&path, year, &duplicates) {
            warn!(year, error = %e, "failed to write duplicates audit export");
        }
        if !dictionary_fields.is_empty() {
            let path = out_dir.join(format!("dictionary_{year}.json"));
            if let Err(e) = export::write_dictionary_json(&path, &dictionary_fields) {
                warn!(year, error = %e, "failed to write dictionary listing export");
            }
        }
    }

    Ok(YearReport {
        year,
        source: source.describe(),
        dictionary_fields: dictionary_fields.len(),
        metric_description,
        projected_columns: projection.len(),
        rows_read,
        rows_kept,
        row_errors,
        duplicates,
        by_year,
        by_cluster,
    })
}

/// Locate the dataset (and an in-archive dictionary, when present) for one
/// year.
fn locate_dataset(
    config: &RunConfig,
    year: u16,
) -> Result<(DatasetSource, Option<(PathBuf, String)>)> {
    let archive = config
        .data_dir
        .join(format!("{}_{year}.zip", config.file_prefix));
    if archive.is_file() {
        let entry = loader::find_csv_entry(&archive, &config.entry_filter)?;
        let dictionary = loader::find_dictionary_entry(&archive, &config.dictionary_filter)?
            .map(|entry| (archive.clone(), entry));
        return Ok((DatasetSource::ZipEntry { archive, entry }, dictionary));
    }

    let flat = config
        .data_dir
        .join(format!("{}_{year}.csv", config.file_prefix));
    if flat.is_file() {
        return Ok((DatasetSource::Csv(flat), None));
    }

    Err(PipelineError::io(
        archive,
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no dataset found for year {year}"),
        ),
    ))
}

/// Load the year's dictionary, degrading to an empty field list when the
/// workbook is absent or unreadable (the projection then carries only the
/// required fields).
fn load_dictionary(
    config: &RunConfig,
    year: u16,
    location: Option<&(PathBuf, String)>,
) -> Vec<DictionaryField> {
    let Some((archive, entry)) = location else {
        info!(year, "no dictionary workbook found for this year");
        return Vec::new();
    };

    let loaded = loader::read_entry_bytes(archive, entry).and_then(|bytes| {
        dictionary::load_from_bytes(
            bytes,
            &format!("{}!{entry}", archive.display()),
            config.dictionary_offset,
        )
    });
    match loaded {
        Ok(fields) => {
            info!(year, fields = fields.len(), "loaded dictionary");
            fields
        }
        Err(e) => {
            warn!(year, error = %e, "dictionary unreadable, proceeding without it");
            Vec::new()
        }
    }
}

/// Projection for the year: the first `project_limit` dictionary fields that
/// resolve, plus the fields the run itself needs.
fn build_projection(
    config: &RunConfig,
    dictionary_fields: &[DictionaryField],
    headers: &[String],
) -> Result<ColumnProjection> {
    let limit = config.project_limit.min(dictionary_fields.len());
    let mut projection = schema::resolve(&dictionary_fields[..limit], headers);

    let mut extra: Vec<&str> = vec![&config.year_field, &config.metric_field];
    if let Some(cluster) = &config.cluster_field {
        extra.push(cluster);
    }
    for key in &config.dedup_keys {
        extra.push(key);
    }
    schema::ensure_fields(&mut projection, headers, &extra);

    schema::require(
        &projection,
        &[&config.year_field, &config.metric_field],
        headers,
    )?;
    Ok(projection)
}

/// Key fields for duplicate detection: the configured natural key when it
/// resolved, otherwise a prefix of the projected fields.
fn select_key_fields(config: &RunConfig, projection: &ColumnProjection) -> Vec<String> {
    let configured: Vec<String> = config
        .dedup_keys
        .iter()
        .filter(|k| projection.contains(k))
        .cloned()
        .collect();
    if !configured.is_empty() {
        return configured;
    }
    projection
        .iter()
        .take(3)
        .map(|(logical, _)| logical.to_string())
        .collect()
}

fn shape_views(
    config: &RunConfig,
    outcomes: &[YearOutcome],
    merged: &BucketMap,
    merged_cluster: Option<&BucketMap>,
) -> ViewModel {
    let metric_label = outcomes
        .iter()
        .filter_map(|o| o.report())
        .find_map(|r| r.metric_description.clone())
        .unwrap_or_else(|| config.metric_field.clone());

    let mut aggregations = vec![NamedAggregation {
        name: "by_year".to_string(),
        display_label: format!("{metric_label} by {}", config.year_field),
        clustered: false,
        buckets: merged.clone(),
    }];

    if let (Some(cluster), Some(buckets)) = (&config.cluster_field, merged_cluster) {
        aggregations.push(NamedAggregation {
            name: format!("by_{}", cluster.to_lowercase()),
            display_label: format!("{metric_label} by {cluster} and {}", config.year_field),
            clustered: true,
            buckets: buckets.clone(),
        });
    }

    report::shape(&aggregations)
}

fn write_final_exports(config: &RunConfig, merged: &BucketMap, views: &ViewModel) -> Result<()> {
    let Some(out_dir) = &config.output_dir else {
        return Ok(());
    };
    export::write_summary_json(&out_dir.join("summary_stats.json"), merged)?;
    export::write_views_json(&out_dir.join("views.json"), views)?;
    Ok(())
}
