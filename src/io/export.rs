//! JSON exports consumed by the dashboard collaborator.
//!
//! Shapes are intentionally plain: arrays and string-keyed maps, no charting
//! concepts. Every writer creates parent directories so a fresh output
//! directory works on first run.

use std::fs::{self, File};
use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use crate::domain::{DictionaryField, PipelineStage};
use crate::error::{PipelineError, Result};
use crate::report::{ViewModel, shape_flat};
use crate::sanitize::DuplicateReport;
use crate::stats::BucketMap;

/// One row of the summary export.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRecord {
    pub dimension_value: String,
    pub metric_total: i64,
}

/// Write the merged totals as a sorted array of summary records.
pub fn write_summary_json(path: &Path, buckets: &BucketMap) -> Result<()> {
    let records: Vec<SummaryRecord> = shape_flat("", buckets)
        .series
        .into_iter()
        .flat_map(|s| s.points)
        .map(|p| SummaryRecord {
            dimension_value: p.dimension_value,
            metric_total: p.metric_total,
        })
        .collect();
    write_json(path, &records)
}

/// Write the multi-view model keyed by view name.
pub fn write_views_json(path: &Path, views: &ViewModel) -> Result<()> {
    write_json(path, views)
}

/// Duplicates audit artifact for one dataset-year.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicatesExport<'a> {
    pub generated_at: String,
    pub year: u16,
    #[serde(flatten)]
    pub report: &'a DuplicateReport,
}

pub fn write_duplicates_json(path: &Path, year: u16, report: &DuplicateReport) -> Result<()> {
    write_json(
        path,
        &DuplicatesExport {
            generated_at: Utc::now().to_rfc3339(),
            year,
            report,
        },
    )
}

/// Dictionary listing for one dataset-year.
pub fn write_dictionary_json(path: &Path, fields: &[DictionaryField]) -> Result<()> {
    write_json(path, &fields)
}

/// Pipeline stage status, a diagnostic artifact rather than a control input.
pub fn write_status_json(path: &Path, stages: &[PipelineStage]) -> Result<()> {
    write_json(path, &stages)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
    }
    let file = File::create(path)
        .map_err(|e| PipelineError::export(path, format!("failed to create file: {e}")))?;
    serde_json::to_writer_pretty(file, value)
        .map_err(|e| PipelineError::export(path, format!("failed to write JSON: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StageStatus;

    fn read_value(path: &Path) -> serde_json::Value {
        serde_json::from_reader(File::open(path).unwrap()).unwrap()
    }

    #[test]
    fn summary_export_is_a_sorted_array_of_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/summary_stats.json");

        let mut buckets = BucketMap::default();
        buckets.add(vec!["2022".to_string()], 0);
        buckets.add(vec!["2021".to_string()], 8);
        write_summary_json(&path, &buckets).unwrap();

        let value = read_value(&path);
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["dimension_value"], "2021");
        assert_eq!(rows[0]["metric_total"], 8);
        assert_eq!(rows[1]["dimension_value"], "2022");
        assert_eq!(rows[1]["metric_total"], 0);
    }

    #[test]
    fn status_export_carries_every_stage_with_a_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline_graph.json");

        let mut stages = vec![
            PipelineStage::pending("dictionary", "Search Metadata"),
            PipelineStage::pending("aggregate", "Process Records"),
        ];
        stages[0].status = StageStatus::Completed;
        stages[1].status = StageStatus::Error;
        write_status_json(&path, &stages).unwrap();

        let value = read_value(&path);
        assert_eq!(value[0]["id"], "dictionary");
        assert_eq!(value[0]["status"], "completed");
        assert_eq!(value[1]["status"], "error");
    }

    #[test]
    fn duplicates_export_flattens_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("duplicates_2021.json");

        let report = DuplicateReport {
            key_fields: vec!["CO_ENTIDADE".to_string()],
            ..DuplicateReport::default()
        };
        write_duplicates_json(&path, 2021, &report).unwrap();

        let value = read_value(&path);
        assert_eq!(value["year"], 2021);
        assert_eq!(value["key_fields"][0], "CO_ENTIDADE");
        assert!(value["generated_at"].as_str().is_some());
    }

    #[test]
    fn export_into_unwritable_path_is_an_export_error() {
        let report = ViewModel::new();
        let err = write_views_json(Path::new("/proc/definitely/not/writable.json"), &report)
            .unwrap_err();
        assert!(err.exit_code() >= 2);
    }
}
