//! Formatted terminal output for analysis runs.
//!
//! Formatting stays in one place so the pipeline code remains clean and
//! output changes are localized.

use crate::app::pipeline::{RunOutput, YearOutcome};
use crate::domain::RunConfig;
use crate::report::shape_flat;

/// Format the full run summary: per-year diagnostics plus merged totals.
pub fn format_run_summary(output: &RunOutput, config: &RunConfig) -> String {
    let mut out = String::new();

    out.push_str("=== censo - School Census Analysis ===\n");
    out.push_str(&format!("Metric : {}", config.metric_field));
    if let Some(description) = output
        .outcomes
        .iter()
        .filter_map(YearOutcome::report)
        .find_map(|r| r.metric_description.as_deref())
    {
        out.push_str(&format!(" ({description})"));
    }
    out.push('\n');
    out.push_str(&format!(
        "Years  : {}\n",
        config
            .years
            .iter()
            .map(|y| y.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    ));

    out.push_str("\nPer-year results:\n");
    for outcome in &output.outcomes {
        match outcome {
            YearOutcome::Completed(report) => {
                out.push_str(&format!(
                    "  {}  rows={} kept={} dup_groups={} row_errors={} | {}\n",
                    report.year,
                    report.rows_read,
                    report.rows_kept,
                    report.duplicates.groups.len(),
                    report.row_errors.len(),
                    report.source,
                ));
            }
            YearOutcome::Failed { year, error } => {
                out.push_str(&format!("  {year}  FAILED: {error}\n"));
            }
        }
    }

    out.push_str(&format!("\nTotals ({}):\n", config.year_field));
    for point in &shape_flat("", &output.merged).series[0].points {
        out.push_str(&format!(
            "  {:<10} {}\n",
            point.dimension_value, point.metric_total
        ));
    }

    if let Some(cluster) = &config.cluster_field {
        match &output.merged_cluster {
            Some(buckets) => out.push_str(&format!(
                "\nPivot: {} x {} ({} buckets)\n",
                cluster,
                config.year_field,
                buckets.len()
            )),
            None => out.push_str(&format!("\nPivot: {cluster} not resolvable this run\n")),
        }
    }

    out
}
