//! Export shaping: aggregation results into serializable view models.
//!
//! The view model is the contract handed to the rendering collaborator; it
//! is independent of whatever charting technology ultimately displays it.
//!
//! - flat views sort numeric-ascending when the dimension is year-like,
//!   otherwise by descending metric for a Pareto-style presentation
//! - clustered views pivot a second dimension into sub-series that all span
//!   the same primary domain, with missing combinations zero-filled

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::stats::BucketMap;

pub mod format;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub dimension_value: String,
    pub metric_total: i64,
}

/// One series of a view; `cluster_value` is set only in clustered views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub cluster_value: Option<String>,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub display_label: String,
    pub is_clustered: bool,
    pub series: Vec<Series>,
}

/// View name -> view; ordered so serialization is stable.
pub type ViewModel = BTreeMap<String, View>;

/// An aggregation result ready for shaping.
#[derive(Debug, Clone)]
pub struct NamedAggregation {
    pub name: String,
    pub display_label: String,
    /// Two-dimensional keys (`[primary, cluster]`) when set.
    pub clustered: bool,
    pub buckets: BucketMap,
}

/// Shape one or more named aggregations into the view model.
pub fn shape(aggregations: &[NamedAggregation]) -> ViewModel {
    aggregations
        .iter()
        .map(|agg| {
            let view = if agg.clustered {
                shape_clustered(&agg.display_label, &agg.buckets)
            } else {
                shape_flat(&agg.display_label, &agg.buckets)
            };
            (agg.name.clone(), view)
        })
        .collect()
}

/// Flat series over one-dimensional buckets.
pub fn shape_flat(display_label: &str, buckets: &BucketMap) -> View {
    let mut points: Vec<SeriesPoint> = buckets
        .totals()
        .iter()
        .map(|(key, total)| SeriesPoint {
            dimension_value: key.first().cloned().unwrap_or_default(),
            metric_total: *total,
        })
        .collect();

    if is_year_like(points.iter().map(|p| p.dimension_value.as_str())) {
        points.sort_by_key(|p| p.dimension_value.trim().parse::<i64>().unwrap_or(i64::MAX));
    } else {
        points.sort_by(|a, b| {
            b.metric_total
                .cmp(&a.metric_total)
                .then_with(|| a.dimension_value.cmp(&b.dimension_value))
        });
    }

    View {
        display_label: display_label.to_string(),
        is_clustered: false,
        series: vec![Series {
            cluster_value: None,
            points,
        }],
    }
}

/// Pivoted series over `[primary, cluster]` buckets.
///
/// Every cluster series spans the full primary domain; combinations missing
/// from the data are filled with 0, never omitted, so multi-series charts
/// compare like with like.
pub fn shape_clustered(display_label: &str, buckets: &BucketMap) -> View {
    let mut primary_domain: Vec<String> = Vec::new();
    let mut cluster_values: Vec<String> = Vec::new();
    for key in buckets.totals().keys() {
        let primary = key.first().cloned().unwrap_or_default();
        let cluster = key.get(1).cloned().unwrap_or_default();
        if !primary_domain.contains(&primary) {
            primary_domain.push(primary);
        }
        if !cluster_values.contains(&cluster) {
            cluster_values.push(cluster);
        }
    }
    sort_dimension(&mut primary_domain);
    sort_dimension(&mut cluster_values);

    let series = cluster_values
        .into_iter()
        .map(|cluster| {
            let points = primary_domain
                .iter()
                .map(|primary| SeriesPoint {
                    dimension_value: primary.clone(),
                    metric_total: buckets
                        .get(&[primary.clone(), cluster.clone()])
                        .unwrap_or(0),
                })
                .collect();
            Series {
                cluster_value: Some(cluster),
                points,
            }
        })
        .collect();

    View {
        display_label: display_label.to_string(),
        is_clustered: true,
        series,
    }
}

/// A dimension is year-like when every value parses as an integer.
fn is_year_like<'a>(mut values: impl Iterator<Item = &'a str>) -> bool {
    let mut any = false;
    let all_numeric = values.all(|v| {
        any = true;
        v.trim().parse::<i64>().is_ok()
    });
    any && all_numeric
}

fn sort_dimension(values: &mut [String]) {
    if is_year_like(values.iter().map(String::as_str)) {
        values.sort_by_key(|v| v.trim().parse::<i64>().unwrap_or(i64::MAX));
    } else {
        values.sort();
    }
}
