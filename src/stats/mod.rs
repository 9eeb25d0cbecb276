//! Grouped numeric rollups over record streams.
//!
//! The fold is an explicit accumulator threaded through the pass and
//! returned, never shared mutable state, so per-year aggregation can run on
//! worker threads and merge afterwards. Merging re-groups the union of all
//! buckets by dimension tuple and re-sums; the operation is associative and
//! commutative, so dataset order never changes totals.
//!
//! Dimension values are taken verbatim: a trailing-space variant of a value
//! is a distinct bucket. This mirrors the dictionary-driven (not semantic)
//! matching used elsewhere and is a known fidelity limitation.

use std::collections::HashMap;

use crate::domain::{Record, RecordSchema};

/// A dimension tuple, in the order the dimensions were requested.
pub type DimensionKey = Vec<String>;

/// Folded totals for one record stream (or a merge of several).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketMap {
    totals: HashMap<DimensionKey, i64>,
    /// Rows folded into some bucket.
    pub rows_folded: usize,
    /// Rows skipped because every dimension value was missing.
    pub rows_missing_dimension: usize,
    /// Metric cells that failed numeric coercion (contributed 0).
    pub coercion_failures: usize,
}

impl BucketMap {
    pub fn add(&mut self, key: DimensionKey, value: i64) {
        *self.totals.entry(key).or_insert(0) += value;
    }

    pub fn totals(&self) -> &HashMap<DimensionKey, i64> {
        &self.totals
    }

    pub fn get(&self, key: &[String]) -> Option<i64> {
        self.totals.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// Fold another bucket map into this one (sum-of-sums).
    pub fn absorb(&mut self, other: BucketMap) {
        for (key, value) in other.totals {
            self.add(key, value);
        }
        self.rows_folded += other.rows_folded;
        self.rows_missing_dimension += other.rows_missing_dimension;
        self.coercion_failures += other.coercion_failures;
    }
}

/// Streaming aggregator: group by dimension tuple, sum the metric.
pub struct Aggregator {
    dimension_slots: Vec<Option<usize>>,
    metric_slot: Option<usize>,
    buckets: BucketMap,
}

impl Aggregator {
    pub fn new(schema: &RecordSchema, dimensions: &[String], metric: &str) -> Self {
        Self {
            dimension_slots: dimensions.iter().map(|d| schema.index_of(d)).collect(),
            metric_slot: schema.index_of(metric),
            buckets: BucketMap::default(),
        }
    }

    /// Fold one record into the accumulator.
    ///
    /// The metric is coerced to a number; on failure the row still lands in
    /// its bucket with value 0 (a malformed cell must not erase the row's
    /// dimensions). Rows whose dimension values are all missing are skipped
    /// and counted.
    pub fn fold(&mut self, record: &Record) {
        let mut any_dimension = false;
        let key: DimensionKey = self
            .dimension_slots
            .iter()
            .map(|slot| {
                let value = slot.and_then(|idx| record.value_at(idx)).unwrap_or("");
                if !value.is_empty() {
                    any_dimension = true;
                }
                value.to_string()
            })
            .collect();

        if !any_dimension {
            self.buckets.rows_missing_dimension += 1;
            return;
        }

        let raw = self.metric_slot.and_then(|idx| record.value_at(idx));
        let (value, failed) = coerce_metric(raw);
        if failed {
            self.buckets.coercion_failures += 1;
        }
        self.buckets.rows_folded += 1;
        self.buckets.add(key, value);
    }

    pub fn finish(self) -> BucketMap {
        self.buckets
    }
}

/// Buffered convenience over [`Aggregator`] for in-memory record sets.
pub fn aggregate(
    records: &[Record],
    schema: &RecordSchema,
    dimensions: &[String],
    metric: &str,
) -> BucketMap {
    let mut aggregator = Aggregator::new(schema, dimensions, metric);
    for record in records {
        aggregator.fold(record);
    }
    aggregator.finish()
}

/// Merge independently-produced bucket maps (e.g. one per dataset-year).
pub fn merge(parts: impl IntoIterator<Item = BucketMap>) -> BucketMap {
    let mut merged = BucketMap::default();
    for part in parts {
        merged.absorb(part);
    }
    merged
}

/// Coerce a raw metric cell to a number; `(0, true)` on failure.
///
/// Integer counts are the norm, but spreadsheet round-trips occasionally
/// produce `"5.0"`, so a finite float is accepted and truncated.
fn coerce_metric(raw: Option<&str>) -> (i64, bool) {
    let Some(text) = raw else {
        return (0, true);
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return (0, true);
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return (v, false);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => (v.trunc() as i64, false),
        _ => (0, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> RecordSchema {
        RecordSchema::new(vec![
            "NU_ANO_CENSO".to_string(),
            "NO_REGIAO".to_string(),
            "QT_MAT_ESP".to_string(),
        ])
    }

    fn record(year: &str, region: &str, metric: &str) -> Record {
        Record::new(vec![
            Some(year.to_string()),
            Some(region.to_string()),
            Some(metric.to_string()),
        ])
    }

    fn dims(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn key(values: &[&str]) -> DimensionKey {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn sums_by_year_with_unparsable_metric_as_zero() {
        let records = vec![
            record("2021", "Norte", "5"),
            record("2021", "Norte", "3"),
            record("2022", "Sul", "x"),
        ];
        let buckets = aggregate(&records, &schema(), &dims(&["NU_ANO_CENSO"]), "QT_MAT_ESP");

        assert_eq!(buckets.get(&key(&["2021"])), Some(8));
        // The malformed cell contributes 0 but the bucket still exists.
        assert_eq!(buckets.get(&key(&["2022"])), Some(0));
        assert_eq!(buckets.coercion_failures, 1);
        assert_eq!(buckets.rows_folded, 3);
    }

    #[test]
    fn merge_of_partitions_is_order_independent() {
        let records = vec![
            record("2021", "Norte", "5"),
            record("2021", "Sul", "3"),
            record("2022", "Norte", "7"),
            record("2022", "Sul", "2"),
        ];
        let schema = schema();
        let dims = dims(&["NU_ANO_CENSO"]);

        let whole = aggregate(&records, &schema, &dims, "QT_MAT_ESP");
        let first = aggregate(&records[..2], &schema, &dims, "QT_MAT_ESP");
        let second = aggregate(&records[2..], &schema, &dims, "QT_MAT_ESP");

        let ab = merge([first.clone(), second.clone()]);
        let ba = merge([second, first]);

        assert_eq!(ab.totals(), whole.totals());
        assert_eq!(ba.totals(), whole.totals());
    }

    #[test]
    fn two_dimensional_keys_group_verbatim() {
        let records = vec![
            record("2021", "Norte", "5"),
            record("2021", "Norte ", "1"),
        ];
        let buckets = aggregate(
            &records,
            &schema(),
            &dims(&["NO_REGIAO", "NU_ANO_CENSO"]),
            "QT_MAT_ESP",
        );

        // Trailing-space variants stay distinct buckets.
        assert_eq!(buckets.get(&key(&["Norte", "2021"])), Some(5));
        assert_eq!(buckets.get(&key(&["Norte ", "2021"])), Some(1));
    }

    #[test]
    fn rows_with_no_dimension_values_are_skipped_and_counted() {
        let records = vec![
            Record::new(vec![None, None, Some("5".to_string())]),
            record("2021", "Norte", "2"),
        ];
        let buckets = aggregate(&records, &schema(), &dims(&["NU_ANO_CENSO"]), "QT_MAT_ESP");

        assert_eq!(buckets.rows_missing_dimension, 1);
        assert_eq!(buckets.get(&key(&["2021"])), Some(2));
    }

    #[test]
    fn float_shaped_counts_coerce_by_truncation() {
        assert_eq!(coerce_metric(Some("12")), (12, false));
        assert_eq!(coerce_metric(Some(" 12.0 ")), (12, false));
        assert_eq!(coerce_metric(Some("x")), (0, true));
        assert_eq!(coerce_metric(Some("")), (0, true));
        assert_eq!(coerce_metric(None), (0, true));
    }
}
