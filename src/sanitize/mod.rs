//! Duplicate detection over streamed records.
//!
//! Records are equivalent when they agree exactly on every key field (no
//! normalization beyond what the record already carries). Detection keeps a
//! key-to-count map for the whole pass; this is the one stage whose memory
//! grows with the number of distinct keys, so the trade-off is an explicit
//! mode: `KeyTracking::Exact` buffers full history, `KeyTracking::Sampled`
//! caps the tracked population and lets overflow rows pass untested.

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::domain::{KeyTracking, Record, RecordSchema};

/// One group of records sharing a duplicate key (size >= 2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub key: Vec<String>,
    pub count: usize,
}

/// Audit report produced alongside the sanitized record set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DuplicateReport {
    /// Key fields actually used (invalid ones are dropped up front).
    pub key_fields: Vec<String>,
    /// Set when detection did not run, with the reason.
    pub skipped: Option<String>,
    pub groups: Vec<DuplicateGroup>,
    pub rows_in: usize,
    /// Rows beyond the first representative of each key.
    pub duplicate_rows: usize,
    /// Rows whose key fell beyond the sampled cap and passed untested.
    pub untracked_rows: usize,
}

/// Streaming duplicate filter.
///
/// Feed each record through [`DuplicateDetector::observe`]; `true` means keep
/// (first occurrence of its key, or detection skipped/untracked), `false`
/// means the record repeats an already-seen key.
pub struct DuplicateDetector {
    key_slots: Vec<usize>,
    key_fields: Vec<String>,
    skipped: Option<String>,
    seen: HashMap<Vec<String>, usize>,
    cap: Option<usize>,
    rows_in: usize,
    duplicate_rows: usize,
    untracked_rows: usize,
}

impl DuplicateDetector {
    /// Build a detector for the given key fields.
    ///
    /// Key fields absent from the schema are dropped with a warning; when
    /// none remain, detection is skipped entirely and every record is kept
    /// (recovered condition, not an error).
    pub fn new(schema: &RecordSchema, key_fields: &[String], tracking: KeyTracking) -> Self {
        let mut key_slots = Vec::new();
        let mut valid_fields = Vec::new();
        for field in key_fields {
            match schema.index_of(field) {
                Some(slot) => {
                    key_slots.push(slot);
                    valid_fields.push(field.clone());
                }
                None => warn!(field = %field, "duplicate key field not in projection, dropped"),
            }
        }

        let skipped = if valid_fields.is_empty() {
            Some("no valid fields".to_string())
        } else {
            None
        };

        Self {
            key_slots,
            key_fields: valid_fields,
            skipped,
            seen: HashMap::new(),
            cap: match tracking {
                KeyTracking::Exact => None,
                KeyTracking::Sampled { cap } => Some(cap),
            },
            rows_in: 0,
            duplicate_rows: 0,
            untracked_rows: 0,
        }
    }

    /// Observe one record; returns whether it should be kept.
    pub fn observe(&mut self, record: &Record) -> bool {
        self.rows_in += 1;
        if self.skipped.is_some() {
            return true;
        }

        let key: Vec<String> = self
            .key_slots
            .iter()
            .map(|slot| record.value_at(*slot).unwrap_or("").to_string())
            .collect();

        if let Some(count) = self.seen.get_mut(&key) {
            *count += 1;
            self.duplicate_rows += 1;
            return false;
        }

        if let Some(cap) = self.cap {
            if self.seen.len() >= cap {
                self.untracked_rows += 1;
                return true;
            }
        }

        self.seen.insert(key, 1);
        true
    }

    /// Finish the pass and produce the audit report.
    pub fn into_report(self) -> DuplicateReport {
        let mut groups: Vec<DuplicateGroup> = self
            .seen
            .into_iter()
            .filter(|(_, count)| *count >= 2)
            .map(|(key, count)| DuplicateGroup { key, count })
            .collect();
        groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));

        DuplicateReport {
            key_fields: self.key_fields,
            skipped: self.skipped,
            groups,
            rows_in: self.rows_in,
            duplicate_rows: self.duplicate_rows,
            untracked_rows: self.untracked_rows,
        }
    }
}

/// Buffered convenience: partition an in-memory record set.
///
/// Returns the deduplicated records (first representative per key, stream
/// order preserved) and the audit report.
pub fn dedup_records(
    records: Vec<Record>,
    schema: &RecordSchema,
    key_fields: &[String],
    tracking: KeyTracking,
) -> (Vec<Record>, DuplicateReport) {
    let mut detector = DuplicateDetector::new(schema, key_fields, tracking);
    let kept = records
        .into_iter()
        .filter(|record| detector.observe(record))
        .collect();
    (kept, detector.into_report())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> RecordSchema {
        RecordSchema::new(vec![
            "CO_ENTIDADE".to_string(),
            "NU_ANO_CENSO".to_string(),
            "QT_MAT_ESP".to_string(),
        ])
    }

    fn record(values: &[&str]) -> Record {
        Record::new(values.iter().map(|v| Some(v.to_string())).collect())
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn all_distinct_keys_mean_no_groups_and_input_preserved() {
        let records = vec![
            record(&["11000023", "2021", "5"]),
            record(&["11000031", "2021", "3"]),
            record(&["11000040", "2021", "0"]),
        ];
        let (kept, report) = dedup_records(
            records.clone(),
            &schema(),
            &keys(&["CO_ENTIDADE"]),
            KeyTracking::Exact,
        );

        assert!(report.groups.is_empty());
        assert_eq!(report.duplicate_rows, 0);
        assert_eq!(kept, records);
    }

    #[test]
    fn duplicate_groups_keep_first_representative_in_stream_order() {
        let records = vec![
            record(&["11000023", "2021", "5"]),
            record(&["11000023", "2021", "9"]),
            record(&["11000031", "2021", "3"]),
            record(&["11000023", "2021", "2"]),
        ];
        let (kept, report) = dedup_records(
            records,
            &schema(),
            &keys(&["CO_ENTIDADE", "NU_ANO_CENSO"]),
            KeyTracking::Exact,
        );

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0], record(&["11000023", "2021", "5"]));
        assert_eq!(kept[1], record(&["11000031", "2021", "3"]));

        assert_eq!(report.groups.len(), 1);
        assert_eq!(
            report.groups[0].key,
            vec!["11000023".to_string(), "2021".to_string()]
        );
        assert_eq!(report.groups[0].count, 3);
        assert_eq!(report.duplicate_rows, 2);
    }

    #[test]
    fn detection_plus_removal_is_idempotent() {
        let records = vec![
            record(&["11000023", "2021", "5"]),
            record(&["11000023", "2021", "9"]),
            record(&["11000031", "2021", "3"]),
        ];
        let key_fields = keys(&["CO_ENTIDADE"]);

        let (once, _) = dedup_records(records, &schema(), &key_fields, KeyTracking::Exact);
        let (twice, report) =
            dedup_records(once.clone(), &schema(), &key_fields, KeyTracking::Exact);

        assert_eq!(once, twice);
        assert!(report.groups.is_empty());
    }

    #[test]
    fn no_valid_key_fields_skips_detection_and_keeps_everything() {
        let records = vec![
            record(&["11000023", "2021", "5"]),
            record(&["11000023", "2021", "5"]),
        ];
        let (kept, report) = dedup_records(
            records,
            &schema(),
            &keys(&["DS_ENDERECO", "NU_CEP"]),
            KeyTracking::Exact,
        );

        assert_eq!(kept.len(), 2);
        assert_eq!(report.skipped.as_deref(), Some("no valid fields"));
        assert!(report.groups.is_empty());
    }

    #[test]
    fn sampled_mode_caps_the_tracked_key_population() {
        let records: Vec<Record> = (0..10)
            .map(|i| record(&[&format!("{i}"), "2021", "1"]))
            .collect();
        let mut detector = DuplicateDetector::new(
            &schema(),
            &keys(&["CO_ENTIDADE"]),
            KeyTracking::Sampled { cap: 4 },
        );

        for r in &records {
            assert!(detector.observe(r));
        }
        let report = detector.into_report();
        assert_eq!(report.untracked_rows, 6);
        assert_eq!(report.rows_in, 10);
    }

    #[test]
    fn missing_key_values_compare_as_empty_strings() {
        let records = vec![
            Record::new(vec![None, Some("2021".to_string()), Some("5".to_string())]),
            Record::new(vec![None, Some("2021".to_string()), Some("3".to_string())]),
        ];
        let (kept, report) = dedup_records(
            records,
            &schema(),
            &keys(&["CO_ENTIDADE", "NU_ANO_CENSO"]),
            KeyTracking::Exact,
        );

        assert_eq!(kept.len(), 1);
        assert_eq!(report.groups[0].key, vec!["".to_string(), "2021".to_string()]);
    }
}
