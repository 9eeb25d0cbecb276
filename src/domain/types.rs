//! Shared domain types.
//!
//! These types are intentionally lightweight and (where exported) serializable
//! so they can be:
//!
//! - used in-memory while streaming a dataset-year
//! - exported to JSON for the dashboard collaborator
//! - inspected from tests without touching the filesystem

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One declared field from a census data dictionary.
///
/// The dictionary is an ordered, read-only sequence of these; identity is the
/// trimmed, case-folded name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryField {
    pub name: String,
    pub description: String,
    pub declared_type: String,
    pub category: Option<String>,
}

/// Mapping from logical field name to the physical header found in the
/// dataset, built once per dataset-year.
///
/// Only fields with at least one plausible physical match are present; an
/// unmatched field is absent, never mapped to an empty column. Entries keep
/// dictionary order so iteration is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnProjection {
    entries: Vec<(String, String)>,
}

impl ColumnProjection {
    /// Insert a resolved mapping. The logical name is normalized (trimmed,
    /// uppercased) on the way in; re-inserting an existing field is a no-op so
    /// the first resolution wins.
    pub fn insert(&mut self, logical: &str, physical: impl Into<String>) {
        let key = normalize_field_name(logical);
        if !self.contains(&key) {
            self.entries.push((key, physical.into()));
        }
    }

    pub fn contains(&self, logical: &str) -> bool {
        let key = normalize_field_name(logical);
        self.entries.iter().any(|(l, _)| *l == key)
    }

    /// Physical header for a logical field, if it resolved.
    pub fn physical(&self, logical: &str) -> Option<&str> {
        let key = normalize_field_name(logical);
        self.entries
            .iter()
            .find(|(l, _)| *l == key)
            .map(|(_, p)| p.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(l, p)| (l.as_str(), p.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Canonical form used for field identity: trimmed and uppercased.
pub fn normalize_field_name(name: &str) -> String {
    name.trim().to_uppercase()
}

/// The projected logical fields of one record stream, in projection order.
///
/// Every `Record` of the stream aligns its values with this schema, which
/// keeps per-row memory bounded by the projection rather than the full header
/// width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSchema {
    fields: Vec<String>,
}

impl RecordSchema {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Slot of a logical field, normalizing the query first.
    pub fn index_of(&self, field: &str) -> Option<usize> {
        let key = normalize_field_name(field);
        self.fields.iter().position(|f| *f == key)
    }
}

/// One decoded data row: raw string values aligned with a `RecordSchema`.
///
/// `None` means the physical column was absent or the cell had no value; such
/// rows are still yielded by the loader and the consumer decides the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    values: Vec<Option<String>>,
}

impl Record {
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self { values }
    }

    pub fn value_at(&self, slot: usize) -> Option<&str> {
        self.values.get(slot).and_then(|v| v.as_deref())
    }

    pub fn get(&self, schema: &RecordSchema, field: &str) -> Option<&str> {
        self.value_at(schema.index_of(field)?)
    }
}

/// How the duplicate detector's key population is bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTracking {
    /// Track every distinct key (O(n) memory, exact full-history detection).
    Exact,
    /// Track at most `cap` distinct keys; rows whose key falls beyond the cap
    /// pass through untested.
    Sampled { cap: usize },
}

/// A full run's configuration as understood by the pipeline.
///
/// Derived from CLI flags plus defaults; field names refer to logical
/// dictionary names, resolved per dataset-year.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub data_dir: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub years: Vec<u16>,

    /// Metric summed per group (e.g. `QT_MAT_ESP`).
    pub metric_field: String,
    /// Primary dimension (e.g. `NU_ANO_CENSO`).
    pub year_field: String,
    /// Optional second dimension layered onto the primary one for pivoted
    /// views (e.g. `NO_REGIAO`).
    pub cluster_field: Option<String>,

    /// Preferred natural key for duplicate detection, in priority order.
    pub dedup_keys: Vec<String>,
    pub key_tracking: KeyTracking,
    pub skip_dedup: bool,

    /// How many dictionary fields (beyond the required ones) to project.
    pub project_limit: usize,

    /// Run dataset-years on the rayon pool instead of sequentially.
    pub parallel: bool,

    /// Dataset file stem, completed with `_{year}.zip` / `_{year}.csv`.
    pub file_prefix: String,
    /// Name filter selecting the main microdata entry inside an archive.
    pub entry_filter: String,
    /// Name filter selecting the dictionary workbook inside an archive.
    pub dictionary_filter: String,
    /// Rows above the dictionary's true header row.
    pub dictionary_offset: usize,
}

/// Pipeline stage status, exported as a diagnostic artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStage {
    pub id: String,
    pub label: String,
    pub status: StageStatus,
}

impl PipelineStage {
    pub fn pending(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            status: StageStatus::Pending,
        }
    }
}
