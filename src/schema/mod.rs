//! Schema resolution: dictionary names against actual dataset headers.
//!
//! Naming drifts across census years (casing, stray whitespace, renamed
//! variants), so resolution is a two-phase matcher:
//!
//! 1. exact match on the normalized (trimmed, uppercased) name
//! 2. first header, in header order, that *contains* the normalized name
//!
//! A field matching neither phase is omitted from the projection, never
//! defaulted to a guess. Phase 2 is order-dependent when several headers
//! qualify; that case is logged and the first match wins.

use tracing::warn;

use crate::domain::{ColumnProjection, DictionaryField, normalize_field_name};
use crate::error::{PipelineError, Result};

/// Outcome of matching one logical field against the header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMatch {
    Exact { column: String },
    Substring { column: String },
    Unmatched,
}

impl FieldMatch {
    pub fn column(&self) -> Option<&str> {
        match self {
            FieldMatch::Exact { column } | FieldMatch::Substring { column } => Some(column),
            FieldMatch::Unmatched => None,
        }
    }
}

/// Match a single logical name against the header row.
pub fn match_field(name: &str, headers: &[String]) -> FieldMatch {
    let needle = normalize_field_name(name);
    if needle.is_empty() {
        return FieldMatch::Unmatched;
    }

    if let Some(hit) = headers.iter().find(|h| normalize_field_name(h) == needle) {
        return FieldMatch::Exact {
            column: hit.clone(),
        };
    }

    let mut candidates = headers
        .iter()
        .filter(|h| normalize_field_name(h).contains(&needle));
    match candidates.next() {
        Some(first) => {
            if candidates.next().is_some() {
                // Substring fallback is order-dependent when ambiguous; keep
                // the first header but surface the risk.
                warn!(field = %name, column = %first, "ambiguous substring match, first header wins");
            }
            FieldMatch::Substring {
                column: first.clone(),
            }
        }
        None => FieldMatch::Unmatched,
    }
}

/// Build the logical-to-physical projection for one dataset-year.
///
/// Iterates the dictionary in row order; unmatched fields are absent from
/// the output.
pub fn resolve(fields: &[DictionaryField], headers: &[String]) -> ColumnProjection {
    let mut projection = ColumnProjection::default();
    for field in fields {
        if let Some(column) = match_field(&field.name, headers).column() {
            projection.insert(&field.name, column);
        }
    }
    projection
}

/// Resolve extra logical names (metric, key fields) that the caller needs
/// regardless of whether the dictionary lists them.
pub fn ensure_fields(projection: &mut ColumnProjection, headers: &[String], names: &[&str]) {
    for name in names {
        if projection.contains(name) {
            continue;
        }
        if let Some(column) = match_field(name, headers).column() {
            projection.insert(name, column);
        }
    }
}

/// Fail with the full header list when required identifying columns did not
/// resolve, so the caller can log and abort that dataset-year.
pub fn require(projection: &ColumnProjection, required: &[&str], headers: &[String]) -> Result<()> {
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !projection.contains(name))
        .map(|name| name.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::SchemaMissingField {
            missing,
            available: headers.to_vec(),
        })
    }
}

/// Fuzzy description lookup: case-insensitive substring search of the
/// requested name inside the dictionary's name column, first hit in
/// dictionary row order. Total; absence is the "not found" signal.
pub fn find_field_description<'a>(fields: &'a [DictionaryField], query: &str) -> Option<&'a str> {
    let needle = normalize_field_name(query);
    if needle.is_empty() {
        return None;
    }
    fields
        .iter()
        .find(|f| normalize_field_name(&f.name).contains(&needle))
        .map(|f| f.description.as_str())
}
