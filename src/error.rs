//! Crate-wide error type.
//!
//! Failures are tagged by reason rather than stringly-typed so callers can
//! react per the pipeline's containment rules: a schema failure aborts one
//! dataset-year, an export failure aborts the run, and row-level problems are
//! collected alongside results instead of surfacing here at all.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive error on '{path}': {message}")]
    Archive { path: PathBuf, message: String },

    #[error("No CSV entry matching '{filter}' inside '{path}'")]
    MissingEntry { path: PathBuf, filter: String },

    #[error("Dictionary error on '{source_label}': {message}")]
    Dictionary {
        source_label: String,
        message: String,
    },

    #[error(
        "Required field(s) {missing:?} could not be resolved against the dataset headers; \
         available headers: {available:?}"
    )]
    SchemaMissingField {
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Export error on '{path}': {message}")]
    Export { path: PathBuf, message: String },
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn export(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Export {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Process exit code for the binary: 2 = input/I-O, 3 = schema, 4 = export.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Io { .. }
            | PipelineError::Archive { .. }
            | PipelineError::MissingEntry { .. }
            | PipelineError::Dictionary { .. }
            | PipelineError::Csv(_) => 2,
            PipelineError::SchemaMissingField { .. } => 3,
            PipelineError::Export { .. } => 4,
        }
    }
}
