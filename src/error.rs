//! Error types for the review pipeline

use std::path::PathBuf;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, ReviewError>;

/// Errors raised by evaluation, selection, scoring and the session workflow.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    /// Registry or configuration is unusable (fatal at startup).
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Data(#[from] DataError),

    /// Scoring was requested without a model, or with a name the registry does not know.
    #[error("model not resolved: {}", .name.as_deref().unwrap_or("no model selected"))]
    ModelNotResolved { name: Option<String> },

    /// A model capability failed while detecting.
    #[error("model {model} failed: {reason}")]
    Detection { model: String, reason: String },

    #[error("performance store error: {0}")]
    Store(String),
}

impl ReviewError {
    pub fn detection(model: &str, reason: impl Into<String>) -> Self {
        ReviewError::Detection {
            model: model.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors the session workflow turns into a user-facing message.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ReviewError::Data(_) | ReviewError::ModelNotResolved { .. })
    }
}

/// Problems with uploaded or validation datasets.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("dataset not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("no dataset uploaded for this session")]
    NoUpload,

    #[error("failed to read dataset: {reason}")]
    Unreadable { reason: String },

    #[error("column `{column}` row {row}: expected a number, found `{value}`")]
    SchemaMismatch {
        column: String,
        row: usize,
        value: String,
    },

    #[error("fraud label column `{column}` is missing")]
    MissingLabelColumn { column: String },

    #[error("unrecognised fraud label `{value}` at row {row}")]
    InvalidLabel { row: usize, value: String },

    #[error("{labels} labels supplied for {rows} feature rows")]
    LabelCountMismatch { labels: usize, rows: usize },
}

impl From<csv::Error> for DataError {
    fn from(e: csv::Error) -> Self {
        DataError::Unreadable {
            reason: e.to_string(),
        }
    }
}

impl From<csv::Error> for ReviewError {
    fn from(e: csv::Error) -> Self {
        ReviewError::Data(e.into())
    }
}
