//! Error types for indexing and ranking.
//!
//! Absent terms and documents are not errors; lookups return empty results.
//! Data-quality problems met while scoring (a missing document length, an empty
//! average length) are logged and score as zero instead of surfacing here.

use std::path::PathBuf;

/// Result type for index and search operations
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors surfaced to callers of the engine
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Unknown field, index kind, tier, ranking method or smoothing method.
    /// Raised before any computation starts.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Reading or writing a persisted artifact failed
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted artifact could not be encoded or decoded
    #[error("malformed index file {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl SearchError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        SearchError::InvalidRequest(msg.into())
    }

    /// True for caller errors that must not be retried.
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, SearchError::InvalidRequest(_))
    }
}
