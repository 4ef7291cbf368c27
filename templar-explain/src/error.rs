//! Error types for templar-explain

use thiserror::Error;

/// Errors that can occur while producing a report
#[derive(Error, Debug)]
pub enum ExplainError {
    /// Library failure while parsing, selecting or rendering
    #[error(transparent)]
    Templar(#[from] templar::TemplarError),

    /// Catalog path does not exist
    #[error("Catalog not found: {0}")]
    CatalogNotFound(String),

    /// Requested instance index is past the selection
    #[error("Instance index {index} out of range ({available} selected)")]
    InstanceIndex {
        /// Requested index
        index: usize,
        /// Number of selected instances
        available: usize,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for templar-explain operations
pub type Result<T> = std::result::Result<T, ExplainError>;
