//! Error types for templar operations
//!
//! Covers catalog parsing, instance construction, tensor descriptor misuse and
//! template rendering.

use thiserror::Error;

/// Result type for templar operations
pub type Result<T> = std::result::Result<T, TemplarError>;

/// Errors that can occur while building or rendering kernel instances
///
/// `Clone` so that a failed catalog load can be cached and handed to every
/// later caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplarError {
    /// Positional argument list has the wrong length for an instance record
    #[error("Instance argument count mismatch: expected {expected}, got {found}")]
    ArgumentCount {
        /// Accepted argument count(s)
        expected: String,
        /// Number of arguments found on the line
        found: usize,
    },

    /// A positional argument has the wrong shape for its field
    #[error("Catalog format error in field `{field}`: expected {expected}, found {found}")]
    CatalogFormat {
        /// Field name
        field: &'static str,
        /// What the field requires
        expected: &'static str,
        /// What the catalog contained
        found: String,
    },

    /// `S<...>` sub-list that never closes or holds non-integers
    #[error("Malformed sub-list: {0}")]
    MalformedSubList(String),

    /// Field still holds a template placeholder
    #[error("Unresolved placeholder `{value}` in field `{field}`")]
    UnresolvedPlaceholder {
        /// Field name
        field: &'static str,
        /// Placeholder symbol
        value: String,
    },

    /// Shape or rank does not fit the operation
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// Data type has no mapping for the requested backend
    #[error("Unsupported dtype: {0}")]
    UnsupportedDtype(String),

    /// Template engine failure
    #[error("Render error: {0}")]
    Render(String),

    /// Configuration value could not be interpreted
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// File system error while scanning the catalog
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TemplarError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<minijinja::Error> for TemplarError {
    fn from(err: minijinja::Error) -> Self {
        Self::Render(err.to_string())
    }
}
