//! Error types for filter operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Filter name must not be empty")]
    EmptyName,

    #[error("Filter criteria must not be empty")]
    EmptyCriteria,

    #[error("A filter named '{0}' already exists")]
    DuplicateName(String),

    #[error("Invalid regex pattern '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },

    #[error("Filter index {index} out of range (count: {count})")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Invalid filter document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FilterError>;
