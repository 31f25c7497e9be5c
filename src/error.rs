use thiserror::Error;

/// Dyno error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DynoError {
    #[error("Position tracking unsupported: {0}")]
    Unsupported(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for dyno operations
pub type DynoResult<T> = Result<T, DynoError>;

impl From<std::io::Error> for DynoError {
    fn from(err: std::io::Error) -> Self {
        DynoError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for DynoError {
    fn from(err: serde_json::Error) -> Self {
        DynoError::Serialization(err.to_string())
    }
}
