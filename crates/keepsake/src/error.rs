//! Error types for keepsake

use thiserror::Error;

/// Main error type for keepsake operations
#[derive(Error, Debug)]
pub enum KeepsakeError {
    /// I/O errors (persistence file, temp files, directories)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors (a record could not be measured or persisted)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store operation errors
    #[error("Store error: {0}")]
    Store(String),
}

/// Result type alias for keepsake operations
pub type Result<T> = std::result::Result<T, KeepsakeError>;
