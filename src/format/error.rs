//! Error types for project persistence.

use thiserror::Error;

/// Errors that can occur while saving or loading a project.
#[derive(Error, Debug)]
pub enum FormatError {
    /// I/O error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Mask image could not be encoded or decoded
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid structure or content
    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    /// Version mismatch between expected and found
    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },
}

impl FormatError {
    /// Create an invalid format error with a message.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }
}
