//! Error types.

use thiserror::Error;

/// Main error type for the library core.
#[derive(Error, Debug)]
pub enum AppError {
    /// Book absent from the library on lookup.
    #[error("Book not found: {0}")]
    NotFound(String),

    /// Format tag has no text-source implementation.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// I/O error on local files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote request failed (transport, timeout, non-2xx).
    #[error("Remote request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote service answered but reported a failure.
    #[error("Remote service error: {0}")]
    Remote(String),

    /// Text encoding could not be recognized or decoded.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (storage layer and other fatal-to-the-call failures).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the caller may retry the failed operation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Io(_) | AppError::Http(_) | AppError::Remote(_)
        )
    }
}

/// Result type alias for the library core.
pub type Result<T> = std::result::Result<T, AppError>;
