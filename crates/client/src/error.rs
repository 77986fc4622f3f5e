//! Client error types

use thiserror::Error;

/// Error type for consultation client operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },
}

impl ClientError {
    /// Returns true if this error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            // Retry network-related errors and timeouts
            ClientError::Http(_) => true,
            // Server-side failures may clear up; client mistakes won't
            ClientError::Api { status, .. } => *status >= 500,
        }
    }
}

/// Result type for consultation client operations
pub type ClientResult<T> = Result<T, ClientError>;
