//! Error types for the Turnstile rate limiter.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

/// Boxed error used for failures coming from user-supplied code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by a counter store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Any other failure reported by a store implementation
    #[error("store backend error: {0}")]
    Backend(#[source] BoxError),
}

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The store failed to record a hit
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// A dynamic max could not be resolved
    #[error("Failed to resolve max: {0}")]
    MaxResolution(#[source] BoxError),

    /// The server did not provide the client's address
    #[error("Client address missing from request")]
    MissingClientAddr,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;

impl IntoResponse for TurnstileError {
    fn into_response(self) -> Response {
        error!(error = %self, "Request failed in rate limiter");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}
