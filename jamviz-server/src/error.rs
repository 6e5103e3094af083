//! Error types for jamviz-server
//!
//! Module-level errors use thiserror; HTTP handlers convert into [`ApiError`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for jamviz-server
#[derive(Error, Debug)]
pub enum Error {
    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Outbound HTTP request errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Audio capture device or capture process errors
    #[error("Audio capture error: {0}")]
    Capture(String),

    /// External command failed or produced unusable output
    #[error("Process error: {0}")]
    Process(String),

    /// A collaborator call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Fingerprint generation or lookup errors
    #[error("Fingerprint error: {0}")]
    Fingerprint(String),

    /// Image download or decode errors
    #[error("Image error: {0}")]
    Image(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// jamviz-common error
    #[error("Common error: {0}")]
    Common(#[from] jamviz_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using jamviz-server Error
pub type Result<T> = std::result::Result<T, Error>;

/// Run a future under a deadline, mapping expiry to [`Error::Timeout`]
pub async fn with_timeout<T, F>(what: &str, limit: std::time::Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!("{} after {:?}", what, limit))),
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Module error
    #[error(transparent)]
    Server(#[from] Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Server(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERVER_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;
