//! Error types for miniblob

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Storage Errors ===
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    Corrupt { expected: String, actual: String },

    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // === Placement Errors ===
    #[error("Unavailable: {0}")]
    Unavailable(String),

    // === Client Errors ===
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // === Network Errors ===
    #[error("Network failure: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Can the caller reasonably try again later?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Http(_) | Error::Unavailable(_)
        )
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Network(_) | Error::Http(_) => StatusCode::BAD_GATEWAY,
            Error::InvalidFormat(_)
            | Error::Corrupt { .. }
            | Error::CorruptIndex(_)
            | Error::Io(_)
            | Error::InvalidConfig(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.to_http_status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        (
            status,
            axum::Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            Error::Network(e.to_string())
        } else {
            Error::Http(e.to_string())
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Internal(format!("blocking task failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            Error::NotFound("x".into()).to_http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::Unavailable("x".into()).to_http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::InvalidArgument("x".into()).to_http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Corrupt {
                expected: "00".into(),
                actual: "01".into()
            }
            .to_http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::InvalidFormat("bad magic".into()).to_http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_retryable() {
        assert!(Error::Network("refused".into()).is_retryable());
        assert!(Error::Unavailable("empty".into()).is_retryable());
        assert!(!Error::NotFound("x".into()).is_retryable());
    }
}
