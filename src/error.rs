use thiserror::Error;
use std::collections::HashMap;
use serde::{Serialize, Deserialize};

// Import Axum types for HTTP response conversion
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::models::response::{RestResponse, ResultCode};

/// Structured validation errors with field-level error mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValidationErrors {
    Single { field: String, message: String },
    Multiple { fields: HashMap<String, String> },
}

/// The custom error type for the application.
#[derive(Debug, Error)]
pub enum Error {
    /// An error originating from the sqlx library.
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The data source name could not be parsed.
    #[error("Invalid DSN: {0}")]
    InvalidDsn(String),

    /// A validation error with field-level details.
    #[error("Validation error: {0:?}")]
    Validation(ValidationErrors),

    /// An operation did not finish before its deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Releasing the connection pool failed.
    #[error("Release failed: {0}")]
    Release(String),
}

/// A type alias for `Result<T, Error>` to simplify function signatures.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Sqlx(_)
            | Error::Config(_)
            | Error::InvalidDsn(_)
            | Error::Release(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors become a failed envelope. Database and configuration details stay in the logs.
impl From<&Error> for RestResponse {
    fn from(err: &Error) -> Self {
        match err {
            Error::Validation(errors) => {
                let fields = match errors {
                    ValidationErrors::Single { field, message } => {
                        serde_json::json!({ field: message })
                    }
                    ValidationErrors::Multiple { fields } => serde_json::json!(fields),
                };
                RestResponse::with_code(
                    ResultCode::ValidateFailed,
                    serde_json::json!({ "fields": fields }),
                    "Validation failed",
                )
            }
            Error::Sqlx(_) => RestResponse::failed("Database error"),
            Error::Config(_) | Error::InvalidDsn(_) => RestResponse::failed("Configuration error"),
            Error::Timeout(_) | Error::Release(_) => RestResponse::failed("Database unavailable"),
        }
    }
}

/// Convert custom Error to HTTP response
///
/// The body is always a `RestResponse` envelope so clients parse one shape.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body: RestResponse = RestResponse::from(&self);
        (status, Json(body)).into_response()
    }
}
