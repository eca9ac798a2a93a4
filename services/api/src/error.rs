//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it is
//! rendered to the browser: a JSON body `{ "error": "<message>" }` with a
//! status derived from the error's kind.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

use crate::adapters::WebhookError;
use crate::config::ConfigError;
use terminal_pos_core::{PortError, PosError};

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core workflows.
    #[error(transparent)]
    Pos(#[from] PosError),

    /// Malformed or missing request input detected by the HTTP layer.
    #[error("{0}")]
    BadRequest(String),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl From<PortError> for ApiError {
    fn from(e: PortError) -> Self {
        ApiError::Pos(PosError::Platform(e))
    }
}

impl From<WebhookError> for ApiError {
    fn from(e: WebhookError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Pos(e) => match e {
                PosError::Validation(_) | PosError::NoReaderSelected => StatusCode::BAD_REQUEST,
                PosError::NotFound(_) => StatusCode::NOT_FOUND,
                PosError::Platform(_) => StatusCode::PAYMENT_REQUIRED,
                PosError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Config(_) | ApiError::Io(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            error!("Request failed ({}): {}", status, message);
        } else {
            warn!("Request rejected ({}): {}", status, message);
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        let cases = [
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (PosError::Validation("x".into()).into(), StatusCode::BAD_REQUEST),
            (PosError::NoReaderSelected.into(), StatusCode::BAD_REQUEST),
            (PosError::NotFound("x".into()).into(), StatusCode::NOT_FOUND),
            (
                PortError::Rejected { status: 400, message: "x".into() }.into(),
                StatusCode::PAYMENT_REQUIRED,
            ),
            (PosError::Session("x".into()).into(), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status(), expected, "{err}");
        }
    }

    #[test]
    fn platform_message_is_passed_through() {
        let err: ApiError = PortError::Rejected {
            status: 404,
            message: "No such terminal.reader: 'tmr_x'".into(),
        }
        .into();
        assert!(err.to_string().contains("No such terminal.reader"));
    }
}
