//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it maps onto
//! HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use procurement_core::ports::PortError;
use procurement_core::ProcurementError;
use serde_json::json;
use tracing::error;

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A business outcome reported by one of the lifecycle managers.
    #[error(transparent)]
    Procurement(#[from] ProcurementError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migrations failed to apply at startup.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller sent something the handlers could not interpret.
    #[error("{0}")]
    BadRequest(String),

    /// The caller could not be identified.
    #[error("{0}")]
    Unauthorized(String),

    /// The operation did not finish within the configured deadline.
    #[error("The operation timed out")]
    Timeout,

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Procurement(err) => match err {
                ProcurementError::NotFound(_) => StatusCode::NOT_FOUND,
                ProcurementError::BadRequest(_) => StatusCode::BAD_REQUEST,
                ProcurementError::Forbidden(_) => StatusCode::FORBIDDEN,
                ProcurementError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Procurement(err) => err.to_string(),
            ApiError::BadRequest(message) | ApiError::Unauthorized(message) => message.clone(),
            ApiError::Timeout => self.to_string(),
            other => {
                error!("Request failed: {:?}", other);
                "An unexpected internal error occurred".to_string()
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn procurement_kinds_map_to_status_codes() {
        let cases = [
            (ProcurementError::not_found("x"), StatusCode::NOT_FOUND),
            (ProcurementError::bad_request("x"), StatusCode::BAD_REQUEST),
            (ProcurementError::forbidden("x"), StatusCode::FORBIDDEN),
            (ProcurementError::internal("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
        assert_eq!(ApiError::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
