//! crates/procurement_core/src/error.rs
//!
//! The error taxonomy surfaced by every lifecycle operation.

use crate::ports::PortError;

/// Errors returned to callers of the lifecycle managers.
///
/// Each variant carries a human-readable message that is safe to show to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcurementError {
    /// The entity does not exist or is excluded by a required filter.
    #[error("{0}")]
    NotFound(String),
    /// A precondition or invariant was violated.
    #[error("{0}")]
    BadRequest(String),
    /// The caller is not eligible to perform the operation.
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Internal(String),
}

pub type ProcurementResult<T> = Result<T, ProcurementError>;

impl ProcurementError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable label for logs and wire responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ProcurementError::NotFound(_) => "NOT_FOUND",
            ProcurementError::BadRequest(_) => "BAD_REQUEST",
            ProcurementError::Forbidden(_) => "FORBIDDEN",
            ProcurementError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<PortError> for ProcurementError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(message) => ProcurementError::NotFound(message),
            PortError::Conflict(message) => ProcurementError::BadRequest(message),
            PortError::Unauthorized => ProcurementError::Forbidden("Unauthorized".to_string()),
            PortError::Unexpected(message) => {
                tracing::error!("Unexpected port failure: {}", message);
                ProcurementError::Internal("An unexpected internal error occurred".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_port_errors_do_not_leak_details() {
        let err: ProcurementError =
            PortError::Unexpected("connection reset by peer at 10.0.0.3".to_string()).into();
        assert_eq!(err.kind(), "INTERNAL");
        assert!(!err.to_string().contains("10.0.0.3"));
    }

    #[test]
    fn conflicts_surface_as_bad_requests() {
        let err: ProcurementError = PortError::Conflict("duplicate bid".to_string()).into();
        assert_eq!(err, ProcurementError::BadRequest("duplicate bid".to_string()));
    }
}
