//! services/api/src/web/middleware.rs
//!
//! Caller identification for protected routes.

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::warn;
use uuid::Uuid;

use crate::error::ApiError;

/// Header set by the upstream gateway once it has authenticated the caller.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Middleware that reads the authenticated user id from `x-user-id`.
///
/// If valid, inserts the user id into request extensions for handlers to use.
/// If missing or malformed, returns 401 Unauthorized.
pub async fn require_user(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let raw = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized(format!("{} header is required", USER_ID_HEADER)))?;

    let user_id = Uuid::parse_str(raw.trim()).map_err(|_| {
        warn!("Rejected malformed {} header", USER_ID_HEADER);
        ApiError::Unauthorized(format!("Invalid {} format", USER_ID_HEADER))
    })?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}
