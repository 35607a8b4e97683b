pub mod dto;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

pub use middleware::require_user;
pub use state::AppState;
pub use ws_handler::ws_handler;

/// Every route of the API. All of them require the caller's id.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/purchase-requests",
            post(rest::create_purchase_request_handler).get(rest::list_purchase_requests_handler),
        )
        .route(
            "/purchase-requests/drafts",
            post(rest::create_draft_handler).get(rest::list_drafts_handler),
        )
        .route(
            "/purchase-requests/code/{code}",
            get(rest::get_purchase_request_by_code_handler),
        )
        .route(
            "/purchase-requests/{id}",
            get(rest::get_purchase_request_handler).delete(rest::delete_purchase_request_handler),
        )
        .route("/purchase-requests/{id}/publish", post(rest::publish_draft_handler))
        .route("/purchase-requests/{id}/status", put(rest::set_status_handler))
        .route("/purchase-requests/{id}/deadline", put(rest::update_deadline_handler))
        .route(
            "/purchase-requests/{id}/invited-companies",
            post(rest::invite_companies_handler),
        )
        .route("/purchase-requests/{id}/agents", post(rest::invite_agent_handler))
        .route(
            "/purchase-requests/{id}/bids",
            post(rest::create_bid_handler).get(rest::list_bids_handler),
        )
        .route("/purchase-requests/{id}/bids/latest", get(rest::latest_bids_handler))
        .route("/purchase-requests/{id}/interest", post(rest::show_interest_handler))
        .route("/bids/stats", get(rest::bid_stats_handler))
        .route("/notifications", get(rest::list_notifications_handler))
        .route("/notifications/read", post(rest::mark_notifications_read_handler))
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn(require_user))
        .with_state(state)
}
