//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Handlers stay thin: check the caller's capability, bound the lifecycle operation
//! by the configured timeout, and map the result onto a view.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use procurement_core::ports::{Capability, ResourceScope};
use procurement_core::{ProcurementError, ProcurementResult, PurchaseRequestStatus};
use std::future::Future;
use std::sync::Arc;
use tracing::warn;
use utoipa::OpenApi;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::dto::{
    BidPageView, BidStatsView, BidView, CompanyView, CreateBidBody, CreateDraftBody,
    CreatePurchaseRequestBody, DocumentView, InviteAgentBody, InviteCompaniesBody, ListBidsQuery,
    ListPurchaseRequestsQuery, MarkReadResponse, NotificationView, PurchaseRequestView,
    SetStatusBody, UpdateDeadlineBody,
};
use crate::web::state::AppState;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        create_purchase_request_handler,
        create_draft_handler,
        list_purchase_requests_handler,
        list_drafts_handler,
        get_purchase_request_handler,
        get_purchase_request_by_code_handler,
        delete_purchase_request_handler,
        publish_draft_handler,
        set_status_handler,
        update_deadline_handler,
        invite_companies_handler,
        invite_agent_handler,
        create_bid_handler,
        show_interest_handler,
        list_bids_handler,
        latest_bids_handler,
        bid_stats_handler,
        list_notifications_handler,
        mark_notifications_read_handler,
    ),
    components(
        schemas(
            CreatePurchaseRequestBody, CreateDraftBody, SetStatusBody, UpdateDeadlineBody,
            InviteCompaniesBody, InviteAgentBody, CreateBidBody, PurchaseRequestView,
            DocumentView, BidView, BidPageView, BidStatsView, CompanyView, NotificationView,
            MarkReadResponse
        )
    ),
    tags(
        (name = "Procurement API", description = "Purchase requests, bids and notifications.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Helpers
//=========================================================================================

async fn require(
    state: &AppState,
    user_id: Uuid,
    capability: Capability,
    scope: ResourceScope,
) -> Result<(), ApiError> {
    if state
        .capabilities
        .has_capability(user_id, capability, scope)
        .await?
    {
        return Ok(());
    }
    warn!("User {} lacks capability {}", user_id, capability.as_str());
    Err(ProcurementError::forbidden(format!(
        "Missing permission: {}",
        capability.as_str()
    ))
    .into())
}

/// Runs a lifecycle operation, post-commit steps included, within the configured deadline.
async fn bounded<T, F>(state: &AppState, operation: F) -> Result<T, ApiError>
where
    F: Future<Output = ProcurementResult<T>>,
{
    match tokio::time::timeout(state.config.operation_timeout, operation).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => {
            warn!(
                "Operation exceeded {:?} and was abandoned",
                state.config.operation_timeout
            );
            Err(ApiError::Timeout)
        }
    }
}

fn parse_status(raw: &str) -> Result<PurchaseRequestStatus, ApiError> {
    raw.trim()
        .to_uppercase()
        .parse::<PurchaseRequestStatus>()
        .map_err(|_| ApiError::BadRequest(format!("Invalid status '{}'", raw)))
}

//=========================================================================================
// Purchase Request Handlers
//=========================================================================================

/// Create a purchase request and submit it for approval.
#[utoipa::path(
    post,
    path = "/purchase-requests",
    request_body = CreatePurchaseRequestBody,
    responses(
        (status = 201, description = "Purchase request created", body = PurchaseRequestView),
        (status = 400, description = "Invalid input or unknown attachment"),
        (status = 403, description = "Missing permission"),
        (status = 404, description = "Department not found")
    ),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the calling user."))
)]
pub async fn create_purchase_request_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(body): Json<CreatePurchaseRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    require(&state, user_id, Capability::CreatePurchaseRequests, ResourceScope::Global).await?;
    let input = body.into_input()?;
    let created = bounded(&state, state.purchase_requests.create(user_id, input)).await?;
    Ok((StatusCode::CREATED, Json(PurchaseRequestView::from(created))))
}

/// Save a draft purchase request.
#[utoipa::path(
    post,
    path = "/purchase-requests/drafts",
    request_body = CreateDraftBody,
    responses(
        (status = 201, description = "Draft created", body = PurchaseRequestView),
        (status = 403, description = "Missing permission")
    ),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the calling user."))
)]
pub async fn create_draft_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(body): Json<CreateDraftBody>,
) -> Result<impl IntoResponse, ApiError> {
    require(&state, user_id, Capability::CreatePurchaseRequests, ResourceScope::Global).await?;
    let input = body.into_input()?;
    let draft = bounded(&state, state.purchase_requests.create_draft(user_id, input)).await?;
    Ok((StatusCode::CREATED, Json(PurchaseRequestView::from(draft))))
}

/// List the caller's purchase requests, newest first.
#[utoipa::path(
    get,
    path = "/purchase-requests",
    params(
        ListPurchaseRequestsQuery,
        ("x-user-id" = Uuid, Header, description = "The unique ID of the calling user.")
    ),
    responses((status = 200, description = "Owned purchase requests", body = [PurchaseRequestView]))
)]
pub async fn list_purchase_requests_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<ListPurchaseRequestsQuery>,
) -> Result<Json<Vec<PurchaseRequestView>>, ApiError> {
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let requests = bounded(&state, state.purchase_requests.list_owned(user_id, status)).await?;
    Ok(Json(requests.into_iter().map(PurchaseRequestView::from).collect()))
}

/// List the caller's drafts.
#[utoipa::path(
    get,
    path = "/purchase-requests/drafts",
    responses((status = 200, description = "Drafts owned by the caller", body = [PurchaseRequestView])),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the calling user."))
)]
pub async fn list_drafts_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<PurchaseRequestView>>, ApiError> {
    let drafts = bounded(&state, state.purchase_requests.list_drafts(user_id)).await?;
    Ok(Json(drafts.into_iter().map(PurchaseRequestView::from).collect()))
}

#[utoipa::path(
    get,
    path = "/purchase-requests/{id}",
    params(
        ("id" = Uuid, Path, description = "Purchase request id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the calling user.")
    ),
    responses(
        (status = 200, description = "The purchase request", body = PurchaseRequestView),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_purchase_request_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PurchaseRequestView>, ApiError> {
    let request = bounded(&state, state.purchase_requests.get(id)).await?;
    Ok(Json(request.into()))
}

#[utoipa::path(
    get,
    path = "/purchase-requests/code/{code}",
    params(
        ("code" = String, Path, description = "Request code, e.g. PR-1700000000000-42"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the calling user.")
    ),
    responses(
        (status = 200, description = "The purchase request", body = PurchaseRequestView),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_purchase_request_by_code_handler(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<PurchaseRequestView>, ApiError> {
    let request = bounded(&state, state.purchase_requests.get_by_code(&code)).await?;
    Ok(Json(request.into()))
}

/// Delete a draft.
#[utoipa::path(
    delete,
    path = "/purchase-requests/{id}",
    params(
        ("id" = Uuid, Path, description = "Purchase request id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the calling user.")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Not a draft"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_purchase_request_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    require(
        &state,
        user_id,
        Capability::ModifyOwnPurchaseRequests,
        ResourceScope::PurchaseRequest(id),
    )
    .await?;
    bounded(&state, state.purchase_requests.delete(id, user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Publish one of the caller's drafts; it becomes `SCHEDULED`.
#[utoipa::path(
    post,
    path = "/purchase-requests/{id}/publish",
    params(
        ("id" = Uuid, Path, description = "Purchase request id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the calling user.")
    ),
    responses(
        (status = 200, description = "Draft published", body = PurchaseRequestView),
        (status = 400, description = "Not a draft"),
        (status = 404, description = "Not found or not owned by the caller")
    )
)]
pub async fn publish_draft_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
) -> Result<Json<PurchaseRequestView>, ApiError> {
    require(
        &state,
        user_id,
        Capability::ModifyOwnPurchaseRequests,
        ResourceScope::PurchaseRequest(id),
    )
    .await?;
    let published = bounded(&state, state.purchase_requests.publish_draft(id, user_id)).await?;
    Ok(Json(published.into()))
}

/// Approve, schedule, reject or finish a purchase request.
#[utoipa::path(
    put,
    path = "/purchase-requests/{id}/status",
    request_body = SetStatusBody,
    params(
        ("id" = Uuid, Path, description = "Purchase request id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the calling user.")
    ),
    responses(
        (status = 200, description = "Status changed", body = PurchaseRequestView),
        (status = 400, description = "Transition not allowed"),
        (status = 403, description = "Missing permission"),
        (status = 404, description = "Not found")
    )
)]
pub async fn set_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
    Json(body): Json<SetStatusBody>,
) -> Result<Json<PurchaseRequestView>, ApiError> {
    require(
        &state,
        user_id,
        Capability::ManageAllPurchaseRequests,
        ResourceScope::PurchaseRequest(id),
    )
    .await?;
    let target = parse_status(&body.status)?;
    let updated = bounded(&state, state.purchase_requests.set_status(id, user_id, target)).await?;
    Ok(Json(updated.into()))
}

#[utoipa::path(
    put,
    path = "/purchase-requests/{id}/deadline",
    request_body = UpdateDeadlineBody,
    params(
        ("id" = Uuid, Path, description = "Purchase request id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the calling user.")
    ),
    responses(
        (status = 200, description = "Deadline updated", body = PurchaseRequestView),
        (status = 400, description = "Request is rejected"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_deadline_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateDeadlineBody>,
) -> Result<Json<PurchaseRequestView>, ApiError> {
    require(
        &state,
        user_id,
        Capability::ModifyOwnPurchaseRequests,
        ResourceScope::PurchaseRequest(id),
    )
    .await?;
    let updated = bounded(
        &state,
        state
            .purchase_requests
            .update_bidding_deadline(id, user_id, body.bidding_deadline),
    )
    .await?;
    Ok(Json(updated.into()))
}

/// Invite companies to bid on a purchase request.
#[utoipa::path(
    post,
    path = "/purchase-requests/{id}/invited-companies",
    request_body = InviteCompaniesBody,
    params(
        ("id" = Uuid, Path, description = "Purchase request id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the calling user.")
    ),
    responses(
        (status = 200, description = "Companies invited", body = [CompanyView]),
        (status = 400, description = "Unknown company in the list"),
        (status = 404, description = "Not found")
    )
)]
pub async fn invite_companies_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
    Json(body): Json<InviteCompaniesBody>,
) -> Result<Json<Vec<CompanyView>>, ApiError> {
    require(
        &state,
        user_id,
        Capability::ModifyOwnPurchaseRequests,
        ResourceScope::PurchaseRequest(id),
    )
    .await?;
    let companies = bounded(
        &state,
        state
            .purchase_requests
            .invite_companies(id, user_id, &body.company_ids),
    )
    .await?;
    Ok(Json(companies.into_iter().map(CompanyView::from).collect()))
}

/// Invite a user to co-manage a purchase request.
#[utoipa::path(
    post,
    path = "/purchase-requests/{id}/agents",
    request_body = InviteAgentBody,
    params(
        ("id" = Uuid, Path, description = "Purchase request id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the calling user.")
    ),
    responses(
        (status = 200, description = "Agent invited", body = PurchaseRequestView),
        (status = 400, description = "Not the owner, rejected request or already an agent"),
        (status = 404, description = "Request or agent not found")
    )
)]
pub async fn invite_agent_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
    Json(body): Json<InviteAgentBody>,
) -> Result<Json<PurchaseRequestView>, ApiError> {
    require(
        &state,
        user_id,
        Capability::ModifyOwnPurchaseRequests,
        ResourceScope::PurchaseRequest(id),
    )
    .await?;
    let updated = bounded(
        &state,
        state.purchase_requests.invite_agent(id, user_id, body.agent_id),
    )
    .await?;
    Ok(Json(updated.into()))
}

//=========================================================================================
// Bid Handlers
//=========================================================================================

/// Submit a bid on behalf of one of the caller's companies.
#[utoipa::path(
    post,
    path = "/purchase-requests/{id}/bids",
    request_body = CreateBidBody,
    params(
        ("id" = Uuid, Path, description = "Purchase request id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the calling user.")
    ),
    responses(
        (status = 201, description = "Bid submitted", body = BidView),
        (status = 400, description = "Duplicate bid or deadline passed"),
        (status = 403, description = "Not eligible or company locked"),
        (status = 404, description = "No open request, or caller not in the company")
    )
)]
pub async fn create_bid_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
    Json(body): Json<CreateBidBody>,
) -> Result<impl IntoResponse, ApiError> {
    require(&state, user_id, Capability::CreateBids, ResourceScope::PurchaseRequest(id)).await?;
    let bid = bounded(&state, state.bids.create_bid(user_id, body.into_input(id))).await?;
    Ok((StatusCode::CREATED, Json(BidView::from(bid))))
}

/// Mark the caller's company as interested in a purchase request.
#[utoipa::path(
    post,
    path = "/purchase-requests/{id}/interest",
    params(
        ("id" = Uuid, Path, description = "Purchase request id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the calling user.")
    ),
    responses(
        (status = 201, description = "Interest recorded", body = BidView),
        (status = 400, description = "Company already interacted with the request"),
        (status = 403, description = "Not eligible"),
        (status = 404, description = "No open request, or caller has no company")
    )
)]
pub async fn show_interest_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require(&state, user_id, Capability::CreateBids, ResourceScope::PurchaseRequest(id)).await?;
    let bid = bounded(&state, state.bids.show_interest(user_id, id)).await?;
    Ok((StatusCode::CREATED, Json(BidView::from(bid))))
}

#[utoipa::path(
    get,
    path = "/purchase-requests/{id}/bids",
    params(
        ("id" = Uuid, Path, description = "Purchase request id"),
        ListBidsQuery,
        ("x-user-id" = Uuid, Header, description = "The unique ID of the calling user.")
    ),
    responses(
        (status = 200, description = "A page of bids", body = BidPageView),
        (status = 404, description = "Not found")
    )
)]
pub async fn list_bids_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListBidsQuery>,
) -> Result<Json<BidPageView>, ApiError> {
    require(&state, user_id, Capability::ReadAllBids, ResourceScope::PurchaseRequest(id)).await?;
    let page = bounded(
        &state,
        state
            .bids
            .list_bids(id, query.page, query.limit, query.reference),
    )
    .await?;
    Ok(Json(page.into()))
}

/// The newest bid of each company.
#[utoipa::path(
    get,
    path = "/purchase-requests/{id}/bids/latest",
    params(
        ("id" = Uuid, Path, description = "Purchase request id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the calling user.")
    ),
    responses(
        (status = 200, description = "One bid per company", body = [BidView]),
        (status = 404, description = "Not found")
    )
)]
pub async fn latest_bids_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<BidView>>, ApiError> {
    require(&state, user_id, Capability::ReadAllBids, ResourceScope::PurchaseRequest(id)).await?;
    let bids = bounded(&state, state.bids.latest_bids(id)).await?;
    Ok(Json(bids.into_iter().map(BidView::from).collect()))
}

#[utoipa::path(
    get,
    path = "/bids/stats",
    responses((status = 200, description = "Bid counters", body = BidStatsView)),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the calling user."))
)]
pub async fn bid_stats_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<BidStatsView>, ApiError> {
    require(&state, user_id, Capability::ReadAllBids, ResourceScope::Global).await?;
    let stats = bounded(&state, state.bids.stats()).await?;
    Ok(Json(stats.into()))
}

//=========================================================================================
// Notification Handlers
//=========================================================================================

/// Notifications visible to the caller, newest first.
#[utoipa::path(
    get,
    path = "/notifications",
    responses((status = 200, description = "The caller's inbox", body = [NotificationView])),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the calling user."))
)]
pub async fn list_notifications_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<NotificationView>>, ApiError> {
    require(&state, user_id, Capability::ReadOwnNotifications, ResourceScope::Global).await?;
    let inbox = bounded(&state, state.notifications.inbox(user_id)).await?;
    Ok(Json(inbox.into_iter().map(NotificationView::from).collect()))
}

#[utoipa::path(
    post,
    path = "/notifications/read",
    responses((status = 200, description = "Number of notifications marked read", body = MarkReadResponse)),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the calling user."))
)]
pub async fn mark_notifications_read_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    require(&state, user_id, Capability::ReadOwnNotifications, ResourceScope::Global).await?;
    let updated = bounded(&state, state.notifications.mark_all_read(user_id)).await?;
    Ok(Json(MarkReadResponse { updated }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_is_case_insensitive() {
        assert_eq!(
            parse_status(" published ").unwrap(),
            PurchaseRequestStatus::Published
        );
        assert!(matches!(
            parse_status("ARCHIVED"),
            Err(ApiError::BadRequest(_))
        ));
    }
}
