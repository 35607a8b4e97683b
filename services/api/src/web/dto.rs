//! services/api/src/web/dto.rs
//!
//! JSON payloads accepted and returned by the REST API. Domain types stay free of
//! serialization concerns; these views are the wire format.

use chrono::{DateTime, Utc};
use procurement_core::domain::{Bid, BidStats, Company, Document, Notification, Page, PurchaseRequest};
use procurement_core::{DraftPurchaseRequest, NewBid, NewPurchaseRequest, Visibility};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;

fn parse_visibility(raw: Option<String>) -> Result<Option<Visibility>, ApiError> {
    raw.map(|v| {
        v.parse::<Visibility>()
            .map_err(|_| ApiError::BadRequest(format!("Invalid visibility '{}'", v)))
    })
    .transpose()
}

//=========================================================================================
// Request Payloads
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreatePurchaseRequestBody {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub department_id: Uuid,
    pub delivery_date: DateTime<Utc>,
    pub delivery_address: String,
    pub bidding_deadline: DateTime<Utc>,
    /// `PUBLIC` (default) or `PRIVATE`.
    pub visibility: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Uuid>,
}

impl CreatePurchaseRequestBody {
    pub fn into_input(self) -> Result<NewPurchaseRequest, ApiError> {
        if self.title.trim().is_empty() {
            return Err(ApiError::BadRequest("Title is required".to_string()));
        }
        Ok(NewPurchaseRequest {
            visibility: parse_visibility(self.visibility)?,
            title: self.title,
            description: self.description,
            category: self.category,
            department_id: self.department_id,
            delivery_date: self.delivery_date,
            delivery_address: self.delivery_address,
            bidding_deadline: self.bidding_deadline,
            attachments: self.attachments,
        })
    }
}

#[derive(Deserialize, ToSchema, Default)]
pub struct CreateDraftBody {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub department_id: Option<Uuid>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub delivery_address: Option<String>,
    pub bidding_deadline: Option<DateTime<Utc>>,
    pub visibility: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Uuid>,
}

impl CreateDraftBody {
    pub fn into_input(self) -> Result<DraftPurchaseRequest, ApiError> {
        Ok(DraftPurchaseRequest {
            visibility: parse_visibility(self.visibility)?,
            title: self.title,
            description: self.description,
            category: self.category,
            department_id: self.department_id,
            delivery_date: self.delivery_date,
            delivery_address: self.delivery_address,
            bidding_deadline: self.bidding_deadline,
            attachments: self.attachments,
        })
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SetStatusBody {
    /// One of `REJECTED`, `FINISHED`, `PUBLISHED`, `SCHEDULED`.
    pub status: String,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateDeadlineBody {
    pub bidding_deadline: DateTime<Utc>,
}

#[derive(Deserialize, ToSchema)]
pub struct InviteCompaniesBody {
    pub company_ids: Vec<Uuid>,
}

#[derive(Deserialize, ToSchema)]
pub struct InviteAgentBody {
    pub agent_id: Uuid,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateBidBody {
    pub company_id: Uuid,
    pub description: Option<String>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub delivery_address: Option<String>,
    pub bidding_date: Option<DateTime<Utc>>,
    pub bidding_address: Option<String>,
}

impl CreateBidBody {
    pub fn into_input(self, purchase_request_id: Uuid) -> NewBid {
        NewBid {
            purchase_request_id,
            company_id: self.company_id,
            description: self.description,
            delivery_date: self.delivery_date,
            delivery_address: self.delivery_address,
            bidding_date: self.bidding_date,
            bidding_address: self.bidding_address,
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListPurchaseRequestsQuery {
    /// Restrict to one status.
    pub status: Option<String>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListBidsQuery {
    /// 1-based page number.
    pub page: Option<u32>,
    /// Page size, clamped to 1..=100.
    pub limit: Option<u32>,
    /// Case-insensitive substring of the bid reference.
    pub reference: Option<String>,
}

//=========================================================================================
// Response Views
//=========================================================================================

#[derive(Serialize, ToSchema, Clone)]
pub struct DocumentView {
    pub id: Uuid,
    pub name: String,
    pub is_linked: bool,
}

impl From<Document> for DocumentView {
    fn from(d: Document) -> Self {
        Self {
            id: d.id,
            name: d.name,
            is_linked: d.is_linked,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PurchaseRequestView {
    pub id: Uuid,
    pub request_code: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub visibility: String,
    pub status: String,
    pub owner_id: Uuid,
    pub department_id: Option<Uuid>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub delivery_address: Option<String>,
    pub bidding_deadline: Option<DateTime<Utc>>,
    pub bidding_date: Option<DateTime<Utc>>,
    pub bidding_address: Option<String>,
    pub invited_companies: Vec<Uuid>,
    pub agents: Vec<Uuid>,
    pub documents: Vec<DocumentView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PurchaseRequest> for PurchaseRequestView {
    fn from(pr: PurchaseRequest) -> Self {
        Self {
            id: pr.id,
            request_code: pr.request_code,
            title: pr.title,
            description: pr.description,
            category: pr.category,
            visibility: pr.visibility.as_str().to_string(),
            status: pr.status.as_str().to_string(),
            owner_id: pr.owner_id,
            department_id: pr.department_id,
            delivery_date: pr.delivery_date,
            delivery_address: pr.delivery_address,
            bidding_deadline: pr.bidding_deadline,
            bidding_date: pr.bidding_date,
            bidding_address: pr.bidding_address,
            invited_companies: pr.invited_companies,
            agents: pr.agents,
            documents: pr.documents.into_iter().map(DocumentView::from).collect(),
            created_at: pr.created_at,
            updated_at: pr.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct BidView {
    pub id: Uuid,
    pub reference: String,
    pub status: String,
    pub description: Option<String>,
    pub company_id: Uuid,
    pub purchase_request_id: Uuid,
    pub delivery_date: Option<DateTime<Utc>>,
    pub delivery_address: Option<String>,
    pub bidding_date: Option<DateTime<Utc>>,
    pub bidding_address: Option<String>,
    pub chat_id: Option<Uuid>,
    pub feedback_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<Bid> for BidView {
    fn from(bid: Bid) -> Self {
        Self {
            id: bid.id,
            reference: bid.reference,
            status: bid.status.as_str().to_string(),
            description: bid.description,
            company_id: bid.company_id,
            purchase_request_id: bid.purchase_request_id,
            delivery_date: bid.delivery_date,
            delivery_address: bid.delivery_address,
            bidding_date: bid.bidding_date,
            bidding_address: bid.bidding_address,
            chat_id: bid.chat_id,
            feedback_id: bid.feedback_id,
            created_at: bid.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct BidPageView {
    pub items: Vec<BidView>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl From<Page<Bid>> for BidPageView {
    fn from(page: Page<Bid>) -> Self {
        Self {
            items: page.items.into_iter().map(BidView::from).collect(),
            total: page.total,
            page: page.page,
            limit: page.limit,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct BidStatsView {
    pub total: u64,
    pub won: u64,
    pub pending: u64,
    pub rejected: u64,
    pub closed: u64,
}

impl From<BidStats> for BidStatsView {
    fn from(stats: BidStats) -> Self {
        Self {
            total: stats.total,
            won: stats.won,
            pending: stats.pending,
            rejected: stats.rejected,
            closed: stats.closed,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CompanyView {
    pub id: Uuid,
    pub legal_name: String,
}

impl From<Company> for CompanyView {
    fn from(company: Company) -> Self {
        Self {
            id: company.id,
            legal_name: company.legal_name,
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct NotificationView {
    pub id: Uuid,
    pub kind: String,
    pub message: String,
    pub status: String,
    pub is_public: bool,
    pub recipients: Vec<Uuid>,
    pub creator_id: Option<Uuid>,
    pub bid_id: Option<Uuid>,
    pub purchase_request_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationView {
    fn from(n: Notification) -> Self {
        Self {
            is_public: n.is_public(),
            recipients: n.recipients().to_vec(),
            id: n.id,
            kind: n.kind.as_str().to_string(),
            message: n.message,
            status: n.status.as_str().to_string(),
            creator_id: n.creator_id,
            bid_id: n.bid_id,
            purchase_request_id: n.purchase_request_id,
            created_at: n.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct MarkReadResponse {
    pub updated: u64,
}
