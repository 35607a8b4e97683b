//! crates/procurement_core/src/ports.rs
//!
//! Defines the service contracts (traits) the procurement core depends on.
//! These traits form the boundary of the hexagonal architecture: persistence, audit,
//! mail, real-time push and capability checks are all provided from the outside.
//! Audit entries are part of the persistence transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AuditEntry, Bid, BidStatus, Company, Department, Document, Notification, PurchaseRequest,
    PurchaseRequestStatus,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Persistence Ports
//=========================================================================================

/// Entry point to the persistence layer.
#[async_trait]
pub trait ProcurementStore: Send + Sync {
    /// Opens a transaction. Dropping the returned handle without calling
    /// [`StoreTransaction::commit`] rolls every write back.
    async fn begin(&self) -> PortResult<Box<dyn StoreTransaction>>;
}

/// A unit of work spanning every repository. All reads an operation makes go through it.
#[async_trait]
pub trait StoreTransaction:
    PurchaseRequestRepository
    + BidRepository
    + DirectoryRepository
    + DocumentRepository
    + NotificationRepository
    + AuditRepository
    + Send
{
    async fn commit(self: Box<Self>) -> PortResult<()>;
}

#[async_trait]
pub trait PurchaseRequestRepository: Send {
    async fn insert_purchase_request(&mut self, request: &PurchaseRequest) -> PortResult<()>;

    async fn request_code_exists(&mut self, code: &str) -> PortResult<bool>;

    async fn find_purchase_request(&mut self, id: Uuid) -> PortResult<Option<PurchaseRequest>>;

    /// Like `find_purchase_request`, but holds a row lock until the transaction ends.
    async fn lock_purchase_request(&mut self, id: Uuid) -> PortResult<Option<PurchaseRequest>>;

    async fn find_purchase_request_by_code(
        &mut self,
        code: &str,
    ) -> PortResult<Option<PurchaseRequest>>;

    async fn list_purchase_requests(
        &mut self,
        owner_id: Uuid,
        status: Option<PurchaseRequestStatus>,
    ) -> PortResult<Vec<PurchaseRequest>>;

    async fn update_purchase_request_status(
        &mut self,
        id: Uuid,
        status: PurchaseRequestStatus,
    ) -> PortResult<()>;

    async fn update_bidding_deadline(
        &mut self,
        id: Uuid,
        deadline: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn delete_purchase_request(&mut self, id: Uuid) -> PortResult<()>;

    /// Adds companies to the invite list. Already-invited companies are left as they are.
    async fn add_invited_companies(&mut self, id: Uuid, company_ids: &[Uuid]) -> PortResult<()>;

    async fn add_agent(&mut self, id: Uuid, agent_id: Uuid) -> PortResult<()>;

    async fn attach_documents(&mut self, id: Uuid, document_ids: &[Uuid]) -> PortResult<()>;
}

/// Filter for paginated bid listings.
#[derive(Debug, Clone, Default)]
pub struct BidSearch {
    /// Case-insensitive substring of the bid reference.
    pub reference: Option<String>,
    pub offset: u64,
    pub limit: u64,
}

#[async_trait]
pub trait BidRepository: Send {
    /// Fails with `PortError::Conflict` when the company already holds a blocking bid.
    async fn insert_bid(&mut self, bid: &Bid) -> PortResult<()>;

    async fn bids_for_company(
        &mut self,
        purchase_request_id: Uuid,
        company_id: Uuid,
    ) -> PortResult<Vec<Bid>>;

    /// All bids of a request, newest first.
    async fn bids_for_request(&mut self, purchase_request_id: Uuid) -> PortResult<Vec<Bid>>;

    /// A page of a request's bids, newest first, with the unpaginated total.
    async fn search_bids(
        &mut self,
        purchase_request_id: Uuid,
        search: &BidSearch,
    ) -> PortResult<(Vec<Bid>, u64)>;

    async fn bid_statuses(&mut self) -> PortResult<Vec<BidStatus>>;
}

/// Company/user directory and static reference data.
#[async_trait]
pub trait DirectoryRepository: Send {
    async fn find_department(&mut self, id: Uuid) -> PortResult<Option<Department>>;

    /// The company, but only when `user_id` is one of its members. Locks the row.
    async fn find_company_for_member(
        &mut self,
        company_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<Company>>;

    async fn find_company_of_user(&mut self, user_id: Uuid) -> PortResult<Option<Company>>;

    async fn find_companies(&mut self, ids: &[Uuid]) -> PortResult<Vec<Company>>;

    async fn active_member_ids(&mut self, company_id: Uuid) -> PortResult<Vec<Uuid>>;

    async fn user_exists(&mut self, user_id: Uuid) -> PortResult<bool>;
}

/// Outcome of resolving a batch of document ids.
#[derive(Debug, Clone)]
pub struct DocumentResolution {
    pub documents: Vec<Document>,
    pub all_found: bool,
}

#[async_trait]
pub trait DocumentRepository: Send {
    async fn resolve_documents(&mut self, ids: &[Uuid]) -> PortResult<DocumentResolution>;

    /// Marks a document as linked so the janitor does not reap it.
    async fn mark_document_linked(&mut self, id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait NotificationRepository: Send {
    async fn insert_notification(&mut self, notification: &Notification) -> PortResult<()>;

    /// Notifications visible to the user, newest first.
    async fn notifications_for_user(&mut self, user_id: Uuid) -> PortResult<Vec<Notification>>;

    /// Marks every notification visible to the user as read for that user only.
    /// Returns how many were unread for them.
    async fn mark_notifications_read(&mut self, user_id: Uuid) -> PortResult<u64>;
}

/// The audit trail. Entries commit or roll back with the rest of the operation.
#[async_trait]
pub trait AuditRepository: Send {
    async fn insert_audit_entry(&mut self, entry: &AuditEntry) -> PortResult<()>;
}

//=========================================================================================
// Collaborator Ports
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailTemplate {
    BidCreated,
    InvitedToManagePurchaseRequest,
}

impl MailTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            MailTemplate::BidCreated => "bid_created",
            MailTemplate::InvitedToManagePurchaseRequest => "invited_to_manage_purchase_request",
        }
    }
}

/// A templated mail addressed to one user. Rendering happens downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMail {
    pub template: MailTemplate,
    pub recipient_id: Uuid,
    pub purchase_request_id: Option<Uuid>,
    pub bid_id: Option<Uuid>,
}

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: OutboundMail) -> PortResult<()>;
}

/// Event name used for notification pushes.
pub const NOTIFICATION_EVENT: &str = "notification";

/// Real-time transport to connected clients. Disconnected users are skipped silently.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn push_to_user(
        &self,
        user_id: Uuid,
        event: &str,
        notification: &Notification,
    ) -> PortResult<()>;

    async fn push_to_all(&self, event: &str, notification: &Notification) -> PortResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    CreatePurchaseRequests,
    ModifyOwnPurchaseRequests,
    ManageAllPurchaseRequests,
    CreateBids,
    ReadAllBids,
    ReadOwnNotifications,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::CreatePurchaseRequests => "create_purchase_requests",
            Capability::ModifyOwnPurchaseRequests => "modify_own_purchase_requests",
            Capability::ManageAllPurchaseRequests => "manage_all_purchase_requests",
            Capability::CreateBids => "create_bids",
            Capability::ReadAllBids => "read_all_bids",
            Capability::ReadOwnNotifications => "read_own_notifications",
        }
    }
}

/// The resource a capability is being exercised on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
    Global,
    PurchaseRequest(Uuid),
}

#[async_trait]
pub trait CapabilityChecker: Send + Sync {
    async fn has_capability(
        &self,
        user_id: Uuid,
        capability: Capability,
        scope: ResourceScope,
    ) -> PortResult<bool>;
}
