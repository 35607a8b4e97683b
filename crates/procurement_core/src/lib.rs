pub mod bids;
pub mod codes;
pub mod context;
pub mod domain;
pub mod eligibility;
pub mod error;
pub mod memory;
pub mod notifications;
pub mod ports;
pub mod purchase_requests;

pub use bids::{BidManager, NewBid};
pub use context::ProcurementContext;
pub use domain::{
    Audience, Bid, BidStats, BidStatus, Company, Notification, NotificationKind, Page,
    PurchaseRequest, PurchaseRequestStatus, Visibility,
};
pub use error::{ProcurementError, ProcurementResult};
pub use notifications::{NotificationPayload, NotificationService};
pub use ports::{
    AuditRepository, Capability, CapabilityChecker, MailSender, PortError, PortResult,
    ProcurementStore, PushTransport, ResourceScope, StoreTransaction,
};
pub use purchase_requests::{DraftPurchaseRequest, NewPurchaseRequest, PurchaseRequestManager};
