//! crates/procurement_core/src/domain.rs
//!
//! Defines the pure, core data structures of the procurement workflow.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Labelled Enums
//=========================================================================================

/// Raised when a stored label does not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub value: String,
}

/// Declares an enum whose variants map one-to-one onto the upper-case labels used
/// in storage, audit messages and the wire format.
macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownLabel;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($label => Ok($name::$variant),)+
                    other => Err(UnknownLabel {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

labelled_enum! {
    /// Lifecycle state of a purchase request.
    PurchaseRequestStatus {
        Draft => "DRAFT",
        WaitingForApproval => "WAITING_FOR_APPROVAL",
        Scheduled => "SCHEDULED",
        Published => "PUBLISHED",
        Rejected => "REJECTED",
        Finished => "FINISHED",
    }
}

labelled_enum! {
    /// Who may interact with a purchase request.
    Visibility {
        Public => "PUBLIC",
        /// Only companies on the invite list.
        Private => "PRIVATE",
    }
}

labelled_enum! {
    BidStatus {
        Pending => "PENDING",
        ShowedInterest => "SHOWED_INTEREST",
        Updated => "UPDATED",
        Awarded => "AWARDED",
        Disqualified => "DISQUALIFIED",
        Expired => "EXPIRED",
    }
}

labelled_enum! {
    CompanyStatus {
        Active => "ACTIVE",
        Locked => "LOCKED",
    }
}

labelled_enum! {
    /// Business event a notification reports.
    NotificationKind {
        NewPurchaseRequest => "NEW_PURCHASE_REQUEST",
        PurchaseRequestUpdate => "PURCHASE_REQUEST_UPDATE",
        BidInvitation => "BID_INVITATION",
        ManageInvitation => "MANAGE_INVITATION",
        NewBid => "NEW_BID",
    }
}

labelled_enum! {
    NotificationStatus {
        Unread => "UNREAD",
        Read => "READ",
    }
}

labelled_enum! {
    /// Category of an audit log entry.
    AuditKind {
        PurchaseRequest => "PURCHASE_REQUEST",
        Bid => "BID",
    }
}

impl PurchaseRequestStatus {
    /// Statuses under which suppliers may bid or show interest.
    pub const OPEN_FOR_BIDDING: [PurchaseRequestStatus; 2] =
        [PurchaseRequestStatus::Published, PurchaseRequestStatus::Scheduled];

    /// Targets accepted by an explicit status change.
    pub const SETTABLE: [PurchaseRequestStatus; 4] = [
        PurchaseRequestStatus::Rejected,
        PurchaseRequestStatus::Finished,
        PurchaseRequestStatus::Published,
        PurchaseRequestStatus::Scheduled,
    ];

    pub fn is_open_for_bidding(&self) -> bool {
        Self::OPEN_FOR_BIDDING.contains(self)
    }

    /// Whether the request still sits before approval (draft or pending review).
    pub fn is_pre_approval(&self) -> bool {
        matches!(
            self,
            PurchaseRequestStatus::Draft | PurchaseRequestStatus::WaitingForApproval
        )
    }
}

impl BidStatus {
    /// Soft states never block a real submission from the same company.
    pub fn is_soft(&self) -> bool {
        matches!(self, BidStatus::ShowedInterest | BidStatus::Disqualified)
    }
}

//=========================================================================================
// Directory Entities
//=========================================================================================

/// A platform user. Supplier users belong to at most one company.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
    pub company_id: Option<Uuid>,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct Company {
    pub id: Uuid,
    pub legal_name: String,
    pub status: CompanyStatus,
    pub lock_reason: Option<String>,
    /// The member who registered the company. Bid confirmations are mailed here.
    pub owner_id: Option<Uuid>,
}

impl Company {
    pub fn is_locked(&self) -> bool {
        self.status == CompanyStatus::Locked
    }
}

/// The buying department a purchase request is raised for.
#[derive(Debug, Clone)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
}

/// An uploaded file. Unlinked documents are reaped by a janitor elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub is_linked: bool,
}

//=========================================================================================
// Purchase Requests & Bids
//=========================================================================================

#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    pub id: Uuid,
    pub request_code: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub visibility: Visibility,
    pub status: PurchaseRequestStatus,
    pub owner_id: Uuid,
    pub department_id: Option<Uuid>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub delivery_address: Option<String>,
    pub bidding_deadline: Option<DateTime<Utc>>,
    pub bidding_date: Option<DateTime<Utc>>,
    pub bidding_address: Option<String>,
    pub invited_companies: Vec<Uuid>,
    pub agents: Vec<Uuid>,
    pub documents: Vec<Document>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseRequest {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }

    pub fn is_invited(&self, company_id: Uuid) -> bool {
        self.invited_companies.contains(&company_id)
    }

    pub fn has_agent(&self, agent_id: Uuid) -> bool {
        self.agents.contains(&agent_id)
    }

    /// A request without a deadline (e.g. a published draft) never expires.
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.bidding_deadline.map_or(false, |deadline| now > deadline)
    }
}

/// A supplier's response to a purchase request, or a lightweight interest marker.
#[derive(Debug, Clone)]
pub struct Bid {
    pub id: Uuid,
    pub reference: String,
    pub status: BidStatus,
    pub description: Option<String>,
    pub company_id: Uuid,
    pub purchase_request_id: Uuid,
    pub delivery_date: Option<DateTime<Utc>>,
    pub delivery_address: Option<String>,
    pub bidding_date: Option<DateTime<Utc>>,
    pub bidding_address: Option<String>,
    // Filled in later by the chat and feedback subsystems.
    pub chat_id: Option<Uuid>,
    pub feedback_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bid {
    pub fn blocks_resubmission(&self) -> bool {
        !self.status.is_soft()
    }
}

/// Aggregate bid counters for dashboards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BidStats {
    pub total: u64,
    pub won: u64,
    pub pending: u64,
    pub rejected: u64,
    pub closed: u64,
}

impl BidStats {
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = BidStatus>,
    {
        let mut stats = BidStats::default();
        for status in statuses {
            stats.total += 1;
            match status {
                BidStatus::Awarded => stats.won += 1,
                BidStatus::Pending => stats.pending += 1,
                BidStatus::Disqualified => stats.rejected += 1,
                _ => {}
            }
        }
        // An awarded bid is what closes a request.
        stats.closed = stats.won;
        stats
    }
}

/// One page of a larger result set.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

//=========================================================================================
// Notifications & Audit
//=========================================================================================

/// Resolved audience of a notification. Exactly one strategy applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Broadcast to every connected recipient.
    Public,
    /// Delivered individually to each listed user. Never empty.
    Recipients(Vec<Uuid>),
    /// Falls back to the creator, if there is one.
    Creator,
}

/// A persisted notification. Immutable once created.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    /// Read state for the user the notification was loaded for. Each user reads a
    /// shared notification independently.
    pub status: NotificationStatus,
    pub audience: Audience,
    pub creator_id: Option<Uuid>,
    pub bid_id: Option<Uuid>,
    pub purchase_request_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_public(&self) -> bool {
        self.audience == Audience::Public
    }

    pub fn recipients(&self) -> &[Uuid] {
        match &self.audience {
            Audience::Recipients(users) => users,
            _ => &[],
        }
    }

    /// Whether the notification belongs in `user_id`'s inbox.
    pub fn is_visible_to(&self, user_id: Uuid) -> bool {
        match &self.audience {
            Audience::Public => true,
            Audience::Recipients(users) => users.contains(&user_id),
            Audience::Creator => self.creator_id == Some(user_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub kind: AuditKind,
    pub message: String,
    pub actor_id: Uuid,
}

impl AuditEntry {
    pub fn new(kind: AuditKind, message: impl Into<String>, actor_id: Uuid) -> Self {
        Self {
            kind,
            message: message.into(),
            actor_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_through_from_str() {
        for status in PurchaseRequestStatus::ALL {
            assert_eq!(status.as_str().parse::<PurchaseRequestStatus>(), Ok(*status));
        }
        let err = "ARCHIVED".parse::<PurchaseRequestStatus>().unwrap_err();
        assert_eq!(err.kind, "PurchaseRequestStatus");
    }

    #[test]
    fn only_interest_and_disqualified_are_soft() {
        let soft: Vec<_> = BidStatus::ALL.iter().filter(|s| s.is_soft()).collect();
        assert_eq!(soft, vec![&BidStatus::ShowedInterest, &BidStatus::Disqualified]);
    }

    #[test]
    fn bid_stats_count_by_status() {
        let stats = BidStats::from_statuses([
            BidStatus::Pending,
            BidStatus::Awarded,
            BidStatus::Disqualified,
            BidStatus::ShowedInterest,
            BidStatus::Pending,
        ]);
        assert_eq!(
            stats,
            BidStats {
                total: 5,
                won: 1,
                pending: 2,
                rejected: 1,
                closed: 1,
            }
        );
    }

    #[test]
    fn creator_audience_is_visible_only_to_creator() {
        let creator = Uuid::new_v4();
        let notification = Notification {
            id: Uuid::new_v4(),
            kind: NotificationKind::NewBid,
            message: "hello".to_string(),
            status: NotificationStatus::Unread,
            audience: Audience::Creator,
            creator_id: Some(creator),
            bid_id: None,
            purchase_request_id: None,
            created_at: Utc::now(),
        };
        assert!(notification.is_visible_to(creator));
        assert!(!notification.is_visible_to(Uuid::new_v4()));
        assert!(notification.recipients().is_empty());
    }
}
