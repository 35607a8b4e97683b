//! crates/procurement_core/src/bids.rs
//!
//! Bid submission, interest markers and bid read models.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::codes;
use crate::context::ProcurementContext;
use crate::domain::{
    AuditEntry, AuditKind, Bid, BidStats, BidStatus, NotificationKind, Page, PurchaseRequest,
};
use crate::eligibility;
use crate::error::{ProcurementError, ProcurementResult};
use crate::notifications::NotificationPayload;
use crate::ports::{
    BidRepository, BidSearch, DirectoryRepository, MailTemplate, OutboundMail, PortError,
    PurchaseRequestRepository, StoreTransaction,
};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

const DUPLICATE_BID: &str = "Your company has already submitted a bid for this purchase request";

/// A full bid submission.
#[derive(Debug, Clone)]
pub struct NewBid {
    pub purchase_request_id: Uuid,
    pub company_id: Uuid,
    pub description: Option<String>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub delivery_address: Option<String>,
    pub bidding_date: Option<DateTime<Utc>>,
    pub bidding_address: Option<String>,
}

#[derive(Clone)]
pub struct BidManager {
    ctx: ProcurementContext,
}

impl BidManager {
    pub fn new(ctx: ProcurementContext) -> Self {
        Self { ctx }
    }

    /// Submits a `PENDING` bid on behalf of one of the caller's companies.
    ///
    /// Everything up to the commit is atomic. The owner notification and the
    /// confirmation mail run afterwards and never fail the submission.
    pub async fn create_bid(&self, user_id: Uuid, input: NewBid) -> ProcurementResult<Bid> {
        let mut tx = self.ctx.store.begin().await?;

        let request =
            validate_request_visibility(tx.as_mut(), input.purchase_request_id, input.company_id)
                .await?;

        let company = tx
            .find_company_for_member(input.company_id, user_id)
            .await?
            .ok_or_else(|| {
                ProcurementError::not_found(format!(
                    "No company with ID {} found associated with this user.",
                    input.company_id
                ))
            })?;

        if company.is_locked() {
            let reason = company.lock_reason.as_deref().unwrap_or("no reason given");
            return Err(ProcurementError::forbidden(format!(
                "Cannot create bid: Company is locked - {}",
                reason
            )));
        }

        let existing = tx.bids_for_company(request.id, company.id).await?;
        if existing.iter().any(Bid::blocks_resubmission) {
            return Err(ProcurementError::bad_request(DUPLICATE_BID));
        }

        let now = Utc::now();
        if request.deadline_passed(now) {
            return Err(ProcurementError::bad_request("Bidding deadline has passed"));
        }

        let bid = Bid {
            id: Uuid::new_v4(),
            reference: codes::bid_reference(),
            status: BidStatus::Pending,
            description: input.description,
            company_id: company.id,
            purchase_request_id: request.id,
            delivery_date: input.delivery_date,
            delivery_address: input.delivery_address,
            bidding_date: input.bidding_date,
            bidding_address: input.bidding_address,
            chat_id: None,
            feedback_id: None,
            created_at: now,
            updated_at: now,
        };
        insert_bid(tx.as_mut(), &bid).await?;

        self.ctx
            .audit(
                tx.as_mut(),
                AuditEntry::new(
                    AuditKind::Bid,
                    format!(
                        "Bid {} submitted by {} for purchase request \"{}\"",
                        bid.reference, company.legal_name, request.title
                    ),
                    user_id,
                ),
            )
            .await?;
        tx.commit().await?;
        info!(
            "Bid {} created for purchase request {}",
            bid.reference, request.request_code
        );

        self.ctx
            .notify_after_commit(
                NotificationPayload::new(
                    NotificationKind::NewBid,
                    format!(
                        "{} submitted a new bid on \"{}\"",
                        company.legal_name, request.title
                    ),
                )
                .from_creator(user_id)
                .to_users(vec![request.owner_id])
                .with_bid(bid.id)
                .with_purchase_request(request.id),
            )
            .await;
        self.ctx
            .mail_after_commit(OutboundMail {
                template: MailTemplate::BidCreated,
                recipient_id: company.owner_id.unwrap_or(user_id),
                purchase_request_id: Some(request.id),
                bid_id: Some(bid.id),
            })
            .await;

        Ok(bid)
    }

    /// Records a `SHOWED_INTEREST` marker for the caller's company. Any earlier bid,
    /// whatever its status, blocks this.
    pub async fn show_interest(
        &self,
        user_id: Uuid,
        purchase_request_id: Uuid,
    ) -> ProcurementResult<Bid> {
        let mut tx = self.ctx.store.begin().await?;

        let company = tx.find_company_of_user(user_id).await?.ok_or_else(|| {
            ProcurementError::not_found(format!(
                "No company found associated with user {}",
                user_id
            ))
        })?;
        let request =
            validate_request_visibility(tx.as_mut(), purchase_request_id, company.id).await?;

        if !tx.bids_for_company(request.id, company.id).await?.is_empty() {
            return Err(ProcurementError::bad_request(
                "Your company has already shown interest or bid on this purchase request",
            ));
        }

        let now = Utc::now();
        let bid = Bid {
            id: Uuid::new_v4(),
            reference: codes::bid_reference(),
            status: BidStatus::ShowedInterest,
            description: None,
            company_id: company.id,
            purchase_request_id: request.id,
            delivery_date: None,
            delivery_address: None,
            bidding_date: None,
            bidding_address: None,
            chat_id: None,
            feedback_id: None,
            created_at: now,
            updated_at: now,
        };
        insert_bid(tx.as_mut(), &bid).await?;

        self.ctx
            .audit(
                tx.as_mut(),
                AuditEntry::new(
                    AuditKind::Bid,
                    format!(
                        "{} showed interest in purchase request \"{}\"",
                        company.legal_name, request.title
                    ),
                    user_id,
                ),
            )
            .await?;
        tx.commit().await?;
        info!(
            "Company {} showed interest in {}",
            company.id, request.request_code
        );
        Ok(bid)
    }

    /// The newest bid of each company on a request, newest first.
    pub async fn latest_bids(&self, purchase_request_id: Uuid) -> ProcurementResult<Vec<Bid>> {
        let mut tx = self.ctx.store.begin().await?;
        require_request(tx.as_mut(), purchase_request_id).await?;

        let mut seen = HashSet::new();
        let latest = tx
            .bids_for_request(purchase_request_id)
            .await?
            .into_iter()
            .filter(|bid| seen.insert(bid.company_id))
            .collect();
        Ok(latest)
    }

    /// A page of a request's bids, optionally filtered by reference.
    pub async fn list_bids(
        &self,
        purchase_request_id: Uuid,
        page: Option<u32>,
        limit: Option<u32>,
        reference: Option<String>,
    ) -> ProcurementResult<Page<Bid>> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let reference = reference
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let mut tx = self.ctx.store.begin().await?;
        require_request(tx.as_mut(), purchase_request_id).await?;

        let search = BidSearch {
            reference,
            offset: u64::from(page - 1) * u64::from(limit),
            limit: u64::from(limit),
        };
        let (items, total) = tx.search_bids(purchase_request_id, &search).await?;
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    pub async fn stats(&self) -> ProcurementResult<BidStats> {
        let mut tx = self.ctx.store.begin().await?;
        let statuses = tx.bid_statuses().await?;
        Ok(BidStats::from_statuses(statuses))
    }
}

/// Loads the request under a row lock, restricted to the statuses that accept bids,
/// and checks that the company may act on it.
pub async fn validate_request_visibility(
    tx: &mut dyn StoreTransaction,
    purchase_request_id: Uuid,
    company_id: Uuid,
) -> ProcurementResult<PurchaseRequest> {
    let request = tx
        .lock_purchase_request(purchase_request_id)
        .await?
        .filter(eligibility::is_open_for_bidding)
        .ok_or_else(|| {
            ProcurementError::not_found(format!(
                "Open purchase request with ID {} not found.",
                purchase_request_id
            ))
        })?;

    if !eligibility::can_act(&request, company_id) {
        return Err(ProcurementError::forbidden(
            "Your company is not invited to this private purchase request",
        ));
    }
    Ok(request)
}

async fn require_request(
    tx: &mut dyn StoreTransaction,
    purchase_request_id: Uuid,
) -> ProcurementResult<()> {
    match tx.find_purchase_request(purchase_request_id).await? {
        Some(_) => Ok(()),
        None => Err(ProcurementError::not_found(format!(
            "Purchase request with ID {} not found",
            purchase_request_id
        ))),
    }
}

/// The store's uniqueness backstop reports a racing duplicate as a conflict.
async fn insert_bid(tx: &mut dyn StoreTransaction, bid: &Bid) -> ProcurementResult<()> {
    match tx.insert_bid(bid).await {
        Ok(()) => Ok(()),
        Err(PortError::Conflict(detail)) => {
            warn!(
                "Duplicate bid from company {} on {} rejected by store: {}",
                bid.company_id, bid.purchase_request_id, detail
            );
            Err(ProcurementError::bad_request(DUPLICATE_BID))
        }
        Err(e) => Err(e.into()),
    }
}
