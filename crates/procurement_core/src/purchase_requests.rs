//! crates/procurement_core/src/purchase_requests.rs
//!
//! The purchase request state machine.
//!
//! ```text
//! DRAFT ──publish──▶ SCHEDULED
//!   │ └──────────────┐
//!   ▼                ▼
//! WAITING_FOR_APPROVAL ──set status──▶ PUBLISHED | SCHEDULED | REJECTED
//! any ──set status──▶ FINISHED
//! ```
//!
//! Every mutation runs in one store transaction that is dropped (rolled back) on any
//! early return. Notifications and mail go out only after the commit.

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::codes::{self, CodeSpace};
use crate::context::ProcurementContext;
use crate::domain::{
    AuditEntry, AuditKind, Company, NotificationKind, PurchaseRequest, PurchaseRequestStatus,
    Visibility,
};
use crate::error::{ProcurementError, ProcurementResult};
use crate::notifications::NotificationPayload;
use crate::ports::{
    DirectoryRepository, DocumentRepository, MailTemplate, OutboundMail,
    PurchaseRequestRepository, StoreTransaction,
};

//=========================================================================================
// Inputs
//=========================================================================================

/// A complete purchase request, submitted for approval.
#[derive(Debug, Clone)]
pub struct NewPurchaseRequest {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub department_id: Uuid,
    pub delivery_date: DateTime<Utc>,
    pub delivery_address: String,
    pub bidding_deadline: DateTime<Utc>,
    /// Defaults to `PUBLIC`.
    pub visibility: Option<Visibility>,
    pub attachments: Vec<Uuid>,
}

/// A work-in-progress request; every field may still be missing.
#[derive(Debug, Clone, Default)]
pub struct DraftPurchaseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub department_id: Option<Uuid>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub delivery_address: Option<String>,
    pub bidding_deadline: Option<DateTime<Utc>>,
    pub visibility: Option<Visibility>,
    pub attachments: Vec<Uuid>,
}

const DRAFT_TITLE: &str = "No title";

//=========================================================================================
// Manager
//=========================================================================================

#[derive(Clone)]
pub struct PurchaseRequestManager {
    ctx: ProcurementContext,
}

impl PurchaseRequestManager {
    pub fn new(ctx: ProcurementContext) -> Self {
        Self { ctx }
    }

    /// Creates a full request in `WAITING_FOR_APPROVAL`.
    pub async fn create(
        &self,
        owner_id: Uuid,
        input: NewPurchaseRequest,
    ) -> ProcurementResult<PurchaseRequest> {
        let now = Utc::now();
        if input.bidding_deadline <= now {
            return Err(ProcurementError::bad_request(
                "Bidding deadline must be in the future",
            ));
        }

        let mut tx = self.ctx.store.begin().await?;
        let department = tx
            .find_department(input.department_id)
            .await?
            .ok_or_else(|| ProcurementError::not_found("Department not found"))?;
        let request_code = codes::unique_request_code(tx.as_mut(), CodeSpace::Request).await?;

        let request = PurchaseRequest {
            id: Uuid::new_v4(),
            request_code,
            title: input.title,
            description: input.description,
            category: input.category,
            visibility: input.visibility.unwrap_or(Visibility::Public),
            status: PurchaseRequestStatus::WaitingForApproval,
            owner_id,
            department_id: Some(department.id),
            delivery_date: Some(input.delivery_date),
            bidding_address: Some(input.delivery_address.clone()),
            delivery_address: Some(input.delivery_address),
            bidding_deadline: Some(input.bidding_deadline),
            bidding_date: Some(now),
            invited_companies: Vec::new(),
            agents: Vec::new(),
            documents: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        tx.insert_purchase_request(&request).await?;
        link_attachments(tx.as_mut(), request.id, &input.attachments, true).await?;

        self.ctx
            .audit(
                tx.as_mut(),
                AuditEntry::new(
                    AuditKind::PurchaseRequest,
                    format!("Purchase request \"{}\" created", request.title),
                    owner_id,
                ),
            )
            .await?;

        let created = reload(tx.as_mut(), request.id).await?;
        tx.commit().await?;
        info!(
            "Purchase request {} ({}) created by {}",
            created.request_code, created.id, owner_id
        );
        Ok(created)
    }

    /// Creates a `DRAFT`. Missing fields are tolerated, unknown departments and
    /// documents are skipped.
    pub async fn create_draft(
        &self,
        owner_id: Uuid,
        input: DraftPurchaseRequest,
    ) -> ProcurementResult<PurchaseRequest> {
        let now = Utc::now();
        let mut tx = self.ctx.store.begin().await?;

        let department_id = match input.department_id {
            Some(id) => match tx.find_department(id).await? {
                Some(department) => Some(department.id),
                None => {
                    warn!("Draft references unknown department {}, leaving it unset", id);
                    None
                }
            },
            None => None,
        };
        let request_code = codes::unique_request_code(tx.as_mut(), CodeSpace::Draft).await?;

        let request = PurchaseRequest {
            id: Uuid::new_v4(),
            request_code,
            title: input
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DRAFT_TITLE.to_string()),
            description: input.description,
            category: input.category,
            visibility: input.visibility.unwrap_or(Visibility::Public),
            status: PurchaseRequestStatus::Draft,
            owner_id,
            department_id,
            delivery_date: input.delivery_date,
            bidding_address: input.delivery_address.clone(),
            delivery_address: input.delivery_address,
            bidding_deadline: input.bidding_deadline,
            bidding_date: None,
            invited_companies: Vec::new(),
            agents: Vec::new(),
            documents: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        tx.insert_purchase_request(&request).await?;
        link_attachments(tx.as_mut(), request.id, &input.attachments, false).await?;

        self.ctx
            .audit(
                tx.as_mut(),
                AuditEntry::new(
                    AuditKind::PurchaseRequest,
                    format!("Draft purchase request \"{}\" created", request.title),
                    owner_id,
                ),
            )
            .await?;

        let created = reload(tx.as_mut(), request.id).await?;
        tx.commit().await?;
        info!("Draft {} created by {}", created.request_code, owner_id);
        Ok(created)
    }

    /// Moves the caller's own draft to `SCHEDULED`.
    pub async fn publish_draft(
        &self,
        purchase_request_id: Uuid,
        user_id: Uuid,
    ) -> ProcurementResult<PurchaseRequest> {
        let mut tx = self.ctx.store.begin().await?;
        let request = tx
            .lock_purchase_request(purchase_request_id)
            .await?
            .filter(|pr| pr.is_owned_by(user_id))
            .ok_or_else(|| not_found(purchase_request_id))?;

        if request.status != PurchaseRequestStatus::Draft {
            return Err(ProcurementError::bad_request(
                "Only draft purchase requests can be published",
            ));
        }

        tx.update_purchase_request_status(request.id, PurchaseRequestStatus::Scheduled)
            .await?;
        self.ctx
            .audit(
                tx.as_mut(),
                AuditEntry::new(
                    AuditKind::PurchaseRequest,
                    format!(
                        "Purchase request \"{}\" published from draft",
                        request.title
                    ),
                    user_id,
                ),
            )
            .await?;

        let updated = reload(tx.as_mut(), request.id).await?;
        tx.commit().await?;
        info!("Draft {} published as scheduled", updated.request_code);
        Ok(updated)
    }

    /// Applies an explicit status change. Only `REJECTED`, `FINISHED`, `PUBLISHED` and
    /// `SCHEDULED` are accepted; all but `FINISHED` require a pre-approval origin.
    pub async fn set_status(
        &self,
        purchase_request_id: Uuid,
        user_id: Uuid,
        target: PurchaseRequestStatus,
    ) -> ProcurementResult<PurchaseRequest> {
        if !PurchaseRequestStatus::SETTABLE.contains(&target) {
            let allowed: Vec<&str> = PurchaseRequestStatus::SETTABLE
                .iter()
                .map(|s| s.as_str())
                .collect();
            return Err(ProcurementError::bad_request(format!(
                "Cannot set status to {}. Only {} are allowed.",
                target,
                allowed.join(", ")
            )));
        }

        let mut tx = self.ctx.store.begin().await?;
        let request = tx
            .lock_purchase_request(purchase_request_id)
            .await?
            .ok_or_else(|| not_found(purchase_request_id))?;

        let current = request.status;
        // FINISHED is terminal and reachable from anywhere.
        if target != PurchaseRequestStatus::Finished && !current.is_pre_approval() {
            return Err(ProcurementError::bad_request(format!(
                "Cannot transition from {} to {}. Purchase request must be in DRAFT or WAITING_FOR_APPROVAL state.",
                current, target
            )));
        }

        tx.update_purchase_request_status(request.id, target).await?;
        self.ctx
            .audit(
                tx.as_mut(),
                AuditEntry::new(
                    AuditKind::PurchaseRequest,
                    format!(
                        "Purchase request \"{}\" status changed from {} to {}",
                        request.title, current, target
                    ),
                    user_id,
                ),
            )
            .await?;

        let updated = reload(tx.as_mut(), request.id).await?;
        tx.commit().await?;
        info!(
            "Purchase request {} moved from {} to {}",
            updated.request_code, current, target
        );

        if matches!(
            target,
            PurchaseRequestStatus::Published | PurchaseRequestStatus::Scheduled
        ) {
            self.ctx
                .notify_after_commit(
                    NotificationPayload::new(
                        NotificationKind::PurchaseRequestUpdate,
                        format!(
                            "Your purchase request \"{}\" has been {}",
                            updated.title,
                            target.as_str().to_lowercase()
                        ),
                    )
                    .from_creator(user_id)
                    .to_users(vec![updated.owner_id])
                    .with_purchase_request(updated.id),
                )
                .await;
        }

        Ok(updated)
    }

    /// Hard-deletes a draft.
    pub async fn delete(&self, purchase_request_id: Uuid, user_id: Uuid) -> ProcurementResult<()> {
        let mut tx = self.ctx.store.begin().await?;
        let request = tx
            .lock_purchase_request(purchase_request_id)
            .await?
            .ok_or_else(|| not_found(purchase_request_id))?;

        if request.status != PurchaseRequestStatus::Draft {
            return Err(ProcurementError::bad_request(
                "Only draft purchase requests can be deleted",
            ));
        }

        tx.delete_purchase_request(request.id).await?;
        self.ctx
            .audit(
                tx.as_mut(),
                AuditEntry::new(
                    AuditKind::PurchaseRequest,
                    format!("Purchase request \"{}\" deleted", request.title),
                    user_id,
                ),
            )
            .await?;
        tx.commit().await?;
        info!("Draft {} deleted by {}", request.request_code, user_id);
        Ok(())
    }

    /// Replaces the bidding deadline. Past deadlines are accepted on purpose so
    /// mistakes can be corrected after the fact.
    pub async fn update_bidding_deadline(
        &self,
        purchase_request_id: Uuid,
        user_id: Uuid,
        deadline: DateTime<Utc>,
    ) -> ProcurementResult<PurchaseRequest> {
        let mut tx = self.ctx.store.begin().await?;
        let request = tx
            .lock_purchase_request(purchase_request_id)
            .await?
            .ok_or_else(|| not_found(purchase_request_id))?;

        if request.status == PurchaseRequestStatus::Rejected {
            return Err(ProcurementError::bad_request(
                "Cannot update deadline of a rejected purchase request",
            ));
        }

        tx.update_bidding_deadline(request.id, deadline).await?;
        self.ctx
            .audit(
                tx.as_mut(),
                AuditEntry::new(
                    AuditKind::PurchaseRequest,
                    format!(
                        "Deadline updated for purchase request \"{}\" to {}",
                        request.title,
                        deadline.to_rfc3339()
                    ),
                    user_id,
                ),
            )
            .await?;

        let updated = reload(tx.as_mut(), request.id).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Adds companies to the invite list and notifies the active members of each
    /// newly invited one. Either every id resolves or nothing is invited.
    pub async fn invite_companies(
        &self,
        purchase_request_id: Uuid,
        user_id: Uuid,
        company_ids: &[Uuid],
    ) -> ProcurementResult<Vec<Company>> {
        let ids = dedup(company_ids);
        if ids.is_empty() {
            return Err(ProcurementError::bad_request("No companies to invite"));
        }

        let mut tx = self.ctx.store.begin().await?;
        let request = tx
            .lock_purchase_request(purchase_request_id)
            .await?
            .ok_or_else(|| not_found(purchase_request_id))?;

        let companies = tx.find_companies(&ids).await?;
        if companies.len() != ids.len() {
            return Err(ProcurementError::bad_request(
                "One or more companies not found",
            ));
        }
        tx.add_invited_companies(request.id, &ids).await?;

        let mut pending = Vec::new();
        for company in companies.iter().filter(|c| !request.is_invited(c.id)) {
            let members = tx.active_member_ids(company.id).await?;
            if members.is_empty() {
                continue;
            }
            let notification = self
                .ctx
                .notifications
                .record(
                    tx.as_mut(),
                    NotificationPayload::new(
                        NotificationKind::BidInvitation,
                        format!(
                            "You have been invited to bid on purchase request \"{}\".",
                            request.title
                        ),
                    )
                    .from_creator(user_id)
                    .to_users(members)
                    .with_purchase_request(request.id),
                )
                .await?;
            pending.push(notification);
        }

        self.ctx
            .audit(
                tx.as_mut(),
                AuditEntry::new(
                    AuditKind::PurchaseRequest,
                    format!(
                        "Companies invited to bid on purchase request \"{}\"",
                        request.title
                    ),
                    user_id,
                ),
            )
            .await?;
        tx.commit().await?;
        info!(
            "{} companies invited to {}",
            companies.len(),
            request.request_code
        );

        for notification in &pending {
            self.ctx.notifications.deliver(notification).await;
        }
        Ok(companies)
    }

    /// Adds a co-managing agent. Only the owner may do this.
    pub async fn invite_agent(
        &self,
        purchase_request_id: Uuid,
        user_id: Uuid,
        agent_id: Uuid,
    ) -> ProcurementResult<PurchaseRequest> {
        let mut tx = self.ctx.store.begin().await?;
        let request = tx
            .lock_purchase_request(purchase_request_id)
            .await?
            .ok_or_else(|| not_found(purchase_request_id))?;

        if !request.is_owned_by(user_id) {
            return Err(ProcurementError::bad_request(
                "Only the owner can invite agents to manage the purchase request",
            ));
        }
        if request.status == PurchaseRequestStatus::Rejected {
            return Err(ProcurementError::bad_request(
                "Cannot invite agents to a rejected purchase request",
            ));
        }
        if request.has_agent(agent_id) {
            return Err(ProcurementError::bad_request(
                "Agent is already managing this purchase request",
            ));
        }
        if !tx.user_exists(agent_id).await? {
            return Err(ProcurementError::not_found(format!(
                "User with ID {} not found",
                agent_id
            )));
        }

        tx.add_agent(request.id, agent_id).await?;
        let notification = self
            .ctx
            .notifications
            .record(
                tx.as_mut(),
                NotificationPayload::new(
                    NotificationKind::ManageInvitation,
                    format!(
                        "You have been invited to manage purchase request \"{}\"",
                        request.title
                    ),
                )
                .from_creator(user_id)
                .to_users(vec![agent_id])
                .with_purchase_request(request.id),
            )
            .await?;
        self.ctx
            .audit(
                tx.as_mut(),
                AuditEntry::new(
                    AuditKind::PurchaseRequest,
                    format!(
                        "Agent (ID: {}) invited to manage purchase request \"{}\"",
                        agent_id, request.title
                    ),
                    user_id,
                ),
            )
            .await?;

        let updated = reload(tx.as_mut(), request.id).await?;
        tx.commit().await?;
        info!("Agent {} now manages {}", agent_id, updated.request_code);

        self.ctx.notifications.deliver(&notification).await;
        self.ctx
            .mail_after_commit(OutboundMail {
                template: MailTemplate::InvitedToManagePurchaseRequest,
                recipient_id: agent_id,
                purchase_request_id: Some(updated.id),
                bid_id: None,
            })
            .await;
        Ok(updated)
    }

    // --- Queries ---

    pub async fn get(&self, purchase_request_id: Uuid) -> ProcurementResult<PurchaseRequest> {
        let mut tx = self.ctx.store.begin().await?;
        tx.find_purchase_request(purchase_request_id)
            .await?
            .ok_or_else(|| not_found(purchase_request_id))
    }

    pub async fn get_by_code(&self, request_code: &str) -> ProcurementResult<PurchaseRequest> {
        let mut tx = self.ctx.store.begin().await?;
        tx.find_purchase_request_by_code(request_code)
            .await?
            .ok_or_else(|| {
                ProcurementError::not_found(format!(
                    "Purchase request with code {} not found",
                    request_code
                ))
            })
    }

    pub async fn list_owned(
        &self,
        owner_id: Uuid,
        status: Option<PurchaseRequestStatus>,
    ) -> ProcurementResult<Vec<PurchaseRequest>> {
        let mut tx = self.ctx.store.begin().await?;
        Ok(tx.list_purchase_requests(owner_id, status).await?)
    }

    pub async fn list_drafts(&self, owner_id: Uuid) -> ProcurementResult<Vec<PurchaseRequest>> {
        self.list_owned(owner_id, Some(PurchaseRequestStatus::Draft))
            .await
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

fn not_found(purchase_request_id: Uuid) -> ProcurementError {
    ProcurementError::not_found(format!(
        "Purchase request with ID {} not found",
        purchase_request_id
    ))
}

fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut unique = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(id) {
            unique.push(*id);
        }
    }
    unique
}

async fn reload(
    tx: &mut dyn StoreTransaction,
    purchase_request_id: Uuid,
) -> ProcurementResult<PurchaseRequest> {
    tx.find_purchase_request(purchase_request_id)
        .await?
        .ok_or_else(|| {
            ProcurementError::internal("Purchase request vanished inside its own transaction")
        })
}

/// Links attachments to a request. With `strict`, any unknown id fails the operation;
/// otherwise unknown ids are skipped.
async fn link_attachments(
    tx: &mut dyn StoreTransaction,
    purchase_request_id: Uuid,
    attachment_ids: &[Uuid],
    strict: bool,
) -> ProcurementResult<()> {
    let ids = dedup(attachment_ids);
    if ids.is_empty() {
        return Ok(());
    }

    let resolution = tx.resolve_documents(&ids).await?;
    if strict && !resolution.all_found {
        return Err(ProcurementError::bad_request(
            "One or more documents not found",
        ));
    }

    let found: Vec<Uuid> = resolution.documents.iter().map(|d| d.id).collect();
    for id in &found {
        tx.mark_document_linked(*id).await?;
    }
    tx.attach_documents(purchase_request_id, &found).await?;
    Ok(())
}
