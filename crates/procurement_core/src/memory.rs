//! crates/procurement_core/src/memory.rs
//!
//! In-process implementations of every port. Used by the test suites and handy for
//! running the service without external infrastructure.
//!
//! Transactions take an owned lock on the whole state and work on a copy of it, so
//! they are fully serialised: committing swaps the copy in, dropping discards it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{
    AuditEntry, Bid, BidStatus, Company, CompanyStatus, Department, Document, Notification,
    NotificationStatus, PurchaseRequest, PurchaseRequestStatus, User,
};
use crate::ports::{
    AuditRepository, BidRepository, BidSearch, Capability, CapabilityChecker, DirectoryRepository,
    DocumentRepository, DocumentResolution, MailSender, NotificationRepository, OutboundMail,
    PortError, PortResult, ProcurementStore, PurchaseRequestRepository, PushTransport,
    ResourceScope, StoreTransaction,
};

const DUPLICATE_BID: &str = "Your company has already submitted a bid for this purchase request";

//=========================================================================================
// Store
//=========================================================================================

#[derive(Debug, Clone, Default)]
struct MemoryState {
    purchase_requests: HashMap<Uuid, PurchaseRequest>,
    request_documents: HashMap<Uuid, Vec<Uuid>>,
    bids: Vec<Bid>,
    users: HashMap<Uuid, User>,
    companies: HashMap<Uuid, Company>,
    departments: HashMap<Uuid, Department>,
    documents: HashMap<Uuid, Document>,
    notifications: Vec<Notification>,
    /// (notification, user) pairs that have been read.
    notification_reads: HashSet<(Uuid, Uuid)>,
    audit_log: Vec<AuditEntry>,
}

impl MemoryState {
    fn hydrate(&self, request: &PurchaseRequest) -> PurchaseRequest {
        let mut request = request.clone();
        request.documents = self
            .request_documents
            .get(&request.id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.documents.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        request
    }

    fn request_mut(&mut self, id: Uuid) -> PortResult<&mut PurchaseRequest> {
        self.purchase_requests
            .get_mut(&id)
            .ok_or_else(|| PortError::NotFound(format!("Purchase request {} not found", id)))
    }

    /// Bids of a request, newest first. Ties keep the later insertion first.
    fn request_bids(&self, purchase_request_id: Uuid) -> Vec<Bid> {
        let mut bids: Vec<Bid> = self
            .bids
            .iter()
            .rev()
            .filter(|bid| bid.purchase_request_id == purchase_request_id)
            .cloned()
            .collect();
        bids.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        bids
    }
}

/// A `ProcurementStore` backed by process memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<AsyncMutex<MemoryState>>,
    fail_next_commit: Arc<AtomicBool>,
    fail_audit: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the commit of the next transaction begun fail with an unexpected error.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// While set, every audit write fails with an unexpected error.
    pub fn set_audit_failing(&self, failing: bool) {
        self.fail_audit.store(failing, Ordering::SeqCst);
    }

    // --- Seeding ---

    pub async fn add_department(&self, name: &str) -> Department {
        let department = Department {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        self.state
            .lock()
            .await
            .departments
            .insert(department.id, department.clone());
        department
    }

    pub async fn add_user(&self, email: &str, company_id: Option<Uuid>) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
            company_id,
            is_active: true,
        };
        self.state.lock().await.users.insert(user.id, user.clone());
        user
    }

    pub async fn deactivate_user(&self, user_id: Uuid) {
        if let Some(user) = self.state.lock().await.users.get_mut(&user_id) {
            user.is_active = false;
        }
    }

    pub async fn add_company(&self, legal_name: &str) -> Company {
        let company = Company {
            id: Uuid::new_v4(),
            legal_name: legal_name.to_string(),
            status: CompanyStatus::Active,
            lock_reason: None,
            owner_id: None,
        };
        self.state
            .lock()
            .await
            .companies
            .insert(company.id, company.clone());
        company
    }

    pub async fn set_company_owner(&self, company_id: Uuid, owner_id: Uuid) {
        if let Some(company) = self.state.lock().await.companies.get_mut(&company_id) {
            company.owner_id = Some(owner_id);
        }
    }

    pub async fn lock_company(&self, company_id: Uuid, reason: Option<&str>) {
        if let Some(company) = self.state.lock().await.companies.get_mut(&company_id) {
            company.status = CompanyStatus::Locked;
            company.lock_reason = reason.map(str::to_string);
        }
    }

    pub async fn add_document(&self, name: &str) -> Document {
        let document = Document {
            id: Uuid::new_v4(),
            name: name.to_string(),
            is_linked: false,
        };
        self.state
            .lock()
            .await
            .documents
            .insert(document.id, document.clone());
        document
    }

    /// Overwrites a bid's status, as the award/disqualification flow would.
    pub async fn set_bid_status(&self, bid_id: Uuid, status: BidStatus) {
        let mut state = self.state.lock().await;
        if let Some(bid) = state.bids.iter_mut().find(|bid| bid.id == bid_id) {
            bid.status = status;
            bid.updated_at = Utc::now();
        }
    }

    // --- Inspection ---

    pub async fn purchase_request(&self, id: Uuid) -> Option<PurchaseRequest> {
        let state = self.state.lock().await;
        state.purchase_requests.get(&id).map(|pr| state.hydrate(pr))
    }

    pub async fn document(&self, id: Uuid) -> Option<Document> {
        self.state.lock().await.documents.get(&id).cloned()
    }

    pub async fn bids(&self) -> Vec<Bid> {
        self.state.lock().await.bids.clone()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.lock().await.notifications.clone()
    }

    /// Committed audit entries, oldest first.
    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.lock().await.audit_log.clone()
    }
}

#[async_trait]
impl ProcurementStore for MemoryStore {
    async fn begin(&self) -> PortResult<Box<dyn StoreTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            working,
            fail_commit: self.fail_next_commit.swap(false, Ordering::SeqCst),
            fail_audit: self.fail_audit.load(Ordering::SeqCst),
        }))
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_commit: bool,
    fail_audit: bool,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> PortResult<()> {
        let MemoryTransaction {
            mut guard,
            working,
            fail_commit,
            ..
        } = *self;
        if fail_commit {
            return Err(PortError::Unexpected("injected commit failure".to_string()));
        }
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl PurchaseRequestRepository for MemoryTransaction {
    async fn insert_purchase_request(&mut self, request: &PurchaseRequest) -> PortResult<()> {
        if self
            .working
            .purchase_requests
            .values()
            .any(|pr| pr.request_code == request.request_code)
        {
            return Err(PortError::Conflict(format!(
                "Request code {} already exists",
                request.request_code
            )));
        }
        let mut stored = request.clone();
        stored.documents.clear();
        self.working.purchase_requests.insert(stored.id, stored);
        Ok(())
    }

    async fn request_code_exists(&mut self, code: &str) -> PortResult<bool> {
        Ok(self
            .working
            .purchase_requests
            .values()
            .any(|pr| pr.request_code == code))
    }

    async fn find_purchase_request(&mut self, id: Uuid) -> PortResult<Option<PurchaseRequest>> {
        Ok(self
            .working
            .purchase_requests
            .get(&id)
            .map(|pr| self.working.hydrate(pr)))
    }

    async fn lock_purchase_request(&mut self, id: Uuid) -> PortResult<Option<PurchaseRequest>> {
        // The whole state is already held exclusively.
        self.find_purchase_request(id).await
    }

    async fn find_purchase_request_by_code(
        &mut self,
        code: &str,
    ) -> PortResult<Option<PurchaseRequest>> {
        Ok(self
            .working
            .purchase_requests
            .values()
            .find(|pr| pr.request_code == code)
            .map(|pr| self.working.hydrate(pr)))
    }

    async fn list_purchase_requests(
        &mut self,
        owner_id: Uuid,
        status: Option<PurchaseRequestStatus>,
    ) -> PortResult<Vec<PurchaseRequest>> {
        let mut requests: Vec<PurchaseRequest> = self
            .working
            .purchase_requests
            .values()
            .filter(|pr| pr.owner_id == owner_id)
            .filter(|pr| status.map_or(true, |s| pr.status == s))
            .map(|pr| self.working.hydrate(pr))
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn update_purchase_request_status(
        &mut self,
        id: Uuid,
        status: PurchaseRequestStatus,
    ) -> PortResult<()> {
        let request = self.working.request_mut(id)?;
        request.status = status;
        request.updated_at = Utc::now();
        Ok(())
    }

    async fn update_bidding_deadline(
        &mut self,
        id: Uuid,
        deadline: DateTime<Utc>,
    ) -> PortResult<()> {
        let request = self.working.request_mut(id)?;
        request.bidding_deadline = Some(deadline);
        request.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_purchase_request(&mut self, id: Uuid) -> PortResult<()> {
        self.working.purchase_requests.remove(&id);
        self.working.request_documents.remove(&id);
        self.working.bids.retain(|bid| bid.purchase_request_id != id);
        Ok(())
    }

    async fn add_invited_companies(&mut self, id: Uuid, company_ids: &[Uuid]) -> PortResult<()> {
        let request = self.working.request_mut(id)?;
        for company_id in company_ids {
            if !request.invited_companies.contains(company_id) {
                request.invited_companies.push(*company_id);
            }
        }
        Ok(())
    }

    async fn add_agent(&mut self, id: Uuid, agent_id: Uuid) -> PortResult<()> {
        let request = self.working.request_mut(id)?;
        if !request.agents.contains(&agent_id) {
            request.agents.push(agent_id);
        }
        Ok(())
    }

    async fn attach_documents(&mut self, id: Uuid, document_ids: &[Uuid]) -> PortResult<()> {
        self.working.request_mut(id)?;
        let attached = self.working.request_documents.entry(id).or_default();
        for document_id in document_ids {
            if !attached.contains(document_id) {
                attached.push(*document_id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BidRepository for MemoryTransaction {
    async fn insert_bid(&mut self, bid: &Bid) -> PortResult<()> {
        if self.working.bids.iter().any(|b| b.reference == bid.reference) {
            return Err(PortError::Conflict(format!(
                "Bid reference {} already exists",
                bid.reference
            )));
        }
        // Mirrors the partial unique index on (company, purchase request).
        let blocked = bid.blocks_resubmission()
            && self.working.bids.iter().any(|b| {
                b.company_id == bid.company_id
                    && b.purchase_request_id == bid.purchase_request_id
                    && b.blocks_resubmission()
            });
        if blocked {
            return Err(PortError::Conflict(DUPLICATE_BID.to_string()));
        }
        self.working.bids.push(bid.clone());
        Ok(())
    }

    async fn bids_for_company(
        &mut self,
        purchase_request_id: Uuid,
        company_id: Uuid,
    ) -> PortResult<Vec<Bid>> {
        Ok(self
            .working
            .request_bids(purchase_request_id)
            .into_iter()
            .filter(|bid| bid.company_id == company_id)
            .collect())
    }

    async fn bids_for_request(&mut self, purchase_request_id: Uuid) -> PortResult<Vec<Bid>> {
        Ok(self.working.request_bids(purchase_request_id))
    }

    async fn search_bids(
        &mut self,
        purchase_request_id: Uuid,
        search: &BidSearch,
    ) -> PortResult<(Vec<Bid>, u64)> {
        let needle = search.reference.as_ref().map(|r| r.to_lowercase());
        let matching: Vec<Bid> = self
            .working
            .request_bids(purchase_request_id)
            .into_iter()
            .filter(|bid| {
                needle
                    .as_ref()
                    .map_or(true, |n| bid.reference.to_lowercase().contains(n))
            })
            .collect();
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(search.offset as usize)
            .take(search.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn bid_statuses(&mut self) -> PortResult<Vec<BidStatus>> {
        Ok(self.working.bids.iter().map(|bid| bid.status).collect())
    }
}

#[async_trait]
impl DirectoryRepository for MemoryTransaction {
    async fn find_department(&mut self, id: Uuid) -> PortResult<Option<Department>> {
        Ok(self.working.departments.get(&id).cloned())
    }

    async fn find_company_for_member(
        &mut self,
        company_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<Company>> {
        let is_member = self
            .working
            .users
            .get(&user_id)
            .map_or(false, |user| user.company_id == Some(company_id));
        if !is_member {
            return Ok(None);
        }
        Ok(self.working.companies.get(&company_id).cloned())
    }

    async fn find_company_of_user(&mut self, user_id: Uuid) -> PortResult<Option<Company>> {
        Ok(self
            .working
            .users
            .get(&user_id)
            .and_then(|user| user.company_id)
            .and_then(|company_id| self.working.companies.get(&company_id).cloned()))
    }

    async fn find_companies(&mut self, ids: &[Uuid]) -> PortResult<Vec<Company>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.working.companies.get(id).cloned())
            .collect())
    }

    async fn active_member_ids(&mut self, company_id: Uuid) -> PortResult<Vec<Uuid>> {
        let mut members: Vec<Uuid> = self
            .working
            .users
            .values()
            .filter(|user| user.company_id == Some(company_id) && user.is_active)
            .map(|user| user.id)
            .collect();
        members.sort();
        Ok(members)
    }

    async fn user_exists(&mut self, user_id: Uuid) -> PortResult<bool> {
        Ok(self.working.users.contains_key(&user_id))
    }
}

#[async_trait]
impl DocumentRepository for MemoryTransaction {
    async fn resolve_documents(&mut self, ids: &[Uuid]) -> PortResult<DocumentResolution> {
        let documents: Vec<Document> = ids
            .iter()
            .filter_map(|id| self.working.documents.get(id).cloned())
            .collect();
        let requested: HashSet<&Uuid> = ids.iter().collect();
        Ok(DocumentResolution {
            all_found: documents.len() == requested.len(),
            documents,
        })
    }

    async fn mark_document_linked(&mut self, id: Uuid) -> PortResult<()> {
        let document = self
            .working
            .documents
            .get_mut(&id)
            .ok_or_else(|| PortError::NotFound(format!("Document {} not found", id)))?;
        document.is_linked = true;
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for MemoryTransaction {
    async fn insert_notification(&mut self, notification: &Notification) -> PortResult<()> {
        self.working.notifications.push(notification.clone());
        Ok(())
    }

    async fn notifications_for_user(&mut self, user_id: Uuid) -> PortResult<Vec<Notification>> {
        let reads = &self.working.notification_reads;
        Ok(self
            .working
            .notifications
            .iter()
            .rev()
            .filter(|n| n.is_visible_to(user_id))
            .map(|n| {
                let mut notification = n.clone();
                notification.status = if reads.contains(&(n.id, user_id)) {
                    NotificationStatus::Read
                } else {
                    NotificationStatus::Unread
                };
                notification
            })
            .collect())
    }

    async fn mark_notifications_read(&mut self, user_id: Uuid) -> PortResult<u64> {
        let visible: Vec<Uuid> = self
            .working
            .notifications
            .iter()
            .filter(|n| n.is_visible_to(user_id))
            .map(|n| n.id)
            .collect();
        let mut updated = 0;
        for id in visible {
            if self.working.notification_reads.insert((id, user_id)) {
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[async_trait]
impl AuditRepository for MemoryTransaction {
    async fn insert_audit_entry(&mut self, entry: &AuditEntry) -> PortResult<()> {
        if self.fail_audit {
            return Err(PortError::Unexpected("audit log unavailable".to_string()));
        }
        self.working.audit_log.push(entry.clone());
        Ok(())
    }
}

//=========================================================================================
// Recording Collaborators
//=========================================================================================

/// Keeps outbound mail in memory.
#[derive(Default)]
pub struct RecordingMail {
    sent: Mutex<Vec<OutboundMail>>,
    failing: AtomicBool,
}

impl RecordingMail {
    pub fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl MailSender for RecordingMail {
    async fn send(&self, mail: OutboundMail) -> PortResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("mail queue unavailable".to_string()));
        }
        self.sent
            .lock()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .push(mail);
        Ok(())
    }
}

/// Keeps pushed notifications in memory, split by channel.
#[derive(Default)]
pub struct RecordingPush {
    direct: Mutex<Vec<(Uuid, Notification)>>,
    broadcasts: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingPush {
    pub fn direct(&self) -> Vec<(Uuid, Notification)> {
        self.direct.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn broadcasts(&self) -> Vec<Notification> {
        self.broadcasts.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> PortResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("push transport down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PushTransport for RecordingPush {
    async fn push_to_user(
        &self,
        user_id: Uuid,
        _event: &str,
        notification: &Notification,
    ) -> PortResult<()> {
        self.check()?;
        self.direct
            .lock()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .push((user_id, notification.clone()));
        Ok(())
    }

    async fn push_to_all(&self, _event: &str, notification: &Notification) -> PortResult<()> {
        self.check()?;
        self.broadcasts
            .lock()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .push(notification.clone());
        Ok(())
    }
}

/// Capability grants held in memory. Scopes are ignored.
#[derive(Default)]
pub struct StaticCapabilities {
    allow_all: bool,
    grants: Mutex<HashSet<(Uuid, Capability)>>,
}

impl StaticCapabilities {
    pub fn allow_all() -> Self {
        Self {
            allow_all: true,
            grants: Mutex::default(),
        }
    }

    pub fn grant(&self, user_id: Uuid, capability: Capability) {
        if let Ok(mut grants) = self.grants.lock() {
            grants.insert((user_id, capability));
        }
    }
}

#[async_trait]
impl CapabilityChecker for StaticCapabilities {
    async fn has_capability(
        &self,
        user_id: Uuid,
        capability: Capability,
        _scope: ResourceScope,
    ) -> PortResult<bool> {
        if self.allow_all {
            return Ok(true);
        }
        let grants = self
            .grants
            .lock()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(grants.contains(&(user_id, capability)))
    }
}
