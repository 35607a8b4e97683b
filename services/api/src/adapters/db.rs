//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! `ProcurementStore` port from the `core` crate. It handles all interactions with
//! the PostgreSQL database using `sqlx`.
//!
//! Every store operation runs on a `sqlx::Transaction`. Dropping a `PgTransaction`
//! without committing it rolls the transaction back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use procurement_core::domain::{
    Audience, AuditEntry, Bid, BidStatus, Company, Department, Document, Notification, PurchaseRequest,
    PurchaseRequestStatus,
};
use procurement_core::ports::{
    AuditRepository, BidRepository, BidSearch, DirectoryRepository, DocumentRepository, DocumentResolution,
    NotificationRepository, PortError, PortResult, ProcurementStore, PurchaseRequestRepository,
    StoreTransaction,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Structs
//=========================================================================================

/// A database adapter that implements the `ProcurementStore` port.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new `PgStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl ProcurementStore for PgStore {
    async fn begin(&self) -> PortResult<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await.map_err(unexpected)?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn commit(self: Box<Self>) -> PortResult<()> {
        self.tx.commit().await.map_err(unexpected)
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Maps a unique violation onto `PortError::Conflict`, everything else onto `Unexpected`.
fn write_error(e: sqlx::Error, conflict: &str) -> PortError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PortError::Conflict(conflict.to_string())
        }
        _ => unexpected(e),
    }
}

fn parse_label<T>(value: &str) -> PortResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| PortError::Unexpected(e.to_string()))
}

/// Escapes `LIKE` wildcards so a user-supplied needle matches literally.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const PURCHASE_REQUEST_COLUMNS: &str = "id, request_code, title, description, category, \
     visibility, status, owner_id, department_id, delivery_date, delivery_address, \
     bidding_deadline, bidding_date, bidding_address, created_at, updated_at";

#[derive(FromRow)]
struct PurchaseRequestRecord {
    id: Uuid,
    request_code: String,
    title: String,
    description: Option<String>,
    category: Option<String>,
    visibility: String,
    status: String,
    owner_id: Uuid,
    department_id: Option<Uuid>,
    delivery_date: Option<DateTime<Utc>>,
    delivery_address: Option<String>,
    bidding_deadline: Option<DateTime<Utc>>,
    bidding_date: Option<DateTime<Utc>>,
    bidding_address: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl PurchaseRequestRecord {
    fn to_domain(self) -> PortResult<PurchaseRequest> {
        Ok(PurchaseRequest {
            id: self.id,
            request_code: self.request_code,
            title: self.title,
            description: self.description,
            category: self.category,
            visibility: parse_label(&self.visibility)?,
            status: parse_label(&self.status)?,
            owner_id: self.owner_id,
            department_id: self.department_id,
            delivery_date: self.delivery_date,
            delivery_address: self.delivery_address,
            bidding_deadline: self.bidding_deadline,
            bidding_date: self.bidding_date,
            bidding_address: self.bidding_address,
            invited_companies: Vec::new(),
            agents: Vec::new(),
            documents: Vec::new(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const BID_COLUMNS: &str = "id, reference, status, description, company_id, purchase_request_id, \
     delivery_date, delivery_address, bidding_date, bidding_address, chat_id, feedback_id, \
     created_at, updated_at";

#[derive(FromRow)]
struct BidRecord {
    id: Uuid,
    reference: String,
    status: String,
    description: Option<String>,
    company_id: Uuid,
    purchase_request_id: Uuid,
    delivery_date: Option<DateTime<Utc>>,
    delivery_address: Option<String>,
    bidding_date: Option<DateTime<Utc>>,
    bidding_address: Option<String>,
    chat_id: Option<Uuid>,
    feedback_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl BidRecord {
    fn to_domain(self) -> PortResult<Bid> {
        Ok(Bid {
            id: self.id,
            reference: self.reference,
            status: parse_label(&self.status)?,
            description: self.description,
            company_id: self.company_id,
            purchase_request_id: self.purchase_request_id,
            delivery_date: self.delivery_date,
            delivery_address: self.delivery_address,
            bidding_date: self.bidding_date,
            bidding_address: self.bidding_address,
            chat_id: self.chat_id,
            feedback_id: self.feedback_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn bids_to_domain(records: Vec<BidRecord>) -> PortResult<Vec<Bid>> {
    records.into_iter().map(BidRecord::to_domain).collect()
}

#[derive(FromRow)]
struct CompanyRecord {
    id: Uuid,
    legal_name: String,
    status: String,
    lock_reason: Option<String>,
    owner_id: Option<Uuid>,
}
impl CompanyRecord {
    fn to_domain(self) -> PortResult<Company> {
        Ok(Company {
            id: self.id,
            legal_name: self.legal_name,
            status: parse_label(&self.status)?,
            lock_reason: self.lock_reason,
            owner_id: self.owner_id,
        })
    }
}

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    name: String,
    is_linked: bool,
}
impl DocumentRecord {
    fn to_domain(self) -> Document {
        Document {
            id: self.id,
            name: self.name,
            is_linked: self.is_linked,
        }
    }
}

const AUDIENCE_PUBLIC: &str = "PUBLIC";
const AUDIENCE_RECIPIENTS: &str = "RECIPIENTS";
const AUDIENCE_CREATOR: &str = "CREATOR";

#[derive(FromRow)]
struct NotificationRecord {
    id: Uuid,
    kind: String,
    message: String,
    status: String,
    audience: String,
    creator_id: Option<Uuid>,
    bid_id: Option<Uuid>,
    purchase_request_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}
impl NotificationRecord {
    fn to_domain(self, recipients: Vec<Uuid>) -> PortResult<Notification> {
        let audience = match self.audience.as_str() {
            AUDIENCE_PUBLIC => Audience::Public,
            AUDIENCE_RECIPIENTS => Audience::Recipients(recipients),
            AUDIENCE_CREATOR => Audience::Creator,
            other => {
                return Err(PortError::Unexpected(format!(
                    "unknown notification audience '{}'",
                    other
                )))
            }
        };
        Ok(Notification {
            id: self.id,
            kind: parse_label(&self.kind)?,
            message: self.message,
            status: parse_label(&self.status)?,
            audience,
            creator_id: self.creator_id,
            bid_id: self.bid_id,
            purchase_request_id: self.purchase_request_id,
            created_at: self.created_at,
        })
    }
}

//=========================================================================================
// Purchase Requests
//=========================================================================================

impl PgTransaction {
    /// Loads the membership lists and documents of a purchase request row.
    async fn hydrate(&mut self, record: PurchaseRequestRecord) -> PortResult<PurchaseRequest> {
        let mut request = record.to_domain()?;

        request.invited_companies = sqlx::query_scalar::<_, Uuid>(
            "SELECT company_id FROM purchase_request_invited_companies \
             WHERE purchase_request_id = $1 ORDER BY invited_at, company_id",
        )
        .bind(request.id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(unexpected)?;

        request.agents = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM purchase_request_agents \
             WHERE purchase_request_id = $1 ORDER BY invited_at, user_id",
        )
        .bind(request.id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(unexpected)?;

        request.documents = sqlx::query_as::<_, DocumentRecord>(
            "SELECT d.id, d.name, d.is_linked FROM documents d \
             JOIN purchase_request_documents prd ON prd.document_id = d.id \
             WHERE prd.purchase_request_id = $1 ORDER BY d.name",
        )
        .bind(request.id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(DocumentRecord::to_domain)
        .collect();

        Ok(request)
    }

    async fn fetch_request(
        &mut self,
        sql: &str,
        key: PurchaseRequestKey<'_>,
    ) -> PortResult<Option<PurchaseRequest>> {
        let query = sqlx::query_as::<_, PurchaseRequestRecord>(sql);
        let query = match key {
            PurchaseRequestKey::Id(id) => query.bind(id),
            PurchaseRequestKey::Code(code) => query.bind(code.to_string()),
        };
        let record = query
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(unexpected)?;
        match record {
            Some(record) => Ok(Some(self.hydrate(record).await?)),
            None => Ok(None),
        }
    }

    async fn touch(&mut self, id: Uuid) -> PortResult<()> {
        sqlx::query("UPDATE purchase_requests SET updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

enum PurchaseRequestKey<'a> {
    Id(Uuid),
    Code(&'a str),
}

#[async_trait]
impl PurchaseRequestRepository for PgTransaction {
    async fn insert_purchase_request(&mut self, request: &PurchaseRequest) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO purchase_requests (id, request_code, title, description, category, \
             visibility, status, owner_id, department_id, delivery_date, delivery_address, \
             bidding_deadline, bidding_date, bidding_address, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(request.id)
        .bind(&request.request_code)
        .bind(&request.title)
        .bind(&request.description)
        .bind(&request.category)
        .bind(request.visibility.as_str())
        .bind(request.status.as_str())
        .bind(request.owner_id)
        .bind(request.department_id)
        .bind(request.delivery_date)
        .bind(&request.delivery_address)
        .bind(request.bidding_deadline)
        .bind(request.bidding_date)
        .bind(&request.bidding_address)
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            write_error(
                e,
                &format!("Request code {} already exists", request.request_code),
            )
        })?;
        Ok(())
    }

    async fn request_code_exists(&mut self, code: &str) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM purchase_requests WHERE request_code = $1)",
        )
        .bind(code)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(unexpected)
    }

    async fn find_purchase_request(&mut self, id: Uuid) -> PortResult<Option<PurchaseRequest>> {
        let sql = format!(
            "SELECT {} FROM purchase_requests WHERE id = $1",
            PURCHASE_REQUEST_COLUMNS
        );
        self.fetch_request(&sql, PurchaseRequestKey::Id(id)).await
    }

    async fn lock_purchase_request(&mut self, id: Uuid) -> PortResult<Option<PurchaseRequest>> {
        let sql = format!(
            "SELECT {} FROM purchase_requests WHERE id = $1 FOR UPDATE",
            PURCHASE_REQUEST_COLUMNS
        );
        self.fetch_request(&sql, PurchaseRequestKey::Id(id)).await
    }

    async fn find_purchase_request_by_code(
        &mut self,
        code: &str,
    ) -> PortResult<Option<PurchaseRequest>> {
        let sql = format!(
            "SELECT {} FROM purchase_requests WHERE request_code = $1",
            PURCHASE_REQUEST_COLUMNS
        );
        self.fetch_request(&sql, PurchaseRequestKey::Code(code)).await
    }

    async fn list_purchase_requests(
        &mut self,
        owner_id: Uuid,
        status: Option<PurchaseRequestStatus>,
    ) -> PortResult<Vec<PurchaseRequest>> {
        let sql = format!(
            "SELECT {} FROM purchase_requests \
             WHERE owner_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC",
            PURCHASE_REQUEST_COLUMNS
        );
        let records = sqlx::query_as::<_, PurchaseRequestRecord>(&sql)
            .bind(owner_id)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(unexpected)?;

        let mut requests = Vec::with_capacity(records.len());
        for record in records {
            requests.push(self.hydrate(record).await?);
        }
        Ok(requests)
    }

    async fn update_purchase_request_status(
        &mut self,
        id: Uuid,
        status: PurchaseRequestStatus,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE purchase_requests SET status = $1, updated_at = now() WHERE id = $2",
        )
        .bind(status.as_str())
        .bind(id)
        .execute(&mut *self.tx)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Purchase request {} not found", id)));
        }
        Ok(())
    }

    async fn update_bidding_deadline(
        &mut self,
        id: Uuid,
        deadline: DateTime<Utc>,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE purchase_requests SET bidding_deadline = $1, updated_at = now() WHERE id = $2",
        )
        .bind(deadline)
        .bind(id)
        .execute(&mut *self.tx)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Purchase request {} not found", id)));
        }
        Ok(())
    }

    async fn delete_purchase_request(&mut self, id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM purchase_requests WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn add_invited_companies(&mut self, id: Uuid, company_ids: &[Uuid]) -> PortResult<()> {
        for company_id in company_ids {
            sqlx::query(
                "INSERT INTO purchase_request_invited_companies (purchase_request_id, company_id) \
                 VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(company_id)
            .execute(&mut *self.tx)
            .await
            .map_err(unexpected)?;
        }
        self.touch(id).await
    }

    async fn add_agent(&mut self, id: Uuid, agent_id: Uuid) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO purchase_request_agents (purchase_request_id, user_id) \
             VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(agent_id)
        .execute(&mut *self.tx)
        .await
        .map_err(unexpected)?;
        self.touch(id).await
    }

    async fn attach_documents(&mut self, id: Uuid, document_ids: &[Uuid]) -> PortResult<()> {
        for document_id in document_ids {
            sqlx::query(
                "INSERT INTO purchase_request_documents (purchase_request_id, document_id) \
                 VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(document_id)
            .execute(&mut *self.tx)
            .await
            .map_err(unexpected)?;
        }
        Ok(())
    }
}

//=========================================================================================
// Bids
//=========================================================================================

#[async_trait]
impl BidRepository for PgTransaction {
    async fn insert_bid(&mut self, bid: &Bid) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO bids (id, reference, status, description, company_id, \
             purchase_request_id, delivery_date, delivery_address, bidding_date, \
             bidding_address, chat_id, feedback_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(bid.id)
        .bind(&bid.reference)
        .bind(bid.status.as_str())
        .bind(&bid.description)
        .bind(bid.company_id)
        .bind(bid.purchase_request_id)
        .bind(bid.delivery_date)
        .bind(&bid.delivery_address)
        .bind(bid.bidding_date)
        .bind(&bid.bidding_address)
        .bind(bid.chat_id)
        .bind(bid.feedback_id)
        .bind(bid.created_at)
        .bind(bid.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            write_error(
                e,
                "Your company has already submitted a bid for this purchase request",
            )
        })?;
        Ok(())
    }

    async fn bids_for_company(
        &mut self,
        purchase_request_id: Uuid,
        company_id: Uuid,
    ) -> PortResult<Vec<Bid>> {
        let sql = format!(
            "SELECT {} FROM bids WHERE purchase_request_id = $1 AND company_id = $2 \
             ORDER BY created_at DESC",
            BID_COLUMNS
        );
        let records = sqlx::query_as::<_, BidRecord>(&sql)
            .bind(purchase_request_id)
            .bind(company_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(unexpected)?;
        bids_to_domain(records)
    }

    async fn bids_for_request(&mut self, purchase_request_id: Uuid) -> PortResult<Vec<Bid>> {
        let sql = format!(
            "SELECT {} FROM bids WHERE purchase_request_id = $1 ORDER BY created_at DESC",
            BID_COLUMNS
        );
        let records = sqlx::query_as::<_, BidRecord>(&sql)
            .bind(purchase_request_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(unexpected)?;
        bids_to_domain(records)
    }

    async fn search_bids(
        &mut self,
        purchase_request_id: Uuid,
        search: &BidSearch,
    ) -> PortResult<(Vec<Bid>, u64)> {
        let pattern = search.reference.as_deref().map(like_pattern);

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM bids WHERE purchase_request_id = $1 \
             AND ($2::text IS NULL OR reference ILIKE $2)",
        )
        .bind(purchase_request_id)
        .bind(pattern.as_deref())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(unexpected)?;

        let sql = format!(
            "SELECT {} FROM bids WHERE purchase_request_id = $1 \
             AND ($2::text IS NULL OR reference ILIKE $2) \
             ORDER BY created_at DESC OFFSET $3 LIMIT $4",
            BID_COLUMNS
        );
        let records = sqlx::query_as::<_, BidRecord>(&sql)
            .bind(purchase_request_id)
            .bind(pattern.as_deref())
            .bind(i64::try_from(search.offset).unwrap_or(i64::MAX))
            .bind(i64::try_from(search.limit).unwrap_or(i64::MAX))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(unexpected)?;

        Ok((bids_to_domain(records)?, u64::try_from(total).unwrap_or(0)))
    }

    async fn bid_statuses(&mut self) -> PortResult<Vec<BidStatus>> {
        let labels = sqlx::query_scalar::<_, String>("SELECT status FROM bids")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(unexpected)?;
        labels.iter().map(|label| parse_label(label)).collect()
    }
}

//=========================================================================================
// Directory
//=========================================================================================

#[async_trait]
impl DirectoryRepository for PgTransaction {
    async fn find_department(&mut self, id: Uuid) -> PortResult<Option<Department>> {
        let row = sqlx::query_as::<_, (Uuid, String)>("SELECT id, name FROM departments WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(unexpected)?;
        Ok(row.map(|(id, name)| Department { id, name }))
    }

    async fn find_company_for_member(
        &mut self,
        company_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<Company>> {
        let record = sqlx::query_as::<_, CompanyRecord>(
            "SELECT c.id, c.legal_name, c.status, c.lock_reason, c.owner_id FROM companies c \
             JOIN users u ON u.company_id = c.id \
             WHERE c.id = $1 AND u.id = $2 FOR UPDATE OF c",
        )
        .bind(company_id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(unexpected)?;
        record.map(CompanyRecord::to_domain).transpose()
    }

    async fn find_company_of_user(&mut self, user_id: Uuid) -> PortResult<Option<Company>> {
        let record = sqlx::query_as::<_, CompanyRecord>(
            "SELECT c.id, c.legal_name, c.status, c.lock_reason, c.owner_id FROM companies c \
             JOIN users u ON u.company_id = c.id WHERE u.id = $1",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(unexpected)?;
        record.map(CompanyRecord::to_domain).transpose()
    }

    async fn find_companies(&mut self, ids: &[Uuid]) -> PortResult<Vec<Company>> {
        let records = sqlx::query_as::<_, CompanyRecord>(
            "SELECT id, legal_name, status, lock_reason, owner_id FROM companies WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(CompanyRecord::to_domain).collect()
    }

    async fn active_member_ids(&mut self, company_id: Uuid) -> PortResult<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM users WHERE company_id = $1 AND is_active ORDER BY id",
        )
        .bind(company_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(unexpected)
    }

    async fn user_exists(&mut self, user_id: Uuid) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(unexpected)
    }
}

//=========================================================================================
// Documents
//=========================================================================================

#[async_trait]
impl DocumentRepository for PgTransaction {
    async fn resolve_documents(&mut self, ids: &[Uuid]) -> PortResult<DocumentResolution> {
        let documents: Vec<Document> = sqlx::query_as::<_, DocumentRecord>(
            "SELECT id, name, is_linked FROM documents WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(DocumentRecord::to_domain)
        .collect();

        let mut requested = ids.to_vec();
        requested.sort();
        requested.dedup();
        Ok(DocumentResolution {
            all_found: documents.len() == requested.len(),
            documents,
        })
    }

    async fn mark_document_linked(&mut self, id: Uuid) -> PortResult<()> {
        let result = sqlx::query("UPDATE documents SET is_linked = TRUE WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Document {} not found", id)));
        }
        Ok(())
    }
}

//=========================================================================================
// Notifications
//=========================================================================================

const VISIBLE_TO_USER: &str = "(n.audience = 'PUBLIC' \
     OR (n.audience = 'RECIPIENTS' AND EXISTS (SELECT 1 FROM notification_recipients r \
         WHERE r.notification_id = n.id AND r.user_id = $1)) \
     OR (n.audience = 'CREATOR' AND n.creator_id = $1))";

#[async_trait]
impl NotificationRepository for PgTransaction {
    async fn insert_notification(&mut self, notification: &Notification) -> PortResult<()> {
        let audience = match &notification.audience {
            Audience::Public => AUDIENCE_PUBLIC,
            Audience::Recipients(_) => AUDIENCE_RECIPIENTS,
            Audience::Creator => AUDIENCE_CREATOR,
        };
        sqlx::query(
            "INSERT INTO notifications (id, kind, message, audience, creator_id, \
             bid_id, purchase_request_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(notification.id)
        .bind(notification.kind.as_str())
        .bind(&notification.message)
        .bind(audience)
        .bind(notification.creator_id)
        .bind(notification.bid_id)
        .bind(notification.purchase_request_id)
        .bind(notification.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(unexpected)?;

        for (position, user_id) in notification.recipients().iter().enumerate() {
            sqlx::query(
                "INSERT INTO notification_recipients (notification_id, user_id, position) \
                 VALUES ($1, $2, $3)",
            )
            .bind(notification.id)
            .bind(user_id)
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .execute(&mut *self.tx)
            .await
            .map_err(unexpected)?;
        }
        Ok(())
    }

    async fn notifications_for_user(&mut self, user_id: Uuid) -> PortResult<Vec<Notification>> {
        let sql = format!(
            "SELECT n.id, n.kind, n.message, \
             CASE WHEN EXISTS (SELECT 1 FROM notification_reads nr \
                 WHERE nr.notification_id = n.id AND nr.user_id = $1) \
             THEN 'READ' ELSE 'UNREAD' END AS status, \
             n.audience, n.creator_id, n.bid_id, n.purchase_request_id, n.created_at \
             FROM notifications n WHERE {} ORDER BY n.created_at DESC",
            VISIBLE_TO_USER
        );
        let records = sqlx::query_as::<_, NotificationRecord>(&sql)
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(unexpected)?;

        let ids: Vec<Uuid> = records
            .iter()
            .filter(|r| r.audience == AUDIENCE_RECIPIENTS)
            .map(|r| r.id)
            .collect();
        let mut recipients: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        if !ids.is_empty() {
            let rows = sqlx::query_as::<_, (Uuid, Uuid)>(
                "SELECT notification_id, user_id FROM notification_recipients \
                 WHERE notification_id = ANY($1) ORDER BY notification_id, position",
            )
            .bind(&ids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(unexpected)?;
            for (notification_id, recipient) in rows {
                recipients.entry(notification_id).or_default().push(recipient);
            }
        }

        records
            .into_iter()
            .map(|record| {
                let users = recipients.remove(&record.id).unwrap_or_default();
                record.to_domain(users)
            })
            .collect()
    }

    async fn mark_notifications_read(&mut self, user_id: Uuid) -> PortResult<u64> {
        let sql = format!(
            "INSERT INTO notification_reads (notification_id, user_id) \
             SELECT n.id, $1 FROM notifications n WHERE {} \
             ON CONFLICT (notification_id, user_id) DO NOTHING",
            VISIBLE_TO_USER
        );
        let result = sqlx::query(&sql)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected())
    }
}

//=========================================================================================
// Audit Log
//=========================================================================================

#[async_trait]
impl AuditRepository for PgTransaction {
    async fn insert_audit_entry(&mut self, entry: &AuditEntry) -> PortResult<()> {
        sqlx::query("INSERT INTO audit_logs (kind, message, actor_id) VALUES ($1, $2, $3)")
            .bind(entry.kind.as_str())
            .bind(&entry.message)
            .bind(entry.actor_id)
            .execute(&mut *self.tx)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_patterns_escape_wildcards() {
        assert_eq!(like_pattern("bid-1"), "%bid-1%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
