//! Shared fixtures: a fully wired core over the in-memory ports.
#![allow(dead_code)]

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use procurement_core::domain::{Company, PurchaseRequest, PurchaseRequestStatus, User, Visibility};
use procurement_core::memory::{MemoryStore, RecordingMail, RecordingPush};
use procurement_core::{
    BidManager, NewBid, NewPurchaseRequest, NotificationService, ProcurementContext,
    PurchaseRequestManager,
};

pub struct Harness {
    pub store: MemoryStore,
    pub mail: Arc<RecordingMail>,
    pub push: Arc<RecordingPush>,
    pub requests: PurchaseRequestManager,
    pub bids: BidManager,
    pub notifications: NotificationService,
    pub buyer: User,
    pub department_id: Uuid,
}

/// A supplier company together with one active member.
pub struct Supplier {
    pub company: Company,
    pub member: User,
}

impl Harness {
    pub async fn new() -> Self {
        let store = MemoryStore::new();
        let mail = Arc::new(RecordingMail::default());
        let push = Arc::new(RecordingPush::default());
        let ctx = ProcurementContext::new(
            Arc::new(store.clone()),
            mail.clone(),
            push.clone(),
        );
        let department = store.add_department("Procurement").await;
        let buyer = store.add_user("buyer@example.com", None).await;

        Self {
            notifications: ctx.notifications.clone(),
            requests: PurchaseRequestManager::new(ctx.clone()),
            bids: BidManager::new(ctx),
            store,
            mail,
            push,
            buyer,
            department_id: department.id,
        }
    }

    pub async fn supplier(&self, name: &str) -> Supplier {
        let company = self.store.add_company(name).await;
        let member = self
            .store
            .add_user(&format!("sales@{}.example.com", name.to_lowercase()), Some(company.id))
            .await;
        self.store.set_company_owner(company.id, member.id).await;
        let company = Company {
            owner_id: Some(member.id),
            ..company
        };
        Supplier { company, member }
    }

    pub fn new_request(&self, visibility: Visibility) -> NewPurchaseRequest {
        NewPurchaseRequest {
            title: "Industrial valves".to_string(),
            description: Some("DN50 gate valves".to_string()),
            category: Some("Hardware".to_string()),
            department_id: self.department_id,
            delivery_date: Utc::now() + Duration::days(30),
            delivery_address: "Dock 4".to_string(),
            bidding_deadline: Utc::now() + Duration::days(7),
            visibility: Some(visibility),
            attachments: Vec::new(),
        }
    }

    /// A request that is already accepting bids.
    pub async fn open_request(&self, visibility: Visibility) -> PurchaseRequest {
        let created = self
            .requests
            .create(self.buyer.id, self.new_request(visibility))
            .await
            .expect("create request");
        self.requests
            .set_status(created.id, self.buyer.id, PurchaseRequestStatus::Published)
            .await
            .expect("publish request")
    }

    pub async fn submit(
        &self,
        supplier: &Supplier,
        request: &PurchaseRequest,
    ) -> procurement_core::ProcurementResult<procurement_core::Bid> {
        self.bids
            .create_bid(supplier.member.id, bid_for(request.id, supplier.company.id))
            .await
    }
}

pub fn bid_for(purchase_request_id: Uuid, company_id: Uuid) -> NewBid {
    NewBid {
        purchase_request_id,
        company_id,
        description: Some("Best offer".to_string()),
        delivery_date: Some(Utc::now() + Duration::days(20)),
        delivery_address: Some("Dock 4".to_string()),
        bidding_date: Some(Utc::now()),
        bidding_address: None,
    }
}
