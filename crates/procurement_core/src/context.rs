//! crates/procurement_core/src/context.rs
//!
//! The collaborators shared by both lifecycle managers, plus the helpers that apply
//! the propagation policy: audit failures are fatal, post-commit side effects are not.

use std::sync::Arc;
use tracing::error;

use crate::domain::AuditEntry;
use crate::error::{ProcurementError, ProcurementResult};
use crate::notifications::{NotificationPayload, NotificationService};
use crate::ports::{
    AuditRepository, MailSender, OutboundMail, ProcurementStore, PushTransport, StoreTransaction,
};

#[derive(Clone)]
pub struct ProcurementContext {
    pub store: Arc<dyn ProcurementStore>,
    pub mail: Arc<dyn MailSender>,
    pub notifications: NotificationService,
}

impl ProcurementContext {
    pub fn new(
        store: Arc<dyn ProcurementStore>,
        mail: Arc<dyn MailSender>,
        push: Arc<dyn PushTransport>,
    ) -> Self {
        let notifications = NotificationService::new(store.clone(), push);
        Self {
            store,
            mail,
            notifications,
        }
    }

    /// Writes an audit entry into the operation's transaction. It commits with the
    /// operation; a failure here rolls the whole operation back.
    pub(crate) async fn audit(
        &self,
        tx: &mut dyn StoreTransaction,
        entry: AuditEntry,
    ) -> ProcurementResult<()> {
        tx.insert_audit_entry(&entry).await.map_err(|e| {
            error!("Failed to write audit entry '{}': {:?}", entry.message, e);
            ProcurementError::internal("Failed to write audit log entry")
        })
    }

    /// Creates and delivers a notification after the primary write has committed.
    pub(crate) async fn notify_after_commit(&self, payload: NotificationPayload) {
        let kind = payload.kind;
        if let Err(e) = self.notifications.create_and_send(payload).await {
            error!("Failed to create {} notification: {:?}", kind, e);
        }
    }

    pub(crate) async fn mail_after_commit(&self, mail: OutboundMail) {
        let template = mail.template;
        if let Err(e) = self.mail.send(mail).await {
            error!("Failed to queue {} mail: {:?}", template.as_str(), e);
        }
    }
}
