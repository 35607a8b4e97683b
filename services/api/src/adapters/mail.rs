//! services/api/src/adapters/mail.rs
//!
//! Queues templated mail in the `mail_outbox` table. Rendering and delivery belong to
//! the external mail worker that drains the outbox.

use async_trait::async_trait;
use procurement_core::ports::{MailSender, OutboundMail, PortError, PortResult};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct OutboxMailSender {
    pool: PgPool,
}

impl OutboxMailSender {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MailSender for OutboxMailSender {
    async fn send(&self, mail: OutboundMail) -> PortResult<()> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO mail_outbox (id, template, recipient_id, purchase_request_id, bid_id) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(mail.template.as_str())
        .bind(mail.recipient_id)
        .bind(mail.purchase_request_id)
        .bind(mail.bid_id)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        debug!(
            "Queued {} mail {} for user {}",
            mail.template.as_str(),
            id,
            mail.recipient_id
        );
        Ok(())
    }
}
