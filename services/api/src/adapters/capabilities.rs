//! services/api/src/adapters/capabilities.rs
//!
//! Capability checks backed by the `user_permissions` table. A grant without a
//! purchase request applies everywhere; a scoped grant applies to that request only.

use async_trait::async_trait;
use procurement_core::ports::{
    Capability, CapabilityChecker, PortError, PortResult, ResourceScope,
};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgCapabilities {
    pool: PgPool,
}

impl PgCapabilities {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CapabilityChecker for PgCapabilities {
    async fn has_capability(
        &self,
        user_id: Uuid,
        capability: Capability,
        scope: ResourceScope,
    ) -> PortResult<bool> {
        let scoped_to = match scope {
            ResourceScope::Global => None,
            ResourceScope::PurchaseRequest(id) => Some(id),
        };
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM user_permissions \
             WHERE user_id = $1 AND permission = $2 \
             AND (purchase_request_id IS NULL OR purchase_request_id = $3))",
        )
        .bind(user_id)
        .bind(capability.as_str())
        .bind(scoped_to)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))
    }
}
