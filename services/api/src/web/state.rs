//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every handler and connection.

use crate::adapters::WsHub;
use crate::config::Config;
use procurement_core::ports::{CapabilityChecker, MailSender, ProcurementStore};
use procurement_core::{
    BidManager, NotificationService, ProcurementContext, PurchaseRequestManager,
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub purchase_requests: PurchaseRequestManager,
    pub bids: BidManager,
    pub notifications: NotificationService,
    pub capabilities: Arc<dyn CapabilityChecker>,
    pub hub: Arc<WsHub>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the lifecycle managers over the given ports. The hub doubles as the
    /// push transport for notifications.
    pub fn new(
        store: Arc<dyn ProcurementStore>,
        mail: Arc<dyn MailSender>,
        capabilities: Arc<dyn CapabilityChecker>,
        config: Arc<Config>,
    ) -> Self {
        let hub = Arc::new(WsHub::new());
        let ctx = ProcurementContext::new(store, mail, hub.clone());
        Self {
            purchase_requests: PurchaseRequestManager::new(ctx.clone()),
            bids: BidManager::new(ctx.clone()),
            notifications: ctx.notifications,
            capabilities,
            hub,
            config,
        }
    }
}
