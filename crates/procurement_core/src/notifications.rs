//! crates/procurement_core/src/notifications.rs
//!
//! Notification construction, persistence and delivery.
//!
//! The factory turns a typed payload into an immutable record whose audience is
//! resolved once, up front. The dispatcher then matches on that audience to pick
//! exactly one delivery strategy.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{Audience, Notification, NotificationKind, NotificationStatus};
use crate::error::ProcurementResult;
use crate::ports::{
    NotificationRepository, PortResult, ProcurementStore, PushTransport, StoreTransaction,
    NOTIFICATION_EVENT,
};

//=========================================================================================
// Payload & Factory
//=========================================================================================

/// Everything needed to build a notification.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    pub kind: NotificationKind,
    pub message: String,
    pub is_public: bool,
    pub creator_id: Option<Uuid>,
    pub recipients: Vec<Uuid>,
    pub bid_id: Option<Uuid>,
    pub purchase_request_id: Option<Uuid>,
}

impl NotificationPayload {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            is_public: false,
            creator_id: None,
            recipients: Vec::new(),
            bid_id: None,
            purchase_request_id: None,
        }
    }

    pub fn public(mut self) -> Self {
        self.is_public = true;
        self
    }

    pub fn from_creator(mut self, creator_id: Uuid) -> Self {
        self.creator_id = Some(creator_id);
        self
    }

    pub fn to_users(mut self, recipients: Vec<Uuid>) -> Self {
        self.recipients = recipients;
        self
    }

    pub fn with_bid(mut self, bid_id: Uuid) -> Self {
        self.bid_id = Some(bid_id);
        self
    }

    pub fn with_purchase_request(mut self, purchase_request_id: Uuid) -> Self {
        self.purchase_request_id = Some(purchase_request_id);
        self
    }
}

/// First match wins: public flag, then a non-empty recipient list, then the creator.
pub fn resolve_audience(is_public: bool, recipients: Vec<Uuid>) -> Audience {
    if is_public {
        return Audience::Public;
    }
    let mut unique = Vec::with_capacity(recipients.len());
    for user_id in recipients {
        if !unique.contains(&user_id) {
            unique.push(user_id);
        }
    }
    if unique.is_empty() {
        Audience::Creator
    } else {
        Audience::Recipients(unique)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationFactory;

impl NotificationFactory {
    pub fn create(&self, payload: NotificationPayload) -> Notification {
        if payload.is_public && !payload.recipients.is_empty() {
            warn!(
                "Public notification also named {} recipients; broadcasting only",
                payload.recipients.len()
            );
        }
        Notification {
            id: Uuid::new_v4(),
            kind: payload.kind,
            message: payload.message,
            status: NotificationStatus::Unread,
            audience: resolve_audience(payload.is_public, payload.recipients),
            creator_id: payload.creator_id,
            bid_id: payload.bid_id,
            purchase_request_id: payload.purchase_request_id,
            created_at: Utc::now(),
        }
    }
}

//=========================================================================================
// Dispatcher
//=========================================================================================

/// What the dispatcher ended up doing with a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Broadcast,
    Users(usize),
    Creator(Uuid),
    /// No addressable audience; nothing was sent.
    Dropped,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    transport: Arc<dyn PushTransport>,
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        Self { transport }
    }

    pub async fn dispatch(&self, notification: &Notification) -> PortResult<Delivery> {
        match &notification.audience {
            Audience::Public => {
                self.transport
                    .push_to_all(NOTIFICATION_EVENT, notification)
                    .await?;
                info!("Public notification sent: {}", notification.id);
                Ok(Delivery::Broadcast)
            }
            Audience::Recipients(users) => {
                for user_id in users {
                    self.transport
                        .push_to_user(*user_id, NOTIFICATION_EVENT, notification)
                        .await?;
                }
                info!(
                    "Notification {} sent to {} users",
                    notification.id,
                    users.len()
                );
                Ok(Delivery::Users(users.len()))
            }
            Audience::Creator => match notification.creator_id {
                Some(creator_id) => {
                    self.transport
                        .push_to_user(creator_id, NOTIFICATION_EVENT, notification)
                        .await?;
                    info!(
                        "Notification {} sent to creator {}",
                        notification.id, creator_id
                    );
                    Ok(Delivery::Creator(creator_id))
                }
                None => {
                    warn!("No creator found for notification {}", notification.id);
                    Ok(Delivery::Dropped)
                }
            },
        }
    }
}

//=========================================================================================
// Service
//=========================================================================================

/// Persists notifications and hands them to the dispatcher.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn ProcurementStore>,
    factory: NotificationFactory,
    dispatcher: NotificationDispatcher,
}

impl NotificationService {
    pub fn new(store: Arc<dyn ProcurementStore>, transport: Arc<dyn PushTransport>) -> Self {
        Self {
            store,
            factory: NotificationFactory,
            dispatcher: NotificationDispatcher::new(transport),
        }
    }

    /// Builds and persists a notification inside the caller's transaction.
    /// Delivery is left to the caller, once the transaction has committed.
    pub async fn record(
        &self,
        tx: &mut dyn StoreTransaction,
        payload: NotificationPayload,
    ) -> ProcurementResult<Notification> {
        let notification = self.factory.create(payload);
        tx.insert_notification(&notification).await?;
        info!("Notification created with ID: {}", notification.id);
        Ok(notification)
    }

    /// Pushes an already persisted notification. Failures are logged, never returned:
    /// the stored record stays the source of truth and is fetched on reconnect.
    pub async fn deliver(&self, notification: &Notification) -> Option<Delivery> {
        match self.dispatcher.dispatch(notification).await {
            Ok(delivery) => Some(delivery),
            Err(e) => {
                error!(
                    "Failed to dispatch notification {}: {:?}",
                    notification.id, e
                );
                None
            }
        }
    }

    /// Persists the notification in its own transaction, then delivers it.
    pub async fn create_and_send(
        &self,
        payload: NotificationPayload,
    ) -> ProcurementResult<Notification> {
        let mut tx = self.store.begin().await?;
        let notification = self.record(tx.as_mut(), payload).await?;
        tx.commit().await?;
        self.deliver(&notification).await;
        Ok(notification)
    }

    /// Notifications visible to the user, newest first.
    pub async fn inbox(&self, user_id: Uuid) -> ProcurementResult<Vec<Notification>> {
        let mut tx = self.store.begin().await?;
        let notifications = tx.notifications_for_user(user_id).await?;
        Ok(notifications)
    }

    pub async fn unread(&self, user_id: Uuid) -> ProcurementResult<Vec<Notification>> {
        let notifications = self.inbox(user_id).await?;
        Ok(notifications
            .into_iter()
            .filter(|n| n.status == NotificationStatus::Unread)
            .collect())
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> ProcurementResult<u64> {
        let mut tx = self.store.begin().await?;
        let updated = tx.mark_notifications_read(user_id).await?;
        tx.commit().await?;
        info!(
            "Marked {} notifications as read for user {}",
            updated, user_id
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RecordingPush;

    #[test]
    fn public_flag_wins_over_recipients() {
        let audience = resolve_audience(true, vec![Uuid::new_v4()]);
        assert_eq!(audience, Audience::Public);
    }

    #[test]
    fn recipients_are_deduplicated_in_order() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(
            resolve_audience(false, vec![a, b, a]),
            Audience::Recipients(vec![a, b])
        );
    }

    #[test]
    fn empty_recipients_fall_back_to_creator() {
        assert_eq!(resolve_audience(false, Vec::new()), Audience::Creator);
    }

    #[test]
    fn factory_initialises_unread_records() {
        let pr = Uuid::new_v4();
        let notification = NotificationFactory.create(
            NotificationPayload::new(NotificationKind::NewPurchaseRequest, "hi")
                .with_purchase_request(pr),
        );
        assert_eq!(notification.status, NotificationStatus::Unread);
        assert_eq!(notification.purchase_request_id, Some(pr));
        assert_eq!(notification.bid_id, None);
    }

    #[tokio::test]
    async fn public_notifications_only_hit_the_broadcast_channel() {
        let push = Arc::new(RecordingPush::default());
        let dispatcher = NotificationDispatcher::new(push.clone());
        let notification = NotificationFactory.create(
            NotificationPayload::new(NotificationKind::NewPurchaseRequest, "open tender")
                .public()
                .to_users(vec![Uuid::new_v4()]),
        );

        let delivery = dispatcher.dispatch(&notification).await.unwrap();

        assert_eq!(delivery, Delivery::Broadcast);
        assert_eq!(push.broadcasts().len(), 1);
        assert!(push.direct().is_empty());
    }

    #[tokio::test]
    async fn explicit_recipients_are_pushed_individually() {
        let push = Arc::new(RecordingPush::default());
        let dispatcher = NotificationDispatcher::new(push.clone());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let notification = NotificationFactory.create(
            NotificationPayload::new(NotificationKind::BidInvitation, "invited")
                .from_creator(Uuid::new_v4())
                .to_users(vec![a, b]),
        );

        let delivery = dispatcher.dispatch(&notification).await.unwrap();

        assert_eq!(delivery, Delivery::Users(2));
        let users: Vec<_> = push.direct().into_iter().map(|(user, _)| user).collect();
        assert_eq!(users, vec![a, b]);
        assert!(push.broadcasts().is_empty());
    }

    #[tokio::test]
    async fn creator_fallback_and_silent_drop() {
        let push = Arc::new(RecordingPush::default());
        let dispatcher = NotificationDispatcher::new(push.clone());
        let creator = Uuid::new_v4();

        let to_creator = NotificationFactory.create(
            NotificationPayload::new(NotificationKind::NewBid, "self").from_creator(creator),
        );
        assert_eq!(
            dispatcher.dispatch(&to_creator).await.unwrap(),
            Delivery::Creator(creator)
        );

        let orphan =
            NotificationFactory.create(NotificationPayload::new(NotificationKind::NewBid, "lost"));
        assert_eq!(dispatcher.dispatch(&orphan).await.unwrap(), Delivery::Dropped);
        assert_eq!(push.direct().len(), 1);
    }
}
