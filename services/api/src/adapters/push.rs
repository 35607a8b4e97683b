//! services/api/src/adapters/push.rs
//!
//! The in-process hub that fans notifications out to connected WebSocket clients.
//! Each connection registers an unbounded channel; the socket writer task drains it.

use async_trait::async_trait;
use procurement_core::domain::Notification;
use procurement_core::ports::{PortError, PortResult, PushTransport};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;
use uuid::Uuid;

/// One event queued for a connected client.
#[derive(Debug, Clone)]
pub struct PushEvent {
    pub event: String,
    pub notification: Notification,
}

struct Connection {
    id: Uuid,
    sender: UnboundedSender<PushEvent>,
}

#[derive(Default)]
pub struct WsHub {
    connections: RwLock<HashMap<Uuid, Vec<Connection>>>,
}

/// Returned by [`WsHub::register`]; identifies the connection for `unregister`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionId(Uuid);

impl WsHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: Uuid) -> PortResult<(ConnectionId, UnboundedReceiver<PushEvent>)> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.connections
            .write()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .entry(user_id)
            .or_default()
            .push(Connection { id, sender });
        debug!("Registered connection {} for user {}", id, user_id);
        Ok((ConnectionId(id), receiver))
    }

    pub fn unregister(&self, user_id: Uuid, connection: ConnectionId) {
        if let Ok(mut connections) = self.connections.write() {
            if let Some(list) = connections.get_mut(&user_id) {
                list.retain(|c| c.id != connection.0);
                if list.is_empty() {
                    connections.remove(&user_id);
                }
            }
        }
    }

    pub fn connected_users(&self) -> usize {
        self.connections.read().map(|c| c.len()).unwrap_or(0)
    }

    fn send_to(connections: &[Connection], event: &PushEvent) {
        for connection in connections {
            // A closed channel means the socket is going away; unregister cleans it up.
            let _ = connection.sender.send(event.clone());
        }
    }
}

#[async_trait]
impl PushTransport for WsHub {
    async fn push_to_user(
        &self,
        user_id: Uuid,
        event: &str,
        notification: &Notification,
    ) -> PortResult<()> {
        let connections = self
            .connections
            .read()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if let Some(list) = connections.get(&user_id) {
            let event = PushEvent {
                event: event.to_string(),
                notification: notification.clone(),
            };
            Self::send_to(list, &event);
        }
        Ok(())
    }

    async fn push_to_all(&self, event: &str, notification: &Notification) -> PortResult<()> {
        let connections = self
            .connections
            .read()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let event = PushEvent {
            event: event.to_string(),
            notification: notification.clone(),
        };
        for list in connections.values() {
            Self::send_to(list, &event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use procurement_core::domain::{Audience, NotificationKind, NotificationStatus};
    use procurement_core::ports::NOTIFICATION_EVENT;

    fn notification() -> Notification {
        Notification {
            id: Uuid::new_v4(),
            kind: NotificationKind::NewBid,
            message: "new bid".to_string(),
            status: NotificationStatus::Unread,
            audience: Audience::Public,
            creator_id: None,
            bid_id: None,
            purchase_request_id: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn pushes_reach_only_the_addressed_user() {
        let hub = WsHub::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let (_, mut alice_rx) = hub.register(alice).unwrap();
        let (_, mut bob_rx) = hub.register(bob).unwrap();

        hub.push_to_user(alice, NOTIFICATION_EVENT, &notification())
            .await
            .unwrap();

        assert_eq!(alice_rx.try_recv().unwrap().event, NOTIFICATION_EVENT);
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcasts_reach_every_connection_until_unregistered() {
        let hub = WsHub::new();
        let user = Uuid::new_v4();
        let (first, mut first_rx) = hub.register(user).unwrap();
        let (_, mut second_rx) = hub.register(user).unwrap();

        hub.push_to_all(NOTIFICATION_EVENT, &notification()).await.unwrap();
        assert!(first_rx.try_recv().is_ok());
        assert!(second_rx.try_recv().is_ok());

        hub.unregister(user, first);
        hub.push_to_all(NOTIFICATION_EVENT, &notification()).await.unwrap();
        assert!(first_rx.try_recv().is_err());
        assert!(second_rx.try_recv().is_ok());
        assert_eq!(hub.connected_users(), 1);
    }
}
