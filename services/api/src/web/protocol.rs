//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server.
//! The socket is mostly server-to-client: notification pushes, plus a couple of
//! housekeeping requests from the client.

use serde::{Deserialize, Serialize};

use crate::web::dto::NotificationView;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Marks every notification visible to the caller as read.
    MarkAllRead,

    /// Keep-alive.
    Ping,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A notification, either from the unread backlog or pushed live.
    Notification {
        event: String,
        notification: NotificationView,
    },

    /// Answer to `MarkAllRead`.
    MarkedRead { updated: u64 },

    Pong,

    /// Reports a problem with the last client message.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_snake_case_tags() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"mark_all_read"}"#).unwrap();
        assert_eq!(msg, ClientMessage::MarkAllRead);
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"init"}"#).is_err());
    }

    #[test]
    fn server_messages_are_tagged() {
        let json = serde_json::to_value(ServerMessage::MarkedRead { updated: 3 }).unwrap();
        assert_eq!(json["type"], "marked_read");
        assert_eq!(json["updated"], 3);
    }
}
