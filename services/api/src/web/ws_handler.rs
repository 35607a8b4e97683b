//! services/api/src/web/ws_handler.rs
//!
//! The notification socket. On connect the caller receives their unread backlog,
//! then every notification pushed to them (or broadcast) while the socket is open.

use crate::web::{
    dto::NotificationView,
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use procurement_core::ports::NOTIFICATION_EVENT;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::adapters::push::PushEvent;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user_id))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user_id: Uuid) {
    info!("New WebSocket connection established for user: {}", user_id);

    let (sender, mut receiver) = socket.split();
    let (connection, push_rx) = match app_state.hub.register(user_id) {
        Ok(registered) => registered,
        Err(e) => {
            error!("Failed to register connection for user {}: {:?}", user_id, e);
            return;
        }
    };

    // Replies and the backlog go through `out_tx`; live pushes arrive on `push_rx`.
    let (out_tx, out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let token = CancellationToken::new();
    let writer = tokio::spawn(write_loop(sender, out_rx, push_rx, token.clone()));

    // --- 1. Unread backlog ---
    match app_state.notifications.unread(user_id).await {
        Ok(backlog) => {
            for notification in backlog {
                send(
                    &out_tx,
                    ServerMessage::Notification {
                        event: NOTIFICATION_EVENT.to_string(),
                        notification: NotificationView::from(notification),
                    },
                );
            }
        }
        Err(e) => {
            warn!("Could not load unread notifications for {}: {:?}", user_id, e);
            send(
                &out_tx,
                ServerMessage::Error {
                    message: "Failed to load unread notifications.".to_string(),
                },
            );
        }
    }

    // --- 2. Main Message Loop ---
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            next = receiver.next() => match next {
                Some(Ok(Message::Text(text))) => {
                    let reply = handle_text_message(text.as_str(), &app_state, user_id).await;
                    send(&out_tx, reply);
                }
                Some(Ok(Message::Close(_))) => {
                    info!("Client sent close message.");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket receive error for {}: {:?}", user_id, e);
                    break;
                }
                None => {
                    info!("Client disconnected.");
                    break;
                }
            }
        }
    }

    // --- 3. Cleanup ---
    token.cancel();
    app_state.hub.unregister(user_id, connection);
    drop(out_tx);
    if let Err(e) = writer.await {
        error!("Socket writer task failed: {:?}", e);
    }
    info!("WebSocket connection closed for user: {}", user_id);
}

/// Interprets one text frame from the client.
async fn handle_text_message(text: &str, app_state: &AppState, user_id: Uuid) -> ServerMessage {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Ping) => ServerMessage::Pong,
        Ok(ClientMessage::MarkAllRead) => {
            match app_state.notifications.mark_all_read(user_id).await {
                Ok(updated) => ServerMessage::MarkedRead { updated },
                Err(e) => {
                    error!("Failed to mark notifications read for {}: {:?}", user_id, e);
                    ServerMessage::Error {
                        message: "Failed to mark notifications as read.".to_string(),
                    }
                }
            }
        }
        Err(e) => {
            warn!("Unrecognized client message: {}", e);
            ServerMessage::Error {
                message: format!("Unrecognized message: {}", e),
            }
        }
    }
}

fn send(out_tx: &UnboundedSender<ServerMessage>, message: ServerMessage) {
    // Fails only once the writer has stopped, which also ends the read loop.
    let _ = out_tx.send(message);
}

/// Owns the socket's write half until the connection is torn down.
async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut out_rx: UnboundedReceiver<ServerMessage>,
    mut push_rx: UnboundedReceiver<PushEvent>,
    token: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            Some(message) = out_rx.recv() => message,
            Some(push) = push_rx.recv() => ServerMessage::Notification {
                event: push.event,
                notification: NotificationView::from(push.notification),
            },
            else => break,
        };

        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize server message: {:?}", e);
                continue;
            }
        };
        if sender.send(Message::Text(json.into())).await.is_err() {
            warn!("Client went away while sending; stopping writer.");
            token.cancel();
            break;
        }
    }
    let _ = sender.close().await;
}
