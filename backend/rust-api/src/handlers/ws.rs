use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use mongodb::bson::oid::ObjectId;
use tokio::sync::{broadcast, mpsc};

use crate::{
    metrics,
    middlewares::auth::JwtService,
    models::chat::InboundFrame,
    models::user::Account,
    policy::{resolve_principal, Principal},
    services::{chat_service::ChatService, AppState},
};

// Application close codes, mirrored by the frontend client.
const CLOSE_MISSING_TOKEN: u16 = 4001;
const CLOSE_INVALID_TOKEN: u16 = 4003;
const CLOSE_NOT_A_MEMBER: u16 = 4004;
const CLOSE_ROLE_NOT_ALLOWED: u16 = 4005;

/// GET /ws/chat/{chat_id}?token=...
///
/// `chat_id` is either a chat id (one conversation) or the literal "all",
/// which merges every chat the caller participates in onto one connection.
/// Browsers cannot set headers on websocket requests, so the JWT rides in
/// the query string. Authentication failures surface as application close
/// codes after the upgrade completes.
pub async fn chat_socket(
    ws: WebSocketUpgrade,
    Path(chat_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let token = params.get("token").cloned();
    ws.on_upgrade(move |socket| handle_socket(socket, state, chat_id, token))
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    chat_id: String,
    token: Option<String>,
) {
    let Some(token) = token else {
        close_with(socket, CLOSE_MISSING_TOKEN, "Missing token").await;
        return;
    };

    let jwt_service = JwtService::new(&state.config.jwt_secret);
    let claims = match jwt_service.validate_token(&token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!("Websocket token rejected: {}", e);
            close_with(socket, CLOSE_INVALID_TOKEN, "Invalid token").await;
            return;
        }
    };

    let principal = match resolve_principal(&state.mongo, &claims).await {
        Ok(principal) => principal,
        Err(_) => {
            close_with(socket, CLOSE_INVALID_TOKEN, "Invalid token").await;
            return;
        }
    };

    let chat_service = ChatService::new(state.mongo.clone());

    // Membership snapshot taken at connect time. Chats created afterwards
    // need a reconnect to appear, same as the legacy consumer.
    let (mode, members) = if chat_id == "all" {
        if !matches!(principal, Principal::Teacher(_, _)) {
            close_with(
                socket,
                CLOSE_ROLE_NOT_ALLOWED,
                "Only teachers can use the merged chat stream",
            )
            .await;
            return;
        }
        let chats = match chat_service.list_chats(&principal).await {
            Ok(chats) => chats,
            Err(_) => {
                close_with(socket, CLOSE_NOT_A_MEMBER, "Cannot load chats").await;
                return;
            }
        };
        let members: HashMap<String, ObjectId> = chats
            .into_iter()
            .filter_map(|chat| chat.id.map(|id| (id.to_hex(), id)))
            .collect();
        ("all", members)
    } else {
        match chat_service.load_member_chat(&principal, &chat_id).await {
            Ok(chat) => {
                let oid = chat.id.unwrap_or_default();
                ("single", HashMap::from([(oid.to_hex(), oid)]))
            }
            Err(_) => {
                close_with(socket, CLOSE_NOT_A_MEMBER, "Not a chat participant").await;
                return;
            }
        }
    };

    metrics::WS_CONNECTIONS_ACTIVE.inc();
    run_session(socket, state, chat_service, principal, mode, members).await;
    metrics::WS_CONNECTIONS_ACTIVE.dec();
}

async fn run_session(
    socket: WebSocket,
    state: Arc<AppState>,
    chat_service: ChatService,
    principal: Principal,
    mode: &'static str,
    members: HashMap<String, ObjectId>,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // One broadcast subscription per chat, merged onto an mpsc queue that a
    // single writer task drains. Keeps the socket sink single-owner.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
    let mut forwarders = Vec::with_capacity(members.len());
    for chat_hex in members.keys() {
        let rx = state.hub.subscribe(chat_hex).await;
        forwarders.push(tokio::spawn(forward_broadcasts(
            rx,
            out_tx.clone(),
            chat_hex.clone(),
        )));
    }
    drop(out_tx);

    let writer = tokio::spawn(async move {
        while let Some(payload) = out_rx.recv().await {
            if ws_sender
                .send(Message::Text(Utf8Bytes::from(payload)))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let sender_account = principal.account().clone();
    while let Some(Ok(message)) = ws_receiver.next().await {
        match message {
            Message::Text(text) => {
                handle_inbound(
                    &state,
                    &chat_service,
                    &sender_account,
                    mode,
                    &members,
                    text.as_str(),
                )
                .await;
            }
            Message::Close(_) => break,
            // Pings are answered by axum automatically.
            _ => {}
        }
    }

    for task in forwarders {
        task.abort();
    }
    writer.abort();
}

/// Drain one chat's broadcast subscription into the session's outbound
/// queue. A receiver that falls behind the hub's buffer skips the missed
/// messages and keeps forwarding; only a closed channel or a gone session
/// ends the task.
async fn forward_broadcasts(
    mut rx: broadcast::Receiver<String>,
    tx: mpsc::Sender<String>,
    chat_hex: String,
) {
    loop {
        match rx.recv().await {
            Ok(payload) => {
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(chat_id = %chat_hex, skipped, "Chat subscriber lagged, missed messages dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn handle_inbound(
    state: &Arc<AppState>,
    chat_service: &ChatService,
    sender: &Account,
    mode: &'static str,
    members: &HashMap<String, ObjectId>,
    raw: &str,
) {
    let frame: InboundFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(_) => {
            tracing::debug!("Dropping malformed chat frame");
            return;
        }
    };

    if frame.content.trim().is_empty() {
        return;
    }

    // In single mode the connection is already bound to one chat; in "all"
    // mode every frame must name a chat from the membership snapshot.
    let chat_oid = if mode == "single" {
        members.values().next().copied()
    } else {
        frame
            .chat_id
            .as_deref()
            .and_then(|hex| members.get(hex).copied())
    };
    let Some(chat_oid) = chat_oid else {
        tracing::debug!("Dropping chat frame without a resolvable chat id");
        return;
    };

    // Persist first; a message is only fanned out once it is durable.
    let message = match chat_service
        .save_message(sender, &chat_oid, frame.content.trim())
        .await
    {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Failed to persist chat message: {}", e);
            return;
        }
    };

    match serde_json::to_string(&message) {
        Ok(payload) => {
            state.hub.publish(&chat_oid.to_hex(), payload).await;
            metrics::CHAT_MESSAGES_TOTAL.with_label_values(&[mode]).inc();
        }
        Err(e) => tracing::error!("Failed to serialize chat message: {}", e),
    }
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: Utf8Bytes::from(reason.to_string()),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::chat_hub::ChatHub;

    #[tokio::test]
    async fn lagged_forwarder_recovers_and_keeps_delivering() {
        let hub = ChatHub::new();
        let rx = hub.subscribe("c1").await;

        // Overrun the per-chat buffer before the forwarder starts draining.
        for i in 0..65 {
            hub.publish("c1", format!("m{i}")).await;
        }

        let (tx, mut out) = mpsc::channel(128);
        let task = tokio::spawn(forward_broadcasts(rx, tx, "c1".to_string()));

        // The oldest message is gone; everything still buffered comes through.
        for _ in 0..64 {
            assert!(out.recv().await.is_some());
        }

        // The task must have survived the lag to deliver later messages.
        hub.publish("c1", "late".to_string()).await;
        assert_eq!(out.recv().await.as_deref(), Some("late"));
        task.abort();
    }

    #[tokio::test]
    async fn forwarder_ends_when_session_queue_closes() {
        let hub = ChatHub::new();
        let rx = hub.subscribe("c2").await;
        let (tx, out) = mpsc::channel(1);
        let task = tokio::spawn(forward_broadcasts(rx, tx, "c2".to_string()));

        drop(out);
        hub.publish("c2", "unwanted".to_string()).await;
        task.await.unwrap();
    }
}
