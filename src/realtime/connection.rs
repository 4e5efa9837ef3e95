use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sqlx::PgPool;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{error::AppError, state::AppState, utils::jwt::verify_jwt};

use super::events::{ChatEvent, ClientCommand};
use super::notifier::Notifier;

#[derive(Debug, Deserialize)]
pub struct WsAuthParams {
    /// Bearer credential. Browsers cannot set headers on socket upgrades,
    /// so it rides the handshake query string instead.
    pub token: Option<String>,
}

/// WebSocket handshake. Invalid or missing credentials refuse the
/// connection with 401 before the upgrade; there is no server-side retry.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsAuthParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let token = params
        .token
        .ok_or_else(|| AppError::AuthError("Missing token".to_string()))?;

    let claims = verify_jwt(&token, &state.config.jwt_secret)?;
    let user_id = claims.user_id()?;
    let username = claims.username;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id, username)))
}

/// One task pair per session: the send half forwards notifier events the
/// session is scoped to, the receive half processes client commands.
async fn handle_socket(socket: WebSocket, state: AppState, user_id: i64, username: String) {
    let (mut sender, mut receiver) = socket.split();
    let notifier = state.notifier.clone();
    let conn_id = Uuid::new_v4();

    info!("{} ({}) connected to realtime socket", username, user_id);
    notifier.session_online(user_id, conn_id).await;

    // Per-session conversation subscriptions, shared between both halves.
    let subscriptions: Arc<std::sync::RwLock<HashSet<i64>>> =
        Arc::new(std::sync::RwLock::new(HashSet::new()));

    let mut events_rx = notifier.subscribe();
    let send_subscriptions = subscriptions.clone();

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // At-most-once delivery: missed events are gone.
                    warn!("session lagged, dropped {} events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            if let Some(conversation_id) = event.conversation_id() {
                let subs = send_subscriptions
                    .read()
                    .expect("subscription lock poisoned");
                if !subs.contains(&conversation_id) {
                    continue;
                }
            }

            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("failed to serialize event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let pool = state.pool.clone();
    let recv_notifier = notifier.clone();
    let recv_subscriptions = subscriptions.clone();
    let recv_username = username.clone();

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(
                            &pool,
                            &recv_notifier,
                            user_id,
                            &recv_username,
                            cmd,
                            &recv_subscriptions,
                        )
                        .await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_username,
                            user_id,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either half to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    notifier.session_offline(user_id, conn_id).await;
    info!("{} ({}) disconnected from realtime socket", username, user_id);
}

async fn handle_command(
    pool: &PgPool,
    notifier: &Notifier,
    user_id: i64,
    username: &str,
    cmd: ClientCommand,
    subscriptions: &Arc<std::sync::RwLock<HashSet<i64>>>,
) {
    match cmd {
        ClientCommand::JoinConversation { conversation_id } => {
            // Membership gate; joining an already-joined conversation is a no-op.
            match is_participant(pool, conversation_id, user_id).await {
                Ok(true) => {
                    subscriptions
                        .write()
                        .expect("subscription lock poisoned")
                        .insert(conversation_id);
                }
                Ok(false) => {
                    warn!(
                        "{} ({}) tried to join conversation {} they are not part of",
                        username, user_id, conversation_id
                    );
                }
                Err(e) => {
                    warn!("membership check failed: {}", e);
                }
            }
        }

        ClientCommand::LeaveConversation { conversation_id } => {
            subscriptions
                .write()
                .expect("subscription lock poisoned")
                .remove(&conversation_id);
        }

        ClientCommand::Typing { conversation_id } => {
            let subscribed = subscriptions
                .read()
                .expect("subscription lock poisoned")
                .contains(&conversation_id);

            // Only participants who joined the conversation may signal typing.
            if subscribed {
                notifier.emit(ChatEvent::UserTyping {
                    conversation_id,
                    user_id,
                    username: username.to_string(),
                });
            }
        }
    }
}

async fn is_participant(
    pool: &PgPool,
    conversation_id: i64,
    user_id: i64,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(
            SELECT 1 FROM conversation_participants
            WHERE conversation_id = $1 AND user_id = $2
        )",
    )
    .bind(conversation_id)
    .bind(user_id)
    .fetch_one(pool)
    .await
}
