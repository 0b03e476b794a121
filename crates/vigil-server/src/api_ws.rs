//! WebSocket endpoint: handshake authentication and session lifecycle.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        ConnectInfo, Extension, Query, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::auth::verify_token;
use crate::principal::{get_user, User};
use crate::realtime::OutgoingEvent;
use crate::AppState;

/// Bound of the per-session outbound queue. Prevents unbounded memory
/// growth from slow consumers; beyond this the client is too slow and
/// frames are dropped.
const SESSION_QUEUE_SIZE: usize = 256;

/// Query parameters for the WebSocket connection.
#[derive(Debug, Deserialize)]
pub struct WsConnectParams {
    pub token: Option<String>,
}

/// Incoming WebSocket frames, tagged by event name.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IncomingEvent {
    /// Liveness probe; answered with a `pong` frame.
    Ping,
}

/// WebSocket handler: `GET /ws?token=...`.
///
/// The credential is verified with the same rule as the request-layer
/// middleware, and the user must still exist and be active — all before
/// the upgrade completes, so an unauthenticated connection never joins a
/// room. Auth failures are not retried by the server; the client must
/// reconnect with a valid credential.
///
/// All auth attempts (success and failure) are logged with the remote
/// address for security monitoring.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
    Query(params): Query<WsConnectParams>,
) -> impl IntoResponse {
    // 1. The credential is required up front
    let Some(token) = params.token else {
        tracing::warn!(remote_addr = %addr, "websocket connect missing token");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let user_id = match verify_token(&token, &state.token_secret) {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::warn!(remote_addr = %addr, error = %e, "websocket token verification failed");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    // 2. The token may outlive the account; load and check the user row
    let state_clone = state.clone();
    let lookup_id = user_id.clone();
    let auth_result = tokio::task::spawn_blocking(move || {
        let conn = state_clone
            .pool
            .get()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        match get_user(&conn, &lookup_id) {
            Ok(Some(user)) if user.active => Ok(user),
            Ok(Some(_)) => Err(StatusCode::FORBIDDEN), // Inactive
            Ok(None) => Err(StatusCode::UNAUTHORIZED),
            Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
        }
    })
    .await;

    match auth_result {
        Ok(Ok(user)) => {
            tracing::info!(user_id = %user.id, remote_addr = %addr, "websocket auth success");
            ws.on_upgrade(move |socket| handle_socket(socket, state, user))
        }
        Ok(Err(code)) => {
            tracing::warn!(
                user_id = %user_id,
                remote_addr = %addr,
                status = %code,
                "websocket auth failed"
            );
            code.into_response()
        }
        Err(e) => {
            tracing::error!(remote_addr = %addr, "websocket auth task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Handles one authenticated WebSocket connection.
///
/// The session joins the room named after its owning user id, derived once
/// at the handshake and immutable for the connection's lifetime. On any
/// close the session is explicitly removed from the room.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user: User) {
    // `initialize` rather than `handle`: the first connection may arrive
    // before the startup path ran, and repeated initialization is a no-op.
    let manager = state.realtime.initialize().clone();

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(SESSION_QUEUE_SIZE);

    let session_id = manager.add_session(&user.id, tx.clone()).await;
    tracing::info!(user_id = %user.id, session_id = %session_id, "session joined room");

    // Forward queued frames to the socket
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            WsMessage::Text(text) => match serde_json::from_str::<IncomingEvent>(&text) {
                Ok(IncomingEvent::Ping) => {
                    send_event(&tx, &OutgoingEvent::Pong);
                }
                Err(_) => {
                    tracing::warn!(user_id = %user.id, "unparseable websocket frame");
                    send_event(
                        &tx,
                        &OutgoingEvent::Error {
                            message: "invalid frame format".to_string(),
                        },
                    );
                }
            },
            WsMessage::Close(_) => break,
            // Transport-level ping/pong is handled by axum
            _ => {}
        }
    }

    manager.remove_session(&user.id, session_id).await;
    send_task.abort();
    tracing::info!(user_id = %user.id, session_id = %session_id, "session left room");
}

/// Queues a serialized event on the session channel.
fn send_event(tx: &mpsc::Sender<String>, event: &OutgoingEvent) {
    match serde_json::to_string(event) {
        Ok(frame) => {
            if let Err(e) = tx.try_send(frame) {
                tracing::warn!("failed to queue frame for session: {}", e);
            }
        }
        Err(e) => {
            tracing::error!("failed to serialize websocket event: {}", e);
        }
    }
}
