//! Chat HTTP endpoints and message fan-out.

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use vigil_chat::{
    delete_chat, get_chat, list_chats, participants, post_message, PostMessageParams,
    PostedMessage,
};
use vigil_push::PushPayload;

use crate::error::{envelope, ApiError};
use crate::middleware::AuthContext;
use crate::principal::User;
use crate::realtime::{MessagePayload, OutgoingEvent};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub text: String,
    #[serde(default, alias = "chatId")]
    pub chat_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListChatsParams {
    pub before: Option<String>,
    pub limit: Option<u32>,
}

/// POST /api/chat
///
/// Citizens extend (or open) their own chat; officers reply to an explicit
/// `chat_id`. After a successful append the new message is fanned out to
/// the other participants on a detached task — push latency and push
/// failure never touch this response.
pub async fn post_message_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthContext(user)): Extension<AuthContext>,
    Json(payload): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let params = PostMessageParams {
        actor_role: user.role,
        actor_id: user.id.clone(),
        chat_id: payload.chat_id,
        body: payload.text,
    };

    let state_clone = state.clone();
    let posted = tokio::task::spawn_blocking(move || {
        let conn = state_clone
            .pool
            .get()
            .map_err(|e| ApiError::internal("failed to get db connection for post_message", e))?;
        post_message(&conn, &params).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::internal("post_message task join error", e))??;

    let response = envelope(serde_json::to_value(&posted.chat)?);

    tokio::spawn(fan_out_message(state, user, posted));

    Ok((StatusCode::CREATED, response))
}

/// GET /api/chat
///
/// Officers see every chat (newest activity first, `before`/`limit`
/// pagination); citizens see their own chat or an empty list.
pub async fn list_chats_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthContext(user)): Extension<AuthContext>,
    Query(params): Query<ListChatsParams>,
) -> Result<Json<Value>, ApiError> {
    let chats = tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::internal("failed to get db connection for list_chats", e))?;
        list_chats(&conn, user.role, &user.id, params.before, params.limit)
            .map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::internal("list_chats task join error", e))??;

    Ok(envelope(serde_json::to_value(chats)?))
}

/// GET /api/chat/:id
///
/// Officers may fetch any chat; citizens only chats they participate in,
/// with the miss reported as the same 404 as an unknown id.
pub async fn get_chat_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthContext(user)): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let chat = tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::internal("failed to get db connection for get_chat", e))?;
        get_chat(&conn, &id, user.role, &user.id).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::internal("get_chat task join error", e))??;

    Ok(envelope(serde_json::to_value(chat)?))
}

/// DELETE /api/chat/:id (officer only)
pub async fn delete_chat_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthContext(user)): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::internal("failed to get db connection for delete_chat", e))?;
        delete_chat(&conn, &id, user.role).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::internal("delete_chat task join error", e))??;

    Ok(envelope(json!({ "deleted": true })))
}

/// Fans a freshly appended message out to the other chat participants.
///
/// Participants with a live realtime session get the `message` frame;
/// participants without one fall back to a single offline push, keyed by
/// their stored device token. Every failure in here is logged and
/// dropped — the message is already durable.
async fn fan_out_message(state: Arc<AppState>, sender: User, posted: PostedMessage) {
    let chat_id = posted.chat.id.clone();

    let audience = {
        let pool = state.pool.clone();
        let lookup_id = chat_id.clone();
        let result = tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| e.to_string())?;
            participants(&conn, &lookup_id).map_err(|e| e.to_string())
        })
        .await;

        match result {
            Ok(Ok(audience)) => audience,
            Ok(Err(e)) => {
                tracing::warn!(chat_id = %chat_id, "participant lookup failed, skipping fan-out: {}", e);
                return;
            }
            Err(e) => {
                tracing::warn!(chat_id = %chat_id, "participant lookup task failed, skipping fan-out: {}", e);
                return;
            }
        }
    };

    let frame = OutgoingEvent::Message(MessagePayload::from(&posted.message));
    let mut offline_tokens = Vec::new();

    for participant in audience {
        if participant.user_id == sender.id {
            continue;
        }

        if state.realtime.is_connected(&participant.user_id).await {
            state.realtime.deliver(&participant.user_id, &frame).await;
        } else if let Some(token) = participant.push_token {
            offline_tokens.push(token);
        }
    }

    let payload = if posted.created_chat {
        PushPayload::new_chat(&sender.display_name, &chat_id)
    } else {
        PushPayload::new_message(&sender.display_name, &chat_id, &sender.id, &posted.message.body)
    };

    if let Err(e) = state.push.send(&offline_tokens, &payload).await {
        tracing::warn!(chat_id = %chat_id, "offline push failed: {}", e);
    }
}
