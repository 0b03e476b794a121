//! Notification HTTP endpoints.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use vigil_notify::{
    create_notification, delete_notification, list_for_user, mark_all_read, mark_read,
    CreateNotificationParams,
};
use vigil_types::NotificationKind;

use crate::error::{envelope, ApiError};
use crate::middleware::AuthContext;
use crate::realtime::OutgoingEvent;
use crate::AppState;

/// GET /api/notifications
///
/// The 50 most recent notifications for the authenticated user, newest
/// first.
pub async fn list_notifications_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthContext(user)): Extension<AuthContext>,
) -> Result<Json<Value>, ApiError> {
    let notifications = tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::internal("failed to get db connection for list_notifications", e))?;
        list_for_user(&conn, &user.id).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::internal("list_notifications task join error", e))??;

    Ok(envelope(serde_json::to_value(notifications)?))
}

/// PATCH /api/notifications/:id/read
///
/// Conditional on ownership: marking another user's notification reports
/// the same 404 as an unknown id.
pub async fn mark_read_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthContext(user)): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let updated = tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::internal("failed to get db connection for mark_read", e))?;
        mark_read(&conn, &id, &user.id).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::internal("mark_read task join error", e))??
    .ok_or_else(|| ApiError::NotFound("notification not found".to_string()))?;

    Ok(envelope(serde_json::to_value(updated)?))
}

/// PATCH /api/notifications/mark-all-read
///
/// Idempotent bulk update scoped to the authenticated user; reports how
/// many records changed.
pub async fn mark_all_read_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthContext(user)): Extension<AuthContext>,
) -> Result<Json<Value>, ApiError> {
    let count = tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::internal("failed to get db connection for mark_all_read", e))?;
        mark_all_read(&conn, &user.id).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::internal("mark_all_read task join error", e))??;

    Ok(envelope(json!({ "modified_count": count })))
}

/// DELETE /api/notifications/:id
pub async fn delete_notification_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthContext(user)): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deleted = tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::internal("failed to get db connection for delete_notification", e))?;
        delete_notification(&conn, &id, &user.id).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::internal("delete_notification task join error", e))??;

    if !deleted {
        return Err(ApiError::NotFound("notification not found".to_string()));
    }

    Ok(envelope(json!({ "deleted": true })))
}

#[derive(Debug, Deserialize)]
pub struct TestNotificationRequest {
    pub message: String,
    #[serde(default)]
    pub kind: Option<NotificationKind>,
    #[serde(default, alias = "reportId")]
    pub report_id: Option<String>,
}

/// POST /api/notifications/test
///
/// Development endpoint: creates a synthetic notification for the
/// authenticated user and delivers it through the normal realtime path.
pub async fn create_test_notification_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthContext(user)): Extension<AuthContext>,
    Json(payload): Json<TestNotificationRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if payload.message.trim().is_empty() {
        return Err(ApiError::Validation("message is required".to_string()));
    }
    let report_id = payload
        .report_id
        .ok_or_else(|| ApiError::Validation("report_id is required".to_string()))?;

    let params = CreateNotificationParams {
        user_id: user.id.clone(),
        report_id,
        message: payload.message,
        kind: payload.kind.unwrap_or(NotificationKind::Info),
    };

    let state_clone = state.clone();
    let notification = tokio::task::spawn_blocking(move || {
        let conn = state_clone
            .pool
            .get()
            .map_err(|e| ApiError::internal("failed to get db connection for test notification", e))?;
        create_notification(&conn, &params).map_err(|e| {
            // An unknown report id shows up as a foreign-key violation
            if let vigil_notify::NotifyError::Database(rusqlite::Error::SqliteFailure(code, _)) = &e
            {
                if code.code == rusqlite::ffi::ErrorCode::ConstraintViolation {
                    return ApiError::Validation("report_id does not resolve".to_string());
                }
            }
            ApiError::from(e)
        })
    })
    .await
    .map_err(|e| ApiError::internal("test notification task join error", e))??;

    state
        .realtime
        .deliver(&user.id, &OutgoingEvent::Notification(notification.clone()))
        .await;

    Ok((
        StatusCode::CREATED,
        envelope(serde_json::to_value(notification)?),
    ))
}
