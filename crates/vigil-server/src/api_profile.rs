//! Profile endpoints: device push-token registration.

use axum::{extract::Extension, response::Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{envelope, ApiError};
use crate::middleware::AuthContext;
use crate::principal::set_push_token;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PushTokenRequest {
    /// The device token; `null` clears it.
    pub token: Option<String>,
}

/// PUT /api/profile/push-token
///
/// Registers (or clears) the device token the offline-push fallback uses
/// for this user.
pub async fn set_push_token_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthContext(user)): Extension<AuthContext>,
    Json(payload): Json<PushTokenRequest>,
) -> Result<Json<Value>, ApiError> {
    let updated = tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::internal("failed to get db connection for set_push_token", e))?;
        set_push_token(&conn, &user.id, payload.token.as_deref())
            .map_err(|e| ApiError::internal("failed to store push token", e))
    })
    .await
    .map_err(|e| ApiError::internal("set_push_token task join error", e))??;

    if !updated {
        // The middleware loaded this user moments ago; a miss here means
        // the account vanished mid-request.
        return Err(ApiError::Unauthorized);
    }

    Ok(envelope(json!({ "updated": true })))
}
