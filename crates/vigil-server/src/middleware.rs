//! Request authentication middleware.

use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::auth::verify_token;
use crate::error::ApiError;
use crate::principal::{get_user, User};
use crate::AppState;

/// The authenticated user, stored in request extensions for handlers.
#[derive(Clone, Debug)]
pub struct AuthContext(pub User);

/// Middleware protecting every `/api` route.
///
/// Extracts `Authorization: Bearer <token>`, verifies the signature and
/// expiry with the same rule the WebSocket handshake uses, then loads the
/// user row — the token may outlive the account, so the row must still
/// exist and be active. Any failure is an existence-hiding 401.
pub async fn auth_middleware(mut req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    // 1. Extract the bearer token
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    // 2. Get AppState
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or(ApiError::Internal)?
        .clone();

    // 3. Verify the credential
    let user_id = verify_token(&token, &state.token_secret).map_err(|e| {
        tracing::debug!(error = %e, "bearer token rejected");
        ApiError::Unauthorized
    })?;

    // 4. Load the user (blocking DB operation)
    let user = tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::internal("failed to get db connection for auth", e))?;
        get_user(&conn, &user_id).map_err(|e| ApiError::internal("failed to load user for auth", e))
    })
    .await
    .map_err(|e| ApiError::internal("auth task join error", e))??
    .ok_or(ApiError::Unauthorized)?;

    // 5. Check if active
    if !user.active {
        return Err(ApiError::Unauthorized);
    }

    // 6. Insert into extensions
    req.extensions_mut().insert(AuthContext(user));

    Ok(next.run(req).await)
}
