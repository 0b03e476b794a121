//! Vigil server library logic.

pub mod api_chat;
pub mod api_notifications;
pub mod api_profile;
pub mod api_reports;
pub mod api_ws;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod middleware;
pub mod principal;
pub mod realtime;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post, put},
    Extension, Json, Router,
};
use realtime::RealtimeChannel;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use vigil_db::DbPool;
use vigil_push::PushClient;

/// Application state shared across all request handlers.
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Derived HMAC key for bearer tokens.
    pub token_secret: [u8; 32],
    /// The process-wide realtime broadcast handle.
    pub realtime: RealtimeChannel,
    /// Offline push client (disabled when unconfigured).
    pub push: PushClient,
}

/// Maximum request body size (1 MiB). Protects against OOM from oversized
/// payloads; nothing this API accepts is larger than a chat message.
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Health check handler.
///
/// Returns `200 OK` with server status and version. Used by load
/// balancers, monitoring, and CI to verify the server is running.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
///
/// Also initializes the realtime channel — `initialize` is idempotent, so
/// a caller that already set it up (or a retry path) observes the same
/// registry.
pub fn app(state: AppState) -> Router {
    state.realtime.initialize();

    let protected_routes = Router::new()
        .route(
            "/api/notifications",
            get(api_notifications::list_notifications_handler),
        )
        .route(
            "/api/notifications/mark-all-read",
            patch(api_notifications::mark_all_read_handler),
        )
        .route(
            "/api/notifications/test",
            post(api_notifications::create_test_notification_handler),
        )
        .route(
            "/api/notifications/{id}/read",
            patch(api_notifications::mark_read_handler),
        )
        .route(
            "/api/notifications/{id}",
            delete(api_notifications::delete_notification_handler),
        )
        .route(
            "/api/chat",
            post(api_chat::post_message_handler).get(api_chat::list_chats_handler),
        )
        .route(
            "/api/chat/{id}",
            get(api_chat::get_chat_handler).delete(api_chat::delete_chat_handler),
        )
        .route("/api/reports", post(api_reports::create_report_handler))
        .route(
            "/api/reports/{id}/status",
            patch(api_reports::update_report_status_handler),
        )
        .route(
            "/api/profile/push-token",
            put(api_profile::set_push_token_handler),
        )
        .layer(axum::middleware::from_fn(middleware::auth_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(protected_routes)
        // The WebSocket handshake authenticates itself before the upgrade
        .route("/ws", get(api_ws::ws_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
