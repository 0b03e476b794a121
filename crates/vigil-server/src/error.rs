//! HTTP boundary errors and the response envelope.
//!
//! Every endpoint answers `{"success": true, "data": ...}` or
//! `{"success": false, "error": ...}`. `ApiError` is the single mapping
//! from domain errors to that envelope: validation → 400, missing or bad
//! credential → 401, wrong role → 403, unresolved id *or* failed ownership
//! check → 404 with identical wording (so existence never leaks), anything
//! else → 500 with the detail kept in the logs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Value};
use thiserror::Error;
use vigil_chat::ChatError;
use vigil_notify::NotifyError;

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),
    /// Missing or invalid credential.
    #[error("not authorized")]
    Unauthorized,
    /// Valid credential, wrong role or ownership.
    #[error("{0}")]
    Forbidden(String),
    /// The id does not resolve, or resolves to something the caller may
    /// not touch. Reported identically in both cases.
    #[error("{0}")]
    NotFound(String),
    /// Anything the client cannot act on. Detail goes to the log, not the
    /// response.
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    /// Logs the underlying fault and returns an opaque `Internal`.
    pub fn internal(context: &'static str, err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

impl From<NotifyError> for ApiError {
    fn from(err: NotifyError) -> Self {
        match err {
            NotifyError::InvalidIdentifier(_) => Self::Validation(err.to_string()),
            NotifyError::Database(_) => Self::internal("notification store failed", err),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::MissingTarget | ChatError::EmptyMessage => {
                Self::Validation(err.to_string())
            }
            ChatError::NotFound(_) => Self::NotFound("chat not found".to_string()),
            ChatError::Forbidden(msg) => Self::Forbidden(msg.to_string()),
            ChatError::Database(_) => Self::internal("chat store failed", err),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal("response serialization failed", err)
    }
}

/// Wraps response data in the success envelope.
pub fn envelope(data: Value) -> Json<Value> {
    Json(json!({
        "success": true,
        "data": data,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(
            ApiError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::Internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn chat_errors_map_to_client_statuses() {
        assert!(matches!(
            ApiError::from(ChatError::MissingTarget),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            ApiError::from(ChatError::EmptyMessage),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            ApiError::from(ChatError::NotFound("c-1".into())),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(ChatError::Forbidden("no")),
            ApiError::Forbidden(_)
        ));
    }

    #[test]
    fn not_found_hides_the_probed_id() {
        let err = ApiError::from(ChatError::NotFound("c-secret".into()));
        assert_eq!(err.to_string(), "chat not found");
    }

    #[test]
    fn internal_detail_stays_out_of_the_body() {
        let err = ApiError::internal("probe", "connection pool exhausted");
        assert_eq!(err.to_string(), "internal server error");
    }
}
