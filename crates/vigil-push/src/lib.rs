//! Best-effort offline push delivery for the Vigil platform.
//!
//! When a chat participant has no live realtime session, the server falls
//! back to one push call against an external provider, keyed by the device
//! token stored on the user. Delivery here is strictly best-effort: an
//! unconfigured client skips sends, and every failure is a typed error the
//! caller logs and drops — a failed push never rolls back the persisted
//! message.

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use vigil_types::NotificationKind;

/// Maximum number of characters of message text carried in a push body.
const MAX_BODY_CHARS: usize = 100;

/// Errors that can occur when sending a push.
#[derive(Debug, Error)]
pub enum PushError {
    /// The provider could not be reached.
    #[error("push provider request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The provider answered with a non-success status.
    #[error("push provider rejected the request: HTTP {status}")]
    Rejected { status: u16 },
}

/// Provider endpoint and credential.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Full URL of the provider's send endpoint.
    pub endpoint: String,
    /// Server API key, sent as `Authorization: key=...`.
    pub api_key: String,
}

/// Correlation data attached to every push, mirrored on the realtime frame
/// so the client can route taps to the right screen. Field names are
/// camelCase to match the mobile client's expectations.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PushData {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub chat_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
}

/// A rendered push: display fields plus the data block.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub data: PushData,
}

impl PushPayload {
    /// Payload for a message appended to an existing chat.
    pub fn new_message(sender_name: &str, chat_id: &str, sender_id: &str, text: &str) -> Self {
        Self {
            title: format!("New message from {sender_name}"),
            body: truncate_body(text),
            data: PushData {
                kind: NotificationKind::NewMessage,
                chat_id: chat_id.to_string(),
                sender_id: Some(sender_id.to_string()),
            },
        }
    }

    /// Payload for a freshly opened chat.
    pub fn new_chat(initiator_name: &str, chat_id: &str) -> Self {
        Self {
            title: "New chat started".to_string(),
            body: format!("{initiator_name} started a new chat for an issue"),
            data: PushData {
                kind: NotificationKind::NewChat,
                chat_id: chat_id.to_string(),
                sender_id: None,
            },
        }
    }
}

/// Caps the push body at [`MAX_BODY_CHARS`] characters plus an ellipsis.
///
/// Counted in characters, not bytes, so multi-byte text is never split
/// mid-codepoint.
fn truncate_body(text: &str) -> String {
    if text.chars().count() > MAX_BODY_CHARS {
        let mut body: String = text.chars().take(MAX_BODY_CHARS).collect();
        body.push_str("...");
        body
    } else {
        text.to_string()
    }
}

/// Client for the external push provider.
///
/// Constructed once at startup and shared through application state. When
/// no provider is configured the client is disabled and [`send`] is a
/// logged no-op, so environments without push credentials run unchanged.
///
/// [`send`]: PushClient::send
#[derive(Debug, Clone)]
pub struct PushClient {
    config: Option<PushConfig>,
    http: reqwest::Client,
}

impl PushClient {
    /// Creates a client; `None` yields a disabled client.
    pub fn new(config: Option<PushConfig>) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Creates a disabled client that skips all sends.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Whether a provider is configured.
    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Sends one multicast push to the given device tokens.
    ///
    /// Returns `Ok(())` without any network traffic when the client is
    /// disabled or `tokens` is empty.
    pub async fn send(&self, tokens: &[String], payload: &PushPayload) -> Result<(), PushError> {
        let Some(config) = &self.config else {
            tracing::debug!("push provider not configured, skipping notification");
            return Ok(());
        };

        if tokens.is_empty() {
            return Ok(());
        }

        let body = json!({
            "registration_ids": tokens,
            "notification": {
                "title": payload.title,
                "body": payload.body,
            },
            "data": payload.data,
        });

        let response = self
            .http
            .post(&config.endpoint)
            .header("Authorization", format!("key={}", config.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PushError::Rejected {
                status: status.as_u16(),
            });
        }

        tracing::debug!(recipients = tokens.len(), "push notification sent");
        Ok(())
    }
}
