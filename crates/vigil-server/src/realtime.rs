//! Realtime delivery channel: per-user rooms over WebSocket sessions.
//!
//! Every authenticated connection joins the room named after its owning
//! user id; "deliver to user X" fans out to every live session in X's
//! room. The room registry is an explicit map mutated only on connect and
//! disconnect, guarded by an async `RwLock` — the multi-threaded runtime
//! requires the lock the original single-threaded design got for free.
//!
//! Delivery is at-most-once and best-effort: an uninitialized channel, an
//! empty room, or a full session queue is logged and swallowed, never
//! surfaced to the domain action that triggered it. The persisted
//! notification is the durability guarantee, not the push.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;
use vigil_chat::ChatMessage;
use vigil_notify::Notification;
use vigil_types::{NotificationKind, Role};

/// Errors from the realtime channel lifecycle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RealtimeError {
    /// The broadcast handle was used before `initialize`.
    #[error("realtime channel used before initialization")]
    NotInitialized,
}

/// Outgoing WebSocket frames, tagged by event name.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutgoingEvent {
    /// A persisted notification, delivered in full.
    Notification(Notification),
    /// A chat message for a participant.
    Message(MessagePayload),
    /// Reply to a client ping.
    Pong,
    /// A client-visible protocol error.
    Error { message: String },
}

/// Message-delivery payload with camelCase field names.
///
/// HTTP responses use snake_case; realtime frames use camelCase to match
/// the mobile client's receive frame type.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_role: Role,
    pub body: String,
    pub created_at: String,
}

impl From<&ChatMessage> for MessagePayload {
    fn from(m: &ChatMessage) -> Self {
        Self {
            kind: NotificationKind::NewMessage,
            chat_id: m.chat_id.clone(),
            sender_id: m.sender_id.clone(),
            sender_role: m.sender_role,
            body: m.body.clone(),
            created_at: m.created_at.clone(),
        }
    }
}

/// Room registry: user id → (session id → session sender).
type RoomMap = HashMap<String, HashMap<Uuid, mpsc::Sender<String>>>;

/// Manages live WebSocket sessions grouped into per-user rooms.
#[derive(Clone, Default, Debug)]
pub struct ConnectionManager {
    rooms: Arc<RwLock<RoomMap>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Joins a session to its owner's room.
    ///
    /// Concurrent reconnects from the same user simply add another member
    /// to the same room; nothing is deduplicated or evicted.
    ///
    /// Returns the unique session ID used for removal on disconnect.
    pub async fn add_session(&self, user_id: &str, sender: mpsc::Sender<String>) -> Uuid {
        let session_id = Uuid::new_v4();
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(user_id.to_string())
            .or_default()
            .insert(session_id, sender);
        session_id
    }

    /// Removes a session from its owner's room, dropping the room once it
    /// is empty.
    pub async fn remove_session(&self, user_id: &str, session_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        if let Some(sessions) = rooms.get_mut(user_id) {
            sessions.remove(&session_id);
            if sessions.is_empty() {
                rooms.remove(user_id);
            }
        }
    }

    /// Whether the user has at least one live session.
    pub async fn is_connected(&self, user_id: &str) -> bool {
        let rooms = self.rooms.read().await;
        rooms.get(user_id).is_some_and(|s| !s.is_empty())
    }

    /// Sends a serialized frame to every live session in a user's room.
    ///
    /// Returns how many sessions accepted the frame. A full or closed
    /// session queue drops the frame for that session with a warning.
    pub async fn send_to_user(&self, user_id: &str, frame: String) -> usize {
        let rooms = self.rooms.read().await;
        let Some(sessions) = rooms.get(user_id) else {
            return 0;
        };

        let mut delivered = 0;
        for (session_id, sender) in sessions {
            match sender.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        user_id = %user_id,
                        session_id = %session_id,
                        "dropping frame for slow or closed session: {}",
                        e
                    );
                }
            }
        }
        delivered
    }
}

/// The process-wide broadcast handle.
///
/// Exactly one lives in `AppState` and is passed by reference to every
/// dependent — there is no hidden module-level global. `initialize` is
/// idempotent: startup and any retry path may both call it and observe the
/// same registry. `handle` fails fast when called before `initialize`,
/// while `deliver` degrades to a logged no-op so a domain action can never
/// fail because the push layer is not up yet.
pub struct RealtimeChannel {
    inner: OnceLock<ConnectionManager>,
}

impl RealtimeChannel {
    /// Creates the handle in its uninitialized state.
    pub fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Initializes the registry, or returns the existing one unchanged.
    pub fn initialize(&self) -> &ConnectionManager {
        self.inner.get_or_init(ConnectionManager::new)
    }

    /// The live registry, or `NotInitialized` before `initialize`.
    pub fn handle(&self) -> Result<&ConnectionManager, RealtimeError> {
        self.inner.get().ok_or(RealtimeError::NotInitialized)
    }

    /// Best-effort delivery of an event to one user's room.
    ///
    /// Fails silently (logs, does not propagate) when the channel is
    /// uninitialized or the user has no live session.
    pub async fn deliver(&self, user_id: &str, event: &OutgoingEvent) {
        let manager = match self.handle() {
            Ok(manager) => manager,
            Err(e) => {
                tracing::warn!(user_id = %user_id, "dropping realtime event: {}", e);
                return;
            }
        };

        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(user_id = %user_id, "failed to serialize realtime event: {}", e);
                return;
            }
        };

        let delivered = manager.send_to_user(user_id, frame).await;
        if delivered == 0 {
            tracing::debug!(user_id = %user_id, "no live sessions, event not delivered");
        }
    }

    /// Whether the user has a live session. `false` before `initialize`.
    pub async fn is_connected(&self, user_id: &str) -> bool {
        match self.handle() {
            Ok(manager) => manager.is_connected(user_id).await,
            Err(_) => false,
        }
    }
}

impl Default for RealtimeChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_notification() -> Notification {
        Notification {
            id: "n-1".to_string(),
            user_id: "u-1".to_string(),
            report_id: "r-1".to_string(),
            message: "New report submitted: theft".to_string(),
            kind: NotificationKind::NewReport,
            is_read: false,
            created_at: "2025-01-01 00:00:00".to_string(),
        }
    }

    #[test]
    fn handle_fails_before_initialize() {
        let channel = RealtimeChannel::new();
        assert_eq!(channel.handle().unwrap_err(), RealtimeError::NotInitialized);
    }

    #[test]
    fn initialize_is_idempotent() {
        let channel = RealtimeChannel::new();
        let first = channel.initialize() as *const ConnectionManager;
        let second = channel.initialize() as *const ConnectionManager;
        assert_eq!(first, second, "repeated initialize returns the same registry");
        assert!(channel.handle().is_ok());
    }

    #[tokio::test]
    async fn deliver_before_initialize_is_a_noop() {
        let channel = RealtimeChannel::new();
        // Must neither panic nor block
        channel
            .deliver("u-1", &OutgoingEvent::Notification(sample_notification()))
            .await;
        assert!(!channel.is_connected("u-1").await);
    }

    #[tokio::test]
    async fn deliver_to_empty_room_does_not_fail() {
        let channel = RealtimeChannel::new();
        channel.initialize();
        channel
            .deliver("u-nobody", &OutgoingEvent::Notification(sample_notification()))
            .await;
    }

    #[tokio::test]
    async fn session_lifecycle_updates_room_membership() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::channel(8);

        assert!(!manager.is_connected("u-1").await);

        let session = manager.add_session("u-1", tx).await;
        assert!(manager.is_connected("u-1").await);

        manager.remove_session("u-1", session).await;
        assert!(!manager.is_connected("u-1").await);
    }

    #[tokio::test]
    async fn frames_reach_every_session_of_the_user() {
        let manager = ConnectionManager::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let (tx_other, mut rx_other) = mpsc::channel(8);

        manager.add_session("u-1", tx_a).await;
        manager.add_session("u-1", tx_b).await;
        manager.add_session("u-2", tx_other).await;

        let delivered = manager.send_to_user("u-1", "frame".to_string()).await;
        assert_eq!(delivered, 2);
        assert_eq!(rx_a.recv().await.unwrap(), "frame");
        assert_eq!(rx_b.recv().await.unwrap(), "frame");
        assert!(rx_other.try_recv().is_err(), "other rooms see nothing");
    }

    #[tokio::test]
    async fn full_session_queue_drops_the_frame() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::channel(1);
        manager.add_session("u-1", tx).await;

        assert_eq!(manager.send_to_user("u-1", "one".to_string()).await, 1);
        // Queue capacity is 1 and nothing is draining it
        assert_eq!(manager.send_to_user("u-1", "two".to_string()).await, 0);
    }

    #[test]
    fn notification_frame_has_event_tag_and_full_record() {
        let event = OutgoingEvent::Notification(sample_notification());
        let json = serde_json::to_value(&event).expect("serialization should not fail");
        assert_eq!(json["event"], "notification");
        assert_eq!(json["data"]["id"], "n-1");
        assert_eq!(json["data"]["kind"], "new_report");
        assert_eq!(json["data"]["is_read"], false);
    }

    #[test]
    fn message_frame_uses_camel_case() {
        let message = ChatMessage {
            id: 7,
            chat_id: "c-1".to_string(),
            sender_role: Role::Officer,
            sender_id: "u-2".to_string(),
            body: "we are on it".to_string(),
            created_at: "2025-01-01 00:00:00".to_string(),
        };
        let event = OutgoingEvent::Message(MessagePayload::from(&message));
        let json = serde_json::to_value(&event).expect("serialization should not fail");
        assert_eq!(json["event"], "message");
        assert_eq!(json["data"]["type"], "new_message");
        assert_eq!(json["data"]["chatId"], "c-1");
        assert_eq!(json["data"]["senderId"], "u-2");
        assert_eq!(json["data"]["senderRole"], "officer");
        assert!(json["data"].get("chat_id").is_none());
    }

    #[test]
    fn pong_frame_is_bare() {
        let json = serde_json::to_value(OutgoingEvent::Pong).expect("serialization should not fail");
        assert_eq!(json["event"], "pong");
        assert!(json.get("data").is_none());
    }
}
