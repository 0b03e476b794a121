//! Durable notification store for the Vigil platform.
//!
//! Persists per-user notifications with read/unread state. Every mutating
//! operation embeds the ownership predicate (`id AND user_id`) in the SQL
//! statement itself, so a user can never observe or mutate another user's
//! notification and there is no read-then-check race. Conditional operations
//! report a miss (wrong owner or unknown id) as a non-error signal; the HTTP
//! layer maps both to the same 404 so notification existence does not leak.
//!
//! The store is deliberately unaware of delivery: a row here is the
//! durability guarantee, and the realtime push layered on top is best-effort.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use vigil_types::NotificationKind;

/// Maximum number of notifications returned by [`list_for_user`].
pub const LIST_LIMIT: u32 = 50;

/// Errors that can occur during notification operations.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}

/// A stored notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    /// Unique public ID (UUID).
    pub id: String,
    /// Target user. Immutable after creation.
    pub user_id: String,
    /// Originating report.
    pub report_id: String,
    /// Human-readable message.
    pub message: String,
    /// Kind of notification.
    pub kind: NotificationKind,
    /// Whether the target user has read it. Transitions false → true only.
    pub is_read: bool,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
}

/// Parameters for creating a new notification.
#[derive(Debug, Clone)]
pub struct CreateNotificationParams {
    pub user_id: String,
    pub report_id: String,
    pub message: String,
    pub kind: NotificationKind,
}

/// Rejects identifiers that are not syntactically valid UUIDs.
///
/// Malformed ids are a caller bug (or probe) and are reported as
/// `InvalidIdentifier` rather than silently matching nothing.
fn require_uuid(id: &str) -> Result<(), NotifyError> {
    Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| NotifyError::InvalidIdentifier(id.to_string()))
}

/// Creates a notification, unread, with a generated id and timestamp.
pub fn create_notification(
    conn: &Connection,
    params: &CreateNotificationParams,
) -> Result<Notification, NotifyError> {
    let id = Uuid::new_v4().to_string();

    let notification = conn.query_row(
        "INSERT INTO notifications (id, user_id, report_id, message, kind)
         VALUES (?1, ?2, ?3, ?4, ?5)
         RETURNING id, user_id, report_id, message, kind, is_read, created_at",
        params![
            id,
            params.user_id,
            params.report_id,
            params.message,
            params.kind.as_str(),
        ],
        map_row_to_notification,
    )?;

    Ok(notification)
}

/// Lists the most recent notifications for a user, newest first.
///
/// Returns at most [`LIST_LIMIT`] records. Fails with `InvalidIdentifier`
/// if `user_id` is not a syntactically valid UUID.
pub fn list_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Notification>, NotifyError> {
    require_uuid(user_id)?;

    let mut stmt = conn.prepare(
        "SELECT id, user_id, report_id, message, kind, is_read, created_at
         FROM notifications
         WHERE user_id = ?1
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![user_id, LIST_LIMIT], map_row_to_notification)?;
    let mut notifications = Vec::new();
    for row in rows {
        notifications.push(row?);
    }
    Ok(notifications)
}

/// Marks a single notification as read, if it exists and belongs to `user_id`.
///
/// A single conditional UPDATE: the ownership check and the mutation are one
/// statement. Returns the updated record, or `None` when the id does not
/// resolve or resolves to another user's notification — the caller cannot
/// distinguish the two cases.
pub fn mark_read(
    conn: &Connection,
    notification_id: &str,
    user_id: &str,
) -> Result<Option<Notification>, NotifyError> {
    require_uuid(notification_id)?;
    require_uuid(user_id)?;

    let updated = conn
        .query_row(
            "UPDATE notifications SET is_read = 1
             WHERE id = ?1 AND user_id = ?2
             RETURNING id, user_id, report_id, message, kind, is_read, created_at",
            params![notification_id, user_id],
            map_row_to_notification,
        )
        .optional()?;

    Ok(updated)
}

/// Marks all of a user's unread notifications as read.
///
/// Returns the number of affected records. Idempotent: a second call
/// affects zero records.
pub fn mark_all_read(conn: &Connection, user_id: &str) -> Result<usize, NotifyError> {
    require_uuid(user_id)?;

    let count = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
        params![user_id],
    )?;

    Ok(count)
}

/// Deletes a notification, if it exists and belongs to `user_id`.
///
/// Same ownership-conditional pattern as [`mark_read`]. Returns whether a
/// record was deleted.
pub fn delete_notification(
    conn: &Connection,
    notification_id: &str,
    user_id: &str,
) -> Result<bool, NotifyError> {
    require_uuid(notification_id)?;
    require_uuid(user_id)?;

    let count = conn.execute(
        "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2",
        params![notification_id, user_id],
    )?;

    Ok(count > 0)
}

fn map_row_to_notification(row: &Row) -> rusqlite::Result<Notification> {
    let kind_str: String = row.get(4)?;
    let kind: NotificationKind = kind_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        report_id: row.get(2)?,
        message: row.get(3)?,
        kind,
        is_read: row.get(5)?,
        created_at: row.get(6)?,
    })
}
