//! Chat store for the Vigil platform.
//!
//! Implements the two-role conversation protocol between a citizen and the
//! police: a citizen's message extends their single existing chat or creates
//! it; an officer must name the target chat explicitly and cannot create one
//! implicitly. Appends, listing, fetching, and deletion all live here;
//! realtime fan-out and offline push are layered on top by the server crate.
//!
//! The one-chat-per-citizen invariant is enforced by the UNIQUE constraint
//! on `chats.user_id`: create-or-extend is `INSERT ... ON CONFLICT DO
//! NOTHING` inside a transaction, so two concurrent first messages from the
//! same citizen cannot produce two chats.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use vigil_types::Role;

/// Default page size for officer chat listing.
const DEFAULT_LIST_LIMIT: u32 = 50;
/// Hard cap for officer chat listing.
const MAX_LIST_LIMIT: u32 = 100;

/// Errors that can occur during chat operations.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("chat not found: {0}")]
    NotFound(String),
    #[error("chat id is required for an officer to send a message")]
    MissingTarget,
    #[error("message text is required")]
    EmptyMessage,
    #[error("{0}")]
    Forbidden(&'static str),
}

/// A conversation between one citizen and the police.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chat {
    /// Unique public ID (UUID).
    pub id: String,
    /// Report the conversation was opened about, when the citizen had one.
    pub report_id: Option<String>,
    /// The citizen who owns the conversation.
    pub user_id: String,
    /// Stored flag; no lifecycle reads or transitions it.
    pub is_active: bool,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Timestamp of the latest append (ISO 8601).
    pub updated_at: String,
}

/// A single message within a chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Append-order ID.
    pub id: i64,
    /// Chat this message belongs to.
    pub chat_id: String,
    /// Role tag of the sender.
    pub sender_role: Role,
    /// User ID of the sender.
    pub sender_id: String,
    /// Message text.
    pub body: String,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
}

/// A chat with its full ordered message history.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatWithMessages {
    #[serde(flatten)]
    pub chat: Chat,
    pub messages: Vec<ChatMessage>,
}

/// A fan-out recipient: a chat participant and their device push token.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub user_id: String,
    pub push_token: Option<String>,
}

/// Parameters for posting a message.
#[derive(Debug, Clone)]
pub struct PostMessageParams {
    pub actor_role: Role,
    pub actor_id: String,
    /// Required for officers; ignored for citizens.
    pub chat_id: Option<String>,
    pub body: String,
}

/// Result of a successful append.
#[derive(Debug, Clone)]
pub struct PostedMessage {
    pub chat: Chat,
    pub message: ChatMessage,
    /// True when this message opened the chat.
    pub created_chat: bool,
}

/// Posts a message according to the two-role protocol.
///
/// Citizens extend their own chat, creating it on first message. Officers
/// must pass `chat_id` (`MissingTarget` otherwise) and the chat must exist
/// (`NotFound` otherwise). Empty or whitespace-only text is rejected with
/// `EmptyMessage` before any write.
pub fn post_message(
    conn: &Connection,
    params: &PostMessageParams,
) -> Result<PostedMessage, ChatError> {
    if params.body.trim().is_empty() {
        return Err(ChatError::EmptyMessage);
    }

    let tx = conn.unchecked_transaction()?;

    let (chat_id, created_chat) = match params.actor_role {
        Role::Citizen => {
            // Conditional insert: loses silently if the citizen's chat
            // already exists, then the single row is re-read by owner.
            let inserted = tx.execute(
                "INSERT INTO chats (id, user_id, report_id)
                 VALUES (
                    ?1, ?2,
                    (SELECT id FROM reports WHERE owner_user_id = ?2
                     ORDER BY created_at DESC, rowid DESC LIMIT 1)
                 )
                 ON CONFLICT (user_id) DO NOTHING",
                params![Uuid::new_v4().to_string(), params.actor_id],
            )?;

            let chat_id: String = tx.query_row(
                "SELECT id FROM chats WHERE user_id = ?1",
                [&params.actor_id],
                |row| row.get(0),
            )?;

            (chat_id, inserted > 0)
        }
        Role::Officer => {
            let chat_id = params
                .chat_id
                .clone()
                .ok_or(ChatError::MissingTarget)?;

            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM chats WHERE id = ?1)",
                [&chat_id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(ChatError::NotFound(chat_id));
            }

            (chat_id, false)
        }
    };

    tx.execute(
        "INSERT OR IGNORE INTO chat_participants (chat_id, user_id) VALUES (?1, ?2)",
        params![chat_id, params.actor_id],
    )?;

    let message = tx.query_row(
        "INSERT INTO chat_messages (chat_id, sender_role, sender_id, body)
         VALUES (?1, ?2, ?3, ?4)
         RETURNING id, chat_id, sender_role, sender_id, body, created_at",
        params![
            chat_id,
            params.actor_role.as_str(),
            params.actor_id,
            params.body,
        ],
        map_row_to_message,
    )?;

    tx.execute(
        "UPDATE chats SET updated_at = datetime('now') WHERE id = ?1",
        [&chat_id],
    )?;

    let chat = tx.query_row(
        "SELECT id, report_id, user_id, is_active, created_at, updated_at
         FROM chats WHERE id = ?1",
        [&chat_id],
        map_row_to_chat,
    )?;

    tx.commit()?;

    Ok(PostedMessage {
        chat,
        message,
        created_chat,
    })
}

/// Lists chats visible to the actor.
///
/// Officers see every chat, newest activity first, paginated with
/// `before` (an `updated_at` cursor) and `limit`. Citizens see only their
/// own chat — an empty list if none exists yet.
pub fn list_chats(
    conn: &Connection,
    actor_role: Role,
    actor_id: &str,
    before: Option<String>,
    limit: Option<u32>,
) -> Result<Vec<ChatWithMessages>, ChatError> {
    let chats = match actor_role {
        Role::Officer => {
            let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);

            let sql = if before.is_some() {
                format!(
                    "SELECT id, report_id, user_id, is_active, created_at, updated_at
                     FROM chats
                     WHERE updated_at < ?1
                     ORDER BY updated_at DESC, rowid DESC
                     LIMIT {limit}"
                )
            } else {
                format!(
                    "SELECT id, report_id, user_id, is_active, created_at, updated_at
                     FROM chats
                     ORDER BY updated_at DESC, rowid DESC
                     LIMIT {limit}"
                )
            };

            let mut stmt = conn.prepare(&sql)?;
            let rows = if let Some(before_ts) = before {
                stmt.query_map([before_ts], map_row_to_chat)?
            } else {
                stmt.query_map([], map_row_to_chat)?
            };

            let mut chats = Vec::new();
            for row in rows {
                chats.push(row?);
            }
            chats
        }
        Role::Citizen => conn
            .query_row(
                "SELECT id, report_id, user_id, is_active, created_at, updated_at
                 FROM chats WHERE user_id = ?1",
                [actor_id],
                map_row_to_chat,
            )
            .optional()?
            .into_iter()
            .collect(),
    };

    let mut out = Vec::with_capacity(chats.len());
    for chat in chats {
        let messages = list_messages(conn, &chat.id)?;
        out.push(ChatWithMessages { chat, messages });
    }
    Ok(out)
}

/// Fetches a chat by id with its message history.
///
/// Officers may fetch any chat. Citizens may only fetch chats they
/// participate in; the participant predicate is part of the lookup query,
/// and a miss is reported as the same `NotFound` as an unknown id so chat
/// existence does not leak.
pub fn get_chat(
    conn: &Connection,
    chat_id: &str,
    actor_role: Role,
    actor_id: &str,
) -> Result<ChatWithMessages, ChatError> {
    let chat = match actor_role {
        Role::Officer => conn
            .query_row(
                "SELECT id, report_id, user_id, is_active, created_at, updated_at
                 FROM chats WHERE id = ?1",
                [chat_id],
                map_row_to_chat,
            )
            .optional()?,
        Role::Citizen => conn
            .query_row(
                "SELECT c.id, c.report_id, c.user_id, c.is_active, c.created_at, c.updated_at
                 FROM chats c
                 WHERE c.id = ?1
                   AND EXISTS (
                       SELECT 1 FROM chat_participants p
                       WHERE p.chat_id = c.id AND p.user_id = ?2
                   )",
                params![chat_id, actor_id],
                map_row_to_chat,
            )
            .optional()?,
    }
    .ok_or_else(|| ChatError::NotFound(chat_id.to_string()))?;

    let messages = list_messages(conn, &chat.id)?;
    Ok(ChatWithMessages { chat, messages })
}

/// Deletes a chat and (via cascade) its messages and participant rows.
///
/// Officers only; this is the conversation's single terminal operation.
pub fn delete_chat(conn: &Connection, chat_id: &str, actor_role: Role) -> Result<(), ChatError> {
    if actor_role != Role::Officer {
        return Err(ChatError::Forbidden("only officers can delete chats"));
    }

    let count = conn.execute("DELETE FROM chats WHERE id = ?1", [chat_id])?;
    if count == 0 {
        return Err(ChatError::NotFound(chat_id.to_string()));
    }
    Ok(())
}

/// Lists the fan-out audience of a chat with their push tokens.
pub fn participants(conn: &Connection, chat_id: &str) -> Result<Vec<Participant>, ChatError> {
    let mut stmt = conn.prepare(
        "SELECT p.user_id, u.push_token
         FROM chat_participants p
         JOIN users u ON u.id = p.user_id
         WHERE p.chat_id = ?1
         ORDER BY p.rowid ASC",
    )?;

    let rows = stmt.query_map([chat_id], |row| {
        Ok(Participant {
            user_id: row.get(0)?,
            push_token: row.get(1)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Loads a chat's messages in append order.
fn list_messages(conn: &Connection, chat_id: &str) -> Result<Vec<ChatMessage>, ChatError> {
    let mut stmt = conn.prepare(
        "SELECT id, chat_id, sender_role, sender_id, body, created_at
         FROM chat_messages
         WHERE chat_id = ?1
         ORDER BY id ASC",
    )?;

    let rows = stmt.query_map([chat_id], map_row_to_message)?;
    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?);
    }
    Ok(messages)
}

fn map_row_to_chat(row: &Row) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        report_id: row.get(1)?,
        user_id: row.get(2)?,
        is_active: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn map_row_to_message(row: &Row) -> rusqlite::Result<ChatMessage> {
    let role_str: String = row.get(2)?;
    let sender_role: Role = role_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(ChatMessage {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_role,
        sender_id: row.get(3)?,
        body: row.get(4)?,
        created_at: row.get(5)?,
    })
}
