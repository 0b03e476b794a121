//! User-row access for the authenticated principal.
//!
//! Account provisioning (signup, login, password reset) lives in the
//! account service; this module only reads the `users` row a verified
//! token points at, plus the one field the core is allowed to write: the
//! device push token.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use vigil_types::Role;

/// A user as seen by the core: identity, role, push token, active flag.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub role: Role,
    /// Device token for offline push, if the user registered one.
    pub push_token: Option<String>,
    pub active: bool,
    pub created_at: String,
}

/// Loads a user by id. `None` if the id does not resolve.
pub fn get_user(conn: &Connection, user_id: &str) -> Result<Option<User>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, display_name, role, push_token, active, created_at
         FROM users WHERE id = ?1",
        [user_id],
        map_row_to_user,
    )
    .optional()
}

/// Stores or clears a user's device push token.
///
/// Returns whether a row was updated.
pub fn set_push_token(
    conn: &Connection,
    user_id: &str,
    token: Option<&str>,
) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "UPDATE users SET push_token = ?1 WHERE id = ?2",
        params![token, user_id],
    )?;
    Ok(count > 0)
}

fn map_row_to_user(row: &Row) -> rusqlite::Result<User> {
    let role_str: String = row.get(2)?;
    let role: Role = role_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(User {
        id: row.get(0)?,
        display_name: row.get(1)?,
        role,
        push_token: row.get(3)?,
        active: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use vigil_db::run_migrations;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().expect("failed to open in-memory db");
        run_migrations(&conn).expect("failed to run migrations");
        conn
    }

    #[test]
    fn get_user_maps_role_and_flags() {
        let conn = setup_db();
        conn.execute(
            "INSERT INTO users (id, display_name, role, active) VALUES ('u-1', 'Sgt. Holt', 'officer', 1)",
            [],
        )
        .unwrap();

        let user = get_user(&conn, "u-1").unwrap().expect("user should exist");
        assert_eq!(user.role, Role::Officer);
        assert!(user.active);
        assert_eq!(user.push_token, None);

        assert!(get_user(&conn, "u-missing").unwrap().is_none());
    }

    #[test]
    fn push_token_set_and_clear() {
        let conn = setup_db();
        conn.execute(
            "INSERT INTO users (id, display_name, role) VALUES ('u-1', 'Ada', 'citizen')",
            [],
        )
        .unwrap();

        assert!(set_push_token(&conn, "u-1", Some("device-token")).unwrap());
        let user = get_user(&conn, "u-1").unwrap().unwrap();
        assert_eq!(user.push_token.as_deref(), Some("device-token"));

        assert!(set_push_token(&conn, "u-1", None).unwrap());
        let user = get_user(&conn, "u-1").unwrap().unwrap();
        assert_eq!(user.push_token, None);

        assert!(!set_push_token(&conn, "u-missing", Some("t")).unwrap());
    }
}
