//! User table access

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::core::error::AppResult;
use crate::orders::User;

const USER_COLUMNS: &str =
    "chat_id, handle, display_name, referral_code, demo_used, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        chat_id: row.get(0)?,
        handle: row.get(1)?,
        display_name: row.get(2)?,
        referral_code: row.get(3)?,
        demo_used: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Creates the user or refreshes its name and handle.
///
/// A write stamped older than the stored `updated_at` leaves the row as is.
pub fn upsert_user(
    conn: &Connection,
    chat_id: i64,
    handle: &str,
    display_name: &str,
    now: DateTime<Utc>,
) -> AppResult<()> {
    conn.execute(
        "INSERT INTO users (chat_id, handle, display_name, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(chat_id) DO UPDATE SET
             handle = excluded.handle,
             display_name = excluded.display_name,
             updated_at = excluded.updated_at
         WHERE excluded.updated_at >= users.updated_at",
        params![chat_id, handle, display_name, now],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, chat_id: i64) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE chat_id = ?1"),
            [chat_id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn get_user_by_referral_code(conn: &Connection, code: &str) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE referral_code = ?1"),
            [code],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn referral_code_exists(conn: &Connection, code: &str) -> AppResult<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE referral_code = ?1)",
        [code],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Assigns `code` unless the user already has one. Returns the code in effect.
pub fn set_referral_code(conn: &Connection, chat_id: i64, code: &str) -> AppResult<Option<String>> {
    conn.execute(
        "UPDATE users SET referral_code = ?1 WHERE chat_id = ?2 AND referral_code IS NULL",
        params![code, chat_id],
    )?;

    let current = conn
        .query_row(
            "SELECT referral_code FROM users WHERE chat_id = ?1",
            [chat_id],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?
        .flatten();
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::migrations::run_migrations_for_test;
    use pretty_assertions::assert_eq;

    fn conn() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open");
        run_migrations_for_test(&mut conn).expect("migrate");
        conn
    }

    #[test]
    fn test_upsert_is_last_write_wins() {
        let conn = conn();
        let t0 = Utc::now();
        upsert_user(&conn, 42, "ann1", "Ann", t0).expect("insert");
        upsert_user(&conn, 42, "ann_new", "Ann B.", t0 + chrono::Duration::minutes(1)).expect("update");

        let user = get_user(&conn, 42).expect("get").expect("present");
        assert_eq!(user.handle, "ann_new");
        assert_eq!(user.display_name, "Ann B.");
        assert_eq!(user.created_at, t0);
        assert!(user.updated_at > user.created_at);
        assert!(!user.demo_used);
    }

    #[test]
    fn test_upsert_never_applies_older_data() {
        let conn = conn();
        let now = Utc::now();
        upsert_user(&conn, 42, "new_handle", "New Name", now).expect("newer");
        upsert_user(&conn, 42, "old_handle", "Old Name", now - chrono::Duration::seconds(5)).expect("older");

        let user = get_user(&conn, 42).expect("get").expect("present");
        assert_eq!(user.display_name, "New Name");
        assert_eq!(user.handle, "new_handle");
        assert_eq!(user.updated_at, now);
    }

    #[test]
    fn test_referral_code_is_assigned_once() {
        let conn = conn();
        upsert_user(&conn, 7, "carol", "Carol", Utc::now()).expect("insert");

        assert_eq!(set_referral_code(&conn, 7, "AAAA1111").expect("set"), Some("AAAA1111".into()));
        assert_eq!(set_referral_code(&conn, 7, "BBBB2222").expect("keep"), Some("AAAA1111".into()));
        assert!(referral_code_exists(&conn, "AAAA1111").expect("exists"));
        assert!(!referral_code_exists(&conn, "BBBB2222").expect("exists"));

        let referrer = get_user_by_referral_code(&conn, "AAAA1111").expect("lookup").expect("found");
        assert_eq!(referrer.chat_id, 7);
        assert!(get_user_by_referral_code(&conn, "ZZZZ0000").expect("lookup").is_none());
    }

    #[test]
    fn test_set_referral_code_for_unknown_user() {
        let conn = conn();
        assert_eq!(set_referral_code(&conn, 404, "CCCC3333").expect("set"), None);
    }
}
