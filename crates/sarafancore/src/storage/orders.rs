//! Order table access
//!
//! Every status change is a single conditional `UPDATE`; callers learn
//! whether they won from the affected-row count.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};

use crate::core::error::{AppError, AppResult};
use crate::orders::{Order, OrderStatus, Referrer};

const ORDER_SELECT: &str = "SELECT o.id, o.client_id, u.display_name, u.handle, o.status, o.created_at,
        o.taken_at, o.staff_id, o.staff_name, o.referrer_id, o.referrer_name,
        o.button_pressed, o.reminder_sent, o.notification_sent, o.document_url, o.document_sent_at
    FROM orders o
    JOIN users u ON u.chat_id = o.client_id";

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        client_id: row.get(1)?,
        client_name: row.get(2)?,
        client_handle: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        taken_at: row.get(6)?,
        staff_id: row.get(7)?,
        staff_name: row.get(8)?,
        referrer_id: row.get(9)?,
        referrer_name: row.get(10)?,
        button_pressed: row.get(11)?,
        reminder_sent: row.get(12)?,
        notification_sent: row.get(13)?,
        document_url: row.get(14)?,
        document_sent_at: row.get(15)?,
    })
}

fn query_orders<P: rusqlite::Params>(conn: &Connection, filter: &str, params: P) -> AppResult<Vec<Order>> {
    let mut stmt = conn.prepare(&format!("{ORDER_SELECT} {filter}"))?;
    let orders = stmt
        .query_map(params, order_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(orders)
}

/// Which uniqueness rule an INSERT tripped over.
enum InsertConflict {
    OrderId,
    ActiveOrder,
}

fn insert_conflict(err: &rusqlite::Error) -> Option<InsertConflict> {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg)) if e.code == ErrorCode::ConstraintViolation => {
            if msg.contains("orders.id") {
                Some(InsertConflict::OrderId)
            } else if msg.contains("orders.client_id") {
                Some(InsertConflict::ActiveOrder)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Fields of an order that exist before anyone claims it.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub client_id: i64,
    pub referrer: Option<Referrer>,
    pub created_at: DateTime<Utc>,
}

/// Inserts a `new` order unless the client already has an active one.
///
/// Runs under `BEGIN IMMEDIATE`, so concurrent creators for the same client
/// serialize on the write lock and only the first one sees a zero count.
/// `next_id` is called again on an order id collision, at most `attempts` times.
/// The client's `demo_used` flag is set in the same transaction.
pub fn insert_order_exclusive(
    conn: &mut Connection,
    draft: &OrderDraft,
    mut next_id: impl FnMut() -> String,
    attempts: u32,
) -> AppResult<Order> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let active: i64 = tx.query_row(
        "SELECT COUNT(*) FROM orders WHERE client_id = ?1 AND status IN ('new', 'in_work')",
        [draft.client_id],
        |row| row.get(0),
    )?;
    if active > 0 {
        return Err(AppError::ConsultationExists(draft.client_id));
    }

    let (referrer_id, referrer_name) = match &draft.referrer {
        Some(r) => (Some(r.id), Some(r.name.as_str())),
        None => (None, None),
    };

    let mut inserted = None;
    for attempt in 1..=attempts {
        let id = next_id();
        let result = tx.execute(
            "INSERT INTO orders (id, client_id, status, created_at, referrer_id, referrer_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, draft.client_id, OrderStatus::New, draft.created_at, referrer_id, referrer_name],
        );
        match result {
            Ok(_) => {
                inserted = Some(id);
                break;
            }
            Err(e) => match insert_conflict(&e) {
                Some(InsertConflict::OrderId) => {
                    tracing::warn!(order_id = %id, attempt, "Order id collision, regenerating");
                }
                Some(InsertConflict::ActiveOrder) => {
                    return Err(AppError::ConsultationExists(draft.client_id));
                }
                None => return Err(e.into()),
            },
        }
    }
    let Some(order_id) = inserted else {
        return Err(AppError::IdSpaceExhausted(attempts));
    };

    tx.execute("UPDATE users SET demo_used = 1 WHERE chat_id = ?1", [draft.client_id])?;

    let order = get_order(&tx, &order_id)?.ok_or_else(|| AppError::OrderNotFound(order_id.clone()))?;
    tx.commit()?;
    Ok(order)
}

pub fn get_order(conn: &Connection, order_id: &str) -> AppResult<Option<Order>> {
    let order = conn
        .query_row(&format!("{ORDER_SELECT} WHERE o.id = ?1"), [order_id], order_from_row)
        .optional()?;
    Ok(order)
}

pub fn orders_for_client(conn: &Connection, client_id: i64) -> AppResult<Vec<Order>> {
    query_orders(conn, "WHERE o.client_id = ?1 ORDER BY o.created_at", [client_id])
}

/// `new -> in_work` compare-and-set. Returns `false` if the order was not `new`.
pub fn claim_order(
    conn: &Connection,
    order_id: &str,
    staff_id: i64,
    staff_name: &str,
    now: DateTime<Utc>,
) -> AppResult<bool> {
    let changed = conn.execute(
        "UPDATE orders SET status = 'in_work', taken_at = ?1, staff_id = ?2, staff_name = ?3
         WHERE id = ?4 AND status = 'new'",
        params![now, staff_id, staff_name, order_id],
    )?;
    Ok(changed == 1)
}

/// Moves the client's active order to `full`. Returns the upgraded order id.
pub fn upgrade_active_to_full(conn: &Connection, client_id: i64) -> AppResult<Option<String>> {
    let id = conn
        .query_row(
            "UPDATE orders SET status = 'full'
             WHERE client_id = ?1 AND status IN ('new', 'in_work')
             RETURNING id",
            [client_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// `in_work -> complete` compare-and-set.
pub fn complete_order(conn: &Connection, order_id: &str) -> AppResult<bool> {
    let changed = conn.execute(
        "UPDATE orders SET status = 'complete' WHERE id = ?1 AND status = 'in_work'",
        [order_id],
    )?;
    Ok(changed == 1)
}

/// In-work orders claimed at or before `cutoff` that have not been reminded.
pub fn orders_due_for_reminder(conn: &Connection, cutoff: DateTime<Utc>) -> AppResult<Vec<Order>> {
    query_orders(
        conn,
        "WHERE o.status = 'in_work' AND o.reminder_sent = 0 AND o.taken_at <= ?1 ORDER BY o.taken_at",
        [cutoff],
    )
}

pub fn mark_reminder_sent(conn: &Connection, order_id: &str) -> AppResult<bool> {
    let changed = conn.execute("UPDATE orders SET reminder_sent = 1 WHERE id = ?1", [order_id])?;
    Ok(changed == 1)
}

pub fn mark_notification_sent(conn: &Connection, order_id: &str) -> AppResult<bool> {
    let changed = conn.execute("UPDATE orders SET notification_sent = 1 WHERE id = ?1", [order_id])?;
    Ok(changed == 1)
}

/// `new` orders created at or before `created_before` whose staff post never went out.
pub fn orders_pending_notification(conn: &Connection, created_before: DateTime<Utc>) -> AppResult<Vec<Order>> {
    query_orders(
        conn,
        "WHERE o.status = 'new' AND o.notification_sent = 0 AND o.created_at <= ?1 ORDER BY o.created_at",
        [created_before],
    )
}

pub fn orders_awaiting_document(conn: &Connection) -> AppResult<Vec<Order>> {
    query_orders(
        conn,
        "WHERE o.status = 'in_work' AND o.document_url IS NULL ORDER BY o.taken_at",
        params![],
    )
}

pub fn record_document(conn: &Connection, order_id: &str, url: &str, now: DateTime<Utc>) -> AppResult<bool> {
    let changed = conn.execute(
        "UPDATE orders SET document_url = ?1, document_sent_at = ?2 WHERE id = ?3",
        params![url, now, order_id],
    )?;
    Ok(changed == 1)
}

pub fn mark_button_pressed(conn: &Connection, order_id: &str) -> AppResult<bool> {
    let changed = conn.execute("UPDATE orders SET button_pressed = 1 WHERE id = ?1", [order_id])?;
    Ok(changed == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::migrations::run_migrations_for_test;
    use crate::storage::users::{get_user, upsert_user};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn conn_with_client(client_id: i64) -> Connection {
        let mut conn = Connection::open_in_memory().expect("open");
        run_migrations_for_test(&mut conn).expect("migrate");
        upsert_user(&conn, client_id, "ann1", "Ann", Utc::now()).expect("user");
        conn
    }

    fn draft(client_id: i64) -> OrderDraft {
        OrderDraft {
            client_id,
            referrer: None,
            created_at: Utc::now(),
        }
    }

    fn fixed_ids(ids: &[&str]) -> impl FnMut() -> String {
        let mut ids: Vec<String> = ids.iter().rev().map(|s| s.to_string()).collect();
        move || ids.pop().unwrap_or_else(|| "EXHAUSTD".to_string())
    }

    #[test]
    fn test_insert_sets_demo_flag_and_joins_names() {
        let mut conn = conn_with_client(42);
        let order = insert_order_exclusive(&mut conn, &draft(42), fixed_ids(&["ORDER001"]), 5).expect("insert");

        assert_eq!(order.id, "ORDER001");
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.client_name, "Ann");
        assert_eq!(order.client_handle, "ann1");
        assert!(get_user(&conn, 42).expect("get").expect("user").demo_used);
    }

    #[test]
    fn test_second_active_order_rejected() {
        let mut conn = conn_with_client(42);
        insert_order_exclusive(&mut conn, &draft(42), fixed_ids(&["ORDER001"]), 5).expect("first");
        let err = insert_order_exclusive(&mut conn, &draft(42), fixed_ids(&["ORDER002"]), 5).err();
        assert!(matches!(err, Some(AppError::ConsultationExists(42))));
    }

    #[test]
    fn test_id_collision_is_retried() {
        let mut conn = conn_with_client(42);
        upsert_user(&conn, 43, "bob", "Bob", Utc::now()).expect("user");
        insert_order_exclusive(&mut conn, &draft(43), fixed_ids(&["SAMEID00"]), 5).expect("first");

        let order = insert_order_exclusive(&mut conn, &draft(42), fixed_ids(&["SAMEID00", "OTHERID0"]), 5)
            .expect("retried");
        assert_eq!(order.id, "OTHERID0");
    }

    #[test]
    fn test_id_collision_exhaustion() {
        let mut conn = conn_with_client(42);
        upsert_user(&conn, 43, "bob", "Bob", Utc::now()).expect("user");
        insert_order_exclusive(&mut conn, &draft(43), fixed_ids(&["SAMEID00"]), 5).expect("first");

        let err = insert_order_exclusive(&mut conn, &draft(42), || "SAMEID00".to_string(), 3).err();
        assert!(matches!(err, Some(AppError::IdSpaceExhausted(3))));
        // The failed transaction must not leave the demo flag set
        assert!(!get_user(&conn, 42).expect("get").expect("user").demo_used);
    }

    #[test]
    fn test_partial_index_rejects_second_active_row() {
        let conn = conn_with_client(42);
        let now = Utc::now();
        conn.execute(
            "INSERT INTO orders (id, client_id, status, created_at) VALUES ('A0000001', 42, 'new', ?1)",
            [now],
        )
        .expect("first row");
        let err = conn
            .execute(
                "INSERT INTO orders (id, client_id, status, created_at) VALUES ('A0000002', 42, 'in_work', ?1)",
                [now],
            )
            .expect_err("index must reject");
        assert!(matches!(insert_conflict(&err), Some(InsertConflict::ActiveOrder)));
    }

    #[test]
    fn test_claim_is_compare_and_set() {
        let mut conn = conn_with_client(42);
        insert_order_exclusive(&mut conn, &draft(42), fixed_ids(&["ORDER001"]), 5).expect("insert");

        let now = Utc::now();
        assert!(claim_order(&conn, "ORDER001", 99, "Bob", now).expect("claim"));
        assert!(!claim_order(&conn, "ORDER001", 100, "Eve", now).expect("second claim"));
        assert!(!claim_order(&conn, "MISSING0", 99, "Bob", now).expect("missing"));

        let order = get_order(&conn, "ORDER001").expect("get").expect("order");
        assert_eq!(order.status, OrderStatus::InWork);
        assert_eq!(order.staff_id, Some(99));
        assert_eq!(order.staff_name.as_deref(), Some("Bob"));
        assert_eq!(order.taken_at, Some(now));
    }

    #[test]
    fn test_upgrade_and_complete() {
        let mut conn = conn_with_client(42);
        insert_order_exclusive(&mut conn, &draft(42), fixed_ids(&["ORDER001"]), 5).expect("insert");

        assert!(!complete_order(&conn, "ORDER001").expect("complete new"));
        assert_eq!(upgrade_active_to_full(&conn, 42).expect("upgrade"), Some("ORDER001".into()));
        assert_eq!(upgrade_active_to_full(&conn, 42).expect("upgrade again"), None);
        let orders = orders_for_client(&conn, 42).expect("list");
        assert!(orders.iter().all(|o| o.status.is_terminal()));

        // A terminal order frees the client for a new one
        insert_order_exclusive(&mut conn, &draft(42), fixed_ids(&["ORDER002"]), 5).expect("second");
        claim_order(&conn, "ORDER002", 99, "Bob", Utc::now()).expect("claim");
        assert!(complete_order(&conn, "ORDER002").expect("complete"));
        assert_eq!(orders_for_client(&conn, 42).expect("list").len(), 2);
    }

    #[test]
    fn test_reminder_due_query() {
        let mut conn = conn_with_client(42);
        insert_order_exclusive(&mut conn, &draft(42), fixed_ids(&["ORDER001"]), 5).expect("insert");
        let taken = Utc::now();
        claim_order(&conn, "ORDER001", 99, "Bob", taken).expect("claim");

        assert!(orders_due_for_reminder(&conn, taken - Duration::hours(1)).expect("early").is_empty());
        let due = orders_due_for_reminder(&conn, taken + Duration::hours(1)).expect("due");
        assert_eq!(due.len(), 1);

        mark_reminder_sent(&conn, "ORDER001").expect("mark");
        assert!(orders_due_for_reminder(&conn, taken + Duration::hours(1)).expect("after").is_empty());
    }

    #[test]
    fn test_document_and_button_flags() {
        let mut conn = conn_with_client(42);
        insert_order_exclusive(&mut conn, &draft(42), fixed_ids(&["ORDER001"]), 5).expect("insert");
        claim_order(&conn, "ORDER001", 99, "Bob", Utc::now()).expect("claim");

        assert_eq!(orders_awaiting_document(&conn).expect("awaiting").len(), 1);
        assert!(record_document(&conn, "ORDER001", "https://docs.example/1", Utc::now()).expect("record"));
        assert!(orders_awaiting_document(&conn).expect("awaiting").is_empty());

        assert!(mark_button_pressed(&conn, "ORDER001").expect("button"));
        assert!(!mark_button_pressed(&conn, "MISSING0").expect("missing"));

        let order = get_order(&conn, "ORDER001").expect("get").expect("order");
        assert!(order.button_pressed);
        assert_eq!(order.document_url.as_deref(), Some("https://docs.example/1"));
        assert!(order.document_sent_at.is_some());
    }

    #[test]
    fn test_pending_notification_query() {
        let mut conn = conn_with_client(42);
        let order = insert_order_exclusive(&mut conn, &draft(42), fixed_ids(&["ORDER001"]), 5).expect("insert");

        let later = order.created_at + Duration::minutes(5);
        assert!(orders_pending_notification(&conn, order.created_at - Duration::minutes(1))
            .expect("too recent")
            .is_empty());
        assert_eq!(orders_pending_notification(&conn, later).expect("pending").len(), 1);

        mark_notification_sent(&conn, "ORDER001").expect("mark");
        assert!(orders_pending_notification(&conn, later).expect("sent").is_empty());
    }
}
