use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rusqlite::{Connection, OptionalExtension};

mod embedded {
    use refinery::embed_migrations;

    embed_migrations!("./migrations");
}

/// Table refinery records applied versions in.
const HISTORY_TABLE: &str = "refinery_schema_history";

/// Reverse scripts, one per embedded migration version.
const ROLLBACKS: &[(u32, &str)] = &[
    (1, include_str!("../../rollbacks/0001_initial_schema.down.sql")),
    (2, include_str!("../../rollbacks/0002_one_active_order_per_client.down.sql")),
];

static MIGRATION_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Applies every pending migration. Returns the versions applied by this call.
pub fn run_migrations(conn: &mut Connection) -> Result<Vec<u32>> {
    // One runner per process; refinery opens its own transaction per migration
    let mutex = MIGRATION_LOCK.get_or_init(|| Mutex::new(()));
    let _guard = match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Migration lock was poisoned, recovering...");
            poisoned.into_inner()
        }
    };

    conn.busy_timeout(Duration::from_secs(30))
        .context("set SQLite busy timeout")?;

    let report = embedded::migrations::runner()
        .run(conn)
        .context("apply migrations")?;

    let applied: Vec<u32> = report.applied_migrations().iter().map(|m| m.version()).collect();
    for migration in report.applied_migrations() {
        tracing::info!(version = migration.version(), name = migration.name(), "Applied migration");
    }
    if applied.is_empty() {
        tracing::info!("Schema is up to date");
    }
    Ok(applied)
}

/// Run migrations for tests without the process-wide lock
#[doc(hidden)]
pub fn run_migrations_for_test(conn: &mut Connection) -> Result<()> {
    conn.busy_timeout(Duration::from_secs(30))
        .context("set SQLite busy timeout")?;

    embedded::migrations::runner()
        .run(conn)
        .map(|_| ())
        .context("apply migrations")
}

/// Latest applied schema version, `None` on a fresh database.
pub fn current_version(conn: &Connection) -> Result<Option<u32>> {
    let history_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [HISTORY_TABLE],
            |row| Ok(row.get::<_, i64>(0)? > 0),
        )
        .context("inspect schema history")?;
    if !history_exists {
        return Ok(None);
    }

    let version = conn
        .query_row(&format!("SELECT MAX(version) FROM {HISTORY_TABLE}"), [], |row| {
            row.get::<_, Option<u32>>(0)
        })
        .optional()
        .context("read schema version")?
        .flatten();
    Ok(version)
}

/// Reverts the most recently applied migration.
///
/// Returns the reverted version, or `None` when nothing is applied.
pub fn rollback_last(conn: &mut Connection) -> Result<Option<u32>> {
    let Some(version) = current_version(conn)? else {
        tracing::info!("No applied migrations to roll back");
        return Ok(None);
    };

    let Some((_, script)) = ROLLBACKS.iter().find(|(v, _)| *v == version) else {
        bail!("no rollback script for schema version {version}");
    };

    let tx = conn.transaction().context("begin rollback")?;
    tx.execute_batch(script)
        .with_context(|| format!("roll back schema version {version}"))?;
    tx.execute(&format!("DELETE FROM {HISTORY_TABLE} WHERE version = ?1"), [version])
        .context("update schema history")?;
    tx.commit().context("commit rollback")?;

    tracing::info!(version, "Rolled back migration");
    Ok(Some(version))
}
