use std::sync::Arc;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::core::config::DatabaseConfig;
use crate::core::error::{AppError, AppResult};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Knobs for [`create_pool`].
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    /// How long SQLite waits on a locked database before returning `SQLITE_BUSY`
    pub busy_timeout: Duration,
    /// How long a caller waits for a free pooled connection
    pub checkout_timeout: Duration,
}

impl PoolSettings {
    pub fn from_config(config: &DatabaseConfig, checkout_timeout: Duration) -> Self {
        Self {
            max_connections: config.max_connections,
            busy_timeout: config.busy_timeout(),
            checkout_timeout,
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            busy_timeout: Duration::from_secs(5),
            checkout_timeout: Duration::from_secs(10),
        }
    }
}

/// Create a new database connection pool
///
/// Every connection gets a busy timeout, foreign keys on and WAL journaling,
/// so readers never block the single writer.
///
/// # Example
///
/// ```no_run
/// use sarafancore::storage::{create_pool, PoolSettings};
///
/// let pool = create_pool("sarafan.sqlite", &PoolSettings::default())?;
/// # Ok::<(), r2d2::Error>(())
/// ```
pub fn create_pool(database_path: &str, settings: &PoolSettings) -> Result<DbPool, r2d2::Error> {
    let busy_timeout = settings.busy_timeout;
    let manager = SqliteConnectionManager::file(database_path).with_init(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")
    });

    Pool::builder()
        .max_size(settings.max_connections)
        .connection_timeout(settings.checkout_timeout)
        .build(manager)
}

/// Creates the pool, retrying a fixed number of times with a constant delay.
///
/// Only used at startup; in-flight operations are never retried.
pub async fn connect_with_retry(
    database_path: &str,
    settings: &PoolSettings,
    retries: usize,
    delay: Duration,
) -> AppResult<DbPool> {
    let attempt = || {
        let path = database_path.to_string();
        let settings = settings.clone();
        async move {
            match tokio::task::spawn_blocking(move || create_pool(&path, &settings)).await {
                Ok(pool) => Ok(pool?),
                Err(join) => Err(AppError::Internal(anyhow::Error::new(join).context("pool creation task failed"))),
            }
        }
    };

    attempt
        .retry(ConstantBuilder::default().with_delay(delay).with_max_times(retries))
        .notify(|err: &AppError, dur: Duration| {
            tracing::warn!(error = %err, delay = ?dur, path = database_path, "Database connection failed, retrying");
        })
        .await
}

/// Get a connection from the pool
pub fn get_connection(pool: &DbPool) -> Result<DbConnection, r2d2::Error> {
    pool.get()
}

/// Bounded access to the pool from async code.
///
/// Every call runs on the blocking thread pool and is cut off after
/// `timeout`. A timed-out call keeps running to completion in the
/// background; its result is discarded.
#[derive(Clone)]
pub struct Store {
    pool: Arc<DbPool>,
    timeout: Duration,
}

impl Store {
    pub fn new(pool: Arc<DbPool>, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Runs `f` with a pooled connection.
    pub async fn call<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> AppResult<T> + Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        let task = tokio::task::spawn_blocking(move || {
            let mut conn = get_connection(&pool)?;
            f(&mut conn)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(AppError::Internal(anyhow::Error::new(join).context("store task failed"))),
            Err(_) => Err(AppError::StoreTimeout(self.timeout)),
        }
    }
}
