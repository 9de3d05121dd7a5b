//! SQLite storage: pool, migrations, order and user tables

pub mod db;
pub mod migrations;
pub mod orders;
pub mod users;

// Re-exports for convenience
pub use db::{connect_with_retry, create_pool, get_connection, DbConnection, DbPool, PoolSettings, Store};
