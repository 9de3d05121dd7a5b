//! Sarafan core - order intake, claim arbitration and reminders
//!
//! This library holds everything the bot does that is not Telegram-specific.
//! The Telegram front-end (`sarafanbot`) only implements the [`notify::Notifier`]
//! contract and feeds inbound events into the [`dispatch::UpdateDispatcher`].
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging, identifier generation, markdown helpers
//! - `storage`: SQLite pool, migrations, order and user tables
//! - `orders`: order model, the order service and its message index
//! - `notify`: notification channel contract and message templates
//! - `dispatch`: routing of inbound messages and button callbacks
//! - `scheduler`: periodic reminder / re-notification sweeps

pub mod core;
pub mod dispatch;
pub mod notify;
pub mod orders;
pub mod scheduler;
pub mod storage;

// Re-export commonly used types for convenience
pub use core::config::AppConfig;
pub use core::error::{AppError, AppResult};
pub use dispatch::UpdateDispatcher;
pub use notify::{Notifier, NotifyError};
pub use orders::{OrderService, OrderServiceSettings};
pub use scheduler::ReminderScheduler;
pub use storage::{create_pool, DbPool, Store};
