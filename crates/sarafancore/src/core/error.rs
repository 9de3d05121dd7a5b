use std::time::Duration;

use thiserror::Error;

use crate::notify::NotifyError;
use crate::orders::OrderStatus;

/// Centralized error type for the order core.
///
/// Business-rule conflicts (`ConsultationExists`, `AlreadyClaimed`,
/// `NoActiveOrder`) are expected outcomes and get specific user-facing
/// replies; everything else is logged and answered with a generic apology.
#[derive(Error, Debug)]
pub enum AppError {
    /// No order with this id
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// No user with this chat id
    #[error("User not found: {0}")]
    UserNotFound(i64),

    /// The order is no longer `new`, or another staff member won the claim
    #[error("Order {0} is already claimed or closed")]
    AlreadyClaimed(String),

    /// The client already has an order in a non-terminal state
    #[error("Client {0} already has an active consultation")]
    ConsultationExists(i64),

    /// Upgrade requested but the client has nothing to upgrade
    #[error("Client {0} has no active consultation")]
    NoActiveOrder(i64),

    #[error("Order {order_id}: cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// A store call did not finish within its deadline
    #[error("Store call timed out after {0:?}")]
    StoreTimeout(Duration),

    /// Notification channel errors
    #[error("Notification error: {0}")]
    Notification(#[from] NotifyError),

    /// Every generated order id collided with an existing one
    #[error("Could not allocate a unique order id after {0} attempts")]
    IdSpaceExhausted(u32),

    /// Anything else, wrapped with context
    #[error("Internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Expected business-rule outcomes. Not application failures.
    pub fn is_business_conflict(&self) -> bool {
        matches!(
            self,
            AppError::ConsultationExists(_) | AppError::AlreadyClaimed(_) | AppError::NoActiveOrder(_)
        )
    }

    /// Connection-level failures that a caller may retry at the connection layer.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::DatabasePool(_) | AppError::StoreTimeout(_) => true,
            AppError::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Absent entities. Callers treat these as terminal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::OrderNotFound(_) | AppError::UserNotFound(_))
    }
}
