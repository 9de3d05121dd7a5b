//! Order lifecycle: model, service and the staff-message index

pub mod message_index;
pub mod models;
pub mod service;

pub use message_index::MessageIndex;
pub use models::{ClaimOutcome, NewOrder, Order, OrderStatus, Referrer, SweepReport, User};
pub use service::{OrderService, OrderServiceSettings, ORDER_ID_ATTEMPTS};
