//! Inbound event routing

pub mod intent;
pub mod router;

pub use intent::{CallbackAction, Intent};
pub use router::{DispatchDeps, DispatchHandles, HandlerError, UpdateDispatcher};
