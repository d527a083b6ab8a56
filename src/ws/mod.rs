//! Push connection supervision
//!
//! Keeps exactly one live push subscription, reconnecting after a fixed
//! delay whenever it closes, and logs liveness while it is open.

mod supervisor;
mod types;

pub use supervisor::ConnectionSupervisor;
pub use types::{ConnectionState, SupervisorConfig};
