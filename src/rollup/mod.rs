//! Rollup buffer and flush scheduling

mod buffer;
mod scheduler;

pub use buffer::{BufferDepth, RollupBuffer};
pub use scheduler::{FlushMode, FlushTrigger, RollupScheduler};
