//! Upstream event sources
//!
//! Two capabilities feed the relay:
//! - a push subscription yielding raw text frames ([`PushSource`])
//! - a range query over event logs ([`LogSource`])

mod rpc;
mod types;
mod websocket;

pub use rpc::JsonRpcLogSource;
pub use types::{ArgRef, EventKind, RawLog, SourceError};
pub use websocket::WebSocketSource;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Items of an open push connection.
///
/// `Err` items are error events; the stream ending is the close event.
pub type FrameStream = BoxStream<'static, Result<String, SourceError>>;

/// Push-style subscription to an upstream feed
#[async_trait]
pub trait PushSource: Send + Sync {
    /// Open one connection and return its frames
    async fn open(&self) -> Result<FrameStream, SourceError>;
}

/// Range query over an ordered event log
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Latest confirmed position (e.g. block number)
    async fn current_position(&self) -> Result<u64, SourceError>;

    /// Events of `kind` in the inclusive range `from..=to`
    async fn get_events(
        &self,
        from: u64,
        to: u64,
        kind: &EventKind,
    ) -> Result<Vec<RawLog>, SourceError>;
}
