//! Engine channel types

use crate::source::{EventKind, RawLog};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

/// Default capacity of the ingest channel
pub const DEFAULT_INGEST_BUFFER: usize = 1024;

/// Messages consumed by the engine's processing loop
#[derive(Debug)]
pub enum IngestEvent {
    /// One parsed push frame
    Frame(Value),
    /// Logs of one event kind from a poll range query
    Logs { kind: EventKind, logs: Vec<RawLog> },
    /// Stop after a best-effort final flush
    Shutdown(oneshot::Sender<ShutdownReport>),
}

/// Result of the final flush on shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Updates accepted by the receiver during the final flush
    pub delivered: usize,
    /// Updates still buffered at exit
    pub undelivered: usize,
}

/// Sender handle for ingest events
pub type IngestSender = mpsc::Sender<IngestEvent>;
/// Receiver handle for ingest events
pub type IngestReceiver = mpsc::Receiver<IngestEvent>;

/// Create the ingest channel shared by all sources
pub fn ingest_channel() -> (IngestSender, IngestReceiver) {
    mpsc::channel(DEFAULT_INGEST_BUFFER)
}
