//! Connection supervisor types and configuration

use std::time::Duration;

/// Supervisor configuration
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Fixed delay before reconnecting after a close
    pub reconnect_delay: Duration,
    /// Interval of the liveness log while open
    pub heartbeat_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(60),
        }
    }
}

impl SupervisorConfig {
    /// Set reconnect delay
    pub fn reconnect_delay(mut self, d: Duration) -> Self {
        self.reconnect_delay = d;
        self
    }

    /// Set heartbeat interval
    pub fn heartbeat_interval(mut self, d: Duration) -> Self {
        self.heartbeat_interval = d;
        self
    }
}

/// Lifecycle of the push connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Events reported to the supervisor loop.
///
/// Connection events carry the generation of the connection that produced
/// them so events from a torn-down connection can be ignored.
#[derive(Debug)]
pub(crate) enum ConnectionEvent {
    Opened { generation: u64 },
    Frame { generation: u64, text: String },
    Error { generation: u64, error: String },
    Closed { generation: u64 },
    ReconnectDue,
}
