//! Push connection supervisor with fixed-delay reconnection

use super::types::{ConnectionEvent, ConnectionState, SupervisorConfig};
use crate::engine::{IngestEvent, IngestSender};
use crate::rollup::BufferDepth;
use crate::source::PushSource;
use crate::telemetry::{increment_counter, CounterMetric};
use crate::timer::PendingTimer;
use futures_util::StreamExt;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Owns the push connection lifecycle.
///
/// Frames are parsed as JSON and forwarded to the engine; unparseable frames
/// are logged and dropped. A close schedules exactly one reconnect after the
/// configured delay. Errors are only logged, since a failing connection is
/// always followed by its close.
pub struct ConnectionSupervisor {
    source: Arc<dyn PushSource>,
    config: SupervisorConfig,
    ingest_tx: IngestSender,
    depth: BufferDepth,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    events_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    connection: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    reconnect: PendingTimer,
    generation: u64,
}

impl ConnectionSupervisor {
    /// Create a supervisor; nothing connects until [`run`](Self::run)
    pub fn new(
        source: Arc<dyn PushSource>,
        config: SupervisorConfig,
        ingest_tx: IngestSender,
        depth: BufferDepth,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            source,
            config,
            ingest_tx,
            depth,
            state_tx,
            events_tx,
            events_rx,
            connection: None,
            heartbeat: None,
            reconnect: PendingTimer::new(),
            generation: 0,
        }
    }

    /// Subscribe to connection state changes
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Connect and supervise until the engine stops accepting frames
    pub async fn run(mut self) {
        self.connect();

        while let Some(event) = self.events_rx.recv().await {
            if self.handle(event).await.is_break() {
                break;
            }
        }

        tracing::info!("Connection supervisor stopped");
    }

    /// Tear down any existing connection and open a new one
    fn connect(&mut self) {
        if let Some(previous) = self.connection.take() {
            self.state_tx.send_replace(ConnectionState::Closing);
            previous.abort();
        }
        self.stop_heartbeat();

        self.generation += 1;
        self.state_tx.send_replace(ConnectionState::Connecting);

        let source = self.source.clone();
        let events_tx = self.events_tx.clone();
        let generation = self.generation;
        self.connection = Some(tokio::spawn(async move {
            run_connection(source, generation, events_tx).await;
        }));
    }

    async fn handle(&mut self, event: ConnectionEvent) -> ControlFlow<()> {
        match event {
            ConnectionEvent::ReconnectDue => {
                self.reconnect.fired();
                increment_counter(CounterMetric::Reconnects, 1);
                tracing::info!(generation = self.generation + 1, "Reconnecting push feed");
                self.connect();
            }
            ConnectionEvent::Opened { generation } if generation == self.generation => {
                tracing::info!(generation, "Push feed connected");
                self.state_tx.send_replace(ConnectionState::Open);
                self.start_heartbeat();
            }
            ConnectionEvent::Frame { generation, text } if generation == self.generation => {
                match serde_json::from_str(&text) {
                    Ok(frame) => {
                        if self.ingest_tx.send(IngestEvent::Frame(frame)).await.is_err() {
                            tracing::info!("Engine stopped, closing push feed");
                            return ControlFlow::Break(());
                        }
                    }
                    Err(e) => {
                        increment_counter(CounterMetric::MalformedFrames, 1);
                        tracing::warn!(
                            error = %e,
                            len = text.len(),
                            "Dropping malformed push frame"
                        );
                    }
                }
            }
            ConnectionEvent::Error { generation, error } if generation == self.generation => {
                tracing::warn!(generation, error = %error, "Push feed error");
            }
            ConnectionEvent::Closed { generation } if generation == self.generation => {
                self.connection = None;
                self.stop_heartbeat();
                self.state_tx.send_replace(ConnectionState::Disconnected);
                self.schedule_reconnect();
            }
            stale => {
                tracing::debug!(
                    event = ?stale,
                    current = self.generation,
                    "Ignoring stale connection event"
                );
            }
        }

        ControlFlow::Continue(())
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.config.reconnect_delay;
        let events_tx = self.events_tx.clone();
        let scheduled = self.reconnect.schedule(delay, async move {
            let _ = events_tx.send(ConnectionEvent::ReconnectDue);
        });
        if scheduled {
            tracing::warn!(
                delay_ms = delay.as_millis() as u64,
                "Push feed closed, reconnect scheduled"
            );
        }
    }

    fn start_heartbeat(&mut self) {
        self.stop_heartbeat();

        let period = self.config.heartbeat_interval;
        let depth = self.depth.clone();
        self.heartbeat = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                tracing::info!(buffered = depth.get(), "Push feed alive");
            }
        }));
    }

    fn stop_heartbeat(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.abort();
        }
        self.stop_heartbeat();
    }
}

/// Drive one connection, reporting its lifecycle to the supervisor
async fn run_connection(
    source: Arc<dyn PushSource>,
    generation: u64,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
) {
    match source.open().await {
        Ok(mut frames) => {
            if events_tx.send(ConnectionEvent::Opened { generation }).is_err() {
                return;
            }
            while let Some(item) = frames.next().await {
                let event = match item {
                    Ok(text) => ConnectionEvent::Frame { generation, text },
                    Err(e) => ConnectionEvent::Error {
                        generation,
                        error: e.to_string(),
                    },
                };
                if events_tx.send(event).is_err() {
                    return;
                }
            }
        }
        Err(e) => {
            let _ = events_tx.send(ConnectionEvent::Error {
                generation,
                error: e.to_string(),
            });
        }
    }

    let _ = events_tx.send(ConnectionEvent::Closed { generation });
}
