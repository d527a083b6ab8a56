//! Poll source (backstop)
//!
//! Re-derives the events the push feed should have delivered by replaying
//! the log range since the last confirmed position. Results go through the
//! engine's dedup filter like push frames, so overlapping detections collapse.

use crate::engine::{IngestEvent, IngestSender};
use crate::source::{EventKind, LogSource, SourceError};
use crate::telemetry::{increment_counter, set_gauge, CounterMetric, GaugeMetric};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default distance behind the current position to start from
pub const DEFAULT_SAFETY_MARGIN: u64 = 10;

/// Errors from one poll iteration
#[derive(Debug, Error)]
pub enum PollError {
    #[error("log source error: {0}")]
    Source(#[from] SourceError),

    #[error("engine stopped")]
    EngineStopped,
}

/// Self-rescheduling log poller
pub struct PollSource {
    source: Arc<dyn LogSource>,
    kinds: Vec<EventKind>,
    interval: Duration,
    safety_margin: u64,
    high_water: Option<u64>,
    ingest_tx: IngestSender,
}

impl PollSource {
    pub fn new(
        source: Arc<dyn LogSource>,
        kinds: Vec<EventKind>,
        interval: Duration,
        safety_margin: u64,
        ingest_tx: IngestSender,
    ) -> Self {
        Self {
            source,
            kinds,
            interval,
            safety_margin,
            high_water: None,
            ingest_tx,
        }
    }

    /// Last fully processed position, once initialized
    pub fn high_water(&self) -> Option<u64> {
        self.high_water
    }

    /// Poll until the engine stops accepting events.
    ///
    /// The next iteration starts `interval` after the previous one finished,
    /// so iterations never overlap.
    pub async fn run(mut self) {
        tracing::info!(
            kinds = self.kinds.len(),
            interval_ms = self.interval.as_millis() as u64,
            "Starting poll source"
        );

        loop {
            match self.poll_once().await {
                Ok(0) => {}
                Ok(forwarded) => tracing::debug!(forwarded, "Poll iteration complete"),
                Err(PollError::EngineStopped) => break,
                Err(e) => {
                    increment_counter(CounterMetric::PollErrors, 1);
                    tracing::warn!(
                        error = %e,
                        high_water = ?self.high_water,
                        "Poll iteration failed"
                    );
                }
            }
            tokio::time::sleep(self.interval).await;
        }

        tracing::info!("Poll source stopped");
    }

    /// Run one iteration; returns the number of logs forwarded.
    ///
    /// The high-water mark only advances once every kind's range query has
    /// succeeded and its results reached the engine.
    pub async fn poll_once(&mut self) -> Result<usize, PollError> {
        let latest = self.source.current_position().await?;

        let last = match self.high_water {
            Some(last) => last,
            None => {
                let start = latest.saturating_sub(self.safety_margin);
                tracing::info!(latest, start, "Initialized poll high-water mark");
                self.set_high_water(start);
                start
            }
        };

        if latest <= last {
            return Ok(0);
        }

        let from = last + 1;
        let mut batches = Vec::with_capacity(self.kinds.len());
        for kind in &self.kinds {
            let logs = self.source.get_events(from, latest, kind).await?;
            batches.push((kind.clone(), logs));
        }

        let mut forwarded = 0;
        for (kind, logs) in batches {
            if logs.is_empty() {
                continue;
            }
            forwarded += logs.len();
            self.ingest_tx
                .send(IngestEvent::Logs { kind, logs })
                .await
                .map_err(|_| PollError::EngineStopped)?;
        }

        self.set_high_water(latest);
        Ok(forwarded)
    }

    fn set_high_water(&mut self, position: u64) {
        self.high_water = Some(position);
        set_gauge(GaugeMetric::PollHighWater, position as f64);
    }
}
