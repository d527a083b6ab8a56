//! Flush scheduling
//!
//! Decides when buffered updates are handed to delivery. Only one delivery
//! is in flight at a time; triggers that arrive meanwhile are coalesced
//! into a single follow-up flush.

use crate::timer::PendingTimer;
use std::time::Duration;
use tokio::sync::mpsc;

/// When to flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Every admission requests a flush
    Immediate,
    /// The first admission opens a window; one flush when it closes
    Windowed(Duration),
}

impl FlushMode {
    /// Mode for a rollup window given in seconds (0 = immediate)
    pub fn from_window_secs(secs: u64) -> Self {
        if secs == 0 {
            FlushMode::Immediate
        } else {
            FlushMode::Windowed(Duration::from_secs(secs))
        }
    }
}

/// Wake-up sent by the window timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    WindowElapsed,
}

/// Debounced flush scheduler
#[derive(Debug)]
pub struct RollupScheduler {
    mode: FlushMode,
    window: PendingTimer,
    wake_tx: mpsc::UnboundedSender<FlushTrigger>,
    flush_requested: bool,
    in_flight: bool,
}

impl RollupScheduler {
    /// Create a scheduler and the receiver its window timer reports to
    pub fn new(mode: FlushMode) -> (Self, mpsc::UnboundedReceiver<FlushTrigger>) {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            mode,
            window: PendingTimer::new(),
            wake_tx,
            flush_requested: false,
            in_flight: false,
        };
        (scheduler, wake_rx)
    }

    pub fn mode(&self) -> FlushMode {
        self.mode
    }

    /// Record that an update was admitted to the buffer
    pub fn on_admit(&mut self) {
        match self.mode {
            FlushMode::Immediate => self.flush_requested = true,
            FlushMode::Windowed(window) => {
                let wake_tx = self.wake_tx.clone();
                let started = self.window.schedule(window, async move {
                    let _ = wake_tx.send(FlushTrigger::WindowElapsed);
                });
                if started {
                    tracing::debug!(window_ms = window.as_millis() as u64, "Rollup window opened");
                }
            }
        }
    }

    /// Handle a trigger from the window timer
    pub fn on_trigger(&mut self, trigger: FlushTrigger) {
        match trigger {
            FlushTrigger::WindowElapsed => {
                self.window.fired();
                self.flush_requested = true;
            }
        }
    }

    #[cfg(test)]
    fn window_pending(&self) -> bool {
        self.window.is_pending()
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Consume a pending flush request if no delivery is in flight.
    ///
    /// On `true` the caller must drain the buffer and either start a delivery
    /// ([`begin_delivery`](Self::begin_delivery)) or skip an empty buffer.
    pub fn take_flush(&mut self) -> bool {
        if !self.flush_requested || self.in_flight {
            return false;
        }
        self.flush_requested = false;
        true
    }

    pub fn begin_delivery(&mut self) {
        self.in_flight = true;
    }

    pub fn end_delivery(&mut self) {
        self.in_flight = false;
    }
}
