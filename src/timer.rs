//! Debounced single-shot timers
//!
//! Reconnect scheduling and rollup windows share one rule: at most one
//! pending timer per concern. Scheduling while a timer is pending is a no-op,
//! and the owner clears the handle when it observes the fire notification,
//! before doing any work in response to it.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Optional handle to a pending timer task
#[derive(Debug, Default)]
pub struct PendingTimer {
    handle: Option<JoinHandle<()>>,
}

impl PendingTimer {
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Whether a timer is scheduled and has not been observed firing
    pub fn is_pending(&self) -> bool {
        self.handle.is_some()
    }

    /// Schedule `on_fire` to run after `delay`.
    ///
    /// Returns `false` without scheduling anything if a timer is already pending.
    pub fn schedule<F>(&mut self, delay: Duration, on_fire: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.handle.is_some() {
            return false;
        }

        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire.await;
        }));
        true
    }

    /// Clear the handle after the fire notification has been received
    pub fn fired(&mut self) {
        self.handle = None;
    }

    /// Abort the pending timer, if any
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for PendingTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
