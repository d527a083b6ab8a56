//! Wall-clock abstraction
//!
//! The engine and normalizer read time through [`Clock`] so tests can pin it.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of Unix time in seconds
pub trait Clock: Send + Sync {
    /// Current Unix timestamp (seconds)
    fn unix_seconds(&self) -> i64;
}

/// System clock backed by chrono
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_seconds(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn unix_seconds(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
