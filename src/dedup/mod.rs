//! Duplicate suppression across ingestion paths
//!
//! The push subscription and the poll backstop can both observe the same
//! chain event. Each event is admitted once per seen-set epoch, where an
//! epoch ends when the set grows past its cap and is cleared wholesale.

use crate::normalize::{DedupKey, Update};
use crate::rollup::RollupBuffer;
use std::collections::HashSet;

/// Default seen-set cap
pub const DEFAULT_SEEN_CAP: usize = 5000;

/// Bounded set of admitted keys
#[derive(Debug)]
pub struct SeenSet {
    keys: HashSet<DedupKey>,
    cap: usize,
    epoch: u64,
}

impl SeenSet {
    pub fn new(cap: usize) -> Self {
        Self {
            keys: HashSet::new(),
            cap,
            epoch: 0,
        }
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of cap-triggered clears so far
    #[cfg(test)]
    fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Insert `key`, clearing the whole set once it exceeds the cap.
    ///
    /// The clear happens after insertion, so the key just inserted is
    /// forgotten too.
    fn insert(&mut self, key: DedupKey) {
        self.keys.insert(key);
        if self.keys.len() > self.cap {
            self.keys.clear();
            self.epoch += 1;
            tracing::info!(cap = self.cap, epoch = self.epoch, "Seen-set cap exceeded, cleared");
        }
    }
}

/// Outcome of offering an update to the filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Duplicate,
}

/// Admit/drop decision in front of the rollup buffer
#[derive(Debug)]
pub struct DedupFilter {
    seen: SeenSet,
}

impl DedupFilter {
    pub fn new(cap: usize) -> Self {
        Self {
            seen: SeenSet::new(cap),
        }
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    /// Append `update` to `buffer` unless `key` was already admitted this epoch.
    ///
    /// Duplicates are dropped silently.
    pub fn record_once(
        &mut self,
        key: DedupKey,
        update: Update,
        buffer: &mut RollupBuffer,
    ) -> Admission {
        if self.seen.contains(&key) {
            tracing::trace!(key = %key, "Duplicate dropped");
            return Admission::Duplicate;
        }
        self.seen.insert(key);
        buffer.push(update);
        Admission::Admitted
    }

    /// Append an update that carries no stable event identifier
    pub fn admit_unkeyed(&mut self, update: Update, buffer: &mut RollupBuffer) -> Admission {
        buffer.push(update);
        Admission::Admitted
    }
}

impl Default for DedupFilter {
    fn default() -> Self {
        Self::new(DEFAULT_SEEN_CAP)
    }
}
