//! Ordered update buffer

use crate::normalize::Update;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Updates awaiting delivery, in admission order
#[derive(Debug, Default)]
pub struct RollupBuffer {
    updates: VecDeque<Update>,
}

impl RollupBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, update: Update) {
        self.updates.push_back(update);
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Take the entire contents as one batch
    pub fn drain_all(&mut self) -> Vec<Update> {
        self.updates.drain(..).collect()
    }

    /// Put a failed batch back ahead of anything admitted since it was drained
    pub fn requeue_front(&mut self, batch: Vec<Update>) {
        for update in batch.into_iter().rev() {
            self.updates.push_front(update);
        }
    }

    #[cfg(test)]
    fn iter(&self) -> impl Iterator<Item = &Update> {
        self.updates.iter()
    }
}

/// Shared read-only view of the buffer depth, for diagnostics
#[derive(Debug, Clone, Default)]
pub struct BufferDepth(Arc<AtomicUsize>);

impl BufferDepth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, depth: usize) {
        self.0.store(depth, Ordering::Relaxed);
    }
}
