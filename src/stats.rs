//! Counters for the periodic activity snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::resolver::Outcome;

/// Per-outcome counters, reset on every snapshot.
pub struct Stats {
    pub received: AtomicU64,
    pub resolved: AtomicU64,
    pub not_implemented: AtomicU64,
    pub forwarded: AtomicU64,
    pub dropped: AtomicU64,
    pub failed: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            resolved: AtomicU64::new(0),
            not_implemented: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: Outcome) {
        match outcome {
            Outcome::Resolved => self.resolved.fetch_add(1, Ordering::Relaxed),
            Outcome::NotImplemented => self.not_implemented.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// An upstream reply was relayed back to the requester.
    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A relay ended in SERVER_FAILURE instead of an upstream reply.
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.swap(0, Ordering::Relaxed),
            resolved: self.resolved.swap(0, Ordering::Relaxed),
            not_implemented: self.not_implemented.swap(0, Ordering::Relaxed),
            forwarded: self.forwarded.swap(0, Ordering::Relaxed),
            dropped: self.dropped.swap(0, Ordering::Relaxed),
            failed: self.failed.swap(0, Ordering::Relaxed),
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StatsSnapshot {
    pub received: u64,
    pub resolved: u64,
    pub not_implemented: u64,
    pub forwarded: u64,
    pub dropped: u64,
    pub failed: u64,
}
