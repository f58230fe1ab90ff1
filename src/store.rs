//! # Aggregate Store
//! Shared state between the ingestion loop (single writer) and any number of
//! pollers (readers).
//!
//! Holds a fixed-capacity score history, a fixed-capacity log of recent
//! comments and monotonic counters, all behind one read-write lock so a
//! snapshot always reflects a single committed `record` call.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;
pub const DEFAULT_RECENT_CAPACITY: usize = 10;
const MAX_CAPACITY: usize = 100_000;

/// A scored comment as kept for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    pub text: String,
    pub score: f64,
    pub timestamp: DateTime<Utc>,
}

/// Consistent copy of the store at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Oldest first.
    pub history: Vec<f64>,
    /// Newest first.
    pub recent: Vec<ScoredRecord>,
    pub total_processed: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub total_processed: u64,
    pub scoring_errors: u64,
    pub reconnects: u64,
}

#[derive(Debug)]
pub struct AggregateStore {
    inner: RwLock<Inner>,
    history_capacity: usize,
    recent_capacity: usize,
}

#[derive(Debug)]
struct Inner {
    history: VecDeque<f64>,
    recent: VecDeque<ScoredRecord>,
    counters: Counters,
}

impl AggregateStore {
    /// Capacities are clamped to `1..=100_000`.
    pub fn new(history_capacity: usize, recent_capacity: usize) -> Self {
        let history_capacity = history_capacity.clamp(1, MAX_CAPACITY);
        let recent_capacity = recent_capacity.clamp(1, MAX_CAPACITY);
        Self {
            inner: RwLock::new(Inner {
                history: VecDeque::with_capacity(history_capacity),
                recent: VecDeque::with_capacity(recent_capacity),
                counters: Counters::default(),
            }),
            history_capacity,
            recent_capacity,
        }
    }

    /// Append one scored comment. Oldest entries fall off at capacity.
    pub fn record(&self, score: f64, record: ScoredRecord) {
        let mut inner = self.inner.write();

        if inner.history.len() == self.history_capacity {
            inner.history.pop_front();
        }
        inner.history.push_back(score);

        if inner.recent.len() == self.recent_capacity {
            inner.recent.pop_front();
        }
        inner.recent.push_back(record);

        inner.counters.total_processed += 1;
    }

    pub fn note_scoring_error(&self) {
        self.inner.write().counters.scoring_errors += 1;
    }

    pub fn note_reconnect(&self) {
        self.inner.write().counters.reconnects += 1;
    }

    /// Never fails; an empty store yields empty sequences and a zero count.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.read();
        Snapshot {
            history: inner.history.iter().copied().collect(),
            recent: inner.recent.iter().rev().cloned().collect(),
            total_processed: inner.counters.total_processed,
        }
    }

    pub fn counters(&self) -> Counters {
        self.inner.read().counters
    }
}

impl Default for AggregateStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_RECENT_CAPACITY)
    }
}
