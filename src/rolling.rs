//! # Rolling Statistics
//! Display-ready summary of a snapshot: overall mean of the score history and
//! a trailing moving average, recomputed on every poll.
//!
//! The moving average uses `window = min(configured, history.len())` and
//! averages whatever is available for the first points (`min_periods = 1`),
//! so it always has one value per history entry.

use serde::Serialize;

use crate::store::Snapshot;

pub const DEFAULT_MOVING_AVERAGE_WINDOW: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollingStats {
    /// `None` while there is no data yet.
    pub mean: Option<f64>,
    /// Effective window, 0 for an empty history.
    pub window: usize,
    pub moving_average: Vec<f64>,
}

impl RollingStats {
    pub fn from_history(history: &[f64], configured_window: usize) -> Self {
        let window = effective_window(configured_window, history.len());
        let mean = if history.is_empty() {
            None
        } else {
            Some(history.iter().sum::<f64>() / history.len() as f64)
        };
        Self {
            mean,
            window,
            moving_average: moving_average(history, window),
        }
    }

    pub fn from_snapshot(snapshot: &Snapshot, configured_window: usize) -> Self {
        Self::from_history(&snapshot.history, configured_window)
    }

    /// Last moving-average point, i.e. the current trend value.
    pub fn latest_average(&self) -> Option<f64> {
        self.moving_average.last().copied()
    }
}

/// Window actually used for a history of `len` scores.
pub fn effective_window(configured: usize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    configured.max(1).min(len)
}

/// Trailing mean over at most `window` values ending at each index.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if values.is_empty() || window == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0f64;
    for (i, v) in values.iter().enumerate() {
        sum += v;
        if i >= window {
            sum -= values[i - window];
        }
        let n = (i + 1).min(window);
        out.push(sum / n as f64);
    }
    out
}
