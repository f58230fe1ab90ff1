// src/ingest/backoff.rs
use std::time::Duration;

/// Capped exponential backoff with a bounded number of consecutive attempts.
///
/// The first delay equals `initial`; each further attempt doubles it up to
/// `max`. `max_attempts == 0` means no cap on attempts. The caller resets the
/// counter once a connection succeeds.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            max: max.max(initial),
            max_attempts,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the attempts are used up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts != 0 && self.attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(self.attempt);
        let delay = self.initial.saturating_mul(factor).min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Consecutive attempts since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}
