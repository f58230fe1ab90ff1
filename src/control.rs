//! # Control Signal
//! Shared start/stop flag between whoever controls ingestion (HTTP handlers,
//! the shutdown path) and the ingestion loop, which polls it once per item.
//!
//! Besides the flag itself the signal carries a `Notify` so a loop parked on
//! the stream or in a backoff sleep wakes up as soon as a stop arrives.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct ControlSignal {
    stop: AtomicBool,
    wake: Notify,
}

impl ControlSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.wake.notify_waiters();
    }

    /// Idempotent. Clearing the flag does not restart a loop that already
    /// exited; see `IngestionController::start`.
    pub fn request_start(&self) {
        self.stop.store(false, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Resolves once a stop has been requested.
    pub async fn stopped(&self) {
        loop {
            // Register before checking the flag so a concurrent `request_stop`
            // cannot slip between the check and the await.
            let notified = self.wake.notified();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }
}
