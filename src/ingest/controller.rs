// src/ingest/controller.rs
//! Command side of the engine: start/stop/toggle the ingestion loop and join
//! it on shutdown. Holds the loop's task handle so the loop is never a
//! detached background job.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::control::ControlSignal;
use crate::ingest::types::CommentSource;
use crate::ingest::{IngestError, IngestionLoop, LoopState, RunOutcome};
use crate::sentiment::SentimentScorer;
use crate::store::AggregateStore;

type RunHandle = JoinHandle<Result<RunOutcome, IngestError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlStatus {
    pub stop_requested: bool,
    pub running: bool,
    pub state: LoopState,
}

pub struct IngestionController {
    config: EngineConfig,
    source: Arc<dyn CommentSource>,
    scorer: Arc<dyn SentimentScorer>,
    store: Arc<AggregateStore>,
    control: Arc<ControlSignal>,
    state: Arc<watch::Sender<LoopState>>,
    task: Mutex<Option<RunHandle>>,
}

impl IngestionController {
    /// Builds the store from the configured capacities. Nothing runs until
    /// `start`.
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn CommentSource>,
        scorer: Arc<dyn SentimentScorer>,
    ) -> Self {
        let store = Arc::new(AggregateStore::new(
            config.history_capacity,
            config.recent_log_capacity,
        ));
        let (tx, _rx) = watch::channel(LoopState::Stopped);
        Self {
            config,
            source,
            scorer,
            store,
            control: Arc::new(ControlSignal::new()),
            state: Arc::new(tx),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<AggregateStore> {
        self.store.clone()
    }

    pub fn control(&self) -> Arc<ControlSignal> {
        self.control.clone()
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    pub async fn status(&self) -> ControlStatus {
        let running = self
            .task
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished());
        self.status_with(running)
    }

    /// Make sure a loop is running with the stop flag cleared.
    ///
    /// A loop that still has a stop pending is joined first and replaced by a
    /// fresh one, so a start right after a stop is never lost.
    pub async fn start(&self) -> ControlStatus {
        let mut guard = self.task.lock().await;

        if let Some(handle) = guard.as_ref() {
            let live = !handle.is_finished() && self.state() != LoopState::Stopped;
            if live && !self.control.is_stop_requested() {
                return self.status_with(true);
            }
        }
        // The flag is still set here, so the old loop is on its way out.
        if let Some(handle) = guard.take() {
            log_join(handle.await);
        }
        self.control.request_start();

        let run = IngestionLoop::new(
            self.config.clone(),
            self.source.clone(),
            self.scorer.clone(),
            self.store.clone(),
            self.control.clone(),
        )
        .with_state_channel(self.state.clone());
        // Publish before spawning so callers never observe a stale `Stopped`.
        self.state.send_replace(LoopState::Connecting);
        *guard = Some(tokio::spawn(run.run()));
        info!(target: "ingest", "ingestion started");
        self.status_with(true)
    }

    /// Request a cooperative stop. Does not wait for the loop.
    pub async fn stop(&self) -> ControlStatus {
        self.control.request_stop();
        info!(target: "ingest", "ingestion stop requested");
        self.status().await
    }

    /// Stop when streaming is wanted, start when stopped.
    pub async fn toggle(&self) -> ControlStatus {
        let running = self.status().await.running;
        if running && !self.control.is_stop_requested() {
            self.stop().await
        } else {
            self.start().await
        }
    }

    /// Stop and wait for the loop to finish. Returns the last run's result,
    /// if a run was active.
    pub async fn shutdown(&self) -> Option<Result<RunOutcome, IngestError>> {
        self.control.request_stop();
        let handle = self.task.lock().await.take()?;
        log_join(handle.await)
    }

    fn status_with(&self, running: bool) -> ControlStatus {
        ControlStatus {
            stop_requested: self.control.is_stop_requested(),
            running,
            state: self.state(),
        }
    }
}

fn log_join(
    joined: Result<Result<RunOutcome, IngestError>, tokio::task::JoinError>,
) -> Option<Result<RunOutcome, IngestError>> {
    match joined {
        Ok(result) => Some(result),
        Err(e) => {
            warn!(target: "ingest", error = %e, "ingestion task failed to join");
            None
        }
    }
}
