// src/lib.rs
// Public library surface for the service binary, the replay tool and integration tests.

pub mod api;
pub mod config;
pub mod control;
pub mod ingest;
pub mod metrics;
pub mod rolling;
pub mod sentiment;
pub mod store;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::{ConfigError, EngineConfig, RedditCredentials};
pub use crate::control::ControlSignal;
pub use crate::ingest::controller::{ControlStatus, IngestionController};
pub use crate::ingest::{IngestError, IngestionLoop, LoopState, RunOutcome};
pub use crate::sentiment::{LexiconScorer, SentimentScorer};
pub use crate::store::{AggregateStore, ScoredRecord, Snapshot};
