// src/ingest/mod.rs
//! Ingestion loop: stream → scorer → store, with reconnect/backoff and
//! cooperative cancellation.
//!
//! One loop runs per session. It owns the stream connection for as long as it
//! streams; the connection is dropped before every backoff wait and on every
//! exit path.

pub mod backoff;
pub mod controller;
pub mod providers;
pub mod types;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::control::ControlSignal;
use crate::ingest::backoff::Backoff;
use crate::ingest::types::{CommentSource, CommentStream, Event, StreamError};
use crate::sentiment::SentimentScorer;
use crate::store::{AggregateStore, ScoredRecord};

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_comments_scored_total",
            "Comments scored and recorded into the store."
        );
        describe_counter!(
            "ingest_scoring_errors_total",
            "Comments skipped because scoring failed."
        );
        describe_counter!(
            "ingest_stream_errors_total",
            "Stream-level failures (transport, close, timeout)."
        );
        describe_counter!("ingest_reconnects_total", "Reconnect attempts after a stream failure.");
        describe_gauge!(
            "ingest_loop_state",
            "0=stopped, 1=connecting, 2=streaming, 3=reconnecting."
        );
        describe_histogram!("ingest_score", "Distribution of compound sentiment scores.");
        describe_counter!(
            "reddit_comments_fetched_total",
            "Comments returned by Reddit listing calls (before dedup)."
        );
        describe_histogram!(
            "reddit_listing_fetch_ms",
            "Reddit listing fetch + parse time in milliseconds."
        );
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Stopped,
    Connecting,
    Streaming,
    Reconnecting,
}

impl LoopState {
    fn gauge_value(self) -> f64 {
        match self {
            LoopState::Stopped => 0.0,
            LoopState::Connecting => 1.0,
            LoopState::Streaming => 2.0,
            LoopState::Reconnecting => 3.0,
        }
    }
}

/// How a run ended when it ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    LimitReached { processed: u64 },
    StopRequested { processed: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestError {
    /// Bad credentials or source; the loop never streamed.
    Config(String),
    RetriesExhausted { attempts: u32, last_error: String },
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Config(msg) => write!(f, "ingest configuration error: {msg}"),
            IngestError::RetriesExhausted {
                attempts,
                last_error,
            } => write!(
                f,
                "gave up after {attempts} reconnect attempts (last error: {last_error})"
            ),
        }
    }
}

impl std::error::Error for IngestError {}

/// Normalize comment text: decode HTML entities, ASCII quotes, collapse
/// whitespace, trim. Punctuation is kept (the scorer reads `!`).
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("whitespace regex"));
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Cut `text` to at most `max_chars` characters, appending `...` when cut.
pub fn truncate_for_display(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

impl ScoredRecord {
    pub fn from_event(event: &Event, score: f64, max_chars: usize) -> Self {
        Self {
            text: truncate_for_display(&event.text, max_chars),
            score,
            timestamp: DateTime::<Utc>::from_timestamp(event.created_utc, 0)
                .unwrap_or_else(Utc::now),
        }
    }
}

enum SessionEnd {
    LimitReached,
    StopRequested,
    Failed(StreamError),
}

enum Retry {
    Again,
    Stop,
    Exhausted,
}

/// The single producer feeding an `AggregateStore`.
pub struct IngestionLoop {
    config: EngineConfig,
    source: Arc<dyn CommentSource>,
    scorer: Arc<dyn SentimentScorer>,
    store: Arc<AggregateStore>,
    control: Arc<ControlSignal>,
    state: Arc<watch::Sender<LoopState>>,
}

impl IngestionLoop {
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn CommentSource>,
        scorer: Arc<dyn SentimentScorer>,
        store: Arc<AggregateStore>,
        control: Arc<ControlSignal>,
    ) -> Self {
        let (tx, _rx) = watch::channel(LoopState::Stopped);
        Self {
            config,
            source,
            scorer,
            store,
            control,
            state: Arc::new(tx),
        }
    }

    /// Publish state changes on an existing channel (shared across runs by
    /// the controller).
    pub fn with_state_channel(mut self, state: Arc<watch::Sender<LoopState>>) -> Self {
        self.state = state;
        self
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// Drive the stream until the session limit, a stop request, a fatal
    /// configuration error, or exhausted reconnects. Always ends `Stopped`.
    pub async fn run(self) -> Result<RunOutcome, IngestError> {
        ensure_metrics_described();
        let stream_cfg = self.config.stream_config();
        let mut backoff = Backoff::new(
            self.config.reconnect_delay(),
            self.config.max_reconnect_delay(),
            self.config.max_reconnect_attempts,
        );
        let mut processed: u64 = 0;

        info!(
            target: "ingest",
            source = self.source.name(),
            subreddit = %stream_cfg.source,
            limit = self.config.per_session_limit,
            "ingestion loop starting"
        );

        let outcome = loop {
            if self.control.is_stop_requested() {
                break Ok(RunOutcome::StopRequested { processed });
            }

            self.set_state(LoopState::Connecting);
            let connected = tokio::select! {
                _ = self.control.stopped() => break Ok(RunOutcome::StopRequested { processed }),
                r = self.source.connect(&stream_cfg) => r,
            };
            let failure = match connected {
                Ok(mut stream) => {
                    // A working connection restores the retry budget.
                    backoff.reset();
                    self.set_state(LoopState::Streaming);
                    info!(target: "ingest", subreddit = %stream_cfg.source, "stream connected");
                    let ended = self.pump(stream.as_mut(), &mut processed).await;
                    drop(stream);
                    match ended {
                        SessionEnd::LimitReached => {
                            break Ok(RunOutcome::LimitReached { processed })
                        }
                        SessionEnd::StopRequested => {
                            break Ok(RunOutcome::StopRequested { processed })
                        }
                        SessionEnd::Failed(e) => e,
                    }
                }
                Err(e) => e,
            };

            if failure.is_fatal() {
                warn!(target: "ingest", error = %failure, "fatal stream configuration error");
                break Err(IngestError::Config(failure.to_string()));
            }

            counter!("ingest_stream_errors_total").increment(1);
            match self.wait_backoff(&mut backoff, &failure).await {
                Retry::Again => continue,
                Retry::Stop => break Ok(RunOutcome::StopRequested { processed }),
                Retry::Exhausted => {
                    break Err(IngestError::RetriesExhausted {
                        attempts: backoff.attempts(),
                        last_error: failure.to_string(),
                    })
                }
            }
        };

        self.set_state(LoopState::Stopped);
        match &outcome {
            Ok(o) => info!(target: "ingest", outcome = ?o, "ingestion loop stopped"),
            Err(e) => warn!(target: "ingest", error = %e, "ingestion loop stopped with error"),
        }
        outcome
    }

    async fn pump(&self, stream: &mut dyn CommentStream, processed: &mut u64) -> SessionEnd {
        let limit = self.config.per_session_limit;
        let receive_timeout = self.config.receive_timeout();

        loop {
            if *processed >= limit {
                return SessionEnd::LimitReached;
            }
            if self.control.is_stop_requested() {
                return SessionEnd::StopRequested;
            }

            let received = tokio::select! {
                _ = self.control.stopped() => return SessionEnd::StopRequested,
                r = tokio::time::timeout(receive_timeout, stream.next_event()) => r,
            };

            let event = match received {
                Ok(Some(Ok(ev))) => ev,
                Ok(Some(Err(e))) => return SessionEnd::Failed(e),
                Ok(None) => return SessionEnd::Failed(StreamError::Closed),
                Err(_) => return SessionEnd::Failed(StreamError::Timeout(receive_timeout)),
            };

            if self.control.is_stop_requested() {
                return SessionEnd::StopRequested;
            }

            match self.process(&event) {
                Ok(score) => {
                    *processed += 1;
                    debug!(
                        target: "ingest",
                        processed = *processed,
                        score = %format!("{score:.3}"),
                        text = %truncate_for_display(&event.text, 50),
                        "comment scored"
                    );
                }
                Err(e) => {
                    self.store.note_scoring_error();
                    counter!("ingest_scoring_errors_total").increment(1);
                    warn!(target: "ingest", id = %event.id, error = %e, "skipping comment: scoring failed");
                }
            }
        }
    }

    fn process(&self, event: &Event) -> anyhow::Result<f64> {
        let score = self.scorer.score(&event.text)?;
        if !score.is_finite() || !(-1.0..=1.0).contains(&score) {
            anyhow::bail!("score {score} outside [-1, 1]");
        }
        let record = ScoredRecord::from_event(event, score, self.config.truncate_chars);
        self.store.record(score, record);
        counter!("ingest_comments_scored_total").increment(1);
        histogram!("ingest_score").record(score);
        Ok(score)
    }

    async fn wait_backoff(&self, backoff: &mut Backoff, cause: &StreamError) -> Retry {
        self.set_state(LoopState::Reconnecting);
        let Some(delay) = backoff.next_delay() else {
            warn!(target: "ingest", error = %cause, attempts = backoff.attempts(), "reconnect attempts exhausted");
            return Retry::Exhausted;
        };
        self.store.note_reconnect();
        counter!("ingest_reconnects_total").increment(1);
        warn!(
            target: "ingest",
            error = %cause,
            attempt = backoff.attempts(),
            delay_ms = delay.as_millis() as u64,
            "stream failed; reconnecting after delay"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.control.stopped() => return Retry::Stop,
        }
        if self.control.is_stop_requested() {
            Retry::Stop
        } else {
            Retry::Again
        }
    }

    fn set_state(&self, state: LoopState) {
        let prev = self.state.send_replace(state);
        gauge!("ingest_loop_state").set(state.gauge_value());
        if prev != state {
            debug!(target: "ingest", from = ?prev, to = ?state, "loop state");
        }
    }
}
