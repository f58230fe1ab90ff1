// src/ingest/providers/fixture.rs
//! Scripted comment source for offline replays and tests. Each `connect`
//! consumes the next session of the script.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::ingest::types::{CommentSource, CommentStream, Event, StreamConfig, StreamError};

#[derive(Debug, Clone)]
pub enum FixtureStep {
    Event(Event),
    /// Stream-level failure (transport error).
    Fail(String),
    Delay(Duration),
    /// End the stream (`None`).
    Close,
}

#[derive(Debug, Clone)]
pub enum FixtureSession {
    /// Connect succeeds and replays the steps. Once they run out the stream
    /// stays idle.
    Steps(Vec<FixtureStep>),
    /// Connect fails with this error.
    Refuse(StreamError),
}

pub struct FixtureSource {
    sessions: Mutex<VecDeque<FixtureSession>>,
    connects: Mutex<Vec<Instant>>,
    open: Arc<AtomicUsize>,
}

impl FixtureSource {
    pub fn scripted(sessions: Vec<FixtureSession>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into()),
            connects: Mutex::new(Vec::new()),
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// One session delivering `events`, then idle.
    pub fn from_events(events: Vec<Event>) -> Self {
        Self::scripted(vec![FixtureSession::Steps(
            events.into_iter().map(FixtureStep::Event).collect(),
        )])
    }

    /// One JSON event per line; blank lines and `#` comments are ignored.
    pub fn from_jsonl(s: &str) -> Result<Self> {
        let mut events = Vec::new();
        for (n, line) in s.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let ev: Event = serde_json::from_str(line)
                .with_context(|| format!("parsing fixture event on line {}", n + 1))?;
            events.push(ev);
        }
        Ok(Self::from_events(events))
    }

    /// Events still queued across all remaining sessions.
    pub fn event_count(&self) -> usize {
        self.sessions
            .lock()
            .iter()
            .map(|s| match s {
                FixtureSession::Steps(steps) => steps
                    .iter()
                    .filter(|st| matches!(st, FixtureStep::Event(_)))
                    .count(),
                FixtureSession::Refuse(_) => 0,
            })
            .sum()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().len()
    }

    /// When each `connect` call happened (tokio clock, so paused-time tests
    /// can measure backoff).
    pub fn connect_times(&self) -> Vec<Instant> {
        self.connects.lock().clone()
    }

    /// Streams handed out and not dropped yet.
    pub fn open_streams(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommentSource for FixtureSource {
    async fn connect(&self, _cfg: &StreamConfig) -> Result<Box<dyn CommentStream>, StreamError> {
        self.connects.lock().push(Instant::now());
        let next = self.sessions.lock().pop_front();
        match next {
            Some(FixtureSession::Steps(steps)) => {
                self.open.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(FixtureStream {
                    steps: steps.into(),
                    open: self.open.clone(),
                }))
            }
            Some(FixtureSession::Refuse(e)) => Err(e),
            None => Err(StreamError::Transport("fixture script exhausted".to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "Fixture"
    }
}

struct FixtureStream {
    steps: VecDeque<FixtureStep>,
    open: Arc<AtomicUsize>,
}

impl Drop for FixtureStream {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CommentStream for FixtureStream {
    async fn next_event(&mut self) -> Option<Result<Event, StreamError>> {
        loop {
            match self.steps.pop_front() {
                Some(FixtureStep::Event(ev)) => return Some(Ok(ev)),
                Some(FixtureStep::Fail(msg)) => return Some(Err(StreamError::Transport(msg))),
                Some(FixtureStep::Delay(d)) => tokio::time::sleep(d).await,
                Some(FixtureStep::Close) => return None,
                None => return std::future::pending().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> StreamConfig {
        StreamConfig {
            source: "test".into(),
            skip_existing: false,
        }
    }

    #[tokio::test]
    async fn jsonl_fixture_replays_in_order_and_tracks_open_streams() {
        let src = FixtureSource::from_jsonl(
            r#"
# two comments
{"id":"a","source":"test","created_utc":1,"text":"first"}
{"id":"b","source":"test","created_utc":2,"text":"second"}
"#,
        )
        .unwrap();
        assert_eq!(src.event_count(), 2);

        let mut stream = src.connect(&cfg()).await.unwrap();
        assert_eq!(src.open_streams(), 1);
        let a = stream.next_event().await.unwrap().unwrap();
        let b = stream.next_event().await.unwrap().unwrap();
        assert_eq!((a.text.as_str(), b.text.as_str()), ("first", "second"));
        drop(stream);
        assert_eq!(src.open_streams(), 0);
        assert_eq!(src.connect_count(), 1);

        // Script is used up: further connects fail as transport errors.
        assert!(matches!(
            src.connect(&cfg()).await,
            Err(StreamError::Transport(_))
        ));
    }

    #[test]
    fn bad_jsonl_line_is_reported() {
        let err = FixtureSource::from_jsonl("{not json}").err().unwrap();
        assert!(err.to_string().contains("line 1"));
    }
}
