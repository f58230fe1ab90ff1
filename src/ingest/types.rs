// src/ingest/types.rs
use std::fmt;
use std::time::Duration;

/// One comment pulled off the live stream. Never stored as-is; the loop turns
/// it into a `ScoredRecord` and drops it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct Event {
    pub id: String,
    pub source: String,   // subreddit name, e.g. "wallstreetbets"
    pub created_utc: i64, // unix seconds
    pub text: String,
}

/// What a stream is opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub source: String,
    /// Drop whatever is already on the listing when the stream opens.
    pub skip_existing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamError {
    /// Credentials rejected, unknown source. Never retried.
    Config(String),
    /// Network/HTTP/parse failure; the loop reconnects.
    Transport(String),
    /// The stream ended although it should be infinite.
    Closed,
    /// No item arrived within the receive timeout.
    Timeout(Duration),
}

impl StreamError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StreamError::Config(_))
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Config(msg) => write!(f, "stream configuration error: {msg}"),
            StreamError::Transport(msg) => write!(f, "stream transport error: {msg}"),
            StreamError::Closed => write!(f, "stream closed unexpectedly"),
            StreamError::Timeout(d) => write!(f, "no item received within {}ms", d.as_millis()),
        }
    }
}

impl std::error::Error for StreamError {}

/// Opens comment streams. One connection per `connect` call; the returned
/// stream owns the connection and releases it when dropped.
#[async_trait::async_trait]
pub trait CommentSource: Send + Sync {
    async fn connect(&self, cfg: &StreamConfig) -> Result<Box<dyn CommentStream>, StreamError>;
    fn name(&self) -> &'static str;
}

#[async_trait::async_trait]
pub trait CommentStream: Send {
    /// `None` means the stream is over. Must be cancel-safe: dropping the
    /// future mid-await may not lose an already received event.
    async fn next_event(&mut self) -> Option<Result<Event, StreamError>>;
}
