// src/ingest/providers/reddit.rs
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::config::RedditCredentials;
use crate::ingest::normalize_text;
use crate::ingest::types::{CommentSource, CommentStream, Event, StreamConfig, StreamError};

pub const AUTH_URL: &str = "https://www.reddit.com/api/v1/access_token";
pub const API_BASE: &str = "https://oauth.reddit.com";
const PAGE_LIMIT: u32 = 100;
const SEEN_CAPACITY: usize = 1_000;
const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: CommentData,
}

#[derive(Debug, Deserialize)]
struct CommentData {
    id: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    subreddit: String,
}

/// Parse a `/r/{sub}/comments` listing into events, oldest first.
/// Deleted/removed comments and empty bodies are dropped.
pub fn parse_listing(body: &str) -> Result<Vec<Event>, StreamError> {
    let listing: Listing = serde_json::from_str(body)
        .map_err(|e| StreamError::Transport(format!("parsing comment listing: {e}")))?;

    let mut out = Vec::with_capacity(listing.data.children.len());
    // Reddit lists newest first.
    for child in listing.data.children.into_iter().rev() {
        let c = child.data;
        if matches!(c.body.trim(), "[deleted]" | "[removed]") {
            continue;
        }
        let text = normalize_text(&c.body);
        if text.is_empty() {
            continue;
        }
        out.push(Event {
            id: c.id,
            source: c.subreddit,
            created_utc: c.created_utc as i64,
            text,
        });
    }
    Ok(out)
}

/// Bounded memory of comment ids already handed out.
#[derive(Debug)]
struct SeenIds {
    set: HashSet<String>,
    order: VecDeque<String>,
    cap: usize,
}

impl SeenIds {
    fn with_capacity(cap: usize) -> Self {
        Self {
            set: HashSet::with_capacity(cap),
            order: VecDeque::with_capacity(cap),
            cap: cap.max(1),
        }
    }

    /// `true` if the id was not seen before.
    fn insert(&mut self, id: &str) -> bool {
        if self.set.contains(id) {
            return false;
        }
        if self.order.len() == self.cap {
            if let Some(old) = self.order.pop_front() {
                self.set.remove(&old);
            }
        }
        self.order.push_back(id.to_string());
        self.set.insert(id.to_string());
        true
    }
}

/// Live comment stream of one subreddit over the Reddit OAuth API
/// (application-only `client_credentials` grant).
pub struct RedditSource {
    creds: RedditCredentials,
    client: reqwest::Client,
    fetch_interval: Duration,
    auth_url: String,
    api_base: String,
}

impl RedditSource {
    pub fn new(creds: RedditCredentials, fetch_interval: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(creds.user_agent.clone())
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("building reddit http client")?;
        Ok(Self {
            creds,
            client,
            fetch_interval,
            auth_url: AUTH_URL.to_string(),
            api_base: API_BASE.to_string(),
        })
    }

    /// Point at different endpoints (staging proxies, local mocks).
    pub fn with_endpoints(mut self, auth_url: &str, api_base: &str) -> Self {
        self.auth_url = auth_url.to_string();
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    async fn fetch_token(&self) -> Result<String, StreamError> {
        let resp = self
            .client
            .post(&self.auth_url)
            .basic_auth(&self.creds.client_id, Some(&self.creds.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| StreamError::Transport(format!("reddit auth request: {e}")))?;

        let status = resp.status();
        if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST
        ) {
            return Err(StreamError::Config(format!(
                "reddit rejected credentials ({status})"
            )));
        }
        if !status.is_success() {
            return Err(StreamError::Transport(format!("reddit auth returned {status}")));
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| StreamError::Transport(format!("reddit auth response: {e}")))?;
        match (body.access_token, body.error) {
            (Some(token), _) => Ok(token),
            (None, err) => Err(StreamError::Config(format!(
                "reddit auth failed: {}",
                err.unwrap_or_else(|| "no access token".to_string())
            ))),
        }
    }
}

#[async_trait]
impl CommentSource for RedditSource {
    async fn connect(&self, cfg: &StreamConfig) -> Result<Box<dyn CommentStream>, StreamError> {
        let token = self.fetch_token().await?;
        let mut stream = RedditStream {
            client: self.client.clone(),
            token,
            listing_url: format!("{}/r/{}/comments", self.api_base, cfg.source),
            subreddit: cfg.source.clone(),
            fetch_interval: self.fetch_interval,
            seen: SeenIds::with_capacity(SEEN_CAPACITY),
            buffer: VecDeque::new(),
            fetched: false,
        };

        if cfg.skip_existing {
            let existing = stream.fetch_page().await?;
            for ev in &existing {
                stream.seen.insert(&ev.id);
            }
            stream.fetched = true;
            debug!(target: "ingest", subreddit = %cfg.source, skipped = existing.len(), "skipped existing comments");
        }
        Ok(Box::new(stream))
    }

    fn name(&self) -> &'static str {
        "Reddit"
    }
}

struct RedditStream {
    client: reqwest::Client,
    token: String,
    listing_url: String,
    subreddit: String,
    fetch_interval: Duration,
    seen: SeenIds,
    buffer: VecDeque<Event>,
    fetched: bool,
}

impl RedditStream {
    async fn fetch_page(&self) -> Result<Vec<Event>, StreamError> {
        let t0 = Instant::now();
        let resp = self
            .client
            .get(&self.listing_url)
            .bearer_auth(&self.token)
            .query(&[("limit", PAGE_LIMIT.to_string()), ("raw_json", "1".to_string())])
            .send()
            .await
            .map_err(|e| StreamError::Transport(format!("reddit listing request: {e}")))?;

        let status = resp.status();
        if matches!(status, StatusCode::NOT_FOUND | StatusCode::FORBIDDEN) {
            return Err(StreamError::Config(format!(
                "subreddit r/{} is not accessible ({status})",
                self.subreddit
            )));
        }
        if !status.is_success() {
            return Err(StreamError::Transport(format!("reddit listing returned {status}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| StreamError::Transport(format!("reddit listing body: {e}")))?;
        let events = parse_listing(&body)?;

        histogram!("reddit_listing_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("reddit_comments_fetched_total").increment(events.len() as u64);
        Ok(events)
    }

    fn admit(&mut self, events: Vec<Event>) {
        for ev in events {
            if self.seen.insert(&ev.id) {
                self.buffer.push_back(ev);
            }
        }
    }
}

#[async_trait]
impl CommentStream for RedditStream {
    async fn next_event(&mut self) -> Option<Result<Event, StreamError>> {
        loop {
            if let Some(ev) = self.buffer.pop_front() {
                return Some(Ok(ev));
            }
            if self.fetched {
                tokio::time::sleep(self.fetch_interval).await;
            }
            match self.fetch_page().await {
                Ok(events) => {
                    self.fetched = true;
                    self.admit(events);
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
