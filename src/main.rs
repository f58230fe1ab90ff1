//! Live Reddit Sentiment Service — Binary Entrypoint
//! Boots the ingestion loop and the Axum query/control API, and joins the loop
//! on shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use reddit_sentiment_live::api::{self, AppState};
use reddit_sentiment_live::ingest::providers::RedditSource;
use reddit_sentiment_live::metrics::Metrics;
use reddit_sentiment_live::{
    telemetry, EngineConfig, IngestionController, LexiconScorer, RedditCredentials,
};

struct SentimentService {
    controller: Arc<IngestionController>,
    metrics: Option<Metrics>,
}

#[async_trait::async_trait]
impl shuttle_runtime::Service for SentimentService {
    async fn bind(self, addr: SocketAddr) -> Result<(), shuttle_runtime::Error> {
        let status = self.controller.start().await;
        info!(?status, "ingestion loop launched");

        let mut app = api::router(AppState::new(self.controller.clone()));
        if let Some(m) = &self.metrics {
            app = app.merge(m.router());
        }

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "serving sentiment API");
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        match self.controller.shutdown().await {
            Some(Ok(outcome)) => info!(?outcome, "ingestion loop joined"),
            Some(Err(e)) => warn!(error = %e, "ingestion loop ended with error"),
            None => info!("ingestion loop was not running"),
        }

        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[shuttle_runtime::main]
async fn sentiment_service() -> Result<SentimentService, shuttle_runtime::Error> {
    // Load .env in local/dev; no-op when the variables come from the platform.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    // Configuration problems are fatal here: the loop never starts.
    let config = EngineConfig::load_default().context("loading engine config")?;
    let creds = RedditCredentials::from_env().context("reading reddit credentials")?;
    info!(
        subreddit = %config.subreddit,
        limit = config.per_session_limit,
        history = config.history_capacity,
        "engine config loaded"
    );

    let metrics = match Metrics::install() {
        Ok(m) => Some(m),
        Err(e) => {
            warn!(error = ?e, "metrics disabled");
            None
        }
    };

    let source = RedditSource::new(creds, config.fetch_interval())?;
    let controller = IngestionController::new(
        config,
        Arc::new(source),
        Arc::new(LexiconScorer::new()),
    );

    Ok(SentimentService {
        controller: Arc::new(controller),
        metrics,
    })
}
