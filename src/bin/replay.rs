//! Offline replay: feed a JSON-lines comment fixture through the engine and
//! print the resulting stats.
//!
//! Usage: `cargo run --bin replay -- [fixtures/comments.jsonl]`

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reddit_sentiment_live::ingest::providers::FixtureSource;
use reddit_sentiment_live::rolling::RollingStats;
use reddit_sentiment_live::sentiment::Polarity;
use reddit_sentiment_live::{telemetry, EngineConfig, IngestionController, LexiconScorer};

const DEFAULT_FIXTURE: &str = "fixtures/comments.jsonl";
const MAX_WAIT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_FIXTURE.to_string());
    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading fixture {path}"))?;
    let source = FixtureSource::from_jsonl(&raw)?;
    let expected = source.event_count() as u64;

    let mut config = EngineConfig::load_default()?;
    config.per_session_limit = expected.max(1);

    let controller = IngestionController::new(
        config.clone(),
        Arc::new(source),
        Arc::new(LexiconScorer::new()),
    );
    controller.start().await;

    let store = controller.store();
    let poll = Duration::from_millis(config.poll_interval_ms.clamp(10, 250));
    let waited = tokio::time::timeout(MAX_WAIT, async {
        loop {
            let c = store.counters();
            if c.total_processed + c.scoring_errors >= expected {
                break;
            }
            tokio::time::sleep(poll).await;
        }
    })
    .await;
    if waited.is_err() {
        tracing::warn!("replay did not drain within {}s", MAX_WAIT.as_secs());
    }
    let outcome = controller.shutdown().await;

    let snap = store.snapshot();
    let stats = RollingStats::from_snapshot(&snap, config.moving_average_window);
    println!("fixture:           {path}");
    println!("comments analyzed: {}", snap.total_processed);
    match stats.mean {
        Some(avg) => println!("avg sentiment:     {avg:.3}"),
        None => println!("avg sentiment:     no data yet"),
    }
    if let Some(latest) = stats.latest_average() {
        println!("{}-comment average: {latest:.3}", stats.window);
    }
    println!("recent comments:");
    for r in &snap.recent {
        println!(
            "  ({:+.3} {:?}) {}",
            r.score,
            Polarity::from_score(r.score),
            r.text
        );
    }
    println!("outcome:           {outcome:?}");
    Ok(())
}
