//! Tracing setup shared by the service and the replay binary.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "reddit_sentiment_live=info,ingest=info,warn";

/// Install a global subscriber: `RUST_LOG` filter (falls back to
/// `DEFAULT_LOG_FILTER`), compact output or JSON with `LOG_FORMAT=json`.
///
/// A no-op when the host runtime already installed a subscriber.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed; keeping it");
    }
}
