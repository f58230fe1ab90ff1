// tests/ingest_loop.rs
//
// End-to-end behaviour of the ingestion loop against scripted streams:
// limits, item-level failures, reconnect/backoff timing, cancellation and
// connection release. Backoff tests run on tokio's paused clock.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use reddit_sentiment_live::ingest::providers::{FixtureSession, FixtureSource, FixtureStep};
use reddit_sentiment_live::ingest::types::{Event, StreamError};
use reddit_sentiment_live::{
    AggregateStore, ControlSignal, EngineConfig, IngestError, IngestionLoop, LoopState,
    RunOutcome, SentimentScorer,
};
use tokio::sync::watch;

/// Reads the score straight from the text; "boom" fails.
struct EchoScorer;

impl SentimentScorer for EchoScorer {
    fn score(&self, text: &str) -> anyhow::Result<f64> {
        if text == "boom" {
            return Err(anyhow!("scorer exploded"));
        }
        text.parse::<f64>().map_err(|e| anyhow!("not a score: {e}"))
    }
}

fn ev(i: usize, text: &str) -> Event {
    Event {
        id: format!("c{i}"),
        source: "test".into(),
        created_utc: 1_700_000_000 + i as i64,
        text: text.into(),
    }
}

fn events(texts: &[&str]) -> Vec<FixtureStep> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| FixtureStep::Event(ev(i, t)))
        .collect()
}

fn test_config() -> EngineConfig {
    EngineConfig {
        subreddit: "test".into(),
        per_session_limit: 100,
        reconnect_delay_ms: 5_000,
        max_reconnect_delay_ms: 60_000,
        max_reconnect_attempts: 3,
        receive_timeout_ms: 3_600_000,
        ..EngineConfig::default()
    }
}

struct Harness {
    source: Arc<FixtureSource>,
    store: Arc<AggregateStore>,
    control: Arc<ControlSignal>,
    run: IngestionLoop,
}

fn harness(sessions: Vec<FixtureSession>, config: EngineConfig) -> Harness {
    let source = Arc::new(FixtureSource::scripted(sessions));
    let store = Arc::new(AggregateStore::new(
        config.history_capacity,
        config.recent_log_capacity,
    ));
    let control = Arc::new(ControlSignal::new());
    let run = IngestionLoop::new(
        config,
        source.clone(),
        Arc::new(EchoScorer),
        store.clone(),
        control.clone(),
    );
    Harness {
        source,
        store,
        control,
        run,
    }
}

/// Collect every observed state until the loop drops its sender.
fn record_states(mut rx: watch::Receiver<LoopState>) -> tokio::task::JoinHandle<Vec<LoopState>> {
    tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            seen.push(*rx.borrow_and_update());
        }
        seen
    })
}

async fn wait_for_processed(store: &AggregateStore, n: u64) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while store.counters().total_processed < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("loop should process items");
}

#[tokio::test(start_paused = true)]
async fn limit_reached_stops_without_pulling_more() {
    let mut steps = events(&["0.5", "-0.2", "0.1", "0.9"]);
    // Pulling past the limit would hit this failure and reconnect.
    steps.push(FixtureStep::Fail("should never be read".into()));
    let config = EngineConfig {
        history_capacity: 3,
        per_session_limit: 4,
        ..test_config()
    };
    let h = harness(vec![FixtureSession::Steps(steps)], config);
    let states = record_states(h.run.subscribe_state());

    let outcome = h.run.run().await;

    assert_eq!(outcome, Ok(RunOutcome::LimitReached { processed: 4 }));
    let snap = h.store.snapshot();
    assert_eq!(snap.history, vec![-0.2, 0.1, 0.9]);
    assert_eq!(snap.total_processed, 4);
    assert_eq!(snap.recent[0].score, 0.9);
    assert_eq!(h.source.connect_count(), 1);
    assert_eq!(h.source.open_streams(), 0, "connection must be released");

    let states = states.await.unwrap();
    assert_eq!(states.last(), Some(&LoopState::Stopped));
    assert!(!states.contains(&LoopState::Reconnecting));
}

#[tokio::test(start_paused = true)]
async fn scoring_failures_are_skipped_and_counted() {
    let config = EngineConfig {
        per_session_limit: 2,
        ..test_config()
    };
    let h = harness(
        vec![FixtureSession::Steps(events(&["0.1", "boom", "7.5", "0.2"]))],
        config,
    );

    let outcome = h.run.run().await;

    assert_eq!(outcome, Ok(RunOutcome::LimitReached { processed: 2 }));
    let snap = h.store.snapshot();
    assert_eq!(snap.history, vec![0.1, 0.2]);
    assert_eq!(snap.total_processed, 2);
    assert_eq!(h.store.counters().scoring_errors, 2);
    assert_eq!(h.source.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn stream_failure_reconnects_only_after_delay() {
    let mut first = events(&["0.1"]);
    first.push(FixtureStep::Fail("connection reset".into()));
    let config = EngineConfig {
        per_session_limit: 3,
        ..test_config()
    };
    let h = harness(
        vec![
            FixtureSession::Steps(first),
            FixtureSession::Steps(events(&["0.2", "0.3"])),
        ],
        config,
    );
    let states = record_states(h.run.subscribe_state());

    let outcome = h.run.run().await;

    assert_eq!(outcome, Ok(RunOutcome::LimitReached { processed: 3 }));
    assert_eq!(h.store.snapshot().history, vec![0.1, 0.2, 0.3]);
    assert_eq!(h.store.counters().reconnects, 1);

    let times = h.source.connect_times();
    assert_eq!(times.len(), 2);
    assert!(
        times[1] - times[0] >= Duration::from_millis(5_000),
        "reconnected too early: {:?}",
        times[1] - times[0]
    );
    assert_eq!(h.source.open_streams(), 0);

    // The watch channel coalesces, but the backoff wait is long enough to be seen.
    let states = states.await.unwrap();
    assert!(states.contains(&LoopState::Reconnecting), "states: {states:?}");
    assert_eq!(states.last(), Some(&LoopState::Stopped));
}

#[tokio::test(start_paused = true)]
async fn closed_stream_is_treated_as_failure() {
    let mut first = events(&["0.4"]);
    first.push(FixtureStep::Close);
    let config = EngineConfig {
        per_session_limit: 2,
        ..test_config()
    };
    let h = harness(
        vec![
            FixtureSession::Steps(first),
            FixtureSession::Steps(events(&["-0.4"])),
        ],
        config,
    );

    let outcome = h.run.run().await;

    assert_eq!(outcome, Ok(RunOutcome::LimitReached { processed: 2 }));
    assert_eq!(h.source.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn stalled_stream_times_out_and_reconnects() {
    let config = EngineConfig {
        per_session_limit: 1,
        receive_timeout_ms: 1_000,
        ..test_config()
    };
    let h = harness(
        vec![
            FixtureSession::Steps(vec![]), // idle forever
            FixtureSession::Steps(events(&["0.7"])),
        ],
        config,
    );

    let outcome = h.run.run().await;

    assert_eq!(outcome, Ok(RunOutcome::LimitReached { processed: 1 }));
    let times = h.source.connect_times();
    assert_eq!(times.len(), 2);
    assert!(times[1] - times[0] >= Duration::from_millis(6_000));
}

#[tokio::test]
async fn stop_request_interrupts_idle_stream() {
    let h = harness(vec![FixtureSession::Steps(events(&["0.4"]))], test_config());
    let store = h.store.clone();
    let control = h.control.clone();
    let source = h.source.clone();
    let task = tokio::spawn(h.run.run());

    wait_for_processed(&store, 1).await;
    control.request_stop();

    let outcome = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("loop should stop promptly")
        .unwrap();
    assert_eq!(outcome, Ok(RunOutcome::StopRequested { processed: 1 }));
    assert_eq!(source.open_streams(), 0, "connection must be released on stop");
    assert_eq!(source.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_during_backoff_ends_without_reconnecting() {
    let config = EngineConfig {
        reconnect_delay_ms: 60_000,
        ..test_config()
    };
    let h = harness(
        vec![FixtureSession::Refuse(StreamError::Transport(
            "dns failure".into(),
        ))],
        config,
    );
    let control = h.control.clone();
    let source = h.source.clone();
    let task = tokio::spawn(h.run.run());

    tokio::time::sleep(Duration::from_secs(1)).await;
    control.request_stop();

    let outcome = task.await.unwrap();
    assert_eq!(outcome, Ok(RunOutcome::StopRequested { processed: 0 }));
    assert_eq!(source.connect_count(), 1);
}

#[tokio::test]
async fn configuration_error_is_fatal_and_never_streams() {
    let h = harness(
        vec![FixtureSession::Refuse(StreamError::Config(
            "reddit rejected credentials".into(),
        ))],
        test_config(),
    );
    let states = record_states(h.run.subscribe_state());

    let outcome = h.run.run().await;

    assert!(matches!(outcome, Err(IngestError::Config(ref m)) if m.contains("credentials")));
    assert_eq!(h.source.connect_count(), 1);
    assert_eq!(h.store.counters().reconnects, 0);
    let states = states.await.unwrap();
    assert!(!states.contains(&LoopState::Streaming));
    assert_eq!(states.last(), Some(&LoopState::Stopped));
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_reconnect_attempts() {
    // Empty script: every connect fails with a transport error.
    let h = harness(vec![], test_config());

    let outcome = h.run.run().await;

    match outcome {
        Err(IngestError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    assert_eq!(h.source.connect_count(), 4);
    assert_eq!(h.store.counters().reconnects, 3);

    // 5s, 10s, 20s between the four attempts.
    let times = h.source.connect_times();
    assert!(times[3] - times[0] >= Duration::from_secs(35));
}

#[tokio::test(start_paused = true)]
async fn quiet_stream_keeps_reconnecting_past_the_attempt_budget() {
    // Default timings: 90s receive timeout, 10 reconnect attempts.
    let config = EngineConfig {
        subreddit: "test".into(),
        per_session_limit: 1,
        ..EngineConfig::default()
    };
    let mut sessions: Vec<_> = (0..20).map(|_| FixtureSession::Steps(vec![])).collect();
    sessions.push(FixtureSession::Steps(events(&["0.3"])));
    let h = harness(sessions, config);

    let outcome = h.run.run().await;

    assert_eq!(outcome, Ok(RunOutcome::LimitReached { processed: 1 }));
    assert_eq!(h.source.connect_count(), 21);
    assert_eq!(h.store.counters().reconnects, 20);
    // Each stall reconnects after the initial delay; it never escalates.
    let times = h.source.connect_times();
    for pair in times.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(
            gap >= Duration::from_secs(95) && gap < Duration::from_secs(100),
            "gap {gap:?}"
        );
    }
}

#[tokio::test]
async fn stop_before_run_never_connects() {
    let h = harness(vec![FixtureSession::Steps(events(&["0.1"]))], test_config());
    h.control.request_stop();

    let outcome = h.run.run().await;

    assert_eq!(outcome, Ok(RunOutcome::StopRequested { processed: 0 }));
    assert_eq!(h.source.connect_count(), 0);
    assert_eq!(h.store.snapshot().total_processed, 0);
}
