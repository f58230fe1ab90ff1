//! HTTP surface for pollers and controllers.
//!
//! Query side (`/snapshot`, `/stats`) only reads the store; command side
//! (`/control/*`) only touches the controller. Neither can fail: an empty
//! store renders as empty sequences and a zero count.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::ingest::controller::{ControlStatus, IngestionController};
use crate::ingest::LoopState;
use crate::rolling::RollingStats;
use crate::sentiment::Polarity;
use crate::store::Snapshot;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<IngestionController>,
}

impl AppState {
    pub fn new(controller: Arc<IngestionController>) -> Self {
        Self { controller }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/snapshot", get(snapshot))
        .route("/stats", get(stats))
        .route("/control", get(control_status))
        .route("/control/start", post(control_start))
        .route("/control/stop", post(control_stop))
        .route("/control/toggle", post(control_toggle))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Deserialize)]
struct SnapshotQuery {
    /// Cap on recent comments returned (never more than the log holds).
    recent: Option<usize>,
}

async fn snapshot(
    State(state): State<AppState>,
    Query(q): Query<SnapshotQuery>,
) -> Json<Snapshot> {
    let mut snap = state.controller.store().snapshot();
    if let Some(n) = q.recent {
        snap.recent.truncate(n);
    }
    Json(snap)
}

#[derive(Serialize)]
struct RecentOut {
    text: String,
    score: f64,
    polarity: Polarity,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct StatsOut {
    total_processed: u64,
    scoring_errors: u64,
    reconnects: u64,
    /// `null` until the first comment is scored.
    average: Option<f64>,
    latest_average: Option<f64>,
    moving_average_window: usize,
    history: Vec<f64>,
    moving_average: Vec<f64>,
    recent: Vec<RecentOut>,
    state: LoopState,
    stop_requested: bool,
    poll_interval_ms: u64,
}

async fn stats(State(state): State<AppState>) -> Json<StatsOut> {
    let ctl = &state.controller;
    let store = ctl.store();
    let snap = store.snapshot();
    let counters = store.counters();
    let rolling = RollingStats::from_snapshot(&snap, ctl.config().moving_average_window);

    let recent = snap
        .recent
        .into_iter()
        .map(|r| RecentOut {
            polarity: Polarity::from_score(r.score),
            text: r.text,
            score: r.score,
            timestamp: r.timestamp,
        })
        .collect();

    Json(StatsOut {
        // Counters are read after the snapshot; the snapshot's count is the
        // one consistent with `history`.
        total_processed: snap.total_processed,
        scoring_errors: counters.scoring_errors,
        reconnects: counters.reconnects,
        average: rolling.mean,
        latest_average: rolling.latest_average(),
        moving_average_window: rolling.window,
        history: snap.history,
        moving_average: rolling.moving_average,
        recent,
        state: ctl.state(),
        stop_requested: ctl.control().is_stop_requested(),
        poll_interval_ms: ctl.config().poll_interval_ms,
    })
}

async fn control_status(State(state): State<AppState>) -> Json<ControlStatus> {
    Json(state.controller.status().await)
}

async fn control_start(State(state): State<AppState>) -> Json<ControlStatus> {
    Json(state.controller.start().await)
}

async fn control_stop(State(state): State<AppState>) -> Json<ControlStatus> {
    Json(state.controller.stop().await)
}

async fn control_toggle(State(state): State<AppState>) -> Json<ControlStatus> {
    Json(state.controller.toggle().await)
}
