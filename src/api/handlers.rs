//! HTTP API handlers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use dashmap::DashMap;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::engine::WindowMode;
use crate::runner::RunSummary;

/// Live view of one market task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MarketStatus {
    /// Market name.
    pub market: String,
    /// Slug of the open window.
    pub slug: Option<String>,
    /// Mode of the open window.
    pub mode: Option<WindowMode>,
    /// Ticks processed in the open window.
    pub ticks_seen: u64,
    /// Windows finalized so far.
    pub windows_finished: u64,
    /// A window is open.
    pub active: bool,
}

/// Application state shared with handlers. Written only by the supervisor.
#[derive(Clone, Default)]
pub struct AppState {
    markets: Arc<DashMap<String, MarketStatus>>,
    summary: Arc<RwLock<Option<RunSummary>>>,
    first_leg_fills: Arc<AtomicU64>,
    events: Arc<AtomicU64>,
    prometheus: Option<PrometheusHandle>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("markets", &self.markets.len())
            .field("first_leg_fills", &self.first_leg_fills())
            .field("prometheus", &self.prometheus.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new app state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve the given Prometheus registry at `/metrics`.
    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Add a market with no open window.
    pub fn register_market(&self, market: &str) {
        self.markets.entry(market.to_string()).or_insert_with(|| MarketStatus {
            market: market.to_string(),
            ..MarketStatus::default()
        });
    }

    /// A window opened.
    pub fn open_window(&self, market: &str, slug: &str) {
        let mut status = self.entry(market);
        status.slug = Some(slug.to_string());
        status.mode = Some(WindowMode::Normal);
        status.ticks_seen = 0;
        status.active = true;
    }

    /// A tick was processed.
    pub fn record_tick(&self, market: &str, slug: &str, mode: WindowMode, ticks_seen: u64) {
        let mut status = self.entry(market);
        status.slug = Some(slug.to_string());
        status.mode = Some(mode);
        status.ticks_seen = ticks_seen;
        status.active = true;
    }

    /// The open window was finalized.
    pub fn finish_window(&self, market: &str) {
        let mut status = self.entry(market);
        status.windows_finished += 1;
        status.active = false;
    }

    /// The market task exited.
    pub fn finish_market(&self, market: &str) {
        let mut status = self.entry(market);
        status.active = false;
        status.mode = None;
    }

    /// Count one engine event.
    pub fn record_event(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    /// Update the run-wide first-leg fill count.
    pub fn set_first_leg_fills(&self, count: u64) {
        self.first_leg_fills.store(count, Ordering::Relaxed);
    }

    /// Run-wide first-leg fills of the tracking model.
    pub fn first_leg_fills(&self) -> u64 {
        self.first_leg_fills.load(Ordering::Relaxed)
    }

    /// Engine events seen.
    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    /// Replace the current run summary.
    pub async fn set_summary(&self, summary: RunSummary) {
        *self.summary.write().await = Some(summary);
    }

    /// Current run summary.
    pub async fn summary(&self) -> Option<RunSummary> {
        self.summary.read().await.clone()
    }

    /// Market statuses, sorted by name.
    pub fn markets(&self) -> Vec<MarketStatus> {
        let mut markets: Vec<MarketStatus> = self.markets.iter().map(|e| e.value().clone()).collect();
        markets.sort_by(|a, b| a.market.cmp(&b.market));
        markets
    }

    /// Some market has an open window.
    pub fn is_ready(&self) -> bool {
        self.markets.iter().any(|e| e.value().active)
    }

    fn entry(&self, market: &str) -> dashmap::mapref::one::RefMut<'_, String, MarketStatus> {
        self.markets
            .entry(market.to_string())
            .or_insert_with(|| MarketStatus {
                market: market.to_string(),
                ..MarketStatus::default()
            })
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether a window is open.
    pub ready: bool,
    /// Slugs of open windows.
    pub windows: Vec<String>,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// Per-market state.
    pub markets: Vec<MarketStatus>,
    /// Tracking-model first-leg fills across the run.
    pub first_leg_fills: u64,
    /// Engine events seen.
    pub events: u64,
    /// Summary of finished windows.
    pub summary: Option<RunSummary>,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 while a window is open, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let windows: Vec<String> = state
        .markets()
        .into_iter()
        .filter(|m| m.active)
        .filter_map(|m| m.slug)
        .collect();
    let is_ready = state.is_ready();

    let response = ReadyResponse {
        ready: is_ready,
        windows,
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - per-market state, counters and the running summary.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.is_ready() { "running" } else { "idle" };

    Json(StatusResponse {
        status,
        markets: state.markets(),
        first_leg_fills: state.first_leg_fills(),
        events: state.events(),
        summary: state.summary().await,
    })
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain; charset=utf-8")],
            "metrics recorder not installed".to_string(),
        ),
    }
}
