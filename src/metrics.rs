//! Prometheus metrics for the pair-capture engine.
//!
//! This module provides metrics for:
//! - Tick processing (latency, skipped ticks)
//! - Quote lifecycle (posts, cancels, refusals)
//! - Fills and completed pairs per fill model
//! - Mode transitions, window stops and invariant violations

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::engine::{StopReason, WindowMode};
use crate::fills::FillModel;
use crate::trading::QuotePurpose;

// === Metric Name Constants ===

/// Tick processing latency metric name.
pub const METRIC_TICK_LATENCY: &str = "paircap_tick_latency_ms";
/// Ticks processed counter metric name.
pub const METRIC_TICKS_PROCESSED: &str = "paircap_ticks_processed_total";
/// Ticks skipped counter metric name.
pub const METRIC_TICKS_SKIPPED: &str = "paircap_ticks_skipped_total";
/// Quotes posted counter metric name.
pub const METRIC_QUOTES_POSTED: &str = "paircap_quotes_posted_total";
/// Cancels counter metric name.
pub const METRIC_CANCELS: &str = "paircap_cancels_total";
/// Refused cancels counter metric name.
pub const METRIC_CANCEL_REFUSALS: &str = "paircap_cancel_refusals_total";
/// Fills counter metric name.
pub const METRIC_FILLS: &str = "paircap_fills_total";
/// First-leg fills counter metric name.
pub const METRIC_FIRST_LEG_FILLS: &str = "paircap_first_leg_fills_total";
/// Completed pairs counter metric name.
pub const METRIC_PAIRS_COMPLETED: &str = "paircap_pairs_completed_total";
/// Realized edge histogram metric name.
pub const METRIC_REALIZED_EDGE: &str = "paircap_realized_edge";
/// Mode transitions counter metric name.
pub const METRIC_MODE_TRANSITIONS: &str = "paircap_mode_transitions_total";
/// Window stops counter metric name.
pub const METRIC_WINDOW_STOPS: &str = "paircap_window_stops_total";
/// Windows finalized counter metric name.
pub const METRIC_WINDOWS_FINALIZED: &str = "paircap_windows_finalized_total";
/// Invariant violations counter metric name.
pub const METRIC_INVARIANT_VIOLATIONS: &str = "paircap_invariant_violations_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(METRIC_TICK_LATENCY, "Tick processing latency in milliseconds");
    describe_histogram!(
        METRIC_REALIZED_EDGE,
        "Locked edge per completed pair, by fill model"
    );

    describe_counter!(METRIC_TICKS_PROCESSED, "Total number of ticks processed");
    describe_counter!(
        METRIC_TICKS_SKIPPED,
        "Total number of ticks skipped as unusable"
    );
    describe_counter!(METRIC_QUOTES_POSTED, "Total number of bids posted");
    describe_counter!(METRIC_CANCELS, "Total number of bids cancelled");
    describe_counter!(
        METRIC_CANCEL_REFUSALS,
        "Total number of cancel requests refused by lifecycle rules"
    );
    describe_counter!(METRIC_FILLS, "Total number of fills, by fill model");
    describe_counter!(
        METRIC_FIRST_LEG_FILLS,
        "Total number of first-leg fills, by fill model"
    );
    describe_counter!(
        METRIC_PAIRS_COMPLETED,
        "Total number of completed pairs, by fill model"
    );
    describe_counter!(
        METRIC_MODE_TRANSITIONS,
        "Total number of window mode transitions, by target mode"
    );
    describe_counter!(METRIC_WINDOW_STOPS, "Total number of window stops, by reason");
    describe_counter!(METRIC_WINDOWS_FINALIZED, "Total number of windows finalized");
    describe_counter!(
        METRIC_INVARIANT_VIOLATIONS,
        "Total number of completion cap violations"
    );

    debug!("Metrics initialized");
}

/// Increment ticks processed counter.
pub fn inc_ticks_processed() {
    counter!(METRIC_TICKS_PROCESSED).increment(1);
}

/// Increment ticks skipped counter.
pub fn inc_ticks_skipped(reason: &'static str) {
    counter!(METRIC_TICKS_SKIPPED, "reason" => reason).increment(1);
}

/// Increment quotes posted counter.
pub fn inc_quotes_posted(purpose: QuotePurpose) {
    counter!(METRIC_QUOTES_POSTED, "purpose" => purpose.to_string()).increment(1);
}

/// Increment cancels counter.
pub fn inc_cancels() {
    counter!(METRIC_CANCELS).increment(1);
}

/// Increment refused cancels counter.
pub fn inc_cancel_refusals(reason: &'static str) {
    counter!(METRIC_CANCEL_REFUSALS, "reason" => reason).increment(1);
}

/// Increment fills counter.
pub fn inc_fills(model: FillModel) {
    counter!(METRIC_FILLS, "model" => model.to_string()).increment(1);
}

/// Increment first-leg fills counter.
pub fn inc_first_leg_fills(model: FillModel) {
    counter!(METRIC_FIRST_LEG_FILLS, "model" => model.to_string()).increment(1);
}

/// Record a completed pair and its locked edge.
pub fn record_pair_completed(model: FillModel, edge: Decimal) {
    counter!(METRIC_PAIRS_COMPLETED, "model" => model.to_string()).increment(1);
    histogram!(METRIC_REALIZED_EDGE, "model" => model.to_string())
        .record(edge.to_f64().unwrap_or_default());
}

/// Increment mode transitions counter.
pub fn inc_mode_transitions(to: WindowMode) {
    counter!(METRIC_MODE_TRANSITIONS, "to" => to.to_string()).increment(1);
}

/// Increment window stops counter.
pub fn inc_window_stops(reason: StopReason) {
    counter!(METRIC_WINDOW_STOPS, "reason" => reason.to_string()).increment(1);
}

/// Increment windows finalized counter.
pub fn inc_windows_finalized() {
    counter!(METRIC_WINDOWS_FINALIZED).increment(1);
}

/// Increment invariant violations counter.
pub fn inc_invariant_violations() {
    counter!(METRIC_INVARIANT_VIOLATIONS).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name).record(self.elapsed_ms());
    }
}

/// Create a latency timer for one tick.
pub fn timer_tick() -> LatencyTimer {
    LatencyTimer::new(METRIC_TICK_LATENCY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn latency_timer_measures_time() {
        let timer = timer_tick();
        sleep(Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 9.0);
    }

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        inc_fills(FillModel::QueueAware);
        inc_window_stops(StopReason::Prefilter);
        record_pair_completed(FillModel::Optimistic, Decimal::new(5, 3));
    }
}
