//! Engine configuration loaded from environment variables.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::fills::{FillModel, FillParams};

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    // === Edge Constraints ===
    /// Minimum locked edge per pair in NORMAL mode (e.g., 0.005).
    #[serde(default = "default_edge_floor")]
    pub edge_floor: Decimal,

    /// Minimum locked edge in RESCUE mode. Zero accepts break-even.
    #[serde(default)]
    pub edge_floor_rescue: Decimal,

    /// Pre-fill target: initial bids satisfy `bid_up + bid_down <= 1 - target`.
    #[serde(default = "default_initial_edge_target")]
    pub initial_edge_target: Decimal,

    // === Risk Limits ===
    /// Maximum loss tolerated to complete a pair in RESCUE mode (USD).
    #[serde(default = "default_loss_cap")]
    pub loss_cap: Decimal,

    /// Shares per resting order.
    #[serde(default = "default_clip_size")]
    pub clip_size: Decimal,

    // === Quote Lifecycle ===
    /// Orders younger than this cannot be cancelled.
    #[serde(default = "default_min_quote_lifetime_ms")]
    pub min_quote_lifetime_ms: i64,

    /// Cancel budget per window.
    #[serde(default = "default_max_cancels")]
    pub max_cancels_per_window: u32,

    /// A replace must beat the resting price by more than this.
    #[serde(default = "default_min_price_improvement")]
    pub min_price_improvement: Decimal,

    /// Initial bids sit this far below mid.
    #[serde(default = "default_initial_quote_offset")]
    pub initial_quote_offset: Decimal,

    /// Conservative completion bid sits this far below mid.
    #[serde(default = "default_completion_offset")]
    pub completion_conservative_offset: Decimal,

    // === Fill Models ===
    /// Consecutive crossing ticks for a Persistent fill.
    #[serde(default = "default_persistent_ticks")]
    pub persistent_ticks: u32,

    /// Consecutive crossing ticks for a Queue-aware fill.
    #[serde(default = "default_queue_persist_ticks")]
    pub queue_persist_ticks: u32,

    /// Fraction of the posted book depth that must be consumed for a Queue-aware fill.
    #[serde(default = "default_queue_depletion_ratio")]
    pub queue_depletion_ratio: Decimal,

    /// Fraction of the order a Queue-aware fill takes.
    #[serde(default = "default_queue_fill_fraction")]
    pub queue_fill_fraction: Decimal,

    // === Window Timeline ===
    /// Skip windows whose first-tick price distance from 50/50 exceeds this.
    #[serde(default = "default_prefilter_distance")]
    pub prefilter_max_price_distance: Decimal,

    /// No new initial quotes at or below this many seconds remaining.
    #[serde(default = "default_stop_new_entries_secs")]
    pub stop_new_entries_secs: i64,

    /// Cancel everything and stop at or below this many seconds remaining.
    #[serde(default = "default_force_stop_secs")]
    pub force_stop_secs: i64,

    /// Horizon for completion aggressiveness. Unset uses the window's own duration.
    #[serde(default)]
    pub aggressiveness_horizon_secs: Option<i64>,

    /// Window length for the fixed-interval clock.
    #[serde(default = "default_window_duration_secs")]
    pub window_duration_secs: i64,

    /// Slug prefix for the fixed-interval clock.
    #[serde(default = "default_window_slug_prefix")]
    pub window_slug_prefix: String,

    // === Run Control ===
    /// Model used for unhedged-time metrics and the run stop counter.
    #[serde(default = "default_tracking_model")]
    pub tracking_model: FillModel,

    /// Stop the run after this many first-leg fills of the tracking model.
    #[serde(default = "default_target_first_leg_fills")]
    pub target_first_leg_fills: u64,

    /// Fewer first-leg fills than this makes the run verdict inconclusive.
    #[serde(default = "default_min_first_leg_fills")]
    pub min_first_leg_fills: u64,

    /// Wall-clock limit for the whole run in minutes (0 = unlimited).
    #[serde(default = "default_max_run_minutes")]
    pub max_run_minutes: u64,

    /// Tick cadence in milliseconds (0 = as fast as the source yields).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    // === Server Configuration ===
    /// HTTP server port for health/metrics endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_edge_floor() -> Decimal {
    Decimal::new(5, 3) // 0.005
}

fn default_initial_edge_target() -> Decimal {
    Decimal::new(15, 3) // 0.015
}

fn default_loss_cap() -> Decimal {
    Decimal::new(50, 2) // $0.50
}

fn default_clip_size() -> Decimal {
    Decimal::new(5, 0) // 5 shares
}

fn default_min_quote_lifetime_ms() -> i64 {
    2_000
}

fn default_max_cancels() -> u32 {
    20
}

fn default_min_price_improvement() -> Decimal {
    Decimal::new(2, 3) // 0.2 cents
}

fn default_initial_quote_offset() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_completion_offset() -> Decimal {
    Decimal::new(2, 2) // 0.02
}

fn default_persistent_ticks() -> u32 {
    3
}

fn default_queue_persist_ticks() -> u32 {
    5
}

fn default_queue_depletion_ratio() -> Decimal {
    Decimal::new(3, 1) // 30%
}

fn default_queue_fill_fraction() -> Decimal {
    Decimal::new(5, 1) // 50%
}

fn default_prefilter_distance() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

fn default_stop_new_entries_secs() -> i64 {
    120
}

fn default_force_stop_secs() -> i64 {
    30
}

fn default_window_duration_secs() -> i64 {
    900
}

fn default_window_slug_prefix() -> String {
    "btc-updown-15m".to_string()
}

fn default_tracking_model() -> FillModel {
    FillModel::QueueAware
}

fn default_target_first_leg_fills() -> u64 {
    200
}

fn default_min_first_leg_fills() -> u64 {
    100
}

fn default_max_run_minutes() -> u64 {
    600
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            edge_floor: default_edge_floor(),
            edge_floor_rescue: Decimal::ZERO,
            initial_edge_target: default_initial_edge_target(),
            loss_cap: default_loss_cap(),
            clip_size: default_clip_size(),
            min_quote_lifetime_ms: default_min_quote_lifetime_ms(),
            max_cancels_per_window: default_max_cancels(),
            min_price_improvement: default_min_price_improvement(),
            initial_quote_offset: default_initial_quote_offset(),
            completion_conservative_offset: default_completion_offset(),
            persistent_ticks: default_persistent_ticks(),
            queue_persist_ticks: default_queue_persist_ticks(),
            queue_depletion_ratio: default_queue_depletion_ratio(),
            queue_fill_fraction: default_queue_fill_fraction(),
            prefilter_max_price_distance: default_prefilter_distance(),
            stop_new_entries_secs: default_stop_new_entries_secs(),
            force_stop_secs: default_force_stop_secs(),
            aggressiveness_horizon_secs: None,
            window_duration_secs: default_window_duration_secs(),
            window_slug_prefix: default_window_slug_prefix(),
            tracking_model: default_tracking_model(),
            target_first_leg_fills: default_target_first_leg_fills(),
            min_first_leg_fills: default_min_first_leg_fills(),
            max_run_minutes: default_max_run_minutes(),
            poll_interval_ms: default_poll_interval_ms(),
            port: default_port(),
            rust_log: default_log_level(),
            verbose: false,
        }
    }
}

impl EngineConfig {
    /// Run time limit, if any.
    pub fn max_run_duration(&self) -> Option<Duration> {
        (self.max_run_minutes > 0).then(|| Duration::from_secs(self.max_run_minutes * 60))
    }

    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.edge_floor < Decimal::ZERO || self.edge_floor >= Decimal::ONE {
            return Err("EDGE_FLOOR must be in [0, 1)".to_string());
        }

        if self.edge_floor_rescue > self.edge_floor {
            return Err("EDGE_FLOOR_RESCUE must not exceed EDGE_FLOOR".to_string());
        }

        if self.loss_cap < Decimal::ZERO {
            return Err("LOSS_CAP must not be negative".to_string());
        }

        if self.clip_size <= Decimal::ZERO {
            return Err("CLIP_SIZE must be positive".to_string());
        }

        // A negative rescue floor locks in a loss per pair; it must fit the cap.
        if -self.edge_floor_rescue * self.clip_size > self.loss_cap {
            return Err("EDGE_FLOOR_RESCUE loss per clip exceeds LOSS_CAP".to_string());
        }

        if self.initial_edge_target < self.edge_floor {
            return Err("INITIAL_EDGE_TARGET must be at least EDGE_FLOOR".to_string());
        }

        if self.persistent_ticks == 0 {
            return Err("PERSISTENT_TICKS must be at least 1".to_string());
        }

        if self.queue_persist_ticks < self.persistent_ticks {
            return Err("QUEUE_PERSIST_TICKS must be at least PERSISTENT_TICKS".to_string());
        }

        if self.queue_fill_fraction <= Decimal::ZERO || self.queue_fill_fraction > Decimal::ONE {
            return Err("QUEUE_FILL_FRACTION must be in (0, 1]".to_string());
        }

        if self.queue_depletion_ratio < Decimal::ZERO || self.queue_depletion_ratio > Decimal::ONE {
            return Err("QUEUE_DEPLETION_RATIO must be in [0, 1]".to_string());
        }

        if self.force_stop_secs >= self.stop_new_entries_secs {
            return Err("FORCE_STOP_SECS must be less than STOP_NEW_ENTRIES_SECS".to_string());
        }

        if self.window_duration_secs <= 0 {
            return Err("WINDOW_DURATION_SECS must be positive".to_string());
        }

        if matches!(self.aggressiveness_horizon_secs, Some(h) if h <= 0) {
            return Err("AGGRESSIVENESS_HORIZON_SECS must be positive when set".to_string());
        }

        Ok(())
    }

    /// Fill-model thresholds.
    pub fn fill_params(&self) -> FillParams {
        FillParams {
            persistent_ticks: self.persistent_ticks,
            queue_persist_ticks: self.queue_persist_ticks,
            queue_depletion_ratio: self.queue_depletion_ratio,
            queue_fill_fraction: self.queue_fill_fraction,
        }
    }
}
