//! Completion controller: prices the opposite leg once a first leg fills.
//!
//! The cap `1 - floor(mode) - p_first` bounds every completion price. Prices
//! are computed, truncated, then clamped with `min(cap)`, so no path can post
//! above it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::mode::WindowMode;
use crate::config::EngineConfig;
use crate::trading::lifecycle::truncate_price;
use crate::trading::MIN_PRICE;

/// Whether completion is possible in NORMAL mode at the current opposite ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feasibility {
    /// The ask is within the normal cap.
    Feasible,
    /// The ask is above the normal cap but rescue fits the loss cap.
    Rescue {
        /// Normal-mode cap.
        normal_cap: Decimal,
        /// Loss if completed at the current ask.
        rescue_loss: Decimal,
    },
    /// The ask is above the normal cap and rescue would exceed the loss cap.
    Infeasible {
        /// Normal-mode cap.
        normal_cap: Decimal,
        /// Loss if completed at the current ask.
        rescue_loss: Decimal,
    },
}

/// Prices completion bids under the hard cap.
#[derive(Debug, Clone)]
pub struct CompletionController {
    edge_floor: Decimal,
    edge_floor_rescue: Decimal,
    loss_cap: Decimal,
    clip_size: Decimal,
    conservative_offset: Decimal,
    horizon_secs: Option<i64>,
}

impl CompletionController {
    /// Build from the engine config.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            edge_floor: config.edge_floor,
            edge_floor_rescue: config.edge_floor_rescue,
            loss_cap: config.loss_cap,
            clip_size: config.clip_size,
            conservative_offset: config.completion_conservative_offset,
            horizon_secs: config.aggressiveness_horizon_secs,
        }
    }

    /// Minimum locked edge for `mode`.
    pub fn edge_floor(&self, mode: WindowMode) -> Decimal {
        match mode {
            WindowMode::Rescue => self.edge_floor_rescue,
            WindowMode::Normal | WindowMode::Stopped => self.edge_floor,
        }
    }

    /// Highest price the engine may pay for the opposite leg.
    pub fn max_completion_price(&self, mode: WindowMode, p_first: Decimal) -> Decimal {
        Decimal::ONE - self.edge_floor(mode) - p_first
    }

    /// Loss locked in by completing at `opposite_ask`.
    pub fn rescue_loss(&self, p_first: Decimal, opposite_ask: Decimal) -> Decimal {
        (p_first + opposite_ask - Decimal::ONE).max(Decimal::ZERO) * self.clip_size
    }

    /// Check NORMAL-mode feasibility. Completion is infeasible only when the
    /// cap sits strictly below the opposite ask.
    pub fn assess(&self, p_first: Decimal, opposite_ask: Decimal) -> Feasibility {
        let normal_cap = self.max_completion_price(WindowMode::Normal, p_first);
        if normal_cap >= opposite_ask {
            return Feasibility::Feasible;
        }

        let rescue_loss = self.rescue_loss(p_first, opposite_ask);
        if rescue_loss <= self.loss_cap {
            Feasibility::Rescue {
                normal_cap,
                rescue_loss,
            }
        } else {
            Feasibility::Infeasible {
                normal_cap,
                rescue_loss,
            }
        }
    }

    /// Time pressure in `[0, 1]`: zero at the open, one at the close.
    pub fn aggressiveness(&self, seconds_remaining: Decimal, window_secs: i64) -> Decimal {
        let horizon = self.horizon_secs.unwrap_or(window_secs);
        if horizon <= 0 {
            return Decimal::ONE;
        }
        (Decimal::ONE - seconds_remaining / Decimal::from(horizon)).clamp(Decimal::ZERO, Decimal::ONE)
    }

    /// Completion bid: interpolate from `mid - offset` toward the cap as time runs out.
    ///
    /// `None` when the cap itself is below the minimum price.
    pub fn completion_price(
        &self,
        mode: WindowMode,
        p_first: Decimal,
        opposite_mid: Decimal,
        seconds_remaining: Decimal,
        window_secs: i64,
    ) -> Option<Decimal> {
        let cap = self.max_completion_price(mode, p_first);
        if cap < MIN_PRICE {
            return None;
        }

        let conservative = opposite_mid - self.conservative_offset;
        let aggressiveness = self.aggressiveness(seconds_remaining, window_secs);
        let desired = conservative + (cap - conservative) * aggressiveness;

        Some(truncate_price(desired).min(cap).max(MIN_PRICE))
    }
}
