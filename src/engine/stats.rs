//! Per-window metrics, finalized once when the window ends.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::mode::{StopReason, WindowMode};
use crate::fills::{FillModel, PerModel};
use crate::market::Window;
use crate::trading::{Ledger, Position};

/// Results for one fill model over one window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// First-leg fills (0 or 1 per window).
    pub first_leg_fills: u32,
    /// Completed pairs (0 or 1 per window).
    pub completed_pairs: u32,
    /// Locked edge per completed pair.
    pub edge_nets: Vec<Decimal>,
    /// Final position, for the settlement collaborator.
    pub position: Position,
    /// Unmatched shares at close.
    pub unhedged_qty: Decimal,
    /// Worst-case loss on the unmatched shares.
    pub max_loss: Decimal,
}

/// Counters, timings and outcomes for one window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowMetrics {
    /// Window slug.
    pub slug: String,
    /// Open (Unix seconds).
    pub start_ts: i64,
    /// Close (Unix seconds).
    pub end_ts: i64,

    // Pre-filter
    /// First tick was close enough to 50/50.
    pub passed_prefilter: bool,
    /// `|mid_up - 0.5| + |mid_down - 0.5|` on the first tick.
    pub price_distance: Decimal,
    /// Up mid on the first tick.
    pub mid_up_at_start: Decimal,

    // Volatility
    /// Range of the Up mid over the window.
    pub volatility_proxy: Decimal,
    #[serde(skip)]
    pub(crate) mid_range: Option<(Decimal, Decimal)>,

    // Quote lifecycle
    /// Bids posted.
    pub quotes_posted: u32,
    /// Cancels issued.
    pub cancels: u32,
    /// Cancel-and-repost cycles.
    pub replaces: u32,
    /// Cancel requests refused by lifecycle rules.
    pub cancel_refusals: u32,
    /// Lifetimes of cancelled bids.
    pub quote_lifetimes_ms: Vec<i64>,

    /// Per-model results.
    pub models: PerModel<ModelMetrics>,

    // Timing
    /// Window's first fill (any model).
    pub first_fill_ts_ms: Option<i64>,
    /// Window's first completed pair (any model).
    pub completion_ts_ms: Option<i64>,
    /// First fill to first completed pair.
    pub time_to_complete_ms: Option<i64>,
    /// Time the tracking model held an unmatched leg.
    pub time_unhedged_ms: i64,
    /// Largest worst-case loss the tracking model carried.
    pub max_unhedged_exposure: Decimal,

    // Outcome
    /// Mode at close.
    pub mode: WindowMode,
    /// Rescue mode was entered.
    pub rescue_triggered: bool,
    /// Why the window stopped, if it did.
    pub stop_reason: Option<StopReason>,
    /// Ticks processed.
    pub ticks_seen: u64,
    /// Ticks skipped as unusable.
    pub ticks_skipped: u64,
}

impl WindowMetrics {
    /// Empty metrics for a window.
    pub fn new(window: &Window) -> Self {
        Self {
            slug: window.slug.clone(),
            start_ts: window.start_ts,
            end_ts: window.end_ts,
            ..Self::default()
        }
    }

    /// Track the Up mid for the volatility proxy.
    pub fn observe_mid(&mut self, mid: Decimal) {
        self.mid_range = Some(match self.mid_range {
            Some((lo, hi)) => (lo.min(mid), hi.max(mid)),
            None => (mid, mid),
        });
    }

    /// Mean lifetime of cancelled bids.
    pub fn avg_quote_lifetime_ms(&self) -> Option<Decimal> {
        if self.quote_lifetimes_ms.is_empty() {
            return None;
        }
        let total: i64 = self.quote_lifetimes_ms.iter().sum();
        Some(Decimal::from(total) / Decimal::from(self.quote_lifetimes_ms.len()))
    }

    /// Per-model results.
    pub fn model(&self, model: FillModel) -> &ModelMetrics {
        self.models.get(model)
    }

    /// Mutable per-model results.
    pub fn model_mut(&mut self, model: FillModel) -> &mut ModelMetrics {
        self.models.get_mut(model)
    }

    /// Close out: volatility, final mode and exposure per model.
    pub fn finalize(&mut self, mode: WindowMode, stop_reason: Option<StopReason>, ledger: &Ledger) {
        if let Some((lo, hi)) = self.mid_range {
            self.volatility_proxy = hi - lo;
        }
        self.mode = mode;
        self.stop_reason = stop_reason;

        for (model, entry) in ledger.iter() {
            let m = self.models.get_mut(model);
            m.position = entry.position.clone();
            m.unhedged_qty = entry.position.unhedged_qty();
            m.max_loss = entry.position.max_loss();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fills::Fill;
    use crate::market::Outcome;
    use rust_decimal_macros::dec;

    #[test]
    fn volatility_is_mid_range() {
        let mut m = WindowMetrics::new(&Window::new("w", 0, 900));
        for mid in [dec!(0.50), dec!(0.47), dec!(0.55), dec!(0.52)] {
            m.observe_mid(mid);
        }
        m.finalize(WindowMode::Normal, None, &Ledger::new());
        assert_eq!(m.volatility_proxy, dec!(0.08));
    }

    #[test]
    fn average_lifetime() {
        let mut m = WindowMetrics::default();
        assert_eq!(m.avg_quote_lifetime_ms(), None);
        m.quote_lifetimes_ms = vec![2_000, 3_000];
        assert_eq!(m.avg_quote_lifetime_ms(), Some(dec!(2500)));
    }

    #[test]
    fn finalize_records_exposure() {
        let mut ledger = Ledger::new();
        ledger.apply(&Fill {
            model: FillModel::Persistent,
            order_id: 1,
            outcome: Outcome::Up,
            price: dec!(0.45),
            qty: dec!(5),
            ts_ms: 1,
        });

        let mut m = WindowMetrics::default();
        m.finalize(WindowMode::Stopped, Some(StopReason::ForceStop), &ledger);

        assert_eq!(m.model(FillModel::Persistent).unhedged_qty, dec!(5));
        assert_eq!(m.model(FillModel::Persistent).max_loss, dec!(2.25));
        assert_eq!(m.model(FillModel::Optimistic).max_loss, dec!(0));
        assert_eq!(m.stop_reason, Some(StopReason::ForceStop));
    }
}
