//! Resting bids posted by the engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::fills::{FillModel, PerModel};
use crate::market::Outcome;

/// Why a bid is resting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
pub enum QuotePurpose {
    /// Two-sided quote before any first leg.
    #[strum(serialize = "initial")]
    Initial,
    /// Opposite-side quote that completes a pair.
    #[strum(serialize = "completion")]
    Completion,
}

/// A bid resting on one outcome.
///
/// Never repriced in place: a replace cancels this order and posts a fresh one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestingOrder {
    /// Per-window order id.
    pub id: u64,
    /// Outcome being bought.
    pub outcome: Outcome,
    /// Limit price.
    pub price: Decimal,
    /// Order size in shares.
    pub size: Decimal,
    /// Post time (Unix ms).
    pub posted_ts_ms: i64,
    /// Depth at the best ask when posted, for depletion checks.
    pub initial_book_size: Decimal,
    /// Initial or completion quote.
    pub purpose: QuotePurpose,
    /// Cancel time, once cancelled.
    pub cancelled_ts_ms: Option<i64>,
    cross_tick_count: u32,
    filled: PerModel<Option<Decimal>>,
}

impl RestingOrder {
    /// Create a live order.
    pub fn new(
        id: u64,
        outcome: Outcome,
        price: Decimal,
        size: Decimal,
        posted_ts_ms: i64,
        initial_book_size: Decimal,
        purpose: QuotePurpose,
    ) -> Self {
        Self {
            id,
            outcome,
            price,
            size,
            posted_ts_ms,
            initial_book_size,
            purpose,
            cancelled_ts_ms: None,
            cross_tick_count: 0,
            filled: PerModel::default(),
        }
    }

    /// Consecutive ticks the ask has been at or through our price.
    pub fn cross_tick_count(&self) -> u32 {
        self.cross_tick_count
    }

    /// Advance or reset the crossing streak.
    pub fn record_cross(&mut self, crossed: bool) {
        if crossed {
            self.cross_tick_count = self.cross_tick_count.saturating_add(1);
        } else {
            self.cross_tick_count = 0;
        }
    }

    /// Whether `model` has already filled this order (or inherited a fill).
    pub fn is_filled(&self, model: FillModel) -> bool {
        self.filled.get(model).is_some()
    }

    /// Quantity `model` filled on this order.
    pub fn filled_qty(&self, model: FillModel) -> Option<Decimal> {
        *self.filled.get(model)
    }

    /// Record a fill for `model`.
    pub fn mark_filled(&mut self, model: FillModel, qty: Decimal) {
        *self.filled.get_mut(model) = Some(qty);
    }

    /// Block `model` from filling this order because it already holds this side.
    pub fn inherit_fill(&mut self, model: FillModel) {
        let slot = self.filled.get_mut(model);
        if slot.is_none() {
            *slot = Some(Decimal::ZERO);
        }
    }

    /// True once every model has filled or been blocked.
    pub fn fully_filled(&self) -> bool {
        FillModel::ALL.into_iter().all(|m| self.is_filled(m))
    }

    /// Mark cancelled at `ts_ms`. Resets the crossing streak so history cannot fill it.
    pub fn mark_cancelled(&mut self, ts_ms: i64) {
        self.cancelled_ts_ms = Some(ts_ms);
        self.cross_tick_count = 0;
    }

    /// Whether the order has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled_ts_ms.is_some()
    }

    /// Live and still fillable by at least one model.
    pub fn is_active(&self) -> bool {
        !self.is_cancelled() && !self.fully_filled()
    }

    /// Age at `now_ms`.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.posted_ts_ms
    }

    /// Time on the book, once cancelled.
    pub fn lifetime_ms(&self) -> Option<i64> {
        self.cancelled_ts_ms.map(|ts| ts - self.posted_ts_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order() -> RestingOrder {
        RestingOrder::new(7, Outcome::Down, dec!(0.45), dec!(5), 1_000, dec!(50), QuotePurpose::Initial)
    }

    #[test]
    fn crossing_streak_resets() {
        let mut o = order();
        o.record_cross(true);
        o.record_cross(true);
        assert_eq!(o.cross_tick_count(), 2);
        o.record_cross(false);
        assert_eq!(o.cross_tick_count(), 0);
    }

    #[test]
    fn cancel_clears_streak_and_records_lifetime() {
        let mut o = order();
        o.record_cross(true);
        o.mark_cancelled(3_500);

        assert!(o.is_cancelled());
        assert!(!o.is_active());
        assert_eq!(o.cross_tick_count(), 0);
        assert_eq!(o.lifetime_ms(), Some(2_500));
    }

    #[test]
    fn inherited_fill_does_not_overwrite_real_fill() {
        let mut o = order();
        o.mark_filled(FillModel::Optimistic, dec!(5));
        o.inherit_fill(FillModel::Optimistic);
        o.inherit_fill(FillModel::Persistent);

        assert_eq!(o.filled_qty(FillModel::Optimistic), Some(dec!(5)));
        assert_eq!(o.filled_qty(FillModel::Persistent), Some(dec!(0)));
        assert!(o.is_active());

        o.inherit_fill(FillModel::QueueAware);
        assert!(o.fully_filled());
        assert!(!o.is_active());
    }

    #[test]
    fn purpose_displays_lowercase() {
        assert_eq!(QuotePurpose::Completion.to_string(), "completion");
    }
}
