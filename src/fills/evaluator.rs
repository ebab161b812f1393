//! Decides whether a resting bid has filled under each realism model.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use super::{FillModel, FillParams};
use crate::market::{Outcome, Quote};
use crate::trading::RestingOrder;

/// A model judged an order (partly) filled on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// Model that fired.
    pub model: FillModel,
    /// Order that filled.
    pub order_id: u64,
    /// Side bought.
    pub outcome: Outcome,
    /// Fill price (the order's limit).
    pub price: Decimal,
    /// Quantity credited.
    pub qty: Decimal,
    /// Tick time.
    pub ts_ms: i64,
}

/// Fills produced by one order on one tick (at most one per model).
pub type FillEvents = SmallVec<[Fill; 3]>;

/// Evaluates resting orders against quotes under all fill models.
#[derive(Debug, Clone, Default)]
pub struct FillEvaluator {
    params: FillParams,
}

impl FillEvaluator {
    /// Create an evaluator with the given thresholds.
    pub fn new(params: FillParams) -> Self {
        Self { params }
    }

    /// Thresholds in use.
    pub fn params(&self) -> &FillParams {
        &self.params
    }

    /// Advance the order's crossing state with `quote` and return newly fired fills.
    ///
    /// Each model fires at most once per order. Cancelled orders never fire.
    pub fn evaluate(&self, order: &mut RestingOrder, quote: &Quote) -> FillEvents {
        let mut fills = FillEvents::new();
        if order.is_cancelled() {
            return fills;
        }

        let ask = quote.ask(order.outcome);
        let crossed = ask <= order.price;
        order.record_cross(crossed);
        let cross_ticks = order.cross_tick_count();

        for model in FillModel::ALL {
            if order.is_filled(model) {
                continue;
            }

            let qty = match model {
                FillModel::Optimistic => crossed.then_some(order.size),
                FillModel::Persistent => {
                    (cross_ticks >= self.params.persistent_ticks).then_some(order.size)
                }
                FillModel::QueueAware => {
                    let depletion = Self::depletion(order, quote);
                    (cross_ticks >= self.params.queue_persist_ticks
                        && depletion >= self.params.queue_depletion_ratio)
                        .then(|| order.size * self.params.queue_fill_fraction)
                }
            };

            let Some(qty) = qty else { continue };

            order.mark_filled(model, qty);
            debug!(
                model = %model,
                order_id = order.id,
                side = %order.outcome,
                price = %order.price,
                ask = %ask,
                qty = %qty,
                cross_ticks,
                "Fill model fired"
            );
            fills.push(Fill {
                model,
                order_id: order.id,
                outcome: order.outcome,
                price: order.price,
                qty,
                ts_ms: quote.ts_ms,
            });
        }

        fills
    }

    /// Share of the depth seen at post time that has since disappeared.
    pub fn depletion(order: &RestingOrder, quote: &Quote) -> Decimal {
        let initial = order.initial_book_size;
        if initial <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (initial - quote.ask_size(order.outcome)) / initial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::QuotePurpose;
    use rust_decimal_macros::dec;

    fn order(price: Decimal, book: Decimal) -> RestingOrder {
        RestingOrder::new(1, Outcome::Up, price, dec!(5), 0, book, QuotePurpose::Initial)
    }

    fn tick(ts_ms: i64, ask_up: Decimal, size_ask_up: Decimal) -> Quote {
        Quote {
            ts_ms,
            bid_up: dec!(0.85),
            ask_up,
            size_ask_up,
            bid_down: dec!(0.10),
            ask_down: dec!(0.12),
            size_ask_down: dec!(100),
        }
    }

    fn models(fills: &FillEvents) -> Vec<FillModel> {
        fills.iter().map(|f| f.model).collect()
    }

    #[test]
    fn optimistic_fires_once_on_first_cross() {
        let evaluator = FillEvaluator::default();
        let mut o = order(dec!(0.88), dec!(100));

        let first = evaluator.evaluate(&mut o, &tick(1, dec!(0.88), dec!(100)));
        assert_eq!(models(&first), vec![FillModel::Optimistic]);
        assert_eq!(first[0].qty, dec!(5));

        let second = evaluator.evaluate(&mut o, &tick(2, dec!(0.87), dec!(100)));
        assert!(!models(&second).contains(&FillModel::Optimistic));
    }

    #[test]
    fn persistent_needs_consecutive_crossings() {
        let evaluator = FillEvaluator::default();
        let mut o = order(dec!(0.88), dec!(100));

        evaluator.evaluate(&mut o, &tick(1, dec!(0.88), dec!(100)));
        evaluator.evaluate(&mut o, &tick(2, dec!(0.88), dec!(100)));
        // Break the streak.
        evaluator.evaluate(&mut o, &tick(3, dec!(0.90), dec!(100)));
        assert_eq!(o.cross_tick_count(), 0);

        evaluator.evaluate(&mut o, &tick(4, dec!(0.88), dec!(100)));
        evaluator.evaluate(&mut o, &tick(5, dec!(0.88), dec!(100)));
        let third = evaluator.evaluate(&mut o, &tick(6, dec!(0.88), dec!(100)));
        assert_eq!(models(&third), vec![FillModel::Persistent]);
    }

    #[test]
    fn queue_aware_requires_depletion_and_fills_partially() {
        let evaluator = FillEvaluator::default();
        let mut o = order(dec!(0.88), dec!(100));

        for ts in 1..=5 {
            let fills = evaluator.evaluate(&mut o, &tick(ts, dec!(0.88), dec!(80)));
            assert!(!models(&fills).contains(&FillModel::QueueAware));
        }

        let fills = evaluator.evaluate(&mut o, &tick(6, dec!(0.88), dec!(70)));
        assert_eq!(models(&fills), vec![FillModel::QueueAware]);
        assert_eq!(fills[0].qty, dec!(2.5));
    }

    #[test]
    fn queue_aware_never_fires_without_initial_depth() {
        let evaluator = FillEvaluator::default();
        let mut o = order(dec!(0.88), dec!(0));

        for ts in 1..=10 {
            let fills = evaluator.evaluate(&mut o, &tick(ts, dec!(0.80), dec!(0)));
            assert!(!models(&fills).contains(&FillModel::QueueAware));
        }
    }

    #[test]
    fn cancelled_order_never_fires() {
        let evaluator = FillEvaluator::default();
        let mut o = order(dec!(0.88), dec!(100));

        evaluator.evaluate(&mut o, &tick(1, dec!(0.95), dec!(100)));
        evaluator.evaluate(&mut o, &tick(2, dec!(0.88), dec!(100)));
        evaluator.evaluate(&mut o, &tick(3, dec!(0.88), dec!(100)));
        o.mark_cancelled(3);
        assert_eq!(o.cross_tick_count(), 0);

        let fills = evaluator.evaluate(&mut o, &tick(4, dec!(0.50), dec!(0)));
        assert!(fills.is_empty());
    }
}
