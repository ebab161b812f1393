//! Quote lifecycle: post, cancel and replace under churn limits.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::order::{QuotePurpose, RestingOrder};
use crate::config::EngineConfig;
use crate::market::{Outcome, OutcomePair, Quote};

/// Lowest price the engine will bid.
pub const MIN_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Decimal places kept on computed prices.
pub const PRICE_DP: u32 = 4;

/// Why a cancel did not happen. An expected outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CancelRefusal {
    /// Order was already cancelled.
    AlreadyCancelled,
    /// Order has not rested long enough.
    MinLifetime {
        /// Current age.
        age_ms: i64,
        /// Required age.
        min_ms: i64,
    },
    /// The window's cancel budget is spent.
    CancelBudgetExhausted {
        /// Cancels already issued.
        issued: u32,
        /// Budget.
        max: u32,
    },
}

impl CancelRefusal {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            CancelRefusal::AlreadyCancelled => "already_cancelled",
            CancelRefusal::MinLifetime { .. } => "min_lifetime",
            CancelRefusal::CancelBudgetExhausted { .. } => "cancel_budget",
        }
    }
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Order is off the book.
    Cancelled {
        /// How long it rested.
        lifetime_ms: i64,
    },
    /// Order is still resting.
    Refused(CancelRefusal),
}

impl CancelOutcome {
    /// Whether the cancel went through.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CancelOutcome::Cancelled { .. })
    }
}

/// Truncate a computed price so rounding never lifts it.
pub fn truncate_price(price: Decimal) -> Decimal {
    price.round_dp_with_strategy(PRICE_DP, RoundingStrategy::ToZero)
}

/// Issues resting bids for one window and enforces the churn limits.
#[derive(Debug, Clone)]
pub struct QuoteLifecycle {
    clip_size: Decimal,
    min_lifetime_ms: i64,
    max_cancels: u32,
    min_improvement: Decimal,
    initial_offset: Decimal,
    initial_edge_target: Decimal,
    next_id: u64,
    posted: u32,
    cancels: u32,
    replaces: u32,
    refusals: u32,
    lifetimes_ms: Vec<i64>,
}

impl QuoteLifecycle {
    /// Create a lifecycle manager with a fresh cancel budget.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            clip_size: config.clip_size,
            min_lifetime_ms: config.min_quote_lifetime_ms,
            max_cancels: config.max_cancels_per_window,
            min_improvement: config.min_price_improvement,
            initial_offset: config.initial_quote_offset,
            initial_edge_target: config.initial_edge_target,
            next_id: 1,
            posted: 0,
            cancels: 0,
            replaces: 0,
            refusals: 0,
            lifetimes_ms: Vec::new(),
        }
    }

    /// Post a clip-sized bid, recording the visible depth at the ask.
    pub fn post(
        &mut self,
        outcome: Outcome,
        price: Decimal,
        purpose: QuotePurpose,
        quote: &Quote,
    ) -> RestingOrder {
        let id = self.next_id;
        self.next_id += 1;
        self.posted += 1;
        RestingOrder::new(
            id,
            outcome,
            price,
            self.clip_size,
            quote.ts_ms,
            quote.ask_size(outcome),
            purpose,
        )
    }

    /// Check the cancel rules without acting.
    pub fn can_cancel(&self, order: &RestingOrder, now_ms: i64) -> Result<(), CancelRefusal> {
        if order.is_cancelled() {
            return Err(CancelRefusal::AlreadyCancelled);
        }

        let age_ms = order.age_ms(now_ms);
        if age_ms < self.min_lifetime_ms {
            return Err(CancelRefusal::MinLifetime {
                age_ms,
                min_ms: self.min_lifetime_ms,
            });
        }

        if self.cancels >= self.max_cancels {
            return Err(CancelRefusal::CancelBudgetExhausted {
                issued: self.cancels,
                max: self.max_cancels,
            });
        }

        Ok(())
    }

    /// Cancel `order` if the rules allow it.
    pub fn cancel(&mut self, order: &mut RestingOrder, now_ms: i64) -> CancelOutcome {
        if let Err(refusal) = self.can_cancel(order, now_ms) {
            self.refusals += 1;
            debug!(order_id = order.id, side = %order.outcome, reason = refusal.label(), "Cancel refused");
            return CancelOutcome::Refused(refusal);
        }

        order.mark_cancelled(now_ms);
        let lifetime_ms = order.age_ms(now_ms);
        self.cancels += 1;
        self.lifetimes_ms.push(lifetime_ms);
        CancelOutcome::Cancelled { lifetime_ms }
    }

    /// A replace is worth it only for a meaningful price improvement.
    pub fn should_replace(&self, current: Decimal, candidate: Decimal) -> bool {
        candidate > current + self.min_improvement
    }

    /// Count a completed cancel-and-repost.
    pub fn record_replace(&mut self) {
        self.replaces += 1;
    }

    /// Initial two-sided bids: `mid - offset` on each side, pulled down evenly
    /// until `bid_up + bid_down <= 1 - initial_edge_target`.
    ///
    /// Returns `None` when no pair of bids at or above the minimum price fits.
    pub fn initial_bids(&self, quote: &Quote) -> Option<OutcomePair<Decimal>> {
        let max_sum = Decimal::ONE - self.initial_edge_target;
        let mut up = reference_mid(quote, Outcome::Up) - self.initial_offset;
        let mut down = reference_mid(quote, Outcome::Down) - self.initial_offset;

        let excess = up + down - max_sum;
        if excess > Decimal::ZERO {
            up -= excess / Decimal::TWO;
            down -= excess / Decimal::TWO;
        }

        let mut up = truncate_price(up).max(MIN_PRICE);
        let mut down = truncate_price(down).max(MIN_PRICE);

        // Flooring one side can push the sum back over; take it from the other.
        let excess = up + down - max_sum;
        if excess > Decimal::ZERO {
            if up >= down {
                up -= excess;
            } else {
                down -= excess;
            }
        }

        (up >= MIN_PRICE && down >= MIN_PRICE).then_some(OutcomePair { up, down })
    }

    /// Orders posted this window.
    pub fn posted(&self) -> u32 {
        self.posted
    }

    /// Cancels issued this window.
    pub fn cancels(&self) -> u32 {
        self.cancels
    }

    /// Replaces issued this window.
    pub fn replaces(&self) -> u32 {
        self.replaces
    }

    /// Cancel requests refused this window.
    pub fn refusals(&self) -> u32 {
        self.refusals
    }

    /// Lifetimes of cancelled orders.
    pub fn lifetimes_ms(&self) -> &[i64] {
        &self.lifetimes_ms
    }
}

/// Mid used for pricing bids. A one-sided book prices off one tick under the ask.
pub fn reference_mid(quote: &Quote, outcome: Outcome) -> Decimal {
    quote
        .mid(outcome)
        .unwrap_or_else(|| quote.ask(outcome) - MIN_PRICE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(ts_ms: i64, bid_up: Decimal, ask_up: Decimal, bid_down: Decimal, ask_down: Decimal) -> Quote {
        Quote {
            ts_ms,
            bid_up,
            ask_up,
            size_ask_up: dec!(120),
            bid_down,
            ask_down,
            size_ask_down: dec!(80),
        }
    }

    fn lifecycle() -> QuoteLifecycle {
        QuoteLifecycle::new(&EngineConfig::default())
    }

    #[test]
    fn min_price_is_one_cent() {
        assert_eq!(MIN_PRICE, dec!(0.01));
    }

    #[test]
    fn post_records_book_depth_and_ids() {
        let mut lc = lifecycle();
        let q = quote(5_000, dec!(0.48), dec!(0.50), dec!(0.49), dec!(0.51));

        let a = lc.post(Outcome::Up, dec!(0.47), QuotePurpose::Initial, &q);
        let b = lc.post(Outcome::Down, dec!(0.48), QuotePurpose::Initial, &q);

        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(a.initial_book_size, dec!(120));
        assert_eq!(b.initial_book_size, dec!(80));
        assert_eq!(a.size, dec!(5));
        assert_eq!(lc.posted(), 2);
    }

    #[test]
    fn cancel_refused_before_min_lifetime() {
        let mut lc = lifecycle();
        let q = quote(10_000, dec!(0.48), dec!(0.50), dec!(0.49), dec!(0.51));
        let mut order = lc.post(Outcome::Up, dec!(0.47), QuotePurpose::Initial, &q);

        let early = lc.cancel(&mut order, 11_999);
        assert_eq!(
            early,
            CancelOutcome::Refused(CancelRefusal::MinLifetime { age_ms: 1_999, min_ms: 2_000 })
        );
        assert!(!order.is_cancelled());

        assert_eq!(lc.cancel(&mut order, 12_000), CancelOutcome::Cancelled { lifetime_ms: 2_000 });
        assert_eq!(
            lc.cancel(&mut order, 13_000),
            CancelOutcome::Refused(CancelRefusal::AlreadyCancelled)
        );
        assert_eq!(lc.cancels(), 1);
        assert_eq!(lc.refusals(), 2);
        assert_eq!(lc.lifetimes_ms(), &[2_000]);
    }

    #[test]
    fn cancel_budget_is_enforced() {
        let config = EngineConfig {
            max_cancels_per_window: 1,
            ..EngineConfig::default()
        };
        let mut lc = QuoteLifecycle::new(&config);
        let q = quote(0, dec!(0.48), dec!(0.50), dec!(0.49), dec!(0.51));
        let mut first = lc.post(Outcome::Up, dec!(0.47), QuotePurpose::Initial, &q);
        let mut second = lc.post(Outcome::Down, dec!(0.47), QuotePurpose::Initial, &q);

        assert!(lc.cancel(&mut first, 5_000).is_cancelled());
        assert_eq!(
            lc.cancel(&mut second, 5_000),
            CancelOutcome::Refused(CancelRefusal::CancelBudgetExhausted { issued: 1, max: 1 })
        );
    }

    #[test]
    fn replace_needs_meaningful_improvement() {
        let lc = lifecycle();
        assert!(!lc.should_replace(dec!(0.45), dec!(0.452)));
        assert!(lc.should_replace(dec!(0.45), dec!(0.4521)));
        assert!(!lc.should_replace(dec!(0.45), dec!(0.44)));
    }

    #[test]
    fn initial_bids_sit_below_mid() {
        let lc = lifecycle();
        let q = quote(0, dec!(0.44), dec!(0.46), dec!(0.50), dec!(0.52));

        let bids = lc.initial_bids(&q).unwrap();
        assert_eq!(bids.up, dec!(0.44));
        assert_eq!(bids.down, dec!(0.50));
    }

    #[test]
    fn initial_bids_respect_edge_target() {
        let lc = lifecycle();
        let q = quote(0, dec!(0.50), dec!(0.52), dec!(0.50), dec!(0.52));

        // Mids 0.51 each; raw bids 0.50 + 0.50 exceed 0.985 by 0.015.
        let bids = lc.initial_bids(&q).unwrap();
        assert_eq!(bids.up, dec!(0.4925));
        assert_eq!(bids.down, dec!(0.4925));
        assert!(bids.up + bids.down <= dec!(0.985));
    }

    #[test]
    fn initial_bids_price_one_sided_book_off_the_ask() {
        let lc = lifecycle();
        let q = quote(0, dec!(0), dec!(0.40), dec!(0.55), dec!(0.57));

        let bids = lc.initial_bids(&q).unwrap();
        assert_eq!(bids.up, dec!(0.38));
        assert_eq!(bids.down, dec!(0.55));
    }

    #[test]
    fn initial_bids_floor_at_min_price() {
        let lc = lifecycle();
        let q = quote(0, dec!(0.98), dec!(0.99), dec!(0), dec!(0.02));

        let bids = lc.initial_bids(&q).unwrap();
        assert_eq!(bids.down, MIN_PRICE);
        assert!(bids.up + bids.down <= dec!(0.985));
    }
}
