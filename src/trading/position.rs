//! Position tracking, one independent ledger per fill model.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::fills::{Fill, FillModel, PerModel};
use crate::market::Outcome;

/// Bought quantity and cost on both outcomes.
///
/// Only ever grows within a window: the engine buys, it never sells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Up shares held.
    pub qty_up: Decimal,
    /// Down shares held.
    pub qty_down: Decimal,
    /// Total spent on Up.
    pub cost_up: Decimal,
    /// Total spent on Down.
    pub cost_down: Decimal,
}

impl Position {
    /// Shares held on one outcome.
    pub fn qty(&self, outcome: Outcome) -> Decimal {
        match outcome {
            Outcome::Up => self.qty_up,
            Outcome::Down => self.qty_down,
        }
    }

    /// Amount spent on one outcome.
    pub fn cost(&self, outcome: Outcome) -> Decimal {
        match outcome {
            Outcome::Up => self.cost_up,
            Outcome::Down => self.cost_down,
        }
    }

    /// Average price paid on one outcome, zero when nothing is held.
    pub fn avg(&self, outcome: Outcome) -> Decimal {
        let qty = self.qty(outcome);
        if qty > Decimal::ZERO {
            self.cost(outcome) / qty
        } else {
            Decimal::ZERO
        }
    }

    /// Nothing bought yet.
    pub fn is_empty(&self) -> bool {
        self.qty_up.is_zero() && self.qty_down.is_zero()
    }

    /// Shares matched across both outcomes.
    pub fn hedged_qty(&self) -> Decimal {
        self.qty_up.min(self.qty_down)
    }

    /// Holds both legs.
    pub fn is_hedged(&self) -> bool {
        self.hedged_qty() > Decimal::ZERO
    }

    /// Sum of average prices, once hedged.
    pub fn pair_cost(&self) -> Option<Decimal> {
        self.is_hedged()
            .then(|| self.avg(Outcome::Up) + self.avg(Outcome::Down))
    }

    /// Locked edge per matched share, once hedged.
    pub fn edge_net(&self) -> Option<Decimal> {
        self.pair_cost().map(|cost| Decimal::ONE - cost)
    }

    /// Shares not matched by the other leg.
    pub fn unhedged_qty(&self) -> Decimal {
        (self.qty_up - self.qty_down).abs()
    }

    /// Worst-case loss on the unmatched shares if their side settles at zero.
    pub fn max_loss(&self) -> Decimal {
        if self.qty_up > self.qty_down {
            (self.qty_up - self.qty_down) * self.avg(Outcome::Up)
        } else {
            (self.qty_down - self.qty_up) * self.avg(Outcome::Down)
        }
    }

    /// Add a fill. Non-positive quantities or negative prices are refused.
    pub fn record_fill(&mut self, outcome: Outcome, qty: Decimal, price: Decimal) -> bool {
        if qty <= Decimal::ZERO || price < Decimal::ZERO {
            return false;
        }
        match outcome {
            Outcome::Up => {
                self.qty_up += qty;
                self.cost_up += qty * price;
            }
            Outcome::Down => {
                self.qty_down += qty;
                self.cost_down += qty * price;
            }
        }
        true
    }
}

/// The fill that opened a model's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegFill {
    /// Side bought.
    pub outcome: Outcome,
    /// Fill price.
    pub price: Decimal,
    /// Fill quantity.
    pub qty: Decimal,
    /// Fill time (Unix ms).
    pub ts_ms: i64,
}

impl From<&Fill> for LegFill {
    fn from(fill: &Fill) -> Self {
        Self {
            outcome: fill.outcome,
            price: fill.price,
            qty: fill.qty,
            ts_ms: fill.ts_ms,
        }
    }
}

/// Position plus leg history for one fill model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLedger {
    /// Accumulated position.
    pub position: Position,
    /// First leg, once filled.
    pub first_leg: Option<LegFill>,
    /// When the pair was first hedged.
    pub completed_at_ms: Option<i64>,
}

impl ModelLedger {
    /// Holds a leg that is not yet matched.
    pub fn is_unhedged(&self) -> bool {
        self.first_leg.is_some() && !self.position.is_hedged()
    }
}

/// What a fill did to a model's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegTransition {
    /// Opened an empty position.
    FirstLeg,
    /// Made the position hedged for the first time.
    PairCompleted,
    /// Added to a side without changing hedge state.
    Added,
    /// Refused (non-positive quantity).
    Rejected,
}

/// Per-model ledgers fed by the same tick stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    models: PerModel<ModelLedger>,
}

impl Ledger {
    /// Empty ledgers for every model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger for one model.
    pub fn model(&self, model: FillModel) -> &ModelLedger {
        self.models.get(model)
    }

    /// Position for one model.
    pub fn position(&self, model: FillModel) -> &Position {
        &self.models.get(model).position
    }

    /// Iterate all models.
    pub fn iter(&self) -> impl Iterator<Item = (FillModel, &ModelLedger)> {
        self.models.iter()
    }

    /// Credit a fill to its model and classify the change.
    pub fn apply(&mut self, fill: &Fill) -> LegTransition {
        let entry = self.models.get_mut(fill.model);
        let was_empty = entry.position.is_empty();
        let was_hedged = entry.position.is_hedged();

        if !entry.position.record_fill(fill.outcome, fill.qty, fill.price) {
            return LegTransition::Rejected;
        }

        if was_empty {
            entry.first_leg = Some(LegFill::from(fill));
            LegTransition::FirstLeg
        } else if !was_hedged && entry.position.is_hedged() {
            entry.completed_at_ms = Some(fill.ts_ms);
            LegTransition::PairCompleted
        } else {
            LegTransition::Added
        }
    }

    /// Whether `model` holds any quantity on `outcome`.
    pub fn holds(&self, model: FillModel, outcome: Outcome) -> bool {
        self.position(model).qty(outcome) > Decimal::ZERO
    }

    /// Some model holds an unmatched single leg.
    pub fn any_unhedged(&self) -> bool {
        self.models.iter().any(|(_, l)| l.is_unhedged())
    }

    /// Some model holds the opposite leg and still needs `outcome` to pair it.
    pub fn needs(&self, outcome: Outcome) -> bool {
        FillModel::ALL
            .into_iter()
            .any(|m| self.holds(m, outcome.opposite()) && !self.holds(m, outcome))
    }
}
