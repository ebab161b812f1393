//! Fill realism models.
//!
//! Every resting order is judged under all three models on every tick, and
//! each model keeps its own position, so the optimistic and pessimistic
//! outcomes of the same tick stream can be compared side by side.

pub mod evaluator;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use evaluator::{Fill, FillEvaluator, FillEvents};

/// How a resting bid is judged to have filled.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
pub enum FillModel {
    /// Fills the instant the ask reaches our price.
    #[strum(to_string = "optimistic", serialize = "L")]
    Optimistic,
    /// Fills after the ask has stayed through our price for N ticks.
    #[strum(to_string = "persistent", serialize = "M")]
    Persistent,
    /// Persistent crossing plus visible depth consumed; fills part of the order.
    #[strum(to_string = "queue_aware", serialize = "Q")]
    QueueAware,
}

impl FillModel {
    /// All models, from most to least optimistic.
    pub const ALL: [FillModel; 3] = [
        FillModel::Optimistic,
        FillModel::Persistent,
        FillModel::QueueAware,
    ];

    /// Position of this model in [`FillModel::ALL`].
    pub fn index(self) -> usize {
        match self {
            FillModel::Optimistic => 0,
            FillModel::Persistent => 1,
            FillModel::QueueAware => 2,
        }
    }

    /// Single-letter code used in summaries.
    pub fn code(self) -> &'static str {
        match self {
            FillModel::Optimistic => "L",
            FillModel::Persistent => "M",
            FillModel::QueueAware => "Q",
        }
    }
}

/// One value per fill model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerModel<T>([T; 3]);

impl<T> PerModel<T> {
    /// Build from a function of the model.
    pub fn from_fn(mut f: impl FnMut(FillModel) -> T) -> Self {
        Self(FillModel::ALL.map(&mut f))
    }

    /// Borrow the value for a model.
    pub fn get(&self, model: FillModel) -> &T {
        &self.0[model.index()]
    }

    /// Mutably borrow the value for a model.
    pub fn get_mut(&mut self, model: FillModel) -> &mut T {
        &mut self.0[model.index()]
    }

    /// Iterate `(model, value)` pairs in [`FillModel::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (FillModel, &T)> {
        FillModel::ALL.into_iter().zip(self.0.iter())
    }
}

/// Thresholds for the Persistent and Queue-aware models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillParams {
    /// Consecutive crossing ticks for a Persistent fill.
    pub persistent_ticks: u32,
    /// Consecutive crossing ticks for a Queue-aware fill.
    pub queue_persist_ticks: u32,
    /// Share of the depth seen at post time that must be gone.
    pub queue_depletion_ratio: Decimal,
    /// Share of the order size a Queue-aware fill takes.
    pub queue_fill_fraction: Decimal,
}

impl Default for FillParams {
    fn default() -> Self {
        Self {
            persistent_ticks: 3,
            queue_persist_ticks: 5,
            queue_depletion_ratio: Decimal::new(3, 1),
            queue_fill_fraction: Decimal::new(5, 1),
        }
    }
}
