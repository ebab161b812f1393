//! Unified error types for the pair-capture engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::WindowMode;
use crate::fills::FillModel;
use crate::market::Outcome;

/// Unified error type for the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration loaded but failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The completion price cap was breached. Fatal for the window.
    #[error("invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
}

/// Reasons a quote snapshot is unusable. The tick is skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuoteError {
    /// No ask on one side of the book.
    #[error("no ask for {outcome}")]
    MissingAsk {
        /// Side without an ask.
        outcome: Outcome,
    },

    /// Price outside the [0, 1] range of a binary outcome.
    #[error("price {price} out of range for {outcome}")]
    PriceOutOfRange {
        /// Offending side.
        outcome: Outcome,
        /// Offending price.
        price: Decimal,
    },

    /// Order book is inverted (bid above ask).
    #[error("order book inverted for {outcome}: best_bid={best_bid} > best_ask={best_ask}")]
    BookInverted {
        /// Inverted side.
        outcome: Outcome,
        /// Best bid price.
        best_bid: Decimal,
        /// Best ask price.
        best_ask: Decimal,
    },

    /// Negative resting size.
    #[error("negative ask size for {outcome}")]
    NegativeSize {
        /// Offending side.
        outcome: Outcome,
    },

    /// Snapshot is not newer than the last processed one.
    #[error("quote at {ts_ms} is not after last processed {last_ts_ms}")]
    OutOfOrder {
        /// Timestamp of the rejected quote.
        ts_ms: i64,
        /// Timestamp of the last processed quote.
        last_ts_ms: i64,
    },
}

impl QuoteError {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            QuoteError::MissingAsk { .. } => "missing_ask",
            QuoteError::PriceOutOfRange { .. } => "price_out_of_range",
            QuoteError::BookInverted { .. } => "book_inverted",
            QuoteError::NegativeSize { .. } => "negative_size",
            QuoteError::OutOfOrder { .. } => "out_of_order",
        }
    }
}

/// A completion that breaches the active mode's price cap.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error(
    "{model} pair in {mode} mode: completion {p_comp} > cap {cap} (first leg {p_first}, loss {realized_loss}): {reason}"
)]
pub struct InvariantViolation {
    /// Fill model whose pair breached the cap.
    pub model: FillModel,
    /// Mode in force when the pair completed.
    pub mode: WindowMode,
    /// First-leg average price.
    pub p_first: Decimal,
    /// Completion-leg average price.
    pub p_comp: Decimal,
    /// Cap for the active mode.
    pub cap: Decimal,
    /// Loss locked in by the pair (zero when profitable).
    pub realized_loss: Decimal,
    /// What was breached.
    pub reason: String,
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, EngineError>;
