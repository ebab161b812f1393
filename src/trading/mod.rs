//! Trading module for resting bids and positions.
//!
//! This module handles:
//! - Resting order state
//! - Quote lifecycle (post, cancel, replace limits)
//! - Per-model position tracking

pub mod lifecycle;
pub mod order;
pub mod position;

pub use lifecycle::{CancelOutcome, CancelRefusal, QuoteLifecycle, MIN_PRICE};
pub use order::{QuotePurpose, RestingOrder};
pub use position::{LegFill, LegTransition, Ledger, ModelLedger, Position};
