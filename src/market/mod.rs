//! Market module for two-outcome 15-minute prediction windows.
//!
//! This module handles:
//! - Window and quote types
//! - Window identity (slug rollover)
//! - Quote sources for the tick loop

pub mod clock;
pub mod source;
pub mod types;

pub use clock::{FixedIntervalClock, WindowClock};
pub use source::{JsonLinesQuoteSource, QuoteSource, VecQuoteSource};
pub use types::{Outcome, OutcomePair, Quote, Window};
