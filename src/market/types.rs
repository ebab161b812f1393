//! Market-related types for two-outcome 15-minute prediction windows.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::QuoteError;

/// Market outcome for binary Up/Down windows.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Price finishes up (YES token).
    #[strum(serialize = "up", serialize = "yes", serialize = "UP", serialize = "YES")]
    #[default]
    Up,
    /// Price finishes down (NO token).
    #[strum(serialize = "down", serialize = "no", serialize = "DOWN", serialize = "NO")]
    Down,
}

impl Outcome {
    /// Both outcomes, Up first.
    pub const BOTH: [Outcome; 2] = [Outcome::Up, Outcome::Down];

    /// Get the opposite outcome.
    pub fn opposite(&self) -> Self {
        match self {
            Outcome::Up => Outcome::Down,
            Outcome::Down => Outcome::Up,
        }
    }
}

/// One value per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomePair<T> {
    /// Up-side value.
    pub up: T,
    /// Down-side value.
    pub down: T,
}

impl<T> OutcomePair<T> {
    /// Borrow the value for an outcome.
    pub fn get(&self, outcome: Outcome) -> &T {
        match outcome {
            Outcome::Up => &self.up,
            Outcome::Down => &self.down,
        }
    }

    /// Mutably borrow the value for an outcome.
    pub fn get_mut(&mut self, outcome: Outcome) -> &mut T {
        match outcome {
            Outcome::Up => &mut self.up,
            Outcome::Down => &mut self.down,
        }
    }
}

/// One trading period: a fixed-duration binary market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// Window slug (e.g., "btc-updown-15m-1765301400").
    pub slug: String,
    /// Unix timestamp (seconds) when the window opened.
    pub start_ts: i64,
    /// Unix timestamp (seconds) when the window closes.
    pub end_ts: i64,
}

impl Window {
    /// Default duration of a 15-minute window in seconds.
    pub const WINDOW_SECONDS: i64 = 900;

    /// Create a window from its slug and bounds.
    pub fn new(slug: impl Into<String>, start_ts: i64, end_ts: i64) -> Self {
        Self {
            slug: slug.into(),
            start_ts,
            end_ts,
        }
    }

    /// Window length in seconds.
    pub fn duration_secs(&self) -> i64 {
        self.end_ts - self.start_ts
    }

    /// Seconds left until close at `ts_ms`. Negative once the window has ended.
    pub fn seconds_remaining(&self, ts_ms: i64) -> Decimal {
        Decimal::new(self.end_ts * 1000 - ts_ms, 3)
    }

    /// Format remaining time at `ts_ms` as "Xm Ys".
    pub fn time_remaining_str(&self, ts_ms: i64) -> String {
        let remaining_ms = self.end_ts * 1000 - ts_ms;
        if remaining_ms <= 0 {
            return "CLOSED".to_string();
        }
        let secs = remaining_ms / 1000;
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Top-of-book snapshot for both outcomes, produced once per poll.
///
/// Bids of zero mean "no bid"; asks must be present for the quote to be usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Snapshot time (Unix milliseconds).
    pub ts_ms: i64,
    /// Best Up bid.
    pub bid_up: Decimal,
    /// Best Up ask.
    pub ask_up: Decimal,
    /// Resting size at the best Up ask.
    pub size_ask_up: Decimal,
    /// Best Down bid.
    pub bid_down: Decimal,
    /// Best Down ask.
    pub ask_down: Decimal,
    /// Resting size at the best Down ask.
    pub size_ask_down: Decimal,
}

impl Quote {
    /// Best bid for an outcome.
    pub fn bid(&self, outcome: Outcome) -> Decimal {
        match outcome {
            Outcome::Up => self.bid_up,
            Outcome::Down => self.bid_down,
        }
    }

    /// Best ask for an outcome.
    pub fn ask(&self, outcome: Outcome) -> Decimal {
        match outcome {
            Outcome::Up => self.ask_up,
            Outcome::Down => self.ask_down,
        }
    }

    /// Resting size at the best ask for an outcome.
    pub fn ask_size(&self, outcome: Outcome) -> Decimal {
        match outcome {
            Outcome::Up => self.size_ask_up,
            Outcome::Down => self.size_ask_down,
        }
    }

    /// Bid/ask midpoint, or `None` when there is no bid.
    pub fn mid(&self, outcome: Outcome) -> Option<Decimal> {
        let bid = self.bid(outcome);
        (bid > Decimal::ZERO).then(|| (bid + self.ask(outcome)) / Decimal::TWO)
    }

    /// Midpoint, falling back to the ask on a one-sided book.
    pub fn mid_or_ask(&self, outcome: Outcome) -> Decimal {
        self.mid(outcome).unwrap_or_else(|| self.ask(outcome))
    }

    /// Distance of both mids from a symmetric 50/50 book.
    pub fn price_distance(&self) -> Decimal {
        let half = Decimal::new(5, 1);
        (self.mid_or_ask(Outcome::Up) - half).abs() + (self.mid_or_ask(Outcome::Down) - half).abs()
    }

    /// Check the snapshot is usable. Invalid quotes are skipped, never acted on.
    pub fn validate(&self) -> Result<(), QuoteError> {
        for outcome in Outcome::BOTH {
            let ask = self.ask(outcome);
            let bid = self.bid(outcome);

            if ask <= Decimal::ZERO {
                return Err(QuoteError::MissingAsk { outcome });
            }
            if ask > Decimal::ONE {
                return Err(QuoteError::PriceOutOfRange { outcome, price: ask });
            }
            if bid < Decimal::ZERO || bid > Decimal::ONE {
                return Err(QuoteError::PriceOutOfRange { outcome, price: bid });
            }
            if bid > ask {
                return Err(QuoteError::BookInverted {
                    outcome,
                    best_bid: bid,
                    best_ask: ask,
                });
            }
            if self.ask_size(outcome) < Decimal::ZERO {
                return Err(QuoteError::NegativeSize { outcome });
            }
        }
        Ok(())
    }
}
