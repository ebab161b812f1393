//! Quote sources feeding the tick loop.
//!
//! Transport lives outside the engine: a source only has to hand back the
//! next snapshot, or `None` when this poll produced nothing usable.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::{debug, warn};

use super::types::Quote;

/// Supplies one top-of-book snapshot per poll, in arrival order.
#[async_trait]
pub trait QuoteSource: Send {
    /// Fetch the next snapshot. `None` is a skippable gap, not an error.
    async fn poll(&mut self) -> Option<Quote>;

    /// Whether the source will never produce another quote.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Replays an in-memory list of snapshots.
///
/// `None` entries stand for failed polls.
#[derive(Debug, Clone, Default)]
pub struct VecQuoteSource {
    ticks: VecDeque<Option<Quote>>,
}

impl VecQuoteSource {
    /// Replay the given quotes in order.
    pub fn new(quotes: impl IntoIterator<Item = Quote>) -> Self {
        Self {
            ticks: quotes.into_iter().map(Some).collect(),
        }
    }

    /// Replay polls, including gaps.
    pub fn with_gaps(ticks: impl IntoIterator<Item = Option<Quote>>) -> Self {
        Self {
            ticks: ticks.into_iter().collect(),
        }
    }

    /// Polls left to replay.
    pub fn remaining(&self) -> usize {
        self.ticks.len()
    }
}

#[async_trait]
impl QuoteSource for VecQuoteSource {
    async fn poll(&mut self) -> Option<Quote> {
        self.ticks.pop_front().flatten()
    }

    fn is_exhausted(&self) -> bool {
        self.ticks.is_empty()
    }
}

/// Reads one JSON-encoded [`Quote`] per line.
pub struct JsonLinesQuoteSource<R> {
    lines: Lines<R>,
    exhausted: bool,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesQuoteSource<R> {
    /// Wrap a buffered reader (stdin, a pipe, a byte slice).
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            exhausted: false,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> QuoteSource for JsonLinesQuoteSource<R> {
    async fn poll(&mut self) -> Option<Quote> {
        if self.exhausted {
            return None;
        }

        match self.lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => None,
            Ok(Some(line)) => match serde_json::from_str::<Quote>(&line) {
                Ok(quote) => Some(quote),
                Err(e) => {
                    debug!(error = %e, "Unparseable quote line skipped");
                    None
                }
            },
            Ok(None) => {
                self.exhausted = true;
                None
            }
            Err(e) => {
                warn!(error = %e, "Quote input failed, treating as end of stream");
                self.exhausted = true;
                None
            }
        }
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
