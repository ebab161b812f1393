//! Append-only structured event log.
//!
//! One record per state-changing action, with enough fields to replay and
//! audit a window offline. Records serialize as
//! `{"seq":..,"ts_ms":..,"slug":..,"event":"PAIR_COMPLETE","fields":{..}}`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::mode::{StopReason, WindowMode};
use super::stats::WindowMetrics;
use crate::fills::FillModel;
use crate::market::Outcome;
use crate::trading::QuotePurpose;

/// A window opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStarted {
    /// Open (Unix seconds).
    pub start_ts: i64,
    /// Close (Unix seconds).
    pub end_ts: i64,
}

/// A bid was posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotePosted {
    /// Order id.
    pub order_id: u64,
    /// Side.
    pub side: Outcome,
    /// Initial or completion.
    pub purpose: QuotePurpose,
    /// Limit price.
    pub price: Decimal,
    /// Size.
    pub size: Decimal,
    /// Depth at the ask when posted.
    pub book_size: Decimal,
    /// Mode when posted.
    pub mode: WindowMode,
    /// Cap in force for completion quotes.
    pub cap: Option<Decimal>,
    /// Whether the price respects the cap.
    pub invariant_ok: bool,
}

/// Why a bid was pulled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CancelCause {
    /// Superseded by a better-priced bid.
    Replace,
    /// Window stopped.
    Stop,
}

/// A bid was cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteCancelled {
    /// Order id.
    pub order_id: u64,
    /// Side.
    pub side: Outcome,
    /// Limit price.
    pub price: Decimal,
    /// Time on the book.
    pub lifetime_ms: i64,
    /// Why.
    pub cause: CancelCause,
}

/// A model opened its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegFilled {
    /// Model that filled.
    pub model: FillModel,
    /// Side.
    pub side: Outcome,
    /// Fill price.
    pub price: Decimal,
    /// Fill quantity.
    pub qty: Decimal,
    /// Normal-mode cap for the opposite leg.
    pub max_completion_at_edge: Decimal,
    /// Opposite best ask.
    pub other_side_ask: Decimal,
    /// Opposite best bid.
    pub other_side_bid: Decimal,
    /// Opposite ask already within the cap.
    pub can_complete_at_edge: bool,
    /// Normal edge floor.
    pub edge_floor: Decimal,
}

/// A model's position became hedged. The per-pair audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairCompleted {
    /// Model that completed.
    pub model: FillModel,
    /// Mode at completion.
    pub window_mode: WindowMode,
    /// First-leg side.
    pub side_first: Outcome,
    /// First-leg average price.
    pub p_first: Decimal,
    /// First-leg quantity.
    pub q_first: Decimal,
    /// Completion side.
    pub side_comp: Outcome,
    /// Completion average price.
    pub p_comp: Decimal,
    /// Completion quantity.
    pub q_comp: Decimal,
    /// Matched shares.
    pub q_matched: Decimal,
    /// Total spent on both sides.
    pub cost_total: Decimal,
    /// Guaranteed payout ($1 per matched share).
    pub payout_locked: Decimal,
    /// Payout minus cost.
    pub edge_locked: Decimal,
    /// `avg_up + avg_down`.
    pub pair_cost: Decimal,
    /// `1 - edge_floor - p_first`.
    pub completion_cap_normal: Decimal,
    /// Cap of the active mode.
    pub completion_cap_used: Decimal,
    /// Locked loss, zero when profitable.
    pub realized_loss: Decimal,
    /// `p_comp <= completion_cap_used` and loss within the cap.
    pub invariant_ok: bool,
    /// `1 - pair_cost`.
    pub edge_net_per_pair: Decimal,
    /// Since the window's first fill.
    pub time_to_complete_ms: Option<i64>,
}

/// The window changed mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeChanged {
    /// Previous mode.
    pub from: WindowMode,
    /// New mode.
    pub to: WindowMode,
    /// Human-readable cause.
    pub reason: String,
    /// Normal cap that could not be met.
    pub max_completion_price: Decimal,
    /// Opposite best ask.
    pub other_best_ask: Decimal,
    /// Opposite best bid.
    pub other_best_bid: Decimal,
    /// Window first-leg price.
    pub first_leg_price: Decimal,
    /// Loss if completed at the ask.
    pub rescue_loss: Decimal,
    /// Configured loss cap.
    pub loss_cap: Decimal,
}

/// The window stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStopped {
    /// Mode before stopping.
    pub from: WindowMode,
    /// Why.
    pub reason: StopReason,
    /// Detail for operators.
    pub detail: String,
}

/// A window closed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowEnded {
    /// Final metrics.
    pub metrics: WindowMetrics,
}

/// Every state-changing action the engine takes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "fields", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineEvent {
    /// `WINDOW_START`
    WindowStart(WindowStarted),
    /// `QUOTE_POST`
    QuotePost(QuotePosted),
    /// `QUOTE_CANCEL`
    QuoteCancel(QuoteCancelled),
    /// `FIRST_LEG_FILL`
    FirstLegFill(LegFilled),
    /// `PAIR_COMPLETE`
    PairComplete(PairCompleted),
    /// `RESCUE_MODE_ENTER`
    RescueModeEnter(ModeChanged),
    /// `WINDOW_STOP`
    WindowStop(WindowStopped),
    /// `WINDOW_END`
    WindowEnd(Box<WindowEnded>),
}

impl EngineEvent {
    /// Record name as written to the log.
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::WindowStart(_) => "WINDOW_START",
            EngineEvent::QuotePost(_) => "QUOTE_POST",
            EngineEvent::QuoteCancel(_) => "QUOTE_CANCEL",
            EngineEvent::FirstLegFill(_) => "FIRST_LEG_FILL",
            EngineEvent::PairComplete(_) => "PAIR_COMPLETE",
            EngineEvent::RescueModeEnter(_) => "RESCUE_MODE_ENTER",
            EngineEvent::WindowStop(_) => "WINDOW_STOP",
            EngineEvent::WindowEnd(_) => "WINDOW_END",
        }
    }
}

/// One log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Strictly increasing within a window.
    pub seq: u64,
    /// Tick time the action was taken (Unix ms).
    pub ts_ms: i64,
    /// Window slug.
    pub slug: String,
    /// The action.
    #[serde(flatten)]
    pub event: EngineEvent,
}

/// Where event records go. Records are only ever appended.
pub trait EventSink: Send {
    /// Append one record.
    fn record(&mut self, record: EventRecord);
}

/// In-memory log.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in append order.
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Records with the given name.
    pub fn named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a EventRecord> + 'a {
        self.records.iter().filter(move |r| r.event.name() == name)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// No records yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl EventSink for EventLog {
    fn record(&mut self, record: EventRecord) {
        self.records.push(record);
    }
}

/// Emits each record as a JSON line on the `paircap::events` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&mut self, record: EventRecord) {
        match serde_json::to_string(&record) {
            Ok(line) => info!(target: "paircap::events", event = record.event.name(), "{line}"),
            Err(e) => warn!(error = %e, seq = record.seq, "Event record not serializable"),
        }
    }
}

/// Forwards records over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink<T = EventRecord> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> ChannelSink<T> {
    /// Wrap a sender.
    pub fn new(tx: mpsc::UnboundedSender<T>) -> Self {
        Self { tx }
    }
}

impl<T: From<EventRecord> + Send> EventSink for ChannelSink<T> {
    fn record(&mut self, record: EventRecord) {
        // Receiver gone means the run is shutting down.
        let _ = self.tx.send(T::from(record));
    }
}

impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn record(&mut self, record: EventRecord) {
        self.0.record(record.clone());
        self.1.record(record);
    }
}
