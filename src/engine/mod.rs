//! Pair-capture engine for one window.
//!
//! This module handles:
//! - The window mode state machine
//! - Completion pricing under the hard cap
//! - The window orchestrator (`process_tick` / `finalize`)
//! - The append-only event log and per-window metrics

pub mod completion;
pub mod events;
pub mod mode;
pub mod stats;
pub mod window;

pub use completion::{CompletionController, Feasibility};
pub use events::{
    CancelCause, ChannelSink, EngineEvent, EventLog, EventRecord, EventSink, TracingSink,
};
pub use mode::{StopReason, WindowMode};
pub use stats::{ModelMetrics, WindowMetrics};
pub use window::{TickOutcome, TickReport, WindowEngine, AUDIT_EPSILON};
