//! Maker pair-capture engine for two-outcome 15-minute prediction windows.
//!
//! The engine rests a bid on each side of an Up/Down market. Once one side
//! fills (the first leg), it works a completion bid on the other side, capped
//! so the pair costs at most `1 - edge_floor`. At settlement exactly one side
//! pays $1.00 per share, so a completed pair locks in the edge:
//!
//! ```text
//! First leg (Up):      $0.48
//! Completion (Down):   $0.49
//! ─────────────────────────
//! Pair cost:           $0.97 <= $1.00 - 0.005
//! Locked edge:         $0.03 per pair
//! ```
//!
//! When the cap cannot be met, the window enters RESCUE (break-even floor,
//! bounded by a loss cap) or STOPS. Fills are judged under three models
//! (optimistic, persistent, queue-aware) side by side.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`market`]: Windows, quotes, quote sources and the window clock
//! - [`fills`]: Fill realism models
//! - [`trading`]: Resting orders, quote lifecycle and positions
//! - [`engine`]: Per-window state machine, completion pricing and event log
//! - [`runner`]: Multi-window supervisor and run summary
//! - [`metrics`]: Prometheus metrics
//! - [`api`]: HTTP API for health/metrics/status
//! - [`utils`]: Utility functions

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod fills;
pub mod market;
pub mod metrics;
pub mod runner;
pub mod trading;
pub mod utils;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
