//! HTTP API module for health, metrics, and status endpoints.

pub mod handlers;
pub mod routes;

pub use handlers::{AppState, MarketStatus};
pub use routes::create_router;
