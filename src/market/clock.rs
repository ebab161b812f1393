//! Window identity: maps a point in time to the active window.

use tracing::debug;

use super::types::Window;

/// Supplies the identity of the window that is live at a given time.
pub trait WindowClock: Send + Sync {
    /// Window active at `now_ms` (Unix milliseconds).
    fn current_window(&self, now_ms: i64) -> Window;
}

/// Fixed-length windows aligned to multiples of the duration since the epoch.
///
/// Slugs are `{prefix}-{start_ts}`, matching the computed slugs Polymarket uses
/// for its recurring crypto Up/Down markets.
#[derive(Debug, Clone)]
pub struct FixedIntervalClock {
    prefix: String,
    duration_secs: i64,
}

impl FixedIntervalClock {
    /// Create a clock for `{prefix}-{start_ts}` windows of `duration_secs`.
    pub fn new(prefix: impl Into<String>, duration_secs: i64) -> Self {
        Self {
            prefix: prefix.into(),
            duration_secs: duration_secs.max(1),
        }
    }
}

impl Default for FixedIntervalClock {
    fn default() -> Self {
        Self::new("btc-updown-15m", Window::WINDOW_SECONDS)
    }
}

impl WindowClock for FixedIntervalClock {
    fn current_window(&self, now_ms: i64) -> Window {
        let now = now_ms.div_euclid(1000);
        let start_ts = now.div_euclid(self.duration_secs) * self.duration_secs;
        let slug = format!("{}-{}", self.prefix, start_ts);
        debug!(slug = %slug, "Computed window slug");
        Window::new(slug, start_ts, start_ts + self.duration_secs)
    }
}
