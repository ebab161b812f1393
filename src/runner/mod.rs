//! Run supervisor.
//!
//! This module handles:
//! - One engine task per market, polling its quote source
//! - Window rollover (finalize the old window, open the next)
//! - The run-wide first-leg fill counter and shutdown broadcast
//! - Collecting finished windows into a [`RunSummary`]

pub mod summary;

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::api::AppState;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::engine::{
    ChannelSink, EventRecord, TickOutcome, TracingSink, WindowEngine, WindowMetrics, WindowMode,
};
use crate::fills::FillModel;
use crate::market::{Quote, QuoteSource, WindowClock};

pub use summary::{ModelSummary, RunSummary, StratumSummary, Verdict};

/// Sink used by market tasks: structured log plus the supervisor channel.
pub type MarketSink = (TracingSink, ChannelSink<RunnerMessage>);

/// What a market task reports to the supervisor.
#[derive(Debug, Clone)]
pub enum RunnerMessage {
    /// An engine event.
    Event(EventRecord),
    /// A new window was opened.
    WindowOpened {
        /// Market name.
        market: String,
        /// Window slug.
        slug: String,
    },
    /// A tick was applied.
    TickProcessed {
        /// Market name.
        market: String,
        /// Window slug.
        slug: String,
        /// Mode after the tick.
        mode: WindowMode,
        /// Ticks processed in the window so far.
        ticks_seen: u64,
    },
    /// A model's first leg filled.
    FirstLegFill {
        /// Market name.
        market: String,
        /// Model that filled.
        model: FillModel,
    },
    /// A window was finalized.
    WindowFinished {
        /// Market name.
        market: String,
        /// Final window metrics.
        metrics: Box<WindowMetrics>,
    },
    /// The market task exited.
    Finished {
        /// Market name.
        market: String,
    },
}

impl From<EventRecord> for RunnerMessage {
    fn from(record: EventRecord) -> Self {
        RunnerMessage::Event(record)
    }
}

/// First-leg fills of the tracking model across windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillCounter {
    count: u64,
    target: u64,
}

impl FillCounter {
    /// Counter that is reached at `target` fills. Zero never stops the run.
    pub fn new(target: u64) -> Self {
        Self { count: 0, target }
    }

    /// Count one fill; returns whether the target is now reached.
    pub fn record(&mut self) -> bool {
        self.count += 1;
        self.is_reached()
    }

    /// Fills counted.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Stop target.
    pub fn target(&self) -> u64 {
        self.target
    }

    /// Target reached.
    pub fn is_reached(&self) -> bool {
        self.target > 0 && self.count >= self.target
    }
}

/// Drive one market until its source runs dry or shutdown is signalled.
///
/// Each window gets a fresh engine; on rollover the old one is finalized
/// before the first tick of the new one is processed.
pub async fn run_market<Q, C>(
    market: String,
    mut source: Q,
    clock: C,
    config: EngineConfig,
    mut shutdown: watch::Receiver<bool>,
    tx: mpsc::UnboundedSender<RunnerMessage>,
) where
    Q: QuoteSource,
    C: WindowClock,
{
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let mut engine: Option<WindowEngine<MarketSink>> = None;

    info!(market = %market, "Market task started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let polled = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            quote = source.poll() => quote,
        };

        match polled {
            Some(quote) => {
                let window = clock.current_window(quote.ts_ms);
                let rollover = engine
                    .as_ref()
                    .map_or(true, |e| window.start_ts > e.window().start_ts);

                if rollover {
                    if let Some(previous) = engine.take() {
                        finish_window(&market, previous, &tx);
                    }
                    info!(market = %market, window = %window.slug, "Opening window");
                    let slug = window.slug.clone();
                    let sink = (TracingSink, ChannelSink::new(tx.clone()));
                    match WindowEngine::new(window, &config, sink) {
                        Ok(opened) => engine = Some(opened),
                        Err(e) => {
                            error!(market = %market, error = %e, "Cannot open window");
                            break;
                        }
                    }
                    let _ = tx.send(RunnerMessage::WindowOpened {
                        market: market.clone(),
                        slug,
                    });
                }

                if let Some(current) = engine.as_mut() {
                    tick(&market, current, &quote, config.tracking_model, &tx);
                }
            }
            None if source.is_exhausted() => {
                info!(market = %market, "Quote source exhausted");
                break;
            }
            None => debug!(market = %market, "Empty poll"),
        }

        if !poll_interval.is_zero() {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    if let Some(current) = engine.take() {
        finish_window(&market, current, &tx);
    }
    info!(market = %market, "Market task finished");
    let _ = tx.send(RunnerMessage::Finished { market });
}

fn tick(
    market: &str,
    engine: &mut WindowEngine<MarketSink>,
    quote: &Quote,
    tracking_model: FillModel,
    tx: &mpsc::UnboundedSender<RunnerMessage>,
) {
    match engine.process_tick(quote) {
        Ok(TickOutcome::Processed(report)) => {
            for model in report.first_legs.iter().filter(|m| **m == tracking_model) {
                let _ = tx.send(RunnerMessage::FirstLegFill {
                    market: market.to_string(),
                    model: *model,
                });
            }
            let _ = tx.send(RunnerMessage::TickProcessed {
                market: market.to_string(),
                slug: engine.window().slug.clone(),
                mode: report.mode,
                ticks_seen: engine.metrics().ticks_seen,
            });
        }
        Ok(TickOutcome::Skipped(err)) => debug!(market = %market, error = %err, "Quote skipped"),
        Ok(TickOutcome::Ignored) => {}
        Err(e) => error!(market = %market, error = %e, "Window halted"),
    }
}

fn finish_window(market: &str, engine: WindowEngine<MarketSink>, tx: &mpsc::UnboundedSender<RunnerMessage>) {
    let metrics = engine.finalize();
    let _ = tx.send(RunnerMessage::WindowFinished {
        market: market.to_string(),
        metrics: Box::new(metrics),
    });
}

/// Owns the market tasks, the fill counter and the shutdown broadcast.
pub struct Supervisor {
    config: EngineConfig,
    state: AppState,
    tasks: JoinSet<()>,
    tx: mpsc::UnboundedSender<RunnerMessage>,
    rx: mpsc::UnboundedReceiver<RunnerMessage>,
    shutdown: watch::Sender<bool>,
    counter: FillCounter,
    windows: Vec<WindowMetrics>,
}

impl Supervisor {
    /// Create a supervisor publishing into `state`. Rejects an invalid config.
    pub fn new(config: EngineConfig, state: AppState) -> Result<Self> {
        config.validate().map_err(EngineError::InvalidConfig)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            counter: FillCounter::new(config.target_first_leg_fills),
            config,
            state,
            tasks: JoinSet::new(),
            tx,
            rx,
            shutdown,
            windows: Vec::new(),
        })
    }

    /// Start a task for one market.
    pub fn spawn_market<Q, C>(&mut self, market: impl Into<String>, source: Q, clock: C)
    where
        Q: QuoteSource + 'static,
        C: WindowClock + 'static,
    {
        let market = market.into();
        self.state.register_market(&market);
        self.tasks.spawn(run_market(
            market,
            source,
            clock,
            self.config.clone(),
            self.shutdown.subscribe(),
            self.tx.clone(),
        ));
    }

    /// Run until every market task has exited.
    ///
    /// `interrupt` resolving (Ctrl-C in the binary) or the run time limit
    /// broadcasts shutdown; tasks still finalize their open window before exiting.
    pub async fn run(self, interrupt: impl Future<Output = ()>) -> RunSummary {
        let Supervisor {
            config,
            state,
            mut tasks,
            tx,
            mut rx,
            shutdown,
            mut counter,
            mut windows,
        } = self;
        drop(tx);

        tokio::pin!(interrupt);
        let mut interrupted = false;

        let run_limit = config.max_run_duration();
        let deadline = tokio::time::sleep(run_limit.unwrap_or_default());
        tokio::pin!(deadline);
        let mut timed_out = false;

        loop {
            tokio::select! {
                message = rx.recv() => match message {
                    Some(message) => {
                        if handle(message, &state, &mut counter, &mut windows, &config).await {
                            info!(fills = counter.count(), target = counter.target(), "Fill target reached, stopping run");
                            shutdown.send_replace(true);
                        }
                    }
                    None => break,
                },
                _ = &mut interrupt, if !interrupted => {
                    interrupted = true;
                    warn!("Interrupted, finalizing open windows");
                    shutdown.send_replace(true);
                }
                _ = &mut deadline, if run_limit.is_some() && !timed_out => {
                    timed_out = true;
                    info!(minutes = config.max_run_minutes, "Run time limit reached, stopping run");
                    shutdown.send_replace(true);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Market task failed");
            }
        }

        let summary = RunSummary::from_windows(&windows, config.tracking_model, config.min_first_leg_fills);
        state.set_summary(summary.clone()).await;
        info!(
            windows = summary.windows_seen,
            fills = counter.count(),
            verdict = %summary.verdict,
            "Run finished"
        );
        summary
    }
}

/// Apply one message. Returns true when the fill target was just reached.
async fn handle(
    message: RunnerMessage,
    state: &AppState,
    counter: &mut FillCounter,
    windows: &mut Vec<WindowMetrics>,
    config: &EngineConfig,
) -> bool {
    match message {
        RunnerMessage::Event(_) => {
            state.record_event();
            false
        }
        RunnerMessage::WindowOpened { market, slug } => {
            state.open_window(&market, &slug);
            false
        }
        RunnerMessage::TickProcessed {
            market,
            slug,
            mode,
            ticks_seen,
        } => {
            state.record_tick(&market, &slug, mode, ticks_seen);
            false
        }
        RunnerMessage::FirstLegFill { market, model } => {
            let was_reached = counter.is_reached();
            let reached = counter.record();
            state.set_first_leg_fills(counter.count());
            debug!(market = %market, model = %model, fills = counter.count(), "First-leg fill counted");
            reached && !was_reached
        }
        RunnerMessage::WindowFinished { market, metrics } => {
            state.finish_window(&market);
            windows.push(*metrics);
            let summary = RunSummary::from_windows(windows, config.tracking_model, config.min_first_leg_fills);
            state.set_summary(summary).await;
            false
        }
        RunnerMessage::Finished { market } => {
            state.finish_market(&market);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_counter_reaches_target() {
        let mut counter = FillCounter::new(2);
        assert!(!counter.record());
        assert!(counter.record());
        assert!(counter.is_reached());
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn zero_target_never_stops() {
        let mut counter = FillCounter::new(0);
        for _ in 0..10 {
            assert!(!counter.record());
        }
    }
}
