//! Window orchestrator: drives one window from its first tick to finalize.
//!
//! Per tick: validate the quote, pre-filter on the first tick, evaluate fills
//! against the resting bids, then post or reprice bids. All state lives in the
//! engine; nothing is shared with other windows.

use std::mem;

use rust_decimal::Decimal;
use smallvec::SmallVec;
use tracing::{debug, error, info, instrument, warn};

use super::completion::{CompletionController, Feasibility};
use super::events::{
    CancelCause, EngineEvent, EventLog, EventRecord, EventSink, LegFilled, ModeChanged,
    PairCompleted, QuoteCancelled, QuotePosted, WindowEnded, WindowStarted, WindowStopped,
};
use super::mode::{StopReason, WindowMode};
use super::stats::WindowMetrics;
use crate::config::EngineConfig;
use crate::error::{EngineError, InvariantViolation, QuoteError};
use crate::fills::{Fill, FillEvaluator, FillModel};
use crate::market::{Outcome, OutcomePair, Quote, Window};
use crate::metrics;
use crate::trading::lifecycle::reference_mid;
use crate::trading::{
    CancelOutcome, CancelRefusal, LegFill, LegTransition, Ledger, QuoteLifecycle, QuotePurpose,
    RestingOrder,
};

/// Tolerance for the post-hoc pair audit.
pub const AUDIT_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 9);

/// What a processed tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Fills fired this tick, in evaluation order.
    pub fills: Vec<Fill>,
    /// Models whose first leg filled this tick.
    pub first_legs: Vec<FillModel>,
    /// Models whose pair completed this tick.
    pub pairs_completed: Vec<FillModel>,
    /// Mode after the tick.
    pub mode: WindowMode,
}

/// Result of [`WindowEngine::process_tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick was applied.
    Processed(TickReport),
    /// The quote was unusable; nothing changed.
    Skipped(QuoteError),
    /// The window is halted or closed; the tick was not looked at.
    Ignored,
}

/// Engine for one window. Owns every piece of window state.
pub struct WindowEngine<S: EventSink = EventLog> {
    window: Window,
    config: EngineConfig,
    sink: S,
    seq: u64,
    mode: WindowMode,
    stop_reason: Option<StopReason>,
    evaluator: FillEvaluator,
    lifecycle: QuoteLifecycle,
    completion: CompletionController,
    ledger: Ledger,
    orders: OutcomePair<Option<RestingOrder>>,
    anchor: Option<LegFill>,
    metrics: WindowMetrics,
    last_ts_ms: Option<i64>,
    halted: bool,
    finalized: bool,
}

impl<S: EventSink> WindowEngine<S> {
    /// Open a window and log `WINDOW_START`.
    ///
    /// The config is validated first: initial bids only stay within the
    /// completion cap when `initial_edge_target >= edge_floor`.
    pub fn new(window: Window, config: &EngineConfig, sink: S) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::InvalidConfig)?;

        let mut engine = Self {
            metrics: WindowMetrics::new(&window),
            evaluator: FillEvaluator::new(config.fill_params()),
            lifecycle: QuoteLifecycle::new(config),
            completion: CompletionController::new(config),
            config: config.clone(),
            sink,
            seq: 0,
            mode: WindowMode::Normal,
            stop_reason: None,
            ledger: Ledger::new(),
            orders: OutcomePair::default(),
            anchor: None,
            last_ts_ms: None,
            halted: false,
            finalized: false,
            window,
        };

        info!(window = %engine.window.slug, "Window started");
        let started = WindowStarted {
            start_ts: engine.window.start_ts,
            end_ts: engine.window.end_ts,
        };
        engine.emit(engine.window.start_ts * 1000, EngineEvent::WindowStart(started));
        Ok(engine)
    }

    /// Process one quote. Call once per poll, in arrival order.
    ///
    /// Returns `Err` only for an invariant violation; the window is stopped and
    /// every later tick is ignored.
    #[instrument(skip(self, quote), fields(window = %self.window.slug, ts_ms = quote.ts_ms))]
    pub fn process_tick(&mut self, quote: &Quote) -> Result<TickOutcome, EngineError> {
        if self.finalized || self.halted {
            return Ok(TickOutcome::Ignored);
        }
        let _timer = metrics::timer_tick();

        if let Err(err) = self.admit(quote) {
            self.metrics.ticks_skipped += 1;
            metrics::inc_ticks_skipped(err.label());
            debug!(error = %err, "Tick skipped");
            return Ok(TickOutcome::Skipped(err));
        }

        let elapsed_ms = self.last_ts_ms.map(|prev| quote.ts_ms - prev);
        self.last_ts_ms = Some(quote.ts_ms);
        self.metrics.ticks_seen += 1;
        self.metrics.observe_mid(quote.mid_or_ask(Outcome::Up));
        metrics::inc_ticks_processed();

        let mut report = TickReport::default();

        if self.metrics.ticks_seen == 1 {
            self.prefilter(quote);
        }

        let remaining = self.window.seconds_remaining(quote.ts_ms);
        if !self.mode.is_stopped() && remaining <= Decimal::from(self.config.force_stop_secs) {
            self.stop(
                quote.ts_ms,
                StopReason::ForceStop,
                format!("{} remaining", self.window.time_remaining_str(quote.ts_ms)),
            );
        }

        if self.mode.is_stopped() {
            self.cancel_resting(quote.ts_ms);
        } else {
            let checked = self.check_fills(quote, &mut report);
            if let Err(e) = checked {
                self.sync_lifecycle_counters();
                return Err(e);
            }
            self.update_quotes(quote, elapsed_ms);
        }

        self.sync_lifecycle_counters();
        report.mode = self.mode;
        Ok(TickOutcome::Processed(report))
    }

    /// Close out the window: final metrics and `WINDOW_END`.
    pub fn finalize(mut self) -> WindowMetrics {
        self.close_out()
    }

    /// Close out and hand back the sink with the full event log.
    pub fn finalize_with_events(mut self) -> (WindowMetrics, S)
    where
        S: Default,
    {
        let metrics = self.close_out();
        (metrics, mem::take(&mut self.sink))
    }

    /// The window being traded.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Current mode.
    pub fn mode(&self) -> WindowMode {
        self.mode
    }

    /// Why the window stopped, once stopped.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Per-model positions.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Latest bid on one side, live or not.
    pub fn resting(&self, outcome: Outcome) -> Option<&RestingOrder> {
        self.orders.get(outcome).as_ref()
    }

    /// The window's earliest first-leg fill.
    pub fn anchor(&self) -> Option<&LegFill> {
        self.anchor.as_ref()
    }

    /// Metrics so far.
    pub fn metrics(&self) -> &WindowMetrics {
        &self.metrics
    }

    /// The event sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// An invariant violation halted the window.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    fn admit(&self, quote: &Quote) -> Result<(), QuoteError> {
        quote.validate()?;
        if let Some(last_ts_ms) = self.last_ts_ms {
            if quote.ts_ms <= last_ts_ms {
                return Err(QuoteError::OutOfOrder {
                    ts_ms: quote.ts_ms,
                    last_ts_ms,
                });
            }
        }
        Ok(())
    }

    fn prefilter(&mut self, quote: &Quote) {
        let distance = quote.price_distance();
        let threshold = self.config.prefilter_max_price_distance;

        self.metrics.price_distance = distance;
        self.metrics.mid_up_at_start = quote.mid_or_ask(Outcome::Up);
        self.metrics.passed_prefilter = distance <= threshold;

        if !self.metrics.passed_prefilter {
            info!(distance = %distance, threshold = %threshold, "Window skipped by pre-filter");
            self.stop(
                quote.ts_ms,
                StopReason::Prefilter,
                format!("price_distance {distance} > {threshold}"),
            );
        }
    }

    fn check_fills(&mut self, quote: &Quote, report: &mut TickReport) -> Result<(), EngineError> {
        let mut fired: SmallVec<[Fill; 6]> = SmallVec::new();
        for outcome in Outcome::BOTH {
            if let Some(order) = self.orders.get_mut(outcome) {
                fired.extend(self.evaluator.evaluate(order, quote));
            }
        }

        // Book every fill before auditing so orders and ledger never disagree.
        let applied: SmallVec<[(Fill, LegTransition); 6]> = fired
            .into_iter()
            .map(|fill| {
                let transition = self.ledger.apply(&fill);
                (fill, transition)
            })
            .collect();

        for (fill, transition) in applied {
            report.fills.push(fill);
            metrics::inc_fills(fill.model);

            match transition {
                LegTransition::FirstLeg => self.on_first_leg(&fill, quote, report),
                LegTransition::PairCompleted => self.on_pair_complete(&fill, report)?,
                LegTransition::Added => {
                    debug!(model = %fill.model, side = %fill.outcome, qty = %fill.qty, "Fill added to leg")
                }
                LegTransition::Rejected => {
                    warn!(model = %fill.model, qty = %fill.qty, "Fill rejected by ledger")
                }
            }
        }
        Ok(())
    }

    fn on_first_leg(&mut self, fill: &Fill, quote: &Quote, report: &mut TickReport) {
        self.metrics.model_mut(fill.model).first_leg_fills += 1;
        metrics::inc_first_leg_fills(fill.model);
        report.first_legs.push(fill.model);

        if self.anchor.is_none() {
            self.anchor = Some(LegFill::from(fill));
            self.metrics.first_fill_ts_ms = Some(fill.ts_ms);
        }

        let other = fill.outcome.opposite();
        let max_completion = self
            .completion
            .max_completion_price(WindowMode::Normal, fill.price);
        let other_ask = quote.ask(other);
        let can_complete = other_ask <= max_completion;

        info!(
            model = %fill.model,
            side = %fill.outcome,
            price = %fill.price,
            max_comp = %max_completion,
            other_ask = %other_ask,
            can_complete,
            "First leg filled"
        );

        self.emit(
            fill.ts_ms,
            EngineEvent::FirstLegFill(LegFilled {
                model: fill.model,
                side: fill.outcome,
                price: fill.price,
                qty: fill.qty,
                max_completion_at_edge: max_completion,
                other_side_ask: other_ask,
                other_side_bid: quote.bid(other),
                can_complete_at_edge: can_complete,
                edge_floor: self.config.edge_floor,
            }),
        );
    }

    fn on_pair_complete(&mut self, fill: &Fill, report: &mut TickReport) -> Result<(), EngineError> {
        let entry = self.ledger.model(fill.model);
        let Some(first) = entry.first_leg else {
            return Ok(());
        };
        let pos = entry.position.clone();

        let side_first = first.outcome;
        let side_comp = side_first.opposite();
        let p_first = pos.avg(side_first);
        let p_comp = pos.avg(side_comp);
        let q_matched = pos.hedged_qty();
        let cost_total = pos.cost_up + pos.cost_down;
        let pair_cost = p_first + p_comp;
        let edge_net = Decimal::ONE - pair_cost;

        let cap_normal = self
            .completion
            .max_completion_price(WindowMode::Normal, p_first);
        let cap_used = self.completion.max_completion_price(self.mode, p_first);
        let realized_loss = (pair_cost - Decimal::ONE).max(Decimal::ZERO) * q_matched;
        let price_ok = p_comp <= cap_used + AUDIT_EPSILON;
        let loss_ok = realized_loss <= self.config.loss_cap + AUDIT_EPSILON;
        let invariant_ok = price_ok && loss_ok;

        if self.metrics.completion_ts_ms.is_none() {
            self.metrics.completion_ts_ms = Some(fill.ts_ms);
            self.metrics.time_to_complete_ms =
                self.metrics.first_fill_ts_ms.map(|first_ts| fill.ts_ms - first_ts);
        }
        let model_metrics = self.metrics.model_mut(fill.model);
        model_metrics.completed_pairs += 1;
        model_metrics.edge_nets.push(edge_net);
        metrics::record_pair_completed(fill.model, edge_net);
        report.pairs_completed.push(fill.model);

        info!(
            model = %fill.model,
            mode = %self.mode,
            p_first = %p_first,
            p_comp = %p_comp,
            pair_cost = %pair_cost,
            edge_net = %edge_net,
            invariant_ok,
            "Pair complete"
        );

        self.emit(
            fill.ts_ms,
            EngineEvent::PairComplete(PairCompleted {
                model: fill.model,
                window_mode: self.mode,
                side_first,
                p_first,
                q_first: pos.qty(side_first),
                side_comp,
                p_comp,
                q_comp: pos.qty(side_comp),
                q_matched,
                cost_total,
                payout_locked: q_matched,
                edge_locked: q_matched - cost_total,
                pair_cost,
                completion_cap_normal: cap_normal,
                completion_cap_used: cap_used,
                realized_loss,
                invariant_ok,
                edge_net_per_pair: edge_net,
                time_to_complete_ms: self.metrics.time_to_complete_ms,
            }),
        );

        if invariant_ok {
            return Ok(());
        }

        let reason = if price_ok {
            "realized loss above loss cap"
        } else {
            "completion price above cap"
        };
        let violation = InvariantViolation {
            model: fill.model,
            mode: self.mode,
            p_first,
            p_comp,
            cap: cap_used,
            realized_loss,
            reason: reason.to_string(),
        };
        Err(self.halt(fill.ts_ms, violation))
    }

    fn halt(&mut self, ts_ms: i64, violation: InvariantViolation) -> EngineError {
        error!(
            model = %violation.model,
            mode = %violation.mode,
            p_first = %violation.p_first,
            p_comp = %violation.p_comp,
            cap = %violation.cap,
            realized_loss = %violation.realized_loss,
            reason = %violation.reason,
            "Completion invariant violated, halting window"
        );
        metrics::inc_invariant_violations();
        self.stop(ts_ms, StopReason::InvariantViolation, violation.to_string());
        self.cancel_resting(ts_ms);
        self.halted = true;
        EngineError::Invariant(violation)
    }

    fn update_quotes(&mut self, quote: &Quote, elapsed_ms: Option<i64>) {
        let remaining = self.window.seconds_remaining(quote.ts_ms);

        self.track_unhedged(elapsed_ms);

        match self.anchor {
            None => {
                if remaining > Decimal::from(self.config.stop_new_entries_secs) {
                    self.post_initial_quotes(quote);
                }
            }
            Some(anchor) => {
                if self.ledger.needs(anchor.outcome.opposite()) {
                    self.update_completion(quote, anchor, remaining);
                }
            }
        }
    }

    fn track_unhedged(&mut self, elapsed_ms: Option<i64>) {
        let tracked = self.ledger.model(self.config.tracking_model);
        if tracked.is_unhedged() {
            self.metrics.time_unhedged_ms += elapsed_ms.unwrap_or(0);
            self.metrics.max_unhedged_exposure = self
                .metrics
                .max_unhedged_exposure
                .max(tracked.position.max_loss());
        }
    }

    fn post_initial_quotes(&mut self, quote: &Quote) {
        let Some(bids) = self.lifecycle.initial_bids(quote) else {
            debug!("No initial bids fit the edge target");
            return;
        };

        for outcome in Outcome::BOTH {
            let open = self
                .resting(outcome)
                .is_some_and(|order| !order.is_cancelled());
            if !open {
                self.post(quote, outcome, *bids.get(outcome), QuotePurpose::Initial, None);
            }
        }
    }

    fn update_completion(&mut self, quote: &Quote, anchor: LegFill, remaining: Decimal) {
        let now = quote.ts_ms;
        let target = anchor.outcome.opposite();

        if self.mode == WindowMode::Normal {
            match self.completion.assess(anchor.price, quote.ask(target)) {
                Feasibility::Feasible => {}
                Feasibility::Rescue {
                    normal_cap,
                    rescue_loss,
                } => self.enter_rescue(quote, &anchor, normal_cap, rescue_loss),
                Feasibility::Infeasible {
                    normal_cap,
                    rescue_loss,
                } => {
                    warn!(
                        rescue_loss = %rescue_loss,
                        loss_cap = %self.config.loss_cap,
                        "Rescue exceeds loss cap, stopping window"
                    );
                    self.stop(
                        now,
                        StopReason::RescueExceedsLossCap,
                        format!(
                            "max_price({normal_cap}) < best_ask({}); rescue_loss {rescue_loss} > loss_cap {}",
                            quote.ask(target),
                            self.config.loss_cap
                        ),
                    );
                    self.cancel_resting(now);
                    return;
                }
            }
        }

        let cap = self.completion.max_completion_price(self.mode, anchor.price);
        let Some(price) = self.completion.completion_price(
            self.mode,
            anchor.price,
            reference_mid(quote, target),
            remaining,
            self.window.duration_secs(),
        ) else {
            debug!(cap = %cap, "Completion cap below minimum price");
            return;
        };

        let current = self
            .resting(target)
            .filter(|order| order.is_active())
            .map(|order| order.price);

        match current {
            None => self.post(quote, target, price, QuotePurpose::Completion, Some(cap)),
            Some(current) if self.lifecycle.should_replace(current, price) => {
                self.replace(quote, target, price, cap)
            }
            Some(_) => {}
        }
    }

    fn enter_rescue(&mut self, quote: &Quote, anchor: &LegFill, normal_cap: Decimal, rescue_loss: Decimal) {
        let from = self.mode;
        if !self.transition(WindowMode::Rescue) {
            return;
        }
        self.metrics.rescue_triggered = true;

        let target = anchor.outcome.opposite();
        let other_ask = quote.ask(target);
        let reason = format!("max_price({normal_cap}) < best_ask({other_ask})");
        warn!(reason = %reason, rescue_loss = %rescue_loss, "Entering rescue mode");

        self.emit(
            quote.ts_ms,
            EngineEvent::RescueModeEnter(ModeChanged {
                from,
                to: WindowMode::Rescue,
                reason,
                max_completion_price: normal_cap,
                other_best_ask: other_ask,
                other_best_bid: quote.bid(target),
                first_leg_price: anchor.price,
                rescue_loss,
                loss_cap: self.config.loss_cap,
            }),
        );
    }

    fn replace(&mut self, quote: &Quote, outcome: Outcome, price: Decimal, cap: Decimal) {
        let now = quote.ts_ms;
        let Some(order) = self.orders.get_mut(outcome).as_mut() else {
            return;
        };

        match self.lifecycle.cancel(order, now) {
            CancelOutcome::Cancelled { lifetime_ms } => {
                let (order_id, old_price) = (order.id, order.price);
                self.on_cancelled(now, order_id, outcome, old_price, lifetime_ms, CancelCause::Replace);
                self.lifecycle.record_replace();
                debug!(side = %outcome, old = %old_price, new = %price, "Replacing completion bid");
                self.post(quote, outcome, price, QuotePurpose::Completion, Some(cap));
            }
            CancelOutcome::Refused(refusal) => self.on_refused(refusal),
        }
    }

    /// Pull every live bid. Refused cancels are retried on later ticks.
    fn cancel_resting(&mut self, now: i64) {
        for outcome in Outcome::BOTH {
            let Some(order) = self
                .orders
                .get_mut(outcome)
                .as_mut()
                .filter(|order| order.is_active())
            else {
                continue;
            };

            match self.lifecycle.cancel(order, now) {
                CancelOutcome::Cancelled { lifetime_ms } => {
                    let (order_id, price) = (order.id, order.price);
                    self.on_cancelled(now, order_id, outcome, price, lifetime_ms, CancelCause::Stop);
                }
                CancelOutcome::Refused(refusal) => self.on_refused(refusal),
            }
        }
    }

    fn post(
        &mut self,
        quote: &Quote,
        outcome: Outcome,
        price: Decimal,
        purpose: QuotePurpose,
        cap: Option<Decimal>,
    ) {
        let mut order = self.lifecycle.post(outcome, price, purpose, quote);
        // A model buys at most one clip per side.
        for model in FillModel::ALL {
            if self.ledger.holds(model, outcome) {
                order.inherit_fill(model);
            }
        }

        let invariant_ok = cap.map_or(true, |cap| price <= cap);
        metrics::inc_quotes_posted(purpose);
        debug!(side = %outcome, price = %price, purpose = %purpose, "Bid posted");

        self.emit(
            quote.ts_ms,
            EngineEvent::QuotePost(QuotePosted {
                order_id: order.id,
                side: outcome,
                purpose,
                price,
                size: order.size,
                book_size: order.initial_book_size,
                mode: self.mode,
                cap,
                invariant_ok,
            }),
        );
        *self.orders.get_mut(outcome) = Some(order);
    }

    fn on_cancelled(
        &mut self,
        now: i64,
        order_id: u64,
        outcome: Outcome,
        price: Decimal,
        lifetime_ms: i64,
        cause: CancelCause,
    ) {
        metrics::inc_cancels();
        debug!(order_id, side = %outcome, lifetime_ms, cause = %cause, "Bid cancelled");
        self.emit(
            now,
            EngineEvent::QuoteCancel(QuoteCancelled {
                order_id,
                side: outcome,
                price,
                lifetime_ms,
                cause,
            }),
        );
    }

    fn on_refused(&mut self, refusal: CancelRefusal) {
        metrics::inc_cancel_refusals(refusal.label());
    }

    fn transition(&mut self, to: WindowMode) -> bool {
        if !self.mode.can_transition_to(to) {
            return false;
        }
        self.mode = to;
        metrics::inc_mode_transitions(to);
        true
    }

    fn stop(&mut self, ts_ms: i64, reason: StopReason, detail: String) {
        let from = self.mode;
        if !self.transition(WindowMode::Stopped) {
            return;
        }
        self.stop_reason = Some(reason);
        metrics::inc_window_stops(reason);
        info!(reason = %reason, detail = %detail, "Window stopped");
        self.emit(
            ts_ms,
            EngineEvent::WindowStop(WindowStopped {
                from,
                reason,
                detail,
            }),
        );
    }

    fn sync_lifecycle_counters(&mut self) {
        self.metrics.quotes_posted = self.lifecycle.posted();
        self.metrics.cancels = self.lifecycle.cancels();
        self.metrics.replaces = self.lifecycle.replaces();
        self.metrics.cancel_refusals = self.lifecycle.refusals();
        self.metrics.quote_lifetimes_ms = self.lifecycle.lifetimes_ms().to_vec();
    }

    fn emit(&mut self, ts_ms: i64, event: EngineEvent) {
        let record = EventRecord {
            seq: self.seq,
            ts_ms,
            slug: self.window.slug.clone(),
            event,
        };
        self.seq += 1;
        self.sink.record(record);
    }

    fn close_out(&mut self) -> WindowMetrics {
        self.finalized = true;
        self.sync_lifecycle_counters();
        self.metrics
            .finalize(self.mode, self.stop_reason, &self.ledger);
        metrics::inc_windows_finalized();

        info!(
            window = %self.window.slug,
            mode = %self.mode,
            ticks = self.metrics.ticks_seen,
            quotes = self.metrics.quotes_posted,
            rescue = self.metrics.rescue_triggered,
            "Window finalized"
        );

        let ts_ms = self.last_ts_ms.unwrap_or(self.window.end_ts * 1000);
        let ended = WindowEnded {
            metrics: self.metrics.clone(),
        };
        self.emit(ts_ms, EngineEvent::WindowEnd(Box::new(ended)));
        mem::take(&mut self.metrics)
    }
}

impl<S: EventSink> Drop for WindowEngine<S> {
    fn drop(&mut self) {
        if !self.finalized {
            warn!(window = %self.window.slug, "Window dropped without finalize, closing out");
            self.close_out();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const START: i64 = 1_765_301_400;

    fn window() -> Window {
        Window::new(format!("btc-updown-15m-{START}"), START, START + 900)
    }

    /// Quote `secs` into the window.
    fn tick(secs: i64, bid_up: Decimal, ask_up: Decimal, bid_down: Decimal, ask_down: Decimal) -> Quote {
        Quote {
            ts_ms: (START + secs) * 1000,
            bid_up,
            ask_up,
            size_ask_up: dec!(100),
            bid_down,
            ask_down,
            size_ask_down: dec!(100),
        }
    }

    fn engine() -> WindowEngine {
        WindowEngine::new(window(), &EngineConfig::default(), EventLog::new()).unwrap()
    }

    fn names(engine: &WindowEngine) -> Vec<&'static str> {
        engine.sink().records().iter().map(|r| r.event.name()).collect()
    }

    #[test]
    fn first_tick_posts_two_sided_quotes() {
        let mut e = engine();
        let q = tick(10, dec!(0.48), dec!(0.50), dec!(0.49), dec!(0.51));

        let outcome = e.process_tick(&q).unwrap();
        assert!(matches!(outcome, TickOutcome::Processed(_)));

        let up = e.resting(Outcome::Up).unwrap();
        let down = e.resting(Outcome::Down).unwrap();
        assert_eq!(up.price, dec!(0.48));
        assert_eq!(down.price, dec!(0.49));
        assert!(up.price + down.price <= dec!(0.985));
        assert_eq!(names(&e), vec!["WINDOW_START", "QUOTE_POST", "QUOTE_POST"]);
    }

    #[test]
    fn invalid_quote_is_skipped_without_state_change() {
        let mut e = engine();
        let bad = tick(10, dec!(0.48), dec!(0), dec!(0.49), dec!(0.51));

        let outcome = e.process_tick(&bad).unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Skipped(QuoteError::MissingAsk { outcome: Outcome::Up })
        );
        assert!(e.resting(Outcome::Up).is_none());
        assert_eq!(e.metrics().ticks_seen, 0);
        assert_eq!(e.metrics().ticks_skipped, 1);
    }

    #[test]
    fn stale_quote_is_skipped() {
        let mut e = engine();
        let q = tick(10, dec!(0.48), dec!(0.50), dec!(0.49), dec!(0.51));
        e.process_tick(&q).unwrap();

        let outcome = e.process_tick(&q).unwrap();
        assert!(matches!(
            outcome,
            TickOutcome::Skipped(QuoteError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn no_initial_quotes_after_entry_cutoff() {
        let mut e = engine();
        let q = tick(780, dec!(0.48), dec!(0.50), dec!(0.49), dec!(0.51));
        e.process_tick(&q).unwrap();

        assert!(e.resting(Outcome::Up).is_none());
        assert_eq!(e.mode(), WindowMode::Normal);
    }

    #[test]
    fn force_stop_cancels_and_stops() {
        let mut e = engine();
        e.process_tick(&tick(10, dec!(0.48), dec!(0.50), dec!(0.49), dec!(0.51)))
            .unwrap();
        e.process_tick(&tick(875, dec!(0.48), dec!(0.50), dec!(0.49), dec!(0.51)))
            .unwrap();

        assert_eq!(e.mode(), WindowMode::Stopped);
        assert_eq!(e.stop_reason(), Some(StopReason::ForceStop));
        assert!(e.resting(Outcome::Up).unwrap().is_cancelled());
        assert!(e.resting(Outcome::Down).unwrap().is_cancelled());
    }

    #[test]
    fn finalize_emits_window_end_once() {
        let mut e = engine();
        e.process_tick(&tick(10, dec!(0.48), dec!(0.50), dec!(0.49), dec!(0.51)))
            .unwrap();

        let (metrics, log) = e.finalize_with_events();
        assert_eq!(metrics.ticks_seen, 1);
        assert_eq!(metrics.quotes_posted, 2);
        assert_eq!(log.named("WINDOW_END").count(), 1);

        let seqs: Vec<u64> = log.records().iter().map(|r| r.seq).collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn config_that_lets_initial_bids_breach_the_cap_is_rejected() {
        // Initial pairs at 0.97 would leave 0.03 edge against a 0.05 floor.
        let config = EngineConfig {
            edge_floor: dec!(0.05),
            edge_floor_rescue: dec!(0.05),
            initial_edge_target: dec!(0),
            ..EngineConfig::default()
        };

        let err = WindowEngine::new(window(), &config, EventLog::new()).err();
        assert!(matches!(err, Some(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn initial_bids_complete_within_the_cap() {
        let mut e = engine();
        e.process_tick(&tick(10, dec!(0.48), dec!(0.50), dec!(0.49), dec!(0.51)))
            .unwrap();
        e.process_tick(&tick(12, dec!(0.46), dec!(0.48), dec!(0.49), dec!(0.51)))
            .unwrap();
        // The untouched initial Down bid completes the pair.
        e.process_tick(&tick(14, dec!(0.48), dec!(0.50), dec!(0.47), dec!(0.49)))
            .unwrap();

        let pair = e.ledger().position(FillModel::Optimistic);
        assert_eq!(pair.pair_cost(), Some(dec!(0.97)));
        assert!(!e.is_halted());
        assert!(e
            .sink()
            .records()
            .iter()
            .all(|r| !matches!(&r.event, EngineEvent::PairComplete(p) if !p.invariant_ok)));
    }

    #[test]
    fn failed_audit_keeps_orders_and_ledger_in_step() {
        let mut e = engine();
        e.process_tick(&tick(10, dec!(0.48), dec!(0.50), dec!(0.49), dec!(0.51)))
            .unwrap();
        // Down crosses for three ticks: optimistic first leg now, persistent on the third.
        e.process_tick(&tick(12, dec!(0.48), dec!(0.50), dec!(0.47), dec!(0.49)))
            .unwrap();
        e.process_tick(&tick(13, dec!(0.48), dec!(0.50), dec!(0.47), dec!(0.49)))
            .unwrap();

        // Tighten the cap so the optimistic completion on Up fails its audit.
        let strict = EngineConfig {
            edge_floor: dec!(0.05),
            edge_floor_rescue: dec!(0.05),
            ..EngineConfig::default()
        };
        e.completion = CompletionController::new(&strict);

        let err = e
            .process_tick(&tick(14, dec!(0.46), dec!(0.48), dec!(0.47), dec!(0.49)))
            .unwrap_err();
        let EngineError::Invariant(violation) = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(violation.model, FillModel::Optimistic);
        assert_eq!(violation.cap, dec!(0.46));
        assert!(e.is_halted());
        assert_eq!(e.stop_reason(), Some(StopReason::InvariantViolation));

        // The persistent Down fill evaluated after the failing one is still booked.
        let down = e.resting(Outcome::Down).unwrap();
        assert!(down.is_filled(FillModel::Persistent));
        assert_eq!(e.ledger().position(FillModel::Persistent).qty_down, dec!(5));

        let later = e
            .process_tick(&tick(16, dec!(0.46), dec!(0.48), dec!(0.47), dec!(0.49)))
            .unwrap();
        assert!(matches!(later, TickOutcome::Ignored));
    }

    #[test]
    fn force_stop_tick_evaluates_no_fills() {
        let mut e = engine();
        e.process_tick(&tick(10, dec!(0.48), dec!(0.50), dec!(0.49), dec!(0.51)))
            .unwrap();

        // Both asks trade through the bids at 29s remaining.
        let outcome = e
            .process_tick(&tick(871, dec!(0.44), dec!(0.46), dec!(0.45), dec!(0.47)))
            .unwrap();
        let TickOutcome::Processed(report) = outcome else {
            panic!("tick not processed: {outcome:?}");
        };

        assert!(report.fills.is_empty());
        assert_eq!(e.stop_reason(), Some(StopReason::ForceStop));
        assert!(e.ledger().position(FillModel::Optimistic).is_empty());
        assert!(e.resting(Outcome::Up).unwrap().is_cancelled());
    }

    #[test]
    fn dropped_engine_still_closes_out() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<EventRecord>();
        {
            let mut e = WindowEngine::new(
                window(),
                &EngineConfig::default(),
                crate::engine::ChannelSink::new(tx),
            )
            .unwrap();
            e.process_tick(&tick(10, dec!(0.48), dec!(0.50), dec!(0.49), dec!(0.51)))
                .unwrap();
        }

        let mut names = Vec::new();
        while let Ok(record) = rx.try_recv() {
            names.push(record.event.name());
        }
        assert_eq!(names.last(), Some(&"WINDOW_END"));
    }
}
