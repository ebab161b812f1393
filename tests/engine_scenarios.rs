//! End-to-end window scenarios.

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use paircap::config::EngineConfig;
use paircap::engine::{
    CompletionController, EngineEvent, EventLog, StopReason, TickOutcome, WindowEngine, WindowMode,
};
use paircap::fills::{FillEvaluator, FillModel};
use paircap::market::{Outcome, Quote, Window};
use paircap::trading::{QuoteLifecycle, QuotePurpose};

const START: i64 = 1_765_301_400;

fn window() -> Window {
    Window::new(format!("btc-updown-15m-{START}"), START, START + 900)
}

/// Book `secs` into the window, `(bid, ask)` per side, 100 shares at each ask.
fn book(secs: i64, up: (Decimal, Decimal), down: (Decimal, Decimal)) -> Quote {
    Quote {
        ts_ms: (START + secs) * 1000,
        bid_up: up.0,
        ask_up: up.1,
        size_ask_up: dec!(100),
        bid_down: down.0,
        ask_down: down.1,
        size_ask_down: dec!(100),
    }
}

fn names(log: &EventLog) -> Vec<&'static str> {
    log.records().iter().map(|r| r.event.name()).collect()
}

/// Config whose pre-filter admits a 0.61/0.39 book.
fn wide_prefilter() -> EngineConfig {
    EngineConfig {
        prefilter_max_price_distance: dec!(0.30),
        ..EngineConfig::default()
    }
}

#[test]
fn sustained_cross_fires_models_in_order() {
    let config = EngineConfig::default();
    let evaluator = FillEvaluator::new(config.fill_params());
    let mut lifecycle = QuoteLifecycle::new(&config);

    let posted_at = book(0, (dec!(0.86), dec!(0.90)), (dec!(0.08), dec!(0.10)));
    let mut order = lifecycle.post(Outcome::Up, dec!(0.90), QuotePurpose::Initial, &posted_at);

    // Depth at 0.88 drains from 100 to 70 over six crossing ticks.
    let sizes = [dec!(100), dec!(95), dec!(90), dec!(85), dec!(80), dec!(70)];
    let mut fired: Vec<(usize, FillModel, Decimal)> = Vec::new();
    for (i, size) in sizes.into_iter().enumerate() {
        let mut quote = book(i as i64 + 1, (dec!(0.86), dec!(0.88)), (dec!(0.10), dec!(0.12)));
        quote.size_ask_up = size;
        for fill in evaluator.evaluate(&mut order, &quote) {
            fired.push((i + 1, fill.model, fill.qty));
        }
    }

    assert_eq!(
        fired,
        vec![
            (1, FillModel::Optimistic, dec!(5)),
            (3, FillModel::Persistent, dec!(5)),
            (6, FillModel::QueueAware, dec!(2.5)),
        ]
    );
}

#[test]
fn prefilter_stops_lopsided_window_without_quotes() {
    let mut engine = WindowEngine::new(window(), &EngineConfig::default(), EventLog::new()).unwrap();
    let lopsided = book(5, (dec!(0.84), dec!(0.86)), (dec!(0.14), dec!(0.16)));

    engine.process_tick(&lopsided).unwrap();
    assert_eq!(engine.mode(), WindowMode::Stopped);
    assert_eq!(engine.stop_reason(), Some(StopReason::Prefilter));

    // Later ticks never quote either.
    engine
        .process_tick(&book(10, (dec!(0.48), dec!(0.50)), (dec!(0.49), dec!(0.51))))
        .unwrap();

    let (metrics, log) = engine.finalize_with_events();
    assert!(!metrics.passed_prefilter);
    assert_eq!(metrics.price_distance, dec!(0.70));
    assert_eq!(metrics.quotes_posted, 0);
    assert_eq!(log.named("QUOTE_POST").count(), 0);
    assert_eq!(names(&log), vec!["WINDOW_START", "WINDOW_STOP", "WINDOW_END"]);
}

#[test]
fn completion_at_normal_cap_locks_edge() {
    let mut engine = WindowEngine::new(window(), &EngineConfig::default(), EventLog::new()).unwrap();

    // Posts Up 0.48 / Down 0.49.
    engine
        .process_tick(&book(10, (dec!(0.48), dec!(0.50)), (dec!(0.49), dec!(0.51))))
        .unwrap();
    // Up ask trades down to our bid: first leg.
    let outcome = engine
        .process_tick(&book(12, (dec!(0.46), dec!(0.48)), (dec!(0.49), dec!(0.51))))
        .unwrap();
    let TickOutcome::Processed(report) = outcome else {
        panic!("tick not processed: {outcome:?}");
    };
    assert_eq!(report.first_legs, vec![FillModel::Optimistic]);
    assert_eq!(engine.anchor().map(|a| a.price), Some(dec!(0.48)));

    // Down ask trades down to our bid: pair complete.
    let outcome = engine
        .process_tick(&book(14, (dec!(0.48), dec!(0.50)), (dec!(0.47), dec!(0.49))))
        .unwrap();
    let TickOutcome::Processed(report) = outcome else {
        panic!("tick not processed: {outcome:?}");
    };
    assert_eq!(report.pairs_completed, vec![FillModel::Optimistic]);
    assert_eq!(report.mode, WindowMode::Normal);

    let (metrics, log) = engine.finalize_with_events();
    let pair = log
        .named("PAIR_COMPLETE")
        .find_map(|r| match &r.event {
            EngineEvent::PairComplete(p) => Some(p.clone()),
            _ => None,
        })
        .unwrap();

    assert!(pair.invariant_ok);
    assert_eq!(pair.side_first, Outcome::Up);
    assert_eq!(pair.p_first, dec!(0.48));
    assert_eq!(pair.p_comp, dec!(0.49));
    assert_eq!(pair.pair_cost, dec!(0.97));
    assert_eq!(pair.completion_cap_normal, dec!(0.515));
    assert!(pair.pair_cost <= Decimal::ONE - dec!(0.005));
    assert_eq!(pair.time_to_complete_ms, Some(2_000));

    let optimistic = metrics.model(FillModel::Optimistic);
    assert_eq!(optimistic.completed_pairs, 1);
    assert_eq!(optimistic.edge_nets, vec![dec!(0.03)]);
    assert_eq!(optimistic.unhedged_qty, dec!(0));
    assert_eq!(metrics.model(FillModel::QueueAware).completed_pairs, 0);
}

#[test]
fn ask_above_normal_cap_enters_rescue_and_completes_at_break_even_cap() {
    let controller = CompletionController::new(&EngineConfig::default());
    assert_eq!(controller.max_completion_price(WindowMode::Normal, dec!(0.60)), dec!(0.395));
    assert_eq!(controller.max_completion_price(WindowMode::Rescue, dec!(0.60)), dec!(0.40));

    let mut engine = WindowEngine::new(window(), &wide_prefilter(), EventLog::new()).unwrap();

    // Posts Up 0.60 / Down 0.38.
    engine
        .process_tick(&book(10, (dec!(0.60), dec!(0.62)), (dec!(0.38), dec!(0.40))))
        .unwrap();
    assert_eq!(engine.resting(Outcome::Up).map(|o| o.price), Some(dec!(0.60)));
    assert_eq!(engine.resting(Outcome::Down).map(|o| o.price), Some(dec!(0.38)));

    // First leg at 0.60; Down ask 0.40 is above the 0.395 normal cap.
    engine
        .process_tick(&book(12, (dec!(0.58), dec!(0.60)), (dec!(0.38), dec!(0.40))))
        .unwrap();
    assert_eq!(engine.mode(), WindowMode::Rescue);

    // Late in the window the completion bid is repriced toward the 0.40 cap.
    engine
        .process_tick(&book(860, (dec!(0.60), dec!(0.62)), (dec!(0.38), dec!(0.40))))
        .unwrap();
    let completion = engine.resting(Outcome::Down).unwrap();
    assert_eq!(completion.purpose, QuotePurpose::Completion);
    assert_eq!(completion.price, dec!(0.3986));
    assert!(completion.price <= dec!(0.40));

    engine
        .process_tick(&book(865, (dec!(0.60), dec!(0.62)), (dec!(0.37), dec!(0.39))))
        .unwrap();
    assert_eq!(engine.mode(), WindowMode::Rescue);

    let (metrics, log) = engine.finalize_with_events();
    assert!(metrics.rescue_triggered);
    assert_eq!(metrics.replaces, 1);

    let rescue = log
        .named("RESCUE_MODE_ENTER")
        .find_map(|r| match &r.event {
            EngineEvent::RescueModeEnter(m) => Some(m.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(rescue.max_completion_price, dec!(0.395));
    assert_eq!(rescue.other_best_ask, dec!(0.40));
    assert_eq!(rescue.rescue_loss, dec!(0));

    let pair = log
        .named("PAIR_COMPLETE")
        .find_map(|r| match &r.event {
            EngineEvent::PairComplete(p) => Some(p.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(pair.window_mode, WindowMode::Rescue);
    assert_eq!(pair.completion_cap_used, dec!(0.40));
    assert_eq!(pair.p_comp, dec!(0.3986));
    assert_eq!(pair.realized_loss, dec!(0));
    assert!(pair.invariant_ok);
}

#[test]
fn unaffordable_rescue_stops_and_cancels() {
    let mut engine = WindowEngine::new(window(), &wide_prefilter(), EventLog::new()).unwrap();

    engine
        .process_tick(&book(10, (dec!(0.60), dec!(0.62)), (dec!(0.38), dec!(0.40))))
        .unwrap();
    // First leg at 0.60 while Down asks 0.60: rescue would lose 0.20 x 5 = 1.00 > 0.50.
    engine
        .process_tick(&book(13, (dec!(0.58), dec!(0.60)), (dec!(0.38), dec!(0.60))))
        .unwrap();

    assert_eq!(engine.mode(), WindowMode::Stopped);
    assert_eq!(engine.stop_reason(), Some(StopReason::RescueExceedsLossCap));
    assert!(engine.resting(Outcome::Up).unwrap().is_cancelled());
    assert!(engine.resting(Outcome::Down).unwrap().is_cancelled());

    let (metrics, log) = engine.finalize_with_events();
    assert_eq!(log.named("QUOTE_CANCEL").count(), 2);
    assert_eq!(log.named("RESCUE_MODE_ENTER").count(), 0);
    assert_eq!(metrics.model(FillModel::Optimistic).unhedged_qty, dec!(5));
    assert_eq!(metrics.model(FillModel::Optimistic).max_loss, dec!(3.00));
}

#[test]
fn cancels_wait_for_minimum_lifetime() {
    let mut engine = WindowEngine::new(window(), &wide_prefilter(), EventLog::new()).unwrap();

    engine
        .process_tick(&book(10, (dec!(0.60), dec!(0.62)), (dec!(0.38), dec!(0.40))))
        .unwrap();
    // One second later the rescue is unaffordable, but the bids are too young to pull.
    engine
        .process_tick(&book(11, (dec!(0.58), dec!(0.60)), (dec!(0.38), dec!(0.60))))
        .unwrap();
    assert_eq!(engine.mode(), WindowMode::Stopped);
    assert!(!engine.resting(Outcome::Down).unwrap().is_cancelled());

    // Retried on the next tick once they are old enough; no fills while stopped.
    engine
        .process_tick(&book(12, (dec!(0.36), dec!(0.38)), (dec!(0.36), dec!(0.38))))
        .unwrap();
    assert!(engine.resting(Outcome::Down).unwrap().is_cancelled());

    let (metrics, log) = engine.finalize_with_events();
    assert!(metrics.cancel_refusals >= 2);
    assert!(log.records().iter().all(|r| match &r.event {
        EngineEvent::QuoteCancel(c) => c.lifetime_ms >= 2_000,
        _ => true,
    }));
    assert_eq!(metrics.model(FillModel::Optimistic).position.qty_down, dec!(0));
}
