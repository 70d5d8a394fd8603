//! Engine integration tests: scripted strategies driven through full replays.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use neilyst_core::domain::{Bar, Direction, Signal};
use neilyst_core::engine::{run_bars, run_symbol, EngineConfig, EngineError, SymbolRun};
use neilyst_core::indicators::{IndicatorRegistry, IndicatorValues};
use neilyst_core::strategy::{BarContext, MaCrossover, MarketHistory, Strategy, StrategyError};

// ── Helpers ──────────────────────────────────────────────────────────

const SYMBOL: &str = "BTC/USDT";

fn t(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::minutes(i as i64)
}

fn make_bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            timestamp: t(i),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        })
        .collect()
}

/// Emits a fixed signal at given bar indexes. Prices default to the bar close.
struct Scripted {
    steps: Vec<(usize, Step)>,
}

#[derive(Clone, Copy)]
enum Step {
    Long(f64),
    Short(f64),
    Close(f64),
    Fail,
}

impl Strategy for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn indicators(&self) -> Vec<String> {
        Vec::new()
    }

    fn decide(&self, ctx: &BarContext<'_>) -> Result<Option<Signal>, StrategyError> {
        let index = ctx.history.len() - 1;
        let price = ctx.bar.close;
        match self.steps.iter().find(|(i, _)| *i == index).map(|(_, s)| *s) {
            Some(Step::Long(amount)) => Ok(Some(Signal::long(price, amount))),
            Some(Step::Short(amount)) => Ok(Some(Signal::short(price, amount))),
            Some(Step::Close(amount)) => Ok(Some(Signal::close(price, amount))),
            Some(Step::Fail) => Err(StrategyError::Message("boom".into())),
            None => Ok(None),
        }
    }
}

fn replay(
    closes: &[f64],
    steps: Vec<(usize, Step)>,
    config: EngineConfig,
) -> Result<SymbolRun, EngineError> {
    let history = MarketHistory::new(make_bars(closes), IndicatorValues::new());
    run_symbol(SYMBOL, &history, &Scripted { steps }, &config)
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn long_round_trip_reference_scenario() {
    let run = replay(
        &[100.0, 110.0, 90.0],
        vec![(0, Step::Long(1.0)), (1, Step::Close(1.0))],
        EngineConfig::frictionless(50_000.0),
    )
    .unwrap();

    assert_eq!(run.ledger.len(), 1);
    let trade = &run.ledger[0];
    assert_eq!(trade.direction, Direction::Long);
    assert_eq!(trade.open_date, t(0));
    assert_eq!(trade.close_date, t(1));
    assert!((trade.pnl - 10.0).abs() < 1e-9);
    assert!((run.final_balance - 50_010.0).abs() < 1e-9);

    // Nothing happens at the third bar
    assert_eq!(run.equity_curve.len(), 3);
    assert!((run.equity_curve[2].equity - 50_010.0).abs() < 1e-9);
}

#[test]
fn open_and_close_same_price_restores_balance() {
    let run = replay(
        &[100.0, 100.0],
        vec![(0, Step::Long(3.0)), (1, Step::Close(3.0))],
        EngineConfig::frictionless(1_000.0),
    )
    .unwrap();
    assert_eq!(run.ledger[0].pnl, 0.0);
    assert_eq!(run.final_balance, 1_000.0);
}

#[test]
fn short_round_trip_balance_equals_ledger_pnl() {
    for (fee, slip) in [(0.0, 0.0), (0.001, 0.0005)] {
        let run = replay(
            &[100.0, 95.0, 90.0],
            vec![(0, Step::Short(2.0)), (2, Step::Close(2.0))],
            EngineConfig::new(10_000.0, fee, slip),
        )
        .unwrap();
        let trade = &run.ledger[0];
        assert_eq!(trade.direction, Direction::Short);
        assert!((run.final_balance - 10_000.0 - trade.pnl).abs() < 1e-9);
        let gross = (100.0 - 90.0) * 2.0;
        let costs = (100.0 * 2.0 + 90.0 * 2.0) * (fee + slip);
        assert!((trade.pnl - (gross - costs)).abs() < 1e-9);
    }
}

#[test]
fn fees_charged_on_both_legs() {
    let run = replay(
        &[100.0, 120.0],
        vec![(0, Step::Long(1.0)), (1, Step::Close(1.0))],
        EngineConfig::new(1_000.0, 0.01, 0.0),
    )
    .unwrap();
    let trade = &run.ledger[0];
    assert!((trade.open_fee - 1.0).abs() < 1e-9);
    assert!((trade.close_fee - 1.2).abs() < 1e-9);
    assert!((trade.pnl - 17.8).abs() < 1e-9);
    assert!((trade.balance_after - 1_017.8).abs() < 1e-9);
}

#[test]
fn forced_liquidation_uses_last_bar() {
    let run = replay(
        &[100.0, 105.0, 107.0],
        vec![(0, Step::Long(1.0))],
        EngineConfig::frictionless(1_000.0),
    )
    .unwrap();
    assert_eq!(run.ledger.len(), 1);
    let trade = &run.ledger[0];
    assert_eq!(trade.close_price, 107.0);
    assert_eq!(trade.close_date, t(2));
    assert!((run.final_balance - 1_007.0).abs() < 1e-9);
    assert!((run.equity_curve.last().unwrap().equity - run.final_balance).abs() < 1e-9);
}

#[test]
fn opposite_open_is_rejected_and_counted() {
    let run = replay(
        &[100.0, 101.0, 102.0],
        vec![(0, Step::Long(1.0)), (1, Step::Short(1.0)), (2, Step::Close(1.0))],
        EngineConfig::frictionless(1_000.0),
    )
    .unwrap();
    assert_eq!(run.rejected_signals, 1);
    assert_eq!(run.ledger.len(), 1);
    assert_eq!(run.ledger[0].direction, Direction::Long);
    assert_eq!(run.signal_count, 3);
}

#[test]
fn over_close_is_clamped() {
    let run = replay(
        &[100.0, 110.0],
        vec![(0, Step::Long(1.0)), (1, Step::Close(5.0))],
        EngineConfig::frictionless(1_000.0),
    )
    .unwrap();
    assert_eq!(run.clamped_closes, 1);
    assert_eq!(run.ledger[0].amount, 1.0);
    assert!((run.final_balance - 1_010.0).abs() < 1e-9);
}

#[test]
fn close_while_flat_is_ignored() {
    let run = replay(
        &[100.0, 110.0],
        vec![(0, Step::Close(1.0))],
        EngineConfig::frictionless(1_000.0),
    )
    .unwrap();
    assert_eq!(run.ignored_signals, 1);
    assert!(run.ledger.is_empty());
    assert_eq!(run.final_balance, 1_000.0);
}

#[test]
fn same_direction_adds_reaverage_entry() {
    let run = replay(
        &[100.0, 110.0, 120.0],
        vec![(0, Step::Long(1.0)), (1, Step::Long(1.0)), (2, Step::Close(2.0))],
        EngineConfig::frictionless(1_000.0),
    )
    .unwrap();
    let trade = &run.ledger[0];
    assert!((trade.open_price - 105.0).abs() < 1e-9);
    assert_eq!(trade.amount, 2.0);
    assert!((trade.pnl - 30.0).abs() < 1e-9);
}

#[test]
fn empty_bars_yield_empty_ledger() {
    let run = replay(&[], vec![], EngineConfig::frictionless(1_000.0)).unwrap();
    assert!(run.ledger.is_empty());
    assert!(run.equity_curve.is_empty());
    assert_eq!(run.final_balance, 1_000.0);
}

#[test]
fn strategy_error_aborts_with_context() {
    let err = replay(
        &[100.0, 101.0, 102.0],
        vec![(0, Step::Long(1.0)), (1, Step::Fail)],
        EngineConfig::frictionless(1_000.0),
    )
    .unwrap_err();
    match err {
        EngineError::StrategyFault { symbol, date, .. } => {
            assert_eq!(symbol, SYMBOL);
            assert_eq!(date, t(1));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn malformed_signal_is_fault() {
    let err = replay(
        &[100.0],
        vec![(0, Step::Long(-1.0))],
        EngineConfig::frictionless(1_000.0),
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::InvalidSignal { .. }));
}

#[test]
fn invalid_config_fails_before_replay() {
    let err = replay(&[100.0], vec![], EngineConfig::new(1_000.0, -0.1, 0.0)).unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}

#[test]
fn equity_tracks_long_mark_to_market() {
    let run = replay(
        &[100.0, 90.0, 95.0],
        vec![(0, Step::Long(2.0))],
        EngineConfig::frictionless(1_000.0),
    )
    .unwrap();
    assert!((run.equity_curve[0].equity - 1_000.0).abs() < 1e-9);
    assert!((run.equity_curve[1].equity - 980.0).abs() < 1e-9);
}

#[test]
fn ma_crossover_trades_a_wave() {
    let closes: Vec<f64> = (0..400)
        .map(|i| 100.0 + (i as f64 / 25.0).sin() * 10.0)
        .collect();
    let strategy = MaCrossover::new(5, 20, 1.0);
    let run = run_bars(
        SYMBOL,
        make_bars(&closes),
        &strategy,
        &EngineConfig::new(10_000.0, 0.0005, 0.0),
        &IndicatorRegistry::new(),
    )
    .unwrap();

    assert!(run.ledger.len() >= 2);
    assert!(run.ledger.iter().all(|t| t.direction == Direction::Long));
    assert!((run.final_balance - 10_000.0 - run.total_pnl()).abs() < 1e-6);
    for pair in run.ledger.windows(2) {
        assert!(pair[0].close_date <= pair[1].open_date);
    }
}

#[test]
fn void_bar_is_skipped_without_losing_the_trade() {
    let run = replay(
        &[100.0, f64::NAN, 110.0],
        vec![(0, Step::Long(1.0)), (1, Step::Close(1.0)), (2, Step::Close(1.0))],
        EngineConfig::frictionless(1_000.0),
    )
    .unwrap();
    assert_eq!(run.skipped_bars, 1);
    assert_eq!(run.bar_count, 3);
    assert_eq!(run.equity_curve.len(), 2);
    // The close scheduled on the void bar never reaches the strategy
    assert_eq!(run.signal_count, 2);
    assert_eq!(run.ledger.len(), 1);
    assert_eq!(run.ledger[0].close_date, t(2));
    assert!((run.final_balance - 1_010.0).abs() < 1e-9);
}

#[test]
fn trailing_void_bar_liquidates_at_last_good_bar() {
    let run = replay(
        &[100.0, 104.0, f64::NAN],
        vec![(0, Step::Long(1.0))],
        EngineConfig::frictionless(1_000.0),
    )
    .unwrap();
    let trade = &run.ledger[0];
    assert_eq!(trade.close_price, 104.0);
    assert_eq!(trade.close_date, t(1));
    assert!((run.final_balance - 1_004.0).abs() < 1e-9);
}

#[test]
fn moving_average_run_survives_a_nan_close() {
    let mut closes: Vec<f64> = (0..200)
        .map(|i| 100.0 + (i as f64 / 15.0).sin() * 8.0)
        .collect();
    closes[120] = f64::NAN;
    let run = run_bars(
        SYMBOL,
        make_bars(&closes),
        &MaCrossover::new(2, 5, 1.0),
        &EngineConfig::frictionless(1_000.0),
        &IndicatorRegistry::new(),
    )
    .unwrap();
    assert_eq!(run.skipped_bars, 1);
    assert!(!run.ledger.is_empty());
    assert!(run.final_balance.is_finite());
}

#[test]
fn position_error_names_symbol_and_date() {
    let err = EngineError::Position {
        symbol: SYMBOL.into(),
        date: t(7),
        source: neilyst_core::domain::PositionError::InvalidPrice(f64::NAN),
    };
    let msg = err.to_string();
    assert!(msg.contains(SYMBOL), "{msg}");
    assert!(msg.contains("2024-01-02 00:07:00"), "{msg}");
}
