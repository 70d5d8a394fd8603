//! Bar-by-bar replay for one symbol.
//!
//! Per bar, in order (bars failing `Bar::is_sane` are skipped and counted):
//! 1. Mark the position at the close
//! 2. Ask the strategy for a signal
//! 3. Open/add for Long/Short, or close (clamped to what is held) for Close
//! 4. Record equity
//!
//! A position still open after the last bar is force-closed at that bar's
//! close and timestamp.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::accounting::SymbolAccount;
use super::config::EngineConfig;
use super::EngineError;
use crate::domain::{PositionError, Signal, TradeRecord};
use crate::strategy::{BarContext, MarketHistory, Strategy};

/// Balance plus marked exposure after one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

/// Everything one symbol's replay produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRun {
    pub symbol: String,
    pub ledger: Vec<TradeRecord>,
    pub final_balance: f64,
    pub equity_curve: Vec<EquityPoint>,
    pub bar_count: usize,
    /// Signals the strategy emitted, acted on or not.
    pub signal_count: usize,
    /// Opens refused because the position faced the other way.
    pub rejected_signals: usize,
    /// Closes larger than the held amount, trimmed to fit.
    pub clamped_closes: usize,
    /// Closes issued while flat.
    pub ignored_signals: usize,
    /// Void or inconsistent bars passed over without marking or deciding.
    #[serde(default)]
    pub skipped_bars: usize,
}

impl SymbolRun {
    pub fn total_pnl(&self) -> f64 {
        self.ledger.iter().map(|t| t.pnl).sum()
    }
}

/// Replay `history` through `strategy` for `symbol`.
pub fn run_symbol(
    symbol: &str,
    history: &MarketHistory,
    strategy: &dyn Strategy,
    config: &EngineConfig,
) -> Result<SymbolRun, EngineError> {
    config.validate()?;

    let bars = history.bars();
    let mut account = SymbolAccount::new(symbol, *config);
    let mut run = SymbolRun {
        symbol: symbol.to_string(),
        ledger: Vec::new(),
        final_balance: config.initial_balance,
        equity_curve: Vec::with_capacity(bars.len()),
        bar_count: bars.len(),
        signal_count: 0,
        rejected_signals: 0,
        clamped_closes: 0,
        ignored_signals: 0,
        skipped_bars: 0,
    };

    let mut last_good = None;
    for (i, bar) in bars.iter().enumerate() {
        if !bar.is_sane() {
            warn!(%symbol, date = %bar.timestamp, ?bar, "skipping void or inconsistent bar");
            run.skipped_bars += 1;
            continue;
        }
        last_good = Some(bar);
        account.mark(bar.close);

        let ctx = BarContext {
            symbol,
            date: bar.timestamp,
            bar,
            position: account.position(),
            balance: account.balance(),
            history: history.view(i),
        };
        let signal = strategy
            .decide(&ctx)
            .map_err(|source| EngineError::StrategyFault {
                symbol: symbol.to_string(),
                date: bar.timestamp,
                source,
            })?;

        if let Some(signal) = signal {
            run.signal_count += 1;
            apply_signal(&mut account, &mut run, signal, bar.timestamp)?;
        }

        run.equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            equity: account.equity(bar.close),
        });
    }

    if let Some(last) = last_good {
        if !account.position().is_flat() {
            let amount = account.position().amount;
            info!(%symbol, price = last.close, amount, "force-closing at end of window");
            account
                .close(last.close, amount, last.timestamp)
                .map_err(|source| position_error(symbol, last.timestamp, source))?;
            if let Some(point) = run.equity_curve.last_mut() {
                point.equity = account.balance();
            }
        }
    }

    let (final_balance, _, ledger) = account.into_parts();
    run.final_balance = final_balance;
    run.ledger = ledger;

    info!(
        %symbol,
        bars = run.bar_count,
        trades = run.ledger.len(),
        signals = run.signal_count,
        rejected = run.rejected_signals,
        clamped = run.clamped_closes,
        skipped = run.skipped_bars,
        final_balance = run.final_balance,
        "replay complete"
    );
    Ok(run)
}

fn apply_signal(
    account: &mut SymbolAccount,
    run: &mut SymbolRun,
    signal: Signal,
    date: NaiveDateTime,
) -> Result<(), EngineError> {
    if !signal.is_well_formed() {
        return Err(EngineError::InvalidSignal {
            symbol: run.symbol.clone(),
            date,
            signal,
        });
    }

    match signal.opening_side() {
        Some(side) => match account.open(side, signal.price, signal.amount, date) {
            Ok(()) => {}
            Err(PositionError::OppositeDirection { held, requested, .. }) => {
                warn!(
                    symbol = %run.symbol,
                    %date,
                    ?held,
                    ?requested,
                    "open against existing position rejected; close first"
                );
                run.rejected_signals += 1;
            }
            Err(e) => return Err(position_error(&run.symbol, date, e)),
        },
        None => {
            let held = account.position().amount;
            if account.position().is_flat() {
                warn!(symbol = %run.symbol, %date, "close with no open position ignored");
                run.ignored_signals += 1;
                return Ok(());
            }
            let amount = if signal.amount > held {
                warn!(
                    symbol = %run.symbol,
                    %date,
                    requested = signal.amount,
                    held,
                    "close exceeds held amount; clamping"
                );
                run.clamped_closes += 1;
                held
            } else {
                signal.amount
            };
            account
                .close(signal.price, amount, date)
                .map_err(|e| position_error(&run.symbol, date, e))?;
        }
    }
    Ok(())
}

fn position_error(symbol: &str, date: NaiveDateTime, source: PositionError) -> EngineError {
    EngineError::Position {
        symbol: symbol.to_string(),
        date,
        source,
    }
}
