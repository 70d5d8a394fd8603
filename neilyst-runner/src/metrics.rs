//! Performance evaluation: ledgers in, statistics out.
//!
//! Trade-level statistics (win rate, P/L ratio, counts, holding times) pool
//! every trade. Curve statistics (drawdown, annual return, Sharpe) run on a
//! balance curve: for one symbol, `initial` at the first open followed by
//! `initial + cumulative pnl` at each close; for several symbols, the
//! per-symbol curves forward-filled onto the union of their timestamps and
//! summed, against `initial × symbol_count`.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use neilyst_core::data::TimeRange;
use neilyst_core::domain::TradeRecord;

const DAYS_PER_YEAR: f64 = 365.25;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    #[error("initial balance must be > 0, got {0}")]
    NonPositiveInitialBalance(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Annual risk-free rate, spread evenly over calendar days.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    #[serde(default = "default_trading_days")]
    pub trading_days_per_year: u32,
}

fn default_risk_free_rate() -> f64 {
    0.04
}

fn default_trading_days() -> u32 {
    252
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: default_risk_free_rate(),
            trading_days_per_year: default_trading_days(),
        }
    }
}

/// One point on a balance curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalancePoint {
    pub timestamp: NaiveDateTime,
    pub balance: f64,
}

/// Best or worst single trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeExtreme {
    pub symbol: String,
    pub pnl: f64,
    pub close_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub symbol_count: usize,
    /// Capital the curve starts from (`initial × symbol_count`).
    pub initial_balance: f64,
    pub total_pnl: f64,
    pub win_rate: f64,
    pub profit_loss_ratio: f64,
    /// Largest peak-to-trough drop of the balance curve, in currency units.
    pub max_drawdown: f64,
    pub annual_return: f64,
    pub sharpe_ratio: f64,
    pub total_trades: usize,
    pub average_daily_trades: f64,
    pub average_holding_hours: f64,
    pub max_holding_hours: f64,
    pub best_trade: TradeExtreme,
    pub worst_trade: TradeExtreme,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Evaluation {
    NoTrades,
    Report(PerformanceReport),
}

impl Evaluation {
    pub fn report(&self) -> Option<&PerformanceReport> {
        match self {
            Evaluation::NoTrades => None,
            Evaluation::Report(r) => Some(r),
        }
    }

    /// Flat metric map with stable keys. All zeros when there were no trades.
    pub fn to_metric_map(&self) -> BTreeMap<&'static str, f64> {
        let values = match self {
            Evaluation::NoTrades => [0.0; 8],
            Evaluation::Report(r) => [
                r.total_pnl,
                r.win_rate,
                r.profit_loss_ratio,
                r.max_drawdown,
                r.annual_return,
                r.sharpe_ratio,
                r.total_trades as f64,
                r.average_daily_trades,
            ],
        };
        METRIC_KEYS.iter().copied().zip(values).collect()
    }
}

pub const METRIC_KEYS: [&str; 8] = [
    "total_pnl",
    "win_rate",
    "profit_loss_ratio",
    "max_drawdown",
    "annual_return",
    "sharpe_ratio",
    "total_trades",
    "average_daily_trades",
];

/// Evaluate one symbol's ledger.
pub fn evaluate(
    ledger: &[TradeRecord],
    initial_balance: f64,
    config: &EvaluationConfig,
) -> Result<Evaluation, MetricsError> {
    check_initial(initial_balance)?;
    let curve = balance_curve(ledger, initial_balance);
    Ok(build(ledger.iter().collect(), &curve, initial_balance, 1, config))
}

/// Evaluate several symbols as one portfolio on their combined balance curve.
///
/// Every entry counts toward the combined capital, including symbols that
/// never traded.
pub fn evaluate_many(
    ledgers: &BTreeMap<String, Vec<TradeRecord>>,
    initial_balance: f64,
    config: &EvaluationConfig,
) -> Result<Evaluation, MetricsError> {
    check_initial(initial_balance)?;
    let curves: Vec<Vec<BalancePoint>> = ledgers
        .values()
        .map(|ledger| balance_curve(ledger, initial_balance))
        .collect();
    let combined = combine_curves(&curves, initial_balance);
    let trades: Vec<&TradeRecord> = ledgers.values().flatten().collect();
    let symbol_count = ledgers.len().max(1);
    Ok(build(
        trades,
        &combined,
        initial_balance * symbol_count as f64,
        symbol_count,
        config,
    ))
}

/// Evaluate only the trades of `ledger` that closed inside `period`.
pub fn evaluate_period(
    ledger: &[TradeRecord],
    initial_balance: f64,
    period: TimeRange,
    config: &EvaluationConfig,
) -> Result<Evaluation, MetricsError> {
    let inside: Vec<TradeRecord> = trades_in_periods(ledger, &[period], None)
        .into_iter()
        .cloned()
        .collect();
    evaluate(&inside, initial_balance, config)
}

/// Trades closed inside any of `periods`, optionally for one symbol only.
pub fn trades_in_periods<'a>(
    trades: &'a [TradeRecord],
    periods: &[TimeRange],
    symbol: Option<&str>,
) -> Vec<&'a TradeRecord> {
    trades
        .iter()
        .filter(|t| symbol.map_or(true, |s| t.symbol == s))
        .filter(|t| periods.iter().any(|p| p.contains(t.close_date)))
        .collect()
}

/// Win rate over `periods`, overall and per symbol.
pub fn win_rate_by_symbol(
    trades: &[TradeRecord],
    periods: &[TimeRange],
) -> (f64, BTreeMap<String, f64>) {
    let overall = win_rate(&trades_in_periods(trades, periods, None));
    let mut symbols: Vec<&str> = trades.iter().map(|t| t.symbol.as_str()).collect();
    symbols.sort_unstable();
    symbols.dedup();
    let per_symbol = symbols
        .into_iter()
        .map(|s| (s.to_string(), win_rate(&trades_in_periods(trades, periods, Some(s)))))
        .collect();
    (overall, per_symbol)
}

fn check_initial(initial_balance: f64) -> Result<(), MetricsError> {
    if initial_balance.is_finite() && initial_balance > 0.0 {
        Ok(())
    } else {
        Err(MetricsError::NonPositiveInitialBalance(initial_balance))
    }
}

fn build(
    trades: Vec<&TradeRecord>,
    curve: &[BalancePoint],
    initial_total: f64,
    symbol_count: usize,
    config: &EvaluationConfig,
) -> Evaluation {
    let (Some(start), Some(end)) = (
        trades.iter().map(|t| t.open_date).min(),
        trades.iter().map(|t| t.close_date).max(),
    ) else {
        return Evaluation::NoTrades;
    };
    let (Some(best), Some(worst)) = (
        trades.iter().max_by(|a, b| a.pnl.total_cmp(&b.pnl)),
        trades.iter().min_by(|a, b| a.pnl.total_cmp(&b.pnl)),
    ) else {
        return Evaluation::NoTrades;
    };

    let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
    let balances: Vec<f64> = curve.iter().map(|p| p.balance).collect();
    let holding: Vec<f64> = trades
        .iter()
        .map(|t| t.holding_time().num_seconds() as f64 / 3600.0)
        .collect();
    let calendar_days = (end.date() - start.date()).num_days() + 1;

    Evaluation::Report(PerformanceReport {
        symbol_count,
        initial_balance: initial_total,
        total_pnl,
        win_rate: win_rate(&trades),
        profit_loss_ratio: profit_loss_ratio(&trades),
        max_drawdown: max_drawdown(&balances),
        annual_return: annual_return(total_pnl, initial_total, start, end),
        sharpe_ratio: sharpe_ratio(
            &balances,
            config.risk_free_rate,
            config.trading_days_per_year,
        ),
        total_trades: trades.len(),
        average_daily_trades: trades.len() as f64 / calendar_days as f64,
        average_holding_hours: mean_f64(&holding),
        max_holding_hours: holding.iter().copied().fold(0.0, f64::max),
        best_trade: extreme(best),
        worst_trade: extreme(worst),
        start_date: start,
        end_date: end,
    })
}

fn extreme(t: &TradeRecord) -> TradeExtreme {
    TradeExtreme {
        symbol: t.symbol.clone(),
        pnl: t.pnl,
        close_date: t.close_date,
    }
}

// ─── Curves ─────────────────────────────────────────────────────────

/// Balance after each close, preceded by `initial` at the first open.
pub fn balance_curve(ledger: &[TradeRecord], initial_balance: f64) -> Vec<BalancePoint> {
    let Some(first_open) = ledger.iter().map(|t| t.open_date).min() else {
        return Vec::new();
    };
    let mut closes: Vec<&TradeRecord> = ledger.iter().collect();
    closes.sort_by_key(|t| t.close_date);

    let mut curve = Vec::with_capacity(ledger.len() + 1);
    curve.push(BalancePoint {
        timestamp: first_open,
        balance: initial_balance,
    });
    let mut balance = initial_balance;
    for t in closes {
        balance += t.pnl;
        curve.push(BalancePoint {
            timestamp: t.close_date,
            balance,
        });
    }
    curve
}

/// Sum curves on the union of their timestamps.
///
/// Each curve is forward-filled, reading `initial` before its first point.
/// Where a curve has several points at one timestamp, the last one counts.
pub fn combine_curves(curves: &[Vec<BalancePoint>], initial_balance: f64) -> Vec<BalancePoint> {
    let mut stamps: Vec<NaiveDateTime> = curves.iter().flatten().map(|p| p.timestamp).collect();
    stamps.sort();
    stamps.dedup();

    let mut cursors = vec![0usize; curves.len()];
    let mut current = vec![initial_balance; curves.len()];

    stamps
        .into_iter()
        .map(|ts| {
            for (i, curve) in curves.iter().enumerate() {
                while cursors[i] < curve.len() && curve[cursors[i]].timestamp <= ts {
                    current[i] = curve[cursors[i]].balance;
                    cursors[i] += 1;
                }
            }
            BalancePoint {
                timestamp: ts,
                balance: current.iter().sum(),
            }
        })
        .collect()
}

// ─── Individual metric functions ────────────────────────────────────

/// Fraction of trades with pnl > 0.
pub fn win_rate(trades: &[&TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

/// |mean winning pnl / mean losing pnl|. Zero without winners or without losers.
pub fn profit_loss_ratio(trades: &[&TradeRecord]) -> f64 {
    let wins: Vec<f64> = trades.iter().filter(|t| t.is_winner()).map(|t| t.pnl).collect();
    let losses: Vec<f64> = trades.iter().filter(|t| t.is_loser()).map(|t| t.pnl).collect();
    if wins.is_empty() || losses.is_empty() {
        return 0.0;
    }
    (mean_f64(&wins) / mean_f64(&losses)).abs()
}

/// Largest drop from a running peak, in currency units (>= 0).
pub fn max_drawdown(balances: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &b in balances {
        peak = peak.max(b);
        max_dd = max_dd.max(peak - b);
    }
    max_dd
}

/// Simple annualized return over whole elapsed days. Zero when no full day
/// has elapsed.
pub fn annual_return(
    total_pnl: f64,
    initial_balance: f64,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> f64 {
    let days = (end - start).num_days();
    if days <= 0 || initial_balance <= 0.0 {
        return 0.0;
    }
    let years = days as f64 / DAYS_PER_YEAR;
    total_pnl / (initial_balance * years)
}

/// Annualized Sharpe ratio on per-step curve returns.
///
/// Sharpe = mean(r - rf/365.25) / std(r - rf/365.25) * sqrt(trading_days).
/// Returns 0.0 with fewer than two returns or zero deviation.
pub fn sharpe_ratio(balances: &[f64], risk_free_rate: f64, trading_days: u32) -> f64 {
    let returns = step_returns(balances);
    if returns.len() < 2 {
        return 0.0;
    }
    let daily_rf = risk_free_rate / DAYS_PER_YEAR;
    let excess: Vec<f64> = returns.iter().map(|r| r - daily_rf).collect();
    let std = std_dev(&excess);
    if std < 1e-15 {
        return 0.0;
    }
    mean_f64(&excess) / std * f64::from(trading_days).sqrt()
}

// ─── Helpers ────────────────────────────────────────────────────────

pub fn step_returns(balances: &[f64]) -> Vec<f64> {
    balances
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
