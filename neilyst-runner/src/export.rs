//! Reporting and export: JSON, CSV, and Markdown artifacts.
//!
//! - **JSON**: the full `BacktestResult`, schema-versioned
//! - **CSV**: the trade ledger and per-symbol equity curves
//! - **Markdown**: a human-readable summary
//!
//! Unknown (newer) schema versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use neilyst_core::domain::TradeRecord;
use neilyst_core::engine::SymbolRun;

use crate::metrics::Evaluation;
use crate::runner::{BacktestResult, SCHEMA_VERSION};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const LEDGER_HEADER: [&str; 11] = [
    "symbol",
    "direction",
    "open_date",
    "close_date",
    "open_price",
    "close_price",
    "amount",
    "pnl",
    "open_fee",
    "close_fee",
    "balance_after",
];

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `BacktestResult` to pretty JSON.
pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export a ledger as CSV, one row per closed round trip.
pub fn export_ledger_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(LEDGER_HEADER)?;

    for t in trades {
        wtr.write_record([
            t.symbol.as_str(),
            &t.direction.to_string(),
            &t.open_date.format(DATE_FORMAT).to_string(),
            &t.close_date.format(DATE_FORMAT).to_string(),
            &format!("{:.6}", t.open_price),
            &format!("{:.6}", t.close_price),
            &format!("{:.6}", t.amount),
            &format!("{:.6}", t.pnl),
            &format!("{:.6}", t.open_fee),
            &format!("{:.6}", t.close_fee),
            &format!("{:.6}", t.balance_after),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export per-bar equity for every symbol: `symbol,timestamp,equity`.
pub fn export_equity_csv<'a>(runs: impl IntoIterator<Item = &'a SymbolRun>) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["symbol", "timestamp", "equity"])?;
    for run in runs {
        for point in &run.equity_curve {
            wtr.write_record([
                run.symbol.as_str(),
                &point.timestamp.format(DATE_FORMAT).to_string(),
                &format!("{:.6}", point.equity),
            ])?;
        }
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a run.
///
/// Creates `{output_dir}/{run_id prefix}/` containing:
/// - `result.json`: the full `BacktestResult`
/// - `ledger.csv`: every closed trade
/// - `equity.csv`: per-bar equity for every symbol
/// - `report.md`: Markdown summary
///
/// Returns the path to the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let prefix = result.run_id.get(..12).unwrap_or(&result.run_id);
    let run_dir = output_dir.join(prefix);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("result.json"), export_json(result)?)?;
    std::fs::write(run_dir.join("ledger.csv"), export_ledger_csv(&result.ledger())?)?;
    std::fs::write(
        run_dir.join("equity.csv"),
        export_equity_csv(result.runs.values())?,
    )?;
    std::fs::write(run_dir.join("report.md"), generate_report(result))?;

    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's result.json.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let path = dir.join("result.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

// ─── Markdown report ────────────────────────────────────────────────

/// Generate a Markdown report for a run.
pub fn generate_report(result: &BacktestResult) -> String {
    let bt = &result.config.backtest;
    let mut md = String::with_capacity(2048);

    md.push_str("# Backtest Report\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Run | {} |\n", result.run_id));
    md.push_str(&format!("| Symbols | {} |\n", bt.symbols.join(", ")));
    md.push_str(&format!("| Period | {} to {} (UTC) |\n", bt.start, bt.end));
    md.push_str(&format!("| Timeframe | {} |\n", bt.timeframe));
    md.push_str(&format!("| Initial Balance | {:.2} per symbol |\n", bt.initial_balance));
    md.push_str(&format!(
        "| Fees | {} fee, {} slippage |\n",
        bt.fee_rate, bt.slippage_rate
    ));
    md.push_str(&format!(
        "| Display Offset | {:+}h |\n",
        bt.display_offset_hours
    ));
    if result.is_synthetic() {
        md.push_str("| Data | **SYNTHETIC** |\n");
    }
    md.push('\n');

    md.push_str("## Portfolio\n\n");
    md.push_str(&evaluation_table(&result.evaluation));

    if result.per_symbol.len() > 1 {
        md.push_str("## Per Symbol\n\n");
        md.push_str("| Symbol | Trades | Total PnL | Win Rate | Max DD | Sharpe |\n");
        md.push_str("| --- | --- | --- | --- | --- | --- |\n");
        for (symbol, eval) in &result.per_symbol {
            match eval.report() {
                Some(r) => md.push_str(&format!(
                    "| {symbol} | {} | {:.2} | {:.1}% | {:.2} | {:.3} |\n",
                    r.total_trades,
                    r.total_pnl,
                    r.win_rate * 100.0,
                    r.max_drawdown,
                    r.sharpe_ratio
                )),
                None => md.push_str(&format!("| {symbol} | 0 | - | - | - | - |\n")),
            }
        }
        md.push('\n');
    }

    md.push_str("## Engine Counters\n\n");
    md.push_str("| Symbol | Bars | Signals | Rejected | Clamped | Ignored |\n");
    md.push_str("| --- | --- | --- | --- | --- | --- |\n");
    for (symbol, run) in &result.runs {
        md.push_str(&format!(
            "| {symbol} | {} | {} | {} | {} | {} |\n",
            run.bar_count,
            run.signal_count,
            run.rejected_signals,
            run.clamped_closes,
            run.ignored_signals
        ));
    }
    md.push('\n');

    if !result.failures.is_empty() {
        md.push_str("## Failures\n\n");
        for (symbol, reason) in &result.failures {
            md.push_str(&format!("- {symbol}: {reason}\n"));
        }
        md.push('\n');
    }

    md
}

fn evaluation_table(eval: &Evaluation) -> String {
    let Some(r) = eval.report() else {
        return "No trades.\n\n".to_string();
    };
    let mut md = String::new();
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Total PnL | {:.2} |\n", r.total_pnl));
    md.push_str(&format!("| Annual Return | {:.2}% |\n", r.annual_return * 100.0));
    md.push_str(&format!("| Sharpe | {:.3} |\n", r.sharpe_ratio));
    md.push_str(&format!("| Max Drawdown | {:.2} |\n", r.max_drawdown));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", r.win_rate * 100.0));
    md.push_str(&format!("| P/L Ratio | {:.2} |\n", r.profit_loss_ratio));
    md.push_str(&format!("| Trades | {} |\n", r.total_trades));
    md.push_str(&format!("| Trades / Day | {:.2} |\n", r.average_daily_trades));
    md.push_str(&format!(
        "| Holding (avg / max) | {:.1}h / {:.1}h |\n",
        r.average_holding_hours, r.max_holding_hours
    ));
    md.push_str(&format!(
        "| Best Trade | {:.2} ({} at {}) |\n",
        r.best_trade.pnl, r.best_trade.symbol, r.best_trade.close_date
    ));
    md.push_str(&format!(
        "| Worst Trade | {:.2} ({} at {}) |\n",
        r.worst_trade.pnl, r.worst_trade.symbol, r.worst_trade.close_date
    ));
    md.push('\n');
    md
}
