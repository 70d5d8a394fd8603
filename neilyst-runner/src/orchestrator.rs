//! Multi-symbol fan-out.
//!
//! Each symbol gets its own engine run on rayon's pool; runs share nothing
//! mutable. Results are joined into a `BTreeMap` so output order never
//! depends on scheduling. A symbol that fails is recorded in `failures` and
//! the others still complete.
//!
//! After a symbol finishes, its ledger and equity timestamps are shifted by
//! a fixed number of hours into the display timezone.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use neilyst_core::domain::TradeRecord;
use neilyst_core::engine::SymbolRun;

use crate::runner::RunError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiRunResult {
    pub runs: BTreeMap<String, SymbolRun>,
    /// Symbol → error message for runs that did not complete.
    pub failures: BTreeMap<String, String>,
}

impl MultiRunResult {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Symbol → ledger for the runs that completed.
    pub fn ledgers(&self) -> BTreeMap<String, Vec<TradeRecord>> {
        self.runs
            .iter()
            .map(|(symbol, run)| (symbol.clone(), run.ledger.clone()))
            .collect()
    }

    pub fn trade_count(&self) -> usize {
        self.runs.values().map(|r| r.ledger.len()).sum()
    }
}

/// Shift every ledger date and equity timestamp by `hours`.
pub fn shift_run(run: &mut SymbolRun, hours: i64) {
    if hours == 0 {
        return;
    }
    let offset = chrono::Duration::hours(hours);
    for trade in &mut run.ledger {
        trade.shift_hours(hours);
    }
    for point in &mut run.equity_curve {
        point.timestamp += offset;
    }
}

/// Run `job` for every symbol in parallel and merge the outcomes.
pub fn run_symbols<F>(symbols: &[String], offset_hours: i64, job: F) -> MultiRunResult
where
    F: Fn(&str) -> Result<SymbolRun, RunError> + Sync,
{
    let outcomes: Vec<(String, Result<SymbolRun, RunError>)> = symbols
        .par_iter()
        .map(|symbol| (symbol.clone(), job(symbol)))
        .collect();

    let mut merged = MultiRunResult::default();
    for (symbol, outcome) in outcomes {
        match outcome {
            Ok(mut run) => {
                shift_run(&mut run, offset_hours);
                merged.runs.insert(symbol, run);
            }
            Err(e) => {
                error!(%symbol, error = %e, "symbol run failed");
                merged.failures.insert(symbol, e.to_string());
            }
        }
    }

    info!(
        symbols = symbols.len(),
        completed = merged.runs.len(),
        failed = merged.failures.len(),
        trades = merged.trade_count(),
        "multi-symbol run finished"
    );
    merged
}
