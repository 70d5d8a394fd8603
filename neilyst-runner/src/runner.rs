//! Backtest runner: wires together cache, engine, orchestrator and metrics.
//!
//! Entry points:
//! - `run_backtest()`: config in, result out; used by the CLI.
//! - `run_with_provider()`: same, with an explicit data provider.
//! - `run_single()`: one symbol over pre-loaded bars, no I/O.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use neilyst_core::data::{
    BarCache, BinanceFuturesProvider, DataError, DataProvider, SyntheticProvider,
};
use neilyst_core::domain::{Bar, TradeRecord};
use neilyst_core::engine::{run_bars, EngineConfig, EngineError, SymbolRun};
use neilyst_core::indicators::IndicatorRegistry;
use neilyst_core::strategy::Strategy;

use crate::config::{BacktestConfig, ConfigError, RunId};
use crate::metrics::{evaluate, evaluate_many, Evaluation, MetricsError};
use crate::orchestrator::{run_symbols, shift_run, MultiRunResult};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),
}

/// Current schema version for persisted results.
pub const SCHEMA_VERSION: u32 = 1;

/// Where bars come from when the cache has gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Exchange,
    Synthetic,
}

impl DataSource {
    pub fn provider(&self, config: &BacktestConfig) -> Result<Arc<dyn DataProvider>, RunError> {
        let provider: Arc<dyn DataProvider> = match self {
            DataSource::Exchange => Arc::new(BinanceFuturesProvider::new(&config.exchange)?),
            DataSource::Synthetic => Arc::new(SyntheticProvider::new()),
        };
        Ok(provider)
    }
}

/// Complete result of a backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub config: BacktestConfig,
    /// Name of the provider that filled cache gaps.
    pub data_source: String,
    pub runs: BTreeMap<String, SymbolRun>,
    pub failures: BTreeMap<String, String>,
    /// All completed symbols evaluated as one portfolio.
    pub evaluation: Evaluation,
    pub per_symbol: BTreeMap<String, Evaluation>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl BacktestResult {
    /// Every trade, grouped by symbol and ordered by close date within each.
    pub fn ledger(&self) -> Vec<TradeRecord> {
        self.runs.values().flat_map(|r| r.ledger.iter().cloned()).collect()
    }

    pub fn is_synthetic(&self) -> bool {
        self.data_source == "synthetic"
    }
}

/// Validate `config`, build the provider for `source`, and run.
pub fn run_backtest(
    config: &BacktestConfig,
    source: DataSource,
) -> Result<BacktestResult, RunError> {
    let provider = source.provider(config)?;
    run_with_provider(config, provider)
}

/// Run every configured symbol through the cache and engine, then evaluate.
///
/// A symbol whose data cannot be completed, or whose strategy faults, lands
/// in `failures`; the other symbols are unaffected.
pub fn run_with_provider(
    config: &BacktestConfig,
    provider: Arc<dyn DataProvider>,
) -> Result<BacktestResult, RunError> {
    let mut config = config.clone();
    config.validate()?;
    let run_id = config.run_id()?;

    let data_source = provider.name().to_string();
    let cache = BarCache::new(config.cache_config(), provider);
    let strategy = config.strategy.build();
    let registry = IndicatorRegistry::new();
    let engine = config.engine_config();
    let bt = &config.backtest;

    info!(
        run_id = %&run_id[..12],
        symbols = bt.symbols.len(),
        timeframe = %bt.timeframe,
        strategy = strategy.name(),
        %data_source,
        "starting backtest"
    );

    let multi: MultiRunResult = run_symbols(&bt.symbols, bt.display_offset_hours, |symbol| {
        let bars = cache
            .get_bars(symbol, bt.start, bt.end, &bt.timeframe)?
            .require_complete()?;
        Ok(run_bars(symbol, bars, strategy.as_ref(), &engine, &registry)?)
    });

    let initial = bt.initial_balance;
    let evaluation = evaluate_many(&multi.ledgers(), initial, &config.evaluation)?;
    let per_symbol = multi
        .runs
        .iter()
        .map(|(symbol, run)| {
            evaluate(&run.ledger, initial, &config.evaluation).map(|e| (symbol.clone(), e))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id,
        config,
        data_source,
        runs: multi.runs,
        failures: multi.failures,
        evaluation,
        per_symbol,
    })
}

/// Replay one symbol over pre-loaded bars and shift its dates by
/// `offset_hours`.
pub fn run_single(
    symbol: &str,
    bars: Vec<Bar>,
    strategy: &dyn Strategy,
    engine: &EngineConfig,
    offset_hours: i64,
) -> Result<SymbolRun, RunError> {
    let mut run = run_bars(symbol, bars, strategy, engine, &IndicatorRegistry::new())?;
    shift_run(&mut run, offset_hours);
    Ok(run)
}
