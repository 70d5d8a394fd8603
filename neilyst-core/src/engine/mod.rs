//! Backtesting engine: single-symbol bar replay and its bookkeeping.
//!
//! The engine consumes ordered bars plus precomputed indicators (a
//! [`MarketHistory`]), drives one strategy through them, and returns the
//! ledger, equity curve, and counters for that symbol.

pub mod accounting;
pub mod config;
pub mod replay;

pub use accounting::SymbolAccount;
pub use config::{ConfigError, EngineConfig};
pub use replay::{run_symbol, EquityPoint, SymbolRun};

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::domain::{Bar, PositionError, Signal};
use crate::indicators::{IndicatorError, IndicatorRegistry};
use crate::strategy::{MarketHistory, Strategy, StrategyError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("strategy failed on {symbol} at {date}: {source}")]
    StrategyFault {
        symbol: String,
        date: NaiveDateTime,
        #[source]
        source: StrategyError,
    },

    #[error("malformed signal on {symbol} at {date}: {signal:?}")]
    InvalidSignal {
        symbol: String,
        date: NaiveDateTime,
        signal: Signal,
    },

    #[error("invalid engine config: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Indicator(#[from] IndicatorError),

    #[error("position update failed on {symbol} at {date}: {source}")]
    Position {
        symbol: String,
        date: NaiveDateTime,
        #[source]
        source: PositionError,
    },
}

/// Compute the strategy's indicators over `bars`, then replay.
pub fn run_bars(
    symbol: &str,
    bars: Vec<Bar>,
    strategy: &dyn Strategy,
    config: &EngineConfig,
    registry: &IndicatorRegistry,
) -> Result<SymbolRun, EngineError> {
    let history = MarketHistory::build(bars, &strategy.indicators(), registry)?;
    run_symbol(symbol, &history, strategy, config)
}
