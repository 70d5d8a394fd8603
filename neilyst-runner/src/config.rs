//! TOML backtest configuration.
//!
//! ```toml
//! [backtest]
//! symbols = ["BTC/USDT", "ETH/USDT"]
//! start = "2024-01-01"
//! end = "2024-03-01 12:00"
//! timeframe = "15m"
//! initial_balance = 10000.0
//! fee_rate = 0.0005
//! slippage_rate = 0.0
//! display_offset_hours = 8
//!
//! [strategy]
//! type = "ma_crossover"
//! fast = 5
//! slow = 20
//! amount = 0.01
//!
//! [cache]
//! root = "data"
//! partial_window = "keep"
//! retry = { attempts = 3, pause = 1000 }
//!
//! [exchange]
//! name = "binanceusdm"
//!
//! [evaluation]
//! risk_free_rate = 0.04
//! ```
//!
//! Everything except `[backtest]` and `[strategy]` has defaults. `validate()`
//! checks the whole file before any data is touched.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use neilyst_core::data::{CacheConfig, ExchangeConfig, PartialWindow, RetryPolicy};
use neilyst_core::domain::{normalize_symbol, Timeframe, TimeframeError};
use neilyst_core::engine::EngineConfig;
use neilyst_core::indicators::{IndicatorError, IndicatorRegistry};
use neilyst_core::strategy::{MaCrossover, Strategy};

use crate::metrics::EvaluationConfig;

/// Content hash of a configuration.
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(String),

    #[error("invalid instant '{0}' (expected YYYY-MM-DD, YYYY-MM-DD HH:MM or YYYY-MM-DD HH:MM:SS)")]
    InvalidInstant(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Symbol(#[from] TimeframeError),

    #[error(transparent)]
    Engine(#[from] neilyst_core::engine::ConfigError),

    #[error(transparent)]
    Indicator(#[from] IndicatorError),
}

/// Top-level configuration for a backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub backtest: BacktestSection,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSection {
    pub symbols: Vec<String>,
    #[serde(with = "instant")]
    pub start: NaiveDateTime,
    #[serde(with = "instant")]
    pub end: NaiveDateTime,
    #[serde(default = "Timeframe::one_minute")]
    pub timeframe: Timeframe,
    #[serde(default = "default_initial_balance")]
    pub initial_balance: f64,
    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,
    #[serde(default)]
    pub slippage_rate: f64,
    /// Hours added to ledger dates after the run (exchange time is UTC).
    #[serde(default = "default_display_offset")]
    pub display_offset_hours: i64,
}

fn default_initial_balance() -> f64 {
    10_000.0
}

fn default_fee_rate() -> f64 {
    0.0005
}

fn default_display_offset() -> i64 {
    8
}

/// Strategy selection and parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Long on a fast/slow SMA golden cross, flat on the death cross.
    MaCrossover { fast: usize, slow: usize, amount: f64 },
}

impl StrategyConfig {
    pub fn build(&self) -> Box<dyn Strategy> {
        match self {
            StrategyConfig::MaCrossover { fast, slow, amount } => {
                Box::new(MaCrossover::new(*fast, *slow, *amount))
            }
        }
    }

    fn validate(&self, registry: &IndicatorRegistry) -> Result<(), ConfigError> {
        match self {
            StrategyConfig::MaCrossover { fast, slow, amount } => {
                if *fast == 0 || fast >= slow {
                    return Err(ConfigError::Invalid(format!(
                        "ma_crossover needs 0 < fast < slow, got fast={fast} slow={slow}"
                    )));
                }
                if !amount.is_finite() || *amount <= 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "ma_crossover amount must be > 0, got {amount}"
                    )));
                }
            }
        }
        for name in self.build().indicators() {
            registry.validate(&name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_cache_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub partial_window: PartialWindow,
    #[serde(default = "default_persist_aggregates")]
    pub persist_aggregates: bool,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_cache_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_persist_aggregates() -> bool {
    true
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            root: default_cache_root(),
            partial_window: PartialWindow::default(),
            persist_aggregates: default_persist_aggregates(),
            retry: RetryPolicy::default(),
        }
    }
}

impl BacktestConfig {
    /// Parse from a TOML string.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Check every section and normalize symbols to `BASE/QUOTE`.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let bt = &mut self.backtest;
        if bt.symbols.is_empty() {
            return Err(ConfigError::Invalid("backtest.symbols is empty".into()));
        }
        let mut seen = BTreeSet::new();
        let mut normalized = Vec::with_capacity(bt.symbols.len());
        for symbol in &bt.symbols {
            let symbol = normalize_symbol(symbol)?;
            if !seen.insert(symbol.clone()) {
                return Err(ConfigError::Invalid(format!("duplicate symbol {symbol}")));
            }
            normalized.push(symbol);
        }
        bt.symbols = normalized;

        if bt.start >= bt.end {
            return Err(ConfigError::Invalid(format!(
                "backtest.start ({}) must be before backtest.end ({})",
                bt.start, bt.end
            )));
        }

        self.engine_config().validate()?;
        self.strategy.validate(&IndicatorRegistry::new())?;

        let eval = &self.evaluation;
        if !eval.risk_free_rate.is_finite() || eval.trading_days_per_year == 0 {
            return Err(ConfigError::Invalid(format!(
                "evaluation needs a finite risk_free_rate and trading_days_per_year > 0, got {} / {}",
                eval.risk_free_rate, eval.trading_days_per_year
            )));
        }
        if self.cache.retry.attempts == 0 {
            return Err(ConfigError::Invalid("cache.retry.attempts must be >= 1".into()));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(
            self.backtest.initial_balance,
            self.backtest.fee_rate,
            self.backtest.slippage_rate,
        )
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            root: self.cache.root.clone(),
            exchange: self.exchange.name.clone(),
            retry: self.cache.retry,
            partial_window: self.cache.partial_window,
            persist_aggregates: self.cache.persist_aggregates,
        }
    }

    /// Deterministic BLAKE3 hash of the serialized configuration.
    ///
    /// Two runs with identical configs share a RunId.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

/// Parse `YYYY-MM-DD`, `YYYY-MM-DD HH:MM`, `YYYY-MM-DD HH:MM:SS`, or the
/// same with a `T` separator.
pub fn parse_instant(text: &str) -> Result<NaiveDateTime, ConfigError> {
    let text = text.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ConfigError::InvalidInstant(text.to_string()))
}

mod instant {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format("%Y-%m-%d %H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let text = String::deserialize(d)?;
        super::parse_instant(&text).map_err(serde::de::Error::custom)
    }
}
