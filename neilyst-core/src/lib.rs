//! Neilyst Core: domain types, archival bar cache, indicators, strategy
//! contract, and the single-symbol replay engine.
//!
//! - Domain types (bars, timeframes, positions, signals, trade records)
//! - Day-partitioned OHLCV cache with gap detection and aggregation
//! - Indicator registry (sma, ema, rsi)
//! - Strategy trait with a cursor-bounded history view
//! - Bar-by-bar replay with fee/slippage accounting

pub mod data;
pub mod domain;
pub mod engine;
pub mod indicators;
pub mod strategy;
