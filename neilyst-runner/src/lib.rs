//! Neilyst Runner: backtest orchestration, metrics, export.
//!
//! This crate builds on `neilyst-core` to provide:
//! - TOML backtest configuration with fail-fast validation
//! - Multi-symbol fan-out with per-symbol failure isolation
//! - Performance evaluation for single symbols and combined portfolios
//! - JSON / CSV / Markdown export

pub mod config;
pub mod export;
pub mod metrics;
pub mod orchestrator;
pub mod runner;

pub use config::{parse_instant, BacktestConfig, ConfigError, RunId, StrategyConfig};
pub use metrics::{
    evaluate, evaluate_many, evaluate_period, Evaluation, EvaluationConfig, MetricsError,
    PerformanceReport,
};
pub use orchestrator::{run_symbols, shift_run, MultiRunResult};
pub use runner::{
    run_backtest, run_single, run_with_provider, BacktestResult, DataSource, RunError,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<BacktestConfig>();
        assert_sync::<BacktestConfig>();
        assert_send::<EvaluationConfig>();
        assert_sync::<EvaluationConfig>();
    }

    #[test]
    fn result_types_are_send_sync() {
        assert_send::<BacktestResult>();
        assert_sync::<BacktestResult>();
        assert_send::<MultiRunResult>();
        assert_sync::<MultiRunResult>();
        assert_send::<Evaluation>();
        assert_sync::<Evaluation>();
    }

    #[test]
    fn run_error_is_send() {
        assert_send::<RunError>();
    }
}
