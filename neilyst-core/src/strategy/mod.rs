//! Strategy contract.
//!
//! A strategy is asked once per bar what to do, given the bar, the current
//! position, the balance, and a history view that ends at this bar. It
//! returns at most one [`Signal`]; `None` means "do nothing".
//!
//! Strategies are shared read-only across symbol workers, so `decide` takes
//! `&self` and the trait requires `Send + Sync`.

pub mod history;
pub mod ma_cross;

pub use history::{HistoryView, MarketHistory, RecentWindow};
pub use ma_cross::MaCrossover;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::domain::{Bar, Position, Signal};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    #[error("{0}")]
    Message(String),

    #[error("indicator '{0}' was not precomputed")]
    MissingIndicator(String),
}

/// Everything a strategy may look at for one bar.
#[derive(Debug, Clone, Copy)]
pub struct BarContext<'a> {
    pub symbol: &'a str,
    pub date: NaiveDateTime,
    pub bar: &'a Bar,
    pub position: &'a Position,
    pub balance: f64,
    pub history: HistoryView<'a>,
}

pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Indicator names to precompute before replay (`sma5`, `rsi14`, ...).
    fn indicators(&self) -> Vec<String>;

    fn decide(&self, ctx: &BarContext<'_>) -> Result<Option<Signal>, StrategyError>;
}
