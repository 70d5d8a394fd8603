//! Indicator registry and precomputed indicator values.
//!
//! Indicators are pure functions of the close series, computed once per
//! symbol before the bar loop. Strategies ask for them by name (`sma5`,
//! `ema20`, `rsi14`, or a bare `rsi` for the default period) and read them
//! back row by row through the history view.
//!
//! # Look-ahead contamination guard
//! No value at bar t may depend on data from bar t+1 or later. Warmup rows
//! stay NaN; nothing is back-filled.

pub mod ema;
pub mod rsi;
pub mod sma;

pub use ema::ema;
pub use rsi::rsi;
pub use sma::sma;

use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::domain::Bar;

/// Period used when a name carries no number (`rsi`).
pub const DEFAULT_PERIOD: usize = 14;

/// An indicator kernel: input series and period in, same-length series out.
pub type IndicatorFn = fn(&[f64], usize) -> Vec<f64>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndicatorError {
    #[error("unknown indicator '{0}'")]
    Unknown(String),

    #[error("invalid period in indicator name '{0}'")]
    InvalidPeriod(String),
}

/// Split `sma5` into `("sma", 5)`; a bare kind gets [`DEFAULT_PERIOD`].
pub fn parse_name(name: &str) -> Result<(String, usize), IndicatorError> {
    let lower = name.trim().to_ascii_lowercase();
    let split = lower
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(lower.len());
    let (kind, digits) = lower.split_at(split);
    if kind.is_empty() {
        return Err(IndicatorError::Unknown(name.to_string()));
    }
    let period = if digits.is_empty() {
        DEFAULT_PERIOD
    } else {
        digits
            .parse::<usize>()
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| IndicatorError::InvalidPeriod(name.to_string()))?
    };
    Ok((kind.to_string(), period))
}

/// Explicit name → kernel table.
#[derive(Debug, Clone)]
pub struct IndicatorRegistry {
    kernels: HashMap<&'static str, IndicatorFn>,
}

impl Default for IndicatorRegistry {
    fn default() -> Self {
        let mut kernels: HashMap<&'static str, IndicatorFn> = HashMap::new();
        kernels.insert("sma", sma);
        kernels.insert("ema", ema);
        kernels.insert("rsi", rsi);
        Self { kernels }
    }
}

impl IndicatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: &'static str, kernel: IndicatorFn) {
        self.kernels.insert(kind, kernel);
    }

    /// Check a name without computing anything.
    pub fn validate(&self, name: &str) -> Result<(), IndicatorError> {
        let (kind, _) = parse_name(name)?;
        if self.kernels.contains_key(kind.as_str()) {
            Ok(())
        } else {
            Err(IndicatorError::Unknown(name.to_string()))
        }
    }

    /// Compute one named indicator over the close series of `bars`.
    pub fn compute(&self, name: &str, bars: &[Bar]) -> Result<Vec<f64>, IndicatorError> {
        let (kind, period) = parse_name(name)?;
        let kernel = self
            .kernels
            .get(kind.as_str())
            .ok_or_else(|| IndicatorError::Unknown(name.to_string()))?;
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        Ok(kernel(&closes, period))
    }

    /// Compute every requested name, keyed by the name as requested.
    pub fn compute_all(
        &self,
        names: &[String],
        bars: &[Bar],
    ) -> Result<IndicatorValues, IndicatorError> {
        let mut values = IndicatorValues::new();
        for name in names {
            values.insert(name.clone(), self.compute(name, bars)?);
        }
        Ok(values)
    }
}

/// Container for precomputed indicator values.
///
/// Built once before the bar loop, then queried by bar index during the loop.
#[derive(Debug, Clone, Default)]
pub struct IndicatorValues {
    series: BTreeMap<String, Vec<f64>>,
}

impl IndicatorValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.series.insert(name.into(), values);
    }

    /// Value of `name` at `bar_index`, if both exist.
    pub fn get(&self, name: &str, bar_index: usize) -> Option<f64> {
        self.series
            .get(name)
            .and_then(|v| v.get(bar_index).copied())
    }

    pub fn get_series(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(|v| v.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// All indicator values at one bar, keyed by name.
    pub fn row(&self, bar_index: usize) -> BTreeMap<String, f64> {
        self.series
            .iter()
            .filter_map(|(name, v)| v.get(bar_index).map(|x| (name.clone(), *x)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
