//! Moving average crossover.
//!
//! - Flat and fast SMA crosses above slow SMA → open long `amount` at the close
//! - Long and fast SMA crosses below slow SMA → close the whole position
//! - Otherwise nothing

use serde::{Deserialize, Serialize};

use super::{BarContext, Strategy, StrategyError};
use crate::domain::{Direction, Signal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaCrossover {
    pub fast: usize,
    pub slow: usize,
    pub amount: f64,
}

impl MaCrossover {
    pub fn new(fast: usize, slow: usize, amount: f64) -> Self {
        Self { fast, slow, amount }
    }

    fn names(&self) -> (String, String) {
        (format!("sma{}", self.fast), format!("sma{}", self.slow))
    }
}

impl Strategy for MaCrossover {
    fn name(&self) -> &str {
        "ma_crossover"
    }

    fn indicators(&self) -> Vec<String> {
        let (fast, slow) = self.names();
        vec![fast, slow]
    }

    fn decide(&self, ctx: &BarContext<'_>) -> Result<Option<Signal>, StrategyError> {
        let (fast_name, slow_name) = self.names();
        let window = ctx.history.recent_window(ctx.date, 2);
        if window.len() < 2 {
            return Ok(None);
        }
        if !window.indicators[1].contains_key(&fast_name) {
            return Err(StrategyError::MissingIndicator(fast_name));
        }
        if !window.indicators[1].contains_key(&slow_name) {
            return Err(StrategyError::MissingIndicator(slow_name));
        }

        let fast = window.series(&fast_name);
        let slow = window.series(&slow_name);
        if fast.iter().chain(&slow).any(|v| v.is_nan()) {
            return Ok(None); // warmup
        }

        let crossed_up = fast[0] < slow[0] && fast[1] > slow[1];
        let crossed_down = fast[0] > slow[0] && fast[1] < slow[1];

        let signal = match ctx.position.direction {
            Direction::Flat if crossed_up => Some(Signal::long(ctx.bar.close, self.amount)),
            Direction::Long if crossed_down => {
                Some(Signal::close(ctx.bar.close, ctx.position.amount))
            }
            _ => None,
        };
        Ok(signal)
    }
}
