//! Engine configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be finite, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("{field} must be >= 0, got {value}")]
    Negative { field: &'static str, value: f64 },
}

/// Configuration for a single-symbol replay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub initial_balance: f64,
    /// Fractional fee on notional, charged on both legs.
    pub fee_rate: f64,
    /// Fractional slippage on notional, charged on both legs.
    pub slippage_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            fee_rate: 0.0005,
            slippage_rate: 0.0,
        }
    }
}

impl EngineConfig {
    pub fn new(initial_balance: f64, fee_rate: f64, slippage_rate: f64) -> Self {
        Self {
            initial_balance,
            fee_rate,
            slippage_rate,
        }
    }

    /// No fees, no slippage.
    pub fn frictionless(initial_balance: f64) -> Self {
        Self::new(initial_balance, 0.0, 0.0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("initial_balance", self.initial_balance),
            ("fee_rate", self.fee_rate),
            ("slippage_rate", self.slippage_rate),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { field, value });
            }
            if value < 0.0 {
                return Err(ConfigError::Negative { field, value });
            }
        }
        Ok(())
    }

    /// Cost of trading `amount` at `price` on one leg.
    pub fn leg_cost(&self, price: f64, amount: f64) -> f64 {
        price * amount * (self.fee_rate + self.slippage_rate)
    }
}
