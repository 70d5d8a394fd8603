//! Signal — a strategy's per-bar instruction to the engine.

use serde::{Deserialize, Serialize};

use super::position::Side;

/// What the strategy wants done on this bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Long,
    Short,
    Close,
}

/// One instruction: open/add in a direction, or close some amount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub action: SignalAction,
    pub price: f64,
    pub amount: f64,
}

impl Signal {
    pub fn long(price: f64, amount: f64) -> Self {
        Self {
            action: SignalAction::Long,
            price,
            amount,
        }
    }

    pub fn short(price: f64, amount: f64) -> Self {
        Self {
            action: SignalAction::Short,
            price,
            amount,
        }
    }

    pub fn close(price: f64, amount: f64) -> Self {
        Self {
            action: SignalAction::Close,
            price,
            amount,
        }
    }

    /// The opening side, or `None` for a close.
    pub fn opening_side(&self) -> Option<Side> {
        match self.action {
            SignalAction::Long => Some(Side::Long),
            SignalAction::Short => Some(Side::Short),
            SignalAction::Close => None,
        }
    }

    /// Price and amount are both finite and strictly positive.
    pub fn is_well_formed(&self) -> bool {
        self.price.is_finite() && self.price > 0.0 && self.amount.is_finite() && self.amount > 0.0
    }
}
