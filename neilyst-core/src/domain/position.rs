//! Position — per-symbol exposure state machine.
//!
//! Flat → Long/Short → Flat, re-enterable. A position reaching zero amount is
//! terminal: the engine records it and replaces it with a fresh `Position`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Residual amounts below this fraction of the held size count as zero.
const DUST_TOLERANCE: f64 = 1e-12;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Flat,
    Long,
    Short,
}

/// Direction of an opening leg. A position can never be opened "flat".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Direction::Flat => "flat",
            Direction::Long => "long",
            Direction::Short => "short",
        })
    }
}

impl From<Side> for Direction {
    fn from(side: Side) -> Self {
        match side {
            Side::Long => Direction::Long,
            Side::Short => Direction::Short,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositionError {
    #[error("cannot close {requested} of {symbol}: only {held} held")]
    ExceedsHeld {
        symbol: String,
        requested: f64,
        held: f64,
    },

    #[error("cannot open {requested:?} on {symbol}: position is already {held:?}")]
    OppositeDirection {
        symbol: String,
        held: Direction,
        requested: Side,
    },

    #[error("invalid amount {0} (must be finite and > 0)")]
    InvalidAmount(f64),

    #[error("invalid price {0} (must be finite and > 0)")]
    InvalidPrice(f64),
}

/// Open exposure for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub direction: Direction,
    pub amount: f64,
    /// Notional-weighted average entry price.
    pub open_price: f64,
    pub close_price: Option<f64>,
    /// Timestamp of the first opening leg.
    pub open_date: Option<NaiveDateTime>,
    pub close_date: Option<NaiveDateTime>,
    /// Gross PnL realized by closing legs.
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    /// Fee + slippage charged on opening legs.
    pub trade_cost: f64,
    /// Fee + slippage charged on closing legs.
    pub close_cost: f64,
    /// Total quantity closed so far.
    pub closed_amount: f64,
}

impl Position {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            direction: Direction::Flat,
            amount: 0.0,
            open_price: 0.0,
            close_price: None,
            open_date: None,
            close_date: None,
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            trade_cost: 0.0,
            close_cost: 0.0,
            closed_amount: 0.0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.direction == Direction::Flat
    }

    /// Whether this position has been opened and fully closed.
    pub fn is_closed(&self) -> bool {
        self.is_flat() && self.close_date.is_some()
    }

    /// Recompute mark-to-market PnL at `current_price`.
    pub fn update_unrealized(&mut self, current_price: f64) {
        self.unrealized_pnl = match self.direction {
            Direction::Long => (current_price - self.open_price) * self.amount,
            Direction::Short => (self.open_price - current_price) * self.amount,
            Direction::Flat => 0.0,
        };
    }

    /// Value of the open exposure for equity accounting.
    ///
    /// Longs hold the asset, so their full notional counts. Shorts are carried
    /// without margin, so only their unrealized PnL counts.
    pub fn mark_value(&self, current_price: f64) -> f64 {
        match self.direction {
            Direction::Long => self.amount * current_price,
            Direction::Short => (self.open_price - current_price) * self.amount,
            Direction::Flat => 0.0,
        }
    }

    /// Open or add to the position.
    ///
    /// Adding in the same direction re-averages `open_price` by notional.
    /// Opening against an existing opposite position is refused.
    pub fn open(
        &mut self,
        price: f64,
        amount: f64,
        side: Side,
        date: NaiveDateTime,
    ) -> Result<(), PositionError> {
        validate_price(price)?;
        validate_amount(amount)?;

        match (self.direction, side) {
            (Direction::Flat, _) => {
                if self.is_closed() {
                    *self = Position::new(std::mem::take(&mut self.symbol));
                }
                self.direction = side.into();
                self.open_price = price;
                self.amount = amount;
                self.open_date = Some(date);
            }
            (Direction::Long, Side::Long) | (Direction::Short, Side::Short) => {
                let combined = self.amount + amount;
                self.open_price = (self.open_price * self.amount + price * amount) / combined;
                self.amount = combined;
            }
            (held, requested) => {
                return Err(PositionError::OppositeDirection {
                    symbol: self.symbol.clone(),
                    held,
                    requested,
                });
            }
        }
        Ok(())
    }

    /// Close `amount` at `price`, returning the gross PnL of this leg.
    ///
    /// Closing more than is held is refused without touching state. When the
    /// amount reaches zero the position becomes flat and stamps its close.
    pub fn close(
        &mut self,
        price: f64,
        amount: f64,
        date: NaiveDateTime,
    ) -> Result<f64, PositionError> {
        validate_price(price)?;
        validate_amount(amount)?;
        if self.is_flat() || amount > self.amount {
            return Err(PositionError::ExceedsHeld {
                symbol: self.symbol.clone(),
                requested: amount,
                held: self.amount,
            });
        }

        let pnl = match self.direction {
            Direction::Long => (price - self.open_price) * amount,
            Direction::Short => (self.open_price - price) * amount,
            Direction::Flat => 0.0,
        };
        let held_before = self.amount;
        self.realized_pnl += pnl;
        self.closed_amount += amount;
        self.amount -= amount;

        if self.amount <= held_before * DUST_TOLERANCE {
            self.amount = 0.0;
            self.direction = Direction::Flat;
            self.unrealized_pnl = 0.0;
            self.close_date = Some(date);
            self.close_price = Some(price);
        } else {
            self.update_unrealized(price);
        }
        Ok(pnl)
    }
}

fn validate_amount(amount: f64) -> Result<(), PositionError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(PositionError::InvalidAmount(amount))
    }
}

fn validate_price(price: f64) -> Result<(), PositionError> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        Err(PositionError::InvalidPrice(price))
    }
}
