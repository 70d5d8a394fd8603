//! Balance and ledger bookkeeping for one symbol.
//!
//! Longs are cash-funded: opening debits notional plus cost, closing credits
//! exit notional minus cost. Shorts carry no margin: opening debits only the
//! cost, closing credits `(entry - exit) * amount` minus cost. Either way the
//! balance change over a round trip equals the trade's net pnl.

use chrono::NaiveDateTime;
use tracing::debug;

use super::config::EngineConfig;
use crate::domain::{Direction, Position, PositionError, Side, TradeRecord};

#[derive(Debug, Clone)]
pub struct SymbolAccount {
    config: EngineConfig,
    balance: f64,
    position: Position,
    ledger: Vec<TradeRecord>,
}

impl SymbolAccount {
    pub fn new(symbol: impl Into<String>, config: EngineConfig) -> Self {
        Self {
            balance: config.initial_balance,
            config,
            position: Position::new(symbol),
            ledger: Vec::new(),
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn ledger(&self) -> &[TradeRecord] {
        &self.ledger
    }

    pub fn mark(&mut self, price: f64) {
        self.position.update_unrealized(price);
    }

    /// Balance plus the open exposure marked at `price`.
    pub fn equity(&self, price: f64) -> f64 {
        self.balance + self.position.mark_value(price)
    }

    /// Open or add. The position is untouched if it refuses.
    pub fn open(
        &mut self,
        side: Side,
        price: f64,
        amount: f64,
        date: NaiveDateTime,
    ) -> Result<(), PositionError> {
        self.position.open(price, amount, side, date)?;

        let cost = self.config.leg_cost(price, amount);
        self.position.trade_cost += cost;
        self.balance -= match side {
            Side::Long => price * amount + cost,
            Side::Short => cost,
        };
        debug!(
            symbol = %self.position.symbol,
            ?side,
            price,
            amount,
            cost,
            balance = self.balance,
            "opened"
        );
        Ok(())
    }

    /// Close `amount` (already clamped by the caller). Returns the trade
    /// record when this leg flattens the position.
    pub fn close(
        &mut self,
        price: f64,
        amount: f64,
        date: NaiveDateTime,
    ) -> Result<Option<TradeRecord>, PositionError> {
        let direction = self.position.direction;
        let gross = self.position.close(price, amount, date)?;

        let cost = self.config.leg_cost(price, amount);
        self.position.close_cost += cost;
        self.balance += match direction {
            Direction::Short => gross - cost,
            _ => price * amount - cost,
        };

        if !self.position.is_flat() {
            debug!(symbol = %self.position.symbol, price, amount, gross, "partial close");
            return Ok(None);
        }

        let pos = &self.position;
        let record = TradeRecord {
            symbol: pos.symbol.clone(),
            direction,
            open_date: pos.open_date.unwrap_or(date),
            open_price: pos.open_price,
            close_date: date,
            close_price: price,
            amount: pos.closed_amount,
            pnl: pos.realized_pnl - pos.trade_cost - pos.close_cost,
            open_fee: pos.trade_cost,
            close_fee: pos.close_cost,
            balance_after: self.balance,
        };
        debug!(
            symbol = %record.symbol,
            direction = ?record.direction,
            pnl = record.pnl,
            balance = self.balance,
            "trade closed"
        );
        self.ledger.push(record.clone());
        self.position = Position::new(std::mem::take(&mut self.position.symbol));
        Ok(Some(record))
    }

    pub fn into_parts(self) -> (f64, Position, Vec<TradeRecord>) {
        (self.balance, self.position, self.ledger)
    }
}
