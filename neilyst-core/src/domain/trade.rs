//! TradeRecord — a completed round trip, appended to the ledger on full close.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::position::Direction;

/// A complete round-trip trade record: open → full close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub direction: Direction,

    // ── Entry ──
    pub open_date: NaiveDateTime,
    pub open_price: f64,

    // ── Exit ──
    pub close_date: NaiveDateTime,
    pub close_price: f64,

    /// Total quantity closed over the round trip.
    pub amount: f64,

    /// Net PnL: gross realized PnL minus both fee legs.
    pub pnl: f64,
    pub open_fee: f64,
    pub close_fee: f64,

    /// Account balance right after this trade closed.
    pub balance_after: f64,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn is_loser(&self) -> bool {
        self.pnl < 0.0
    }

    pub fn holding_time(&self) -> Duration {
        self.close_date - self.open_date
    }

    /// Move both timestamps by a fixed number of hours.
    pub fn shift_hours(&mut self, hours: i64) {
        let offset = Duration::hours(hours);
        self.open_date += offset;
        self.close_date += offset;
    }
}
