//! Deterministic synthetic minute bars for offline runs and tests.
//!
//! Each bar is derived only from the symbol and its own timestamp, so the
//! same minute always yields the same bar no matter how the requests are
//! paged. Results built on synthetic data are not real prices.

use chrono::{NaiveDateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::gaps::floor_minute;
use super::provider::{DataError, DataProvider};
use crate::domain::{Bar, Timeframe};

/// Minutes in one full cycle of the synthetic trend.
const CYCLE_MINUTES: f64 = 3.0 * 1440.0;

#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    page_size: usize,
    listed_at: Option<NaiveDateTime>,
    until: Option<NaiveDateTime>,
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self {
            page_size: 1000,
            listed_at: None,
            until: None,
        }
    }
}

impl SyntheticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// No bars before this instant.
    pub fn listed_at(mut self, ts: NaiveDateTime) -> Self {
        self.listed_at = Some(ts);
        self
    }

    /// No bars at or after this instant.
    pub fn until(mut self, ts: NaiveDateTime) -> Self {
        self.until = Some(ts);
        self
    }

    fn seed(symbol: &str, minute: i64) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(symbol.as_bytes());
        hasher.update(&minute.to_le_bytes());
        *hasher.finalize().as_bytes()
    }

    fn base_price(symbol: &str) -> f64 {
        let hash = blake3::hash(symbol.as_bytes());
        let bytes = hash.as_bytes();
        let n = u16::from_le_bytes([bytes[0], bytes[1]]);
        50.0 + f64::from(n % 1000)
    }

    /// Close price of the minute starting at `minute` (minutes since epoch).
    fn close_at(symbol: &str, minute: i64) -> f64 {
        let mut rng = StdRng::from_seed(Self::seed(symbol, minute));
        let phase = (minute as f64 / CYCLE_MINUTES) * std::f64::consts::TAU;
        let trend = 1.0 + 0.15 * phase.sin();
        let noise: f64 = rng.gen_range(-0.002..0.002);
        Self::base_price(symbol) * trend * (1.0 + noise)
    }

    /// The bar for the minute starting at `ts`.
    pub fn bar_at(symbol: &str, ts: NaiveDateTime) -> Bar {
        let minute = ts.and_utc().timestamp() / 60;
        let open = Self::close_at(symbol, minute - 1);
        let close = Self::close_at(symbol, minute);

        let mut rng = StdRng::from_seed(Self::seed(symbol, !minute));
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.001));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.001));
        let volume = rng.gen_range(1.0..50.0);

        Bar {
            timestamp: ts,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl DataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
        since: NaiveDateTime,
    ) -> Result<Vec<Bar>, DataError> {
        if !timeframe.is_native() {
            return Err(DataError::Other(format!(
                "synthetic provider only serves 1m bars, got {timeframe}"
            )));
        }

        let now = floor_minute(Utc::now().naive_utc());
        let stop = self.until.map_or(now, |u| u.min(now));
        let mut ts = match self.listed_at {
            Some(listed) if listed > since => listed,
            _ => since,
        };
        if ts != floor_minute(ts) {
            ts = floor_minute(ts) + timeframe.duration();
        }

        let mut bars = Vec::with_capacity(self.page_size.min(1440));
        while ts < stop && bars.len() < self.page_size {
            bars.push(Self::bar_at(symbol, ts));
            ts += timeframe.duration();
        }
        Ok(bars)
    }
}
