//! Data provider trait and structured error types.
//!
//! The DataProvider trait abstracts over bar sources (exchange REST API,
//! synthetic generator) so we can swap implementations and mock for tests.
//! The cache layer sits above this trait — providers don't know about the cache.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::{Bar, Timeframe, TimeframeError};

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts < self.end
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Intersection with `other`, or `None` if they don't overlap.
    pub fn clip(&self, other: &TimeRange) -> Option<TimeRange> {
        let clipped = TimeRange::new(self.start.max(other.start), self.end.min(other.end));
        (!clipped.is_empty()).then_some(clipped)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M")
        )
    }
}

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("data unavailable for {symbol} in {range} after {attempts} attempts: {reason}")]
    DataUnavailable {
        symbol: String,
        range: TimeRange,
        attempts: u32,
        reason: String,
    },

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] TimeframeError),

    #[error("data error: {0}")]
    Other(String),
}

/// Source of raw OHLCV bars.
///
/// `fetch` returns bars starting at `since` in ascending order. A provider may
/// return fewer bars than a full page (near listing date or the present), and
/// an empty page signals that no more data exists after `since`.
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    fn fetch(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
        since: NaiveDateTime,
    ) -> Result<Vec<Bar>, DataError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn range_clip_and_overlap() {
        let a = TimeRange::new(t(1), t(5));
        let b = TimeRange::new(t(4), t(8));
        let c = TimeRange::new(t(5), t(6));

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert_eq!(a.clip(&b), Some(TimeRange::new(t(4), t(5))));
        assert_eq!(a.clip(&c), None);
        assert!(a.contains(t(1)));
        assert!(!a.contains(t(5)));
    }

    #[test]
    fn unavailable_error_names_range() {
        let err = DataError::DataUnavailable {
            symbol: "BTC/USDT".into(),
            range: TimeRange::new(t(1), t(2)),
            attempts: 3,
            reason: "timeout".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2024-03-01 01:00"));
        assert!(msg.contains("3 attempts"));
    }
}
