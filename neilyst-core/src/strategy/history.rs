//! Bars plus precomputed indicators for one symbol, and the cursor-bounded
//! view strategies see during replay.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

use crate::domain::Bar;
use crate::indicators::{IndicatorError, IndicatorRegistry, IndicatorValues};

/// The full replay input for one symbol.
#[derive(Debug, Clone)]
pub struct MarketHistory {
    bars: Vec<Bar>,
    indicators: IndicatorValues,
}

impl MarketHistory {
    pub fn new(bars: Vec<Bar>, indicators: IndicatorValues) -> Self {
        Self { bars, indicators }
    }

    /// Compute `names` over `bars` through `registry`.
    pub fn build(
        bars: Vec<Bar>,
        names: &[String],
        registry: &IndicatorRegistry,
    ) -> Result<Self, IndicatorError> {
        let indicators = registry.compute_all(names, &bars)?;
        Ok(Self::new(bars, indicators))
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn indicators(&self) -> &IndicatorValues {
        &self.indicators
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// View of rows `0..=cursor`.
    pub fn view(&self, cursor: usize) -> HistoryView<'_> {
        HistoryView {
            history: self,
            end: (cursor + 1).min(self.bars.len()),
        }
    }

    /// Last `n` rows at or before `date`.
    pub fn recent_window(&self, date: NaiveDateTime, n: usize) -> RecentWindow {
        window(self, self.bars.len(), date, n)
    }
}

/// A [`MarketHistory`] cut off at the current bar.
///
/// Rows past the cursor are unreachable through this type, whatever date
/// the caller asks for.
#[derive(Debug, Clone, Copy)]
pub struct HistoryView<'a> {
    history: &'a MarketHistory,
    end: usize,
}

impl<'a> HistoryView<'a> {
    pub fn len(&self) -> usize {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    pub fn bars(&self) -> &'a [Bar] {
        &self.history.bars[..self.end]
    }

    /// Indicator value at `index`, `None` past the cursor.
    pub fn value(&self, name: &str, index: usize) -> Option<f64> {
        if index >= self.end {
            return None;
        }
        self.history.indicators.get(name, index)
    }

    /// Indicator value at the cursor.
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.end.checked_sub(1).and_then(|i| self.value(name, i))
    }

    pub fn recent_window(&self, date: NaiveDateTime, n: usize) -> RecentWindow {
        window(self.history, self.end, date, n)
    }
}

/// Bars and indicator rows for a contiguous run ending at some date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecentWindow {
    pub bars: Vec<Bar>,
    pub indicators: Vec<BTreeMap<String, f64>>,
}

impl RecentWindow {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// One indicator across the window, oldest first. NaN where missing.
    pub fn series(&self, name: &str) -> Vec<f64> {
        self.indicators
            .iter()
            .map(|row| row.get(name).copied().unwrap_or(f64::NAN))
            .collect()
    }
}

fn window(history: &MarketHistory, limit: usize, date: NaiveDateTime, n: usize) -> RecentWindow {
    let visible = &history.bars[..limit];
    let stop = visible.partition_point(|b| b.timestamp <= date);
    let start = stop.saturating_sub(n);
    RecentWindow {
        bars: visible[start..stop].to_vec(),
        indicators: (start..stop).map(|i| history.indicators.row(i)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn t(i: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::minutes(i)
    }

    fn history(n: usize) -> MarketHistory {
        let bars: Vec<Bar> = (0..n)
            .map(|i| Bar {
                timestamp: t(i as i64),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: i as f64 + 1.0,
                volume: 1.0,
            })
            .collect();
        MarketHistory::build(bars, &["sma2".into()], &IndicatorRegistry::new()).unwrap()
    }

    #[test]
    fn recent_window_ends_at_date() {
        let h = history(10);
        let w = h.recent_window(t(5), 3);
        assert_eq!(w.len(), 3);
        assert_eq!(w.bars.last().unwrap().timestamp, t(5));
        assert_eq!(w.closes(), vec![4.0, 5.0, 6.0]);
        assert_eq!(w.series("sma2"), vec![3.5, 4.5, 5.5]);
    }

    #[test]
    fn recent_window_before_first_bar_is_empty() {
        let h = history(5);
        assert!(h.recent_window(t(-1), 3).is_empty());
    }

    #[test]
    fn window_shorter_than_n_near_start() {
        let h = history(5);
        let w = h.recent_window(t(1), 10);
        assert_eq!(w.len(), 2);
        assert!(w.series("sma2")[0].is_nan());
    }

    #[test]
    fn view_cannot_see_past_cursor() {
        let h = history(10);
        let view = h.view(4);
        assert_eq!(view.len(), 5);
        assert_eq!(view.bars().last().unwrap().timestamp, t(4));

        // Asking for a later date still stops at the cursor
        let w = view.recent_window(t(9), 3);
        assert_eq!(w.bars.last().unwrap().timestamp, t(4));
        assert_eq!(view.value("sma2", 5), None);
        assert_eq!(view.latest("sma2"), Some(4.5));
    }
}
