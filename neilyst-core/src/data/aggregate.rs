//! Fold native 1-minute bars into coarser fixed windows.
//!
//! Windows are anchored at the first bar's timestamp and bucketed by clock
//! time, so a missing minute shortens its window instead of shifting every
//! later window. Only the final window can be short for lack of data; it is
//! kept by default and carries its true bar count.

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, Timeframe};

/// What to do with a trailing window that has fewer bars than its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialWindow {
    #[default]
    Keep,
    Drop,
}

/// An aggregated bar plus the number of native bars folded into it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedBar {
    pub bar: Bar,
    pub bar_count: usize,
}

/// Aggregate ordered 1-minute `bars` into `timeframe` windows.
pub fn aggregate(bars: &[Bar], timeframe: &Timeframe, partial: PartialWindow) -> Vec<AggregatedBar> {
    let Some(first) = bars.first() else {
        return Vec::new();
    };
    let anchor = first.timestamp;
    let window = i64::from(timeframe.minutes());

    let mut out: Vec<(i64, AggregatedBar)> = Vec::new();
    for bar in bars {
        let bucket = (bar.timestamp - anchor).num_minutes().div_euclid(window);
        match out.last_mut() {
            Some((current, agg)) if *current == bucket => {
                agg.bar.high = agg.bar.high.max(bar.high);
                agg.bar.low = agg.bar.low.min(bar.low);
                agg.bar.close = bar.close;
                agg.bar.volume += bar.volume;
                agg.bar_count += 1;
            }
            _ => {
                let timestamp = anchor + timeframe.duration() * bucket as i32;
                out.push((
                    bucket,
                    AggregatedBar {
                        bar: Bar { timestamp, ..*bar },
                        bar_count: 1,
                    },
                ));
            }
        }
    }

    if partial == PartialWindow::Drop {
        if let Some((_, last)) = out.last() {
            if last.bar_count < timeframe.minutes() as usize {
                out.pop();
            }
        }
    }

    out.into_iter().map(|(_, agg)| agg).collect()
}

/// Aggregate and discard the bar counts.
pub fn aggregate_bars(bars: &[Bar], timeframe: &Timeframe, partial: PartialWindow) -> Vec<Bar> {
    aggregate(bars, timeframe, partial)
        .into_iter()
        .map(|agg| agg.bar)
        .collect()
}
