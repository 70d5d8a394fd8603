//! Gap detection over day partitions.
//!
//! Coverage is tracked at minute resolution: a file whose last bar opens at
//! 10:00 covers up to 10:01. Uncovered minutes that touch each other are
//! reported as one range.

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

use super::provider::TimeRange;

/// Truncate a timestamp to the start of its minute.
pub fn floor_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Round a timestamp up to the next minute boundary (identity if aligned).
pub fn ceil_minute(ts: NaiveDateTime) -> NaiveDateTime {
    let floored = floor_minute(ts);
    if floored == ts {
        ts
    } else {
        floored + Duration::minutes(1)
    }
}

/// Midnight at the start of the calendar day containing `ts`.
pub fn day_start(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date().and_time(NaiveTime::MIN)
}

/// Split `[start, end)` on calendar-day boundaries.
///
/// The first and last pieces are clipped to the requested bounds, so a
/// request starting at 13:00 yields a first partition of `[13:00, 24:00)`.
pub fn day_partitions(range: TimeRange) -> Vec<TimeRange> {
    let mut parts = Vec::new();
    let mut cursor = range.start;
    while cursor < range.end {
        let next_midnight = day_start(cursor) + Duration::days(1);
        let part_end = next_midnight.min(range.end);
        parts.push(TimeRange::new(cursor, part_end));
        cursor = part_end;
    }
    parts
}

/// Enumerate the minute-resolution sub-intervals of `[day_start, day_end)`
/// not covered by any of `existing`.
///
/// `existing` may be unsorted, overlapping, or extend past the day; only the
/// part inside the window matters. Adjacent uncovered minutes merge into one
/// range, and the result is ordered by start.
pub fn find_missing_ranges(
    existing: &[TimeRange],
    day_start: NaiveDateTime,
    day_end: NaiveDateTime,
) -> Vec<TimeRange> {
    let window = TimeRange::new(day_start, day_end);
    if window.is_empty() {
        return Vec::new();
    }

    let mut covered: Vec<TimeRange> = existing
        .iter()
        .filter_map(|iv| iv.clip(&window))
        .collect();
    covered.sort();

    let mut missing: Vec<TimeRange> = Vec::new();
    let mut cursor = day_start;
    for iv in &covered {
        if iv.start > cursor {
            push_gap(&mut missing, cursor, iv.start, &window);
        }
        cursor = cursor.max(iv.end);
    }
    if cursor < day_end {
        push_gap(&mut missing, cursor, day_end, &window);
    }
    missing
}

/// Widen a raw gap to whole minutes and append it, merging with the previous
/// gap when they touch.
fn push_gap(
    missing: &mut Vec<TimeRange>,
    start: NaiveDateTime,
    end: NaiveDateTime,
    window: &TimeRange,
) {
    let gap = TimeRange::new(
        floor_minute(start).max(window.start),
        ceil_minute(end).min(window.end),
    );
    if gap.is_empty() {
        return;
    }
    match missing.last_mut() {
        Some(prev) if prev.end >= gap.start => prev.end = prev.end.max(gap.end),
        _ => missing.push(gap),
    }
}
