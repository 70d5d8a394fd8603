//! Day-partitioned CSV bar cache.
//!
//! Layout: `{root}/{exchange}-{BASE}_{QUOTE}/{timeframe}/{first} - {last}.csv`
//! where `first`/`last` are the actual first and last bar timestamps in the
//! file, formatted `YYYY-MM-DD-HH:MM`. One calendar day may hold several
//! non-overlapping files.
//!
//! Features:
//! - Gap detection per day, fetching only the missing ranges
//! - Per-range retry; a failed range does not block the others
//! - Atomic writes (write to .tmp, rename into place), serialized per day
//! - Quarantine for corrupt files ({filename}.quarantined)
//! - Aggregation of native 1-minute bars into any supported timeframe

use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::aggregate::{aggregate, PartialWindow};
use super::gaps::{day_partitions, day_start, find_missing_ranges, floor_minute};
use super::provider::{DataError, DataProvider, TimeRange};
use super::retry::RetryPolicy;
use crate::domain::{normalize_series, normalize_symbol, Bar, Timeframe};

const FILE_STAMP: &str = "%Y-%m-%d-%H:%M";
const ROW_STAMP: &str = "%Y-%m-%d %H:%M:%S";
const CSV_HEADER: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

/// Cache settings. Everything the cache needs is passed in here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub root: PathBuf,
    pub exchange: String,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub partial_window: PartialWindow,
    /// Also write aggregated timeframes to their own directories.
    #[serde(default = "default_true")]
    pub persist_aggregates: bool,
}

fn default_true() -> bool {
    true
}

impl CacheConfig {
    pub fn new(root: impl Into<PathBuf>, exchange: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            exchange: exchange.into(),
            retry: RetryPolicy::default(),
            partial_window: PartialWindow::Keep,
            persist_aggregates: true,
        }
    }

    pub fn with_retry(mut self, attempts: u32, pause: Duration) -> Self {
        self.retry = RetryPolicy::new(attempts, pause);
        self
    }
}

/// A missing range that could not be filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedRange {
    pub range: TimeRange,
    pub attempts: u32,
    pub reason: String,
}

/// Bars returned by [`BarCache::get_bars`], plus any ranges left unfilled.
#[derive(Debug, Clone, Default)]
pub struct LoadedBars {
    pub symbol: String,
    pub bars: Vec<Bar>,
    pub unresolved: Vec<UnresolvedRange>,
}

impl LoadedBars {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Fail with `DataUnavailable` naming the first unfilled range, if any.
    pub fn require_complete(self) -> Result<Vec<Bar>, DataError> {
        match self.unresolved.into_iter().next() {
            None => Ok(self.bars),
            Some(u) => Err(DataError::DataUnavailable {
                symbol: self.symbol,
                range: u.range,
                attempts: u.attempts,
                reason: u.reason,
            }),
        }
    }
}

/// One cache file and the interval it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedFile {
    pub path: PathBuf,
    pub first: NaiveDateTime,
    pub last: NaiveDateTime,
    /// `[first, last + one bar)`
    pub covered: TimeRange,
}

/// Summary of one timeframe directory for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionStatus {
    pub timeframe: String,
    pub files: usize,
    pub first: Option<NaiveDateTime>,
    pub last: Option<NaiveDateTime>,
}

/// Lock table keyed by day-partition path.
#[derive(Debug, Default)]
struct PartitionLocks {
    inner: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PartitionLocks {
    fn lock_for(&self, key: PathBuf) -> Arc<Mutex<()>> {
        let mut table = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        table.entry(key).or_default().clone()
    }
}

/// The archival bar cache.
pub struct BarCache {
    config: CacheConfig,
    provider: Option<Arc<dyn DataProvider>>,
    locks: PartitionLocks,
}

impl BarCache {
    /// Cache without a provider: missing ranges are reported, never fetched.
    pub fn offline(config: CacheConfig) -> Self {
        Self {
            config,
            provider: None,
            locks: PartitionLocks::default(),
        }
    }

    pub fn new(config: CacheConfig, provider: Arc<dyn DataProvider>) -> Self {
        Self {
            config,
            provider: Some(provider),
            locks: PartitionLocks::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Directory for a symbol + timeframe.
    pub fn partition_dir(&self, symbol: &str, timeframe: &Timeframe) -> Result<PathBuf, DataError> {
        let symbol = normalize_symbol(symbol)?;
        Ok(self
            .symbol_dir(&symbol)
            .join(timeframe.label()))
    }

    fn symbol_dir(&self, normalized_symbol: &str) -> PathBuf {
        self.config.root.join(format!(
            "{}-{}",
            self.config.exchange,
            normalized_symbol.replace('/', "_")
        ))
    }

    /// Bars for `[start, end)` at `timeframe`, filling gaps from the provider.
    ///
    /// Native 1-minute data is always what gets fetched and stored; other
    /// timeframes are aggregated from it.
    pub fn get_bars(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        timeframe: &Timeframe,
    ) -> Result<LoadedBars, DataError> {
        let symbol = normalize_symbol(symbol)?;
        let unresolved = self.fill_gaps(&symbol, start, end)?;
        let native = self.load_native(&symbol, start, end)?;

        let bars = if timeframe.is_native() {
            native
        } else {
            let aggregated = aggregate(&native, timeframe, self.config.partial_window);
            if self.config.persist_aggregates {
                // Short windows would be read back later as if complete
                let full = timeframe.minutes() as usize;
                let complete: Vec<Bar> = aggregated
                    .iter()
                    .filter(|agg| agg.bar_count == full)
                    .map(|agg| agg.bar)
                    .collect();
                if !complete.is_empty() {
                    let dir = self.partition_dir(&symbol, timeframe)?;
                    self.write_partitioned(&dir, &complete, timeframe)?;
                }
            }
            aggregated.into_iter().map(|agg| agg.bar).collect()
        };

        info!(
            %symbol,
            timeframe = %timeframe,
            bars = bars.len(),
            unresolved = unresolved.len(),
            "loaded bars"
        );
        Ok(LoadedBars {
            symbol,
            bars,
            unresolved,
        })
    }

    /// Missing native ranges for `[start, end)`, one or more per day.
    pub fn missing_ranges(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<TimeRange>, DataError> {
        let symbol = normalize_symbol(symbol)?;
        let dir = self.partition_dir(&symbol, &Timeframe::one_minute())?;
        let files = list_files(&dir, &Timeframe::one_minute())?;
        let covered: Vec<TimeRange> = files.iter().map(|f| f.covered).collect();

        let now = floor_minute(Utc::now().naive_utc());
        let window = TimeRange::new(floor_minute(start), end.min(now));

        Ok(day_partitions(window)
            .into_iter()
            .flat_map(|day| find_missing_ranges(&covered, day.start, day.end))
            .collect())
    }

    /// Fetch and persist every missing native range. Returns the ranges that
    /// exhausted their retries; the rest are on disk.
    pub fn fill_gaps(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<UnresolvedRange>, DataError> {
        let symbol = normalize_symbol(symbol)?;
        let missing = self.missing_ranges(&symbol, start, end)?;
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        let Some(provider) = self.provider.as_deref() else {
            debug!(%symbol, ranges = missing.len(), "offline cache: leaving gaps unfilled");
            return Ok(missing
                .into_iter()
                .map(|range| UnresolvedRange {
                    range,
                    attempts: 0,
                    reason: "no data provider configured".into(),
                })
                .collect());
        };

        let native = Timeframe::one_minute();
        let dir = self.partition_dir(&symbol, &native)?;
        let mut unresolved = Vec::new();

        for range in missing {
            let label = format!("{symbol} {range}");
            let fetched = self
                .config
                .retry
                .run(&label, |_| fetch_range(provider, &symbol, &native, range));

            match fetched {
                Ok(bars) if bars.is_empty() => {
                    debug!(%symbol, %range, "provider has no data for range");
                }
                Ok(bars) => {
                    let written = self.write_partitioned(&dir, &bars, &native)?;
                    debug!(%symbol, %range, bars = bars.len(), files = written.len(), "filled gap");
                }
                Err(exhausted) => {
                    warn!(
                        %symbol,
                        %range,
                        attempts = exhausted.attempts,
                        error = %exhausted.last_error,
                        "giving up on range"
                    );
                    unresolved.push(UnresolvedRange {
                        range,
                        attempts: exhausted.attempts,
                        reason: exhausted.last_error.to_string(),
                    });
                }
            }
        }
        Ok(unresolved)
    }

    /// Load cached native bars in `[start, end)`, sorted and deduplicated.
    pub fn load_native(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Bar>, DataError> {
        let native = Timeframe::one_minute();
        let dir = self.partition_dir(symbol, &native)?;
        let window = TimeRange::new(start, end);

        let mut bars = Vec::new();
        for file in list_files(&dir, &native)? {
            if !file.covered.overlaps(&window) {
                continue;
            }
            match read_file(&file.path) {
                Ok(rows) => bars.extend(rows.into_iter().filter(|b| window.contains(b.timestamp))),
                Err(e) => quarantine(&file.path, &e),
            }
        }
        normalize_series(&mut bars);
        Ok(bars)
    }

    /// Split `bars` by calendar day and write one file per day into `dir`.
    ///
    /// Bars already covered by an existing file are skipped, and a day's new
    /// bars are split around existing files, so partitions never overlap even
    /// when two workers fill the same gap.
    pub fn write_partitioned(
        &self,
        dir: &Path,
        bars: &[Bar],
        timeframe: &Timeframe,
    ) -> Result<Vec<PathBuf>, DataError> {
        fs::create_dir_all(dir)?;

        let mut by_day: Vec<(NaiveDate, Vec<Bar>)> = Vec::new();
        for bar in bars {
            let day = bar.timestamp.date();
            match by_day.last_mut() {
                Some((d, group)) if *d == day => group.push(*bar),
                _ => by_day.push((day, vec![*bar])),
            }
        }

        let mut written = Vec::new();
        for (day, day_bars) in by_day {
            let lock = self.locks.lock_for(dir.join(day.to_string()));
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

            let day_range = TimeRange::new(
                day_start(day_bars[0].timestamp),
                day_start(day_bars[0].timestamp) + chrono::Duration::days(1),
            );
            let existing: Vec<TimeRange> = list_files(dir, timeframe)?
                .into_iter()
                .filter(|f| f.covered.overlaps(&day_range))
                .map(|f| f.covered)
                .collect();

            for run in uncovered_runs(&day_bars, &existing) {
                written.push(write_file(dir, &run)?);
            }
        }
        Ok(written)
    }

    /// Per-timeframe summary of what is cached for `symbol`.
    pub fn status(&self, symbol: &str) -> Result<Vec<PartitionStatus>, DataError> {
        let symbol = normalize_symbol(symbol)?;
        let sym_dir = self.symbol_dir(&symbol);
        if !sym_dir.exists() {
            return Ok(Vec::new());
        }

        let mut statuses = Vec::new();
        for entry in fs::read_dir(&sym_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let label = entry.file_name().to_string_lossy().into_owned();
            let Ok(timeframe) = label.parse::<Timeframe>() else {
                continue;
            };
            let files = list_files(&entry.path(), &timeframe)?;
            statuses.push(PartitionStatus {
                timeframe: label,
                files: files.len(),
                first: files.iter().map(|f| f.first).min(),
                last: files.iter().map(|f| f.last).max(),
            });
        }
        statuses.sort_by_key(|s| s.timeframe.parse::<Timeframe>().map(|t| t.minutes()).unwrap_or(0));
        Ok(statuses)
    }
}

/// Page through the provider until `range` is exhausted.
///
/// A malformed response counts as "no data" rather than a failure. Void or
/// inconsistent bars are dropped, leaving their minutes missing.
fn fetch_range(
    provider: &dyn DataProvider,
    symbol: &str,
    timeframe: &Timeframe,
    range: TimeRange,
) -> Result<Vec<Bar>, DataError> {
    let mut out = Vec::new();
    let mut since = range.start;
    loop {
        let page = match provider.fetch(symbol, timeframe, since) {
            Ok(page) => page,
            Err(DataError::ResponseFormatChanged(msg)) => {
                warn!(%symbol, %range, %msg, "malformed response, treating as no data");
                break;
            }
            Err(e) => return Err(e),
        };
        let Some(last) = page.last().map(|b| b.timestamp) else {
            break;
        };
        let (sane, insane): (Vec<Bar>, Vec<Bar>) = page
            .into_iter()
            .filter(|b| range.contains(b.timestamp))
            .partition(|b| b.is_sane());
        if !insane.is_empty() {
            warn!(%symbol, %range, dropped = insane.len(), "dropping void or inconsistent bars");
        }
        out.extend(sane);

        let next = last + timeframe.duration();
        if next >= range.end || next <= since {
            break;
        }
        since = next;
    }
    normalize_series(&mut out);
    Ok(out)
}

/// Split one day's bars into runs that do not cross or touch existing files.
fn uncovered_runs(day_bars: &[Bar], existing: &[TimeRange]) -> Vec<Vec<Bar>> {
    let mut runs: Vec<Vec<Bar>> = Vec::new();
    let mut current: Vec<Bar> = Vec::new();
    for bar in day_bars {
        if existing.iter().any(|iv| iv.contains(bar.timestamp)) {
            if !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
            continue;
        }
        if let Some(prev) = current.last() {
            let between = TimeRange::new(prev.timestamp, bar.timestamp);
            if existing.iter().any(|iv| between.overlaps(iv)) {
                runs.push(std::mem::take(&mut current));
            }
        }
        current.push(*bar);
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

fn file_name(first: NaiveDateTime, last: NaiveDateTime) -> String {
    format!("{} - {}.csv", first.format(FILE_STAMP), last.format(FILE_STAMP))
}

/// Parse `"{first} - {last}.csv"` back into timestamps.
pub fn parse_file_name(name: &str) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let stem = name.strip_suffix(".csv")?;
    let (first, last) = stem.split_once(" - ")?;
    let first = NaiveDateTime::parse_from_str(first, FILE_STAMP).ok()?;
    let last = NaiveDateTime::parse_from_str(last, FILE_STAMP).ok()?;
    (first <= last).then_some((first, last))
}

/// All well-named cache files in `dir`, sorted by first timestamp.
pub fn list_files(dir: &Path, timeframe: &Timeframe) -> Result<Vec<CachedFile>, DataError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // Skip .tmp, .quarantined and anything foreign
        let Some((first, last)) = parse_file_name(name) else {
            continue;
        };
        files.push(CachedFile {
            covered: TimeRange::new(first, last + timeframe.duration()),
            path,
            first,
            last,
        });
    }
    files.sort_by_key(|f| f.first);
    Ok(files)
}

fn write_file(dir: &Path, bars: &[Bar]) -> Result<PathBuf, DataError> {
    let (first, last) = match (bars.first(), bars.last()) {
        (Some(f), Some(l)) => (f.timestamp, l.timestamp),
        _ => return Err(DataError::CacheError("no bars to cache".into())),
    };
    let path = dir.join(file_name(first, last));
    let tmp_path = path.with_extension("csv.tmp");

    {
        let mut wtr = csv::Writer::from_path(&tmp_path)?;
        wtr.write_record(CSV_HEADER)?;
        for bar in bars {
            wtr.write_record([
                bar.timestamp.format(ROW_STAMP).to_string(),
                bar.open.to_string(),
                bar.high.to_string(),
                bar.low.to_string(),
                bar.close.to_string(),
                bar.volume.to_string(),
            ])?;
        }
        wtr.flush()?;
    }

    // Atomic rename
    fs::rename(&tmp_path, &path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        DataError::CacheError(format!("atomic rename failed: {e}"))
    })?;
    Ok(path)
}

/// Read one cache file. Any malformed or insane row fails the whole file.
pub fn read_file(path: &Path) -> Result<Vec<Bar>, DataError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();
    if headers.iter().ne(CSV_HEADER.iter().copied()) {
        return Err(DataError::CacheError(format!(
            "unexpected header in {}",
            path.display()
        )));
    }

    let mut bars = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let field = |idx: usize| -> Result<f64, DataError> {
            record
                .get(idx)
                .and_then(|v| v.parse::<f64>().ok())
                .ok_or_else(|| DataError::CacheError(format!("bad value at row {i}, column {idx}")))
        };
        let timestamp = record
            .get(0)
            .and_then(|v| NaiveDateTime::parse_from_str(v, ROW_STAMP).ok())
            .ok_or_else(|| DataError::CacheError(format!("bad timestamp at row {i}")))?;
        let bar = Bar {
            timestamp,
            open: field(1)?,
            high: field(2)?,
            low: field(3)?,
            close: field(4)?,
            volume: field(5)?,
        };
        if !bar.is_sane() {
            return Err(DataError::CacheError(format!("void or inconsistent bar at row {i}")));
        }
        bars.push(bar);
    }
    if bars.is_empty() {
        return Err(DataError::CacheError("empty cache file".into()));
    }
    Ok(bars)
}

fn quarantine(path: &Path, err: &DataError) {
    let quarantined = path.with_extension("csv.quarantined");
    warn!(path = %path.display(), error = %err, "quarantining corrupt cache file");
    let _ = fs::rename(path, quarantined);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn minute_bars(start: NaiveDateTime, n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64;
                Bar {
                    timestamp: start + Duration::minutes(i as i64),
                    open: close,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1.0,
                }
            })
            .collect()
    }

    /// Provider serving a fixed minute series, counting calls.
    struct FixedProvider {
        bars: Vec<Bar>,
        page: usize,
        calls: AtomicU32,
    }

    impl DataProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn fetch(
            &self,
            _symbol: &str,
            _timeframe: &Timeframe,
            since: NaiveDateTime,
        ) -> Result<Vec<Bar>, DataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .bars
                .iter()
                .filter(|b| b.timestamp >= since)
                .take(self.page)
                .copied()
                .collect())
        }
    }

    fn cache_with(dir: &Path, bars: Vec<Bar>) -> (BarCache, Arc<FixedProvider>) {
        let provider = Arc::new(FixedProvider {
            bars,
            page: 500,
            calls: AtomicU32::new(0),
        });
        let config = CacheConfig::new(dir, "binanceusdm").with_retry(2, std::time::Duration::ZERO);
        (BarCache::new(config, provider.clone()), provider)
    }

    #[test]
    fn file_name_round_trip() {
        let name = file_name(at(2, 0, 0), at(2, 23, 59));
        assert_eq!(name, "2024-01-02-00:00 - 2024-01-02-23:59.csv");
        assert_eq!(parse_file_name(&name), Some((at(2, 0, 0), at(2, 23, 59))));
        assert_eq!(parse_file_name("2024-01-02-00:00 - 2024-01-02-23:59.csv.tmp"), None);
    }

    #[test]
    fn fills_whole_day_and_splits_on_midnight() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _) = cache_with(dir.path(), minute_bars(at(2, 0, 0), 2 * 1440));

        let loaded = cache
            .get_bars("BTC/USDT", at(2, 0, 0), at(4, 0, 0), &Timeframe::one_minute())
            .unwrap();

        assert!(loaded.is_complete());
        assert_eq!(loaded.bars.len(), 2 * 1440);
        let files = list_files(
            &cache.partition_dir("BTC/USDT", &Timeframe::one_minute()).unwrap(),
            &Timeframe::one_minute(),
        )
        .unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].first, at(2, 0, 0));
        assert_eq!(files[0].last, at(2, 23, 59));
        assert_eq!(files[1].first, at(3, 0, 0));
    }

    #[test]
    fn second_request_does_not_refetch() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, provider) = cache_with(dir.path(), minute_bars(at(2, 0, 0), 1440));

        cache
            .get_bars("BTC/USDT", at(2, 0, 0), at(3, 0, 0), &Timeframe::one_minute())
            .unwrap();
        let calls = provider.calls.load(Ordering::SeqCst);
        assert!(calls > 0);

        let again = cache
            .get_bars("BTC_USDT", at(2, 0, 0), at(3, 0, 0), &Timeframe::one_minute())
            .unwrap();
        assert_eq!(again.bars.len(), 1440);
        assert_eq!(provider.calls.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn short_history_names_file_by_actual_bars() {
        let dir = tempfile::tempdir().unwrap();
        // Listing at 18:30 — the day only has 330 bars.
        let (cache, _) = cache_with(dir.path(), minute_bars(at(2, 18, 30), 330));

        let loaded = cache
            .get_bars("BTC/USDT", at(2, 0, 0), at(3, 0, 0), &Timeframe::one_minute())
            .unwrap();
        assert_eq!(loaded.bars.len(), 330);

        let dir = cache.partition_dir("BTC/USDT", &Timeframe::one_minute()).unwrap();
        assert!(dir.join("2024-01-02-18:30 - 2024-01-02-23:59.csv").exists());
    }

    #[test]
    fn offline_cache_reports_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BarCache::offline(CacheConfig::new(dir.path(), "binanceusdm"));

        let loaded = cache
            .get_bars("BTC/USDT", at(2, 0, 0), at(2, 6, 0), &Timeframe::one_minute())
            .unwrap();
        assert!(loaded.bars.is_empty());
        assert_eq!(loaded.unresolved.len(), 1);
        assert!(matches!(
            loaded.require_complete(),
            Err(DataError::DataUnavailable { .. })
        ));
    }

    #[test]
    fn aggregated_request_is_persisted_separately() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _) = cache_with(dir.path(), minute_bars(at(2, 0, 0), 1440));
        let hourly: Timeframe = "1h".parse().unwrap();

        let loaded = cache
            .get_bars("BTC/USDT", at(2, 0, 0), at(3, 0, 0), &hourly)
            .unwrap();
        assert_eq!(loaded.bars.len(), 24);
        assert_eq!(loaded.bars[1].timestamp, at(2, 1, 0));
        assert_eq!(loaded.bars[0].close, 159.0);

        let status = cache.status("BTC/USDT").unwrap();
        let labels: Vec<&str> = status.iter().map(|s| s.timeframe.as_str()).collect();
        assert_eq!(labels, vec!["1m", "1h"]);
    }

    #[test]
    fn corrupt_file_is_quarantined_and_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _) = cache_with(dir.path(), minute_bars(at(2, 0, 0), 60));
        let native = Timeframe::one_minute();
        let part = cache.partition_dir("BTC/USDT", &native).unwrap();
        fs::create_dir_all(&part).unwrap();
        fs::write(part.join(file_name(at(2, 0, 0), at(2, 0, 59))), "garbage").unwrap();

        // First load quarantines; the gap reappears on the next call.
        let first = cache.get_bars("BTC/USDT", at(2, 0, 0), at(2, 1, 0), &native).unwrap();
        assert!(first.bars.is_empty());
        let second = cache.get_bars("BTC/USDT", at(2, 0, 0), at(2, 1, 0), &native).unwrap();
        assert_eq!(second.bars.len(), 60);
    }

    #[test]
    fn uncovered_runs_split_around_existing_files() {
        let bars = minute_bars(at(2, 0, 0), 10);
        let existing = [TimeRange::new(at(2, 0, 3), at(2, 0, 5))];
        let runs = uncovered_runs(&bars, &existing);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].len(), 3);
        assert_eq!(runs[1][0].timestamp, at(2, 0, 5));
    }

    #[test]
    fn invalid_symbol_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BarCache::offline(CacheConfig::new(dir.path(), "binanceusdm"));
        let err = cache
            .get_bars("BTCUSDT", at(2, 0, 0), at(3, 0, 0), &Timeframe::one_minute())
            .unwrap_err();
        assert!(matches!(err, DataError::Config(_)));
    }

    fn read_dir_bars(dir: &Path, timeframe: &Timeframe) -> Vec<Bar> {
        list_files(dir, timeframe)
            .unwrap()
            .iter()
            .flat_map(|f| read_file(&f.path).unwrap())
            .collect()
    }

    #[test]
    fn short_aggregate_window_is_returned_but_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _) = cache_with(dir.path(), minute_bars(at(2, 0, 0), 180));
        let hourly: Timeframe = "1h".parse().unwrap();
        let hourly_dir = cache.partition_dir("BTC/USDT", &hourly).unwrap();

        let first = cache
            .get_bars("BTC/USDT", at(2, 0, 0), at(2, 0, 30), &hourly)
            .unwrap();
        assert_eq!(first.bars.len(), 1);
        assert_eq!(first.bars[0].volume, 30.0);
        assert!(read_dir_bars(&hourly_dir, &hourly).is_empty());

        let second = cache
            .get_bars("BTC/USDT", at(2, 0, 0), at(2, 2, 0), &hourly)
            .unwrap();
        assert_eq!(second.bars.len(), 2);
        assert_eq!(second.bars[0].volume, 60.0);
        assert_eq!(read_dir_bars(&hourly_dir, &hourly), second.bars);
    }

    #[test]
    fn nan_row_quarantines_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BarCache::offline(CacheConfig::new(dir.path(), "binanceusdm"));
        let native = Timeframe::one_minute();
        let part = cache.partition_dir("BTC/USDT", &native).unwrap();
        fs::create_dir_all(&part).unwrap();

        let mut bars = minute_bars(at(2, 0, 0), 60);
        bars[59].close = f64::NAN;
        let path = write_file(&part, &bars).unwrap();

        let loaded = cache.get_bars("BTC/USDT", at(2, 0, 0), at(2, 1, 0), &native).unwrap();
        assert!(loaded.bars.iter().all(|b| b.close.is_finite()));
        assert!(loaded.bars.is_empty());
        assert!(!path.exists());
        assert!(path.with_extension("csv.quarantined").exists());
    }

    #[test]
    fn void_provider_bars_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut bars = minute_bars(at(2, 0, 0), 60);
        bars[10].open = f64::NAN;
        bars[20].high = bars[20].low - 1.0;
        let (cache, _) = cache_with(dir.path(), bars);

        let loaded = cache
            .get_bars("BTC/USDT", at(2, 0, 0), at(2, 1, 0), &Timeframe::one_minute())
            .unwrap();
        assert_eq!(loaded.bars.len(), 58);
        assert!(loaded.bars.iter().all(Bar::is_sane));
    }
}
