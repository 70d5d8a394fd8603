//! Criterion benchmarks for Neilyst hot paths.
//!
//! Benchmarks:
//! 1. Single-symbol replay (MA crossover over a minute series)
//! 2. Indicator compute (single and full registry stack)
//! 3. Minute-to-timeframe aggregation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use neilyst_core::data::{aggregate, PartialWindow};
use neilyst_core::domain::{Bar, Timeframe};
use neilyst_core::engine::{run_symbol, EngineConfig};
use neilyst_core::indicators::IndicatorRegistry;
use neilyst_core::strategy::{MaCrossover, MarketHistory, Strategy};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize) -> Vec<Bar> {
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.01).sin() * 10.0;
            Bar {
                timestamp: start + chrono::Duration::minutes(i as i64),
                open: close - 0.3,
                high: close + 1.5,
                low: close - 1.5,
                close,
                volume: 1_000.0 + (i % 500) as f64,
            }
        })
        .collect()
}

// ── 1. Replay ────────────────────────────────────────────────────────

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");
    let registry = IndicatorRegistry::new();
    let config = EngineConfig::new(10_000.0, 0.0005, 0.0);

    // One day, one week, one month of minutes
    for &bar_count in &[1_440, 10_080, 43_200] {
        let strategy = MaCrossover::new(20, 60, 1.0);
        let history =
            MarketHistory::build(make_bars(bar_count), &strategy.indicators(), &registry).unwrap();

        group.bench_with_input(
            BenchmarkId::new("ma_cross_20_60", bar_count),
            &bar_count,
            |b, _| {
                b.iter(|| {
                    run_symbol(
                        "BTC/USDT",
                        black_box(&history),
                        &strategy,
                        black_box(&config),
                    )
                });
            },
        );
    }

    group.finish();
}

// ── 2. Indicators ────────────────────────────────────────────────────

fn bench_indicators(c: &mut Criterion) {
    let mut group = c.benchmark_group("indicator_compute");
    let registry = IndicatorRegistry::new();
    let stack: Vec<String> = ["sma20", "sma60", "ema12", "ema26", "rsi", "rsi7"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    for &bar_count in &[1_440, 43_200] {
        let bars = make_bars(bar_count);

        group.bench_with_input(BenchmarkId::new("sma20", bar_count), &bar_count, |b, _| {
            b.iter(|| registry.compute(black_box("sma20"), black_box(&bars)));
        });
        group.bench_with_input(
            BenchmarkId::new("full_stack_6", bar_count),
            &bar_count,
            |b, _| {
                b.iter(|| registry.compute_all(black_box(&stack), black_box(&bars)));
            },
        );
    }

    group.finish();
}

// ── 3. Aggregation ───────────────────────────────────────────────────

fn bench_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    let bars = make_bars(43_200);

    for label in ["5m", "1h", "4h"] {
        let tf: Timeframe = label.parse().unwrap();
        group.bench_with_input(BenchmarkId::new("month_of_minutes", label), &tf, |b, tf| {
            b.iter(|| aggregate(black_box(&bars), tf, PartialWindow::Keep));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_replay, bench_indicators, bench_aggregation);
criterion_main!(benches);
