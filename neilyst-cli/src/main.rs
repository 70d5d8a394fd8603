//! Neilyst CLI: fetch, backtest, and cache commands.
//!
//! Commands:
//! - `fetch`: fill the bar cache for one symbol and report what stayed missing
//! - `backtest`: run a TOML config across its symbols and save artifacts
//! - `cache status`: list the timeframes and spans cached for a symbol

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use neilyst_core::data::{
    BarCache, BinanceFuturesProvider, CacheConfig, DataProvider, ExchangeConfig, SyntheticProvider,
};
use neilyst_core::domain::Timeframe;
use neilyst_runner::export::save_artifacts;
use neilyst_runner::{parse_instant, run_backtest, BacktestConfig, BacktestResult, DataSource};

#[derive(Parser)]
#[command(name = "neilyst", about = "Neilyst: crypto backtesting over an archival bar cache")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch bars for one symbol into the cache.
    Fetch {
        /// Trading pair, e.g. BTC/USDT or btc_usdt.
        #[arg(long)]
        symbol: String,

        /// Start instant (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS, UTC).
        #[arg(long)]
        start: String,

        /// End instant, exclusive.
        #[arg(long)]
        end: String,

        /// Bar interval. Anything above 1m is aggregated from 1m bars.
        #[arg(long, default_value = "1m")]
        timeframe: String,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,

        /// Fill gaps with synthetic bars instead of calling the exchange.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// HTTP(S) proxy for exchange requests.
        #[arg(long)]
        proxy: Option<String>,

        /// Per-request timeout in seconds.
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },
    /// Run a backtest from a TOML config file.
    Backtest {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Fill cache gaps with synthetic bars instead of calling the exchange.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Output directory for result artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Print the evaluation as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Cache inspection commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cached timeframes, file counts, and spans for a symbol.
    Status {
        /// Trading pair, e.g. BTC/USDT.
        #[arg(long)]
        symbol: String,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,

        /// Exchange namespace inside the cache directory.
        #[arg(long, default_value = "binanceusdm")]
        exchange: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            symbol,
            start,
            end,
            timeframe,
            cache_dir,
            synthetic,
            proxy,
            timeout_secs,
        } => {
            let exchange = exchange_config(proxy, timeout_secs);
            run_fetch(&symbol, &start, &end, &timeframe, cache_dir, synthetic, &exchange)
        }
        Commands::Backtest {
            config,
            synthetic,
            output_dir,
            json,
        } => run_backtest_cmd(&config, synthetic, &output_dir, json),
        Commands::Cache { action } => match action {
            CacheAction::Status {
                symbol,
                cache_dir,
                exchange,
            } => run_cache_status(&symbol, cache_dir, &exchange),
        },
    }
}

fn exchange_config(proxy: Option<String>, timeout_secs: u64) -> ExchangeConfig {
    ExchangeConfig {
        proxy,
        timeout_secs,
        ..ExchangeConfig::default()
    }
}

fn run_fetch(
    symbol: &str,
    start: &str,
    end: &str,
    timeframe: &str,
    cache_dir: PathBuf,
    synthetic: bool,
    exchange: &ExchangeConfig,
) -> Result<()> {
    let start = parse_instant(start).context("invalid --start")?;
    let end = parse_instant(end).context("invalid --end")?;
    if start >= end {
        bail!("--start must be before --end");
    }
    let timeframe: Timeframe = timeframe.parse()?;

    let provider: Arc<dyn DataProvider> = if synthetic {
        Arc::new(SyntheticProvider::new())
    } else {
        Arc::new(BinanceFuturesProvider::new(exchange)?)
    };
    let cache = BarCache::new(CacheConfig::new(cache_dir, exchange.name.as_str()), provider);

    let loaded = cache.get_bars(symbol, start, end, &timeframe)?;
    println!(
        "{} {}: {} bars in [{}, {})",
        loaded.symbol,
        timeframe,
        loaded.bars.len(),
        start,
        end
    );
    if let (Some(first), Some(last)) = (loaded.bars.first(), loaded.bars.last()) {
        println!("First bar:  {}", first.timestamp);
        println!("Last bar:   {}", last.timestamp);
    }

    if !loaded.is_complete() {
        println!();
        println!("Unresolved ranges:");
        for u in &loaded.unresolved {
            println!("  {} after {} attempt(s): {}", u.range, u.attempts, u.reason);
        }
        std::process::exit(1);
    }
    Ok(())
}

fn run_backtest_cmd(config_path: &Path, synthetic: bool, output_dir: &Path, json: bool) -> Result<()> {
    let config = BacktestConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let source = if synthetic {
        DataSource::Synthetic
    } else {
        DataSource::Exchange
    };

    let result = run_backtest(&config, source)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result.evaluation)?);
    } else {
        print_summary(&result);
    }

    let run_dir = save_artifacts(&result, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());

    if result.runs.is_empty() {
        bail!("every symbol failed; see artifacts for reasons");
    }
    Ok(())
}

fn run_cache_status(symbol: &str, cache_dir: PathBuf, exchange: &str) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let cache = BarCache::offline(CacheConfig::new(&cache_dir, exchange));
    let statuses = cache.status(symbol)?;
    if statuses.is_empty() {
        println!("Nothing cached for {symbol} in {}", cache_dir.display());
        return Ok(());
    }

    println!("Cache: {}", cache_dir.display());
    println!();
    println!("{:<10} {:>6} {:<20} {:<20}", "Timeframe", "Files", "First", "Last");
    println!("{}", "-".repeat(59));
    for s in &statuses {
        let first = s.first.map(|t| t.to_string()).unwrap_or_else(|| "-".into());
        let last = s.last.map(|t| t.to_string()).unwrap_or_else(|| "-".into());
        println!("{:<10} {:>6} {:<20} {:<20}", s.timeframe, s.files, first, last);
    }
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let bt = &result.config.backtest;
    println!();
    println!("=== Backtest Result ===");
    println!("Run:            {}", &result.run_id[..12]);
    println!("Strategy:       {}", result.config.strategy.build().name());
    println!("Period:         {} to {}", bt.start, bt.end);
    println!("Timeframe:      {}", bt.timeframe);
    println!("Symbols:        {}", result.runs.len());
    println!("Trades:         {}", result.ledger().len());

    match result.evaluation.report() {
        Some(r) => {
            println!();
            println!("--- Performance ---");
            println!("Total PnL:      {:.2}", r.total_pnl);
            println!("Win Rate:       {:.1}%", r.win_rate * 100.0);
            println!("P/L Ratio:      {:.2}", r.profit_loss_ratio);
            println!("Max Drawdown:   {:.2}", r.max_drawdown);
            println!("Annual Return:  {:.2}%", r.annual_return * 100.0);
            println!("Sharpe:         {:.3}", r.sharpe_ratio);
            println!("Trades / Day:   {:.2}", r.average_daily_trades);
            println!("Avg Hold (h):   {:.2}", r.average_holding_hours);
        }
        None => {
            println!();
            println!("No trades closed.");
        }
    }

    if result.is_synthetic() {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    for (symbol, reason) in &result.failures {
        println!("FAILED {symbol}: {reason}");
    }
    println!();
}
