//! Market data: providers, gap detection, aggregation and the bar cache.

pub mod aggregate;
pub mod binance;
pub mod cache;
pub mod gaps;
pub mod provider;
pub mod retry;
pub mod synthetic;

pub use aggregate::{aggregate, aggregate_bars, AggregatedBar, PartialWindow};
pub use binance::{BinanceFuturesProvider, ExchangeConfig};
pub use cache::{BarCache, CacheConfig, LoadedBars, PartitionStatus, UnresolvedRange};
pub use gaps::{day_partitions, find_missing_ranges};
pub use provider::{DataError, DataProvider, TimeRange};
pub use retry::{RetryExhausted, RetryPolicy};
pub use synthetic::SyntheticProvider;
