//! Binance USD-M futures kline provider.
//!
//! One request per page: `GET /fapi/v1/klines` returns up to 1500 rows of
//! `[openTime, open, high, low, close, volume, closeTime, ...]` with prices as
//! strings. Paging and retries are the cache's job; this type only issues
//! one request and classifies the outcome.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::provider::{DataError, DataProvider};
use crate::domain::{Bar, Timeframe};

/// Rows per request; the endpoint's maximum.
pub const PAGE_LIMIT: usize = 1500;

/// Exchange connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_name() -> String {
    "binanceusdm".into()
}

fn default_base_url() -> String {
    "https://fapi.binance.com".into()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            base_url: default_base_url(),
            proxy: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

pub struct BinanceFuturesProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl BinanceFuturesProvider {
    pub fn new(config: &ExchangeConfig) -> Result<Self, DataError> {
        let mut builder = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("neilyst/", env!("CARGO_PKG_VERSION")));
        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| DataError::Other(format!("invalid proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// `BTC/USDT` → `BTCUSDT`
    pub fn market_id(symbol: &str) -> String {
        symbol.replace(['/', '_'], "")
    }

    fn klines_url(&self, symbol: &str, timeframe: &Timeframe, since: NaiveDateTime) -> String {
        format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&startTime={}&limit={PAGE_LIMIT}",
            self.base_url,
            Self::market_id(symbol),
            timeframe.label(),
            since.and_utc().timestamp_millis(),
        )
    }
}

/// Parse a klines payload into bars.
pub fn parse_klines(body: &Value) -> Result<Vec<Bar>, DataError> {
    let rows = body
        .as_array()
        .ok_or_else(|| DataError::ResponseFormatChanged("klines payload is not an array".into()))?;

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let bad = |what: &str| DataError::ResponseFormatChanged(format!("row {i}: {what}"));
            let cols = row.as_array().ok_or_else(|| bad("not an array"))?;
            if cols.len() < 6 {
                return Err(bad("fewer than 6 columns"));
            }
            let open_ms = cols[0].as_i64().ok_or_else(|| bad("open time"))?;
            let timestamp = DateTime::from_timestamp_millis(open_ms)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| bad("open time out of range"))?;
            let num = |idx: usize| -> Result<f64, DataError> {
                match &cols[idx] {
                    Value::String(s) => s.parse().ok(),
                    Value::Number(n) => n.as_f64(),
                    _ => None,
                }
                .ok_or_else(|| bad("non-numeric price"))
            };
            Ok(Bar {
                timestamp,
                open: num(1)?,
                high: num(2)?,
                low: num(3)?,
                close: num(4)?,
                volume: num(5)?,
            })
        })
        .collect()
}

impl DataProvider for BinanceFuturesProvider {
    fn name(&self) -> &str {
        "binanceusdm"
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
        since: NaiveDateTime,
    ) -> Result<Vec<Bar>, DataError> {
        let url = self.klines_url(symbol, timeframe, since);
        let resp = self.client.get(&url).send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                DataError::NetworkUnreachable(e.to_string())
            } else {
                DataError::Other(e.to_string())
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(DataError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if !status.is_success() {
            return Err(DataError::Other(format!("HTTP {status} for {symbol}")));
        }

        let body: Value = resp.json().map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse klines for {symbol}: {e}"))
        })?;
        parse_klines(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn parses_string_prices() {
        let body = json!([
            [1704153600000i64, "42000.1", "42100", "41900.5", "42050", "12.5", 1704153659999i64],
            [1704153660000i64, "42050", "42060", "42000", "42010", "3", 1704153719999i64]
        ]);
        let bars = parse_klines(&body).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(
            bars[0].timestamp,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(bars[0].open, 42000.1);
        assert_eq!(bars[1].close, 42010.0);
    }

    #[test]
    fn empty_page_is_ok() {
        assert!(parse_klines(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn error_object_is_format_change() {
        let body = json!({"code": -1121, "msg": "Invalid symbol."});
        assert!(matches!(
            parse_klines(&body),
            Err(DataError::ResponseFormatChanged(_))
        ));
    }

    #[test]
    fn short_row_is_format_change() {
        let body = json!([[1704153600000i64, "1", "2"]]);
        assert!(matches!(
            parse_klines(&body),
            Err(DataError::ResponseFormatChanged(_))
        ));
    }

    #[test]
    fn url_uses_market_id_and_millis() {
        let provider = BinanceFuturesProvider::new(&ExchangeConfig {
            base_url: "http://localhost:9/".into(),
            ..ExchangeConfig::default()
        })
        .unwrap();
        let since = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let url = provider.klines_url("BTC/USDT", &Timeframe::one_minute(), since);
        assert_eq!(
            url,
            "http://localhost:9/fapi/v1/klines?symbol=BTCUSDT&interval=1m&startTime=1704153600000&limit=1500"
        );
    }

    #[test]
    fn exchange_config_defaults_from_empty_object() {
        let cfg: ExchangeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, ExchangeConfig::default());
        assert_eq!(cfg.timeout_secs, 10);
    }
}
