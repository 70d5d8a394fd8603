//! Timeframe strings (`1m`, `15m`, `4h`, `1d`, `1w`, `1M`) and symbol parsing.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Minutes in a month as the cache counts them (30 days).
const MINUTES_PER_MONTH: u32 = 30 * 1440;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeframeError {
    #[error("unsupported timeframe '{0}' (expected <n>m, <n>h, <n>d, <n>w or <n>M)")]
    Unsupported(String),

    #[error("invalid symbol '{0}' (expected BASE/QUOTE or BASE_QUOTE)")]
    InvalidSymbol(String),
}

/// A bar interval expressed in whole minutes.
///
/// The original string is kept so that directory names round-trip exactly
/// (`60m` and `1h` span the same duration but live in different folders).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    label: String,
    minutes: u32,
}

impl Timeframe {
    /// The native storage granularity of the cache.
    pub fn one_minute() -> Self {
        Self {
            label: "1m".into(),
            minutes: 1,
        }
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.minutes))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_native(&self) -> bool {
        self.minutes == 1
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unsupported = || TimeframeError::Unsupported(s.to_string());
        let trimmed = s.trim();
        let unit = trimmed.chars().last().ok_or_else(unsupported)?;
        let digits = &trimmed[..trimmed.len() - unit.len_utf8()];
        // Canonical counts only: no sign, no leading zero
        if !digits.bytes().all(|b| b.is_ascii_digit()) || digits.starts_with('0') {
            return Err(unsupported());
        }
        let count: u32 = digits.parse().map_err(|_| unsupported())?;
        if count == 0 {
            return Err(unsupported());
        }
        let per_unit = match unit {
            'm' => 1,
            'h' => 60,
            'd' => 1440,
            'w' => 10_080,
            'M' => MINUTES_PER_MONTH,
            _ => return Err(unsupported()),
        };
        let minutes = count.checked_mul(per_unit).ok_or_else(unsupported)?;
        Ok(Self {
            label: trimmed.to_string(),
            minutes,
        })
    }
}

impl TryFrom<String> for Timeframe {
    type Error = TimeframeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.label
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Normalize a trading pair to `BASE/QUOTE`.
///
/// Accepts `BTC/USDT` or `BTC_USDT`. Both halves must be non-empty and
/// alphanumeric.
pub fn normalize_symbol(symbol: &str) -> Result<String, TimeframeError> {
    let invalid = || TimeframeError::InvalidSymbol(symbol.to_string());
    let unified = symbol.trim().replace('_', "/");
    let (base, quote) = unified.split_once('/').ok_or_else(invalid)?;
    let valid = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric());
    if !valid(base) || !valid(quote) {
        return Err(invalid());
    }
    Ok(format!("{}/{}", base.to_ascii_uppercase(), quote.to_ascii_uppercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_units() {
        assert_eq!("1m".parse::<Timeframe>().unwrap().minutes(), 1);
        assert_eq!("15m".parse::<Timeframe>().unwrap().minutes(), 15);
        assert_eq!("4h".parse::<Timeframe>().unwrap().minutes(), 240);
        assert_eq!("1d".parse::<Timeframe>().unwrap().minutes(), 1440);
        assert_eq!("1w".parse::<Timeframe>().unwrap().minutes(), 10_080);
        assert_eq!("1M".parse::<Timeframe>().unwrap().minutes(), 43_200);
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "m", "0m", "5x", "-1h", "1.5h", "h1", "+5m", "05m", "1 h"] {
            assert!(bad.parse::<Timeframe>().is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn label_round_trips_through_serde() {
        let tf: Timeframe = "60m".parse().unwrap();
        let json = serde_json::to_string(&tf).unwrap();
        assert_eq!(json, "\"60m\"");
        let back: Timeframe = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tf);
    }

    #[test]
    fn symbol_normalization() {
        assert_eq!(normalize_symbol("BTC/USDT").unwrap(), "BTC/USDT");
        assert_eq!(normalize_symbol("eth_usdt").unwrap(), "ETH/USDT");
        assert!(normalize_symbol("BTCUSDT").is_err());
        assert!(normalize_symbol("/USDT").is_err());
        assert!(normalize_symbol("BTC/US-DT").is_err());
    }
}
