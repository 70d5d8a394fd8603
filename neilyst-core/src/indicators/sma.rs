//! Simple Moving Average (SMA).
//!
//! Rolling mean over a lookback window.
//! Lookback: period - 1 (first valid value at index period-1).

/// SMA of `values`. Any window containing NaN yields NaN.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if period == 0 || n < period {
        return result;
    }

    let mut sum: f64 = values[..period].iter().sum();
    result[period - 1] = sum / period as f64;

    for i in period..n {
        let leaving = values[i - period];
        let entering = values[i];
        sum = sum - leaving + entering;

        // NaN poisons a running sum; rescan the window instead
        if leaving.is_nan() || sum.is_nan() {
            sum = values[(i + 1 - period)..=i].iter().sum();
        }
        result[i] = sum / period as f64;
    }

    result
}
