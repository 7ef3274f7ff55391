//! Simple and exponential moving averages

use super::IndicatorSeries;
use crate::Period;

/// SMA - arithmetic mean of the trailing `period` values.
///
/// First defined at index `period - 1`.
pub fn sma(values: &[f64], period: Period) -> IndicatorSeries {
    let p = period.get();
    let mut out = IndicatorSeries::undefined(values.len());
    if values.len() < p {
        return out;
    }
    for (i, window) in values.windows(p).enumerate() {
        out.set(i + p - 1, window.iter().sum::<f64>() / p as f64);
    }
    out
}

/// EMA seeded with the SMA of the first `period` values.
///
/// `EMA[i] = v[i] * k + EMA[i-1] * (1 - k)` with `k = 2 / (period + 1)`,
/// first defined at index `period - 1`.
pub fn ema(values: &[f64], period: Period) -> IndicatorSeries {
    let p = period.get();
    let mut out = IndicatorSeries::undefined(values.len());
    if values.len() < p {
        return out;
    }

    let k = 2.0 / (p as f64 + 1.0);
    let mut prev = values[..p].iter().sum::<f64>() / p as f64;
    out.set(p - 1, prev);
    for (i, &v) in values.iter().enumerate().skip(p) {
        prev = v * k + prev * (1.0 - k);
        out.set(i, prev);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_scenario() {
        let closes = [102.0, 106.0, 103.0];
        let out = sma(&closes, Period::new_const(2));
        assert_eq!(out.values(), &[None, Some(104.0), Some(104.5)]);
    }

    #[test]
    fn test_sma_short_input() {
        let out = sma(&[1.0, 2.0], Period::new_const(3));
        assert_eq!(out.len(), 2);
        assert_eq!(out.warm_up(), 2);
    }

    #[test]
    fn test_ema_seed_and_recurrence() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let out = ema(&values, Period::new_const(3));
        assert_eq!(out.warm_up(), 2);
        assert_eq!(out.get(2), Some(2.0));
        // k = 0.5
        assert_eq!(out.get(3), Some(3.0));
        assert_eq!(out.get(4), Some(4.0));
        assert_eq!(out.get(5), Some(5.0));
    }

    #[test]
    fn test_ema_period_one_tracks_input() {
        let values = [3.0, 1.0, 4.0, 1.0, 5.0];
        let out = ema(&values, Period::new_const(1));
        let got: Vec<f64> = out.defined().map(|(_, v)| v).collect();
        assert_eq!(got, values.to_vec());
    }
}
