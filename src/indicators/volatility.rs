//! Volatility indicators: Bollinger Bands, ATR

use serde::{Deserialize, Serialize};

use super::{sma, IndicatorSeries};
use crate::{Period, OHLCV};

/// Upper, middle and lower Bollinger band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: IndicatorSeries,
    pub middle: IndicatorSeries,
    pub lower: IndicatorSeries,
}

/// Bollinger Bands: `SMA(period) ± k * σ`, σ being the population standard
/// deviation over the same window.
pub fn bollinger(values: &[f64], period: Period, k: f64) -> BollingerBands {
    let p = period.get();
    let middle = sma(values, period);
    let mut upper = IndicatorSeries::undefined(values.len());
    let mut lower = IndicatorSeries::undefined(values.len());

    if values.len() >= p {
        for (i, window) in values.windows(p).enumerate() {
            let idx = i + p - 1;
            let Some(mean) = middle.get(idx) else {
                continue;
            };
            let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / p as f64;
            let width = k * variance.sqrt();
            upper.set(idx, mean + width);
            lower.set(idx, mean - width);
        }
    }

    BollingerBands {
        upper,
        middle,
        lower,
    }
}

/// True Range: `max(high - low, |high - prev_close|, |low - prev_close|)`
#[inline]
pub fn true_range<T: OHLCV>(bar: &T, prev_close: f64) -> f64 {
    (bar.high() - bar.low())
        .max((bar.high() - prev_close).abs())
        .max((bar.low() - prev_close).abs())
}

/// ATR with Wilder's smoothing.
///
/// True Range starts at index 1 (it needs a previous close). The first ATR,
/// at index `period`, is the mean of the first `period` true ranges;
/// afterwards `ATR = (ATR_prev * (period - 1) + TR) / period`.
pub fn atr<T: OHLCV>(bars: &[T], period: Period) -> IndicatorSeries {
    let p = period.get();
    let mut out = IndicatorSeries::undefined(bars.len());
    if bars.len() <= p {
        return out;
    }

    let pf = p as f64;
    let tr: Vec<f64> = bars
        .windows(2)
        .map(|w| true_range(&w[1], w[0].close()))
        .collect();

    let mut value = tr[..p].iter().sum::<f64>() / pf;
    out.set(p, value);
    for (offset, &range) in tr.iter().enumerate().skip(p) {
        value = (value * (pf - 1.0) + range) / pf;
        out.set(offset + 1, value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy)]
    struct Hlc(f64, f64, f64);

    impl OHLCV for Hlc {
        fn open(&self) -> f64 {
            self.2
        }

        fn high(&self) -> f64 {
            self.0
        }

        fn low(&self) -> f64 {
            self.1
        }

        fn close(&self) -> f64 {
            self.2
        }

        fn volume(&self) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_bollinger_constant_series_collapses() {
        let values = vec![5.0; 10];
        let bb = bollinger(&values, Period::new_const(4), 2.0);
        assert_eq!(bb.upper.get(9), Some(5.0));
        assert_eq!(bb.lower.get(9), Some(5.0));
        assert_eq!(bb.middle.warm_up(), 3);
    }

    #[test]
    fn test_bollinger_population_std() {
        // window [2, 4, 4, 4, 5, 5, 7, 9]: mean 5, population sigma 2
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let bb = bollinger(&values, Period::new_const(8), 1.0);
        assert_eq!(bb.middle.get(7), Some(5.0));
        assert!((bb.upper.get(7).unwrap() - 7.0).abs() < 1e-12);
        assert!((bb.lower.get(7).unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_true_range_uses_gap() {
        let bar = Hlc(12.0, 11.0, 11.5);
        assert_eq!(true_range(&bar, 9.0), 3.0);
        assert_eq!(true_range(&bar, 11.5), 1.0);
    }

    #[test]
    fn test_atr_constant_range() {
        let bars = vec![Hlc(11.0, 9.0, 10.0); 20];
        let out = atr(&bars, Period::new_const(5));
        assert_eq!(out.warm_up(), 5);
        assert_eq!(out.get(5), Some(2.0));
        assert_eq!(out.last(), Some(2.0));
        assert_eq!(out.len(), 20);
    }
}
