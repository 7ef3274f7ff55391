//! Momentum oscillators: RSI, MACD, Stochastic

use serde::{Deserialize, Serialize};

use super::{ema, over_defined, sma, IndicatorSeries};
use crate::{Period, OHLCV};

/// RSI with Wilder's smoothing, in 0..=100.
///
/// Average gain/loss are seeded with the simple average over the first
/// `period` changes, then smoothed as `avg = (avg * (period - 1) + x) / period`.
/// First defined at index `period`.
pub fn rsi(values: &[f64], period: Period) -> IndicatorSeries {
    let p = period.get();
    let mut out = IndicatorSeries::undefined(values.len());
    if values.len() <= p {
        return out;
    }

    let pf = p as f64;
    let (mut avg_gain, mut avg_loss) = (0.0, 0.0);
    for w in values[..=p].windows(2) {
        let change = w[1] - w[0];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= pf;
    avg_loss /= pf;
    out.set(p, rsi_value(avg_gain, avg_loss));

    for i in (p + 1)..values.len() {
        let change = values[i] - values[i - 1];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        avg_gain = (avg_gain * (pf - 1.0) + gain) / pf;
        avg_loss = (avg_loss * (pf - 1.0) + loss) / pf;
        out.set(i, rsi_value(avg_gain, avg_loss));
    }
    out
}

#[inline]
fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        // Flat window reads as neutral, pure gains as maximal strength
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// MACD line, signal line and histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    pub macd: IndicatorSeries,
    pub signal: IndicatorSeries,
    pub histogram: IndicatorSeries,
}

/// MACD: `EMA(fast) - EMA(slow)`, its `EMA(signal)`, and their difference.
///
/// The line is defined from `max(fast, slow) - 1`; signal and histogram
/// `signal - 1` bars later.
pub fn macd(values: &[f64], fast: Period, slow: Period, signal: Period) -> Macd {
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);

    let line = IndicatorSeries::from_values(
        fast_ema
            .values()
            .iter()
            .zip(slow_ema.values())
            .map(|(f, s)| Some((*f)? - (*s)?))
            .collect(),
    );
    let signal_line = over_defined(&line, |tail| ema(tail, signal));
    let histogram = IndicatorSeries::from_values(
        line.values()
            .iter()
            .zip(signal_line.values())
            .map(|(m, s)| Some((*m)? - (*s)?))
            .collect(),
    );

    Macd {
        macd: line,
        signal: signal_line,
        histogram,
    }
}

/// Stochastic %K and %D
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stochastic {
    pub k: IndicatorSeries,
    pub d: IndicatorSeries,
}

/// Stochastic oscillator.
///
/// `%K = 100 * (close - lowest low) / (highest high - lowest low)` over
/// `period` bars, 50 when the window range is zero. `%D = SMA(smoothing)` of %K.
pub fn stochastic<T: OHLCV>(bars: &[T], period: Period, smoothing: Period) -> Stochastic {
    let p = period.get();
    let mut k = IndicatorSeries::undefined(bars.len());

    if bars.len() >= p {
        for (i, window) in bars.windows(p).enumerate() {
            let highest = window.iter().map(|b| b.high()).fold(f64::MIN, f64::max);
            let lowest = window.iter().map(|b| b.low()).fold(f64::MAX, f64::min);
            let range = highest - lowest;
            let close = window[p - 1].close();
            let value = if range > 0.0 {
                100.0 * (close - lowest) / range
            } else {
                50.0
            };
            k.set(i + p - 1, value);
        }
    }

    let d = over_defined(&k, |tail| sma(tail, smoothing));
    Stochastic { k, d }
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
    fn test_rsi_all_gains() {
        let values: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&values, Period::new_const(14));
        assert_eq!(out.warm_up(), 14);
        assert_eq!(out.last(), Some(100.0));
    }

    #[test]
    fn test_rsi_flat_is_neutral() {
        let values = vec![100.0; 20];
        let out = rsi(&values, Period::new_const(14));
        assert_eq!(out.last(), Some(50.0));
    }

    #[test]
    fn test_rsi_seed_value() {
        // changes: +1, -1, +2, -2 -> avg gain 0.75, avg loss 0.75 -> 50
        let values = [10.0, 11.0, 10.0, 12.0, 10.0];
        let out = rsi(&values, Period::new_const(4));
        assert!((out.get(4).unwrap() - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_rsi_bounded() {
        let values: Vec<f64> = (0..200).map(|i| 100.0 + (i as f64 * 0.7).sin() * 9.0).collect();
        for (_, v) in rsi(&values, Period::new_const(14)).defined() {
            assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn test_macd_alignment() {
        let values: Vec<f64> = (0..60).map(|i| 50.0 + (i as f64 * 0.2).cos() * 3.0).collect();
        let out = macd(
            &values,
            Period::new_const(12),
            Period::new_const(26),
            Period::new_const(9),
        );
        assert_eq!(out.macd.warm_up(), 25);
        assert_eq!(out.signal.warm_up(), 33);
        assert_eq!(out.histogram.warm_up(), 33);
        let i = 40;
        let expected = out.macd.get(i).unwrap() - out.signal.get(i).unwrap();
        assert!((out.histogram.get(i).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_stochastic_zero_range_is_fifty() {
        let bars = vec![Hlc(10.0, 10.0, 10.0); 6];
        let out = stochastic(&bars, Period::new_const(3), Period::new_const(2));
        assert_eq!(out.k.warm_up(), 2);
        assert_eq!(out.k.last(), Some(50.0));
        assert_eq!(out.d.warm_up(), 3);
        assert_eq!(out.d.last(), Some(50.0));
    }

    #[test]
    fn test_stochastic_close_at_high() {
        let bars = vec![Hlc(11.0, 9.0, 10.0), Hlc(12.0, 10.0, 11.0), Hlc(13.0, 11.0, 13.0)];
        let out = stochastic(&bars, Period::new_const(3), Period::new_const(1));
        assert_eq!(out.k.get(2), Some(100.0));
    }
}
