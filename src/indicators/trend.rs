// =============================================================================
// Average Directional Index (ADX)
// =============================================================================
//
// ADX quantifies trend strength regardless of direction.
//
//   1. +DM / -DM and True Range per bar-to-bar transition.
//   2. Wilder's smoothing over `period` transitions.
//   3. +DI = 100 * sm(+DM) / sm(TR), -DI = 100 * sm(-DM) / sm(TR)
//   4. DX  = 100 * |+DI - -DI| / (+DI + -DI)
//   5. ADX = Wilder's average of DX, seeded with the mean of the first `period` DX.
//
// +DI/-DI are defined from index `period`, ADX from index `2 * period - 1`.
// =============================================================================

use serde::{Deserialize, Serialize};

use super::{true_range, IndicatorSeries};
use crate::{Period, OHLCV};

/// ADX line with the directional indicators it was built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adx {
    pub adx: IndicatorSeries,
    pub plus_di: IndicatorSeries,
    pub minus_di: IndicatorSeries,
}

pub fn adx<T: OHLCV>(bars: &[T], period: Period) -> Adx {
    let p = period.get();
    let n = bars.len();
    let mut out = Adx {
        adx: IndicatorSeries::undefined(n),
        plus_di: IndicatorSeries::undefined(n),
        minus_di: IndicatorSeries::undefined(n),
    };
    if n <= p {
        return out;
    }

    let pf = p as f64;
    let mut plus_dm = Vec::with_capacity(n - 1);
    let mut minus_dm = Vec::with_capacity(n - 1);
    let mut tr = Vec::with_capacity(n - 1);
    for w in bars.windows(2) {
        let up_move = w[1].high() - w[0].high();
        let down_move = w[0].low() - w[1].low();
        plus_dm.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
        tr.push(true_range(&w[1], w[0].close()));
    }

    let mut sm_plus: f64 = plus_dm[..p].iter().sum();
    let mut sm_minus: f64 = minus_dm[..p].iter().sum();
    let mut sm_tr: f64 = tr[..p].iter().sum();

    // DX by bar index, starting at bar `p`
    let mut dx_values = Vec::with_capacity(n - p);
    for t in (p - 1)..tr.len() {
        if t >= p {
            sm_plus = sm_plus - sm_plus / pf + plus_dm[t];
            sm_minus = sm_minus - sm_minus / pf + minus_dm[t];
            sm_tr = sm_tr - sm_tr / pf + tr[t];
        }
        let (plus_di, minus_di) = directional_indicators(sm_plus, sm_minus, sm_tr);
        let bar = t + 1;
        out.plus_di.set(bar, plus_di);
        out.minus_di.set(bar, minus_di);
        dx_values.push(dx(plus_di, minus_di));
    }

    if dx_values.len() < p {
        return out;
    }

    let mut value = dx_values[..p].iter().sum::<f64>() / pf;
    out.adx.set(2 * p - 1, value);
    for (offset, &d) in dx_values.iter().enumerate().skip(p) {
        value = (value * (pf - 1.0) + d) / pf;
        out.adx.set(p + offset, value);
    }
    out
}

#[inline]
fn directional_indicators(sm_plus: f64, sm_minus: f64, sm_tr: f64) -> (f64, f64) {
    if sm_tr <= 0.0 {
        return (0.0, 0.0);
    }
    (100.0 * sm_plus / sm_tr, 100.0 * sm_minus / sm_tr)
}

#[inline]
fn dx(plus_di: f64, minus_di: f64) -> f64 {
    let sum = plus_di + minus_di;
    if sum <= 0.0 {
        // No directional movement at all
        return 0.0;
    }
    100.0 * (plus_di - minus_di).abs() / sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy)]
    struct Candle {
        high: f64,
        low: f64,
        close: f64,
    }

    impl OHLCV for Candle {
        fn open(&self) -> f64 {
            self.close
        }

        fn high(&self) -> f64 {
            self.high
        }

        fn low(&self) -> f64 {
            self.low
        }

        fn close(&self) -> f64 {
            self.close
        }

        fn volume(&self) -> f64 {
            1.0
        }
    }

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle { high, low, close }
    }

    #[test]
    fn adx_warm_up() {
        let candles: Vec<Candle> = (0..40)
            .map(|i| {
                let base = 100.0 + i as f64;
                candle(base + 1.0, base - 0.5, base + 0.5)
            })
            .collect();
        let out = adx(&candles, Period::new_const(5));
        assert_eq!(out.plus_di.warm_up(), 5);
        assert_eq!(out.adx.warm_up(), 9);
        assert_eq!(out.adx.len(), 40);
    }

    #[test]
    fn adx_strong_uptrend() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                candle(base + 1.5, base - 0.5, base + 1.0)
            })
            .collect();
        let out = adx(&candles, Period::new_const(14));
        let value = out.adx.last().unwrap();
        assert!(value > 25.0, "expected ADX > 25 for strong trend, got {value}");
        assert!(out.plus_di.last().unwrap() > out.minus_di.last().unwrap());
    }

    #[test]
    fn adx_flat_market() {
        let candles = vec![candle(101.0, 99.0, 100.0); 60];
        let out = adx(&candles, Period::new_const(14));
        assert_eq!(out.adx.last(), Some(0.0));
    }

    #[test]
    fn adx_minimum_candles_exact() {
        let period = 5;
        let candles: Vec<Candle> = (0..2 * period)
            .map(|i| {
                let base = 100.0 + i as f64;
                candle(base + 1.0, base - 0.5, base + 0.5)
            })
            .collect();
        assert!(adx(&candles, Period::new_const(period)).adx.last().is_some());
        assert!(adx(&candles[..2 * period - 1], Period::new_const(period))
            .adx
            .last()
            .is_none());
    }

    #[test]
    fn adx_result_range() {
        let candles: Vec<Candle> = (0..100)
            .map(|i| {
                let base = 50.0 + (i as f64 * 0.3).sin() * 10.0;
                candle(base + 1.0, base - 1.0, base + 0.5)
            })
            .collect();
        for (_, v) in adx(&candles, Period::new_const(14)).adx.defined() {
            assert!((0.0..=100.0).contains(&v), "ADX {v} out of [0,100] range");
        }
    }
}
