//! Volume indicators

use super::IndicatorSeries;
use crate::OHLCV;

/// On-Balance Volume.
///
/// Starts at 0 on the first bar, then adds the bar's volume on an up close,
/// subtracts it on a down close and carries forward on an unchanged close.
pub fn obv<T: OHLCV>(bars: &[T]) -> IndicatorSeries {
    let mut out = IndicatorSeries::undefined(bars.len());
    if bars.is_empty() {
        return out;
    }

    let mut total = 0.0;
    out.set(0, total);
    for (i, w) in bars.windows(2).enumerate() {
        let (prev, cur) = (w[0].close(), w[1].close());
        if cur > prev {
            total += w[1].volume();
        } else if cur < prev {
            total -= w[1].volume();
        }
        out.set(i + 1, total);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Cv(f64, f64);

    impl OHLCV for Cv {
        fn open(&self) -> f64 {
            self.0
        }

        fn high(&self) -> f64 {
            self.0
        }

        fn low(&self) -> f64 {
            self.0
        }

        fn close(&self) -> f64 {
            self.0
        }

        fn volume(&self) -> f64 {
            self.1
        }
    }

    #[test]
    fn test_obv_accumulates() {
        let bars = [
            Cv(10.0, 100.0),
            Cv(11.0, 200.0),
            Cv(11.0, 300.0),
            Cv(10.5, 50.0),
            Cv(12.0, 25.0),
        ];
        let out = obv(&bars);
        assert_eq!(
            out.values(),
            &[Some(0.0), Some(200.0), Some(200.0), Some(150.0), Some(175.0)]
        );
    }

    #[test]
    fn test_obv_empty() {
        let bars: [Cv; 0] = [];
        assert!(obv(&bars).is_empty());
    }
}
