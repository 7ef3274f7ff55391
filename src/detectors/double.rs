//! Double tops and double bottoms

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::helpers::{lowest_low_between, relative_diff};
use crate::engine::{ChartDetector, DetectionContext};
use crate::params::{get_ratio, ParamMeta, ParamType, ParameterizedDetector};
use crate::pattern::{PatternKind, PatternRecord, PricePoint};
use crate::{Ratio, Result, OHLCV};

impl_with_defaults!(DoublePatternDetector);

/// Pairs of consecutive peaks (tops) or lows (bottoms) at matching prices
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoublePatternDetector {
    /// Max price difference of the pair relative to its mean
    pub threshold: Ratio,
}

impl Default for DoublePatternDetector {
    fn default() -> Self {
        Self {
            threshold: Ratio::new_const(0.02),
        }
    }
}

impl DoublePatternDetector {
    /// Confidence of a pair of extremum prices, `None` if they are too far apart.
    ///
    /// `0.5` at the threshold rising to `1.0` for identical prices.
    pub fn pair_confidence(&self, first: f64, second: f64) -> Option<f64> {
        let threshold = self.threshold.get();
        let diff = relative_diff(first, second);
        if diff > threshold {
            return None;
        }
        if threshold == 0.0 {
            return Some(1.0);
        }
        Some(0.5 + 0.5 * (1.0 - diff / threshold))
    }

    pub fn tops<T: OHLCV>(&self, bars: &[T], ctx: &DetectionContext) -> Vec<PatternRecord> {
        ctx.extrema
            .peaks
            .windows(2)
            .filter_map(|pair| {
                let (a, b) = (pair[0], pair[1]);
                let (first, second) = (bars.get(a)?.high(), bars.get(b)?.high());
                let confidence = self.pair_confidence(first, second)?;
                let (neck_index, neck_price) = lowest_low_between(bars, a, b)?;
                Some(PatternRecord::DoubleTop {
                    first: PricePoint::new(a, first),
                    second: PricePoint::new(b, second),
                    neckline: PricePoint::new(neck_index, neck_price),
                    confidence,
                })
            })
            .collect()
    }

    /// Bottoms need an extremum peak between the lows, so two points of one
    /// falling run never pair up.
    pub fn bottoms<T: OHLCV>(&self, bars: &[T], ctx: &DetectionContext) -> Vec<PatternRecord> {
        ctx.extrema
            .lows
            .windows(2)
            .filter_map(|pair| {
                let (a, b) = (pair[0], pair[1]);
                let (first, second) = (bars.get(a)?.low(), bars.get(b)?.low());
                let confidence = self.pair_confidence(first, second)?;
                let neckline = ctx
                    .extrema
                    .peaks_in(a + 1..b)
                    .iter()
                    .filter_map(|&i| bars.get(i).map(|bar| PricePoint::new(i, bar.high())))
                    .max_by(|x, y| x.price.total_cmp(&y.price))?;
                Some(PatternRecord::DoubleBottom {
                    first: PricePoint::new(a, first),
                    second: PricePoint::new(b, second),
                    neckline,
                    confidence,
                })
            })
            .collect()
    }
}

impl ChartDetector for DoublePatternDetector {
    fn name(&self) -> &'static str {
        "double"
    }

    fn kinds(&self) -> &'static [PatternKind] {
        &[PatternKind::DoubleTop, PatternKind::DoubleBottom]
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &DetectionContext) -> Vec<PatternRecord> {
        let mut out = self.tops(bars, ctx);
        out.extend(self.bottoms(bars, ctx));
        out
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATION
// ============================================================

static DOUBLE_PARAMS: &[ParamMeta] = &[ParamMeta {
    name: "threshold",
    param_type: ParamType::Ratio,
    default: 0.02,
    range: (0.005, 0.05, 0.005),
    description: "Max relative price difference between the two extrema",
}];

impl ParameterizedDetector for DoublePatternDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DOUBLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            threshold: get_ratio(params, "threshold", 0.02)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "double"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extrema::ExtremaSet;

    #[derive(Clone, Copy)]
    struct Hl(f64, f64);

    impl OHLCV for Hl {
        fn open(&self) -> f64 {
            self.1
        }

        fn high(&self) -> f64 {
            self.0
        }

        fn low(&self) -> f64 {
            self.1
        }

        fn close(&self) -> f64 {
            self.0
        }

        fn volume(&self) -> f64 {
            1.0
        }
    }

    fn context(peaks: Vec<usize>, lows: Vec<usize>) -> DetectionContext {
        DetectionContext {
            extrema: ExtremaSet {
                order: 1,
                peaks,
                lows,
            },
            ..DetectionContext::default()
        }
    }

    #[test]
    fn test_pair_threshold() {
        let detector = DoublePatternDetector::default();
        assert!(detector.pair_confidence(100.0, 101.5).is_some());
        assert!(detector.pair_confidence(100.0, 105.0).is_none());
        assert_eq!(detector.pair_confidence(100.0, 100.0), Some(1.0));
    }

    #[test]
    fn test_double_top() {
        let mut bars = vec![Hl(95.0, 90.0); 9];
        bars[2] = Hl(100.0, 96.0);
        bars[4] = Hl(94.0, 88.0);
        bars[6] = Hl(101.5, 97.0);
        let records = DoublePatternDetector::default().detect(&bars, &context(vec![2, 6], vec![]));
        assert_eq!(records.len(), 1);
        match records[0] {
            PatternRecord::DoubleTop {
                first,
                second,
                neckline,
                confidence,
            } => {
                assert_eq!((first.index, second.index), (2, 6));
                assert_eq!(neckline, PricePoint::new(4, 88.0));
                assert!(confidence > 0.5 && confidence < 1.0);
            }
            ref other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_far_apart_peaks_rejected() {
        let mut bars = vec![Hl(95.0, 90.0); 9];
        bars[2] = Hl(100.0, 96.0);
        bars[6] = Hl(105.0, 97.0);
        assert!(DoublePatternDetector::default()
            .detect(&bars, &context(vec![2, 6], vec![]))
            .is_empty());
    }

    #[test]
    fn test_double_bottom_needs_intervening_peak() {
        let mut bars = vec![Hl(95.0, 90.0); 9];
        bars[2] = Hl(91.0, 80.0);
        bars[4] = Hl(99.0, 92.0);
        bars[6] = Hl(91.0, 80.5);
        let detector = DoublePatternDetector::default();

        let records = detector.detect(&bars, &context(vec![4], vec![2, 6]));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind(), PatternKind::DoubleBottom);
        assert!(records[0].direction().is_bullish());

        assert!(detector.detect(&bars, &context(vec![], vec![2, 6])).is_empty());
    }
}
