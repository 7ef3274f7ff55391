//! Head and shoulders, regular and inverse
//!
//! Three consecutive extremum peaks where the middle one stands above both
//! neighbours and the neighbours sit at matching prices. The neckline is the
//! mean of the two troughs between them. The inverse pattern mirrors all of
//! this on the lows.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::helpers::{highest_high_between, lowest_low_between, relative_diff, saturate};
use crate::engine::{ChartDetector, DetectionContext};
use crate::params::{get_ratio, ParamMeta, ParamType, ParameterizedDetector};
use crate::pattern::{PatternKind, PatternRecord, PricePoint};
use crate::{Ratio, Result, OHLCV};

impl_with_defaults!(HeadAndShouldersDetector);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadAndShouldersDetector {
    /// Max price difference between the shoulders relative to their mean
    pub shoulder_tolerance: Ratio,
}

impl Default for HeadAndShouldersDetector {
    fn default() -> Self {
        Self {
            shoulder_tolerance: Ratio::new_const(0.03),
        }
    }
}

impl HeadAndShouldersDetector {
    /// Mean of shoulder symmetry and head prominence, both in 0..=1
    fn confidence(&self, left: f64, head: f64, right: f64) -> Option<f64> {
        let tolerance = self.shoulder_tolerance.get();
        let diff = relative_diff(left, right);
        if diff > tolerance {
            return None;
        }
        let symmetry = if tolerance > 0.0 {
            1.0 - diff / tolerance
        } else {
            1.0
        };
        let nearest_shoulder = if head > left { left.max(right) } else { left.min(right) };
        let prominence = saturate((head - nearest_shoulder).abs() / head.abs(), tolerance);
        Some((symmetry + prominence) / 2.0)
    }

    fn regular<T: OHLCV>(&self, bars: &[T], ctx: &DetectionContext) -> Vec<PatternRecord> {
        ctx.extrema
            .peaks
            .windows(3)
            .filter_map(|w| {
                let (ls, hd, rs) = (
                    PricePoint::new(w[0], bars.get(w[0])?.high()),
                    PricePoint::new(w[1], bars.get(w[1])?.high()),
                    PricePoint::new(w[2], bars.get(w[2])?.high()),
                );
                if hd.price <= ls.price || hd.price <= rs.price {
                    return None;
                }
                let confidence = self.confidence(ls.price, hd.price, rs.price)?;
                let (_, left_trough) = lowest_low_between(bars, ls.index, hd.index)?;
                let (_, right_trough) = lowest_low_between(bars, hd.index, rs.index)?;
                let neckline = (left_trough + right_trough) / 2.0;
                Some(PatternRecord::HeadAndShoulders {
                    inverse: false,
                    left_shoulder: ls,
                    head: hd,
                    right_shoulder: rs,
                    neckline,
                    target: neckline - (hd.price - neckline),
                    confidence,
                })
            })
            .collect()
    }

    fn inverse<T: OHLCV>(&self, bars: &[T], ctx: &DetectionContext) -> Vec<PatternRecord> {
        ctx.extrema
            .lows
            .windows(3)
            .filter_map(|w| {
                let (ls, hd, rs) = (
                    PricePoint::new(w[0], bars.get(w[0])?.low()),
                    PricePoint::new(w[1], bars.get(w[1])?.low()),
                    PricePoint::new(w[2], bars.get(w[2])?.low()),
                );
                if hd.price >= ls.price || hd.price >= rs.price || hd.price <= 0.0 {
                    return None;
                }
                let confidence = self.confidence(ls.price, hd.price, rs.price)?;
                let (_, left_peak) = highest_high_between(bars, ls.index, hd.index)?;
                let (_, right_peak) = highest_high_between(bars, hd.index, rs.index)?;
                let neckline = (left_peak + right_peak) / 2.0;
                Some(PatternRecord::HeadAndShoulders {
                    inverse: true,
                    left_shoulder: ls,
                    head: hd,
                    right_shoulder: rs,
                    neckline,
                    target: neckline + (neckline - hd.price),
                    confidence,
                })
            })
            .collect()
    }
}

impl ChartDetector for HeadAndShouldersDetector {
    fn name(&self) -> &'static str {
        "head_and_shoulders"
    }

    fn kinds(&self) -> &'static [PatternKind] {
        &[PatternKind::HeadAndShoulders]
    }

    fn min_bars(&self) -> usize {
        5
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &DetectionContext) -> Vec<PatternRecord> {
        let mut out = self.regular(bars, ctx);
        out.extend(self.inverse(bars, ctx));
        out
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATION
// ============================================================

static HEAD_SHOULDERS_PARAMS: &[ParamMeta] = &[ParamMeta {
    name: "shoulder_tolerance",
    param_type: ParamType::Ratio,
    default: 0.03,
    range: (0.01, 0.08, 0.01),
    description: "Max relative difference between the shoulders",
}];

impl ParameterizedDetector for HeadAndShouldersDetector {
    fn param_meta() -> &'static [ParamMeta] {
        HEAD_SHOULDERS_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            shoulder_tolerance: get_ratio(params, "shoulder_tolerance", 0.03)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "head_and_shoulders"
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
    fn test_head_and_shoulders() {
        let mut bars = vec![Hl(95.0, 92.0); 12];
        bars[2] = Hl(100.0, 96.0);
        bars[4] = Hl(94.0, 90.0);
        bars[6] = Hl(110.0, 100.0);
        bars[8] = Hl(94.0, 90.0);
        bars[10] = Hl(101.0, 96.0);

        let records = HeadAndShouldersDetector::default().detect(&bars, &context(vec![2, 6, 10], vec![]));
        assert_eq!(records.len(), 1);
        match records[0] {
            PatternRecord::HeadAndShoulders {
                inverse,
                head,
                neckline,
                target,
                ..
            } => {
                assert!(!inverse);
                assert_eq!(head.index, 6);
                assert!((neckline - 90.0).abs() < 1e-12);
                assert!((target - 70.0).abs() < 1e-12);
            }
            ref other => panic!("unexpected record {other:?}"),
        }
        assert!(records[0].direction().is_bearish());
    }

    #[test]
    fn test_lopsided_shoulders_rejected() {
        let mut bars = vec![Hl(95.0, 92.0); 12];
        bars[2] = Hl(100.0, 96.0);
        bars[6] = Hl(110.0, 100.0);
        bars[10] = Hl(106.0, 96.0);
        assert!(HeadAndShouldersDetector::default()
            .detect(&bars, &context(vec![2, 6, 10], vec![]))
            .is_empty());
    }

    #[test]
    fn test_inverse_head_and_shoulders() {
        let mut bars = vec![Hl(100.0, 96.0); 12];
        bars[2] = Hl(95.0, 90.0);
        bars[4] = Hl(104.0, 97.0);
        bars[6] = Hl(92.0, 80.0);
        bars[8] = Hl(106.0, 97.0);
        bars[10] = Hl(95.0, 90.5);

        let records = HeadAndShouldersDetector::default().detect(&bars, &context(vec![], vec![2, 6, 10]));
        assert_eq!(records.len(), 1);
        match records[0] {
            PatternRecord::HeadAndShoulders {
                inverse,
                neckline,
                target,
                ..
            } => {
                assert!(inverse);
                assert!((neckline - 105.0).abs() < 1e-12);
                assert!((target - 130.0).abs() < 1e-12);
            }
            ref other => panic!("unexpected record {other:?}"),
        }
    }
}
