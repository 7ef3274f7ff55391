//! Flags: a sharp pole followed by a tight, shallow counter-move

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::helpers::{mean, saturate};
use crate::engine::{ChartDetector, DetectionContext};
use crate::params::{get_factor, get_period, get_ratio, ParamMeta, ParamType, ParameterizedDetector};
use crate::pattern::{PatternKind, PatternRecord};
use crate::{AnalysisError, Direction, Period, Ratio, Result, OHLCV};

impl_with_defaults!(FlagDetector);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagDetector {
    /// Bars in the pole, measured close to close
    pub pole_bars: Period,
    /// Bars in the consolidation after the pole
    pub flag_bars: Period,
    /// Minimum relative close-to-close move of the pole
    pub min_pole_move: f64,
    /// Largest share of the pole the flag may give back
    pub pullback_ratio: Ratio,
    /// Mean absolute bar-to-bar close change allowed in the flag. Also caps
    /// how far the flag may run past the pole's end.
    pub max_volatility: f64,
    pub min_confidence: Ratio,
}

impl Default for FlagDetector {
    fn default() -> Self {
        Self {
            pole_bars: Period::new_const(10),
            flag_bars: Period::new_const(8),
            min_pole_move: 0.08,
            pullback_ratio: Ratio::new_const(0.35),
            max_volatility: 0.02,
            min_confidence: Ratio::new_const(0.3),
        }
    }
}

impl FlagDetector {
    /// Flag whose pole starts at `start`
    fn at(&self, closes: &[f64], start: usize) -> Option<PatternRecord> {
        let pole_end = start + self.pole_bars.get();
        let end = pole_end + self.flag_bars.get();
        if end >= closes.len() || closes[start..=end].iter().any(|&c| c <= 0.0) {
            return None;
        }
        let (base, top) = (closes[start], closes[pole_end]);

        let pole_move = (top - base) / base;
        if pole_move.abs() < self.min_pole_move {
            return None;
        }
        let direction = Direction::from_move(pole_move);
        let sign = direction.sign();
        let pole_height = (top - base).abs();
        let flag = &closes[pole_end + 1..=end];

        // Deepest counter-move and furthest continuation, both in pole direction units
        let deepest = flag
            .iter()
            .map(|c| (top - c) * sign)
            .fold(0.0_f64, f64::max);
        let furthest = flag
            .iter()
            .map(|c| (c - top) * sign)
            .fold(0.0_f64, f64::max);
        let retracement = deepest / pole_height;
        if retracement > self.pullback_ratio.get() || furthest / top > self.max_volatility {
            return None;
        }

        let volatility = mean(
            closes[pole_end..=end]
                .windows(2)
                .map(|w| ((w[1] - w[0]) / w[0]).abs()),
        )?;
        if volatility >= self.max_volatility {
            return None;
        }

        let strength = saturate(pole_move.abs(), 2.0 * self.min_pole_move);
        let tightness = 1.0 - volatility / self.max_volatility;
        let shallowness = if self.pullback_ratio.get() > 0.0 {
            1.0 - retracement / self.pullback_ratio.get()
        } else {
            1.0
        };
        let confidence = (strength + tightness + shallowness) / 3.0;
        if confidence < self.min_confidence.get() {
            return None;
        }

        Some(PatternRecord::Flag {
            direction,
            pole_start: start,
            pole_end,
            end,
            pole_move,
            retracement,
            volatility,
            confidence,
        })
    }
}

impl ChartDetector for FlagDetector {
    fn name(&self) -> &'static str {
        "flag"
    }

    fn kinds(&self) -> &'static [PatternKind] {
        &[PatternKind::Flag]
    }

    fn min_bars(&self) -> usize {
        self.pole_bars.get() + self.flag_bars.get() + 1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &DetectionContext) -> Vec<PatternRecord> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close()).collect();
        let mut out = Vec::new();
        let mut start = 0;
        while start + ChartDetector::min_bars(self) <= closes.len() {
            match self.at(&closes, start) {
                Some(record) => {
                    start = record.end_index() + 1;
                    out.push(record);
                }
                None => start += 1,
            }
        }
        out
    }

    fn validate_config(&self) -> Result<()> {
        for (name, value) in [
            ("min_pole_move", self.min_pole_move),
            ("max_volatility", self.max_volatility),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(AnalysisError::InvalidConfig(format!(
                    "flag {name} {value} must be positive"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATION
// ============================================================

static FLAG_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "pole_bars",
        param_type: ParamType::Period,
        default: 10.0,
        range: (5.0, 20.0, 1.0),
        description: "Bars in the pole",
    },
    ParamMeta {
        name: "flag_bars",
        param_type: ParamType::Period,
        default: 8.0,
        range: (4.0, 15.0, 1.0),
        description: "Bars in the consolidation",
    },
    ParamMeta {
        name: "min_pole_move",
        param_type: ParamType::Factor,
        default: 0.08,
        range: (0.04, 0.2, 0.02),
        description: "Minimum relative pole move",
    },
    ParamMeta {
        name: "pullback_ratio",
        param_type: ParamType::Ratio,
        default: 0.35,
        range: (0.2, 0.5, 0.05),
        description: "Max share of the pole retraced by the flag",
    },
    ParamMeta {
        name: "max_volatility",
        param_type: ParamType::Factor,
        default: 0.02,
        range: (0.01, 0.04, 0.005),
        description: "Max mean bar-to-bar change in the flag",
    },
    ParamMeta {
        name: "min_confidence",
        param_type: ParamType::Ratio,
        default: 0.3,
        range: (0.2, 0.6, 0.1),
        description: "Confidence floor",
    },
];

impl ParameterizedDetector for FlagDetector {
    fn param_meta() -> &'static [ParamMeta] {
        FLAG_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            pole_bars: get_period(params, "pole_bars", 10)?,
            flag_bars: get_period(params, "flag_bars", 8)?,
            min_pole_move: get_factor(params, "min_pole_move", 0.08)?,
            pullback_ratio: get_ratio(params, "pullback_ratio", 0.35)?,
            max_volatility: get_factor(params, "max_volatility", 0.02)?,
            min_confidence: get_ratio(params, "min_confidence", 0.3)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "flag"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy)]
    struct Close(f64);

    impl OHLCV for Close {
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
            1.0
        }
    }

    /// `flat` bars at 100, then `pole` bars compounding `pole_step`, then `tail` bars compounding `tail_step`
    fn path(flat: usize, pole: usize, pole_step: f64, tail: usize, tail_step: f64) -> Vec<Close> {
        let mut price = 100.0;
        let mut out = vec![Close(price); flat];
        for _ in 0..pole {
            price *= 1.0 + pole_step;
            out.push(Close(price));
        }
        for _ in 0..tail {
            price *= 1.0 + tail_step;
            out.push(Close(price));
        }
        out
    }

    #[test]
    fn test_bull_flag() {
        let bars = path(5, 10, 0.015, 10, -0.003);
        let records = FlagDetector::default().detect(&bars, &DetectionContext::default());
        assert_eq!(records.len(), 1);
        match records[0] {
            PatternRecord::Flag {
                direction,
                pole_move,
                retracement,
                ..
            } => {
                assert_eq!(direction, Direction::Bullish);
                assert!(pole_move >= 0.08);
                assert!(retracement <= 0.35);
            }
            ref other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_bear_flag() {
        let bars = path(5, 10, -0.015, 10, 0.002);
        let records = FlagDetector::default().detect(&bars, &DetectionContext::default());
        assert_eq!(records.len(), 1);
        assert!(records[0].direction().is_bearish());
    }

    #[test]
    fn test_steady_trend_is_not_a_flag() {
        let bars = path(0, 40, 0.015, 0, 0.0);
        assert!(FlagDetector::default()
            .detect(&bars, &DetectionContext::default())
            .is_empty());
    }

    #[test]
    fn test_zero_close_in_window_is_skipped() {
        // pole collapses to zero and stays there
        let mut bars: Vec<Close> = (0..=10).map(|k| Close(100.0 - 10.0 * k as f64)).collect();
        bars.extend(vec![Close(0.0); 8]);
        let records = FlagDetector::default().detect(&bars, &DetectionContext::default());
        assert!(records.is_empty());
    }

    #[test]
    fn test_deep_pullback_rejected() {
        // gives back well over half of the pole
        let bars = path(1, 10, 0.015, 9, -0.012);
        assert!(FlagDetector::default()
            .detect(&bars, &DetectionContext::default())
            .is_empty());
    }
}
