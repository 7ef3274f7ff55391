//! Triangle consolidations
//!
//! For each start index the scan tries windows of `min_bars..=max_bars` bars
//! in steps of `step`, fits a least-squares line through the window's peak
//! highs and another through its low lows, and classifies the pair of slopes.
//! The widest qualifying window wins and the scan resumes after it, so
//! triangles never overlap.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::helpers::{linear_fit, mean, LineFit};
use crate::engine::{ChartDetector, DetectionContext};
use crate::params::{get_factor, get_period, get_ratio, ParamMeta, ParamType, ParameterizedDetector};
use crate::pattern::{PatternKind, PatternRecord, PricePoint, TriangleKind};
use crate::{AnalysisError, Period, Ratio, Result, OHLCV};

impl_with_defaults!(TriangleDetector);

/// RMSE of a flat line, relative to the window's mean close, at which its fit quality reaches 0
const FLAT_FIT_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangleDetector {
    pub min_bars: Period,
    pub max_bars: Period,
    pub step: Period,
    /// Normalized slopes with magnitude at or below this count as flat
    pub flat_slope: f64,
    /// Max `||a| - |b|| / max(|a|, |b|)` for a symmetrical triangle
    pub max_slope_diff: Ratio,
    pub min_confidence: Ratio,
    /// Peaks and lows each line needs inside the window
    pub min_touches: Period,
}

impl Default for TriangleDetector {
    fn default() -> Self {
        Self {
            min_bars: Period::new_const(15),
            max_bars: Period::new_const(60),
            step: Period::new_const(5),
            flat_slope: 0.001,
            max_slope_diff: Ratio::new_const(0.35),
            min_confidence: Ratio::new_const(0.3),
            min_touches: Period::new_const(2),
        }
    }
}

struct Side {
    fit: LineFit,
    /// Slope per bar relative to the window's mean close
    slope: f64,
    quality: f64,
}

impl TriangleDetector {
    fn fit_side<T: OHLCV>(
        &self,
        bars: &[T],
        indices: &[usize],
        price: impl Fn(&T) -> f64,
        mean_close: f64,
    ) -> Option<Side> {
        if indices.len() < self.min_touches.get() {
            return None;
        }
        let points: Vec<(f64, f64)> = indices
            .iter()
            .map(|&i| (i as f64, price(&bars[i])))
            .collect();
        let fit = linear_fit(&points)?;
        let slope = fit.slope / mean_close;
        let quality = if slope.abs() <= self.flat_slope {
            // R² says nothing about a horizontal line; use its tightness instead
            1.0 - (fit.rmse / mean_close / FLAT_FIT_TOLERANCE).min(1.0)
        } else {
            fit.r_squared
        };
        Some(Side {
            fit,
            slope,
            quality,
        })
    }

    /// Classify the slope pair and rate how cleanly it matches its class
    fn classify(&self, upper: f64, lower: f64) -> Option<(TriangleKind, f64)> {
        let flat = self.flat_slope;
        let upper_flat = upper.abs() <= flat;
        let lower_flat = lower.abs() <= flat;

        if !upper_flat && !lower_flat && upper < 0.0 && lower > 0.0 {
            let diff = (upper.abs() - lower.abs()).abs() / upper.abs().max(lower.abs());
            let max_diff = self.max_slope_diff.get();
            if diff > max_diff {
                return None;
            }
            let cleanliness = if max_diff > 0.0 {
                1.0 - 0.5 * diff / max_diff
            } else {
                1.0
            };
            return Some((TriangleKind::Symmetrical, cleanliness));
        }
        let flatness = |slope: f64| {
            if flat > 0.0 {
                1.0 - 0.5 * slope.abs() / flat
            } else {
                1.0
            }
        };
        if upper_flat && lower > flat {
            return Some((TriangleKind::Ascending, flatness(upper)));
        }
        if upper < -flat && lower_flat {
            return Some((TriangleKind::Descending, flatness(lower)));
        }
        None
    }

    /// Triangle over `bars[start..end]`, if the window holds one
    fn window<T: OHLCV>(
        &self,
        bars: &[T],
        ctx: &DetectionContext,
        start: usize,
        end: usize,
    ) -> Option<PatternRecord> {
        let mean_close = mean(bars[start..end].iter().map(|b| b.close()))?;
        if mean_close <= 0.0 {
            return None;
        }
        let peaks = ctx.extrema.peaks_in(start..end);
        let lows = ctx.extrema.lows_in(start..end);
        let upper = self.fit_side(bars, peaks, |b| b.high(), mean_close)?;
        let lower = self.fit_side(bars, lows, |b| b.low(), mean_close)?;

        let (triangle, cleanliness) = self.classify(upper.slope, lower.slope)?;
        let confidence = (upper.quality + lower.quality) / 2.0 * cleanliness;
        if confidence < self.min_confidence.get() {
            return None;
        }

        let last = end - 1;
        let line = |fit: &LineFit| {
            (
                PricePoint::new(start, fit.at(start as f64)),
                PricePoint::new(last, fit.at(last as f64)),
            )
        };
        Some(PatternRecord::Triangle {
            triangle,
            start,
            end: last,
            upper_slope: upper.slope,
            lower_slope: lower.slope,
            upper: line(&upper.fit),
            lower: line(&lower.fit),
            confidence,
        })
    }
}

impl ChartDetector for TriangleDetector {
    fn name(&self) -> &'static str {
        "triangle"
    }

    fn kinds(&self) -> &'static [PatternKind] {
        &[PatternKind::Triangle]
    }

    fn min_bars(&self) -> usize {
        self.min_bars.get()
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &DetectionContext) -> Vec<PatternRecord> {
        let n = bars.len();
        let (min_len, max_len, step) = (self.min_bars.get(), self.max_bars.get(), self.step.get());
        let mut out = Vec::new();
        let mut start = 0;

        while start + min_len <= n {
            let mut best = None;
            let mut len = min_len;
            while len <= max_len && start + len <= n {
                if let Some(record) = self.window(bars, ctx, start, start + len) {
                    best = Some(record);
                }
                len += step;
            }
            match best {
                Some(record) => {
                    start = record.end_index() + 1;
                    out.push(record);
                }
                None => start += step,
            }
        }
        out
    }

    fn validate_config(&self) -> Result<()> {
        if self.max_bars < self.min_bars {
            return Err(AnalysisError::InvalidConfig(format!(
                "triangle max_bars {} below min_bars {}",
                self.max_bars, self.min_bars
            )));
        }
        if !self.flat_slope.is_finite() || self.flat_slope < 0.0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "triangle flat_slope {} must be a non-negative number",
                self.flat_slope
            )));
        }
        if self.min_touches.get() < 2 {
            return Err(AnalysisError::InvalidConfig(
                "triangle lines need at least 2 touches".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATION
// ============================================================

static TRIANGLE_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "min_bars",
        param_type: ParamType::Period,
        default: 15.0,
        range: (10.0, 30.0, 5.0),
        description: "Shortest window",
    },
    ParamMeta {
        name: "max_bars",
        param_type: ParamType::Period,
        default: 60.0,
        range: (30.0, 120.0, 10.0),
        description: "Longest window",
    },
    ParamMeta {
        name: "step",
        param_type: ParamType::Period,
        default: 5.0,
        range: (1.0, 10.0, 1.0),
        description: "Window growth and start advance",
    },
    ParamMeta {
        name: "flat_slope",
        param_type: ParamType::Factor,
        default: 0.001,
        range: (0.0005, 0.003, 0.0005),
        description: "Normalized slope treated as flat",
    },
    ParamMeta {
        name: "max_slope_diff",
        param_type: ParamType::Ratio,
        default: 0.35,
        range: (0.2, 0.5, 0.05),
        description: "Slope asymmetry allowed for symmetrical triangles",
    },
    ParamMeta {
        name: "min_confidence",
        param_type: ParamType::Ratio,
        default: 0.3,
        range: (0.2, 0.6, 0.1),
        description: "Confidence floor",
    },
    ParamMeta {
        name: "min_touches",
        param_type: ParamType::Period,
        default: 2.0,
        range: (2.0, 4.0, 1.0),
        description: "Extrema required on each line",
    },
];

impl ParameterizedDetector for TriangleDetector {
    fn param_meta() -> &'static [ParamMeta] {
        TRIANGLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            min_bars: get_period(params, "min_bars", 15)?,
            max_bars: get_period(params, "max_bars", 60)?,
            step: get_period(params, "step", 5)?,
            flat_slope: get_factor(params, "flat_slope", 0.001)?,
            max_slope_diff: get_ratio(params, "max_slope_diff", 0.35)?,
            min_confidence: get_ratio(params, "min_confidence", 0.3)?,
            min_touches: get_period(params, "min_touches", 2)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "triangle"
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;
    use crate::extrema::find_price_extrema;

    #[derive(Clone, Copy)]
    struct Bar {
        c: f64,
    }

    impl OHLCV for Bar {
        fn open(&self) -> f64 {
            self.c
        }

        fn high(&self) -> f64 {
            self.c + 0.5
        }

        fn low(&self) -> f64 {
            self.c - 0.5
        }

        fn close(&self) -> f64 {
            self.c
        }

        fn volume(&self) -> f64 {
            1000.0
        }
    }

    /// Oscillation with period 8 around `mid(i)` with amplitude `amp(i)`
    fn wave(n: usize, mid: impl Fn(f64) -> f64, amp: impl Fn(f64) -> f64) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let x = i as f64;
                Bar {
                    c: mid(x) + amp(x) * (2.0 * PI * x / 8.0).sin(),
                }
            })
            .collect()
    }

    fn context(bars: &[Bar]) -> DetectionContext {
        DetectionContext {
            extrema: find_price_extrema(bars, Period::new_const(3)),
            ..DetectionContext::default()
        }
    }

    #[test]
    fn test_symmetrical_triangle() {
        let bars = wave(40, |_| 100.0, |x| 10.0 - 0.2 * x);
        let records = TriangleDetector::default().detect(&bars, &context(&bars));
        assert_eq!(records.len(), 1);
        match &records[0] {
            PatternRecord::Triangle {
                triangle,
                start,
                end,
                upper_slope,
                lower_slope,
                confidence,
                ..
            } => {
                assert_eq!(*triangle, TriangleKind::Symmetrical);
                assert_eq!((*start, *end), (0, 39));
                assert!(*upper_slope < 0.0 && *lower_slope > 0.0);
                assert!(*confidence > 0.9);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_ascending_triangle() {
        // flat top at 110.5, lows rising 0.4 per bar
        let bars = wave(40, |x| 100.0 + 0.2 * x, |x| 10.0 - 0.2 * x);
        let records = TriangleDetector::default().detect(&bars, &context(&bars));
        assert_eq!(records.len(), 1);
        assert!(matches!(
            records[0],
            PatternRecord::Triangle {
                triangle: TriangleKind::Ascending,
                ..
            }
        ));
        assert!(records[0].direction().is_bullish());
    }

    #[test]
    fn test_parallel_channel_is_not_a_triangle() {
        let bars = wave(40, |x| 100.0 + 0.3 * x, |_| 5.0);
        assert!(TriangleDetector::default()
            .detect(&bars, &context(&bars))
            .is_empty());
    }

    #[test]
    fn test_short_series() {
        let bars = wave(10, |_| 100.0, |_| 5.0);
        assert!(TriangleDetector::default()
            .detect(&bars, &context(&bars))
            .is_empty());
    }

    #[test]
    fn test_config_validation() {
        let detector = TriangleDetector {
            min_bars: Period::new_const(30),
            max_bars: Period::new_const(20),
            ..Default::default()
        };
        assert!(detector.validate_config().is_err());
        assert!(TriangleDetector::with_defaults().validate_config().is_ok());
    }
}
