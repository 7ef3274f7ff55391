//! Price/oscillator divergence
//!
//! Consecutive price peaks are compared with the oscillator at the same bars:
//! a higher price high against a lower oscillator high is bearish. Consecutive
//! price lows mirror it: a lower low against a higher oscillator low is
//! bullish. Each price extremum takes the oscillator value of the nearest
//! oscillator extremum within `match_window` bars, falling back to the
//! oscillator value at the same index.
//!
//! The oscillator is whatever the [`DetectionContext`] carries (RSI by
//! default); [`DivergenceDetector::detect_with`] runs against any other series.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::helpers::saturate;
use crate::engine::{ChartDetector, DetectionContext};
use crate::extrema::ExtremaSet;
use crate::indicators::IndicatorSeries;
use crate::params::{get_factor, get_period, ParamMeta, ParamType, ParameterizedDetector};
use crate::pattern::{PatternKind, PatternRecord, PricePoint};
use crate::{AnalysisError, Direction, Period, Result, OHLCV};

impl_with_defaults!(DivergenceDetector);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DivergenceDetector {
    /// Max distance in bars from a price extremum to its oscillator counterpart
    pub match_window: usize,
    /// Max distance in bars between the two price extrema
    pub max_span: Period,
    /// Relative price move at which the price half of the confidence saturates
    pub price_scale: f64,
    /// Oscillator move (in oscillator units) at which its half saturates
    pub indicator_scale: f64,
}

impl Default for DivergenceDetector {
    fn default() -> Self {
        Self {
            match_window: 3,
            max_span: Period::new_const(60),
            price_scale: 0.05,
            indicator_scale: 10.0,
        }
    }
}

impl DivergenceDetector {
    /// Divergences between `bars` and `indicator`, given both sets of extrema
    pub fn detect_with<T: OHLCV>(
        &self,
        bars: &[T],
        extrema: &ExtremaSet,
        indicator: &IndicatorSeries,
        indicator_extrema: &ExtremaSet,
    ) -> Vec<PatternRecord> {
        let highs = extrema
            .peaks
            .iter()
            .filter_map(|&i| bars.get(i).map(|b| PricePoint::new(i, b.high())));
        let lows = extrema
            .lows
            .iter()
            .filter_map(|&i| bars.get(i).map(|b| PricePoint::new(i, b.low())));

        let mut out = self.scan(
            Direction::Bearish,
            highs.collect(),
            indicator,
            &indicator_extrema.peaks,
        );
        out.extend(self.scan(
            Direction::Bullish,
            lows.collect(),
            indicator,
            &indicator_extrema.lows,
        ));
        out.sort_by_key(|r| r.span());
        out
    }

    fn scan(
        &self,
        direction: Direction,
        points: Vec<PricePoint>,
        indicator: &IndicatorSeries,
        candidates: &[usize],
    ) -> Vec<PatternRecord> {
        points
            .windows(2)
            .filter_map(|pair| {
                let (p1, p2) = (pair[0], pair[1]);
                if p2.index - p1.index > self.max_span.get() {
                    return None;
                }
                let i1 = self.counterpart(p1.index, indicator, candidates)?;
                let i2 = self.counterpart(p2.index, indicator, candidates)?;
                if i1.index >= i2.index {
                    return None;
                }

                // Bearish: price up, oscillator down. Bullish: price down, oscillator up.
                let price_move = p2.price - p1.price;
                let indicator_move = i2.price - i1.price;
                let diverges = match direction {
                    Direction::Bearish => price_move > 0.0 && indicator_move < 0.0,
                    Direction::Bullish => price_move < 0.0 && indicator_move > 0.0,
                    Direction::Neutral => false,
                };
                if !diverges || p1.price <= 0.0 {
                    return None;
                }

                let confidence = (saturate(price_move.abs() / p1.price, self.price_scale)
                    + saturate(indicator_move.abs(), self.indicator_scale))
                    / 2.0;
                Some(PatternRecord::Divergence {
                    direction,
                    price: (p1, p2),
                    indicator: (i1, i2),
                    confidence,
                })
            })
            .collect()
    }

    /// Oscillator point matched to the price extremum at `index`
    fn counterpart(
        &self,
        index: usize,
        indicator: &IndicatorSeries,
        candidates: &[usize],
    ) -> Option<PricePoint> {
        let nearest = candidates
            .iter()
            .copied()
            .filter(|&c| c.abs_diff(index) <= self.match_window)
            .min_by_key(|&c| (c.abs_diff(index), c));
        let at = nearest.unwrap_or(index);
        indicator.get(at).map(|value| PricePoint::new(at, value))
    }
}

impl ChartDetector for DivergenceDetector {
    fn name(&self) -> &'static str {
        "divergence"
    }

    fn kinds(&self) -> &'static [PatternKind] {
        &[PatternKind::Divergence]
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &DetectionContext) -> Vec<PatternRecord> {
        match &ctx.oscillator {
            Some(oscillator) => {
                self.detect_with(bars, &ctx.extrema, oscillator, &ctx.oscillator_extrema)
            }
            None => Vec::new(),
        }
    }

    fn validate_config(&self) -> Result<()> {
        for (name, value) in [
            ("price_scale", self.price_scale),
            ("indicator_scale", self.indicator_scale),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(AnalysisError::InvalidConfig(format!(
                    "divergence {name} {value} must be positive"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATION
// ============================================================

static DIVERGENCE_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "match_window",
        param_type: ParamType::Period,
        default: 3.0,
        range: (1.0, 6.0, 1.0),
        description: "Bars searched for the oscillator counterpart",
    },
    ParamMeta {
        name: "max_span",
        param_type: ParamType::Period,
        default: 60.0,
        range: (20.0, 120.0, 10.0),
        description: "Max bars between the two price extrema",
    },
    ParamMeta {
        name: "price_scale",
        param_type: ParamType::Factor,
        default: 0.05,
        range: (0.02, 0.1, 0.01),
        description: "Relative price move that saturates confidence",
    },
    ParamMeta {
        name: "indicator_scale",
        param_type: ParamType::Factor,
        default: 10.0,
        range: (5.0, 20.0, 5.0),
        description: "Oscillator move that saturates confidence",
    },
];

impl ParameterizedDetector for DivergenceDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DIVERGENCE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            match_window: get_period(params, "match_window", 3)?.get(),
            max_span: get_period(params, "max_span", 60)?,
            price_scale: get_factor(params, "price_scale", 0.05)?,
            indicator_scale: get_factor(params, "indicator_scale", 10.0)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "divergence"
    }
}
