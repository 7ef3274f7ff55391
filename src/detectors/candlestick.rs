//! Single-bar candlestick shapes
//!
//! Doji, hammer and shooting star from one bar's body and shadow shares of
//! its range. Zero-range bars never classify.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::helpers::{self, is_doji_shape, is_pin_shape, shape_ratios};
use crate::engine::{ChartDetector, DetectionContext};
use crate::params::{get_ratio, ParamMeta, ParamType, ParameterizedDetector};
use crate::pattern::{CandleKind, PatternKind, PatternRecord};
use crate::{OHLCVExt, Ratio, Result, OHLCV};

impl_with_defaults!(CandlestickDetector);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandlestickDetector {
    /// Doji: body below this share of the range
    pub doji_body: Ratio,
    /// Doji: both shadows above this share of the range
    pub doji_shadow: Ratio,
    /// Hammer / shooting star: body below this share of the range
    pub pin_body: Ratio,
    /// Hammer / shooting star: long shadow above this share of the range
    pub pin_shadow: Ratio,
    /// Hammer / shooting star: opposite shadow below this share of the range
    pub opposite_shadow: Ratio,
}

impl Default for CandlestickDetector {
    fn default() -> Self {
        Self {
            doji_body: Ratio::new_const(helpers::DOJI_BODY_RATIO),
            doji_shadow: Ratio::new_const(helpers::DOJI_SHADOW_RATIO),
            pin_body: Ratio::new_const(helpers::SMALL_BODY_RATIO),
            pin_shadow: Ratio::new_const(helpers::LONG_SHADOW_RATIO),
            opposite_shadow: Ratio::new_const(helpers::SHORT_SHADOW_RATIO),
        }
    }
}

impl CandlestickDetector {
    /// Shape of one bar with its confidence
    pub fn classify<T: OHLCV>(&self, bar: &T) -> Option<(CandleKind, f64)> {
        let (body, upper, lower) = shape_ratios(bar)?;

        if is_doji_shape(body, upper, lower, self.doji_body.get(), self.doji_shadow.get()) {
            let confidence = 0.5 + 0.5 * (1.0 - body / self.doji_body.get());
            return Some((CandleKind::Doji, confidence));
        }

        let (body_max, long_min, short_max) = (
            self.pin_body.get(),
            self.pin_shadow.get(),
            self.opposite_shadow.get(),
        );
        let pin_confidence = |long: f64| {
            let tail = if long_min < 1.0 {
                (long - long_min) / (1.0 - long_min)
            } else {
                1.0
            };
            0.5 + 0.25 * (1.0 - body / body_max) + 0.25 * tail.clamp(0.0, 1.0)
        };

        if bar.is_bullish() && is_pin_shape(body, lower, upper, body_max, long_min, short_max) {
            return Some((CandleKind::Hammer, pin_confidence(lower)));
        }
        if bar.is_bearish() && is_pin_shape(body, upper, lower, body_max, long_min, short_max) {
            return Some((CandleKind::ShootingStar, pin_confidence(upper)));
        }
        None
    }

    pub fn record_at<T: OHLCV>(&self, bar: &T, index: usize) -> Option<PatternRecord> {
        self.classify(bar).map(|(candle, confidence)| PatternRecord::Candlestick {
            candle,
            index,
            confidence,
        })
    }
}

/// Classify one bar with the default ratios
pub fn classify_candle<T: OHLCV>(bar: &T) -> Option<CandleKind> {
    CandlestickDetector::default().classify(bar).map(|(kind, _)| kind)
}

impl ChartDetector for CandlestickDetector {
    fn name(&self) -> &'static str {
        "candlestick"
    }

    fn kinds(&self) -> &'static [PatternKind] {
        &[PatternKind::Candlestick]
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &DetectionContext) -> Vec<PatternRecord> {
        bars.iter()
            .enumerate()
            .filter_map(|(i, bar)| self.record_at(bar, i))
            .collect()
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATION
// ============================================================

static CANDLESTICK_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "doji_body",
        param_type: ParamType::Ratio,
        default: 0.1,
        range: (0.05, 0.2, 0.05),
        description: "Max body/range for a doji",
    },
    ParamMeta {
        name: "doji_shadow",
        param_type: ParamType::Ratio,
        default: 0.2,
        range: (0.1, 0.3, 0.05),
        description: "Min shadow/range on both sides of a doji",
    },
    ParamMeta {
        name: "pin_body",
        param_type: ParamType::Ratio,
        default: 0.3,
        range: (0.2, 0.4, 0.05),
        description: "Max body/range for a hammer or shooting star",
    },
    ParamMeta {
        name: "pin_shadow",
        param_type: ParamType::Ratio,
        default: 0.5,
        range: (0.4, 0.7, 0.05),
        description: "Min long shadow/range for a hammer or shooting star",
    },
    ParamMeta {
        name: "opposite_shadow",
        param_type: ParamType::Ratio,
        default: 0.2,
        range: (0.05, 0.3, 0.05),
        description: "Max opposite shadow/range for a hammer or shooting star",
    },
];

impl ParameterizedDetector for CandlestickDetector {
    fn param_meta() -> &'static [ParamMeta] {
        CANDLESTICK_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            doji_body: get_ratio(params, "doji_body", helpers::DOJI_BODY_RATIO)?,
            doji_shadow: get_ratio(params, "doji_shadow", helpers::DOJI_SHADOW_RATIO)?,
            pin_body: get_ratio(params, "pin_body", helpers::SMALL_BODY_RATIO)?,
            pin_shadow: get_ratio(params, "pin_shadow", helpers::LONG_SHADOW_RATIO)?,
            opposite_shadow: get_ratio(params, "opposite_shadow", helpers::SHORT_SHADOW_RATIO)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "candlestick"
    }
}
