//! Support and resistance levels
//!
//! Peak highs cluster into resistance and low lows into support, each side on
//! its own, in one greedy pass over the extrema in index order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::engine::{ChartDetector, DetectionContext};
use crate::extrema::ExtremaSet;
use crate::params::{get_period, get_ratio, ParamMeta, ParamType, ParameterizedDetector};
use crate::pattern::{LevelKind, PatternKind, PatternRecord, SupportResistanceLevel};
use crate::{AnalysisError, Period, Ratio, Result, OHLCV};

impl_with_defaults!(SupportResistanceDetector);

/// Greedy clustering of extrema into price levels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportResistanceDetector {
    /// Max relative distance between an extremum and the level it joins
    pub cluster_threshold: Ratio,
    /// Levels with fewer touches are dropped
    pub min_touches: Period,
    /// Touch count at which confidence reaches 1.0
    pub saturation_touches: Period,
}

impl Default for SupportResistanceDetector {
    fn default() -> Self {
        Self {
            cluster_threshold: Ratio::new_const(0.02),
            min_touches: Period::new_const(2),
            saturation_touches: Period::new_const(5),
        }
    }
}

impl SupportResistanceDetector {
    /// All qualifying levels, resistance first, each side in order of first touch
    pub fn levels<T: OHLCV>(&self, bars: &[T], extrema: &ExtremaSet) -> Vec<SupportResistanceLevel> {
        let peaks = extrema
            .peaks
            .iter()
            .filter_map(|&i| bars.get(i).map(|b| (i, b.high())));
        let lows = extrema
            .lows
            .iter()
            .filter_map(|&i| bars.get(i).map(|b| (i, b.low())));

        let mut out = self.cluster(LevelKind::Resistance, peaks);
        out.extend(self.cluster(LevelKind::Support, lows));
        out.retain(|level| level.strength >= self.min_touches.get());
        out
    }

    fn cluster(
        &self,
        kind: LevelKind,
        points: impl Iterator<Item = (usize, f64)>,
    ) -> Vec<SupportResistanceLevel> {
        let threshold = self.cluster_threshold.get();
        let mut clusters: Vec<SupportResistanceLevel> = Vec::new();
        for (index, price) in points {
            let nearest = clusters
                .iter_mut()
                .map(|c| (c.distance(price), c))
                .filter(|(d, _)| *d <= threshold)
                .min_by(|a, b| a.0.total_cmp(&b.0));
            match nearest {
                Some((_, level)) => level.add_touch(index, price),
                None => clusters.push(SupportResistanceLevel::new(kind, index, price)),
            }
        }
        clusters
    }

    /// `min(1, touches / saturation_touches)`
    #[inline]
    pub fn confidence(&self, level: &SupportResistanceLevel) -> f64 {
        (level.strength as f64 / self.saturation_touches.get() as f64).min(1.0)
    }

    pub fn record(&self, level: SupportResistanceLevel) -> PatternRecord {
        let confidence = self.confidence(&level);
        PatternRecord::Level { level, confidence }
    }
}

impl ChartDetector for SupportResistanceDetector {
    fn name(&self) -> &'static str {
        "support_resistance"
    }

    fn kinds(&self) -> &'static [PatternKind] {
        &[PatternKind::Level]
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &DetectionContext) -> Vec<PatternRecord> {
        self.levels(bars, &ctx.extrema)
            .into_iter()
            .map(|level| self.record(level))
            .collect()
    }

    fn validate_config(&self) -> Result<()> {
        if self.saturation_touches < self.min_touches {
            return Err(AnalysisError::InvalidConfig(format!(
                "saturation_touches {} below min_touches {}",
                self.saturation_touches, self.min_touches
            )));
        }
        Ok(())
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATION
// ============================================================

static SUPPORT_RESISTANCE_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "cluster_threshold",
        param_type: ParamType::Ratio,
        default: 0.02,
        range: (0.005, 0.05, 0.005),
        description: "Max relative distance to join a level",
    },
    ParamMeta {
        name: "min_touches",
        param_type: ParamType::Period,
        default: 2.0,
        range: (2.0, 5.0, 1.0),
        description: "Minimum touches for a level to count",
    },
    ParamMeta {
        name: "saturation_touches",
        param_type: ParamType::Period,
        default: 5.0,
        range: (3.0, 10.0, 1.0),
        description: "Touches at which confidence saturates",
    },
];

impl ParameterizedDetector for SupportResistanceDetector {
    fn param_meta() -> &'static [ParamMeta] {
        SUPPORT_RESISTANCE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            cluster_threshold: get_ratio(params, "cluster_threshold", 0.02)?,
            min_touches: get_period(params, "min_touches", 2)?,
            saturation_touches: get_period(params, "saturation_touches", 5)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "level"
    }
}
