//! Volume spikes and dips against a trailing mean

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::engine::{ChartDetector, DetectionContext};
use crate::params::{get_factor, get_period, ParamMeta, ParamType, ParameterizedDetector};
use crate::pattern::{PatternKind, PatternRecord, VolumeAnomalyKind};
use crate::{AnalysisError, Period, Result, OHLCV};

impl_with_defaults!(VolumeAnomalyDetector);

// ============================================================
// ROLLING WINDOW
// ============================================================

/// Last `capacity` volumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingVolume {
    capacity: usize,
    values: VecDeque<f64>,
}

impl RollingVolume {
    pub fn new(capacity: Period) -> Self {
        Self {
            capacity: capacity.get(),
            values: VecDeque::with_capacity(capacity.get()),
        }
    }

    pub fn push(&mut self, volume: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(volume);
    }

    /// Mean of the window. Summed afresh each call so rounding never accumulates.
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Window primed with the trailing volumes of `bars`
    pub fn from_bars<T: OHLCV>(capacity: Period, bars: &[T]) -> Self {
        let mut window = Self::new(capacity);
        let skip = bars.len().saturating_sub(capacity.get());
        for bar in &bars[skip..] {
            window.push(bar.volume());
        }
        window
    }
}

// ============================================================
// DETECTOR
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeAnomalyDetector {
    /// Bars in the trailing mean
    pub window: Period,
    /// Spike above `threshold × mean`, dip below `mean / threshold`
    pub threshold: f64,
}

impl Default for VolumeAnomalyDetector {
    fn default() -> Self {
        Self {
            window: Period::new_const(20),
            threshold: 2.0,
        }
    }
}

impl VolumeAnomalyDetector {
    /// Check one bar's volume against the mean of the bars before it
    pub fn classify(&self, index: usize, volume: f64, mean: f64) -> Option<PatternRecord> {
        if mean <= 0.0 || !mean.is_finite() {
            return None;
        }
        let ratio = volume / mean;
        let (anomaly, strength) = if ratio > self.threshold {
            (VolumeAnomalyKind::Spike, ratio)
        } else if ratio < 1.0 / self.threshold {
            let inverse = if ratio > 0.0 { 1.0 / ratio } else { f64::INFINITY };
            (VolumeAnomalyKind::Dip, inverse)
        } else {
            return None;
        };
        Some(PatternRecord::VolumeAnomaly {
            anomaly,
            index,
            volume,
            mean,
            ratio,
            confidence: (strength / (2.0 * self.threshold)).min(1.0),
        })
    }
}

impl ChartDetector for VolumeAnomalyDetector {
    fn name(&self) -> &'static str {
        "volume_anomaly"
    }

    fn kinds(&self) -> &'static [PatternKind] {
        &[PatternKind::VolumeAnomaly]
    }

    fn min_bars(&self) -> usize {
        self.window.get() + 1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &DetectionContext) -> Vec<PatternRecord> {
        let mut rolling = RollingVolume::new(self.window);
        let mut out = Vec::new();
        for (i, bar) in bars.iter().enumerate() {
            if rolling.is_full() {
                if let Some(record) = rolling.mean().and_then(|m| self.classify(i, bar.volume(), m)) {
                    out.push(record);
                }
            }
            rolling.push(bar.volume());
        }
        out
    }

    fn validate_config(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold <= 1.0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "volume threshold {} must be above 1",
                self.threshold
            )));
        }
        Ok(())
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATION
// ============================================================

static VOLUME_ANOMALY_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "window",
        param_type: ParamType::Period,
        default: 20.0,
        range: (5.0, 50.0, 5.0),
        description: "Bars in the trailing mean",
    },
    ParamMeta {
        name: "threshold",
        param_type: ParamType::Factor,
        default: 2.0,
        range: (1.5, 4.0, 0.5),
        description: "Volume/mean ratio marking a spike",
    },
];

impl ParameterizedDetector for VolumeAnomalyDetector {
    fn param_meta() -> &'static [ParamMeta] {
        VOLUME_ANOMALY_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            window: get_period(params, "window", 20)?,
            threshold: get_factor(params, "threshold", 2.0)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "volume_anomaly"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy)]
    struct Vol(f64);

    impl OHLCV for Vol {
        fn open(&self) -> f64 {
            10.0
        }

        fn high(&self) -> f64 {
            10.0
        }

        fn low(&self) -> f64 {
            10.0
        }

        fn close(&self) -> f64 {
            10.0
        }

        fn volume(&self) -> f64 {
            self.0
        }
    }

    fn bars(volumes: &[f64]) -> Vec<Vol> {
        volumes.iter().map(|&v| Vol(v)).collect()
    }

    #[test]
    fn test_spike_ratio() {
        let detector = VolumeAnomalyDetector {
            window: Period::new_const(4),
            threshold: 2.0,
        };
        let records = detector.detect(&bars(&[100.0, 100.0, 100.0, 100.0, 500.0]), &DetectionContext::default());
        assert_eq!(records.len(), 1);
        match records[0] {
            PatternRecord::VolumeAnomaly {
                anomaly,
                index,
                ratio,
                confidence,
                ..
            } => {
                assert_eq!(anomaly, VolumeAnomalyKind::Spike);
                assert_eq!(index, 4);
                assert!((ratio - 5.0).abs() < 1e-12);
                assert_eq!(confidence, 1.0);
            }
            ref other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_dip() {
        let detector = VolumeAnomalyDetector {
            window: Period::new_const(4),
            threshold: 2.0,
        };
        let records = detector.detect(&bars(&[100.0, 100.0, 100.0, 100.0, 40.0]), &DetectionContext::default());
        assert_eq!(records.len(), 1);
        match records[0] {
            PatternRecord::VolumeAnomaly {
                anomaly, confidence, ..
            } => {
                assert_eq!(anomaly, VolumeAnomalyKind::Dip);
                assert!((confidence - 0.625).abs() < 1e-12);
            }
            ref other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_zero_mean_skipped() {
        let detector = VolumeAnomalyDetector {
            window: Period::new_const(3),
            threshold: 2.0,
        };
        assert!(detector
            .detect(&bars(&[0.0, 0.0, 0.0, 500.0]), &DetectionContext::default())
            .is_empty());
    }

    #[test]
    fn test_rolling_window_evicts() {
        let mut rolling = RollingVolume::new(Period::new_const(2));
        assert_eq!(rolling.mean(), None);
        rolling.push(10.0);
        assert!(!rolling.is_full());
        rolling.push(20.0);
        rolling.push(40.0);
        assert!(rolling.is_full());
        assert_eq!(rolling.mean(), Some(30.0));

        let primed = RollingVolume::from_bars(Period::new_const(2), &bars(&[1.0, 2.0, 3.0]));
        assert_eq!(primed.mean(), Some(2.5));
    }

    #[test]
    fn test_threshold_must_exceed_one() {
        let detector = VolumeAnomalyDetector {
            threshold: 1.0,
            ..Default::default()
        };
        assert!(detector.validate_config().is_err());
    }
}
