//! Series validation and normalization
//!
//! Every untrusted bar sequence passes through [`SeriesValidator`] before any
//! indicator or detector sees it. Malformed bars are errors and void the whole
//! series; suspicious-but-usable data (gaps, duplicates, zero volume, extreme
//! moves, future timestamps) only produces warnings.
//!
//! Output is sorted by time. Indices in errors and warnings refer to the
//! sorted order, which makes validation stable under re-validation.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::series::{Bar, RawBar, Series, Timeframe};
use crate::{AnalysisError, OHLCVExt, Result};

const DAY_SECS: i64 = 86_400;

/// Fatal problem: the series is unusable
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
pub enum ValidationError {
    #[error("series is empty")]
    Empty,

    #[error("bar {index} at {time}: {reason}")]
    Malformed {
        index: usize,
        time: DateTime<Utc>,
        reason: &'static str,
    },
}

/// Non-fatal finding surfaced alongside results
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
pub enum ValidationWarning {
    #[error("bar {index} repeats timestamp {time}")]
    DuplicateTimestamp { index: usize, time: DateTime<Utc> },

    #[error("gap of {gap_secs}s before bar {index}")]
    Gap { index: usize, gap_secs: i64 },

    #[error("bar {index} has zero volume")]
    ZeroVolume { index: usize },

    #[error("bar {index} range is {ratio:.2} of its average price")]
    ExtremeMove { index: usize, ratio: f64 },

    #[error("bar {index} at {time} is in the future")]
    FutureTimestamp { index: usize, time: DateTime<Utc> },
}

impl ValidationWarning {
    pub fn index(&self) -> usize {
        match self {
            ValidationWarning::DuplicateTimestamp { index, .. }
            | ValidationWarning::Gap { index, .. }
            | ValidationWarning::ZeroVolume { index }
            | ValidationWarning::ExtremeMove { index, .. }
            | ValidationWarning::FutureTimestamp { index, .. } => *index,
        }
    }
}

/// Errors (which void validity) and warnings (which do not)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error(s), {} warning(s)",
            self.errors.len(),
            self.warnings.len()
        )?;
        if let Some(first) = self.errors.first() {
            write!(f, "; first: {first}")?;
        }
        Ok(())
    }
}

/// Cleaned series plus the warnings raised while producing it
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSeries {
    pub series: Series,
    pub warnings: Vec<ValidationWarning>,
}

/// Validator thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Gaps longer than this (seconds) raise a warning
    pub max_gap_secs: i64,
    /// Bar range above this fraction of the bar's average price raises a warning
    pub extreme_move_ratio: f64,
    /// Warn on timestamps after the validation clock
    pub check_future: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_gap_secs: 7 * DAY_SECS,
            extreme_move_ratio: 0.5,
            check_future: true,
        }
    }
}

impl ValidationConfig {
    /// Defaults scaled to a timeframe. Intraday series allow a long weekend.
    pub fn for_timeframe(timeframe: Timeframe) -> Self {
        let max_gap_secs = match timeframe {
            tf if tf.is_intraday() => 3 * DAY_SECS,
            Timeframe::Week1 => 14 * DAY_SECS,
            _ => 7 * DAY_SECS,
        };
        Self {
            max_gap_secs,
            ..Self::default()
        }
    }

    pub fn validate_config(&self) -> Result<()> {
        if self.max_gap_secs <= 0 {
            return Err(AnalysisError::InvalidConfig(
                "max_gap_secs must be positive".into(),
            ));
        }
        if !self.extreme_move_ratio.is_finite() || self.extreme_move_ratio <= 0.0 {
            return Err(AnalysisError::InvalidConfig(
                "extreme_move_ratio must be positive and finite".into(),
            ));
        }
        Ok(())
    }
}

/// Normalizes and sanity-checks raw bar sequences
#[derive(Debug, Clone, Default)]
pub struct SeriesValidator {
    pub config: ValidationConfig,
}

impl SeriesValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate against the current wall clock (used only for the future-timestamp warning)
    pub fn validate(&self, raw: &[RawBar]) -> std::result::Result<ValidatedSeries, ValidationReport> {
        self.validate_at(raw, Utc::now())
    }

    /// Validate with an explicit validation time.
    pub fn validate_at(
        &self,
        raw: &[RawBar],
        now: DateTime<Utc>,
    ) -> std::result::Result<ValidatedSeries, ValidationReport> {
        if raw.is_empty() {
            return Err(ValidationReport {
                errors: vec![ValidationError::Empty],
                warnings: Vec::new(),
            });
        }

        let mut sorted: Vec<&RawBar> = raw.iter().collect();
        sorted.sort_by_key(|b| b.time);

        let mut errors = Vec::new();
        let mut bars = Vec::with_capacity(sorted.len());
        for (index, bar) in sorted.iter().enumerate() {
            match bar.check_consistency() {
                Ok(()) => bars.push(Bar {
                    time: bar.time,
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    volume: bar.volume.round() as u64,
                }),
                Err(reason) => errors.push(ValidationError::Malformed {
                    index,
                    time: bar.time,
                    reason,
                }),
            }
        }

        let warnings = self.collect_warnings(&sorted, now);

        if !errors.is_empty() {
            warn!(
                bars = raw.len(),
                errors = errors.len(),
                "series rejected by validation"
            );
            return Err(ValidationReport { errors, warnings });
        }

        if !warnings.is_empty() {
            debug!(bars = bars.len(), warnings = warnings.len(), "series validated with warnings");
        }

        Ok(ValidatedSeries {
            series: Series::from_sorted(bars),
            warnings,
        })
    }

    fn collect_warnings(&self, sorted: &[&RawBar], now: DateTime<Utc>) -> Vec<ValidationWarning> {
        let cfg = &self.config;
        let max_gap = Duration::seconds(cfg.max_gap_secs);
        let mut warnings = Vec::new();

        for (index, bar) in sorted.iter().enumerate() {
            if index > 0 {
                let prev = sorted[index - 1];
                if bar.time == prev.time {
                    warnings.push(ValidationWarning::DuplicateTimestamp {
                        index,
                        time: bar.time,
                    });
                } else if bar.time - prev.time > max_gap {
                    warnings.push(ValidationWarning::Gap {
                        index,
                        gap_secs: (bar.time - prev.time).num_seconds(),
                    });
                }
            }

            // Malformed bars are already errors
            if bar.check_consistency().is_err() {
                continue;
            }

            if bar.volume.round() == 0.0 {
                warnings.push(ValidationWarning::ZeroVolume { index });
            }

            let avg = bar.average_price();
            if avg > 0.0 {
                let ratio = bar.range() / avg;
                if ratio > cfg.extreme_move_ratio {
                    warnings.push(ValidationWarning::ExtremeMove { index, ratio });
                }
            }

            if cfg.check_future && bar.time > now {
                warnings.push(ValidationWarning::FutureTimestamp {
                    index,
                    time: bar.time,
                });
            }
        }

        warnings
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day)
    }

    fn now() -> DateTime<Utc> {
        t(365)
    }

    fn raw(day: i64, o: f64, h: f64, l: f64, c: f64, v: f64) -> RawBar {
        RawBar::new(t(day), o, h, l, c, v)
    }

    #[test]
    fn test_empty_is_error() {
        let report = SeriesValidator::default().validate_at(&[], now()).unwrap_err();
        assert_eq!(report.errors, vec![ValidationError::Empty]);
    }

    #[test]
    fn test_sorts_unordered_input() {
        let bars = vec![
            raw(2, 103.0, 104.0, 101.0, 103.0, 900.0),
            raw(0, 100.0, 105.0, 95.0, 102.0, 1000.0),
            raw(1, 102.0, 108.0, 100.0, 106.0, 1200.0),
        ];
        let validated = SeriesValidator::default().validate_at(&bars, now()).unwrap();
        assert_eq!(validated.series.closes(), vec![102.0, 106.0, 103.0]);
        assert!(validated.warnings.is_empty());
    }

    #[test]
    fn test_rejects_all_malformed_bars() {
        let bars = vec![
            raw(0, 100.0, 105.0, 95.0, 102.0, 1000.0),
            raw(1, 100.0, 90.0, 95.0, 92.0, 1000.0),
            raw(2, 100.0, 105.0, 95.0, f64::INFINITY, 1000.0),
            raw(3, 100.0, 105.0, 95.0, 102.0, -5.0),
        ];
        let report = SeriesValidator::default().validate_at(&bars, now()).unwrap_err();
        assert_eq!(report.errors.len(), 3);
        assert!(!report.is_valid());
        assert!(report.to_string().starts_with("3 error(s)"));
    }

    #[test]
    fn test_warnings() {
        let bars = vec![
            raw(0, 100.0, 105.0, 95.0, 102.0, 1000.0),
            raw(0, 100.0, 105.0, 95.0, 102.0, 1000.0),
            raw(10, 102.0, 104.0, 100.0, 103.0, 0.0),
            raw(11, 100.0, 160.0, 60.0, 110.0, 1000.0),
            raw(400, 100.0, 101.0, 99.0, 100.0, 1000.0),
        ];
        let validated = SeriesValidator::default().validate_at(&bars, now()).unwrap();
        let w = &validated.warnings;
        assert!(w.contains(&ValidationWarning::DuplicateTimestamp { index: 1, time: t(0) }));
        assert!(w.contains(&ValidationWarning::Gap {
            index: 2,
            gap_secs: 10 * DAY_SECS
        }));
        assert!(w.contains(&ValidationWarning::ZeroVolume { index: 2 }));
        assert!(w
            .iter()
            .any(|x| matches!(x, ValidationWarning::ExtremeMove { index: 3, .. })));
        assert!(w.contains(&ValidationWarning::FutureTimestamp { index: 4, time: t(400) }));
        assert_eq!(validated.series.len(), 5);
    }

    #[test]
    fn test_revalidation_is_stable() {
        let bars = vec![
            raw(3, 100.0, 160.0, 60.0, 110.0, 1000.0),
            raw(0, 100.0, 105.0, 95.0, 102.0, 0.2),
            raw(0, 100.0, 105.0, 95.0, 102.0, 1000.0),
            raw(20, 102.0, 104.0, 100.0, 103.0, 10.0),
        ];
        let validator = SeriesValidator::default();
        let first = validator.validate_at(&bars, now()).unwrap();
        let second = validator.validate_at(&first.series.to_raw(), now()).unwrap();
        assert_eq!(first.warnings, second.warnings);
        assert_eq!(first.series, second.series);
    }

    #[test]
    fn test_config_for_timeframe() {
        assert_eq!(
            ValidationConfig::for_timeframe(Timeframe::Hour1).max_gap_secs,
            3 * DAY_SECS
        );
        assert_eq!(
            ValidationConfig::for_timeframe(Timeframe::Day1).max_gap_secs,
            7 * DAY_SECS
        );
        let bad = ValidationConfig {
            extreme_move_ratio: 0.0,
            ..Default::default()
        };
        assert!(bad.validate_config().is_err());
    }
}
