//! # chartwise - technical analysis engine
//!
//! Indicators, chart pattern detection and live incremental updates over OHLCV series.
//!
//! ## Quick Start
//!
//! ```rust
//! use chartwise::prelude::*;
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let raw: Vec<RawBar> = (0..60)
//!     .map(|i| {
//!         let base = 100.0 + (i as f64 * 0.4).sin() * 5.0;
//!         RawBar::new(start + Duration::days(i), base, base + 1.0, base - 1.0, base + 0.5, 1000.0)
//!     })
//!     .collect();
//!
//! let engine = EngineBuilder::new()
//!     .with_all_defaults()
//!     .with_default_indicators()
//!     .build()
//!     .unwrap();
//!
//! let report = engine.analyze(&raw).unwrap();
//! assert_eq!(report.indicators.len(), 9);
//! ```

use std::fmt;

pub mod consensus;
pub mod detectors;
pub mod engine;
pub mod extrema;
pub mod indicators;
pub mod live;
pub mod params;
pub mod pattern;
pub mod series;
pub mod validate;

pub use engine::{analyze_parallel, AnalysisEngine, AnalysisReport, EngineBuilder, EngineConfig};

pub mod prelude {
    pub use crate::{
        // Consensus
        consensus::{
            derive_signals, ConsensusResult, ConsensusScorer, ConsensusWeights, Signal,
            SignalContribution,
        },
        // Detectors
        detectors::*,
        // Engine
        engine::{
            analyze_parallel, AnalysisEngine, AnalysisReport, BuiltinDetector, ChartDetector,
            ContextProvider, DefaultContextProvider, DefaultEngine, DetectionContext, Diagnostic,
            EngineBuilder, EngineConfig, IndicatorResult, ScanError, ScanResult,
        },
        // Extrema
        extrema::{find_extrema, find_indicator_extrema, find_price_extrema, ExtremaSet},
        // Indicators
        indicators::{
            adx, atr, bollinger, ema, macd, obv, rsi, sma, stochastic, Adx, BollingerBands,
            IndicatorOutput, IndicatorRequest, IndicatorSeries, Macd, Stochastic,
        },
        // Live
        live::{LiveConfig, LiveEngine, LivePhase, LiveSnapshot, LiveUpdate},
        // Parameters
        params::{get_factor, get_period, get_ratio, ParamMeta, ParamType, ParameterizedDetector},
        // Records
        pattern::{
            CandleKind, LevelKind, PatternKind, PatternRecord, PricePoint,
            SupportResistanceLevel, TriangleKind, VolumeAnomalyKind,
        },
        // Series
        series::{Bar, RawBar, Series, SeriesKey, Tick, Timeframe},
        // Validation
        validate::{
            SeriesValidator, ValidatedSeries, ValidationConfig, ValidationError,
            ValidationReport, ValidationWarning,
        },
        // Core
        AnalysisError,
        Direction,
        OHLCVExt,
        Period,
        Ratio,
        Result,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors that can occur during analysis
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },

    #[error("Series rejected: {0}")]
    Validation(validate::ValidationReport),

    #[error("Symbol {0} has not been seeded")]
    NotSeeded(String),

    #[error("Bar at {got} is older than the last bar at {last}")]
    OutOfOrder {
        last: chrono::DateTime<chrono::Utc>,
        got: chrono::DateTime<chrono::Utc>,
    },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(AnalysisError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(AnalysisError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(AnalysisError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

/// Blanket impl for references to dyn OHLCV
impl OHLCV for &dyn OHLCV {
    #[inline]
    fn open(&self) -> f64 {
        (*self).open()
    }

    #[inline]
    fn high(&self) -> f64 {
        (*self).high()
    }

    #[inline]
    fn low(&self) -> f64 {
        (*self).low()
    }

    #[inline]
    fn close(&self) -> f64 {
        (*self).close()
    }

    #[inline]
    fn volume(&self) -> f64 {
        (*self).volume()
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn upper_shadow(&self) -> f64 {
        self.high() - self.open().max(self.close())
    }

    #[inline]
    fn lower_shadow(&self) -> f64 {
        self.open().min(self.close()) - self.low()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Mean of open, high, low and close
    #[inline]
    fn average_price(&self) -> f64 {
        (self.open() + self.high() + self.low() + self.close()) / 4.0
    }

    /// Body as ratio of range. Returns None if range ~ 0
    #[inline]
    fn body_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.body() / range)
    }

    #[inline]
    fn upper_shadow_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.upper_shadow() / range)
    }

    #[inline]
    fn lower_shadow_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.lower_shadow() / range)
    }

    /// Check OHLC consistency of a single bar.
    ///
    /// Fails on non-finite or negative fields and on highs/lows that do not
    /// enclose the body.
    fn check_consistency(&self) -> std::result::Result<(), &'static str> {
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| !p.is_finite()) {
            return Err("non-finite price");
        }
        if prices.iter().any(|p| *p < 0.0) {
            return Err("negative price");
        }
        let volume = self.volume();
        if !volume.is_finite() {
            return Err("non-finite volume");
        }
        if volume < 0.0 {
            return Err("negative volume");
        }
        if self.high() < self.low() {
            return Err("high < low");
        }
        if self.high() < self.open().max(self.close()) {
            return Err("high < max(open, close)");
        }
        if self.low() > self.open().min(self.close()) {
            return Err("low > min(open, close)");
        }
        Ok(())
    }

    /// Validate OHLCV data consistency, reporting the bar position as `index`
    fn validate_at(&self, index: usize) -> Result<()> {
        self.check_consistency()
            .map_err(|reason| AnalysisError::InvalidOHLCV { index, reason })
    }
}

impl<T: OHLCV> OHLCVExt for T {}

// ============================================================
// DIRECTION
// ============================================================

/// Direction/bias of a pattern or signal
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }

    /// +1.0 for bullish, -1.0 for bearish, 0.0 for neutral
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Neutral => 0.0,
            Direction::Bearish => -1.0,
        }
    }

    /// Direction of a signed move
    pub fn from_move(delta: f64) -> Self {
        if delta > 0.0 {
            Direction::Bullish
        } else if delta < 0.0 {
            Direction::Bearish
        } else {
            Direction::Neutral
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Bullish => "bullish",
            Direction::Neutral => "neutral",
            Direction::Bearish => "bearish",
        };
        f.write_str(s)
    }
}

// ============================================================
// TESTS
// ============================================================
