//! Technical indicators
//!
//! Pure, deterministic functions over price/volume arrays. Every function
//! returns series index-aligned with its input, with `None` over the warm-up
//! period. A series too short for the warm-up is returned as all-`None`
//! rather than failing; [`IndicatorRequest::compute`] turns that case into
//! [`AnalysisError::InsufficientData`] for callers that batch several indicators.
//!
//! # Categories
//!
//! - **Moving averages**: SMA, EMA
//! - **Momentum**: RSI, MACD, Stochastic
//! - **Volatility**: Bollinger Bands, ATR
//! - **Trend**: ADX
//! - **Volume**: OBV

use serde::{Deserialize, Serialize};

use crate::{AnalysisError, Period, Result, OHLCV};

pub mod momentum;
pub mod moving_average;
pub mod trend;
pub mod volatility;
pub mod volume;

pub use momentum::{macd, rsi, stochastic, Macd, Stochastic};
pub use moving_average::{ema, sma};
pub use trend::{adx, Adx};
pub use volatility::{atr, bollinger, true_range, BollingerBands};
pub use volume::obv;

// ============================================================
// INDICATOR SERIES
// ============================================================

/// Indicator values aligned index-for-index with a series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndicatorSeries(Vec<Option<f64>>);

impl IndicatorSeries {
    /// All-undefined series of `len` entries
    pub fn undefined(len: usize) -> Self {
        Self(vec![None; len])
    }

    pub fn from_values(values: Vec<Option<f64>>) -> Self {
        Self(values)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied().flatten()
    }

    #[inline]
    pub fn values(&self) -> &[Option<f64>] {
        &self.0
    }

    /// Value at the final index, if defined
    pub fn last(&self) -> Option<f64> {
        self.0.last().copied().flatten()
    }

    /// Number of leading undefined entries
    pub fn warm_up(&self) -> usize {
        self.0.iter().take_while(|v| v.is_none()).count()
    }

    /// `(index, value)` for every defined entry
    pub fn defined(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i, v)))
    }

    /// Values with `None` mapped to NaN
    pub fn to_nan_vec(&self) -> Vec<f64> {
        self.0.iter().map(|v| v.unwrap_or(f64::NAN)).collect()
    }

    pub(crate) fn set(&mut self, index: usize, value: f64) {
        self.0[index] = Some(value);
    }
}

/// Apply `f` to the defined tail of `series` and re-pad to full length.
///
/// Used for indicators of indicators (MACD signal line, Stochastic %D),
/// whose input becomes defined only after its own warm-up.
pub(crate) fn over_defined(
    series: &IndicatorSeries,
    f: impl Fn(&[f64]) -> IndicatorSeries,
) -> IndicatorSeries {
    let start = series.warm_up();
    if start >= series.len() {
        return IndicatorSeries::undefined(series.len());
    }
    let tail: Vec<f64> = series.values()[start..]
        .iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    let mut out = vec![None; start];
    out.extend_from_slice(f(&tail).values());
    IndicatorSeries(out)
}

// ============================================================
// REQUESTS
// ============================================================

/// One indicator with its parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndicatorRequest {
    Sma { period: Period },
    Ema { period: Period },
    Rsi { period: Period },
    Macd { fast: Period, slow: Period, signal: Period },
    Bollinger { period: Period, k: f64 },
    Stochastic { period: Period, smoothing: Period },
    Atr { period: Period },
    Obv,
    Adx { period: Period },
}

/// Output of one computed indicator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum IndicatorOutput {
    Line(IndicatorSeries),
    Macd(Macd),
    Bands(BollingerBands),
    Stochastic(Stochastic),
    Adx(Adx),
}

impl IndicatorOutput {
    /// Headline line: MACD histogram, Bollinger middle, %K, ADX
    pub fn primary(&self) -> &IndicatorSeries {
        match self {
            IndicatorOutput::Line(s) => s,
            IndicatorOutput::Macd(m) => &m.histogram,
            IndicatorOutput::Bands(b) => &b.middle,
            IndicatorOutput::Stochastic(s) => &s.k,
            IndicatorOutput::Adx(a) => &a.adx,
        }
    }

    pub fn len(&self) -> usize {
        self.primary().len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary().is_empty()
    }
}

impl IndicatorRequest {
    /// The standard dashboard set
    pub fn defaults() -> Vec<Self> {
        vec![
            IndicatorRequest::Sma {
                period: Period::new_const(20),
            },
            IndicatorRequest::Ema {
                period: Period::new_const(20),
            },
            IndicatorRequest::Rsi {
                period: Period::new_const(14),
            },
            IndicatorRequest::Macd {
                fast: Period::new_const(12),
                slow: Period::new_const(26),
                signal: Period::new_const(9),
            },
            IndicatorRequest::Bollinger {
                period: Period::new_const(20),
                k: 2.0,
            },
            IndicatorRequest::Stochastic {
                period: Period::new_const(14),
                smoothing: Period::new_const(3),
            },
            IndicatorRequest::Atr {
                period: Period::new_const(14),
            },
            IndicatorRequest::Obv,
            IndicatorRequest::Adx {
                period: Period::new_const(14),
            },
        ]
    }

    /// Display name, e.g. `macd(12,26,9)`
    pub fn name(&self) -> String {
        match self {
            IndicatorRequest::Sma { period } => format!("sma({period})"),
            IndicatorRequest::Ema { period } => format!("ema({period})"),
            IndicatorRequest::Rsi { period } => format!("rsi({period})"),
            IndicatorRequest::Macd { fast, slow, signal } => {
                format!("macd({fast},{slow},{signal})")
            }
            IndicatorRequest::Bollinger { period, k } => format!("bollinger({period},{k})"),
            IndicatorRequest::Stochastic { period, smoothing } => {
                format!("stochastic({period},{smoothing})")
            }
            IndicatorRequest::Atr { period } => format!("atr({period})"),
            IndicatorRequest::Obv => "obv".to_string(),
            IndicatorRequest::Adx { period } => format!("adx({period})"),
        }
    }

    /// Bars needed before the first defined value of the primary line
    pub fn min_bars(&self) -> usize {
        match *self {
            IndicatorRequest::Sma { period }
            | IndicatorRequest::Ema { period }
            | IndicatorRequest::Bollinger { period, .. } => period.get(),
            IndicatorRequest::Rsi { period } | IndicatorRequest::Atr { period } => period.get() + 1,
            IndicatorRequest::Macd { slow, signal, .. } => slow.get() + signal.get() - 1,
            IndicatorRequest::Stochastic { period, .. } => period.get(),
            IndicatorRequest::Obv => 1,
            IndicatorRequest::Adx { period } => 2 * period.get(),
        }
    }

    pub fn validate_config(&self) -> Result<()> {
        match *self {
            IndicatorRequest::Macd { fast, slow, .. } if fast >= slow => {
                Err(AnalysisError::InvalidConfig(format!(
                    "macd fast period {fast} must be below slow period {slow}"
                )))
            }
            IndicatorRequest::Bollinger { k, .. } if !k.is_finite() || k <= 0.0 => {
                Err(AnalysisError::InvalidConfig(format!(
                    "bollinger width {k} must be positive and finite"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Compute this indicator over `bars`.
    ///
    /// Fails with `InsufficientData` when the series is shorter than
    /// [`min_bars`](Self::min_bars).
    pub fn compute<T: OHLCV>(&self, bars: &[T]) -> Result<IndicatorOutput> {
        self.validate_config()?;
        let need = self.min_bars();
        if bars.len() < need {
            return Err(AnalysisError::InsufficientData {
                need,
                got: bars.len(),
            });
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close()).collect();
        let output = match *self {
            IndicatorRequest::Sma { period } => IndicatorOutput::Line(sma(&closes, period)),
            IndicatorRequest::Ema { period } => IndicatorOutput::Line(ema(&closes, period)),
            IndicatorRequest::Rsi { period } => IndicatorOutput::Line(rsi(&closes, period)),
            IndicatorRequest::Macd { fast, slow, signal } => {
                IndicatorOutput::Macd(macd(&closes, fast, slow, signal))
            }
            IndicatorRequest::Bollinger { period, k } => {
                IndicatorOutput::Bands(bollinger(&closes, period, k))
            }
            IndicatorRequest::Stochastic { period, smoothing } => {
                IndicatorOutput::Stochastic(stochastic(bars, period, smoothing))
            }
            IndicatorRequest::Atr { period } => IndicatorOutput::Line(atr(bars, period)),
            IndicatorRequest::Obv => IndicatorOutput::Line(obv(bars)),
            IndicatorRequest::Adx { period } => IndicatorOutput::Adx(adx(bars, period)),
        };
        Ok(output)
    }
}

// ============================================================
// TESTS
// ============================================================
