//! Parameter metadata for detectors
//!
//! This module provides metadata about detector parameters, enabling:
//! - Parameter sweeps over a detector's thresholds
//! - Parameter documentation
//! - Building detectors from loosely-typed settings (`name -> value` maps)
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//!
//! use chartwise::params::ParameterizedDetector;
//! use chartwise::prelude::*;
//!
//! for param in TriangleDetector::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let mut params = HashMap::new();
//! params.insert("cluster_threshold", 0.03);
//! let detector = SupportResistanceDetector::with_params(&params).unwrap();
//! assert_eq!(detector.cluster_threshold.get(), 0.03);
//! ```

use std::collections::HashMap;

use crate::{AnalysisError, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// Fraction in 0.0..=1.0
    Ratio,
    /// Positive integer bar count
    Period,
    /// Positive multiplier or scale, may exceed 1.0
    Factor,
}

/// Metadata for a single detector parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
    /// Parameter name (e.g., "cluster_threshold")
    pub name: &'static str,
    pub param_type: ParamType,
    pub default: f64,
    /// Sweep range: (min, max, step)
    pub range: (f64, f64, f64),
    pub description: &'static str,
}

impl ParamMeta {
    pub const fn ratio(
        name: &'static str,
        default: f64,
        range: (f64, f64, f64),
        description: &'static str,
    ) -> Self {
        Self { name, param_type: ParamType::Ratio, default, range, description }
    }

    pub const fn period(
        name: &'static str,
        default: f64,
        range: (f64, f64, f64),
        description: &'static str,
    ) -> Self {
        Self { name, param_type: ParamType::Period, default, range, description }
    }

    pub const fn factor(
        name: &'static str,
        default: f64,
        range: (f64, f64, f64),
        description: &'static str,
    ) -> Self {
        Self { name, param_type: ParamType::Factor, default, range, description }
    }

    /// Generate all values for a sweep
    pub fn generate_grid(&self) -> Vec<f64> {
        let (min, max, step) = self.range;
        let mut values = Vec::new();
        if step <= 0.0 {
            values.push(min);
            return values;
        }
        let mut k = 0u32;
        loop {
            // multiply instead of accumulating so the grid does not drift
            let v = min + step * f64::from(k);
            if v > max + f64::EPSILON {
                break;
            }
            values.push(v);
            k += 1;
        }
        values
    }

    /// Validate a value for this parameter
    pub fn validate(&self, value: f64) -> Result<()> {
        let (min, max, _) = self.range;
        if !value.is_finite() {
            return Err(AnalysisError::InvalidValue("parameter must be finite"));
        }
        if value < min || value > max {
            return Err(AnalysisError::OutOfRange { field: self.name, value, min, max });
        }
        match self.param_type {
            ParamType::Ratio => Ratio::new(value).map(|_| ()),
            ParamType::Period => {
                if value < 1.0 || value.fract() != 0.0 {
                    return Err(AnalysisError::InvalidValue("Period must be a positive integer"));
                }
                Ok(())
            }
            ParamType::Factor => {
                if value <= 0.0 {
                    return Err(AnalysisError::InvalidValue("Factor must be positive"));
                }
                Ok(())
            }
        }
    }
}

// ============================================================
// PARAMETERIZED DETECTOR TRAIT
// ============================================================

/// Detectors whose thresholds can be listed and set by name
pub trait ParameterizedDetector: Sized {
    /// Returns metadata for all configurable parameters
    fn param_meta() -> &'static [ParamMeta];

    /// Creates a detector with parameters from a HashMap.
    ///
    /// Missing parameters use their default values.
    fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

    /// Name of the pattern kind the detector emits
    fn pattern_id_str() -> &'static str;
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
    let value = params.get(key).copied().unwrap_or(default);
    Ratio::new(value)
}

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
    let value = params.get(key).copied().unwrap_or(default as f64);
    if !value.is_finite() || value < 1.0 || value.fract() != 0.0 {
        return Err(AnalysisError::InvalidValue("Period must be a positive integer"));
    }
    Period::new(value as usize)
}

/// Helper to get a positive finite factor from params with default fallback
pub fn get_factor(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<f64> {
    let value = params.get(key).copied().unwrap_or(default);
    if !value.is_finite() || value <= 0.0 {
        return Err(AnalysisError::InvalidValue("Factor must be positive and finite"));
    }
    Ok(value)
}

// ============================================================
// TESTS
// ============================================================
