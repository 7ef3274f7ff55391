//! Helpers shared by the detectors
//!
//! Candle-shape ratio tests and the small amount of geometry (least squares,
//! relative differences) the chart detectors need.

use crate::{OHLCVExt, OHLCV};

// ============================================================
// CANDLE RATIO THRESHOLDS
// ============================================================

/// Doji: body below this share of the range
pub const DOJI_BODY_RATIO: f64 = 0.1;
/// Doji: both shadows above this share of the range
pub const DOJI_SHADOW_RATIO: f64 = 0.2;
/// Hammer / shooting star: body below this share of the range
pub const SMALL_BODY_RATIO: f64 = 0.3;
/// Hammer / shooting star: the long shadow above this share of the range
pub const LONG_SHADOW_RATIO: f64 = 0.5;
/// Hammer / shooting star: the opposite shadow below this share of the range
pub const SHORT_SHADOW_RATIO: f64 = 0.2;

// ============================================================
// CANDLE SHAPE
// ============================================================

/// Body, upper shadow and lower shadow as shares of the range.
/// `None` for a zero-range bar, which never classifies.
#[inline]
pub fn shape_ratios<T: OHLCV>(bar: &T) -> Option<(f64, f64, f64)> {
    Some((
        bar.body_ratio()?,
        bar.upper_shadow_ratio()?,
        bar.lower_shadow_ratio()?,
    ))
}

/// Body is doji-like and both shadows are meaningful
#[inline]
pub fn is_doji_shape(body: f64, upper: f64, lower: f64, body_max: f64, shadow_min: f64) -> bool {
    body < body_max && upper > shadow_min && lower > shadow_min
}

/// Small body, one long shadow and a short opposite shadow
#[inline]
pub fn is_pin_shape(body: f64, long: f64, short: f64, body_max: f64, long_min: f64, short_max: f64) -> bool {
    body < body_max && long > long_min && short < short_max
}

// ============================================================
// GEOMETRY
// ============================================================

/// Least-squares line through a set of points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination. 1.0 when every point has the same y.
    pub r_squared: f64,
    /// Root mean squared residual
    pub rmse: f64,
}

impl LineFit {
    #[inline]
    pub fn at(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Ordinary least squares over `(x, y)` points.
///
/// `None` with fewer than two points or when every x is the same.
pub fn linear_fit(points: &[(f64, f64)]) -> Option<LineFit> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for &(x, y) in points {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    if sxx <= f64::EPSILON {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let ss_res: f64 = points
        .iter()
        .map(|&(x, y)| (y - (intercept + slope * x)).powi(2))
        .sum();
    let r_squared = if syy <= f64::EPSILON {
        1.0
    } else {
        (1.0 - ss_res / syy).clamp(0.0, 1.0)
    };

    Some(LineFit {
        slope,
        intercept,
        r_squared,
        rmse: (ss_res / n).sqrt(),
    })
}

/// `|a - b|` relative to the mean of `a` and `b`
#[inline]
pub fn relative_diff(a: f64, b: f64) -> f64 {
    let mean = (a + b) / 2.0;
    if mean <= 0.0 {
        return f64::INFINITY;
    }
    (a - b).abs() / mean
}

#[inline]
pub fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Index and value of the lowest low strictly between `from` and `to`
pub fn lowest_low_between<T: OHLCV>(bars: &[T], from: usize, to: usize) -> Option<(usize, f64)> {
    let end = to.min(bars.len());
    (from + 1..end)
        .map(|i| (i, bars[i].low()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Index and value of the highest high strictly between `from` and `to`
pub fn highest_high_between<T: OHLCV>(bars: &[T], from: usize, to: usize) -> Option<(usize, f64)> {
    let end = to.min(bars.len());
    (from + 1..end)
        .map(|i| (i, bars[i].high()))
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

/// Map `value / scale` into 0..=1
#[inline]
pub fn saturate(value: f64, scale: f64) -> f64 {
    if scale <= 0.0 {
        return 1.0;
    }
    (value / scale).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_fit_exact_line() {
        let points: Vec<(f64, f64)> = (0..5).map(|i| (i as f64, 2.0 * i as f64 + 1.0)).collect();
        let fit = linear_fit(&points).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
        assert!(fit.rmse < 1e-12);
        assert!((fit.at(10.0) - 21.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_fit_flat_and_degenerate() {
        let flat = linear_fit(&[(0.0, 5.0), (3.0, 5.0), (7.0, 5.0)]).unwrap();
        assert_eq!(flat.slope, 0.0);
        assert_eq!(flat.r_squared, 1.0);
        assert!(linear_fit(&[(1.0, 2.0)]).is_none());
        assert!(linear_fit(&[(1.0, 2.0), (1.0, 3.0)]).is_none());
    }

    #[test]
    fn test_relative_diff() {
        assert!((relative_diff(100.0, 101.5) - 1.5 / 100.75).abs() < 1e-12);
        assert_eq!(relative_diff(0.0, 0.0), f64::INFINITY);
    }

    #[test]
    fn test_mean_and_saturate() {
        assert_eq!(mean([1.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(mean(Vec::<f64>::new()), None);
        assert_eq!(saturate(5.0, 10.0), 0.5);
        assert_eq!(saturate(50.0, 10.0), 1.0);
    }

    #[test]
    fn test_doji_and_pin_shapes() {
        assert!(is_doji_shape(0.05, 0.45, 0.5, DOJI_BODY_RATIO, DOJI_SHADOW_RATIO));
        assert!(!is_doji_shape(0.05, 0.9, 0.05, DOJI_BODY_RATIO, DOJI_SHADOW_RATIO));
        assert!(is_pin_shape(
            0.2,
            0.7,
            0.1,
            SMALL_BODY_RATIO,
            LONG_SHADOW_RATIO,
            SHORT_SHADOW_RATIO
        ));
    }
}
