//! Local peaks and lows by symmetric window comparison
//!
//! Index `i` with `order <= i < len - order` is a peak when it is strictly
//! greater than every other value in `[i - order, i + order]`, and a low when
//! strictly less. Equal neighbours disqualify both. NaN never qualifies and
//! disqualifies every index whose window contains it.
//!
//! This is the single extrema routine every detector builds on.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::indicators::IndicatorSeries;
use crate::{Period, OHLCV};

/// Peak and low indices of one series at one `order`, both ascending
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtremaSet {
    pub order: usize,
    pub peaks: Vec<usize>,
    pub lows: Vec<usize>,
}

impl ExtremaSet {
    /// Peaks whose index falls in `range`
    pub fn peaks_in(&self, range: Range<usize>) -> &[usize] {
        slice_in(&self.peaks, range)
    }

    /// Lows whose index falls in `range`
    pub fn lows_in(&self, range: Range<usize>) -> &[usize] {
        slice_in(&self.lows, range)
    }

    /// Same extrema with every index moved forward by `offset`
    pub fn shifted(&self, offset: usize) -> Self {
        Self {
            order: self.order,
            peaks: self.peaks.iter().map(|i| i + offset).collect(),
            lows: self.lows.iter().map(|i| i + offset).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty() && self.lows.is_empty()
    }
}

#[inline]
fn slice_in(sorted: &[usize], range: Range<usize>) -> &[usize] {
    let start = sorted.partition_point(|&i| i < range.start);
    let end = sorted.partition_point(|&i| i < range.end);
    &sorted[start..end.max(start)]
}

/// Peaks and lows of a single numeric series
pub fn find_extrema(values: &[f64], order: Period) -> ExtremaSet {
    let order = order.get();
    ExtremaSet {
        order,
        peaks: scan(values, order, |center, other| center > other),
        lows: scan(values, order, |center, other| center < other),
    }
}

/// Peaks on highs and lows on lows
pub fn find_price_extrema<T: OHLCV>(bars: &[T], order: Period) -> ExtremaSet {
    let highs: Vec<f64> = bars.iter().map(|b| b.high()).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low()).collect();
    let order = order.get();
    ExtremaSet {
        order,
        peaks: scan(&highs, order, |center, other| center > other),
        lows: scan(&lows, order, |center, other| center < other),
    }
}

/// Extrema of an indicator line. Undefined entries behave like NaN.
pub fn find_indicator_extrema(series: &IndicatorSeries, order: Period) -> ExtremaSet {
    find_extrema(&series.to_nan_vec(), order)
}

fn scan(values: &[f64], order: usize, beats: impl Fn(f64, f64) -> bool) -> Vec<usize> {
    let len = values.len();
    if len < 2 * order + 1 {
        return Vec::new();
    }
    (order..len - order)
        .filter(|&i| {
            let center = values[i];
            // NaN comparisons are false, so a NaN anywhere in the window fails
            center.is_finite()
                && (i - order..=i + order)
                    .filter(|&j| j != i)
                    .all(|j| beats(center, values[j]))
        })
        .collect()
}
