//! Pattern records produced by the detectors
//!
//! Every record carries bar indices and prices, so a presentation layer can
//! place overlays without running detection again. Indices are relative to the
//! series the detector ran over; [`PatternRecord::shifted`] moves them when a
//! detector ran over a trailing window.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Direction, OHLCV};

// ============================================================
// KINDS
// ============================================================

/// Fieldless tag of a [`PatternRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Level,
    Triangle,
    Flag,
    DoubleTop,
    DoubleBottom,
    HeadAndShoulders,
    Divergence,
    VolumeAnomaly,
    Candlestick,
}

impl PatternKind {
    pub const ALL: [PatternKind; 9] = [
        PatternKind::Level,
        PatternKind::Triangle,
        PatternKind::Flag,
        PatternKind::DoubleTop,
        PatternKind::DoubleBottom,
        PatternKind::HeadAndShoulders,
        PatternKind::Divergence,
        PatternKind::VolumeAnomaly,
        PatternKind::Candlestick,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::Level => "level",
            PatternKind::Triangle => "triangle",
            PatternKind::Flag => "flag",
            PatternKind::DoubleTop => "double_top",
            PatternKind::DoubleBottom => "double_bottom",
            PatternKind::HeadAndShoulders => "head_and_shoulders",
            PatternKind::Divergence => "divergence",
            PatternKind::VolumeAnomaly => "volume_anomaly",
            PatternKind::Candlestick => "candlestick",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    Support,
    Resistance,
}

impl LevelKind {
    /// Price of `bar` that tests a level of this kind: lows for support, highs for resistance
    #[inline]
    pub fn probe<T: OHLCV>(self, bar: &T) -> f64 {
        match self {
            LevelKind::Support => bar.low(),
            LevelKind::Resistance => bar.high(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriangleKind {
    Symmetrical,
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeAnomalyKind {
    Spike,
    Dip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandleKind {
    Doji,
    Hammer,
    ShootingStar,
}

impl CandleKind {
    pub fn direction(self) -> Direction {
        match self {
            CandleKind::Doji => Direction::Neutral,
            CandleKind::Hammer => Direction::Bullish,
            CandleKind::ShootingStar => Direction::Bearish,
        }
    }
}

// ============================================================
// GEOMETRY
// ============================================================

/// A bar index with the price that matters at it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub index: usize,
    pub price: f64,
}

impl PricePoint {
    #[inline]
    pub fn new(index: usize, price: f64) -> Self {
        Self { index, price }
    }

    #[inline]
    fn shifted(self, offset: usize) -> Self {
        Self {
            index: self.index + offset,
            price: self.price,
        }
    }
}

/// Clustered support or resistance price.
///
/// `price` is the mean of every touching price and `strength` the number of
/// touches. A level only ever grows, through [`try_touch`](Self::try_touch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportResistanceLevel {
    pub kind: LevelKind,
    pub price: f64,
    pub strength: usize,
    pub touches: Vec<usize>,
}

impl SupportResistanceLevel {
    /// Single-touch level seeded at `index`
    pub fn new(kind: LevelKind, index: usize, price: f64) -> Self {
        Self {
            kind,
            price,
            strength: 1,
            touches: vec![index],
        }
    }

    /// Relative distance of `price` from this level
    #[inline]
    pub fn distance(&self, price: f64) -> f64 {
        if self.price <= 0.0 {
            return f64::INFINITY;
        }
        (price - self.price).abs() / self.price
    }

    /// Record a touch at `index` when `price` lies within `tolerance` of the level.
    ///
    /// Returns whether a touch was added. A second touch at the last touched
    /// index is ignored, so revising a bar never counts twice.
    pub fn try_touch(&mut self, index: usize, price: f64, tolerance: f64) -> bool {
        if self.touches.last() == Some(&index) || self.distance(price) > tolerance {
            return false;
        }
        self.add_touch(index, price);
        true
    }

    pub(crate) fn add_touch(&mut self, index: usize, price: f64) {
        let n = self.touches.len() as f64;
        self.price = (self.price * n + price) / (n + 1.0);
        self.touches.push(index);
        self.strength = self.touches.len();
    }

    pub fn first_touch(&self) -> usize {
        self.touches.first().copied().unwrap_or_default()
    }

    pub fn last_touch(&self) -> usize {
        self.touches.last().copied().unwrap_or_default()
    }

    /// Same level with every touch index moved forward by `offset`
    pub fn shifted(&self, offset: usize) -> Self {
        Self {
            kind: self.kind,
            price: self.price,
            strength: self.strength,
            touches: self.touches.iter().map(|i| i + offset).collect(),
        }
    }
}

// ============================================================
// RECORDS
// ============================================================

/// One detected pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternRecord {
    Level {
        level: SupportResistanceLevel,
        confidence: f64,
    },
    Triangle {
        triangle: TriangleKind,
        start: usize,
        end: usize,
        /// Upper line slope per bar, relative to the window's mean close
        upper_slope: f64,
        /// Lower line slope per bar, relative to the window's mean close
        lower_slope: f64,
        upper: (PricePoint, PricePoint),
        lower: (PricePoint, PricePoint),
        confidence: f64,
    },
    Flag {
        direction: Direction,
        pole_start: usize,
        pole_end: usize,
        end: usize,
        pole_move: f64,
        retracement: f64,
        volatility: f64,
        confidence: f64,
    },
    DoubleTop {
        first: PricePoint,
        second: PricePoint,
        neckline: PricePoint,
        confidence: f64,
    },
    DoubleBottom {
        first: PricePoint,
        second: PricePoint,
        neckline: PricePoint,
        confidence: f64,
    },
    HeadAndShoulders {
        inverse: bool,
        left_shoulder: PricePoint,
        head: PricePoint,
        right_shoulder: PricePoint,
        neckline: f64,
        /// Measured move: neckline minus (head minus neckline), mirrored when inverse
        target: f64,
        confidence: f64,
    },
    Divergence {
        direction: Direction,
        /// Earlier and later price extremum
        price: (PricePoint, PricePoint),
        /// Matched indicator values
        indicator: (PricePoint, PricePoint),
        confidence: f64,
    },
    VolumeAnomaly {
        anomaly: VolumeAnomalyKind,
        index: usize,
        volume: f64,
        mean: f64,
        ratio: f64,
        confidence: f64,
    },
    Candlestick {
        candle: CandleKind,
        index: usize,
        confidence: f64,
    },
}

impl PatternRecord {
    pub fn kind(&self) -> PatternKind {
        match self {
            PatternRecord::Level { .. } => PatternKind::Level,
            PatternRecord::Triangle { .. } => PatternKind::Triangle,
            PatternRecord::Flag { .. } => PatternKind::Flag,
            PatternRecord::DoubleTop { .. } => PatternKind::DoubleTop,
            PatternRecord::DoubleBottom { .. } => PatternKind::DoubleBottom,
            PatternRecord::HeadAndShoulders { .. } => PatternKind::HeadAndShoulders,
            PatternRecord::Divergence { .. } => PatternKind::Divergence,
            PatternRecord::VolumeAnomaly { .. } => PatternKind::VolumeAnomaly,
            PatternRecord::Candlestick { .. } => PatternKind::Candlestick,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            PatternRecord::Level { confidence, .. }
            | PatternRecord::Triangle { confidence, .. }
            | PatternRecord::Flag { confidence, .. }
            | PatternRecord::DoubleTop { confidence, .. }
            | PatternRecord::DoubleBottom { confidence, .. }
            | PatternRecord::HeadAndShoulders { confidence, .. }
            | PatternRecord::Divergence { confidence, .. }
            | PatternRecord::VolumeAnomaly { confidence, .. }
            | PatternRecord::Candlestick { confidence, .. } => *confidence,
        }
    }

    /// Directional bias the pattern implies
    pub fn direction(&self) -> Direction {
        match self {
            PatternRecord::Triangle { triangle, .. } => match triangle {
                TriangleKind::Ascending => Direction::Bullish,
                TriangleKind::Descending => Direction::Bearish,
                TriangleKind::Symmetrical => Direction::Neutral,
            },
            PatternRecord::Flag { direction, .. } | PatternRecord::Divergence { direction, .. } => {
                *direction
            }
            PatternRecord::DoubleTop { .. } => Direction::Bearish,
            PatternRecord::DoubleBottom { .. } => Direction::Bullish,
            PatternRecord::HeadAndShoulders { inverse, .. } => {
                if *inverse {
                    Direction::Bullish
                } else {
                    Direction::Bearish
                }
            }
            PatternRecord::Candlestick { candle, .. } => candle.direction(),
            PatternRecord::Level { .. } | PatternRecord::VolumeAnomaly { .. } => Direction::Neutral,
        }
    }

    /// First and last bar index the pattern covers
    pub fn span(&self) -> (usize, usize) {
        match self {
            PatternRecord::Level { level, .. } => (level.first_touch(), level.last_touch()),
            PatternRecord::Triangle { start, end, .. } => (*start, *end),
            PatternRecord::Flag {
                pole_start, end, ..
            } => (*pole_start, *end),
            PatternRecord::DoubleTop { first, second, .. }
            | PatternRecord::DoubleBottom { first, second, .. } => (first.index, second.index),
            PatternRecord::HeadAndShoulders {
                left_shoulder,
                right_shoulder,
                ..
            } => (left_shoulder.index, right_shoulder.index),
            PatternRecord::Divergence {
                price, indicator, ..
            } => (
                price.0.index.min(indicator.0.index),
                price.1.index.max(indicator.1.index),
            ),
            PatternRecord::VolumeAnomaly { index, .. } | PatternRecord::Candlestick { index, .. } => {
                (*index, *index)
            }
        }
    }

    /// Last bar index the pattern covers
    #[inline]
    pub fn end_index(&self) -> usize {
        self.span().1
    }

    /// Same record with every bar index moved forward by `offset`
    pub fn shifted(&self, offset: usize) -> Self {
        if offset == 0 {
            return self.clone();
        }
        let mut out = self.clone();
        match &mut out {
            PatternRecord::Level { level, .. } => *level = level.shifted(offset),
            PatternRecord::Triangle {
                start,
                end,
                upper,
                lower,
                ..
            } => {
                *start += offset;
                *end += offset;
                *upper = (upper.0.shifted(offset), upper.1.shifted(offset));
                *lower = (lower.0.shifted(offset), lower.1.shifted(offset));
            }
            PatternRecord::Flag {
                pole_start,
                pole_end,
                end,
                ..
            } => {
                *pole_start += offset;
                *pole_end += offset;
                *end += offset;
            }
            PatternRecord::DoubleTop {
                first,
                second,
                neckline,
                ..
            }
            | PatternRecord::DoubleBottom {
                first,
                second,
                neckline,
                ..
            } => {
                *first = first.shifted(offset);
                *second = second.shifted(offset);
                *neckline = neckline.shifted(offset);
            }
            PatternRecord::HeadAndShoulders {
                left_shoulder,
                head,
                right_shoulder,
                ..
            } => {
                *left_shoulder = left_shoulder.shifted(offset);
                *head = head.shifted(offset);
                *right_shoulder = right_shoulder.shifted(offset);
            }
            PatternRecord::Divergence {
                price, indicator, ..
            } => {
                *price = (price.0.shifted(offset), price.1.shifted(offset));
                *indicator = (indicator.0.shifted(offset), indicator.1.shifted(offset));
            }
            PatternRecord::VolumeAnomaly { index, .. } | PatternRecord::Candlestick { index, .. } => {
                *index += offset;
            }
        }
        out
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_touch_updates_mean() {
        let mut level = SupportResistanceLevel::new(LevelKind::Resistance, 3, 100.0);
        assert!(level.try_touch(10, 101.0, 0.02));
        assert_eq!(level.strength, 2);
        assert!((level.price - 100.5).abs() < 1e-12);
        // too far away
        assert!(!level.try_touch(12, 110.0, 0.02));
        // same index twice
        assert!(!level.try_touch(10, 100.5, 0.02));
        assert_eq!(level.touches, vec![3, 10]);
    }

    #[test]
    fn test_record_shift_moves_every_index() {
        let record = PatternRecord::DoubleTop {
            first: PricePoint::new(4, 100.0),
            second: PricePoint::new(12, 101.0),
            neckline: PricePoint::new(8, 95.0),
            confidence: 0.8,
        };
        let moved = record.shifted(50);
        assert_eq!(moved.span(), (54, 62));
        match moved {
            PatternRecord::DoubleTop { neckline, .. } => assert_eq!(neckline.index, 58),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_direction_mapping() {
        let hs = PatternRecord::HeadAndShoulders {
            inverse: true,
            left_shoulder: PricePoint::new(1, 90.0),
            head: PricePoint::new(5, 80.0),
            right_shoulder: PricePoint::new(9, 90.5),
            neckline: 100.0,
            target: 120.0,
            confidence: 0.7,
        };
        assert_eq!(hs.direction(), Direction::Bullish);
        assert_eq!(hs.kind(), PatternKind::HeadAndShoulders);
        let candle = PatternRecord::Candlestick {
            candle: CandleKind::ShootingStar,
            index: 3,
            confidence: 0.6,
        };
        assert_eq!(candle.direction(), Direction::Bearish);
    }

    #[test]
    fn test_record_serializes_with_kind_tag() {
        let record = PatternRecord::VolumeAnomaly {
            anomaly: VolumeAnomalyKind::Spike,
            index: 4,
            volume: 500.0,
            mean: 100.0,
            ratio: 5.0,
            confidence: 1.0,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "volume_anomaly");
        assert_eq!(json["anomaly"], "spike");
        let back: PatternRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
