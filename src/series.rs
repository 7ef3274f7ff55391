//! Bars, series and the keys that identify them.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{AnalysisError, OHLCVExt, Result, OHLCV};

// ============================================================
// TIMEFRAME
// ============================================================

/// Fixed bar interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    Minute1,
    Minute5,
    Minute15,
    Minute30,
    Hour1,
    Hour4,
    Day1,
    Week1,
}

impl Timeframe {
    pub fn duration(self) -> Duration {
        match self {
            Timeframe::Minute1 => Duration::minutes(1),
            Timeframe::Minute5 => Duration::minutes(5),
            Timeframe::Minute15 => Duration::minutes(15),
            Timeframe::Minute30 => Duration::minutes(30),
            Timeframe::Hour1 => Duration::hours(1),
            Timeframe::Hour4 => Duration::hours(4),
            Timeframe::Day1 => Duration::days(1),
            Timeframe::Week1 => Duration::weeks(1),
        }
    }

    #[inline]
    pub fn is_intraday(self) -> bool {
        self.duration() < Duration::days(1)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::Minute1 => "1m",
            Timeframe::Minute5 => "5m",
            Timeframe::Minute15 => "15m",
            Timeframe::Minute30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Day1 => "1d",
            Timeframe::Week1 => "1w",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1m" => Ok(Timeframe::Minute1),
            "5m" => Ok(Timeframe::Minute5),
            "15m" => Ok(Timeframe::Minute15),
            "30m" => Ok(Timeframe::Minute30),
            "1h" => Ok(Timeframe::Hour1),
            "4h" => Ok(Timeframe::Hour4),
            "1d" => Ok(Timeframe::Day1),
            "1w" => Ok(Timeframe::Week1),
            other => Err(AnalysisError::InvalidConfig(format!(
                "unknown timeframe '{other}'"
            ))),
        }
    }
}

/// Identifies one series: (symbol, exchange, timeframe)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub symbol: String,
    pub exchange: String,
    pub timeframe: Timeframe,
}

impl SeriesKey {
    pub fn new(symbol: impl Into<String>, exchange: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
            timeframe,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.exchange, self.symbol, self.timeframe)
    }
}

// ============================================================
// BARS
// ============================================================

/// Untrusted bar as delivered by a historical fetch.
///
/// Nothing is checked here; pass it through
/// [`SeriesValidator`](crate::validate::SeriesValidator) before analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl RawBar {
    pub fn new(time: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for RawBar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

impl From<&Bar> for RawBar {
    fn from(bar: &Bar) -> Self {
        Self {
            time: bar.time,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume as f64,
        }
    }
}

/// One validated OHLCV observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    pub fn new(time: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Open a fresh bar from a single trade price
    pub fn from_tick(time: DateTime<Utc>, price: f64) -> Self {
        Self::new(time, price, price, price, price, 0)
    }

    /// Fold a trade price into this bar: extends high/low and moves the close.
    pub fn fold_tick(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }

    /// Convert an untrusted bar, checking OHLC consistency. Volume is rounded.
    pub fn try_from_raw(raw: &RawBar, index: usize) -> Result<Self> {
        raw.validate_at(index)?;
        Ok(Self {
            time: raw.time,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume.round() as u64,
        })
    }
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume as f64
    }
}

/// Live trade update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub price: f64,
    pub time: DateTime<Utc>,
}

// ============================================================
// SERIES
// ============================================================

/// Time-ordered bars for one [`SeriesKey`].
///
/// Built by the validator, or by [`Series::from_bars`] for bars the caller
/// already trusts. Times are non-decreasing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    key: Option<SeriesKey>,
    bars: Vec<Bar>,
}

impl Series {
    pub(crate) fn from_sorted(bars: Vec<Bar>) -> Self {
        Self { key: None, bars }
    }

    /// Build a series from trusted bars.
    ///
    /// Each bar must be OHLC-consistent and times must not go backwards.
    pub fn from_bars(bars: Vec<Bar>) -> Result<Self> {
        for (i, bar) in bars.iter().enumerate() {
            bar.validate_at(i)?;
            if i > 0 && bar.time < bars[i - 1].time {
                return Err(AnalysisError::InvalidOHLCV {
                    index: i,
                    reason: "time goes backwards",
                });
            }
        }
        Ok(Self::from_sorted(bars))
    }

    pub fn with_key(mut self, key: SeriesKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn key(&self) -> Option<&SeriesKey> {
        self.key.as_ref()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    #[inline]
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    #[inline]
    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bar> {
        self.bars.iter()
    }

    /// Bars in `range`, clamped to the series
    pub fn window(&self, range: Range<usize>) -> &[Bar] {
        let end = range.end.min(self.bars.len());
        let start = range.start.min(end);
        &self.bars[start..end]
    }

    pub fn time_at(&self, index: usize) -> Option<DateTime<Utc>> {
        self.bars.get(index).map(|b| b.time)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume as f64).collect()
    }

    /// Convert back into untrusted bars, e.g. to re-run validation
    pub fn to_raw(&self) -> Vec<RawBar> {
        self.bars.iter().map(RawBar::from).collect()
    }

    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }
}

impl<'a> IntoIterator for &'a Series {
    type Item = &'a Bar;
    type IntoIter = std::slice::Iter<'a, Bar>;

    fn into_iter(self) -> Self::IntoIter {
        self.bars.iter()
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

    #[test]
    fn test_timeframe_parse_roundtrip() {
        for tf in [
            Timeframe::Minute1,
            Timeframe::Minute5,
            Timeframe::Minute15,
            Timeframe::Minute30,
            Timeframe::Hour1,
            Timeframe::Hour4,
            Timeframe::Day1,
            Timeframe::Week1,
        ] {
            assert_eq!(tf.as_str().parse::<Timeframe>().unwrap(), tf);
        }
        assert!("2d".parse::<Timeframe>().is_err());
        assert!(Timeframe::Hour4.is_intraday());
        assert!(!Timeframe::Day1.is_intraday());
    }

    #[test]
    fn test_series_key_display() {
        let key = SeriesKey::new("AAPL", "NASDAQ", Timeframe::Day1);
        assert_eq!(key.to_string(), "NASDAQ:AAPL@1d");
    }

    #[test]
    fn test_fold_tick() {
        let mut bar = Bar::new(t(0), 100.0, 101.0, 99.0, 100.5, 10);
        bar.fold_tick(103.0);
        assert_eq!(bar.high, 103.0);
        assert_eq!(bar.close, 103.0);
        bar.fold_tick(98.0);
        assert_eq!(bar.low, 98.0);
        assert_eq!(bar.close, 98.0);
        assert_eq!(bar.open, 100.0);
    }

    #[test]
    fn test_from_bars_rejects_backwards_time() {
        let bars = vec![
            Bar::new(t(1), 100.0, 101.0, 99.0, 100.5, 10),
            Bar::new(t(0), 100.0, 101.0, 99.0, 100.5, 10),
        ];
        assert!(Series::from_bars(bars).is_err());
    }

    #[test]
    fn test_series_accessors() {
        let bars = vec![
            Bar::new(t(0), 100.0, 105.0, 95.0, 102.0, 1000),
            Bar::new(t(1), 102.0, 108.0, 100.0, 106.0, 1200),
        ];
        let series = Series::from_bars(bars).unwrap();
        assert_eq!(series.closes(), vec![102.0, 106.0]);
        assert_eq!(series.highs(), vec![105.0, 108.0]);
        assert_eq!(series.volumes(), vec![1000.0, 1200.0]);
        assert_eq!(series.window(1..10).len(), 1);
        assert_eq!(series.time_at(1), Some(t(1)));
        assert_eq!(series.to_raw()[1].volume, 1200.0);
    }

    #[test]
    fn test_try_from_raw_rounds_volume() {
        let raw = RawBar::new(t(0), 100.0, 105.0, 95.0, 102.0, 999.6);
        assert_eq!(Bar::try_from_raw(&raw, 0).unwrap().volume, 1000);
        let bad = RawBar::new(t(0), 100.0, 99.0, 95.0, 102.0, 10.0);
        assert!(Bar::try_from_raw(&bad, 3).is_err());
    }
}
