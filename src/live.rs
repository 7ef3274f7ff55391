//! Live pattern engine
//!
//! Per-symbol state behind an explicit, caller-owned [`LiveEngine`]. Each
//! symbol moves through `Uninitialized -> Seeded -> Live`:
//!
//! - [`LiveEngine::seed`] runs every detector over the history once.
//! - [`LiveEngine::absorb`] does only the cheap work for one bar: touches on
//!   known support/resistance levels, the volume check against the rolling
//!   window, and the candlestick classifier.
//! - Every `refresh_every` new bars the detectors that cannot be updated
//!   incrementally (triangle, flag, double, head and shoulders, divergence)
//!   are re-run over the trailing `refresh_window` bars. Between refreshes
//!   their records describe the state as of the last refresh.
//!
//! Writers for one symbol are serialized by a mutex. Readers take an
//! `Arc<LiveSnapshot>` that is swapped in after each mutation, so they never
//! see a half-updated pattern list. Different symbols never contend beyond a
//! short map lookup.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::detectors::*;
use crate::engine::{ChartDetector, ContextProvider, DefaultContextProvider, DetectionContext};
use crate::extrema::ExtremaSet;
use crate::pattern::{PatternKind, PatternRecord, SupportResistanceLevel};
use crate::series::{Bar, Series, SeriesKey, Tick};
use crate::{AnalysisError, OHLCVExt, Period, Result, OHLCV};

// ============================================================
// CONFIG
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// New bars between windowed refreshes of the non-incremental detectors
    pub refresh_every: Period,
    /// Trailing bars the windowed refresh runs over
    pub refresh_window: Period,
    /// Bars kept per symbol; older bars are dropped but indices stay absolute
    pub max_bars: Period,
    /// Records kept per pattern kind, newest last
    pub max_patterns_per_kind: Period,
    pub context: DefaultContextProvider,
    pub levels: SupportResistanceDetector,
    pub triangle: TriangleDetector,
    pub flag: FlagDetector,
    pub double: DoublePatternDetector,
    pub head_shoulders: HeadAndShouldersDetector,
    pub divergence: DivergenceDetector,
    pub volume: VolumeAnomalyDetector,
    pub candlestick: CandlestickDetector,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            refresh_every: Period::new_const(5),
            refresh_window: Period::new_const(250),
            max_bars: Period::new_const(2000),
            max_patterns_per_kind: Period::new_const(50),
            context: DefaultContextProvider::default(),
            levels: SupportResistanceDetector::default(),
            triangle: TriangleDetector::default(),
            flag: FlagDetector::default(),
            double: DoublePatternDetector::default(),
            head_shoulders: HeadAndShouldersDetector::default(),
            divergence: DivergenceDetector::default(),
            volume: VolumeAnomalyDetector::default(),
            candlestick: CandlestickDetector::default(),
        }
    }
}

impl LiveConfig {
    pub fn validate_config(&self) -> Result<()> {
        if self.max_bars < self.refresh_window {
            return Err(AnalysisError::InvalidConfig(format!(
                "max_bars {} below refresh_window {}",
                self.max_bars, self.refresh_window
            )));
        }
        self.levels.validate_config()?;
        self.triangle.validate_config()?;
        self.flag.validate_config()?;
        self.double.validate_config()?;
        self.head_shoulders.validate_config()?;
        self.divergence.validate_config()?;
        self.volume.validate_config()?;
        self.candlestick.validate_config()
    }

    /// Run the detectors that only work over a window
    fn windowed<T: OHLCV>(&self, bars: &[T], ctx: &DetectionContext) -> Vec<PatternRecord> {
        let mut out = Vec::new();
        run(&self.triangle, bars, ctx, &mut out);
        run(&self.flag, bars, ctx, &mut out);
        run(&self.double, bars, ctx, &mut out);
        run(&self.head_shoulders, bars, ctx, &mut out);
        run(&self.divergence, bars, ctx, &mut out);
        out
    }
}

fn run<D: ChartDetector, T: OHLCV>(
    detector: &D,
    bars: &[T],
    ctx: &DetectionContext,
    out: &mut Vec<PatternRecord>,
) {
    if bars.len() >= detector.min_bars() {
        out.extend(detector.detect(bars, ctx));
    }
}

/// Kinds produced by the windowed refresh
const WINDOWED_KINDS: [PatternKind; 6] = [
    PatternKind::Triangle,
    PatternKind::Flag,
    PatternKind::DoubleTop,
    PatternKind::DoubleBottom,
    PatternKind::HeadAndShoulders,
    PatternKind::Divergence,
];

// ============================================================
// STATE
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LivePhase {
    #[default]
    Uninitialized,
    Seeded,
    Live,
}

/// Consistent read-only view of one symbol
#[derive(Debug, Clone, Default, Serialize)]
pub struct LiveSnapshot {
    pub phase: LivePhase,
    pub revision: u64,
    /// Absolute index of the oldest retained bar
    pub base_index: usize,
    /// Retained bars
    pub retained: usize,
    pub last_bar: Option<Bar>,
    /// Absolute indices
    pub extrema: ExtremaSet,
    pub levels: Vec<SupportResistanceLevel>,
    /// Every record with absolute indices, levels included, grouped by kind
    pub patterns: Vec<PatternRecord>,
}

impl LiveSnapshot {
    /// Absolute index of the next bar to arrive
    #[inline]
    pub fn next_index(&self) -> usize {
        self.base_index + self.retained
    }

    pub fn patterns_of(&self, kind: PatternKind) -> impl Iterator<Item = &PatternRecord> + '_ {
        self.patterns.iter().filter(move |p| p.kind() == kind)
    }
}

/// Outcome of one absorbed bar or tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveUpdate {
    pub revision: u64,
    /// Volume and candlestick records for the absorbed bar, plus anything a refresh found
    pub new_records: Vec<PatternRecord>,
    /// Levels the bar touched, after the touch
    pub touched_levels: Vec<SupportResistanceLevel>,
    pub refreshed: bool,
}

#[derive(Debug)]
struct LiveState {
    phase: LivePhase,
    revision: u64,
    base: usize,
    bars: Vec<Bar>,
    extrema: ExtremaSet,
    levels: Vec<SupportResistanceLevel>,
    patterns: BTreeMap<PatternKind, VecDeque<PatternRecord>>,
    /// Volumes of the bars before the last one
    volume: RollingVolume,
    /// Whether the last bar's volume came from a candle rather than ticks
    last_volume_known: bool,
    since_refresh: usize,
}

impl LiveState {
    fn empty(config: &LiveConfig) -> Self {
        Self {
            phase: LivePhase::Uninitialized,
            revision: 0,
            base: 0,
            bars: Vec::new(),
            extrema: ExtremaSet::default(),
            levels: Vec::new(),
            patterns: BTreeMap::new(),
            volume: RollingVolume::new(config.volume.window),
            last_volume_known: false,
            since_refresh: 0,
        }
    }

    fn last_index(&self) -> usize {
        self.base + self.bars.len().saturating_sub(1)
    }

    fn store(&mut self, record: PatternRecord, cap: usize) {
        let list = self.patterns.entry(record.kind()).or_default();
        list.push_back(record);
        while list.len() > cap {
            list.pop_front();
        }
    }

    /// Drop incremental records for the bar at `index` before it is re-classified
    fn forget_bar(&mut self, index: usize) {
        for kind in [PatternKind::VolumeAnomaly, PatternKind::Candlestick] {
            if let Some(list) = self.patterns.get_mut(&kind) {
                list.retain(|r| r.end_index() != index);
            }
        }
    }

    fn snapshot(&self, config: &LiveConfig) -> LiveSnapshot {
        let mut patterns: Vec<PatternRecord> = self
            .levels
            .iter()
            .map(|l| config.levels.record(l.clone()))
            .collect();
        for list in self.patterns.values() {
            patterns.extend(list.iter().cloned());
        }
        LiveSnapshot {
            phase: self.phase,
            revision: self.revision,
            base_index: self.base,
            retained: self.bars.len(),
            last_bar: self.bars.last().copied(),
            extrema: self.extrema.clone(),
            levels: self.levels.clone(),
            patterns,
        }
    }
}

struct SymbolSlot {
    state: Mutex<LiveState>,
    snapshot: RwLock<Arc<LiveSnapshot>>,
}

// ============================================================
// ENGINE
// ============================================================

/// Explicit container of per-symbol live state
pub struct LiveEngine {
    config: LiveConfig,
    slots: RwLock<HashMap<SeriesKey, Arc<SymbolSlot>>>,
}

impl LiveEngine {
    pub fn new(config: LiveConfig) -> Result<Self> {
        config.validate_config()?;
        Ok(Self {
            config,
            slots: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    fn slot(&self, key: &SeriesKey) -> Result<Arc<SymbolSlot>> {
        self.slots
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| AnalysisError::NotSeeded(key.to_string()))
    }

    fn publish(&self, slot: &SymbolSlot, state: &LiveState) -> Arc<LiveSnapshot> {
        let snapshot = Arc::new(state.snapshot(&self.config));
        *slot.snapshot.write() = Arc::clone(&snapshot);
        snapshot
    }

    // ===========================================
    // Lifecycle
    // ===========================================

    /// Run every detector over `history` and make it the live baseline.
    ///
    /// Allowed in any phase; existing state for `key` is replaced.
    pub fn seed(&self, key: &SeriesKey, history: &Series) -> Result<Arc<LiveSnapshot>> {
        if history.is_empty() {
            return Err(AnalysisError::InsufficientData { need: 1, got: 0 });
        }
        let slot = {
            let mut slots = self.slots.write();
            Arc::clone(slots.entry(key.clone()).or_insert_with(|| {
                Arc::new(SymbolSlot {
                    state: Mutex::new(LiveState::empty(&self.config)),
                    snapshot: RwLock::new(Arc::new(LiveSnapshot::default())),
                })
            }))
        };

        let mut state = slot.state.lock();
        let cfg = &self.config;
        let all = history.bars();
        let skip = all.len().saturating_sub(cfg.max_bars.get());
        let bars = &all[skip..];

        let ctx = cfg.context.compute(bars);
        let cap = cfg.max_patterns_per_kind.get();
        let revision = state.revision + 1;
        let mut fresh = LiveState::empty(cfg);
        fresh.revision = revision;
        fresh.base = skip;
        fresh.bars = bars.to_vec();
        fresh.extrema = ctx.extrema.shifted(skip);
        fresh.levels = cfg
            .levels
            .levels(bars, &ctx.extrema)
            .iter()
            .map(|l| l.shifted(skip))
            .collect();

        let mut records = cfg.windowed(bars, &ctx);
        run(&cfg.volume, bars, &ctx, &mut records);
        run(&cfg.candlestick, bars, &ctx, &mut records);
        records.sort_by_key(|r| r.span());
        for record in records {
            fresh.store(record.shifted(skip), cap);
        }
        fresh.volume = RollingVolume::from_bars(cfg.volume.window, &bars[..bars.len() - 1]);
        fresh.last_volume_known = true;
        fresh.phase = LivePhase::Seeded;
        *state = fresh;

        info!(
            %key,
            bars = bars.len(),
            dropped = skip,
            levels = state.levels.len(),
            revision,
            "live state seeded"
        );
        Ok(self.publish(&slot, &state))
    }

    /// Discard all state for `key`. Returns whether there was any.
    pub fn reset(&self, key: &SeriesKey) -> bool {
        let removed = self.slots.write().remove(key).is_some();
        if removed {
            info!(%key, "live state reset");
        }
        removed
    }

    // ===========================================
    // Updates
    // ===========================================

    /// Absorb one completed or in-progress bar.
    ///
    /// A bar with the same time as the last bar revises it; a later bar
    /// appends. Earlier bars are rejected.
    ///
    /// Level touches are append-only: a revision that moves the bar away from
    /// a level it touched leaves that touch, and its price, in place.
    pub fn absorb(&self, key: &SeriesKey, bar: Bar) -> Result<LiveUpdate> {
        let slot = self.slot(key)?;
        let mut state = slot.state.lock();
        let update = self.absorb_locked(key, &mut state, bar, true)?;
        self.publish(&slot, &state);
        Ok(update)
    }

    /// Fold a trade into the last bar, or open a new bar once the tick falls
    /// past the last bar's interval.
    ///
    /// Ticks carry no volume. A tick-opened bar is not classified for volume
    /// anomalies and its volume stays out of the rolling window until a candle
    /// for the same time supplies one.
    pub fn absorb_tick(&self, key: &SeriesKey, tick: Tick) -> Result<LiveUpdate> {
        let slot = self.slot(key)?;
        let mut state = slot.state.lock();
        let last = *state
            .bars
            .last()
            .ok_or_else(|| AnalysisError::NotSeeded(key.to_string()))?;
        if tick.time < last.time {
            return Err(AnalysisError::OutOfOrder {
                last: last.time,
                got: tick.time,
            });
        }

        let interval = key.timeframe.duration();
        let (bar, volume_known) = if tick.time < last.time + interval {
            let mut revised = last;
            revised.fold_tick(tick.price);
            (revised, state.last_volume_known)
        } else {
            (Bar::from_tick(bar_open(last.time, tick.time, interval), tick.price), false)
        };
        let update = self.absorb_locked(key, &mut state, bar, volume_known)?;
        self.publish(&slot, &state);
        Ok(update)
    }

    /// Re-run the windowed detectors now, regardless of cadence
    pub fn refresh(&self, key: &SeriesKey) -> Result<Arc<LiveSnapshot>> {
        let slot = self.slot(key)?;
        let mut state = slot.state.lock();
        self.refresh_locked(key, &mut state);
        state.revision += 1;
        Ok(self.publish(&slot, &state))
    }

    fn absorb_locked(
        &self,
        key: &SeriesKey,
        state: &mut LiveState,
        bar: Bar,
        volume_known: bool,
    ) -> Result<LiveUpdate> {
        let cfg = &self.config;
        let last = *state
            .bars
            .last()
            .ok_or_else(|| AnalysisError::NotSeeded(key.to_string()))?;

        let index = if bar.time == last.time {
            state.last_index()
        } else {
            state.last_index() + 1
        };
        if let Err(error) = bar.validate_at(index) {
            warn!(%key, index, %error, "live bar rejected");
            return Err(error);
        }
        if bar.time < last.time {
            warn!(%key, last = %last.time, got = %bar.time, "live bar out of order");
            return Err(AnalysisError::OutOfOrder {
                last: last.time,
                got: bar.time,
            });
        }

        if bar.time == last.time {
            if let Some(current) = state.bars.last_mut() {
                *current = bar;
            }
            state.forget_bar(index);
        } else {
            if state.last_volume_known {
                state.volume.push(last.volume());
            }
            state.bars.push(bar);
            state.since_refresh += 1;
            self.trim(state);
        }
        state.last_volume_known = volume_known;

        let mut new_records = Vec::new();
        let tolerance = cfg.levels.cluster_threshold.get();
        let touched_levels: Vec<SupportResistanceLevel> = state
            .levels
            .iter_mut()
            .filter_map(|level| {
                let probe = level.kind.probe(&bar);
                level.try_touch(index, probe, tolerance).then(|| level.clone())
            })
            .collect();

        if volume_known && state.volume.is_full() {
            if let Some(record) = state
                .volume
                .mean()
                .and_then(|mean| cfg.volume.classify(index, bar.volume(), mean))
            {
                new_records.push(record);
            }
        }
        if let Some(record) = cfg.candlestick.record_at(&bar, index) {
            new_records.push(record);
        }
        let cap = cfg.max_patterns_per_kind.get();
        for record in &new_records {
            state.store(record.clone(), cap);
        }

        let refreshed = state.since_refresh >= cfg.refresh_every.get();
        if refreshed {
            new_records.extend(self.refresh_locked(key, state));
        }

        state.phase = LivePhase::Live;
        state.revision += 1;
        trace!(
            %key,
            index,
            revision = state.revision,
            records = new_records.len(),
            touched = touched_levels.len(),
            refreshed,
            "bar absorbed"
        );

        Ok(LiveUpdate {
            revision: state.revision,
            new_records,
            touched_levels,
            refreshed,
        })
    }

    /// Enforce `max_bars`, moving the base offset forward
    fn trim(&self, state: &mut LiveState) {
        let max = self.config.max_bars.get();
        if state.bars.len() > max {
            let excess = state.bars.len() - max;
            state.bars.drain(..excess);
            state.base += excess;
            let base = state.base;
            state.extrema.peaks.retain(|&i| i >= base);
            state.extrema.lows.retain(|&i| i >= base);
            state.levels.retain(|l| l.last_touch() >= base);
        }
    }

    /// Windowed recompute; returns records that were not known before
    fn refresh_locked(&self, key: &SeriesKey, state: &mut LiveState) -> Vec<PatternRecord> {
        let cfg = &self.config;
        let start = state.bars.len().saturating_sub(cfg.refresh_window.get());
        let offset = state.base + start;
        let window = &state.bars[start..];
        let window_len = window.len();
        let ctx = cfg.context.compute(window);

        // Extrema closer than `order` to the window edge cannot be seen from inside it
        let order = ctx.extrema.order;
        let keep_below = offset + order;
        let fresh = ctx.extrema.shifted(offset);
        state.extrema.peaks.retain(|&i| i < keep_below);
        state.extrema.lows.retain(|&i| i < keep_below);
        state.extrema.peaks.extend(fresh.peaks);
        state.extrema.lows.extend(fresh.lows);
        state.extrema.order = order;

        let tolerance = cfg.levels.cluster_threshold.get();
        for level in cfg.levels.levels(window, &ctx.extrema) {
            let level = level.shifted(offset);
            let known = state
                .levels
                .iter()
                .any(|l| l.kind == level.kind && l.distance(level.price) <= tolerance);
            if !known {
                state.levels.push(level);
            }
        }

        let mut records: Vec<PatternRecord> = cfg
            .windowed(window, &ctx)
            .iter()
            .map(|r| r.shifted(offset))
            .collect();
        records.sort_by_key(|r| r.span());

        let mut added = Vec::new();
        for kind in WINDOWED_KINDS {
            let list = state.patterns.entry(kind).or_default();
            let previous: Vec<PatternRecord> = list.iter().filter(|r| r.span().0 >= offset).cloned().collect();
            list.retain(|r| r.span().0 < offset);
            for record in records.iter().filter(|r| r.kind() == kind) {
                if !previous.contains(record) {
                    added.push(record.clone());
                }
            }
        }
        let cap = cfg.max_patterns_per_kind.get();
        for record in records {
            state.store(record, cap);
        }
        state.since_refresh = 0;

        debug!(%key, window = window_len, found = added.len(), "windowed refresh");
        added
    }

    // ===========================================
    // Reads
    // ===========================================

    /// Latest consistent view of `key`, if it has been seeded
    pub fn snapshot(&self, key: &SeriesKey) -> Option<Arc<LiveSnapshot>> {
        let slot = self.slots.read().get(key).cloned()?;
        let snapshot = Arc::clone(&slot.snapshot.read());
        // a slot is visible before its first seed completes
        (snapshot.phase != LivePhase::Uninitialized).then_some(snapshot)
    }

    pub fn phase(&self, key: &SeriesKey) -> LivePhase {
        self.snapshot(key).map(|s| s.phase).unwrap_or_default()
    }

    /// Seeded symbols in key order
    pub fn symbols(&self) -> Vec<SeriesKey> {
        let mut keys: Vec<SeriesKey> = self.slots.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Open time of the interval containing `time`, on the grid anchored at `anchor`
fn bar_open(anchor: DateTime<Utc>, time: DateTime<Utc>, interval: chrono::Duration) -> DateTime<Utc> {
    let step = interval.num_seconds().max(1);
    let elapsed = (time - anchor).num_seconds();
    anchor + chrono::Duration::seconds(elapsed / step * step)
}
