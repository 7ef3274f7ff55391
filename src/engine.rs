//! Batch analysis engine
//!
//! [`AnalysisEngine`] runs the whole pipeline over one series: validation,
//! the requested indicators, one [`DetectionContext`] and every registered
//! detector. Only fatal validation errors abort a run. A missing warm-up or a
//! bad parameter on one indicator or detector becomes a [`Diagnostic`] in the
//! report while its siblings still run.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use crate::detectors::*;
use crate::extrema::{find_indicator_extrema, find_price_extrema, ExtremaSet};
use crate::indicators::{rsi, IndicatorOutput, IndicatorRequest, IndicatorSeries};
use crate::pattern::{PatternKind, PatternRecord};
use crate::series::{RawBar, Series, SeriesKey};
use crate::validate::{SeriesValidator, ValidationConfig, ValidationWarning};
use crate::{AnalysisError, Period, Result, OHLCV};

// ============================================================
// DETECTION CONTEXT
// ============================================================

/// Everything detectors share, computed once per series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionContext {
    /// Peaks on highs and lows on lows
    pub extrema: ExtremaSet,
    /// Oscillator the divergence detector compares price against
    pub oscillator: Option<IndicatorSeries>,
    pub oscillator_extrema: ExtremaSet,
}

/// Provider of the shared detection context
pub trait ContextProvider: Send + Sync {
    fn compute<T: OHLCV>(&self, bars: &[T]) -> DetectionContext;
}

/// Price extrema at a fixed order plus RSI as the oscillator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultContextProvider {
    /// Half-window of the extrema comparison
    pub extrema_order: Period,
    pub oscillator_period: Period,
}

impl Default for DefaultContextProvider {
    fn default() -> Self {
        Self {
            extrema_order: Period::new_const(3),
            oscillator_period: Period::new_const(14),
        }
    }
}

impl ContextProvider for DefaultContextProvider {
    fn compute<T: OHLCV>(&self, bars: &[T]) -> DetectionContext {
        let closes: Vec<f64> = bars.iter().map(|b| b.close()).collect();
        let oscillator = rsi(&closes, self.oscillator_period);
        DetectionContext {
            extrema: find_price_extrema(bars, self.extrema_order),
            oscillator_extrema: find_indicator_extrema(&oscillator, self.extrema_order),
            oscillator: Some(oscillator),
        }
    }
}

// ============================================================
// DETECTOR TRAITS
// ============================================================

/// Generic chart detector trait - for concrete types
pub trait ChartDetector: Send + Sync {
    fn name(&self) -> &'static str;
    /// Kinds of record this detector can emit
    fn kinds(&self) -> &'static [PatternKind];
    fn min_bars(&self) -> usize;
    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &DetectionContext) -> Vec<PatternRecord>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

/// Object-safe chart detector trait - for custom detectors
pub trait DynChartDetector: Send + Sync {
    fn name(&self) -> &'static str;
    fn kinds(&self) -> &'static [PatternKind];
    fn min_bars(&self) -> usize;
    fn detect(&self, bars: &[&dyn OHLCV], ctx: &DetectionContext) -> Vec<PatternRecord>;
    fn validate_config(&self) -> Result<()>;
}

impl<D: ChartDetector> DynChartDetector for D {
    fn name(&self) -> &'static str {
        ChartDetector::name(self)
    }

    fn kinds(&self) -> &'static [PatternKind] {
        ChartDetector::kinds(self)
    }

    fn min_bars(&self) -> usize {
        ChartDetector::min_bars(self)
    }

    fn detect(&self, bars: &[&dyn OHLCV], ctx: &DetectionContext) -> Vec<PatternRecord> {
        ChartDetector::detect(self, bars, ctx)
    }

    fn validate_config(&self) -> Result<()> {
        ChartDetector::validate_config(self)
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - fast path via enum dispatch
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "detector", rename_all = "snake_case")]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect<T: OHLCV>(&self, bars: &[T], ctx: &DetectionContext) -> Vec<PatternRecord> {
                match self {
                    $(Self::$variant(d) => ChartDetector::detect(d, bars, ctx)),*
                }
            }

            #[inline]
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant(d) => ChartDetector::name(d)),*
                }
            }

            #[inline]
            pub fn kinds(&self) -> &'static [PatternKind] {
                match self {
                    $(Self::$variant(d) => ChartDetector::kinds(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => ChartDetector::min_bars(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => ChartDetector::validate_config(d)),*
                }
            }
        }
    };
}

define_builtin_detectors! {
    Levels(SupportResistanceDetector),
    Triangle(TriangleDetector),
    Flag(FlagDetector),
    Double(DoublePatternDetector),
    HeadAndShoulders(HeadAndShouldersDetector),
    Divergence(DivergenceDetector),
    VolumeAnomaly(VolumeAnomalyDetector),
    Candlestick(CandlestickDetector),
}

// ============================================================
// REPORT
// ============================================================

/// A computed indicator with the request that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorResult {
    pub request: IndicatorRequest,
    pub output: IndicatorOutput,
}

/// A non-fatal failure of one indicator or detector
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    /// Indicator or detector name
    pub source: String,
    #[serde(serialize_with = "error_as_string")]
    pub error: AnalysisError,
}

fn error_as_string<S: Serializer>(
    error: &AnalysisError,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(error)
}

/// Partial result plus warnings for one series
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub key: Option<SeriesKey>,
    pub bars: usize,
    pub warnings: Vec<ValidationWarning>,
    pub indicators: Vec<IndicatorResult>,
    pub patterns: Vec<PatternRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

impl AnalysisReport {
    /// Output of the first indicator matching `pred`
    pub fn indicator_by(&self, pred: impl Fn(&IndicatorRequest) -> bool) -> Option<&IndicatorOutput> {
        self.indicators
            .iter()
            .find(|r| pred(&r.request))
            .map(|r| &r.output)
    }

    /// Output of the indicator with display name `name`, e.g. `rsi(14)`
    pub fn indicator(&self, name: &str) -> Option<&IndicatorOutput> {
        self.indicator_by(|r| r.name() == name)
    }

    pub fn patterns_of(&self, kind: PatternKind) -> impl Iterator<Item = &PatternRecord> + '_ {
        self.patterns.iter().filter(move |p| p.kind() == kind)
    }

    /// Whether some indicator or detector was skipped
    #[inline]
    pub fn is_partial(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

// ============================================================
// ANALYSIS ENGINE
// ============================================================

/// Engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Records below this confidence are dropped
    pub min_confidence: Option<f64>,
    /// Only these kinds are reported
    pub kind_filter: Option<Vec<PatternKind>>,
    pub validation: ValidationConfig,
}

/// Main analysis engine
pub struct AnalysisEngine<C: ContextProvider = DefaultContextProvider> {
    builtin: Vec<BuiltinDetector>,
    custom: Vec<Box<dyn DynChartDetector>>,
    indicators: Vec<IndicatorRequest>,
    context_provider: C,
    validator: SeriesValidator,
    config: EngineConfig,
}

impl<C: ContextProvider> AnalysisEngine<C> {
    pub fn new(context_provider: C) -> Self {
        Self {
            builtin: Vec::new(),
            custom: Vec::new(),
            indicators: Vec::new(),
            context_provider,
            validator: SeriesValidator::default(),
            config: EngineConfig::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn detectors(&self) -> &[BuiltinDetector] {
        &self.builtin
    }

    pub fn indicator_requests(&self) -> &[IndicatorRequest] {
        &self.indicators
    }

    // ===========================================
    // HIGH-LEVEL: raw bars in, report out
    // ===========================================

    /// Validate `raw` and analyze it.
    ///
    /// Fails only when validation does; everything else lands in the report.
    pub fn analyze(&self, raw: &[RawBar]) -> Result<AnalysisReport> {
        self.analyze_at(raw, Utc::now())
    }

    /// [`analyze`](Self::analyze) with a fixed validation clock
    pub fn analyze_at(&self, raw: &[RawBar], now: DateTime<Utc>) -> Result<AnalysisReport> {
        let validated = self
            .validator
            .validate_at(raw, now)
            .map_err(AnalysisError::Validation)?;
        let mut report = self.analyze_series(&validated.series);
        report.warnings = validated.warnings;
        Ok(report)
    }

    /// Analyze an already validated series
    pub fn analyze_series(&self, series: &Series) -> AnalysisReport {
        let bars = series.bars();
        let (indicators, mut diagnostics) = self.compute_indicators(bars);
        let (patterns, detector_diagnostics) = self.detect(bars);
        diagnostics.extend(detector_diagnostics);

        debug!(
            key = ?series.key(),
            bars = bars.len(),
            indicators = indicators.len(),
            patterns = patterns.len(),
            diagnostics = diagnostics.len(),
            "series analyzed"
        );

        AnalysisReport {
            key: series.key().cloned(),
            bars: bars.len(),
            warnings: Vec::new(),
            indicators,
            patterns,
            diagnostics,
        }
    }

    // ===========================================
    // MID-LEVEL: indicators, context, detection
    // ===========================================

    /// Every requested indicator; failures become diagnostics
    pub fn compute_indicators<T: OHLCV>(&self, bars: &[T]) -> (Vec<IndicatorResult>, Vec<Diagnostic>) {
        let mut results = Vec::with_capacity(self.indicators.len());
        let mut diagnostics = Vec::new();
        for request in &self.indicators {
            match request.compute(bars) {
                Ok(output) => results.push(IndicatorResult {
                    request: *request,
                    output,
                }),
                Err(error) => diagnostics.push(Diagnostic {
                    source: request.name(),
                    error,
                }),
            }
        }
        (results, diagnostics)
    }

    #[inline]
    pub fn compute_context<T: OHLCV>(&self, bars: &[T]) -> DetectionContext {
        self.context_provider.compute(bars)
    }

    /// Run every detector over `bars`
    pub fn detect<T: OHLCV>(&self, bars: &[T]) -> (Vec<PatternRecord>, Vec<Diagnostic>) {
        let ctx = self.compute_context(bars);
        self.detect_with(bars, &ctx)
    }

    /// Run every detector against a precomputed context
    pub fn detect_with<T: OHLCV>(
        &self,
        bars: &[T],
        ctx: &DetectionContext,
    ) -> (Vec<PatternRecord>, Vec<Diagnostic>) {
        let mut records = Vec::new();
        let mut diagnostics = Vec::new();

        // Fast path: builtin detectors (enum dispatch, no vtable)
        for detector in &self.builtin {
            if !self.wants_any(detector.kinds()) {
                continue;
            }
            if bars.len() < detector.min_bars() {
                diagnostics.push(insufficient(detector.name(), detector.min_bars(), bars.len()));
                continue;
            }
            records.extend(
                detector
                    .detect(bars, ctx)
                    .into_iter()
                    .filter(|r| self.should_include(r)),
            );
        }

        // Slow path: custom detectors (vtable)
        if !self.custom.is_empty() {
            let bar_refs: Vec<&dyn OHLCV> = bars.iter().map(|b| b as &dyn OHLCV).collect();
            for detector in &self.custom {
                if !self.wants_any(detector.kinds()) {
                    continue;
                }
                if bar_refs.len() < detector.min_bars() {
                    diagnostics.push(insufficient(detector.name(), detector.min_bars(), bars.len()));
                    continue;
                }
                records.extend(
                    detector
                        .detect(&bar_refs, ctx)
                        .into_iter()
                        .filter(|r| self.should_include(r)),
                );
            }
        }

        (records, diagnostics)
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn wants_any(&self, kinds: &[PatternKind]) -> bool {
        match self.config.kind_filter {
            Some(ref filter) => kinds.iter().any(|k| filter.contains(k)),
            None => true,
        }
    }

    fn should_include(&self, record: &PatternRecord) -> bool {
        if let Some(min) = self.config.min_confidence {
            if record.confidence() < min {
                return false;
            }
        }
        if let Some(ref filter) = self.config.kind_filter {
            if !filter.contains(&record.kind()) {
                return false;
            }
        }
        true
    }

    fn validate(&self) -> Result<()> {
        for d in &self.builtin {
            d.validate_config()?;
        }
        for d in &self.custom {
            d.validate_config()?;
        }
        for request in &self.indicators {
            request.validate_config()?;
        }
        if let Some(min) = self.config.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err(AnalysisError::OutOfRange {
                    field: "min_confidence",
                    value: min,
                    min: 0.0,
                    max: 1.0,
                });
            }
        }
        self.config.validation.validate_config()
    }
}

fn insufficient(source: &str, need: usize, got: usize) -> Diagnostic {
    Diagnostic {
        source: source.to_string(),
        error: AnalysisError::InsufficientData { need, got },
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating AnalysisEngine instances
pub struct EngineBuilder<C: ContextProvider = DefaultContextProvider> {
    context_provider: C,
    builtin: Vec<BuiltinDetector>,
    custom: Vec<Box<dyn DynChartDetector>>,
    indicators: Vec<IndicatorRequest>,
    config: EngineConfig,
}

impl Default for EngineBuilder<DefaultContextProvider> {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder<DefaultContextProvider> {
    pub fn new() -> Self {
        Self {
            context_provider: DefaultContextProvider::default(),
            builtin: Vec::new(),
            custom: Vec::new(),
            indicators: Vec::new(),
            config: EngineConfig::default(),
        }
    }
}

/// Generate an array of `BuiltinDetector` variants using `Default::default()` for each inner type.
macro_rules! builtin_defaults {
    ($($variant:ident),* $(,)?) => {
        [$(BuiltinDetector::$variant(Default::default())),*]
    };
}

impl<C: ContextProvider> EngineBuilder<C> {
    /// Change context provider
    pub fn context_provider<C2: ContextProvider>(self, provider: C2) -> EngineBuilder<C2> {
        EngineBuilder {
            context_provider: provider,
            builtin: self.builtin,
            custom: self.custom,
            indicators: self.indicators,
            config: self.config,
        }
    }

    /// Add every builtin detector with default configuration
    pub fn with_all_defaults(self) -> Self {
        self.with_chart_defaults().with_candlestick_defaults()
    }

    /// Add the multi-bar chart detectors with defaults
    pub fn with_chart_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            Levels,
            Triangle,
            Flag,
            Double,
            HeadAndShoulders,
            Divergence,
            VolumeAnomaly,
        ]);
        self
    }

    /// Add the single-bar candlestick classifier with defaults
    pub fn with_candlestick_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![Candlestick]);
        self
    }

    /// Request the standard indicator set
    pub fn with_default_indicators(mut self) -> Self {
        self.indicators.extend(IndicatorRequest::defaults());
        self
    }

    pub fn indicator(mut self, request: IndicatorRequest) -> Self {
        self.indicators.push(request);
        self
    }

    /// Add a builtin detector
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: BuiltinDetector) -> Self {
        self.builtin.push(detector);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, detector: BuiltinDetector) -> Result<Self> {
        detector.validate_config()?;
        self.builtin.push(detector);
        Ok(self)
    }

    /// Add a custom detector (slow path)
    pub fn add_custom<D: DynChartDetector + 'static>(mut self, detector: D) -> Self {
        self.custom.push(Box::new(detector));
        self
    }

    /// Set minimum confidence filter
    pub fn min_confidence(mut self, confidence: f64) -> Self {
        self.config.min_confidence = Some(confidence);
        self
    }

    /// Filter to specific kinds only
    pub fn only_kinds(mut self, kinds: impl IntoIterator<Item = PatternKind>) -> Self {
        self.config.kind_filter = Some(kinds.into_iter().collect());
        self
    }

    pub fn validation(mut self, config: ValidationConfig) -> Self {
        self.config.validation = config;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<AnalysisEngine<C>> {
        let engine = AnalysisEngine {
            builtin: self.builtin,
            custom: self.custom,
            indicators: self.indicators,
            context_provider: self.context_provider,
            validator: SeriesValidator::new(self.config.validation.clone()),
            config: self.config,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL ANALYSIS
// ============================================================

/// Result of analyzing a single instrument
#[derive(Debug)]
pub struct ScanResult {
    pub symbol: String,
    pub report: AnalysisReport,
}

/// Error from analyzing a single instrument
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: AnalysisError,
}

/// Parallel analysis of multiple instruments
pub fn analyze_parallel<'a, I, C>(
    engine: &AnalysisEngine<C>,
    instruments: I,
) -> (Vec<ScanResult>, Vec<ScanError>)
where
    I: IntoParallelIterator<Item = (&'a str, &'a [RawBar])>,
    C: ContextProvider + Sync,
{
    let now = Utc::now();
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, raw)| {
            engine
                .analyze_at(raw, now)
                .map(|report| ScanResult {
                    symbol: symbol.to_string(),
                    report,
                })
                .map_err(|error| ScanError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TYPE ALIASES
// ============================================================

/// Default engine with DefaultContextProvider
pub type DefaultEngine = AnalysisEngine<DefaultContextProvider>;

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::CandleKind;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn wave(n: i64) -> Vec<RawBar> {
        (0..n)
            .map(|i| {
                let c = 100.0 + (i as f64 * 0.5).sin() * 6.0 + i as f64 * 0.05;
                RawBar::new(start() + Duration::days(i), c - 0.3, c + 1.0, c - 1.0, c + 0.3, 1_000.0 + (i % 7) as f64 * 50.0)
            })
            .collect()
    }

    struct LastBarMarker;

    impl ChartDetector for LastBarMarker {
        fn name(&self) -> &'static str {
            "last_bar"
        }

        fn kinds(&self) -> &'static [PatternKind] {
            &[PatternKind::Candlestick]
        }

        fn min_bars(&self) -> usize {
            1
        }

        fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &DetectionContext) -> Vec<PatternRecord> {
            vec![PatternRecord::Candlestick {
                candle: CandleKind::Doji,
                index: bars.len() - 1,
                confidence: 1.0,
            }]
        }
    }

    #[test]
    fn test_full_pipeline() {
        let engine = EngineBuilder::new()
            .with_all_defaults()
            .with_default_indicators()
            .build()
            .unwrap();
        let report = engine.analyze_at(&wave(120), now()).unwrap();
        assert_eq!(report.bars, 120);
        assert_eq!(report.indicators.len(), 9);
        assert!(report.diagnostics.is_empty());
        for result in &report.indicators {
            assert_eq!(result.output.len(), 120);
        }
        assert!(report.patterns_of(PatternKind::Level).count() > 0);
        assert!(report.indicator("rsi(14)").is_some());
    }

    #[test]
    fn test_short_series_gives_partial_report() {
        let engine = EngineBuilder::new()
            .with_all_defaults()
            .with_default_indicators()
            .build()
            .unwrap();
        let report = engine.analyze_at(&wave(10), now()).unwrap();
        assert!(report.is_partial());
        // SMA/EMA/Bollinger(20), RSI/ATR(14), MACD, Stochastic(14), ADX(14) all lack data; OBV does not
        assert_eq!(report.indicators.len(), 1);
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.source == "triangle" && matches!(d.error, AnalysisError::InsufficientData { need: 15, got: 10 })));
    }

    #[test]
    fn test_validation_error_aborts() {
        let mut raw = wave(30);
        raw[5].high = raw[5].low - 1.0;
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        assert!(matches!(
            engine.analyze_at(&raw, now()),
            Err(AnalysisError::Validation(_))
        ));
    }

    #[test]
    fn test_filters() {
        let engine = EngineBuilder::new()
            .with_all_defaults()
            .only_kinds([PatternKind::Candlestick, PatternKind::Level])
            .min_confidence(0.5)
            .build()
            .unwrap();
        let empty: Vec<crate::series::Bar> = Vec::new();
        let (patterns, diagnostics) = engine.detect(&empty);
        assert!(patterns.is_empty());
        assert_eq!(diagnostics.len(), 2);

        let report = engine.analyze_at(&wave(120), now()).unwrap();
        assert!(report.patterns.iter().all(|p| {
            matches!(p.kind(), PatternKind::Candlestick | PatternKind::Level) && p.confidence() >= 0.5
        }));
    }

    #[test]
    fn test_custom_detector() {
        let engine = EngineBuilder::new().add_custom(LastBarMarker).build().unwrap();
        let report = engine.analyze_at(&wave(12), now()).unwrap();
        assert_eq!(report.patterns.len(), 1);
        assert_eq!(report.patterns[0].end_index(), 11);
    }

    #[test]
    fn test_build_rejects_bad_config() {
        let bad = BuiltinDetector::Flag(FlagDetector {
            min_pole_move: -1.0,
            ..Default::default()
        });
        assert!(EngineBuilder::new().add_checked(bad.clone()).is_err());
        assert!(EngineBuilder::new().add(bad).build().is_err());
        assert!(EngineBuilder::new().min_confidence(1.5).build().is_err());
    }

    #[test]
    fn test_detection_is_idempotent() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        let raw = wave(150);
        let a = engine.analyze_at(&raw, now()).unwrap();
        let b = engine.analyze_at(&raw, now()).unwrap();
        assert_eq!(a.patterns, b.patterns);
    }

    #[test]
    fn test_analyze_parallel() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        let good = wave(60);
        let mut bad = wave(60);
        bad[0].close = f64::NAN;
        let instruments = vec![("GOOD", good.as_slice()), ("BAD", bad.as_slice())];
        let (ok, err) = analyze_parallel(&engine, instruments);
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].symbol, "GOOD");
        assert_eq!(err.len(), 1);
        assert_eq!(err[0].symbol, "BAD");
    }

    #[test]
    fn test_builtin_detector_serde() {
        let detector = BuiltinDetector::VolumeAnomaly(VolumeAnomalyDetector::default());
        let json = serde_json::to_string(&detector).unwrap();
        assert!(json.contains("\"detector\":\"volume_anomaly\""));
        let back: BuiltinDetector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, detector);
    }
}
