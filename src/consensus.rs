//! Consensus scoring
//!
//! Folds indicator and pattern signals into one bullish/bearish/neutral view.
//!
//! Bucket sums use each signal's flat weight only; the signal score never
//! enters them. The score only moves `overall_score`. Bias is bullish when
//! the bullish weight is strictly larger than the bearish weight, bearish for
//! the reverse, and neutral on an exact tie.
//!
//! Confidence measures agreement, not magnitude: `1 - sqrt(var)` where `var`
//! is the weighted variance of the directions (+1, 0, -1).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::detectors::helpers::saturate;
use crate::engine::AnalysisReport;
use crate::indicators::{IndicatorOutput, IndicatorRequest};
use crate::series::Timeframe;
use crate::{AnalysisError, Direction, Result, OHLCV};

// ============================================================
// SIGNALS
// ============================================================

/// One directional opinion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub bias: Direction,
    /// Strength in 0..=100
    pub score: f64,
    /// Non-negative; overridden by [`ConsensusWeights`] when named there
    pub weight: f64,
}

impl Signal {
    pub fn new(name: impl Into<String>, bias: Direction, score: f64, weight: f64) -> Self {
        Self {
            name: name.into(),
            bias,
            score,
            weight,
        }
    }
}

/// A signal as it entered the result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalContribution {
    pub name: String,
    pub bias: Direction,
    /// Effective weight after overrides
    pub weight: f64,
    pub score: f64,
    /// `weight × direction × score`
    pub contribution: f64,
}

/// Per-name weight overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsensusWeights(HashMap<String, f64>);

impl ConsensusWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, weight: f64) -> Self {
        self.0.insert(name.into(), weight);
        self
    }

    /// Override for `signal`, or its own weight. Negative or non-finite weights count as zero.
    pub fn weight_for(&self, signal: &Signal) -> f64 {
        let weight = self.0.get(&signal.name).copied().unwrap_or(signal.weight);
        if weight.is_finite() && weight > 0.0 {
            weight
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub signals: Vec<SignalContribution>,
    pub bullish_pct: f64,
    pub bearish_pct: f64,
    pub neutral_pct: f64,
    /// Weighted mean of `direction × score`, in -100..=100
    pub overall_score: f64,
    pub overall_bias: Direction,
    /// Agreement across signals, in 0..=1
    pub confidence: f64,
}

// ============================================================
// SCORER
// ============================================================

/// Scoring rule plus the thresholds used to turn a report into signals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusScorer {
    /// Oscillator level (RSI, %K) above which the signal turns bearish
    pub overbought: f64,
    /// Oscillator level below which the signal turns bullish
    pub oversold: f64,
    /// ADX below this reads as no trend
    pub adx_trend: f64,
    /// Close/MA deviation at which a moving-average signal saturates
    pub ma_scale: f64,
    /// MACD histogram/close at which the MACD signal saturates
    pub macd_scale: f64,
    /// Only patterns ending within this many bars of the last bar count
    pub pattern_lookback: usize,
    pub indicator_weight: f64,
    pub pattern_weight: f64,
}

impl Default for ConsensusScorer {
    fn default() -> Self {
        Self {
            overbought: 70.0,
            oversold: 30.0,
            adx_trend: 25.0,
            ma_scale: 0.05,
            macd_scale: 0.005,
            pattern_lookback: 20,
            indicator_weight: 1.0,
            pattern_weight: 1.0,
        }
    }
}

impl ConsensusScorer {
    pub fn validate_config(&self) -> Result<()> {
        if !(0.0 < self.oversold && self.oversold < self.overbought && self.overbought < 100.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "oscillator zones need 0 < oversold {} < overbought {} < 100",
                self.oversold, self.overbought
            )));
        }
        for (name, value) in [
            ("ma_scale", self.ma_scale),
            ("macd_scale", self.macd_scale),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(AnalysisError::InvalidConfig(format!(
                    "consensus {name} {value} must be positive"
                )));
            }
        }
        for (name, value) in [
            ("adx_trend", self.adx_trend),
            ("indicator_weight", self.indicator_weight),
            ("pattern_weight", self.pattern_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AnalysisError::InvalidConfig(format!(
                    "consensus {name} {value} must be non-negative"
                )));
            }
        }
        Ok(())
    }

    /// Aggregate `signals`. Scores are clamped into 0..=100.
    pub fn score(&self, signals: &[Signal], weights: &ConsensusWeights) -> ConsensusResult {
        let contributions: Vec<SignalContribution> = signals
            .iter()
            .map(|signal| {
                let weight = weights.weight_for(signal);
                let score = if signal.score.is_nan() {
                    0.0
                } else {
                    signal.score.clamp(0.0, 100.0)
                };
                SignalContribution {
                    name: signal.name.clone(),
                    bias: signal.bias,
                    weight,
                    score,
                    contribution: weight * signal.bias.sign() * score,
                }
            })
            .collect();

        let bucket = |bias: Direction| -> f64 {
            contributions
                .iter()
                .filter(|c| c.bias == bias)
                .map(|c| c.weight)
                .sum()
        };
        let (bullish, bearish, neutral) = (
            bucket(Direction::Bullish),
            bucket(Direction::Bearish),
            bucket(Direction::Neutral),
        );
        let total = bullish + bearish + neutral;

        if total <= 0.0 {
            return ConsensusResult {
                signals: contributions,
                bullish_pct: 0.0,
                bearish_pct: 0.0,
                neutral_pct: 0.0,
                overall_score: 0.0,
                overall_bias: Direction::Neutral,
                confidence: 0.0,
            };
        }

        let overall_bias = if bullish > bearish {
            Direction::Bullish
        } else if bearish > bullish {
            Direction::Bearish
        } else {
            Direction::Neutral
        };

        let overall_score = contributions.iter().map(|c| c.contribution).sum::<f64>() / total;
        let mean = contributions
            .iter()
            .map(|c| c.weight * c.bias.sign())
            .sum::<f64>()
            / total;
        let variance = contributions
            .iter()
            .map(|c| c.weight * (c.bias.sign() - mean).powi(2))
            .sum::<f64>()
            / total;

        ConsensusResult {
            signals: contributions,
            bullish_pct: bullish / total * 100.0,
            bearish_pct: bearish / total * 100.0,
            neutral_pct: neutral / total * 100.0,
            overall_score,
            overall_bias,
            confidence: (1.0 - variance.sqrt()).clamp(0.0, 1.0),
        }
    }

    /// Score several timeframes with the same weights
    pub fn score_timeframes<'a, I>(&self, inputs: I, weights: &ConsensusWeights) -> BTreeMap<Timeframe, ConsensusResult>
    where
        I: IntoIterator<Item = (Timeframe, &'a [Signal])>,
    {
        inputs
            .into_iter()
            .map(|(timeframe, signals)| (timeframe, self.score(signals, weights)))
            .collect()
    }

    // ===========================================
    // Signal derivation
    // ===========================================

    /// Signals from the last value of each indicator in `report` and from
    /// recent directional patterns.
    ///
    /// Indicator signals are named after the indicator (`rsi(14)`), pattern
    /// signals after the pattern kind (`double_top`). ATR and OBV carry no
    /// direction and are skipped, as are neutral patterns.
    pub fn derive_signals<T: OHLCV>(&self, bars: &[T], report: &AnalysisReport) -> Vec<Signal> {
        let Some(close) = bars.last().map(|b| b.close()) else {
            return Vec::new();
        };

        let mut signals: Vec<Signal> = report
            .indicators
            .iter()
            .filter_map(|result| {
                let (bias, score) = self.indicator_view(&result.request, &result.output, close)?;
                Some(Signal::new(result.request.name(), bias, score, self.indicator_weight))
            })
            .collect();

        let horizon = bars.len().saturating_sub(self.pattern_lookback);
        signals.extend(
            report
                .patterns
                .iter()
                .filter(|p| p.end_index() >= horizon && p.direction() != Direction::Neutral)
                .map(|p| {
                    Signal::new(
                        p.kind().as_str(),
                        p.direction(),
                        p.confidence() * 100.0,
                        self.pattern_weight,
                    )
                }),
        );
        signals
    }

    /// Bias and score from the last defined values of one indicator
    fn indicator_view(
        &self,
        request: &IndicatorRequest,
        output: &IndicatorOutput,
        close: f64,
    ) -> Option<(Direction, f64)> {
        match (request, output) {
            (IndicatorRequest::Rsi { .. }, IndicatorOutput::Line(line)) => {
                Some(self.oscillator_view(line.last()?))
            }
            (_, IndicatorOutput::Stochastic(stoch)) => Some(self.oscillator_view(stoch.k.last()?)),
            (IndicatorRequest::Sma { .. } | IndicatorRequest::Ema { .. }, IndicatorOutput::Line(line)) => {
                let average = line.last()?;
                if average <= 0.0 {
                    return None;
                }
                let deviation = (close - average) / average;
                Some((
                    Direction::from_move(deviation),
                    100.0 * saturate(deviation.abs(), self.ma_scale),
                ))
            }
            (_, IndicatorOutput::Macd(macd)) => {
                let histogram = macd.histogram.last()?;
                if close <= 0.0 {
                    return None;
                }
                Some((
                    Direction::from_move(histogram),
                    100.0 * saturate(histogram.abs() / close, self.macd_scale),
                ))
            }
            (_, IndicatorOutput::Bands(bands)) => {
                let (upper, lower) = (bands.upper.last()?, bands.lower.last()?);
                let width = upper - lower;
                if close > upper {
                    Some((Direction::Bearish, 50.0 + 50.0 * saturate(close - upper, width)))
                } else if close < lower {
                    Some((Direction::Bullish, 50.0 + 50.0 * saturate(lower - close, width)))
                } else {
                    Some((Direction::Neutral, 0.0))
                }
            }
            (_, IndicatorOutput::Adx(adx)) => {
                let strength = adx.adx.last()?;
                if strength < self.adx_trend {
                    return Some((Direction::Neutral, strength));
                }
                let delta = adx.plus_di.last()? - adx.minus_di.last()?;
                Some((Direction::from_move(delta), strength.min(100.0)))
            }
            _ => None,
        }
    }

    /// Overbought reads bearish, oversold bullish, in between neutral
    fn oscillator_view(&self, value: f64) -> (Direction, f64) {
        if value >= self.overbought {
            let depth = (value - self.overbought) / (100.0 - self.overbought);
            (Direction::Bearish, 50.0 + 50.0 * depth.clamp(0.0, 1.0))
        } else if value <= self.oversold {
            let depth = (self.oversold - value) / self.oversold;
            (Direction::Bullish, 50.0 + 50.0 * depth.clamp(0.0, 1.0))
        } else {
            (Direction::Neutral, 0.0)
        }
    }
}

/// [`ConsensusScorer::derive_signals`] with default thresholds
pub fn derive_signals<T: OHLCV>(bars: &[T], report: &AnalysisReport) -> Vec<Signal> {
    ConsensusScorer::default().derive_signals(bars, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{IndicatorSeries, Macd};
    use crate::engine::IndicatorResult;
    use crate::Period;

    fn close_enough(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_majority_by_flat_weight() {
        let signals = [
            Signal::new("a", Direction::Bullish, 80.0, 1.0),
            Signal::new("b", Direction::Bullish, 80.0, 1.0),
            Signal::new("c", Direction::Bearish, 60.0, 1.0),
        ];
        let result = ConsensusScorer::default().score(&signals, &ConsensusWeights::new());
        assert_eq!(result.overall_bias, Direction::Bullish);
        assert!(close_enough(result.bullish_pct, 200.0 / 3.0));
        assert!(close_enough(result.bearish_pct, 100.0 / 3.0));
        assert!(close_enough(result.neutral_pct, 0.0));
        assert!(close_enough(result.overall_score, 100.0 / 3.0));
        // mean 1/3, variance 8/9
        assert!(close_enough(result.confidence, 1.0 - (8.0f64 / 9.0).sqrt()));
    }

    #[test]
    fn test_tie_is_neutral_even_when_scores_differ() {
        let signals = [
            Signal::new("a", Direction::Bullish, 90.0, 1.0),
            Signal::new("b", Direction::Bearish, 10.0, 1.0),
        ];
        let result = ConsensusScorer::default().score(&signals, &ConsensusWeights::new());
        assert_eq!(result.overall_bias, Direction::Neutral);
        assert!(close_enough(result.overall_score, 40.0));
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_weight_overrides() {
        let signals = [
            Signal::new("rsi(14)", Direction::Bearish, 70.0, 1.0),
            Signal::new("sma(20)", Direction::Bullish, 50.0, 1.0),
        ];
        let weights = ConsensusWeights::new().with("rsi(14)", 3.0);
        let result = ConsensusScorer::default().score(&signals, &weights);
        assert_eq!(result.overall_bias, Direction::Bearish);
        assert!(close_enough(result.bearish_pct, 75.0));
        assert_eq!(result.signals[0].weight, 3.0);
    }

    #[test]
    fn test_unanimous_signals_are_fully_confident() {
        let signals = [
            Signal::new("a", Direction::Bearish, 40.0, 2.0),
            Signal::new("b", Direction::Bearish, 60.0, 1.0),
        ];
        let result = ConsensusScorer::default().score(&signals, &ConsensusWeights::new());
        assert_eq!(result.confidence, 1.0);
        assert!(close_enough(result.overall_score, -140.0 / 3.0));
    }

    #[test]
    fn test_no_weight_is_neutral() {
        let empty = ConsensusScorer::default().score(&[], &ConsensusWeights::new());
        assert_eq!(empty.overall_bias, Direction::Neutral);
        assert_eq!(empty.confidence, 0.0);

        let zeroed = [Signal::new("a", Direction::Bullish, 80.0, -1.0)];
        let result = ConsensusScorer::default().score(&zeroed, &ConsensusWeights::new());
        assert_eq!(result.overall_bias, Direction::Neutral);
        assert_eq!(result.signals[0].weight, 0.0);
    }

    #[test]
    fn test_scores_are_clamped() {
        let signals = [Signal::new("a", Direction::Bullish, 250.0, 1.0)];
        let result = ConsensusScorer::default().score(&signals, &ConsensusWeights::new());
        assert_eq!(result.overall_score, 100.0);
    }

    #[test]
    fn test_score_timeframes() {
        let daily = [Signal::new("a", Direction::Bullish, 50.0, 1.0)];
        let hourly = [Signal::new("a", Direction::Bearish, 50.0, 1.0)];
        let results = ConsensusScorer::default().score_timeframes(
            [(Timeframe::Day1, &daily[..]), (Timeframe::Hour1, &hourly[..])],
            &ConsensusWeights::new(),
        );
        assert_eq!(results[&Timeframe::Day1].overall_bias, Direction::Bullish);
        assert_eq!(results[&Timeframe::Hour1].overall_bias, Direction::Bearish);
    }

    #[test]
    fn test_oscillator_zones() {
        let scorer = ConsensusScorer::default();
        assert_eq!(scorer.oscillator_view(85.0), (Direction::Bearish, 75.0));
        assert_eq!(scorer.oscillator_view(15.0), (Direction::Bullish, 75.0));
        assert_eq!(scorer.oscillator_view(50.0).0, Direction::Neutral);
    }

    #[derive(Clone, Copy)]
    struct Close(f64);

    impl OHLCV for Close {
        fn open(&self) -> f64 {
            self.0
        }

        fn high(&self) -> f64 {
            self.0
        }

        fn low(&self) -> f64 {
            self.0
        }

        fn close(&self) -> f64 {
            self.0
        }

        fn volume(&self) -> f64 {
            1.0
        }
    }

    #[test]
    fn test_derive_signals_from_report() {
        let line = |v: f64| IndicatorSeries::from_values(vec![None, Some(v)]);
        let report = AnalysisReport {
            key: None,
            bars: 2,
            warnings: Vec::new(),
            indicators: vec![
                IndicatorResult {
                    request: IndicatorRequest::Rsi { period: Period::new_const(14) },
                    output: IndicatorOutput::Line(line(80.0)),
                },
                IndicatorResult {
                    request: IndicatorRequest::Sma { period: Period::new_const(20) },
                    output: IndicatorOutput::Line(line(100.0)),
                },
                IndicatorResult {
                    request: IndicatorRequest::Macd {
                        fast: Period::new_const(12),
                        slow: Period::new_const(26),
                        signal: Period::new_const(9),
                    },
                    output: IndicatorOutput::Macd(Macd {
                        macd: line(1.0),
                        signal: line(1.5),
                        histogram: line(-0.5),
                    }),
                },
                IndicatorResult {
                    request: IndicatorRequest::Obv,
                    output: IndicatorOutput::Line(line(10.0)),
                },
            ],
            patterns: Vec::new(),
            diagnostics: Vec::new(),
        };
        let signals = derive_signals(&[Close(100.0), Close(102.5)], &report);
        let views: Vec<(&str, Direction)> = signals.iter().map(|s| (s.name.as_str(), s.bias)).collect();
        assert_eq!(
            views,
            vec![
                ("rsi(14)", Direction::Bearish),
                ("sma(20)", Direction::Bullish),
                ("macd(12,26,9)", Direction::Bearish),
            ]
        );
        assert!(close_enough(signals[1].score, 50.0));
    }
}
