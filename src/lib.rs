//! # candlestat - candlestick reversal patterns and their track record
//!
//! Detects 18 classical reversal patterns (9 bullish, 9 bearish) over a
//! static sequence of OHLCV bars, then checks every detected instance against
//! the bars that follow it: a take-profit/stop-loss bracket is built from
//! recent volatility and price is walked forward until it closes beyond one
//! side.
//!
//! ## Quick Start
//!
//! ```rust
//! use candlestat::prelude::*;
//!
//! let bars: Vec<Bar> = (0..40)
//!     .map(|i| {
//!         let base = 100.0 + (i % 7) as f64;
//!         Bar::new(i, base, base + 2.0, base - 1.0 - (i % 3) as f64, base + 1.0, None).unwrap()
//!     })
//!     .collect();
//!
//! let analyzer = AnalyzerBuilder::new()
//!     .selection(Selection::All)
//!     .bracket_mode(BracketMode::HighLow)
//!     .build()
//!     .unwrap();
//!
//! let analysis = analyzer.run(&bars).unwrap();
//! assert_eq!(analysis.detections.len(), bars.len());
//! for stats in &analysis.stats {
//!     println!("{}: {:?}", stats.kind.name(), stats.win_rate);
//! }
//! ```

pub mod bar;
pub mod indicators;
pub mod params;
pub mod rules;
pub mod scaler;
pub mod scanner;
pub mod stats;
pub mod sweep;
pub mod trend;
pub mod validator;

pub mod prelude {
    pub use crate::{
        // Data
        bar::{Bar, BarSeries},
        // Indicators
        indicators::{atr, true_range},
        // Parameters
        params::{param_meta, ParamMeta, ParamType, ParameterSet, Threshold, Thresholds},
        // Rules
        rules::{PatternKind, RuleInput},
        // Normalizer
        scaler::{MinMaxScaler, Scaler, ScalerKind, SizeNormalizer, StandardScaler},
        // Scanner
        scanner::{CancelFlag, Detection, DetectionTable, PatternInstance, PatternScanner, Selection},
        // Stats
        stats::{summarize, PatternStats},
        // Sweep
        sweep::{ParameterSweep, SweepPoint},
        // Trend
        trend::{trend_strength, TrendEstimator},
        // Validator
        validator::{
            resolve, Bracket, BracketMode, OutcomeValidator, Resolution, ValidatedPattern,
            Validation, ValidationTable, ValidatorConfig,
        },
        // Parallel
        analyze_parallel,
        Analysis,
        AnalysisError,
        AnalysisResult,
        // Engine
        Analyzer,
        AnalyzerBuilder,
        // Types
        CandleType,
        Direction,
        OHLCVExt,
        // Errors
        PatternError,
        Period,
        Result,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors raised by detection, validation and configuration.
///
/// Insufficient history is never an error: lookups that cannot be answered
/// yet come back as `None` and surface as an undefined pattern/outcome.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
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

    #[error("Missing threshold `{key}` for pattern `{pattern}`")]
    MissingThreshold { pattern: String, key: &'static str },

    #[error("Unknown mode: {0}")]
    UnknownMode(String),

    #[error("Zero spread in {field}: cannot normalize")]
    ZeroDeviation { field: &'static str },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<serde_json::Error> for PatternError {
    fn from(e: serde_json::Error) -> Self {
        PatternError::Persistence(e.to_string())
    }
}

impl From<std::io::Error> for PatternError {
    fn from(e: std::io::Error) -> Self {
        PatternError::Persistence(e.to_string())
    }
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    /// Create a Period from a float threshold (e.g. `trend_window = 10.0`)
    pub fn from_f64(value: f64) -> Result<Self> {
        if !value.is_finite() || value < 1.0 || value.fract() != 0.0 {
            return Err(PatternError::InvalidValue("Period must be a positive integer"));
        }
        Self::new(value as usize)
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

    fn volume(&self) -> Option<f64> {
        None
    }

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

impl<T: OHLCV + ?Sized> OHLCV for &T {
    fn open(&self) -> f64 {
        (**self).open()
    }

    fn high(&self) -> f64 {
        (**self).high()
    }

    fn low(&self) -> f64 {
        (**self).low()
    }

    fn close(&self) -> f64 {
        (**self).close()
    }

    fn volume(&self) -> Option<f64> {
        (**self).volume()
    }

    fn timestamp(&self) -> Option<i64> {
        (**self).timestamp()
    }
}

/// Bar classification by the sign of `close - open`
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandleType {
    Bullish,
    Bearish,
    Doji,
}

/// Extension trait with computed geometry for OHLCV data
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
    fn candle_type(&self) -> CandleType {
        if self.close() > self.open() {
            CandleType::Bullish
        } else if self.close() < self.open() {
            CandleType::Bearish
        } else {
            CandleType::Doji
        }
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Middle of the real body
    #[inline]
    fn body_mid(&self) -> f64 {
        (self.open() + self.close()) / 2.0
    }

    /// Body as share of the full range, in [0, 1]. Zero for a zero range.
    #[inline]
    fn body_ratio(&self) -> f64 {
        let range = self.range();
        if range > 0.0 {
            self.body() / range
        } else {
            0.0
        }
    }

    /// Lower shadow relative to the body. Infinite when the body is zero.
    #[inline]
    fn lower_shadow_body_ratio(&self) -> f64 {
        let body = self.body();
        if body > 0.0 {
            self.lower_shadow() / body
        } else {
            f64::INFINITY
        }
    }

    /// Upper shadow relative to the body. Infinite when the body is zero.
    #[inline]
    fn upper_shadow_body_ratio(&self) -> f64 {
        let body = self.body();
        if body > 0.0 {
            self.upper_shadow() / body
        } else {
            f64::INFINITY
        }
    }

    /// Where the body sits inside the bar: -1 at the bottom, 0 centered, 1 at the top.
    #[inline]
    fn body_position(&self) -> f64 {
        let lower = self.lower_shadow();
        let shadows = lower + self.upper_shadow();
        if shadows > 0.0 {
            2.0 * lower / shadows - 1.0
        } else {
            0.0
        }
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| p.is_nan()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if prices.iter().any(|p| p.is_infinite()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if prices.iter().any(|p| *p < 0.0) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "negative price",
            });
        }
        if self.high() < self.low() {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        if self.open() > self.high() || self.open() < self.low() {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "open outside [low, high]",
            });
        }
        if self.close() > self.high() || self.close() < self.low() {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "close outside [low, high]",
            });
        }
        if let Some(v) = self.volume() {
            if !v.is_finite() || v < 0.0 {
                return Err(PatternError::InvalidOHLCV {
                    index: 0,
                    reason: "volume must be finite and >= 0",
                });
            }
        }
        Ok(())
    }
}

impl<T: OHLCV + ?Sized> OHLCVExt for T {}

/// Re-index an `InvalidOHLCV` error produced by `OHLCVExt::validate`.
pub(crate) fn at_index(e: PatternError, index: usize) -> PatternError {
    match e {
        PatternError::InvalidOHLCV { reason, .. } => PatternError::InvalidOHLCV { index, reason },
        other => other,
    }
}

// ============================================================
// DIRECTION
// ============================================================

/// Which way a reversal pattern points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bullish,
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

    /// Key of this side in a [`ParameterSet`](params::ParameterSet)
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Bullish => "bullish",
            Direction::Bearish => "bearish",
        }
    }
}

// ============================================================
// ANALYZER - scan then validate
// ============================================================

use params::ParameterSet;
use scaler::ScalerKind;
use scanner::{DetectionTable, PatternScanner, Selection};
use stats::PatternStats;
use validator::{BracketMode, OutcomeValidator, ValidationTable, ValidatorConfig};

/// Full output of one analyzer run
#[derive(Debug, Clone)]
pub struct Analysis {
    pub detections: DetectionTable,
    pub validations: ValidationTable,
    pub stats: Vec<PatternStats>,
}

/// Detection and validation wired together with one configuration.
#[derive(Debug, Clone)]
pub struct Analyzer {
    scanner: PatternScanner,
    validator: OutcomeValidator,
    selection: Selection,
}

impl Analyzer {
    pub fn scanner(&self) -> &PatternScanner {
        &self.scanner
    }

    pub fn validator(&self) -> &OutcomeValidator {
        &self.validator
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Scan the whole sequence, then validate every detected instance.
    pub fn run<T: OHLCV + Sync>(&self, bars: &[T]) -> Result<Analysis> {
        let detections = self.scanner.scan(bars, self.selection, false)?;
        let validations = self.validator.validate(bars, &detections)?;
        let stats = stats::summarize(&validations);
        Ok(Analysis {
            detections,
            validations,
            stats,
        })
    }
}

/// Builder for creating [`Analyzer`] instances
#[derive(Debug, Clone, Default)]
pub struct AnalyzerBuilder {
    params: ParameterSet,
    scaler: ScalerKind,
    selection: Selection,
    validator: ValidatorConfig,
}

impl AnalyzerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole parameter set
    pub fn params(mut self, params: ParameterSet) -> Self {
        self.params = params;
        self
    }

    /// Override a single threshold of one pattern
    pub fn threshold(mut self, kind: rules::PatternKind, key: params::Threshold, value: f64) -> Self {
        self.params.set(kind, key, value);
        self
    }

    pub fn scaler(mut self, kind: ScalerKind) -> Self {
        self.scaler = kind;
        self
    }

    pub fn selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn validator(mut self, config: ValidatorConfig) -> Self {
        self.validator = config;
        self
    }

    pub fn bracket_mode(mut self, mode: BracketMode) -> Self {
        self.validator.mode = mode;
        self
    }

    pub fn wl_ratio(mut self, ratio: f64) -> Self {
        self.validator.wl_ratio = ratio;
        self
    }

    /// Build the analyzer, checking thresholds for every selected pattern
    pub fn build(self) -> Result<Analyzer> {
        for kind in self.selection.kinds() {
            self.params.resolve(kind)?;
        }
        let validator = OutcomeValidator::new(self.validator)?;
        Ok(Analyzer {
            scanner: PatternScanner::new(self.params, self.scaler),
            validator,
            selection: self.selection,
        })
    }
}

// ============================================================
// PARALLEL ANALYSIS
// ============================================================

use rayon::prelude::*;

/// Result of analyzing a single instrument
#[derive(Debug)]
pub struct AnalysisResult {
    pub symbol: String,
    pub analysis: Analysis,
}

/// Error from analyzing a single instrument
#[derive(Debug)]
pub struct AnalysisError {
    pub symbol: String,
    pub error: PatternError,
}

/// Analyze several independent instruments across the rayon pool
pub fn analyze_parallel<'a, T, I>(
    analyzer: &Analyzer,
    instruments: I,
) -> (Vec<AnalysisResult>, Vec<AnalysisError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            analyzer
                .run(bars)
                .map(|analysis| AnalysisResult {
                    symbol: symbol.to_string(),
                    analysis,
                })
                .map_err(|error| AnalysisError {
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
            Err(e) => {
                tracing::warn!(symbol = %e.symbol, error = %e.error, "instrument analysis failed");
                errors.push(e)
            }
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::Bar;
    use crate::rules::PatternKind;

    /// Test OHLCV bar
    #[derive(Debug, Clone)]
    struct TBar {
        o: f64,
        h: f64,
        l: f64,
        c: f64,
    }

    impl TBar {
        fn new(o: f64, h: f64, l: f64, c: f64) -> Self {
            Self { o, h, l, c }
        }
    }

    impl OHLCV for TBar {
        fn open(&self) -> f64 {
            self.o
        }

        fn high(&self) -> f64 {
            self.h
        }

        fn low(&self) -> f64 {
            self.l
        }

        fn close(&self) -> f64 {
            self.c
        }
    }

    fn make_downtrend_bars() -> Vec<TBar> {
        (0..20)
            .map(|i| {
                let base = 100.0 - i as f64 * 2.0;
                TBar::new(base, base + 1.0, base - 1.0 - (i % 3) as f64 * 0.5, base - 0.5)
            })
            .collect()
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(100).is_ok());
        assert!(Period::new(0).is_err());
        assert_eq!(Period::from_f64(10.0).unwrap().get(), 10);
        assert!(Period::from_f64(2.5).is_err());
        assert!(Period::from_f64(0.0).is_err());
        assert!(Period::from_f64(f64::NAN).is_err());
    }

    #[test]
    fn test_ohlcv_ext() {
        let bar = TBar::new(100.0, 110.0, 90.0, 105.0);
        assert_eq!(bar.body(), 5.0);
        assert_eq!(bar.range(), 20.0);
        assert_eq!(bar.upper_shadow(), 5.0);
        assert_eq!(bar.lower_shadow(), 10.0);
        assert!(bar.is_bullish());
        assert!(!bar.is_bearish());
        assert_eq!(bar.candle_type(), CandleType::Bullish);
        assert!((bar.body_ratio() - 0.25).abs() < 1e-12);
        assert!((bar.lower_shadow_body_ratio() - 2.0).abs() < 1e-12);
        assert!((bar.upper_shadow_body_ratio() - 1.0).abs() < 1e-12);
        // lower 10, upper 5 => 2*10/15 - 1
        assert!((bar.body_position() - (20.0 / 15.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_geometry() {
        let doji = TBar::new(100.0, 100.0, 100.0, 100.0);
        assert_eq!(doji.candle_type(), CandleType::Doji);
        assert_eq!(doji.body_ratio(), 0.0);
        assert_eq!(doji.body_position(), 0.0);
        assert!(doji.lower_shadow_body_ratio().is_infinite());
        assert!(doji.upper_shadow_body_ratio().is_infinite());
    }

    #[test]
    fn test_validate_rejects_inconsistent_bars() {
        assert!(TBar::new(100.0, 110.0, 90.0, 105.0).validate().is_ok());
        assert!(TBar::new(111.0, 110.0, 90.0, 105.0).validate().is_err());
        assert!(TBar::new(100.0, 110.0, 90.0, 89.0).validate().is_err());
        assert!(TBar::new(100.0, 90.0, 110.0, 100.0).validate().is_err());
        assert!(TBar::new(f64::NAN, 110.0, 90.0, 100.0).validate().is_err());
    }

    #[test]
    fn test_builder_defaults() {
        let analyzer = AnalyzerBuilder::new().build().unwrap();
        assert_eq!(analyzer.selection(), Selection::All);
        assert_eq!(analyzer.validator().config().mode, BracketMode::HighLow);
    }

    #[test]
    fn test_builder_rejects_missing_threshold() {
        let mut params = ParameterSet::default();
        params.remove(PatternKind::Hammer, params::Threshold::LowerShadowRatio);
        let err = AnalyzerBuilder::new().params(params).build().unwrap_err();
        assert!(matches!(err, PatternError::MissingThreshold { .. }));
    }

    #[test]
    fn test_builder_skips_unselected_patterns() {
        let mut params = ParameterSet::default();
        params.remove(PatternKind::Hammer, params::Threshold::LowerShadowRatio);
        let built = AnalyzerBuilder::new()
            .params(params)
            .selection(Selection::Bearish)
            .build();
        assert!(built.is_ok());
    }

    #[test]
    fn test_builder_rejects_bad_wl_ratio() {
        assert!(AnalyzerBuilder::new().wl_ratio(0.0).build().is_err());
        assert!(AnalyzerBuilder::new().wl_ratio(f64::NAN).build().is_err());
    }

    #[test]
    fn test_run_shapes() {
        let bars = make_downtrend_bars();
        let analyzer = AnalyzerBuilder::new().build().unwrap();
        let analysis = analyzer.run(&bars).unwrap();
        assert_eq!(analysis.detections.len(), bars.len());
        assert_eq!(analysis.validations.len(), bars.len());
        assert_eq!(analysis.stats.len(), PatternKind::ALL.len());
    }

    #[test]
    fn test_parallel_analysis() {
        let analyzer = AnalyzerBuilder::new().build().unwrap();

        let bars1: Vec<Bar> = make_downtrend_bars()
            .iter()
            .enumerate()
            .map(|(i, b)| Bar::new(i as i64, b.o, b.h, b.l, b.c, None).unwrap())
            .collect();
        let bars2: Vec<Bar> = bars1[..5].to_vec();

        let instruments: Vec<(&str, &[Bar])> = vec![("AAPL", &bars1), ("SHORT", &bars2)];

        let (results, errors) = analyze_parallel(&analyzer, instruments);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].symbol, "AAPL");
        // 5 bars cannot host a 10-bar trend window
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].symbol, "SHORT");
    }
}
