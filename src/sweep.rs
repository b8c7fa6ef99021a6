//! Threshold grid search
//!
//! Scans and validates one pattern under every combination of the varied
//! thresholds, keeping the rest of the parameter set fixed, and ranks the
//! combinations by win rate.
//!
//! # Example
//!
//! ```rust,no_run
//! use candlestat::prelude::*;
//!
//! # fn load() -> Vec<Bar> { Vec::new() }
//! let bars = load();
//! let points = ParameterSweep::new(PatternKind::Hammer)
//!     .vary(Threshold::LowerShadowRatio, (1.0, 3.0, 0.25))
//!     .vary(Threshold::TrendStrength, (-0.6, 0.0, 0.2))
//!     .run(&bars, &PatternScanner::default(), &OutcomeValidator::default())
//!     .unwrap();
//! for point in points.iter().take(5) {
//!     println!("{:?} -> {:?}", point.overrides, point.stats.win_rate);
//! }
//! ```

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    params::Threshold,
    rules::PatternKind,
    scanner::{CancelFlag, PatternScanner},
    stats::PatternStats,
    validator::OutcomeValidator,
    PatternError, Result, OHLCV,
};

/// One evaluated combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub overrides: Vec<(Threshold, f64)>,
    pub stats: PatternStats,
}

/// Cartesian grid over some thresholds of one pattern
#[derive(Debug, Clone)]
pub struct ParameterSweep {
    kind: PatternKind,
    axes: Vec<(Threshold, Vec<f64>)>,
}

impl ParameterSweep {
    pub fn new(kind: PatternKind) -> Self {
        Self {
            kind,
            axes: Vec::new(),
        }
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Vary `key` over `(min, max, step)`
    pub fn vary(self, key: Threshold, range: (f64, f64, f64)) -> Self {
        let values = key.meta().with_range(range).generate_grid();
        self.vary_values(key, values)
    }

    /// Vary `key` over its built-in search range
    pub fn vary_default(self, key: Threshold) -> Self {
        let values = key.meta().generate_grid();
        self.vary_values(key, values)
    }

    /// Vary `key` over explicit values. Replaces an earlier axis on the same key.
    pub fn vary_values(mut self, key: Threshold, values: Vec<f64>) -> Self {
        self.axes.retain(|(k, _)| *k != key);
        self.axes.push((key, values));
        self
    }

    /// Number of combinations
    pub fn len(&self) -> usize {
        self.axes.iter().map(|(_, values)| values.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every combination of the varied values, first axis slowest
    pub fn combinations(&self) -> Vec<Vec<(Threshold, f64)>> {
        self.axes.iter().fold(vec![Vec::new()], |acc, (key, values)| {
            acc.iter()
                .flat_map(|prefix| {
                    values.iter().map(move |v| {
                        let mut combo = prefix.clone();
                        combo.push((*key, *v));
                        combo
                    })
                })
                .collect()
        })
    }

    /// Evaluate every combination, best win rate first.
    ///
    /// Thresholds not varied come from `scanner`'s parameter set. The scaler
    /// is fitted once and shared by all combinations.
    pub fn run<T: OHLCV + Sync>(
        &self,
        bars: &[T],
        scanner: &PatternScanner,
        validator: &OutcomeValidator,
    ) -> Result<Vec<SweepPoint>> {
        let required = self.kind.required_thresholds();
        if let Some((key, _)) = self.axes.iter().find(|(key, _)| !required.contains(key)) {
            return Err(PatternError::InvalidConfig(format!(
                "`{}` does not read threshold `{}`",
                self.kind.name(),
                key
            )));
        }
        for (key, values) in &self.axes {
            let meta = key.meta();
            for value in values {
                meta.check_type(*value)?;
            }
        }

        let scaler = scanner.fit_scaler(bars)?;
        let cancel = CancelFlag::new();
        let combinations = self.combinations();
        info!(pattern = self.kind.name(), combinations = combinations.len(), "sweep started");

        let mut points = combinations
            .into_par_iter()
            .map(|overrides| -> Result<SweepPoint> {
                let mut params = scanner.params().clone();
                for (key, value) in &overrides {
                    params.set(self.kind, *key, *value);
                }
                let table = PatternScanner::new(params, scanner.scaler_kind())
                    .scan_kinds(bars, &[self.kind], false, &scaler, &cancel)?;
                let validated = validator.validate(bars, &table)?;
                let stats = PatternStats::from_cells(self.kind, validated.column(self.kind).unwrap_or(&[]));
                Ok(SweepPoint { overrides, stats })
            })
            .collect::<Result<Vec<_>>>()?;

        points.sort_by(|a, b| {
            let rate = |p: &SweepPoint| p.stats.win_rate.unwrap_or(f64::NEG_INFINITY);
            rate(b)
                .total_cmp(&rate(a))
                .then_with(|| b.stats.detected.cmp(&a.stats.detected))
        });
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::Bar;

    /// Decline, a hammer at index 12, then a rally through the window high
    fn hammer_then_rally() -> Vec<Bar> {
        let mut bars: Vec<Bar> = (0..12)
            .map(|i| {
                let open = 80.0 - i as f64 * 1.5;
                let low = open - 1.5 - (i % 3) as f64 * 0.3;
                Bar::new(i, open, open + 0.2, low, open - 1.0, None).unwrap()
            })
            .collect();
        bars.push(Bar::new(12, 60.0, 60.6, 58.0, 60.5, None).unwrap());
        for (i, close) in [64.0, 68.0, 72.0, 76.0].into_iter().enumerate() {
            bars.push(Bar::new(13 + i as i64, close - 3.5, close + 0.2, close - 3.7, close, None).unwrap());
        }
        bars
    }

    #[test]
    fn test_combinations() {
        let sweep = ParameterSweep::new(PatternKind::Hammer)
            .vary(Threshold::LowerShadowRatio, (1.0, 2.0, 0.5))
            .vary_values(Threshold::UpperShadowRatio, vec![0.25, 0.5]);
        assert_eq!(sweep.len(), 6);
        let combos = sweep.combinations();
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0], vec![(Threshold::LowerShadowRatio, 1.0), (Threshold::UpperShadowRatio, 0.25)]);
        assert_eq!(combos[5], vec![(Threshold::LowerShadowRatio, 2.0), (Threshold::UpperShadowRatio, 0.5)]);
    }

    #[test]
    fn test_no_axes_is_the_baseline() {
        let sweep = ParameterSweep::new(PatternKind::Hammer);
        assert_eq!(sweep.combinations(), vec![Vec::new()]);
        let points = sweep
            .run(&hammer_then_rally(), &PatternScanner::default(), &OutcomeValidator::default())
            .unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].stats.detected, 1);
    }

    #[test]
    fn test_ranked_by_win_rate() {
        let bars = hammer_then_rally();
        let points = ParameterSweep::new(PatternKind::Hammer)
            .vary_values(Threshold::LowerShadowRatio, vec![5.0, 1.0, 3.0])
            .run(&bars, &PatternScanner::default(), &OutcomeValidator::default())
            .unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].stats.win_rate, Some(1.0));
        assert_eq!(points[0].stats.mean_bars_to_resolution, Some(4.0));
        // lower shadow is 4x the body, so 5x finds nothing
        assert_eq!(points[2].overrides, vec![(Threshold::LowerShadowRatio, 5.0)]);
        assert_eq!(points[2].stats.detected, 0);
        assert_eq!(points[2].stats.win_rate, None);
    }

    #[test]
    fn test_unread_threshold_rejected() {
        let err = ParameterSweep::new(PatternKind::Piercing)
            .vary(Threshold::BodyRatio, (0.1, 0.5, 0.1))
            .run(&hammer_then_rally(), &PatternScanner::default(), &OutcomeValidator::default())
            .unwrap_err();
        assert!(matches!(err, PatternError::InvalidConfig(_)));
    }

    #[test]
    fn test_fractional_window_rejected() {
        let err = ParameterSweep::new(PatternKind::Hammer)
            .vary_values(Threshold::TrendWindow, vec![2.5])
            .run(&hammer_then_rally(), &PatternScanner::default(), &OutcomeValidator::default())
            .unwrap_err();
        assert!(matches!(err, PatternError::InvalidValue(_)));
    }
}
