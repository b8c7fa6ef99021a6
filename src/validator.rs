//! Outcome Validator
//!
//! The validation pass. Each matched pattern instance gets a take-profit /
//! stop-loss bracket around the close of its newest bar. Price is then
//! walked forward bar by bar until a close crosses one side.
//!
//! Brackets come from either the highest high and lowest low of a trailing
//! window ([`BracketMode::HighLow`]) or the Average True Range at the entry
//! bar ([`BracketMode::Atr`]).
//!
//! The detection table is only borrowed. Outcomes land in a separate
//! [`ValidationTable`] of the same shape.

use std::{fmt, path::Path, str::FromStr};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::{
    indicators::atr,
    rules::PatternKind,
    scanner::{CancelFlag, Detection, DetectionTable, PatternInstance},
    Direction, PatternError, Period, Result, OHLCV,
};

// ============================================================
// CONFIGURATION
// ============================================================

/// How the bracket is sized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketMode {
    /// Highest high / lowest low of the trailing window, widened on the
    /// profit side to meet `wl_ratio`
    #[default]
    HighLow,
    /// One ATR of risk, `wl_ratio` ATRs of reward
    Atr,
}

impl FromStr for BracketMode {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "high_low" | "highlow" | "hl" => Ok(BracketMode::HighLow),
            "atr" => Ok(BracketMode::Atr),
            other => Err(PatternError::UnknownMode(format!("bracket mode `{other}`"))),
        }
    }
}

impl fmt::Display for BracketMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BracketMode::HighLow => "high_low",
            BracketMode::Atr => "atr",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub mode: BracketMode,
    /// Trailing bars (entry bar included) for the high/low bracket
    pub past_window: Period,
    pub atr_window: Period,
    /// Minimum reward-to-risk ratio; must be finite and > 0
    pub wl_ratio: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            mode: BracketMode::HighLow,
            past_window: Period::new_const(10),
            atr_window: Period::new_const(14),
            wl_ratio: 1.0,
        }
    }
}

impl ValidatorConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.wl_ratio.is_finite() || self.wl_ratio <= 0.0 {
            return Err(PatternError::InvalidConfig(format!(
                "wl_ratio must be finite and > 0, got {}",
                self.wl_ratio
            )));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

// ============================================================
// BRACKET + RESOLUTION
// ============================================================

/// Entry price with its take-profit and stop-loss levels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    pub entry: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
}

impl Bracket {
    #[inline]
    pub fn reward(&self) -> f64 {
        (self.take_profit - self.entry).abs()
    }

    #[inline]
    pub fn risk(&self) -> f64 {
        (self.entry - self.stop_loss).abs()
    }

    /// Reward over risk; `None` for zero risk
    pub fn win_loss_ratio(&self) -> Option<f64> {
        let risk = self.risk();
        (risk > 0.0).then(|| self.reward() / risk)
    }

    /// Either side sits on the entry price
    pub fn is_degenerate(&self) -> bool {
        self.take_profit == self.entry || self.stop_loss == self.entry
    }
}

/// Outcome of the forward walk; `bars` counts the bars examined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Win { bars: usize },
    Loss { bars: usize },
    /// The sequence ended first
    Unresolved { bars: usize },
}

impl Resolution {
    pub fn is_valid(self) -> Option<bool> {
        match self {
            Resolution::Win { .. } => Some(true),
            Resolution::Loss { .. } => Some(false),
            Resolution::Unresolved { .. } => None,
        }
    }

    pub fn bars(self) -> usize {
        match self {
            Resolution::Win { bars } | Resolution::Loss { bars } | Resolution::Unresolved { bars } => bars,
        }
    }
}

/// Walk forward from the bar after `index` until a close crosses a side.
///
/// Bullish: win on `close >= take_profit`, loss on `close <= stop_loss`.
/// Bearish compares the other way round.
pub fn resolve<T: OHLCV>(bars: &[T], index: usize, direction: Direction, bracket: &Bracket) -> Resolution {
    let ahead = bars.get(index + 1..).unwrap_or(&[]);
    for (step, bar) in ahead.iter().enumerate() {
        let close = bar.close();
        let (win, loss) = match direction {
            Direction::Bullish => (close >= bracket.take_profit, close <= bracket.stop_loss),
            Direction::Bearish => (close <= bracket.take_profit, close >= bracket.stop_loss),
        };
        if win {
            return Resolution::Win { bars: step + 1 };
        }
        if loss {
            return Resolution::Loss { bars: step + 1 };
        }
    }
    Resolution::Unresolved { bars: ahead.len() }
}

// ============================================================
// VALIDATION OUTPUT
// ============================================================

/// Outcome fields attached to one pattern instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    /// `Some(true)` win, `Some(false)` loss, `None` unresolved or not validated
    pub is_valid: Option<bool>,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
    pub win_loss_ratio: Option<f64>,
    pub bars_to_resolution: Option<usize>,
}

impl Validation {
    fn with_bracket(bracket: &Bracket) -> Self {
        Self {
            is_valid: None,
            take_profit: Some(bracket.take_profit),
            stop_loss: Some(bracket.stop_loss),
            win_loss_ratio: bracket.win_loss_ratio(),
            bars_to_resolution: None,
        }
    }
}

/// A detected instance together with its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedPattern {
    pub instance: PatternInstance,
    pub validation: Validation,
}

/// Same shape as the [`DetectionTable`] it came from. Cells are `None`
/// where the detection was undefined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationTable {
    len: usize,
    columns: Vec<(PatternKind, Vec<Option<ValidatedPattern>>)>,
}

impl ValidationTable {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn kinds(&self) -> impl Iterator<Item = PatternKind> + '_ {
        self.columns.iter().map(|(kind, _)| *kind)
    }

    pub fn columns(&self) -> impl Iterator<Item = (PatternKind, &[Option<ValidatedPattern>])> {
        self.columns.iter().map(|(kind, cells)| (*kind, cells.as_slice()))
    }

    pub fn column(&self, kind: PatternKind) -> Option<&[Option<ValidatedPattern>]> {
        self.columns
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, cells)| cells.as_slice())
    }

    pub fn get(&self, index: usize, kind: PatternKind) -> Option<&ValidatedPattern> {
        self.column(kind)?.get(index)?.as_ref()
    }

    /// Tri-state outcome at `(index, kind)`
    pub fn is_valid(&self, index: usize, kind: PatternKind) -> Option<bool> {
        self.get(index, kind)?.validation.is_valid
    }

    /// Validated matches of one column
    pub fn matched(&self, kind: PatternKind) -> impl Iterator<Item = &ValidatedPattern> {
        self.column(kind)
            .unwrap_or(&[])
            .iter()
            .flatten()
            .filter(|cell| cell.instance.is_match())
    }
}

// ============================================================
// VALIDATOR
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct OutcomeValidator {
    config: ValidatorConfig,
}

impl OutcomeValidator {
    pub fn new(config: ValidatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Raw bracket for a pattern whose newest bar is `index`.
    ///
    /// `None` when the window does not fit before `index`.
    pub fn bracket<T: OHLCV>(&self, bars: &[T], index: usize, direction: Direction) -> Option<Bracket> {
        let entry = bars.get(index)?.close();
        match self.config.mode {
            BracketMode::HighLow => {
                let window = self.config.past_window.get();
                if index + 1 < window {
                    return None;
                }
                let (high, low) = bars[index + 1 - window..=index]
                    .iter()
                    .fold((f64::NEG_INFINITY, f64::INFINITY), |(h, l), bar| {
                        (h.max(bar.high()), l.min(bar.low()))
                    });
                Some(match direction {
                    Direction::Bullish => Bracket {
                        entry,
                        take_profit: high,
                        stop_loss: low,
                    },
                    Direction::Bearish => Bracket {
                        entry,
                        take_profit: low,
                        stop_loss: high,
                    },
                })
            },
            BracketMode::Atr => {
                let atr = atr(bars, index, self.config.atr_window.get())?;
                let reward = atr * self.config.wl_ratio;
                Some(match direction {
                    Direction::Bullish => Bracket {
                        entry,
                        take_profit: entry + reward,
                        stop_loss: entry - atr,
                    },
                    Direction::Bearish => Bracket {
                        entry,
                        take_profit: entry - reward,
                        stop_loss: entry + atr,
                    },
                })
            },
        }
    }

    /// Widen the take-profit side until reward >= wl_ratio * risk
    fn widen(&self, bracket: Bracket, direction: Direction) -> Bracket {
        let target = self.config.wl_ratio * bracket.risk();
        if bracket.reward() >= target {
            return bracket;
        }
        let take_profit = match direction {
            Direction::Bullish => bracket.entry + target,
            Direction::Bearish => bracket.entry - target,
        };
        Bracket { take_profit, ..bracket }
    }

    /// Outcome of one instance; every field `None` unless it matched.
    pub fn validate_instance<T: OHLCV>(&self, bars: &[T], instance: &PatternInstance) -> Validation {
        if !instance.is_match() {
            return Validation::default();
        }
        let direction = instance.direction();
        let index = instance.end_index;
        let Some(raw) = self.bracket(bars, index, direction) else {
            return Validation::default();
        };

        if raw.is_degenerate() {
            return Validation {
                is_valid: Some(false),
                bars_to_resolution: Some(0),
                ..Validation::with_bracket(&raw)
            };
        }

        let bracket = match self.config.mode {
            BracketMode::HighLow => self.widen(raw, direction),
            BracketMode::Atr => raw,
        };
        let resolution = resolve(bars, index, direction, &bracket);
        Validation {
            is_valid: resolution.is_valid(),
            bars_to_resolution: Some(resolution.bars()),
            ..Validation::with_bracket(&bracket)
        }
    }

    pub fn validate<T: OHLCV + Sync>(&self, bars: &[T], detections: &DetectionTable) -> Result<ValidationTable> {
        self.validate_with_cancel(bars, detections, &CancelFlag::new())
    }

    #[instrument(skip_all, fields(bars = bars.len(), mode = %self.config.mode))]
    pub fn validate_with_cancel<T: OHLCV + Sync>(
        &self,
        bars: &[T],
        detections: &DetectionTable,
        cancel: &CancelFlag,
    ) -> Result<ValidationTable> {
        if detections.is_compact() {
            return Err(PatternError::InvalidConfig(
                "a compact detection table carries no instances to validate".to_string(),
            ));
        }
        if detections.len() != bars.len() {
            return Err(PatternError::InvalidConfig(format!(
                "detection table has {} rows but the sequence has {} bars",
                detections.len(),
                bars.len()
            )));
        }

        let columns: Vec<(PatternKind, &[Detection])> = detections.columns().collect();
        let columns = columns
            .into_par_iter()
            .map(|(kind, cells)| self.validate_column(bars, kind, cells, cancel).map(|c| (kind, c)))
            .collect::<Result<Vec<_>>>()?;

        let table = ValidationTable {
            len: bars.len(),
            columns,
        };
        let (mut wins, mut losses, mut open) = (0usize, 0usize, 0usize);
        for (_, cells) in table.columns() {
            for cell in cells.iter().flatten().filter(|c| c.instance.is_match()) {
                match cell.validation.is_valid {
                    Some(true) => wins += 1,
                    Some(false) => losses += 1,
                    None => open += 1,
                }
            }
        }
        info!(wins, losses, unresolved = open, "validation finished");
        Ok(table)
    }

    fn validate_column<T: OHLCV>(
        &self,
        bars: &[T],
        kind: PatternKind,
        cells: &[Detection],
        cancel: &CancelFlag,
    ) -> Result<Vec<Option<ValidatedPattern>>> {
        let mut out = Vec::with_capacity(cells.len());
        for cell in cells {
            cancel.check()?;
            out.push(match cell {
                Detection::Undefined => None,
                Detection::Instance(instance) => Some(ValidatedPattern {
                    validation: self.validate_instance(bars, instance),
                    instance: instance.clone(),
                }),
                Detection::Flag(_) => {
                    return Err(PatternError::InvalidConfig(format!(
                        "column `{}` holds flags, not instances",
                        kind.name()
                    )))
                },
            });
        }
        debug!(pattern = kind.name(), "column validated");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::Bar;

    fn closes(values: &[f64]) -> Vec<Bar> {
        values
            .iter()
            .enumerate()
            .map(|(i, c)| Bar::new(i as i64, *c, c + 1.0, c - 1.0, *c, None).unwrap())
            .collect()
    }

    fn matched(kind: PatternKind, index: usize) -> PatternInstance {
        PatternInstance {
            kind,
            start_index: index + 1 - kind.bar_count(),
            end_index: index,
            trend_strength: Some(-0.5),
            relative_sizes: vec![0.5; kind.bar_count()],
            is_pattern: Some(true),
        }
    }

    fn bracket(entry: f64, take_profit: f64, stop_loss: f64) -> Bracket {
        Bracket {
            entry,
            take_profit,
            stop_loss,
        }
    }

    #[test]
    fn test_resolve_win_on_third_bar() {
        let bars = closes(&[100.0, 95.0, 105.0, 115.0]);
        let res = resolve(&bars, 0, Direction::Bullish, &bracket(100.0, 110.0, 90.0));
        assert_eq!(res, Resolution::Win { bars: 3 });
        assert_eq!(res.is_valid(), Some(true));
    }

    #[test]
    fn test_resolve_unresolved_counts_steps() {
        let bars = closes(&[100.0, 101.0, 102.0, 103.0]);
        let res = resolve(&bars, 0, Direction::Bullish, &bracket(100.0, 110.0, 90.0));
        assert_eq!(res, Resolution::Unresolved { bars: 3 });
        assert_eq!(res.is_valid(), None);
    }

    #[test]
    fn test_resolve_loss_and_bearish_mirror() {
        let bars = closes(&[100.0, 95.0, 89.0]);
        assert_eq!(
            resolve(&bars, 0, Direction::Bullish, &bracket(100.0, 110.0, 90.0)),
            Resolution::Loss { bars: 2 }
        );
        // bearish: target below, stop above
        assert_eq!(
            resolve(&bars, 0, Direction::Bearish, &bracket(100.0, 90.0, 110.0)),
            Resolution::Win { bars: 2 }
        );
        assert_eq!(
            resolve(&bars, 2, Direction::Bearish, &bracket(89.0, 80.0, 95.0)),
            Resolution::Unresolved { bars: 0 }
        );
    }

    #[test]
    fn test_high_low_bracket_window() {
        let validator = OutcomeValidator::new(ValidatorConfig {
            past_window: Period::new(3).unwrap(),
            ..Default::default()
        })
        .unwrap();
        let bars = closes(&[100.0, 104.0, 98.0, 101.0]);
        assert_eq!(validator.bracket(&bars, 1, Direction::Bullish), None);
        // window = bars 1..=3: high 105, low 97
        let b = validator.bracket(&bars, 3, Direction::Bullish).unwrap();
        assert_eq!((b.entry, b.take_profit, b.stop_loss), (101.0, 105.0, 97.0));
        let b = validator.bracket(&bars, 3, Direction::Bearish).unwrap();
        assert_eq!((b.take_profit, b.stop_loss), (97.0, 105.0));
    }

    #[test]
    fn test_widening_meets_ratio() {
        let validator = OutcomeValidator::new(ValidatorConfig {
            past_window: Period::new(3).unwrap(),
            wl_ratio: 2.0,
            ..Default::default()
        })
        .unwrap();
        // entry 101, high 105 (reward 4), low 97 (risk 4) => target 101 + 8
        let mut values = vec![100.0, 104.0, 98.0, 101.0];
        values.extend([103.0, 106.0, 109.0]);
        let bars = closes(&values);
        let v = validator.validate_instance(&bars, &matched(PatternKind::Hammer, 3));
        assert_eq!(v.take_profit, Some(109.0));
        assert_eq!(v.stop_loss, Some(97.0));
        assert_eq!(v.win_loss_ratio, Some(2.0));
        assert_eq!(v.is_valid, Some(true));
        assert_eq!(v.bars_to_resolution, Some(3));
    }

    #[test]
    fn test_wide_side_is_not_narrowed() {
        let validator = OutcomeValidator::new(ValidatorConfig {
            past_window: Period::new(3).unwrap(),
            wl_ratio: 0.5,
            ..Default::default()
        })
        .unwrap();
        let bars = closes(&[100.0, 104.0, 98.0, 101.0, 102.0]);
        let v = validator.validate_instance(&bars, &matched(PatternKind::Hammer, 3));
        assert_eq!(v.take_profit, Some(105.0));
        assert_eq!(v.is_valid, None);
        assert_eq!(v.bars_to_resolution, Some(1));
    }

    #[test]
    fn test_degenerate_bracket() {
        let validator = OutcomeValidator::new(ValidatorConfig {
            past_window: Period::new(2).unwrap(),
            ..Default::default()
        })
        .unwrap();
        // entry bar closes on its own high, which is the window high
        let bars = vec![
            Bar::new(0, 10.0, 10.5, 9.0, 10.0, None).unwrap(),
            Bar::new(1, 10.0, 11.0, 9.5, 11.0, None).unwrap(),
            Bar::new(2, 11.0, 13.0, 10.5, 12.5, None).unwrap(),
        ];
        let v = validator.validate_instance(&bars, &matched(PatternKind::BullishMarubozu, 1));
        assert_eq!(v.is_valid, Some(false));
        assert_eq!(v.bars_to_resolution, Some(0));
        assert_eq!(v.take_profit, Some(11.0));
    }

    #[test]
    fn test_atr_bracket() {
        let validator = OutcomeValidator::new(ValidatorConfig {
            mode: BracketMode::Atr,
            atr_window: Period::new(2).unwrap(),
            wl_ratio: 1.5,
            ..Default::default()
        })
        .unwrap();
        // every bar spans 2 with flat closes, so ATR = 2
        let bars = closes(&[50.0, 50.0, 50.0, 52.0, 53.0]);
        assert_eq!(validator.bracket(&bars, 1, Direction::Bullish), None);
        let b = validator.bracket(&bars, 2, Direction::Bullish).unwrap();
        assert_eq!((b.take_profit, b.stop_loss), (53.0, 48.0));
        let b = validator.bracket(&bars, 2, Direction::Bearish).unwrap();
        assert_eq!((b.take_profit, b.stop_loss), (47.0, 52.0));

        let v = validator.validate_instance(&bars, &matched(PatternKind::Hammer, 2));
        assert_eq!(v.is_valid, Some(true));
        assert_eq!(v.bars_to_resolution, Some(2));
        assert_eq!(v.win_loss_ratio, Some(1.5));
    }

    #[test]
    fn test_unmatched_instance_is_not_validated() {
        let validator = OutcomeValidator::default();
        let bars = closes(&[100.0; 20]);
        let mut instance = matched(PatternKind::Hammer, 15);
        instance.is_pattern = Some(false);
        assert_eq!(validator.validate_instance(&bars, &instance), Validation::default());
        instance.is_pattern = None;
        assert_eq!(validator.validate_instance(&bars, &instance), Validation::default());
    }

    #[test]
    fn test_config_checks() {
        assert!(OutcomeValidator::new(ValidatorConfig {
            wl_ratio: -1.0,
            ..Default::default()
        })
        .is_err());
        assert_eq!("ATR".parse::<BracketMode>().unwrap(), BracketMode::Atr);
        assert!(matches!("donchian".parse::<BracketMode>(), Err(PatternError::UnknownMode(_))));

        let config = ValidatorConfig::from_json(r#"{"mode": "atr", "wl_ratio": 2.0}"#).unwrap();
        assert_eq!(config.mode, BracketMode::Atr);
        assert_eq!(config.past_window.get(), 10);
        assert_eq!(config.atr_window.get(), 14);
        assert!(ValidatorConfig::from_json(r#"{"past_window": 0}"#).is_err());
        assert!(ValidatorConfig::from_json(r#"{"wl_ratio": 0.0}"#).is_err());
    }
}
