//! Pattern thresholds: keys, the nested parameter set, and grid metadata
//!
//! A [`ParameterSet`] maps each side (bullish/bearish) to pattern names and
//! each pattern to its named thresholds. Before a pattern is evaluated its
//! map is resolved into a [`Thresholds`] value, so a missing key surfaces as
//! a configuration error up front instead of midway through a scan.
//!
//! # Example
//!
//! ```rust
//! use candlestat::prelude::*;
//!
//! let mut params = ParameterSet::default();
//! params.set(PatternKind::Hammer, Threshold::LowerShadowRatio, 2.0);
//!
//! let resolved = params.resolve(PatternKind::Hammer).unwrap();
//! assert_eq!(resolved[Threshold::LowerShadowRatio], 2.0);
//! assert_eq!(resolved.trend_window().get(), 10);
//! ```

use std::{collections::BTreeMap, fmt, ops::Index, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{rules::PatternKind, Direction, PatternError, Period, Result};

// ============================================================
// THRESHOLD KEYS
// ============================================================

/// Named threshold a pattern rule reads.
///
/// `Body*`/`RelativeSize` keys come in three flavours: unprefixed for the
/// newest bar, `Prev` for the bar before it and `First` for the oldest bar
/// of a three-bar pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Threshold {
  TrendWindow,
  TrendStrength,
  BodyPosition,
  LowerShadowRatio,
  UpperShadowRatio,
  BodyRatio,
  PrevBodyRatio,
  FirstBodyRatio,
  RelativeSize,
  PrevRelativeSize,
  FirstRelativeSize,
  ExtremeTolerance,
}

impl Threshold {
  pub const COUNT: usize = 12;

  pub const ALL: [Threshold; Self::COUNT] = [
    Threshold::TrendWindow,
    Threshold::TrendStrength,
    Threshold::BodyPosition,
    Threshold::LowerShadowRatio,
    Threshold::UpperShadowRatio,
    Threshold::BodyRatio,
    Threshold::PrevBodyRatio,
    Threshold::FirstBodyRatio,
    Threshold::RelativeSize,
    Threshold::PrevRelativeSize,
    Threshold::FirstRelativeSize,
    Threshold::ExtremeTolerance,
  ];

  /// Key used in serialized parameter sets
  pub const fn key(self) -> &'static str {
    match self {
      Threshold::TrendWindow => "trend_window",
      Threshold::TrendStrength => "trend_strength",
      Threshold::BodyPosition => "body_position",
      Threshold::LowerShadowRatio => "lower_shadow_ratio",
      Threshold::UpperShadowRatio => "upper_shadow_ratio",
      Threshold::BodyRatio => "body_ratio",
      Threshold::PrevBodyRatio => "prev_body_ratio",
      Threshold::FirstBodyRatio => "first_body_ratio",
      Threshold::RelativeSize => "relative_size",
      Threshold::PrevRelativeSize => "prev_relative_size",
      Threshold::FirstRelativeSize => "first_relative_size",
      Threshold::ExtremeTolerance => "extreme_tolerance",
    }
  }

  #[inline]
  const fn slot(self) -> usize {
    self as usize
  }

  /// Grid metadata for this key. `default` is a neutral value; per-pattern
  /// defaults come from [`param_meta`].
  pub fn meta(self) -> ParamMeta {
    match self {
      Threshold::TrendWindow => {
        ParamMeta::period(self.key(), 10.0, (5.0, 30.0, 5.0), "Bars in the trailing trend window")
      },
      Threshold::TrendStrength => ParamMeta::scalar(
        self.key(),
        0.0,
        (-1.0, 1.0, 0.1),
        "Trend gate: bullish needs trend <= value, bearish needs trend >= value",
      ),
      Threshold::BodyPosition => ParamMeta::scalar(
        self.key(),
        0.0,
        (-1.0, 1.0, 0.25),
        "Where the body sits inside the bar, -1 bottom to 1 top",
      ),
      Threshold::LowerShadowRatio => {
        ParamMeta::scalar(self.key(), 1.0, (0.0, 3.0, 0.25), "Lower shadow relative to the body")
      },
      Threshold::UpperShadowRatio => {
        ParamMeta::scalar(self.key(), 1.0, (0.0, 3.0, 0.25), "Upper shadow relative to the body")
      },
      Threshold::BodyRatio => {
        ParamMeta::scalar(self.key(), 0.5, (0.0, 1.0, 0.1), "Body share of the newest bar's range")
      },
      Threshold::PrevBodyRatio => {
        ParamMeta::scalar(self.key(), 0.5, (0.0, 1.0, 0.1), "Body share of the previous bar's range")
      },
      Threshold::FirstBodyRatio => {
        ParamMeta::scalar(self.key(), 0.5, (0.0, 1.0, 0.1), "Body share of the oldest bar's range")
      },
      Threshold::RelativeSize => {
        ParamMeta::scalar(self.key(), 0.5, (0.0, 1.0, 0.1), "Scaled range of the newest bar")
      },
      Threshold::PrevRelativeSize => {
        ParamMeta::scalar(self.key(), 0.5, (0.0, 1.0, 0.1), "Scaled range of the previous bar")
      },
      Threshold::FirstRelativeSize => {
        ParamMeta::scalar(self.key(), 0.5, (0.0, 1.0, 0.1), "Scaled range of the oldest bar")
      },
      Threshold::ExtremeTolerance => ParamMeta::scalar(
        self.key(),
        0.1,
        (0.0, 0.5, 0.05),
        "Allowed gap between matching extremes, as a share of the older bar's range",
      ),
    }
  }
}

impl FromStr for Threshold {
  type Err = PatternError;

  fn from_str(s: &str) -> Result<Self> {
    Threshold::ALL
      .into_iter()
      .find(|t| t.key() == s)
      .ok_or_else(|| PatternError::InvalidConfig(format!("unknown threshold key `{s}`")))
  }
}

impl fmt::Display for Threshold {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.key())
  }
}

// ============================================================
// PARAMETER METADATA
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Any finite value
  Scalar,
  /// Positive integer window length
  Period,
}

/// Metadata for a single threshold
#[derive(Debug, Clone, PartialEq)]
pub struct ParamMeta {
  /// Threshold key (e.g., "lower_shadow_ratio")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn scalar(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Scalar, default, range, description }
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  /// Same metadata with another default value
  pub fn with_default(mut self, default: f64) -> Self {
    self.default = default;
    self
  }

  /// Same metadata with another search range
  pub fn with_range(mut self, range: (f64, f64, f64)) -> Self {
    self.range = range;
    self
  }

  /// All values from `min` to `max` inclusive, `step` apart.
  ///
  /// A non-positive step yields `min` alone.
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    if step <= 0.0 || max < min {
      return vec![min];
    }
    // count steps instead of accumulating to keep the last point on `max`
    let n = ((max - min) / step + 1e-9).floor() as usize;
    (0..=n).map(|k| min + k as f64 * step).collect()
  }

  /// Check a value against the type only
  pub fn check_type(&self, value: f64) -> Result<()> {
    if !value.is_finite() {
      return Err(PatternError::InvalidValue("threshold must be finite"));
    }
    match self.param_type {
      ParamType::Scalar => Ok(()),
      ParamType::Period => Period::from_f64(value).map(|_| ()),
    }
  }

  /// Check a value against the range and type
  pub fn validate(&self, value: f64) -> Result<()> {
    self.check_type(value)?;
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(PatternError::OutOfRange { field: self.name, value, min, max });
    }
    Ok(())
  }
}

/// Metadata for every threshold `kind` reads, with that pattern's defaults.
pub fn param_meta(kind: PatternKind) -> Vec<ParamMeta> {
  kind
    .default_thresholds()
    .iter()
    .map(|(key, value)| key.meta().with_default(*value))
    .collect()
}

// ============================================================
// PARAMETER SET
// ============================================================

type PatternMap = BTreeMap<String, BTreeMap<String, f64>>;

/// Nested threshold table: side → pattern name → key → value.
///
/// `Default` carries the built-in table for all 18 patterns. Unknown
/// patterns or keys loaded from a file are kept and ignored by the rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
  #[serde(default)]
  bullish: PatternMap,
  #[serde(default)]
  bearish: PatternMap,
}

impl Default for ParameterSet {
  fn default() -> Self {
    let mut set = Self::empty();
    for kind in PatternKind::ALL {
      for (key, value) in kind.default_thresholds() {
        set.set(*kind, *key, *value);
      }
    }
    set
  }
}

impl ParameterSet {
  /// A set with no patterns at all
  pub fn empty() -> Self {
    Self { bullish: BTreeMap::new(), bearish: BTreeMap::new() }
  }

  fn side(&self, direction: Direction) -> &PatternMap {
    match direction {
      Direction::Bullish => &self.bullish,
      Direction::Bearish => &self.bearish,
    }
  }

  fn side_mut(&mut self, direction: Direction) -> &mut PatternMap {
    match direction {
      Direction::Bullish => &mut self.bullish,
      Direction::Bearish => &mut self.bearish,
    }
  }

  /// Raw threshold map of one pattern
  pub fn pattern(&self, kind: PatternKind) -> Option<&BTreeMap<String, f64>> {
    self.side(kind.direction()).get(kind.name())
  }

  pub fn get(&self, kind: PatternKind, key: Threshold) -> Option<f64> {
    self.pattern(kind)?.get(key.key()).copied()
  }

  /// Override one threshold of one pattern
  pub fn set(&mut self, kind: PatternKind, key: Threshold, value: f64) {
    self
      .side_mut(kind.direction())
      .entry(kind.name().to_string())
      .or_default()
      .insert(key.key().to_string(), value);
  }

  pub fn remove(&mut self, kind: PatternKind, key: Threshold) -> Option<f64> {
    self.side_mut(kind.direction()).get_mut(kind.name())?.remove(key.key())
  }

  /// Replace the whole threshold map of one pattern
  pub fn insert_pattern(&mut self, kind: PatternKind, thresholds: BTreeMap<String, f64>) {
    self.side_mut(kind.direction()).insert(kind.name().to_string(), thresholds);
  }

  /// Look up every threshold `kind` needs.
  ///
  /// Fails with `MissingThreshold` for an absent key and with
  /// `InvalidConfig` for a non-finite value or a fractional trend window.
  pub fn resolve(&self, kind: PatternKind) -> Result<Thresholds> {
    let missing = |key: Threshold| PatternError::MissingThreshold {
      pattern: kind.name().to_string(),
      key: key.key(),
    };
    let map = self.pattern(kind);

    let mut values = [f64::NAN; Threshold::COUNT];
    for key in kind.required_thresholds() {
      let value = map.and_then(|m| m.get(key.key())).copied().ok_or_else(|| missing(*key))?;
      if !value.is_finite() {
        return Err(PatternError::InvalidConfig(format!(
          "threshold `{}` of `{}` is not finite",
          key,
          kind.name()
        )));
      }
      values[key.slot()] = value;
    }

    let window = values[Threshold::TrendWindow.slot()];
    let trend_window = Period::from_f64(window).map_err(|_| {
      PatternError::InvalidConfig(format!(
        "trend_window of `{}` must be a positive integer, got {}",
        kind.name(),
        window
      ))
    })?;

    Ok(Thresholds { values, trend_window })
  }

  pub fn from_json(json: &str) -> Result<Self> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn to_json(&self) -> Result<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let set = Self::from_json(&std::fs::read_to_string(path)?)?;
    tracing::debug!(
      path = %path.display(),
      bullish = set.bullish.len(),
      bearish = set.bearish.len(),
      "parameter set loaded"
    );
    Ok(set)
  }

  pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
    std::fs::write(path, self.to_json()?)?;
    Ok(())
  }
}

// ============================================================
// RESOLVED THRESHOLDS
// ============================================================

/// Thresholds of one pattern, checked complete.
///
/// Indexing by a key the pattern does not read yields NaN, which fails
/// every comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
  values: [f64; Threshold::COUNT],
  trend_window: Period,
}

impl Thresholds {
  #[inline]
  pub fn trend_window(&self) -> Period {
    self.trend_window
  }

  pub fn get(&self, key: Threshold) -> Option<f64> {
    let value = self.values[key.slot()];
    (!value.is_nan()).then_some(value)
  }
}

impl Index<Threshold> for Thresholds {
  type Output = f64;

  #[inline]
  fn index(&self, key: Threshold) -> &f64 {
    &self.values[key.slot()]
  }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_covers_every_pattern() {
    let params = ParameterSet::default();
    for kind in PatternKind::ALL {
      let resolved = params.resolve(*kind).unwrap();
      assert_eq!(resolved.trend_window().get(), 10, "{}", kind.name());
      assert_eq!(resolved[Threshold::TrendStrength], 0.0);
    }
  }

  #[test]
  fn test_default_values() {
    let params = ParameterSet::default();
    assert_eq!(params.get(PatternKind::Hammer, Threshold::LowerShadowRatio), Some(1.75));
    assert_eq!(params.get(PatternKind::HangingMan, Threshold::BodyPosition), Some(-0.25));
    assert_eq!(params.get(PatternKind::TweezerTop, Threshold::BodyPosition), Some(0.25));
    assert_eq!(params.get(PatternKind::BullishHarami, Threshold::RelativeSize), Some(0.7));
    assert_eq!(params.get(PatternKind::Hammer, Threshold::ExtremeTolerance), None);
  }

  #[test]
  fn test_missing_key() {
    let mut params = ParameterSet::default();
    assert_eq!(params.remove(PatternKind::MorningStar, Threshold::FirstRelativeSize), Some(0.3));
    match params.resolve(PatternKind::MorningStar) {
      Err(PatternError::MissingThreshold { pattern, key }) => {
        assert_eq!(pattern, "morning_star");
        assert_eq!(key, "first_relative_size");
      },
      other => panic!("expected MissingThreshold, got {other:?}"),
    }
    // the mirror is untouched
    assert!(params.resolve(PatternKind::EveningStar).is_ok());
  }

  #[test]
  fn test_missing_pattern() {
    let params = ParameterSet::empty();
    assert!(matches!(
      params.resolve(PatternKind::Piercing),
      Err(PatternError::MissingThreshold { .. })
    ));
  }

  #[test]
  fn test_bad_trend_window() {
    let mut params = ParameterSet::default();
    params.set(PatternKind::Hammer, Threshold::TrendWindow, 2.5);
    assert!(matches!(params.resolve(PatternKind::Hammer), Err(PatternError::InvalidConfig(_))));
    params.set(PatternKind::Hammer, Threshold::TrendWindow, 0.0);
    assert!(params.resolve(PatternKind::Hammer).is_err());
  }

  #[test]
  fn test_unread_key_is_nan() {
    let resolved = ParameterSet::default().resolve(PatternKind::Hammer).unwrap();
    assert!(resolved[Threshold::ExtremeTolerance].is_nan());
    assert_eq!(resolved.get(Threshold::ExtremeTolerance), None);
    assert_eq!(resolved.get(Threshold::BodyPosition), Some(0.25));
  }

  #[test]
  fn test_json_round_trip_keeps_unknown_entries() {
    let mut params = ParameterSet::default();
    let mut custom = BTreeMap::new();
    custom.insert("some_key".to_string(), 1.0);
    params.bullish.insert("not_a_pattern".to_string(), custom);

    let restored = ParameterSet::from_json(&params.to_json().unwrap()).unwrap();
    assert_eq!(restored, params);
  }

  #[test]
  fn test_partial_json() {
    let json = r#"{"bullish": {"hammer": {"trend_window": 5, "trend_strength": -0.2,
      "body_position": 0.5, "lower_shadow_ratio": 2.0, "upper_shadow_ratio": 0.25}}}"#;
    let params = ParameterSet::from_json(json).unwrap();
    let hammer = params.resolve(PatternKind::Hammer).unwrap();
    assert_eq!(hammer.trend_window().get(), 5);
    assert!(params.resolve(PatternKind::HangingMan).is_err());
  }

  #[test]
  fn test_threshold_keys() {
    for key in Threshold::ALL {
      assert_eq!(key.key().parse::<Threshold>().unwrap(), key);
      assert_eq!(serde_json::to_string(&key).unwrap(), format!("\"{}\"", key.key()));
    }
    assert!("wick".parse::<Threshold>().is_err());
  }

  #[test]
  fn test_generate_grid() {
    let meta = ParamMeta::scalar("test", 0.5, (0.3, 0.7, 0.2), "Test");
    let grid = meta.generate_grid();
    assert_eq!(grid.len(), 3);
    assert!((grid[0] - 0.3).abs() < 1e-12);
    assert!((grid[1] - 0.5).abs() < 1e-12);
    assert!((grid[2] - 0.7).abs() < 1e-12);

    let tenths = Threshold::BodyRatio.meta().generate_grid();
    assert_eq!(tenths.len(), 11);
    assert!((tenths[10] - 1.0).abs() < 1e-12);

    let flat = meta.with_range((0.2, 0.9, 0.0));
    assert_eq!(flat.generate_grid(), vec![0.2]);
  }

  #[test]
  fn test_validate_meta() {
    let window = Threshold::TrendWindow.meta();
    assert!(window.validate(10.0).is_ok());
    assert!(window.validate(12.5).is_err());
    assert!(window.validate(40.0).is_err());

    let strength = Threshold::TrendStrength.meta();
    assert!(strength.validate(-0.3).is_ok());
    assert!(strength.validate(f64::NAN).is_err());
    assert!(strength.validate(1.5).is_err());
    assert!(strength.check_type(1.5).is_ok());
  }

  #[test]
  fn test_param_meta_uses_pattern_defaults() {
    let meta = param_meta(PatternKind::Hammer);
    let lower = meta.iter().find(|m| m.name == "lower_shadow_ratio").unwrap();
    assert_eq!(lower.default, 1.75);
    assert_eq!(meta.len(), PatternKind::Hammer.required_thresholds().len());
  }

  #[test]
  fn test_save_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("params.json");
    let mut params = ParameterSet::default();
    params.set(PatternKind::DarkCloud, Threshold::TrendStrength, 0.4);
    params.save(&path).unwrap();
    assert_eq!(ParameterSet::load(&path).unwrap(), params);
  }
}
