//! Size Normalizer
//!
//! Bar range sizes are expressed relative to the size distribution of the
//! whole sequence before any pattern is evaluated. Two strategies are
//! available; both are described by two numbers that can be saved and
//! restored to score another sequence on the same scale.

use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{PatternError, Result};

/// Fit-once, normalize-many scaling of a scalar distribution
pub trait SizeNormalizer: Sized {
    /// Fit on the full population of values
    fn fit(values: &[f64]) -> Result<Self>;

    /// Scale one value against the fitted distribution
    fn normalize(&self, value: f64) -> f64;

    /// The two fitted parameters
    fn params(&self) -> (f64, f64);

    /// Rebuild from saved parameters
    fn from_params(a: f64, b: f64) -> Result<Self>;
}

fn check_values(values: &[f64]) -> Result<()> {
    if values.is_empty() {
        return Err(PatternError::InsufficientData { need: 1, got: 0 });
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(PatternError::InvalidValue("non-finite value in scaler input"));
    }
    Ok(())
}

/// `(value - mean) / std` with population statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardScaler {
    mean: f64,
    std: f64,
}

impl StandardScaler {
    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std(&self) -> f64 {
        self.std
    }
}

impl SizeNormalizer for StandardScaler {
    fn fit(values: &[f64]) -> Result<Self> {
        check_values(values)?;
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self::from_params(mean, var.sqrt())
    }

    #[inline]
    fn normalize(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }

    fn params(&self) -> (f64, f64) {
        (self.mean, self.std)
    }

    fn from_params(mean: f64, std: f64) -> Result<Self> {
        if !mean.is_finite() || !std.is_finite() {
            return Err(PatternError::InvalidValue("scaler parameters must be finite"));
        }
        if std <= 0.0 {
            return Err(PatternError::ZeroDeviation {
                field: "standard deviation",
            });
        }
        Ok(Self { mean, std })
    }
}

/// `(value - min) / (max - min)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMaxScaler {
    min: f64,
    max: f64,
}

impl MinMaxScaler {
    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

impl SizeNormalizer for MinMaxScaler {
    fn fit(values: &[f64]) -> Result<Self> {
        check_values(values)?;
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        Self::from_params(min, max)
    }

    #[inline]
    fn normalize(&self, value: f64) -> f64 {
        (value - self.min) / (self.max - self.min)
    }

    fn params(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    fn from_params(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(PatternError::InvalidValue("scaler parameters must be finite"));
        }
        if max <= min {
            return Err(PatternError::ZeroDeviation { field: "min-max range" });
        }
        Ok(Self { min, max })
    }
}

/// Which scaling strategy a scan uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerKind {
    Standard,
    #[default]
    MinMax,
}

impl ScalerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScalerKind::Standard => "standard",
            ScalerKind::MinMax => "min_max",
        }
    }

    pub fn fit(self, values: &[f64]) -> Result<Scaler> {
        Ok(match self {
            ScalerKind::Standard => Scaler::Standard(StandardScaler::fit(values)?),
            ScalerKind::MinMax => Scaler::MinMax(MinMaxScaler::fit(values)?),
        })
    }
}

impl FromStr for ScalerKind {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "standard" | "z_score" | "zscore" => Ok(ScalerKind::Standard),
            "min_max" | "minmax" => Ok(ScalerKind::MinMax),
            other => Err(PatternError::UnknownMode(format!("scaler `{other}`"))),
        }
    }
}

impl fmt::Display for ScalerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fitted scaler of either kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scaler {
    Standard(StandardScaler),
    MinMax(MinMaxScaler),
}

/// Persisted form: the kind and its two parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct ScalerRecord {
    kind: ScalerKind,
    a: f64,
    b: f64,
}

impl Scaler {
    #[inline]
    pub fn normalize(&self, value: f64) -> f64 {
        match self {
            Scaler::Standard(s) => s.normalize(value),
            Scaler::MinMax(s) => s.normalize(value),
        }
    }

    pub fn kind(&self) -> ScalerKind {
        match self {
            Scaler::Standard(_) => ScalerKind::Standard,
            Scaler::MinMax(_) => ScalerKind::MinMax,
        }
    }

    pub fn params(&self) -> (f64, f64) {
        match self {
            Scaler::Standard(s) => s.params(),
            Scaler::MinMax(s) => s.params(),
        }
    }

    fn from_record(record: ScalerRecord) -> Result<Self> {
        Ok(match record.kind {
            ScalerKind::Standard => Scaler::Standard(StandardScaler::from_params(record.a, record.b)?),
            ScalerKind::MinMax => Scaler::MinMax(MinMaxScaler::from_params(record.a, record.b)?),
        })
    }

    fn record(&self) -> ScalerRecord {
        let (a, b) = self.params();
        ScalerRecord {
            kind: self.kind(),
            a,
            b,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.record())?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_record(serde_json::from_str(json)?)
    }

    /// Write the two parameters to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)?;
        tracing::debug!(path = %path.display(), kind = %self.kind(), "scaler saved");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

impl Serialize for Scaler {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.record().serialize(s)
    }
}

impl<'de> Deserialize<'de> for Scaler {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let record = ScalerRecord::deserialize(d)?;
        Scaler::from_record(record).map_err(serde::de::Error::custom)
    }
}
