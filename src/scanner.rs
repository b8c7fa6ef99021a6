//! Pattern Scanner
//!
//! The detection pass. Every selected pattern is evaluated at every index
//! of the sequence. The result is a [`DetectionTable`] with one row per bar
//! and one column per pattern.
//!
//! The trend for a pattern is read at its oldest constituent bar. For
//! example, a three-bar pattern ending at `i` uses the trend over the
//! window ending just before `i - 2`. Relative sizes come from one scaler
//! fitted on the ranges of the whole sequence before any rule runs.

use std::{
    fmt,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::{
    params::{ParameterSet, Thresholds},
    rules::{PatternKind, RuleInput},
    scaler::{Scaler, ScalerKind},
    trend::trend_strength,
    Direction, OHLCVExt, PatternError, Result, OHLCV,
};

// ============================================================
// SELECTION
// ============================================================

/// Which side of the catalog to scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    #[default]
    All,
    Bullish,
    Bearish,
}

impl Selection {
    pub fn includes(self, kind: PatternKind) -> bool {
        match self {
            Selection::All => true,
            Selection::Bullish => kind.direction() == Direction::Bullish,
            Selection::Bearish => kind.direction() == Direction::Bearish,
        }
    }

    /// Selected patterns in catalog order
    pub fn kinds(self) -> Vec<PatternKind> {
        PatternKind::ALL
            .iter()
            .copied()
            .filter(|kind| self.includes(*kind))
            .collect()
    }
}

impl FromStr for Selection {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Selection::All),
            "bullish" => Ok(Selection::Bullish),
            "bearish" => Ok(Selection::Bearish),
            other => Err(PatternError::UnknownMode(format!("selection `{other}`"))),
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Selection::All => "all",
            Selection::Bullish => "bullish",
            Selection::Bearish => "bearish",
        })
    }
}

// ============================================================
// CANCELLATION
// ============================================================

/// Cooperative stop signal, checked between index iterations.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PatternError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ============================================================
// DETECTION OUTPUT
// ============================================================

/// One evaluation of one pattern at one index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternInstance {
    pub kind: PatternKind,
    /// Oldest constituent bar, where the trend is anchored
    pub start_index: usize,
    /// Newest constituent bar, the row of the detection table
    pub end_index: usize,
    /// `None` when too little history precedes `start_index`
    pub trend_strength: Option<f64>,
    /// Relative size of each constituent bar, oldest first
    pub relative_sizes: Vec<f64>,
    /// Tri-state: `None` when the trend is undefined
    pub is_pattern: Option<bool>,
}

impl PatternInstance {
    #[inline]
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.kind.direction()
    }

    #[inline]
    pub fn is_match(&self) -> bool {
        self.is_pattern == Some(true)
    }

    /// The constituent bars, oldest first. Empty if `bars` is not the
    /// sequence this instance was detected in.
    pub fn constituent_bars<'a, T>(&self, bars: &'a [T]) -> &'a [T] {
        bars.get(self.start_index..=self.end_index).unwrap_or(&[])
    }
}

/// Cell of a [`DetectionTable`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Detection {
    /// The pattern's bars do not all exist at this index
    Undefined,
    /// Compact mode: only the tri-state outcome
    Flag(Option<bool>),
    Instance(PatternInstance),
}

impl Detection {
    pub fn is_pattern(&self) -> Option<bool> {
        match self {
            Detection::Undefined => None,
            Detection::Flag(flag) => *flag,
            Detection::Instance(instance) => instance.is_pattern,
        }
    }

    pub fn instance(&self) -> Option<&PatternInstance> {
        match self {
            Detection::Instance(instance) => Some(instance),
            _ => None,
        }
    }
}

/// Rows = bar index, columns = pattern, in catalog order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionTable {
    len: usize,
    compact: bool,
    columns: Vec<(PatternKind, Vec<Detection>)>,
}

impl DetectionTable {
    /// Number of rows (the sequence length)
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether cells hold flags instead of instances
    pub fn is_compact(&self) -> bool {
        self.compact
    }

    pub fn kinds(&self) -> impl Iterator<Item = PatternKind> + '_ {
        self.columns.iter().map(|(kind, _)| *kind)
    }

    pub fn columns(&self) -> impl Iterator<Item = (PatternKind, &[Detection])> {
        self.columns.iter().map(|(kind, cells)| (*kind, cells.as_slice()))
    }

    pub fn column(&self, kind: PatternKind) -> Option<&[Detection]> {
        self.columns
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, cells)| cells.as_slice())
    }

    pub fn get(&self, index: usize, kind: PatternKind) -> Option<&Detection> {
        self.column(kind)?.get(index)
    }

    /// Indices where `kind` matched
    pub fn matches(&self, kind: PatternKind) -> Vec<usize> {
        self.column(kind)
            .map(|cells| {
                cells
                    .iter()
                    .enumerate()
                    .filter(|(_, cell)| cell.is_pattern() == Some(true))
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Matched instances of every column
    pub fn instances(&self) -> impl Iterator<Item = &PatternInstance> {
        self.columns
            .iter()
            .flat_map(|(_, cells)| cells.iter())
            .filter_map(Detection::instance)
            .filter(|instance| instance.is_match())
    }

    /// Same table reduced to flags
    pub fn to_flags(&self) -> DetectionTable {
        let columns = self
            .columns
            .iter()
            .map(|(kind, cells)| {
                let flags = cells.iter().map(|cell| Detection::Flag(cell.is_pattern())).collect();
                (*kind, flags)
            })
            .collect();
        DetectionTable {
            len: self.len,
            compact: true,
            columns,
        }
    }
}

// ============================================================
// SCANNER
// ============================================================

/// Drives the rule set over a sequence
#[derive(Debug, Clone, Default)]
pub struct PatternScanner {
    params: ParameterSet,
    scaler: ScalerKind,
}

impl PatternScanner {
    pub fn new(params: ParameterSet, scaler: ScalerKind) -> Self {
        Self { params, scaler }
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn scaler_kind(&self) -> ScalerKind {
        self.scaler
    }

    /// Fit this scanner's scaler on the bar ranges of `bars`
    pub fn fit_scaler<T: OHLCV>(&self, bars: &[T]) -> Result<Scaler> {
        let ranges: Vec<f64> = bars.iter().map(|bar| bar.range()).collect();
        self.scaler.fit(&ranges)
    }

    pub fn scan<T: OHLCV + Sync>(
        &self,
        bars: &[T],
        selection: Selection,
        compact: bool,
    ) -> Result<DetectionTable> {
        self.scan_with_cancel(bars, selection, compact, &CancelFlag::new())
    }

    pub fn scan_with_cancel<T: OHLCV + Sync>(
        &self,
        bars: &[T],
        selection: Selection,
        compact: bool,
        cancel: &CancelFlag,
    ) -> Result<DetectionTable> {
        let kinds = selection.kinds();
        // resolve first: a missing key beats a scaler error
        self.resolve_all(&kinds, bars.len())?;
        let scaler = self.fit_scaler(bars)?;
        self.scan_kinds(bars, &kinds, compact, &scaler, cancel)
    }

    /// Scan the given patterns with an already fitted scaler, e.g. one
    /// loaded from disk to score a sequence on another sequence's scale.
    #[instrument(skip_all, fields(bars = bars.len(), patterns = kinds.len(), compact = compact))]
    pub fn scan_kinds<T: OHLCV + Sync>(
        &self,
        bars: &[T],
        kinds: &[PatternKind],
        compact: bool,
        scaler: &Scaler,
        cancel: &CancelFlag,
    ) -> Result<DetectionTable> {
        let resolved = self.resolve_all(kinds, bars.len())?;
        let sizes: Vec<f64> = bars.iter().map(|bar| scaler.normalize(bar.range())).collect();

        info!(scaler = %scaler.kind(), "scan started");

        let columns = resolved
            .par_iter()
            .map(|(kind, thresholds)| {
                scan_column(bars, &sizes, *kind, thresholds, compact, cancel)
                    .map(|cells| (*kind, cells))
            })
            .collect::<Result<Vec<_>>>()?;

        let matched: usize = columns
            .iter()
            .map(|(_, cells)| cells.iter().filter(|c| c.is_pattern() == Some(true)).count())
            .sum();
        info!(matched, "scan finished");

        Ok(DetectionTable {
            len: bars.len(),
            compact,
            columns,
        })
    }

    fn resolve_all(&self, kinds: &[PatternKind], len: usize) -> Result<Vec<(PatternKind, Thresholds)>> {
        kinds
            .iter()
            .map(|kind| -> Result<(PatternKind, Thresholds)> {
                let thresholds = self.params.resolve(*kind)?;
                let window = thresholds.trend_window().get();
                if window > len {
                    return Err(PatternError::InvalidConfig(format!(
                        "trend window {} of `{}` exceeds sequence length {}",
                        window,
                        kind.name(),
                        len
                    )));
                }
                Ok((*kind, thresholds))
            })
            .collect()
    }
}

fn scan_column<T: OHLCV>(
    bars: &[T],
    sizes: &[f64],
    kind: PatternKind,
    thresholds: &Thresholds,
    compact: bool,
    cancel: &CancelFlag,
) -> Result<Vec<Detection>> {
    let span = kind.bar_count();
    let mut cells = Vec::with_capacity(bars.len());
    let mut matched = 0usize;

    for index in 0..bars.len() {
        cancel.check()?;

        if index + 1 < span {
            cells.push(if compact { Detection::Flag(None) } else { Detection::Undefined });
            continue;
        }

        let start = index + 1 - span;
        let trend = trend_strength(bars, Some(start), thresholds.trend_window())?;
        let window = &sizes[start..=index];
        let is_pattern = kind.evaluate(&RuleInput::new(&bars[start..=index], window), trend, thresholds);
        if is_pattern == Some(true) {
            matched += 1;
        }

        cells.push(if compact {
            Detection::Flag(is_pattern)
        } else {
            Detection::Instance(PatternInstance {
                kind,
                start_index: start,
                end_index: index,
                trend_strength: trend,
                relative_sizes: window.to_vec(),
                is_pattern,
            })
        });
    }

    debug!(pattern = kind.name(), matched, "column scanned");
    Ok(cells)
}
