//! Per-pattern track record over a validated sequence.

use serde::{Deserialize, Serialize};

use crate::{
    rules::PatternKind,
    validator::{ValidatedPattern, ValidationTable},
};

/// Win/loss summary of one pattern column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    pub kind: PatternKind,
    /// Instances with `is_pattern == Some(true)`
    pub detected: usize,
    pub wins: usize,
    /// Includes degenerate brackets, which resolve as losses in zero bars
    pub losses: usize,
    /// Bracket built but the sequence ended before either side was hit
    pub unresolved: usize,
    /// Too little history to build a bracket
    pub undefined: usize,
    /// `wins / (wins + losses)`; `None` before anything resolved
    pub win_rate: Option<f64>,
    /// Mean bars to resolution over wins and losses
    pub mean_bars_to_resolution: Option<f64>,
}

impl PatternStats {
    pub fn from_cells(kind: PatternKind, cells: &[Option<ValidatedPattern>]) -> Self {
        let mut stats = PatternStats {
            kind,
            detected: 0,
            wins: 0,
            losses: 0,
            unresolved: 0,
            undefined: 0,
            win_rate: None,
            mean_bars_to_resolution: None,
        };
        let mut resolved_bars = 0usize;

        for cell in cells.iter().flatten().filter(|c| c.instance.is_match()) {
            stats.detected += 1;
            let v = &cell.validation;
            match (v.is_valid, v.bars_to_resolution) {
                (Some(won), bars) => {
                    if won {
                        stats.wins += 1;
                    } else {
                        stats.losses += 1;
                    }
                    resolved_bars += bars.unwrap_or(0);
                },
                (None, Some(_)) => stats.unresolved += 1,
                (None, None) => stats.undefined += 1,
            }
        }

        let resolved = stats.resolved();
        if resolved > 0 {
            stats.win_rate = Some(stats.wins as f64 / resolved as f64);
            stats.mean_bars_to_resolution = Some(resolved_bars as f64 / resolved as f64);
        }
        stats
    }

    /// Wins plus losses
    pub fn resolved(&self) -> usize {
        self.wins + self.losses
    }
}

/// One summary per column of `table`, in column order.
pub fn summarize(table: &ValidationTable) -> Vec<PatternStats> {
    table
        .columns()
        .map(|(kind, cells)| PatternStats::from_cells(kind, cells))
        .collect()
}
