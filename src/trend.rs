//! Trend Estimator
//!
//! Directional strength over a trailing window, weighted by body size:
//! bullish bodies count positive, bearish bodies negative, doji bodies add
//! nothing. The result lies in [-1, 1].

use crate::{CandleType, OHLCVExt, PatternError, Period, Result, OHLCV};

/// Trend strength over bars `[index - window, index)`.
///
/// `index` is `None` when the caller's anchor fell before the start of the
/// sequence. Returns `Ok(None)` when fewer than `window` bars precede the
/// index, and an error when the window cannot fit the sequence at all.
pub fn trend_strength<T: OHLCV>(
    bars: &[T],
    index: Option<usize>,
    window: Period,
) -> Result<Option<f64>> {
    let window = window.get();
    if window > bars.len() {
        return Err(PatternError::InvalidConfig(format!(
            "trend window {} exceeds sequence length {}",
            window,
            bars.len()
        )));
    }
    let Some(index) = index else {
        return Ok(None);
    };
    if index < window || index > bars.len() {
        return Ok(None);
    }

    let (signed, total) = bars[index - window..index]
        .iter()
        .fold((0.0, 0.0), |(signed, total), bar| {
            let body = bar.body();
            match bar.candle_type() {
                CandleType::Bullish => (signed + body, total + body),
                CandleType::Bearish => (signed - body, total + body),
                CandleType::Doji => (signed, total + body),
            }
        });

    if total <= 0.0 {
        return Ok(Some(0.0));
    }
    Ok(Some((signed / total).clamp(-1.0, 1.0)))
}

/// Fixed-window trend estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendEstimator {
    pub window: Period,
}

impl Default for TrendEstimator {
    fn default() -> Self {
        Self {
            window: Period::new_const(10),
        }
    }
}

impl TrendEstimator {
    pub fn new(window: Period) -> Self {
        Self { window }
    }

    #[inline]
    pub fn strength<T: OHLCV>(&self, bars: &[T], index: Option<usize>) -> Result<Option<f64>> {
        trend_strength(bars, index, self.window)
    }

    /// Strength at every index; `None` where history is too short.
    pub fn series<T: OHLCV>(&self, bars: &[T]) -> Result<Vec<Option<f64>>> {
        (0..bars.len()).map(|i| self.strength(bars, Some(i))).collect()
    }
}
