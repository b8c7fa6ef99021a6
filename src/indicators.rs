//! Volatility indicators used to size validation brackets.

use crate::{OHLCVExt, OHLCV};

/// True range of bar `index`: the largest of its own range and the gaps to
/// the previous close. The first bar has no previous close, so its true
/// range is its range.
///
/// Returns `None` when `index` is out of bounds.
pub fn true_range<T: OHLCV>(bars: &[T], index: usize) -> Option<f64> {
    let bar = bars.get(index)?;
    let range = bar.range();
    if index == 0 {
        return Some(range);
    }
    let prev_close = bars[index - 1].close();
    Some(
        range
            .max((bar.high() - prev_close).abs())
            .max((bar.low() - prev_close).abs()),
    )
}

/// Average true range over the `window` bars ending at `index` inclusive.
///
/// Needs `window` bars with a previous close, i.e. `index >= window`;
/// `None` otherwise.
pub fn atr<T: OHLCV>(bars: &[T], index: usize, window: usize) -> Option<f64> {
    if window == 0 || index < window || index >= bars.len() {
        return None;
    }
    let sum: f64 = (index + 1 - window..=index)
        .filter_map(|i| true_range(bars, i))
        .sum();
    Some(sum / window as f64)
}
