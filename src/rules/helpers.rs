//! Geometry shared by the bullish and bearish predicates.

use crate::{OHLCVExt, OHLCV};

/// Lower edge of the real body
#[inline]
pub fn body_low<T: OHLCV>(bar: &T) -> f64 {
    bar.open().min(bar.close())
}

/// Upper edge of the real body
#[inline]
pub fn body_high<T: OHLCV>(bar: &T) -> f64 {
    bar.open().max(bar.close())
}

/// `inner`'s real body lies within `outer`'s, edges included
#[inline]
pub fn body_inside<T: OHLCV>(inner: &T, outer: &T) -> bool {
    body_low(inner) >= body_low(outer) && body_high(inner) <= body_high(outer)
}

/// Body share and relative size both at least their minimums
#[inline]
pub fn is_strong<T: OHLCV>(bar: &T, size: f64, min_body_ratio: f64, min_size: f64) -> bool {
    bar.body_ratio() >= min_body_ratio && size >= min_size
}

/// `a` and `b` are no further apart than `tolerance` times `scale`
#[inline]
pub fn near(a: f64, b: f64, tolerance: f64, scale: f64) -> bool {
    (a - b).abs() <= tolerance * scale
}
