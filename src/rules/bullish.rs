//! Bullish reversal predicates.
//!
//! Each function sees only the pattern's own bars; the caller has already
//! checked the bar count and applies the trend gate.

use super::{
    helpers::{body_inside, is_strong, near},
    RuleInput,
};
use crate::{
    params::{Threshold::*, Thresholds},
    OHLCVExt, OHLCV,
};

/// Small bullish body at the top of the bar over a long lower shadow
pub fn hammer<T: OHLCV>(input: &RuleInput<'_, T>, th: &Thresholds) -> bool {
    let c = input.current();
    c.is_bullish()
        && c.body_position() >= th[BodyPosition]
        && c.lower_shadow_body_ratio() >= th[LowerShadowRatio]
        && c.upper_shadow_body_ratio() <= th[UpperShadowRatio]
}

/// Opens below the prior bearish close, closes past its mid-body
pub fn piercing<T: OHLCV>(input: &RuleInput<'_, T>, _th: &Thresholds) -> bool {
    let (p, c) = (input.prev(), input.current());
    let mid = p.open() - p.body() / 2.0;
    p.is_bearish()
        && c.is_bullish()
        && c.open() < p.close()
        && c.close() > mid
        && c.close() < p.open()
}

pub fn engulfing<T: OHLCV>(input: &RuleInput<'_, T>, _th: &Thresholds) -> bool {
    let (p, c) = (input.prev(), input.current());
    p.is_bearish() && c.is_bullish() && c.open() < p.close() && c.close() > p.open()
}

/// Large bearish bar, small middle body, large bullish bar
pub fn morning_star<T: OHLCV>(input: &RuleInput<'_, T>, th: &Thresholds) -> bool {
    let (f, p, c) = (input.first(), input.prev(), input.current());
    f.is_bearish()
        && is_strong(f, input.first_size(), th[FirstBodyRatio], th[FirstRelativeSize])
        && p.body_ratio() <= th[PrevBodyRatio]
        && c.is_bullish()
        && is_strong(c, input.size(), th[BodyRatio], th[RelativeSize])
}

pub fn three_white_soldiers<T: OHLCV>(input: &RuleInput<'_, T>, th: &Thresholds) -> bool {
    let (f, p, c) = (input.first(), input.prev(), input.current());
    f.is_bullish()
        && p.is_bullish()
        && c.is_bullish()
        && is_strong(f, input.first_size(), th[FirstBodyRatio], th[FirstRelativeSize])
        && is_strong(p, input.prev_size(), th[PrevBodyRatio], th[PrevRelativeSize])
        && is_strong(c, input.size(), th[BodyRatio], th[RelativeSize])
}

pub fn marubozu<T: OHLCV>(input: &RuleInput<'_, T>, th: &Thresholds) -> bool {
    let c = input.current();
    c.is_bullish() && is_strong(c, input.size(), th[BodyRatio], th[RelativeSize])
}

/// Bullish harami inside a large bearish bar, confirmed by a higher close
pub fn three_inside_up<T: OHLCV>(input: &RuleInput<'_, T>, th: &Thresholds) -> bool {
    let (f, p, c) = (input.first(), input.prev(), input.current());
    f.is_bearish()
        && is_strong(f, input.first_size(), th[FirstBodyRatio], th[FirstRelativeSize])
        && p.is_bullish()
        && body_inside(p, f)
        && c.is_bullish()
        && is_strong(c, input.size(), th[BodyRatio], th[RelativeSize])
        && c.close() > p.close()
}

/// Small bullish bar contained in a large bearish one
pub fn harami<T: OHLCV>(input: &RuleInput<'_, T>, th: &Thresholds) -> bool {
    let (p, c) = (input.prev(), input.current());
    p.is_bearish()
        && is_strong(p, input.prev_size(), th[PrevBodyRatio], th[PrevRelativeSize])
        && c.is_bullish()
        && c.body_ratio() >= th[BodyRatio]
        && input.size() <= th[RelativeSize]
        && c.open() >= p.close()
        && c.close() <= p.open()
}

/// Matching lows under a bearish then small bullish bar
pub fn tweezer_bottom<T: OHLCV>(input: &RuleInput<'_, T>, th: &Thresholds) -> bool {
    let (p, c) = (input.prev(), input.current());
    p.is_bearish()
        && is_strong(p, input.prev_size(), th[PrevBodyRatio], th[PrevRelativeSize])
        && c.is_bullish()
        && c.body_ratio() <= th[BodyRatio]
        && c.body_position() <= th[BodyPosition]
        && near(c.low(), p.low(), th[ExtremeTolerance], p.range())
}
