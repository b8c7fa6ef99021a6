//! Bearish reversal predicates, the mirror images of [`super::bullish`].

use super::{
    helpers::{body_inside, is_strong, near},
    RuleInput,
};
use crate::{
    params::{Threshold::*, Thresholds},
    OHLCVExt, OHLCV,
};

/// Small bearish body at the bottom of the bar under a long upper shadow
pub fn hanging_man<T: OHLCV>(input: &RuleInput<'_, T>, th: &Thresholds) -> bool {
    let c = input.current();
    c.is_bearish()
        && c.body_position() <= th[BodyPosition]
        && c.lower_shadow_body_ratio() <= th[LowerShadowRatio]
        && c.upper_shadow_body_ratio() >= th[UpperShadowRatio]
}

/// Opens above the prior bullish close, closes below its mid-body
pub fn dark_cloud<T: OHLCV>(input: &RuleInput<'_, T>, _th: &Thresholds) -> bool {
    let (p, c) = (input.prev(), input.current());
    let mid = p.open() + p.body() / 2.0;
    p.is_bullish()
        && c.is_bearish()
        && c.open() > p.close()
        && c.close() > p.open()
        && c.close() < mid
}

pub fn engulfing<T: OHLCV>(input: &RuleInput<'_, T>, _th: &Thresholds) -> bool {
    let (p, c) = (input.prev(), input.current());
    p.is_bullish() && c.is_bearish() && c.open() > p.close() && c.close() < p.open()
}

pub fn evening_star<T: OHLCV>(input: &RuleInput<'_, T>, th: &Thresholds) -> bool {
    let (f, p, c) = (input.first(), input.prev(), input.current());
    f.is_bullish()
        && is_strong(f, input.first_size(), th[FirstBodyRatio], th[FirstRelativeSize])
        && p.body_ratio() <= th[PrevBodyRatio]
        && c.is_bearish()
        && is_strong(c, input.size(), th[BodyRatio], th[RelativeSize])
}

pub fn three_black_crows<T: OHLCV>(input: &RuleInput<'_, T>, th: &Thresholds) -> bool {
    let (f, p, c) = (input.first(), input.prev(), input.current());
    f.is_bearish()
        && p.is_bearish()
        && c.is_bearish()
        && is_strong(f, input.first_size(), th[FirstBodyRatio], th[FirstRelativeSize])
        && is_strong(p, input.prev_size(), th[PrevBodyRatio], th[PrevRelativeSize])
        && is_strong(c, input.size(), th[BodyRatio], th[RelativeSize])
}

pub fn marubozu<T: OHLCV>(input: &RuleInput<'_, T>, th: &Thresholds) -> bool {
    let c = input.current();
    c.is_bearish() && is_strong(c, input.size(), th[BodyRatio], th[RelativeSize])
}

pub fn three_inside_down<T: OHLCV>(input: &RuleInput<'_, T>, th: &Thresholds) -> bool {
    let (f, p, c) = (input.first(), input.prev(), input.current());
    f.is_bullish()
        && is_strong(f, input.first_size(), th[FirstBodyRatio], th[FirstRelativeSize])
        && p.is_bearish()
        && body_inside(p, f)
        && c.is_bearish()
        && is_strong(c, input.size(), th[BodyRatio], th[RelativeSize])
        && c.close() < p.close()
}

pub fn harami<T: OHLCV>(input: &RuleInput<'_, T>, th: &Thresholds) -> bool {
    let (p, c) = (input.prev(), input.current());
    p.is_bullish()
        && is_strong(p, input.prev_size(), th[PrevBodyRatio], th[PrevRelativeSize])
        && c.is_bearish()
        && c.body_ratio() >= th[BodyRatio]
        && input.size() <= th[RelativeSize]
        && c.open() <= p.close()
        && c.close() >= p.open()
}

/// Matching highs over a bullish then small bearish bar
pub fn tweezer_top<T: OHLCV>(input: &RuleInput<'_, T>, th: &Thresholds) -> bool {
    let (p, c) = (input.prev(), input.current());
    p.is_bullish()
        && is_strong(p, input.prev_size(), th[PrevBodyRatio], th[PrevRelativeSize])
        && c.is_bearish()
        && c.body_ratio() <= th[BodyRatio]
        && c.body_position() >= th[BodyPosition]
        && near(c.high(), p.high(), th[ExtremeTolerance], p.range())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bar::Bar, params::ParameterSet, rules::PatternKind};

    /// Bar reflected around price 100
    fn flipped(o: f64, h: f64, l: f64, c: f64) -> Bar {
        Bar::new(0, 200.0 - o, 200.0 - l, 200.0 - h, 200.0 - c, None).unwrap()
    }

    fn check(kind: PatternKind, bars: &[Bar], sizes: &[f64]) -> bool {
        let th = ParameterSet::default().resolve(kind).unwrap();
        (kind.rule::<Bar>())(&RuleInput::new(bars, sizes), &th)
    }

    #[test]
    fn test_hanging_man() {
        assert!(check(PatternKind::HangingMan, &[flipped(60.0, 60.6, 58.0, 60.5)], &[0.5]));
        assert!(!check(PatternKind::HangingMan, &[flipped(60.0, 62.0, 58.0, 60.5)], &[0.5]));
        assert!(!check(PatternKind::Hammer, &[flipped(60.0, 60.6, 58.0, 60.5)], &[0.5]));
    }

    #[test]
    fn test_dark_cloud() {
        let prior = flipped(20.0, 20.5, 15.5, 16.0);
        assert!(check(PatternKind::DarkCloud, &[prior, flipped(15.0, 19.5, 14.5, 19.0)], &[0.5, 0.5]));
        assert!(!check(PatternKind::DarkCloud, &[prior, flipped(15.0, 17.5, 14.5, 17.0)], &[0.5, 0.5]));
    }

    #[test]
    fn test_engulfing() {
        let bars = [flipped(10.0, 10.5, 7.5, 8.0), flipped(7.0, 11.5, 6.5, 11.0)];
        assert!(check(PatternKind::BearishEngulfing, &bars, &[0.3, 0.6]));
        assert!(!check(PatternKind::BullishEngulfing, &bars, &[0.3, 0.6]));
    }

    #[test]
    fn test_evening_star() {
        let bars = [
            flipped(20.0, 20.5, 13.5, 14.0),
            flipped(13.5, 14.5, 12.5, 13.8),
            flipped(14.0, 20.5, 13.8, 20.0),
        ];
        assert!(check(PatternKind::EveningStar, &bars, &[0.8, 0.1, 0.8]));
        assert!(!check(PatternKind::EveningStar, &bars, &[0.8, 0.1, 0.2]));
    }

    #[test]
    fn test_three_black_crows() {
        let bars = [
            flipped(10.0, 12.2, 9.8, 12.0),
            flipped(11.8, 14.2, 11.6, 14.0),
            flipped(13.8, 16.2, 13.6, 16.0),
        ];
        assert!(check(PatternKind::ThreeBlackCrows, &bars, &[0.5, 0.5, 0.5]));
        assert!(!check(PatternKind::ThreeWhiteSoldiers, &bars, &[0.5, 0.5, 0.5]));
    }

    #[test]
    fn test_marubozu() {
        assert!(check(PatternKind::BearishMarubozu, &[flipped(10.0, 15.1, 9.9, 15.0)], &[0.9]));
        assert!(!check(PatternKind::BearishMarubozu, &[flipped(10.0, 17.0, 8.0, 15.0)], &[0.9]));
    }

    #[test]
    fn test_three_inside_down() {
        let bars = [
            flipped(20.0, 20.5, 13.5, 14.0),
            flipped(15.0, 17.5, 14.5, 17.0),
            flipped(17.0, 21.5, 16.5, 21.0),
        ];
        assert!(check(PatternKind::ThreeInsideDown, &bars, &[0.8, 0.2, 0.8]));
    }

    #[test]
    fn test_harami() {
        let bars = [flipped(20.0, 20.5, 9.5, 10.0), flipped(12.0, 16.5, 11.5, 16.0)];
        assert!(check(PatternKind::BearishHarami, &bars, &[0.9, 0.4]));
        assert!(!check(PatternKind::BearishHarami, &bars, &[0.9, 0.9]));
    }

    #[test]
    fn test_tweezer_top() {
        let bars = [flipped(20.0, 20.5, 9.5, 10.0), flipped(10.0, 14.0, 9.6, 11.0)];
        assert!(check(PatternKind::TweezerTop, &bars, &[0.9, 0.3]));
        let apart = [bars[0], flipped(12.0, 16.0, 11.5, 13.0)];
        assert!(!check(PatternKind::TweezerTop, &apart, &[0.9, 0.3]));
    }
}
