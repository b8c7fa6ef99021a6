//! Pattern Rule Set
//!
//! Eighteen reversal patterns, nine per side. Each variant of [`PatternKind`]
//! maps to a pure predicate over its 1-3 constituent bars (oldest first),
//! their relative sizes and the pattern's resolved [`Thresholds`].
//!
//! The trend gate is applied centrally by [`PatternKind::evaluate`]: bullish
//! patterns need `trend <= trend_strength` (reversal out of a decline),
//! bearish patterns need `trend >= trend_strength`.
//!
//! | Bullish | Bars | Bearish mirror |
//! |---|---|---|
//! | Hammer | 1 | HangingMan |
//! | Piercing | 2 | DarkCloud |
//! | BullishEngulfing | 2 | BearishEngulfing |
//! | MorningStar | 3 | EveningStar |
//! | ThreeWhiteSoldiers | 3 | ThreeBlackCrows |
//! | BullishMarubozu | 1 | BearishMarubozu |
//! | ThreeInsideUp | 3 | ThreeInsideDown |
//! | BullishHarami | 2 | BearishHarami |
//! | TweezerBottom | 2 | TweezerTop |

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    params::{Threshold, Thresholds},
    Direction, PatternError, Result, OHLCV,
};

pub mod bearish;
pub mod bullish;
pub mod helpers;

/// Signature shared by every pattern predicate
pub type RuleFn<T> = fn(&RuleInput<'_, T>, &Thresholds) -> bool;

// ============================================================
// RULE INPUT
// ============================================================

/// Constituent bars of one candidate pattern, oldest first, with the
/// relative size of each bar in the same order.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a, T> {
    pub bars: &'a [T],
    pub relative_sizes: &'a [f64],
}

impl<'a, T: OHLCV> RuleInput<'a, T> {
    pub fn new(bars: &'a [T], relative_sizes: &'a [f64]) -> Self {
        Self {
            bars,
            relative_sizes,
        }
    }

    #[inline]
    fn last(&self, back: usize) -> usize {
        self.bars.len() - 1 - back
    }

    /// Newest bar
    #[inline]
    pub fn current(&self) -> &T {
        &self.bars[self.last(0)]
    }

    /// Bar before the newest
    #[inline]
    pub fn prev(&self) -> &T {
        &self.bars[self.last(1)]
    }

    /// Oldest bar
    #[inline]
    pub fn first(&self) -> &T {
        &self.bars[0]
    }

    #[inline]
    pub fn size(&self) -> f64 {
        self.relative_sizes[self.last(0)]
    }

    #[inline]
    pub fn prev_size(&self) -> f64 {
        self.relative_sizes[self.last(1)]
    }

    #[inline]
    pub fn first_size(&self) -> f64 {
        self.relative_sizes[0]
    }
}

// ============================================================
// PATTERN CATALOG
// ============================================================

macro_rules! define_patterns {
    (
        $(
            $variant:ident {
                name: $name:literal,
                direction: $direction:ident,
                bars: $bars:literal,
                mirror: $mirror:ident,
                rule: $module:ident :: $rule:ident,
                thresholds: { $($key:ident: $value:expr),* $(,)? } $(,)?
            }
        ),* $(,)?
    ) => {
        /// Every pattern the rule set knows
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum PatternKind {
            $($variant),*
        }

        impl PatternKind {
            /// Catalog order: bullish patterns, then their bearish mirrors
            pub const ALL: &'static [PatternKind] = &[$(PatternKind::$variant),*];

            pub const fn name(self) -> &'static str {
                match self {
                    $(PatternKind::$variant => $name),*
                }
            }

            pub const fn direction(self) -> Direction {
                match self {
                    $(PatternKind::$variant => Direction::$direction),*
                }
            }

            /// Number of constituent bars
            pub const fn bar_count(self) -> usize {
                match self {
                    $(PatternKind::$variant => $bars),*
                }
            }

            /// The same shape on the other side
            pub const fn mirror(self) -> PatternKind {
                match self {
                    $(PatternKind::$variant => PatternKind::$mirror),*
                }
            }

            /// Keys the predicate and the trend gate read
            pub fn required_thresholds(self) -> &'static [Threshold] {
                match self {
                    $(PatternKind::$variant => &[
                        Threshold::TrendWindow,
                        Threshold::TrendStrength,
                        $(Threshold::$key),*
                    ]),*
                }
            }

            /// Built-in values for [`required_thresholds`](Self::required_thresholds)
            pub fn default_thresholds(self) -> &'static [(Threshold, f64)] {
                match self {
                    $(PatternKind::$variant => &[
                        (Threshold::TrendWindow, 10.0),
                        (Threshold::TrendStrength, 0.0),
                        $((Threshold::$key, $value)),*
                    ]),*
                }
            }

            /// Geometric predicate, without the trend gate
            pub fn rule<T: OHLCV>(self) -> RuleFn<T> {
                match self {
                    $(PatternKind::$variant => $module::$rule::<T>),*
                }
            }
        }
    };
}

define_patterns! {
    Hammer {
        name: "hammer",
        direction: Bullish,
        bars: 1,
        mirror: HangingMan,
        rule: bullish::hammer,
        thresholds: { BodyPosition: 0.25, LowerShadowRatio: 1.75, UpperShadowRatio: 0.5 },
    },
    Piercing {
        name: "piercing",
        direction: Bullish,
        bars: 2,
        mirror: DarkCloud,
        rule: bullish::piercing,
        thresholds: {},
    },
    BullishEngulfing {
        name: "bullish_engulfing",
        direction: Bullish,
        bars: 2,
        mirror: BearishEngulfing,
        rule: bullish::engulfing,
        thresholds: {},
    },
    MorningStar {
        name: "morning_star",
        direction: Bullish,
        bars: 3,
        mirror: EveningStar,
        rule: bullish::morning_star,
        thresholds: {
            BodyRatio: 0.5,
            PrevBodyRatio: 0.5,
            FirstBodyRatio: 0.5,
            RelativeSize: 0.3,
            FirstRelativeSize: 0.3,
        },
    },
    ThreeWhiteSoldiers {
        name: "three_white_soldiers",
        direction: Bullish,
        bars: 3,
        mirror: ThreeBlackCrows,
        rule: bullish::three_white_soldiers,
        thresholds: {
            BodyRatio: 0.3,
            PrevBodyRatio: 0.3,
            FirstBodyRatio: 0.3,
            RelativeSize: 0.25,
            PrevRelativeSize: 0.25,
            FirstRelativeSize: 0.25,
        },
    },
    BullishMarubozu {
        name: "bullish_marubozu",
        direction: Bullish,
        bars: 1,
        mirror: BearishMarubozu,
        rule: bullish::marubozu,
        thresholds: { BodyRatio: 0.8, RelativeSize: 0.8 },
    },
    ThreeInsideUp {
        name: "three_inside_up",
        direction: Bullish,
        bars: 3,
        mirror: ThreeInsideDown,
        rule: bullish::three_inside_up,
        thresholds: {
            FirstBodyRatio: 0.5,
            BodyRatio: 0.5,
            FirstRelativeSize: 0.3,
            RelativeSize: 0.3,
        },
    },
    BullishHarami {
        name: "bullish_harami",
        direction: Bullish,
        bars: 2,
        mirror: BearishHarami,
        rule: bullish::harami,
        thresholds: {
            PrevBodyRatio: 0.5,
            BodyRatio: 0.5,
            PrevRelativeSize: 0.3,
            RelativeSize: 0.7,
        },
    },
    TweezerBottom {
        name: "tweezer_bottom",
        direction: Bullish,
        bars: 2,
        mirror: TweezerTop,
        rule: bullish::tweezer_bottom,
        thresholds: {
            PrevBodyRatio: 0.5,
            BodyRatio: 0.5,
            PrevRelativeSize: 0.3,
            BodyPosition: -0.25,
            ExtremeTolerance: 0.1,
        },
    },
    HangingMan {
        name: "hanging_man",
        direction: Bearish,
        bars: 1,
        mirror: Hammer,
        rule: bearish::hanging_man,
        thresholds: { BodyPosition: -0.25, LowerShadowRatio: 0.5, UpperShadowRatio: 1.5 },
    },
    DarkCloud {
        name: "dark_cloud",
        direction: Bearish,
        bars: 2,
        mirror: Piercing,
        rule: bearish::dark_cloud,
        thresholds: {},
    },
    BearishEngulfing {
        name: "bearish_engulfing",
        direction: Bearish,
        bars: 2,
        mirror: BullishEngulfing,
        rule: bearish::engulfing,
        thresholds: {},
    },
    EveningStar {
        name: "evening_star",
        direction: Bearish,
        bars: 3,
        mirror: MorningStar,
        rule: bearish::evening_star,
        thresholds: {
            BodyRatio: 0.5,
            PrevBodyRatio: 0.5,
            FirstBodyRatio: 0.5,
            RelativeSize: 0.3,
            FirstRelativeSize: 0.3,
        },
    },
    ThreeBlackCrows {
        name: "three_black_crows",
        direction: Bearish,
        bars: 3,
        mirror: ThreeWhiteSoldiers,
        rule: bearish::three_black_crows,
        thresholds: {
            BodyRatio: 0.3,
            PrevBodyRatio: 0.3,
            FirstBodyRatio: 0.3,
            RelativeSize: 0.25,
            PrevRelativeSize: 0.25,
            FirstRelativeSize: 0.25,
        },
    },
    BearishMarubozu {
        name: "bearish_marubozu",
        direction: Bearish,
        bars: 1,
        mirror: BullishMarubozu,
        rule: bearish::marubozu,
        thresholds: { BodyRatio: 0.8, RelativeSize: 0.8 },
    },
    ThreeInsideDown {
        name: "three_inside_down",
        direction: Bearish,
        bars: 3,
        mirror: ThreeInsideUp,
        rule: bearish::three_inside_down,
        thresholds: {
            FirstBodyRatio: 0.5,
            BodyRatio: 0.5,
            FirstRelativeSize: 0.3,
            RelativeSize: 0.3,
        },
    },
    BearishHarami {
        name: "bearish_harami",
        direction: Bearish,
        bars: 2,
        mirror: BullishHarami,
        rule: bearish::harami,
        thresholds: {
            PrevBodyRatio: 0.5,
            BodyRatio: 0.5,
            PrevRelativeSize: 0.3,
            RelativeSize: 0.7,
        },
    },
    TweezerTop {
        name: "tweezer_top",
        direction: Bearish,
        bars: 2,
        mirror: TweezerBottom,
        rule: bearish::tweezer_top,
        thresholds: {
            PrevBodyRatio: 0.5,
            BodyRatio: 0.5,
            PrevRelativeSize: 0.3,
            BodyPosition: 0.25,
            ExtremeTolerance: 0.1,
        },
    },
}

impl PatternKind {
    /// Patterns of one side, in catalog order
    pub fn by_direction(direction: Direction) -> impl Iterator<Item = PatternKind> {
        Self::ALL
            .iter()
            .copied()
            .filter(move |kind| kind.direction() == direction)
    }

    /// Apply the trend gate and the geometric predicate.
    ///
    /// `None` when the trend is undefined or the input does not hold exactly
    /// [`bar_count`](Self::bar_count) bars with one relative size each.
    pub fn evaluate<T: OHLCV>(
        self,
        input: &RuleInput<'_, T>,
        trend: Option<f64>,
        thresholds: &Thresholds,
    ) -> Option<bool> {
        let trend = trend?;
        if input.bars.len() != self.bar_count() || input.relative_sizes.len() != input.bars.len() {
            return None;
        }
        let gate = thresholds[Threshold::TrendStrength];
        let trend_ok = match self.direction() {
            Direction::Bullish => trend <= gate,
            Direction::Bearish => trend >= gate,
        };
        Some(trend_ok && (self.rule::<T>())(input, thresholds))
    }
}

impl FromStr for PatternKind {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| PatternError::InvalidConfig(format!("unknown pattern `{s}`")))
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
