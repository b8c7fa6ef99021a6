//! Validated OHLCV bar and an ordered bar sequence.

use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::{at_index, OHLCVExt, PatternError, Result, OHLCV};

/// One immutable OHLCV observation.
///
/// Construction enforces `low <= open, close <= high`, finite non-negative
/// prices and a finite non-negative volume when one is given.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bar {
    timestamp: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: Option<f64>,
}

impl Bar {
    pub fn new(
        timestamp: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: Option<f64>,
    ) -> Result<Self> {
        let bar = Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        };
        bar.validate()?;
        Ok(bar)
    }
}

impl OHLCV for Bar {
    #[inline]
    fn open(&self) -> f64 {
        self.open
    }

    #[inline]
    fn high(&self) -> f64 {
        self.high
    }

    #[inline]
    fn low(&self) -> f64 {
        self.low
    }

    #[inline]
    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> Option<f64> {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

#[derive(Deserialize)]
struct RawBar {
    timestamp: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

impl<'de> Deserialize<'de> for Bar {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = RawBar::deserialize(d)?;
        Bar::new(raw.timestamp, raw.open, raw.high, raw.low, raw.close, raw.volume)
            .map_err(serde::de::Error::custom)
    }
}

/// Chronologically ordered bars, index 0 = earliest.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    /// Build a series, rejecting timestamps that go backwards.
    pub fn new(bars: Vec<Bar>) -> Result<Self> {
        for (i, pair) in bars.windows(2).enumerate() {
            if pair[1].timestamp < pair[0].timestamp {
                return Err(PatternError::InvalidOHLCV {
                    index: i + 1,
                    reason: "timestamp earlier than previous bar",
                });
            }
        }
        Ok(Self { bars })
    }

    /// Build a series from `(timestamp, open, high, low, close, volume)` rows.
    pub fn from_rows<I>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = (i64, f64, f64, f64, f64, Option<f64>)>,
    {
        let bars = rows
            .into_iter()
            .enumerate()
            .map(|(i, (ts, o, h, l, c, v))| Bar::new(ts, o, h, l, c, v).map_err(|e| at_index(e, i)))
            .collect::<Result<Vec<_>>>()?;
        Self::new(bars)
    }

    /// Bars in `[start, end)`, clamped to the series. Never panics.
    pub fn slice(&self, start: usize, end: usize) -> &[Bar] {
        let end = end.min(self.bars.len());
        let start = start.min(end);
        &self.bars[start..end]
    }

    pub fn as_slice(&self) -> &[Bar] {
        &self.bars
    }

    pub fn into_inner(self) -> Vec<Bar> {
        self.bars
    }
}

impl Deref for BarSeries {
    type Target = [Bar];

    fn deref(&self) -> &[Bar] {
        &self.bars
    }
}

impl<'a> IntoIterator for &'a BarSeries {
    type Item = &'a Bar;
    type IntoIter = std::slice::Iter<'a, Bar>;

    fn into_iter(self) -> Self::IntoIter {
        self.bars.iter()
    }
}

impl<'de> Deserialize<'de> for BarSeries {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let bars = Vec::<Bar>::deserialize(d)?;
        BarSeries::new(bars).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_validation() {
        assert!(Bar::new(0, 10.0, 12.0, 9.0, 11.0, Some(100.0)).is_ok());
        assert!(Bar::new(0, 10.0, 12.0, 9.0, 11.0, None).is_ok());
        // close above high
        assert!(Bar::new(0, 10.0, 12.0, 9.0, 13.0, None).is_err());
        // open below low
        assert!(Bar::new(0, 8.0, 12.0, 9.0, 11.0, None).is_err());
        assert!(Bar::new(0, 10.0, 12.0, 9.0, 11.0, Some(-1.0)).is_err());
        assert!(Bar::new(0, -1.0, 12.0, -2.0, 11.0, None).is_err());
    }

    #[test]
    fn test_series_rejects_unordered_timestamps() {
        let a = Bar::new(2, 10.0, 12.0, 9.0, 11.0, None).unwrap();
        let b = Bar::new(1, 10.0, 12.0, 9.0, 11.0, None).unwrap();
        let err = BarSeries::new(vec![a, b]).unwrap_err();
        assert!(matches!(err, PatternError::InvalidOHLCV { index: 1, .. }));
    }

    #[test]
    fn test_from_rows_reports_index() {
        let rows = vec![
            (0, 10.0, 12.0, 9.0, 11.0, None),
            (1, 10.0, 12.0, 9.0, 11.0, None),
            (2, 10.0, 9.5, 9.0, 11.0, None),
        ];
        let err = BarSeries::from_rows(rows).unwrap_err();
        assert!(matches!(err, PatternError::InvalidOHLCV { index: 2, .. }));
    }

    #[test]
    fn test_slice_clamps() {
        let series = BarSeries::from_rows((0..5).map(|i| (i, 10.0, 12.0, 9.0, 11.0, None))).unwrap();
        assert_eq!(series.slice(1, 3).len(), 2);
        assert_eq!(series.slice(3, 100).len(), 2);
        assert!(series.slice(10, 20).is_empty());
        assert!(series.slice(4, 2).is_empty());
    }

    #[test]
    fn test_json_round_trip_validates() {
        let json = r#"[{"timestamp":1,"open":10,"high":12,"low":9,"close":11}]"#;
        let series: BarSeries = serde_json::from_str(json).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].volume(), None);

        let bad = r#"[{"timestamp":1,"open":10,"high":12,"low":9,"close":13}]"#;
        assert!(serde_json::from_str::<BarSeries>(bad).is_err());
    }
}
