//! Core price data types.
//!
//! A [`PriceSeries`] is an ordered, date-indexed sequence of daily
//! [`PriceBar`]s. It is validated once on construction and is read-only
//! afterwards, so it can be shared freely between concurrent backtest runs.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, Result};

/// Daily OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// Bar with every price set to `close` and zero volume.
    pub fn from_close(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        }
    }

    fn check_values(&self) -> std::result::Result<(), String> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(format!("{} on {} is not a finite number", name, self.date));
            }
            if value < 0.0 {
                return Err(format!("{} on {} is negative ({})", name, self.date, value));
            }
        }
        Ok(())
    }
}

/// Ordered sequence of daily bars with strictly increasing dates.
///
/// Non-trading days are simply absent; no gaps are synthesized.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Build a series from bars already in date order.
    ///
    /// Fails with `MalformedData` when dates are not strictly increasing or
    /// a value is negative or not finite.
    pub fn load(bars: Vec<PriceBar>) -> Result<Self> {
        for (idx, bar) in bars.iter().enumerate() {
            bar.check_values()
                .map_err(|e| BacktestError::MalformedData(format!("bar {}: {}", idx + 1, e)))?;
        }

        if let Some(pos) = bars.windows(2).position(|w| w[1].date <= w[0].date) {
            let (prev, curr) = (bars[pos].date, bars[pos + 1].date);
            let reason = if prev == curr {
                "duplicate date"
            } else {
                "dates out of order"
            };
            return Err(BacktestError::MalformedData(format!(
                "{} at bar {}: {} follows {}",
                reason,
                pos + 2,
                curr,
                prev
            )));
        }

        Ok(Self { bars })
    }

    /// Synthetic series with one bar per consecutive calendar day.
    pub fn from_closes(start: NaiveDate, closes: &[f64]) -> Result<Self> {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PriceBar::from_close(start + Duration::days(i as i64), close))
            .collect();
        Self::load(bars)
    }

    /// Inclusive date-range filter.
    ///
    /// The result is a contiguous sub-sequence in the original order. A
    /// reversed range is a configuration error; a range containing no bars
    /// is `EmptyRange`.
    pub fn filter(&self, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries> {
        if start > end {
            return Err(BacktestError::config(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }

        let lo = self.bars.partition_point(|b| b.date < start);
        let hi = self.bars.partition_point(|b| b.date <= end);

        if lo >= hi {
            return Err(BacktestError::EmptyRange { start, end });
        }

        Ok(Self {
            bars: self.bars[lo..hi].to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn get(&self, index: usize) -> Option<&PriceBar> {
        self.bars.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PriceBar> {
        self.bars.iter()
    }

    /// Closing prices in date order.
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }
}

impl<'a> IntoIterator for &'a PriceSeries {
    type Item = &'a PriceBar;
    type IntoIter = std::slice::Iter<'a, PriceBar>;

    fn into_iter(self) -> Self::IntoIter {
        self.bars.iter()
    }
}
