//! MACD line, signal line and histogram.
//!
//! - MACD = EMA(close, short) - EMA(close, long)
//! - Signal = EMA(MACD, signal)
//! - Histogram = MACD - Signal
//!
//! All series start at index 0 and stay aligned with the input bars.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use super::ema::{ema, EmaSeries};
use crate::data::PriceSeries;
use crate::error::{BacktestError, Result};

/// MACD components aligned with the bars they were computed from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacdState {
    pub dates: Vec<NaiveDate>,
    pub ema_short: EmaSeries,
    pub ema_long: EmaSeries,
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
    pub signal_period: usize,
}

impl MacdState {
    pub fn len(&self) -> usize {
        self.macd.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macd.is_empty()
    }

    pub fn short_period(&self) -> usize {
        self.ema_short.period
    }

    pub fn long_period(&self) -> usize {
        self.ema_long.period
    }

    /// `macd - signal` at `index`.
    pub fn spread(&self, index: usize) -> Option<f64> {
        Some(self.macd.get(index)? - self.signal.get(index)?)
    }
}

pub struct MacdCalculator;

impl MacdCalculator {
    /// Compute MACD components over every bar of `series`.
    ///
    /// Requires at least `max(short, long, signal)` bars; fewer bars fail
    /// with `InsufficientData` rather than producing unrepresentative values.
    pub fn compute(
        series: &PriceSeries,
        short_period: usize,
        long_period: usize,
        signal_period: usize,
    ) -> Result<MacdState> {
        if short_period == 0 || long_period == 0 || signal_period == 0 {
            return Err(BacktestError::config(format!(
                "MACD periods must be at least 1 (short={}, long={}, signal={})",
                short_period, long_period, signal_period
            )));
        }

        let required = short_period.max(long_period).max(signal_period);
        if series.len() < required {
            return Err(BacktestError::InsufficientData {
                required,
                available: series.len(),
            });
        }

        if short_period >= long_period {
            warn!(
                "Short EMA period {} is not below long EMA period {}",
                short_period, long_period
            );
        }

        let closes = series.closes();
        let ema_short = ema(&closes, short_period)?;
        let ema_long = ema(&closes, long_period)?;

        let macd: Vec<f64> = ema_short
            .iter()
            .zip(ema_long.iter())
            .map(|(s, l)| s - l)
            .collect();
        let signal = ema(&macd, signal_period)?.values;
        let histogram = macd.iter().zip(&signal).map(|(m, s)| m - s).collect();

        Ok(MacdState {
            dates: series.dates(),
            ema_short,
            ema_long,
            macd,
            signal,
            histogram,
            signal_period,
        })
    }
}
