//! Exponential moving average.
//!
//! Seeding rule: the first output equals the first input value, then
//! `ema[t] = alpha * x[t] + (1 - alpha) * ema[t-1]` with
//! `alpha = 2 / (period + 1)`. There is no simple-average warm-up over the
//! first `period` values. Every downstream MACD value and backtest metric
//! depends on this seed, so it must not change.

use serde::Serialize;

use crate::error::{BacktestError, Result};

/// Incremental EMA state, fed one value at a time in series order.
#[derive(Debug, Clone, Copy)]
pub struct Ema {
    period: usize,
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(BacktestError::config("EMA period must be at least 1"));
        }
        Ok(Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            value: None,
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Current value, `None` before the first update.
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Feed the next value and return the updated average.
    pub fn update(&mut self, x: f64) -> f64 {
        let next = match self.value {
            None => x,
            Some(prev) => self.alpha * x + (1.0 - self.alpha) * prev,
        };
        self.value = Some(next);
        next
    }
}

/// EMA values aligned 1:1 with the source values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmaSeries {
    pub period: usize,
    pub values: Vec<f64>,
}

impl EmaSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }
}

impl std::ops::Deref for EmaSeries {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.values
    }
}

/// Batch EMA over `values`. The output has the same length as the input.
pub fn ema(values: &[f64], period: usize) -> Result<EmaSeries> {
    let mut state = Ema::new(period)?;
    let values = values.iter().map(|&x| state.update(x)).collect();
    Ok(EmaSeries { period, values })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_period_rejected() {
        assert!(matches!(
            ema(&[1.0, 2.0], 0),
            Err(BacktestError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_seed_is_first_value() {
        let series = ema(&[10.0, 20.0, 30.0], 3).unwrap();
        assert_eq!(series.values[0], 10.0);
        // alpha = 0.5
        assert_eq!(series.values[1], 15.0);
        assert_eq!(series.values[2], 22.5);
    }

    #[test]
    fn test_period_one_tracks_input() {
        let input = [3.0, 1.5, 8.25, 4.0];
        let series = ema(&input, 1).unwrap();
        assert_eq!(series.values, input.to_vec());
    }

    #[test]
    fn test_length_matches_input() {
        assert!(ema(&[], 5).unwrap().is_empty());
        assert_eq!(ema(&[1.0; 17], 5).unwrap().len(), 17);
    }

    #[test]
    fn test_constant_series_stays_constant() {
        for period in [1, 2, 5, 12, 26, 50] {
            let series = ema(&[42.5; 40], period).unwrap();
            for v in series.iter() {
                assert!((v - 42.5).abs() < 1e-9, "period {} drifted to {}", period, v);
            }
        }
    }

    #[test]
    fn test_streaming_matches_batch() {
        let input: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let batch = ema(&input, 9).unwrap();
        let mut state = Ema::new(9).unwrap();
        for (x, expected) in input.iter().zip(batch.iter()) {
            assert_eq!(state.update(*x), *expected);
        }
    }

    #[test]
    fn test_reference_values() {
        // period 2 => alpha = 2/3
        let series = ema(&[1.0, 4.0, 7.0], 2).unwrap();
        let alpha = 2.0 / 3.0;
        let e1 = alpha * 4.0 + (1.0 - alpha) * 1.0;
        let e2 = alpha * 7.0 + (1.0 - alpha) * e1;
        assert_eq!(series.values, vec![1.0, e1, e2]);
    }
}
