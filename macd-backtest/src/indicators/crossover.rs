//! MACD / signal line crossover detection.
//!
//! Bullish: `macd <= signal` on the previous bar and `macd > signal` now.
//! Bearish: `macd >= signal` on the previous bar and `macd < signal` now.
//! Equality never registers a cross by itself, and the first bar never
//! produces an event.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::macd::MacdState;

/// Direction of a crossover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossDirection {
    Bullish,
    Bearish,
}

/// A MACD / signal crossover at a bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossoverEvent {
    /// Position in the aligned series.
    pub index: usize,
    pub date: NaiveDate,
    pub direction: CrossDirection,
    /// MACD value on the crossing bar (chart marker height).
    pub macd: f64,
}

pub struct CrossoverDetector;

impl CrossoverDetector {
    /// Lazily scan `state` for crossovers in ascending index order.
    ///
    /// The returned iterator is cheap to clone; calling `detect` again
    /// restarts the scan from the beginning.
    pub fn detect(state: &MacdState) -> Crossovers<'_> {
        Crossovers { state, next: 1 }
    }

    /// Classify the transition between two consecutive `macd - signal`
    /// spreads.
    pub fn classify(prev_spread: f64, spread: f64) -> Option<CrossDirection> {
        if prev_spread <= 0.0 && spread > 0.0 {
            Some(CrossDirection::Bullish)
        } else if prev_spread >= 0.0 && spread < 0.0 {
            Some(CrossDirection::Bearish)
        } else {
            None
        }
    }
}

/// Iterator over the crossovers of one [`MacdState`].
#[derive(Debug, Clone)]
pub struct Crossovers<'a> {
    state: &'a MacdState,
    next: usize,
}

impl Iterator for Crossovers<'_> {
    type Item = CrossoverEvent;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.state.len() {
            let index = self.next;
            self.next += 1;

            let (Some(prev), Some(curr)) = (self.state.spread(index - 1), self.state.spread(index))
            else {
                continue;
            };

            if let Some(direction) = CrossoverDetector::classify(prev, curr) {
                return Some(CrossoverEvent {
                    index,
                    date: self.state.dates[index],
                    direction,
                    macd: self.state.macd[index],
                });
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.state.len().saturating_sub(self.next)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PriceSeries;
    use crate::indicators::ema::EmaSeries;
    use crate::indicators::macd::MacdCalculator;

    fn state_from(macd: Vec<f64>, signal: Vec<f64>) -> MacdState {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let n = macd.len();
        MacdState {
            dates: (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect(),
            ema_short: EmaSeries { period: 1, values: vec![0.0; n] },
            ema_long: EmaSeries { period: 1, values: vec![0.0; n] },
            histogram: macd.iter().zip(&signal).map(|(m, s)| m - s).collect(),
            macd,
            signal,
            signal_period: 1,
        }
    }

    #[test]
    fn test_basic_crosses() {
        let state = state_from(vec![-1.0, 1.0, 2.0, -1.0], vec![0.0; 4]);
        let events: Vec<_> = CrossoverDetector::detect(&state).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].index, 1);
        assert_eq!(events[0].direction, CrossDirection::Bullish);
        assert_eq!(events[1].index, 3);
        assert_eq!(events[1].direction, CrossDirection::Bearish);
    }

    #[test]
    fn test_equality_is_not_a_cross() {
        // Touch the signal line, then break above.
        let state = state_from(vec![-1.0, 0.0, 0.0, 1.0], vec![0.0; 4]);
        let events: Vec<_> = CrossoverDetector::detect(&state).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].index, 3);
        assert_eq!(events[0].direction, CrossDirection::Bullish);
    }

    #[test]
    fn test_first_bar_never_fires() {
        let state = state_from(vec![5.0], vec![0.0]);
        assert_eq!(CrossoverDetector::detect(&state).count(), 0);
    }

    #[test]
    fn test_restartable() {
        let state = state_from(vec![-1.0, 1.0, -1.0, 1.0], vec![0.0; 4]);
        let first: Vec<_> = CrossoverDetector::detect(&state).collect();
        let second: Vec<_> = CrossoverDetector::detect(&state).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_indices_unique_and_ascending() {
        let closes: Vec<f64> = (0..200)
            .map(|i| 100.0 + (i as f64 / 4.0).sin() * 10.0 + (i as f64 / 17.0).cos() * 4.0)
            .collect();
        let series =
            PriceSeries::from_closes(NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(), &closes).unwrap();
        let state = MacdCalculator::compute(&series, 12, 26, 9).unwrap();
        let events: Vec<_> = CrossoverDetector::detect(&state).collect();

        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e.index > 0));
        assert!(events.windows(2).all(|w| w[0].index < w[1].index));
        // Strict crosses alternate direction.
        assert!(events.windows(2).all(|w| w[0].direction != w[1].direction));
    }

    #[test]
    fn test_classify() {
        assert_eq!(CrossoverDetector::classify(0.0, 0.1), Some(CrossDirection::Bullish));
        assert_eq!(CrossoverDetector::classify(0.0, -0.1), Some(CrossDirection::Bearish));
        assert_eq!(CrossoverDetector::classify(0.1, 0.0), None);
        assert_eq!(CrossoverDetector::classify(0.1, 0.2), None);
    }
}
