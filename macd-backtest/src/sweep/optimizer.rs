//! Parameter sweep over MACD periods.
//!
//! Runs every combination of a grid in parallel and ranks them by Sharpe
//! ratio. The price series is shared read-only; each run owns its own
//! simulator, so no locking is needed between runs.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::PriceSeries;
use crate::error::{BacktestError, Result};
use crate::metrics::{BacktestResult, Metric};
use crate::pipeline::MacdBacktest;
use crate::strategy::StrategyParams;

/// Parameter values to sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterGrid {
    /// Short EMA periods.
    pub short_ema: Vec<usize>,
    /// Long EMA periods.
    pub long_ema: Vec<usize>,
    /// Signal EMA periods.
    pub signal_ema: Vec<usize>,
}

impl Default for ParameterGrid {
    fn default() -> Self {
        Self {
            short_ema: vec![5, 8, 12],
            long_ema: vec![20, 26, 35],
            signal_ema: vec![5, 9],
        }
    }
}

impl ParameterGrid {
    /// Upper bound on combinations, before skipping `long <= short`.
    pub fn total_combinations(&self) -> usize {
        self.short_ema.len() * self.long_ema.len() * self.signal_ema.len()
    }

    /// Generate all combinations where the long period exceeds the short one.
    pub fn combinations(&self) -> Vec<StrategyParams> {
        let mut combos = Vec::new();

        for &short_ema in &self.short_ema {
            for &long_ema in &self.long_ema {
                if long_ema <= short_ema {
                    continue;
                }
                for &signal_ema in &self.signal_ema {
                    combos.push(StrategyParams::new(short_ema, long_ema, signal_ema));
                }
            }
        }

        combos
    }
}

/// Summary of backtest performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub total_return: f64,
    pub annualized_return: Metric,
    pub sharpe_ratio: Metric,
    pub max_drawdown: f64,
    pub total_trades: usize,
    pub win_rate: Metric,
    pub final_value: Decimal,
}

impl From<&BacktestResult> for BacktestSummary {
    fn from(result: &BacktestResult) -> Self {
        Self {
            total_return: result.returns.total_return,
            annualized_return: result.returns.annualized_return,
            sharpe_ratio: result.sharpe_ratio,
            max_drawdown: result.drawdown.max_drawdown,
            total_trades: result.trade_analysis.total,
            win_rate: result.trade_analysis.win_rate,
            final_value: result.final_value,
        }
    }
}

/// One evaluated combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepEntry {
    pub params: StrategyParams,
    pub summary: BacktestSummary,
}

/// A combination that could not be evaluated on this data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRun {
    pub params: StrategyParams,
    pub reason: String,
}

/// Ranked sweep results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResult {
    /// Best first: Sharpe descending (undefined last), then total return.
    pub entries: Vec<SweepEntry>,
    pub skipped: Vec<SkippedRun>,
}

impl SweepResult {
    pub fn best(&self) -> Option<&SweepEntry> {
        self.entries.first()
    }

    pub fn top(&self, n: usize) -> &[SweepEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    /// Get summary table of the top `n` entries.
    pub fn summary(&self, n: usize) -> String {
        let mut out = format!(
            "Parameter Sweep: {} evaluated, {} skipped\n\n",
            self.entries.len(),
            self.skipped.len()
        );
        out.push_str("| Rank | Params          | Sharpe   | Return   | Max DD  | Trades |\n");
        out.push_str("|------|-----------------|----------|----------|---------|--------|\n");
        for (i, entry) in self.top(n).iter().enumerate() {
            out.push_str(&format!(
                "| {:>4} | {:<15} | {:>8} | {:>7.2}% | {:>6.2}% | {:>6} |\n",
                i + 1,
                entry.params.key(),
                entry.summary.sharpe_ratio.to_string(),
                entry.summary.total_return * 100.0,
                entry.summary.max_drawdown * 100.0,
                entry.summary.total_trades
            ));
        }
        out
    }
}

/// Grid search driver.
pub struct ParameterSweep {
    backtest: MacdBacktest,
}

impl ParameterSweep {
    pub fn new(backtest: MacdBacktest) -> Self {
        Self { backtest }
    }

    /// Evaluate every combination of `grid` over `series`.
    ///
    /// Retryable failures (too few bars for a period, for example) are
    /// recorded as skipped; any other failure aborts the sweep.
    pub fn run(&self, series: &PriceSeries, grid: &ParameterGrid) -> Result<SweepResult> {
        self.backtest.validate()?;

        let combinations = grid.combinations();
        if combinations.is_empty() {
            return Err(BacktestError::config(
                "parameter grid has no combinations with long period > short period",
            ));
        }

        let total = combinations.len();
        info!("Sweeping {} parameter combinations over {} bars", total, series.len());

        let progress = AtomicUsize::new(0);
        let outcomes: Vec<std::result::Result<SweepEntry, SkippedRun>> = combinations
            .par_iter()
            .map(|params| {
                let outcome = self.backtest.run(series, params);

                let done = progress.fetch_add(1, AtomicOrdering::Relaxed) + 1;
                if done % (total / 10).max(1) == 0 || done == total {
                    let pct = done as f64 / total as f64 * 100.0;
                    info!("  {:.0}% ({}/{} combinations)", pct, done, total);
                }

                match outcome {
                    Ok(result) => Ok(Ok(SweepEntry {
                        params: *params,
                        summary: BacktestSummary::from(&result),
                    })),
                    Err(e) if e.is_retryable() => Ok(Err(SkippedRun {
                        params: *params,
                        reason: e.to_string(),
                    })),
                    Err(e) => Err(e),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let mut entries = Vec::new();
        let mut skipped = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(entry) => entries.push(entry),
                Err(skip) => {
                    warn!("Skipped {}: {}", skip.params.key(), skip.reason);
                    skipped.push(skip);
                }
            }
        }

        entries.sort_by(rank);

        if let Some(best) = entries.first() {
            info!(
                "Sweep complete: best params = {}, Sharpe = {}",
                best.params.key(),
                best.summary.sharpe_ratio
            );
        }

        Ok(SweepResult { entries, skipped })
    }
}

/// Sharpe descending with undefined last, then total return descending.
fn rank(a: &SweepEntry, b: &SweepEntry) -> Ordering {
    let by_sharpe = match (a.summary.sharpe_ratio.value(), b.summary.sharpe_ratio.value()) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_sharpe.then_with(|| {
        b.summary
            .total_return
            .partial_cmp(&a.summary.total_return)
            .unwrap_or(Ordering::Equal)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn series(n: usize) -> PriceSeries {
        let closes: Vec<f64> = (0..n)
            .map(|i| 100.0 + 8.0 * (i as f64 / 7.0).sin() + i as f64 * 0.1)
            .collect();
        PriceSeries::from_closes(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), &closes).unwrap()
    }

    fn entry(sharpe: Metric, total_return: f64) -> SweepEntry {
        SweepEntry {
            params: StrategyParams::default(),
            summary: BacktestSummary {
                total_return,
                annualized_return: Metric::Undefined,
                sharpe_ratio: sharpe,
                max_drawdown: 0.0,
                total_trades: 0,
                win_rate: Metric::Undefined,
                final_value: dec!(10000),
            },
        }
    }

    #[test]
    fn test_parameter_grid_combinations() {
        let grid = ParameterGrid {
            short_ema: vec![5, 12],
            long_ema: vec![10, 26],
            signal_ema: vec![9],
        };

        // (12, 10) is skipped since long must exceed short.
        let combos = grid.combinations();
        assert_eq!(grid.total_combinations(), 4);
        assert_eq!(
            combos,
            vec![
                StrategyParams::new(5, 10, 9),
                StrategyParams::new(5, 26, 9),
                StrategyParams::new(12, 26, 9),
            ]
        );
    }

    #[test]
    fn test_rank_order() {
        let mut entries = vec![
            entry(Metric::Undefined, 0.5),
            entry(Metric::Defined(0.8), 0.1),
            entry(Metric::Defined(1.2), 0.05),
            entry(Metric::Defined(0.8), 0.3),
        ];
        entries.sort_by(rank);
        let order: Vec<_> = entries
            .iter()
            .map(|e| (e.summary.sharpe_ratio.value(), e.summary.total_return))
            .collect();
        assert_eq!(
            order,
            vec![
                (Some(1.2), 0.05),
                (Some(0.8), 0.3),
                (Some(0.8), 0.1),
                (None, 0.5)
            ]
        );
    }

    #[test]
    fn test_sweep_ranks_results() {
        let sweep = ParameterSweep::new(MacdBacktest::new(dec!(10000)));
        let grid = ParameterGrid {
            short_ema: vec![3, 5],
            long_ema: vec![10, 15],
            signal_ema: vec![3, 5],
        };
        let result = sweep.run(&series(120), &grid).unwrap();

        assert_eq!(result.entries.len(), 8);
        assert!(result.skipped.is_empty());
        for pair in result.entries.windows(2) {
            assert_ne!(rank(&pair[0], &pair[1]), Ordering::Greater);
        }
        assert_eq!(result.best(), result.entries.first());
        assert_eq!(result.top(3).len(), 3);
        assert_eq!(result.top(100).len(), 8);
    }

    #[test]
    fn test_insufficient_data_is_skipped() {
        let sweep = ParameterSweep::new(MacdBacktest::new(dec!(10000)));
        let grid = ParameterGrid {
            short_ema: vec![5],
            long_ema: vec![10, 40],
            signal_ema: vec![3],
        };
        let result = sweep.run(&series(30), &grid).unwrap();

        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].params, StrategyParams::new(5, 10, 3));
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].params, StrategyParams::new(5, 40, 3));
        assert!(result.skipped[0].reason.contains("Insufficient data"));
    }

    #[test]
    fn test_sweep_is_deterministic() {
        let sweep = ParameterSweep::new(MacdBacktest::new(dec!(10000)));
        let data = series(90);
        let grid = ParameterGrid::default();
        let a = sweep.run(&data, &grid).unwrap();
        let b = sweep.run(&data, &grid).unwrap();
        assert_eq!(a.entries, b.entries);
    }

    #[test]
    fn test_empty_grid_rejected() {
        let sweep = ParameterSweep::new(MacdBacktest::new(dec!(10000)));
        let grid = ParameterGrid {
            short_ema: vec![20],
            long_ema: vec![10],
            signal_ema: vec![9],
        };
        let err = sweep.run(&series(50), &grid).unwrap_err();
        assert!(matches!(err, BacktestError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_non_positive_cash_aborts_sweep() {
        let sweep = ParameterSweep::new(MacdBacktest::new(dec!(0)));
        let err = sweep.run(&series(50), &ParameterGrid::default()).unwrap_err();
        assert!(matches!(err, BacktestError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_summary_table() {
        let result = SweepResult {
            entries: vec![entry(Metric::Defined(1.5), 0.1)],
            skipped: vec![],
        };
        let table = result.summary(5);
        assert!(table.contains("1 evaluated, 0 skipped"));
        assert!(table.contains("ema12-26_sig9"));
        assert!(table.contains("1.5000"));
    }
}
