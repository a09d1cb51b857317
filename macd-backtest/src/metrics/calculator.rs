//! Performance analyzer.
//!
//! Pure functions of the equity curve and trade log. The starting cash is
//! treated as the value before the first bar, so an entry fee paid on bar 0
//! already shows up as a return and a drawdown.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::backtest::{Direction, EquityPoint, Position, SimulationOutcome, Trade};

use super::report::{BacktestResult, DrawdownReport, Metric, ReturnsReport, TradeAnalysis};

/// Analyzer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Bars per year used to annualize (252 trading days).
    pub periods_per_year: f64,
    /// Annual risk-free rate subtracted from returns in the Sharpe ratio.
    pub risk_free_rate: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            periods_per_year: 252.0,
            risk_free_rate: 0.0,
        }
    }
}

pub struct PerformanceAnalyzer {
    config: AnalyzerConfig,
}

impl Default for PerformanceAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

impl PerformanceAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Build the full report for a simulation run.
    pub fn analyze(&self, outcome: &SimulationOutcome) -> BacktestResult {
        let curve = &outcome.equity_curve;
        let final_value = outcome.final_equity();

        BacktestResult {
            params: None,
            start_date: outcome.start_date(),
            end_date: outcome.end_date(),
            bars: curve.len(),
            starting_value: outcome.starting_cash,
            final_value,
            sharpe_ratio: self.sharpe_ratio(outcome.starting_cash, curve),
            drawdown: Self::max_drawdown(outcome.starting_cash, curve),
            returns: self.returns(outcome.starting_cash, curve),
            trade_analysis: Self::trade_analysis(
                &outcome.trades,
                outcome.open_position(),
                outcome.total_fees,
            ),
            open_position: outcome.open_position().cloned(),
        }
    }

    /// final / start - 1.
    pub fn total_return(starting_value: Decimal, final_value: Decimal) -> f64 {
        if starting_value <= Decimal::ZERO {
            return 0.0;
        }
        ratio(final_value, starting_value) - 1.0
    }

    /// Simple returns between consecutive values, starting from the cash
    /// held before the first bar.
    ///
    /// `None` when a base value is not positive (the ratio is meaningless).
    pub fn periodic_returns(starting_value: Decimal, curve: &[EquityPoint]) -> Option<Vec<f64>> {
        let values: Vec<f64> = std::iter::once(to_f64(starting_value))
            .chain(curve.iter().map(|p| to_f64(p.equity)))
            .collect();

        values
            .windows(2)
            .map(|w| if w[0] > 0.0 { Some(w[1] / w[0] - 1.0) } else { None })
            .collect()
    }

    /// Annualized Sharpe ratio using the sample standard deviation.
    pub fn sharpe_ratio(&self, starting_value: Decimal, curve: &[EquityPoint]) -> Metric {
        let Some(returns) = Self::periodic_returns(starting_value, curve) else {
            return Metric::Undefined;
        };
        if returns.len() < 2 {
            return Metric::Undefined;
        }

        let rf = self.config.risk_free_rate / self.config.periods_per_year;
        let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();
        let mean = excess.iter().copied().mean();
        let std_dev = excess.iter().copied().std_dev();

        if std_dev == 0.0 || !std_dev.is_finite() {
            return Metric::Undefined;
        }
        Metric::new(mean / std_dev * self.config.periods_per_year.sqrt())
    }

    /// Maximum peak-to-trough drawdown.
    pub fn max_drawdown(starting_value: Decimal, curve: &[EquityPoint]) -> DrawdownReport {
        let Some(first) = curve.first() else {
            return DrawdownReport::default();
        };

        let mut peak = starting_value;
        let mut peak_date = first.date;
        let mut report = DrawdownReport::default();
        let mut worst_peak = peak;
        let mut underwater = 0usize;

        for point in curve {
            if point.equity >= peak {
                peak = point.equity;
                peak_date = point.date;
                underwater = 0;
                continue;
            }

            underwater += 1;
            report.max_duration_bars = report.max_duration_bars.max(underwater);

            let money_down = peak.saturating_sub(point.equity);
            let drawdown = if peak > Decimal::ZERO {
                ratio(money_down, peak)
            } else {
                0.0
            };
            if drawdown > report.max_drawdown {
                report.max_drawdown = drawdown;
                report.max_money_down = money_down;
                report.peak_date = Some(peak_date);
                report.trough_date = Some(point.date);
                worst_peak = peak;
            }
        }

        if let Some(trough) = report.trough_date {
            report.recovery_date = curve
                .iter()
                .find(|p| p.date > trough && p.equity >= worst_peak)
                .map(|p| p.date);
        }

        if let Some(last) = curve.last() {
            if peak > Decimal::ZERO && last.equity < peak {
                report.current_drawdown = ratio(peak.saturating_sub(last.equity), peak);
            }
        }

        report
    }

    /// Total, log, average and annualized returns.
    pub fn returns(&self, starting_value: Decimal, curve: &[EquityPoint]) -> ReturnsReport {
        let final_value = curve.last().map(|p| p.equity).unwrap_or(starting_value);
        let total_return = Self::total_return(starting_value, final_value);

        if starting_value <= Decimal::ZERO || final_value <= Decimal::ZERO || curve.is_empty() {
            return ReturnsReport {
                total_return,
                ..ReturnsReport::default()
            };
        }

        let log_return = ratio(final_value, starting_value).ln();
        let average = log_return / curve.len() as f64;
        ReturnsReport {
            total_return,
            log_return: Metric::new(log_return),
            average_return: Metric::new(average),
            annualized_return: Metric::new((average * self.config.periods_per_year).exp() - 1.0),
        }
    }

    /// Trade statistics. Empty logs report zero counts and undefined ratios.
    pub fn trade_analysis(
        trades: &[Trade],
        open_position: Option<&Position>,
        total_fees: Decimal,
    ) -> TradeAnalysis {
        let mut analysis = TradeAnalysis {
            total: trades.len(),
            open: usize::from(open_position.is_some()),
            total_fees,
            ..TradeAnalysis::default()
        };

        let mut win_streak = 0usize;
        let mut loss_streak = 0usize;
        let mut bars_held = 0usize;

        for trade in trades {
            if trade.is_winner() {
                analysis.won += 1;
                analysis.gross_profit = analysis.gross_profit.saturating_add(trade.pnl);
                analysis.largest_win = analysis.largest_win.max(trade.pnl);
                win_streak += 1;
                loss_streak = 0;
            } else {
                analysis.lost += 1;
                analysis.gross_loss = analysis.gross_loss.saturating_add(trade.pnl);
                analysis.largest_loss = analysis.largest_loss.min(trade.pnl);
                loss_streak += 1;
                win_streak = 0;
            }
            analysis.longest_win_streak = analysis.longest_win_streak.max(win_streak);
            analysis.longest_loss_streak = analysis.longest_loss_streak.max(loss_streak);

            if trade.direction == Direction::Short {
                analysis.short_trades += 1;
            } else {
                analysis.long_trades += 1;
            }
            bars_held += trade.bars_held();
        }

        analysis.net_pnl = analysis.gross_profit.saturating_add(analysis.gross_loss);

        if analysis.total > 0 {
            analysis.win_rate = Metric::new(analysis.won as f64 / analysis.total as f64);
            analysis.average_bars_held = Metric::new(bars_held as f64 / analysis.total as f64);
        }
        if analysis.won > 0 {
            analysis.average_win = Metric::new(to_f64(analysis.gross_profit) / analysis.won as f64);
        }
        if analysis.lost > 0 {
            analysis.average_loss = Metric::new(to_f64(analysis.gross_loss) / analysis.lost as f64);
        }

        analysis
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.try_into().unwrap_or(0.0)
}

/// `numerator / denominator`, falling back to f64 when the decimal quotient
/// is out of range.
fn ratio(numerator: Decimal, denominator: Decimal) -> f64 {
    numerator
        .checked_div(denominator)
        .map(to_f64)
        .unwrap_or_else(|| to_f64(numerator) / to_f64(denominator))
}
