//! Backtest report types.
//!
//! A [`BacktestResult`] is produced once per run and never mutated. Ratios
//! that cannot be computed (zero variance, empty trade log) are reported
//! as [`Metric::Undefined`], which serializes to JSON `null`.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::backtest::Position;
use crate::strategy::StrategyParams;

/// A ratio that may be undefined for a legitimate run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum Metric {
    Defined(f64),
    #[default]
    Undefined,
}

impl Metric {
    /// Wrap `value`, treating NaN and infinities as undefined.
    pub fn new(value: f64) -> Self {
        if value.is_finite() {
            Self::Defined(value)
        } else {
            Self::Undefined
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Defined(v) => Some(*v),
            Self::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Self::Defined(_))
    }
}

impl From<Option<f64>> for Metric {
    fn from(value: Option<f64>) -> Self {
        value.map(Self::new).unwrap_or(Self::Undefined)
    }
}

impl From<Metric> for Option<f64> {
    fn from(metric: Metric) -> Self {
        metric.value()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defined(v) => write!(f, "{:.4}", v),
            Self::Undefined => write!(f, "undefined"),
        }
    }
}

/// Peak-to-trough drawdown details.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DrawdownReport {
    /// Largest decline from a running peak, as a fraction of that peak.
    pub max_drawdown: f64,
    /// Money lost over the same decline.
    pub max_money_down: Decimal,
    pub peak_date: Option<NaiveDate>,
    pub trough_date: Option<NaiveDate>,
    /// First bar back at or above the peak after the trough.
    pub recovery_date: Option<NaiveDate>,
    /// Longest run of consecutive bars below the running peak.
    pub max_duration_bars: usize,
    /// Drawdown at the terminal bar.
    pub current_drawdown: f64,
}

/// Return figures.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReturnsReport {
    /// final / start - 1.
    pub total_return: f64,
    /// ln(final / start).
    pub log_return: Metric,
    /// Log return per period.
    pub average_return: Metric,
    /// exp(average * periods_per_year) - 1.
    pub annualized_return: Metric,
}

/// Trade log statistics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TradeAnalysis {
    /// Closed trades.
    pub total: usize,
    /// Positions still open at the end (0 or 1).
    pub open: usize,
    pub won: usize,
    pub lost: usize,
    pub win_rate: Metric,
    pub average_win: Metric,
    pub average_loss: Metric,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub net_pnl: Decimal,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    pub longest_win_streak: usize,
    pub longest_loss_streak: usize,
    pub long_trades: usize,
    pub short_trades: usize,
    pub average_bars_held: Metric,
    pub total_fees: Decimal,
}

/// Final report for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub params: Option<StrategyParams>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub bars: usize,
    pub starting_value: Decimal,
    pub final_value: Decimal,
    pub sharpe_ratio: Metric,
    pub drawdown: DrawdownReport,
    pub returns: ReturnsReport,
    pub trade_analysis: TradeAnalysis,
    pub open_position: Option<Position>,
}

impl BacktestResult {
    pub fn with_params(mut self, params: StrategyParams) -> Self {
        self.params = Some(params);
        self
    }

    /// Generate a summary report.
    pub fn summary(&self) -> String {
        let params = self
            .params
            .map(|p| p.key())
            .unwrap_or_else(|| "custom".to_string());
        let period = match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => format!("{} to {}", start, end),
            _ => "n/a".to_string(),
        };
        let position = self
            .open_position
            .as_ref()
            .map(|p| format!("{} {} @ {}", p.direction.as_str(), p.quantity.round_dp(4), p.entry_price))
            .unwrap_or_else(|| "flat".to_string());

        format!(
            "Backtest Summary ({})\n\
             ====================\n\
             Period: {} ({} bars)\n\
             Starting Value: ${:.2}\n\
             Final Value: ${:.2}\n\
             Total Return: {:.2}%\n\
             Annualized Return: {}\n\
             Sharpe Ratio: {}\n\
             Max Drawdown: {:.2}% (${:.2})\n\
             \n\
             Trades: {} (W: {}, L: {})\n\
             Win Rate: {}\n\
             Net P&L: ${:.2}\n\
             Fees: ${:.2}\n\
             Open Position: {}",
            params,
            period,
            self.bars,
            self.starting_value,
            self.final_value,
            self.returns.total_return * 100.0,
            self.returns.annualized_return,
            self.sharpe_ratio,
            self.drawdown.max_drawdown * 100.0,
            self.drawdown.max_money_down,
            self.trade_analysis.total,
            self.trade_analysis.won,
            self.trade_analysis.lost,
            self.trade_analysis.win_rate,
            self.trade_analysis.net_pnl,
            self.trade_analysis.total_fees,
            position
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_rejects_non_finite() {
        assert_eq!(Metric::new(f64::NAN), Metric::Undefined);
        assert_eq!(Metric::new(f64::INFINITY), Metric::Undefined);
        assert_eq!(Metric::new(1.5).value(), Some(1.5));
    }

    #[test]
    fn test_metric_serializes_as_nullable_number() {
        assert_eq!(serde_json::to_string(&Metric::Undefined).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Metric::Defined(0.25)).unwrap(), "0.25");
        let back: Metric = serde_json::from_str("null").unwrap();
        assert!(!back.is_defined());
    }

    #[test]
    fn test_metric_display() {
        assert_eq!(Metric::Defined(1.23456).to_string(), "1.2346");
        assert_eq!(Metric::Undefined.to_string(), "undefined");
    }
}
