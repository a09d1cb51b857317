//! Performance analysis.
//!
//! Turns a simulation outcome into a report:
//! - Total, log and annualized returns
//! - Sharpe ratio (sample standard deviation, annualized)
//! - Maximum drawdown with peak, trough and recovery dates
//! - Trade statistics (win rate, average win/loss, streaks)

pub mod calculator;
pub mod report;

pub use calculator::{AnalyzerConfig, PerformanceAnalyzer};
pub use report::{BacktestResult, DrawdownReport, Metric, ReturnsReport, TradeAnalysis};
