//! End-to-end MACD backtest.
//!
//! PriceSeries -> MACD -> crossovers -> simulator -> analyzer -> report.
//! Each call owns its simulator, so one `MacdBacktest` can be shared across
//! threads and reused for any number of runs.

use std::path::Path;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::backtest::{BacktestSimulator, SimulationOutcome, SimulatorConfig};
use crate::config::{cash_to_decimal, RunConfig};
use crate::data::{load_csv, parse_date, PriceBar, PriceSeries};
use crate::error::{BacktestError, Result};
use crate::indicators::{CrossoverDetector, CrossoverEvent, MacdCalculator, MacdState};
use crate::metrics::{AnalyzerConfig, BacktestResult, PerformanceAnalyzer};
use crate::strategy::StrategyParams;

/// Prefix of a successful textual tool response.
pub const TOOL_SUCCESS_PREFIX: &str = "Back Test Finished. Results: \n";

/// Series handed to an external plotting routine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub params: StrategyParams,
    pub bars: Vec<PriceBar>,
    pub ema_short: Vec<f64>,
    pub ema_long: Vec<f64>,
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
    pub crossovers: Vec<CrossoverEvent>,
}

impl ChartData {
    fn new(series: &PriceSeries, state: MacdState, params: StrategyParams) -> Self {
        let crossovers = CrossoverDetector::detect(&state).collect();
        Self {
            params,
            bars: series.bars().to_vec(),
            ema_short: state.ema_short.values,
            ema_long: state.ema_long.values,
            macd: state.macd,
            signal: state.signal,
            histogram: state.histogram,
            crossovers,
        }
    }
}

/// Runs the MACD crossover strategy and analyzes the result.
#[derive(Debug, Clone)]
pub struct MacdBacktest {
    starting_cash: Decimal,
    simulator: SimulatorConfig,
    analyzer: AnalyzerConfig,
}

impl MacdBacktest {
    pub fn new(starting_cash: Decimal) -> Self {
        Self {
            starting_cash,
            simulator: SimulatorConfig::default(),
            analyzer: AnalyzerConfig::default(),
        }
    }

    pub fn from_config(config: &RunConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            starting_cash: config.starting_cash()?,
            simulator: config.simulator.clone(),
            analyzer: config.analyzer.clone(),
        })
    }

    pub fn with_simulator(mut self, simulator: SimulatorConfig) -> Self {
        self.simulator = simulator;
        self
    }

    pub fn with_analyzer(mut self, analyzer: AnalyzerConfig) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn starting_cash(&self) -> Decimal {
        self.starting_cash
    }

    /// Configuration checks that do not depend on the price data.
    pub fn validate(&self) -> Result<()> {
        if self.starting_cash <= Decimal::ZERO {
            return Err(BacktestError::config(format!(
                "starting cash must be positive (got {})",
                self.starting_cash
            )));
        }
        self.simulator.fees.validate()
    }

    /// Backtest `params` over the whole of `series`.
    pub fn run(&self, series: &PriceSeries, params: &StrategyParams) -> Result<BacktestResult> {
        self.run_detailed(series, params).map(|(_, result)| result)
    }

    /// Like [`run`](Self::run), also returning the equity curve and trade log.
    pub fn run_detailed(
        &self,
        series: &PriceSeries,
        params: &StrategyParams,
    ) -> Result<(SimulationOutcome, BacktestResult)> {
        params.validate()?;
        let state =
            MacdCalculator::compute(series, params.short_ema, params.long_ema, params.signal_ema)?;

        let outcome =
            BacktestSimulator::new(self.simulator.clone()).run(series, &state, self.starting_cash)?;
        let result = PerformanceAnalyzer::new(self.analyzer.clone())
            .analyze(&outcome)
            .with_params(*params);

        info!(
            "{}: final value {:.2}, Sharpe {}, max drawdown {:.2}%",
            params.key(),
            result.final_value,
            result.sharpe_ratio,
            result.drawdown.max_drawdown * 100.0
        );
        Ok((outcome, result))
    }

    /// Indicator series and crossover markers for plotting.
    pub fn chart_data(series: &PriceSeries, params: &StrategyParams) -> Result<ChartData> {
        params.validate()?;
        let state =
            MacdCalculator::compute(series, params.short_ema, params.long_ema, params.signal_ema)?;
        Ok(ChartData::new(series, state, *params))
    }
}

/// Load a CSV file and cut it to `[start, end]`.
pub fn load_range<P: AsRef<Path>>(path: P, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries> {
    load_csv(path)?.filter(start, end)
}

/// Parse an ISO date argument.
pub fn parse_date_arg(name: &str, value: &str) -> Result<NaiveDate> {
    parse_date(value)
        .ok_or_else(|| BacktestError::config(format!("invalid {} '{}' (expected YYYY-MM-DD)", name, value)))
}

/// Backtest entry point for callers that expect text back.
///
/// Returns [`TOOL_SUCCESS_PREFIX`] followed by the pretty-printed JSON
/// report, or a line starting with `Error:`. Never panics on bad input.
pub fn backtest_macd_tool<P: AsRef<Path>>(
    csv_path: P,
    start_date: &str,
    end_date: &str,
    strategy_params: &str,
    cash: f64,
) -> String {
    let result = run_tool(csv_path.as_ref(), start_date, end_date, strategy_params, cash);

    match result {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => format!("{}{}", TOOL_SUCCESS_PREFIX, json),
            Err(e) => format!("Error: failed to serialize results: {}", e),
        },
        Err(e) => tool_error(&e),
    }
}

fn run_tool(
    csv_path: &Path,
    start_date: &str,
    end_date: &str,
    strategy_params: &str,
    cash: f64,
) -> Result<BacktestResult> {
    let params = StrategyParams::from_json(strategy_params)?;
    let starting_cash = cash_to_decimal(cash)?;
    let start = parse_date_arg("start date", start_date)?;
    let end = parse_date_arg("end date", end_date)?;
    let series = load_range(csv_path, start, end)?;
    MacdBacktest::new(starting_cash).run(&series, &params)
}

fn tool_error(err: &BacktestError) -> String {
    match err {
        BacktestError::InsufficientData {
            required,
            available,
        } => format!(
            "Error: Not enough data available for the specified date range to calculate MACD \
             ({} bars required, {} available).",
            required, available
        ),
        BacktestError::EmptyRange { start, end } => format!(
            "Error: No data available for the specified date range ({} to {}).",
            start, end
        ),
        other => format!("Error: {}", other),
    }
}
