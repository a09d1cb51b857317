pub mod backtest;
pub mod config;
pub mod data;
pub mod error;
pub mod indicators;
pub mod metrics;
pub mod pipeline;
pub mod strategy;
pub mod sweep;
pub mod validation;

// Re-export commonly used types
pub use data::{PriceBar, PriceSeries};
pub use error::{BacktestError, Result};
pub use indicators::{CrossDirection, CrossoverDetector, CrossoverEvent, MacdCalculator, MacdState};
pub use backtest::{BacktestSimulator, FeeModel, Position, SimulationOutcome, SimulatorConfig, Trade};
pub use strategy::{Action, ExitPolicy, MacdCrossStrategy, Strategy, StrategyParams};
pub use metrics::{BacktestResult, Metric, PerformanceAnalyzer};
pub use pipeline::{backtest_macd_tool, ChartData, MacdBacktest};
pub use sweep::{ParameterGrid, ParameterSweep, SweepResult};
pub use config::RunConfig;
pub use validation::DataIntegrityValidator;
