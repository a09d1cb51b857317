//! Run configuration.
//!
//! Everything a backtest run can be tuned with, loadable from TOML:
//!
//! ```toml
//! starting_cash = 10000.0
//!
//! [params]
//! short_ema = 12
//! long_ema = 26
//! signal_ema = 9
//!
//! [simulator]
//! exit_policy = "reverse"
//! close_at_end = false
//!
//! [simulator.fees]
//! rate = 0.001
//!
//! [analyzer]
//! periods_per_year = 252.0
//! risk_free_rate = 0.0
//! ```
//!
//! Missing sections and keys take their defaults.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::backtest::SimulatorConfig;
use crate::error::{BacktestError, Result};
use crate::metrics::AnalyzerConfig;
use crate::strategy::StrategyParams;

/// Default starting cash for a run.
pub const DEFAULT_STARTING_CASH: f64 = 10_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub starting_cash: f64,
    pub params: StrategyParams,
    pub simulator: SimulatorConfig,
    pub analyzer: AnalyzerConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            starting_cash: DEFAULT_STARTING_CASH,
            params: StrategyParams::default(),
            simulator: SimulatorConfig::default(),
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.starting_cash()?;
        self.params.validate()?;
        self.simulator.fees.validate()?;
        if !(self.analyzer.periods_per_year > 0.0) {
            return Err(BacktestError::config(format!(
                "periods_per_year must be positive (got {})",
                self.analyzer.periods_per_year
            )));
        }
        Ok(())
    }

    /// Starting cash as money.
    pub fn starting_cash(&self) -> Result<Decimal> {
        cash_to_decimal(self.starting_cash)
    }
}

/// Convert a cash amount, rejecting non-positive and non-finite values.
pub fn cash_to_decimal(cash: f64) -> Result<Decimal> {
    if !cash.is_finite() || cash <= 0.0 {
        return Err(BacktestError::config(format!(
            "starting cash must be positive (got {})",
            cash
        )));
    }
    Decimal::try_from(cash)
        .map_err(|e| BacktestError::config(format!("starting cash {} is out of range: {}", cash, e)))
}
