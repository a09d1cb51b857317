//! MACD strategy parameters.
//!
//! Exchanged with callers as JSON text, e.g.
//! `{"short_ema": 12, "long_ema": 26, "signal_ema": 9}`.

use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrategyParams {
    pub short_ema: usize,
    pub long_ema: usize,
    pub signal_ema: usize,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            short_ema: 12,
            long_ema: 26,
            signal_ema: 9,
        }
    }
}

impl StrategyParams {
    pub fn new(short_ema: usize, long_ema: usize, signal_ema: usize) -> Self {
        Self {
            short_ema,
            long_ema,
            signal_ema,
        }
    }

    /// Parse and validate parameters from JSON text.
    ///
    /// Blank text yields the defaults; missing keys take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let params: Self = serde_json::from_str(text).map_err(|e| {
            BacktestError::config(format!("invalid JSON for strategy parameters: {}", e))
        })?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.short_ema == 0 || self.long_ema == 0 || self.signal_ema == 0 {
            return Err(BacktestError::config(format!(
                "EMA periods must be at least 1 ({})",
                self.key()
            )));
        }
        Ok(())
    }

    /// Bars needed before MACD is representative.
    pub fn lookback(&self) -> usize {
        self.short_ema.max(self.long_ema).max(self.signal_ema)
    }

    /// Compact identifier, e.g. `ema12-26_sig9`.
    pub fn key(&self) -> String {
        format!("ema{}-{}_sig{}", self.short_ema, self.long_ema, self.signal_ema)
    }
}
