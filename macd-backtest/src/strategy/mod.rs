//! Trading strategies.
//!
//! A strategy looks at one bar and the current position side, and decides
//! what the simulator should do at that bar's close. The simulator owns all
//! accounting, so new strategies plug in without touching it.

pub mod macd_cross;
pub mod params;

use serde::{Deserialize, Serialize};

use crate::backtest::Direction;
use crate::data::PriceBar;

pub use macd_cross::MacdCrossStrategy;
pub use params::StrategyParams;

/// Decision for the current bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Hold,
    /// Go long; closes a short first.
    OpenLong,
    /// Go short; closes a long first.
    OpenShort,
    /// Go flat.
    Close,
}

/// What a bearish signal does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPolicy {
    /// Bearish closes any long and opens a short.
    #[default]
    Reverse,
    /// Bearish only closes a long; the portfolio is never short.
    FlattenOnly,
}

/// Bar-by-bar decision rule.
pub trait Strategy {
    fn name(&self) -> &str;

    /// Decide the action at bar `index`, using only information available
    /// at or before that bar's close.
    fn on_bar(&mut self, index: usize, bar: &PriceBar, position: Direction) -> Action;
}
