//! Bar-by-bar backtest simulation.
//!
//! This module provides the execution side of a backtest:
//! - Position and trade records (long, short, flat)
//! - Fee model applied per order
//! - The simulator loop with mark-to-market equity tracking

pub mod commission;
pub mod engine;
pub mod trade;

pub use commission::{Fee, FeeModel};
pub use engine::{BacktestSimulator, EquityPoint, PortfolioState, SimulationOutcome, SimulatorConfig};
pub use trade::{Direction, Position, Trade};
