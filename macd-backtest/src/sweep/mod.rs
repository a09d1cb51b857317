//! Parameter sweeps.
//!
//! Grid search over short/long/signal EMA periods, run in parallel with
//! rayon and ranked by Sharpe ratio.

pub mod optimizer;

pub use optimizer::{BacktestSummary, ParameterGrid, ParameterSweep, SkippedRun, SweepEntry, SweepResult};
