//! Indicator engine.
//!
//! - EMA with first-value seeding
//! - MACD line, signal line and histogram
//! - Lazy crossover detection between MACD and signal

pub mod crossover;
pub mod ema;
pub mod macd;

pub use crossover::{CrossDirection, CrossoverDetector, CrossoverEvent, Crossovers};
pub use ema::{ema, Ema, EmaSeries};
pub use macd::{MacdCalculator, MacdState};
