//! Validation of loaded price data.
//!
//! Integrity checks are advisory: they report, they never reject a series
//! that already passed loading.

pub mod data_integrity;

pub use data_integrity::{CheckResult, DataIntegrityReport, DataIntegrityValidator, MAX_GAP_DAYS};
