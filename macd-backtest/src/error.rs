//! Error types shared by every stage of a backtest run.
//!
//! Data-loading and configuration problems are detected eagerly and abort
//! the run. Numeric edge cases inside the analyzer are not errors; they are
//! reported as [`crate::metrics::Metric::Undefined`].

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("Malformed data: {0}")]
    MalformedData(String),

    #[error("No bars between {start} and {end}")]
    EmptyRange { start: NaiveDate, end: NaiveDate },

    #[error("Insufficient data: {required} bars required, {available} available")]
    InsufficientData { required: usize, available: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BacktestError {
    /// Whether the caller may succeed by retrying with other parameters or
    /// another date range.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EmptyRange { .. } | Self::InsufficientData { .. } | Self::InvalidConfiguration(_)
        )
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, BacktestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(BacktestError::InsufficientData {
            required: 26,
            available: 5
        }
        .is_retryable());
        assert!(BacktestError::config("bad").is_retryable());
        assert!(!BacktestError::MalformedData("row 3".into()).is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let err = BacktestError::InsufficientData {
            required: 26,
            available: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient data: 26 bars required, 5 available"
        );
    }
}
