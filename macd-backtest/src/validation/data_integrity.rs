//! Data integrity validation for daily price series.
//!
//! Validates:
//! - Price sanity (low <= open/close <= high)
//! - Date continuity (no gap longer than a week)
//! - Zero-volume bars
//! - Non-positive closes (no position can be opened at them)
//!
//! Checks never abort a run; the caller decides what to do with failures.

use serde::Serialize;

use crate::data::PriceSeries;

/// Largest calendar gap between bars before `date_gaps` fails.
pub const MAX_GAP_DAYS: i64 = 7;

/// How many offending dates to list in a check's details.
const MAX_DETAILS: usize = 5;

/// Result of a single validation check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
}

impl CheckResult {
    pub fn pass(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: message.to_string(),
            details: None,
        }
    }

    pub fn fail(name: &str, message: &str, details: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: message.to_string(),
            details,
        }
    }
}

/// Integrity report for one price series.
#[derive(Debug, Clone, Serialize)]
pub struct DataIntegrityReport {
    pub bar_count: usize,
    pub first_date: Option<chrono::NaiveDate>,
    pub last_date: Option<chrono::NaiveDate>,
    pub checks: Vec<CheckResult>,
}

impl DataIntegrityReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failed_checks(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn summary(&self) -> String {
        let passed = self.checks.iter().filter(|c| c.passed).count();
        let range = match (self.first_date, self.last_date) {
            (Some(first), Some(last)) => format!("{} to {}", first, last),
            _ => "empty".to_string(),
        };
        format!(
            "{} bars ({}): {}/{} checks passed",
            self.bar_count,
            range,
            passed,
            self.checks.len()
        )
    }
}

/// Validator for price series integrity.
pub struct DataIntegrityValidator;

impl DataIntegrityValidator {
    /// Run all checks on `series`.
    pub fn validate(series: &PriceSeries) -> DataIntegrityReport {
        let checks = vec![
            Self::check_price_sanity(series),
            Self::check_date_gaps(series),
            Self::check_zero_volume(series),
            Self::check_non_positive_close(series),
        ];

        DataIntegrityReport {
            bar_count: series.len(),
            first_date: series.first_date(),
            last_date: series.last_date(),
            checks,
        }
    }

    /// Check that open and close lie within [low, high].
    fn check_price_sanity(series: &PriceSeries) -> CheckResult {
        let bad: Vec<String> = series
            .iter()
            .filter(|b| {
                b.low > b.high
                    || b.open < b.low
                    || b.open > b.high
                    || b.close < b.low
                    || b.close > b.high
            })
            .map(|b| b.date.to_string())
            .collect();

        if bad.is_empty() {
            CheckResult::pass("price_sanity", "All bars satisfy low <= open/close <= high")
        } else {
            CheckResult::fail(
                "price_sanity",
                &format!("{} bars outside their high/low range", bad.len()),
                Some(list(&bad)),
            )
        }
    }

    /// Check for calendar gaps longer than a week.
    fn check_date_gaps(series: &PriceSeries) -> CheckResult {
        let gaps: Vec<String> = series
            .bars()
            .windows(2)
            .filter_map(|w| {
                let days = (w[1].date - w[0].date).num_days();
                (days > MAX_GAP_DAYS).then(|| format!("{} to {} ({} days)", w[0].date, w[1].date, days))
            })
            .collect();

        if gaps.is_empty() {
            CheckResult::pass("date_gaps", &format!("No gaps longer than {} days", MAX_GAP_DAYS))
        } else {
            CheckResult::fail(
                "date_gaps",
                &format!("{} major gaps found", gaps.len()),
                Some(list(&gaps)),
            )
        }
    }

    fn check_zero_volume(series: &PriceSeries) -> CheckResult {
        let zero: Vec<String> = series
            .iter()
            .filter(|b| b.volume == 0.0)
            .map(|b| b.date.to_string())
            .collect();

        if zero.is_empty() {
            CheckResult::pass("zero_volume", "Every bar has volume")
        } else {
            CheckResult::fail(
                "zero_volume",
                &format!("{} bars with zero volume", zero.len()),
                Some(list(&zero)),
            )
        }
    }

    fn check_non_positive_close(series: &PriceSeries) -> CheckResult {
        let bad: Vec<String> = series
            .iter()
            .filter(|b| b.close <= 0.0)
            .map(|b| b.date.to_string())
            .collect();

        if bad.is_empty() {
            CheckResult::pass("non_positive_close", "All closes positive")
        } else {
            CheckResult::fail(
                "non_positive_close",
                &format!("{} bars with close <= 0", bad.len()),
                Some(list(&bad)),
            )
        }
    }
}

fn list(items: &[String]) -> String {
    let mut shown = items.iter().take(MAX_DETAILS).cloned().collect::<Vec<_>>().join(", ");
    if items.len() > MAX_DETAILS {
        shown.push_str(&format!(", ... ({} more)", items.len() - MAX_DETAILS));
    }
    shown
}
