//! Fee model for order execution.
//!
//! Fee per order = rate * notional + fixed, clamped to the configured
//! minimum and maximum. The default model charges nothing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, Result};

/// Fee charged on a single order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fee {
    pub notional: Decimal,
    pub total: Decimal,
}

/// Configurable fee model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeModel {
    /// Proportional fee on traded notional (0.001 = 10 bps).
    pub rate: Decimal,
    /// Flat fee per order.
    pub fixed_per_order: Decimal,
    /// Minimum fee per order.
    pub min_per_order: Decimal,
    /// Maximum fee per order (0 = unlimited).
    pub max_per_order: Decimal,
}

impl Default for FeeModel {
    fn default() -> Self {
        Self::none()
    }
}

impl FeeModel {
    /// Proportional-only fee model.
    pub fn new(rate: Decimal) -> Self {
        Self {
            rate,
            ..Self::none()
        }
    }

    /// Zero-fee model.
    pub fn none() -> Self {
        Self {
            rate: Decimal::ZERO,
            fixed_per_order: Decimal::ZERO,
            min_per_order: Decimal::ZERO,
            max_per_order: Decimal::ZERO,
        }
    }

    pub fn with_fixed(mut self, fixed: Decimal) -> Self {
        self.fixed_per_order = fixed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("rate", self.rate),
            ("fixed_per_order", self.fixed_per_order),
            ("min_per_order", self.min_per_order),
            ("max_per_order", self.max_per_order),
        ];
        for (name, value) in fields {
            if value < Decimal::ZERO {
                return Err(BacktestError::config(format!(
                    "fee {} must not be negative ({})",
                    name, value
                )));
            }
        }
        Ok(())
    }

    pub fn is_zero(&self) -> bool {
        self.rate.is_zero() && self.fixed_per_order.is_zero() && self.min_per_order.is_zero()
    }

    /// Fee for an order of the given notional value.
    pub fn calculate(&self, notional: Decimal) -> Fee {
        let mut total = self
            .rate
            .saturating_mul(notional.abs())
            .saturating_add(self.fixed_per_order);

        if total < self.min_per_order {
            total = self.min_per_order;
        }

        if self.max_per_order > Decimal::ZERO && total > self.max_per_order {
            total = self.max_per_order;
        }

        Fee { notional, total }
    }

    /// Largest notional that can be traded with `cash` once its fee is paid.
    ///
    /// Returns `None` when nothing remains after fees.
    pub fn max_notional(&self, cash: Decimal) -> Option<Fee> {
        if cash <= Decimal::ZERO {
            return None;
        }

        let mut notional = (cash - self.fixed_per_order) / (Decimal::ONE + self.rate);
        let mut fee = self.calculate(notional);
        if notional.saturating_add(fee.total) > cash {
            // Minimum fee kicked in.
            notional = cash - fee.total;
            fee = self.calculate(notional);
        }

        if notional <= Decimal::ZERO {
            return None;
        }
        Some(Fee {
            notional,
            total: fee.total,
        })
    }
}
