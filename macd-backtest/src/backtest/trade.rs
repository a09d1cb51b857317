//! Position and trade records.
//!
//! Exactly one position is open at a time. It is created and closed only by
//! the simulator; each close (or flip) appends a [`Trade`] to the log.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of the book the portfolio is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    #[default]
    Flat,
}

impl Direction {
    /// +1 for long, -1 for short, 0 when flat.
    pub fn sign(&self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => Decimal::NEGATIVE_ONE,
            Self::Flat => Decimal::ZERO,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
            Self::Flat => "flat",
        }
    }
}

/// An open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub direction: Direction,
    /// Units held (always non-negative; the side is in `direction`).
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub entry_date: NaiveDate,
    pub entry_index: usize,
    pub entry_fee: Decimal,
}

impl Position {
    /// Signed market value at `price`, or `None` past the decimal range.
    pub fn market_value(&self, price: Decimal) -> Option<Decimal> {
        self.quantity
            .checked_mul(price)
            .map(|value| value * self.direction.sign())
    }

    /// Unrealized P&L at `price`, before fees.
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        (price - self.entry_price) * self.quantity * self.direction.sign()
    }

    pub fn is_long(&self) -> bool {
        self.direction == Direction::Long
    }

    pub fn is_short(&self) -> bool {
        self.direction == Direction::Short
    }
}

/// A completed round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_index: usize,
    pub exit_index: usize,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub direction: Direction,
    pub quantity: Decimal,
    /// P&L before fees.
    pub gross_pnl: Decimal,
    /// Entry plus exit fees.
    pub fees: Decimal,
    /// P&L after fees.
    pub pnl: Decimal,
}

impl Trade {
    /// Close `position` at `exit_price`.
    pub fn close(
        position: &Position,
        exit_date: NaiveDate,
        exit_index: usize,
        exit_price: Decimal,
        exit_fee: Decimal,
    ) -> Self {
        let gross_pnl = position.unrealized_pnl(exit_price);
        let fees = position.entry_fee + exit_fee;
        Self {
            entry_date: position.entry_date,
            exit_date,
            entry_index: position.entry_index,
            exit_index,
            entry_price: position.entry_price,
            exit_price,
            direction: position.direction,
            quantity: position.quantity,
            gross_pnl,
            fees,
            pnl: gross_pnl - fees,
        }
    }

    /// Net P&L strictly positive.
    pub fn is_winner(&self) -> bool {
        self.pnl > Decimal::ZERO
    }

    /// Bars between entry and exit.
    pub fn bars_held(&self) -> usize {
        self.exit_index - self.entry_index
    }

    /// Calendar days between entry and exit.
    pub fn days_held(&self) -> i64 {
        (self.exit_date - self.entry_date).num_days()
    }

    /// Net P&L as a fraction of entry notional.
    pub fn return_pct(&self) -> f64 {
        self.entry_price
            .checked_mul(self.quantity)
            .and_then(|notional| self.pnl.checked_div(notional))
            .and_then(|pct| pct.try_into().ok())
            .unwrap_or(0.0)
    }
}
