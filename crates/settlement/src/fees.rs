use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentflow_core::ValueObject;

/// Whole calendar days late, by date, not by elapsed hours.
///
/// Returning at 23:50 on the due date is on time; returning at 00:10 the next
/// morning is one day late. Never negative.
pub fn days_late(due: DateTime<Utc>, returned: DateTime<Utc>) -> u32 {
    let days = (returned.date_naive() - due.date_naive()).num_days();
    days.max(0) as u32
}

/// Late fee for one line slice, in cents: daily rate per unit per day late.
///
/// Widened to u128 internally so large rates cannot overflow; a product
/// beyond `u64::MAX` saturates.
pub fn line_late_fee(daily_rate: u64, quantity: u32, days_late: u32) -> u64 {
    let fee = daily_rate as u128 * quantity as u128 * days_late as u128;
    u64::try_from(fee).unwrap_or(u64::MAX)
}

/// Apply a basis-point rate (1/100 of a percent) to an amount, truncating.
///
/// Widened to u128 internally so rates on large amounts cannot overflow.
pub fn apply_basis_points(amount: u64, rate_bp: u32) -> u64 {
    (amount as u128 * rate_bp as u128 / 10_000) as u64
}

/// Per-line late fee detail for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LateFeeLine {
    pub line_no: u32,
    pub quantity: u32,
    pub daily_rate: u64,
    pub days_late: u32,
    pub amount: u64,
}

impl LateFeeLine {
    pub fn compute(
        line_no: u32,
        quantity: u32,
        daily_rate: u64,
        due: DateTime<Utc>,
        returned: DateTime<Utc>,
    ) -> Self {
        let days = days_late(due, returned);
        Self {
            line_no,
            quantity,
            daily_rate,
            days_late: days,
            amount: line_late_fee(daily_rate, quantity, days),
        }
    }
}

/// Late fees across the lines of one transaction or return.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LateFeeBreakdown {
    pub lines: Vec<LateFeeLine>,
}

impl LateFeeBreakdown {
    pub fn new(lines: Vec<LateFeeLine>) -> Self {
        Self { lines }
    }

    pub fn total(&self) -> u64 {
        self.lines.iter().map(|l| l.amount).sum()
    }

    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }
}

impl ValueObject for LateFeeLine {}
impl ValueObject for LateFeeBreakdown {}
