//! `rentflow-settlement` — late-fee and deposit arithmetic.
//!
//! Pure money math, all in integer cents. Late fees bill whole calendar days
//! past the agreed end date; deposit settlement is re-derivable at any time
//! from the fee totals and never goes negative in either direction.

pub mod deposit;
pub mod fees;

pub use deposit::{DepositSettlement, SettlementOverride};
pub use fees::{apply_basis_points, days_late, line_late_fee, LateFeeBreakdown, LateFeeLine};
