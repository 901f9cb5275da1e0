use serde::{Deserialize, Serialize};

use rentflow_core::{DomainError, DomainResult, ValueObject};
use rentflow_rentals::TransactionId;

/// Manual deviation from the computed release amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementOverride {
    pub amount: u64,
    pub reason: String,
}

/// Derived settlement of a held deposit.
///
/// Not stored independently: recomputed on demand from the deposit and the
/// fee totals accumulated across all return events of a transaction, so
/// re-running the derivation with unchanged inputs always yields the same
/// numbers. Deductions beyond the deposit become an outstanding customer
/// balance, never a negative release and never an automatic charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositSettlement {
    pub transaction_id: TransactionId,
    pub deposit_held: u64,
    pub late_fees: u64,
    pub damage_fees: u64,
    pub cleaning_fees: u64,
    pub release_amount: u64,
    pub outstanding_balance: u64,
    pub applied_override: Option<SettlementOverride>,
}

impl DepositSettlement {
    pub fn derive(
        transaction_id: TransactionId,
        deposit_held: u64,
        late_fees: u64,
        damage_fees: u64,
        cleaning_fees: u64,
    ) -> Self {
        let deductions = late_fees
            .saturating_add(damage_fees)
            .saturating_add(cleaning_fees);

        Self {
            transaction_id,
            deposit_held,
            late_fees,
            damage_fees,
            cleaning_fees,
            release_amount: deposit_held.saturating_sub(deductions),
            outstanding_balance: deductions.saturating_sub(deposit_held),
            applied_override: None,
        }
    }

    pub fn deductions_total(&self) -> u64 {
        self.late_fees
            .saturating_add(self.damage_fees)
            .saturating_add(self.cleaning_fees)
    }

    /// Replace the computed release with a manual amount.
    ///
    /// Requires a reason and cannot release more than is held. The computed
    /// outstanding balance is left untouched; an override settles the
    /// deposit, not the customer's debt.
    pub fn with_override(
        mut self,
        amount: u64,
        reason: impl Into<String>,
    ) -> DomainResult<Self> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(DomainError::validation(
                "settlement override requires a reason",
            ));
        }
        if amount > self.deposit_held {
            return Err(DomainError::validation(format!(
                "override {} exceeds held deposit {}",
                amount, self.deposit_held
            )));
        }

        self.release_amount = amount;
        self.applied_override = Some(SettlementOverride { amount, reason });
        Ok(self)
    }

    pub fn is_overridden(&self) -> bool {
        self.applied_override.is_some()
    }
}

impl ValueObject for DepositSettlement {}
