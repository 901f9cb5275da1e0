//! Money-side operations: frozen late fees, deposit reconciliation,
//! payments and refunds.
//!
//! Settlement is a derivation, not a stored balance. Every call recomputes
//! the release from the deposit held on the transaction and the fee totals
//! frozen on its return records, so re-running it with no new return events
//! yields identical numbers. Deductions beyond the deposit surface as an
//! outstanding customer balance and are never charged automatically.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

use rentflow_audit::{AuditEntry, AuditJournal, EntityRef};
use rentflow_catalog::CatalogSource;
use rentflow_core::{Aggregate, DomainError, DomainResult, ExpectedVersion, UserId};
use rentflow_rentals::{
    MarkPaymentOverdue, PaymentMethod, RecordPayment, RefundTransaction, TransactionCommand,
    TransactionId, TransactionKind, TransactionStatus,
};
use rentflow_returns::ReturnId;
use rentflow_settlement::{DepositSettlement, LateFeeBreakdown, LateFeeLine};

use crate::service::RentalEngine;

impl<C, J> RentalEngine<C, J>
where
    C: CatalogSource,
    J: AuditJournal,
{
    /// Per-line late fees of a recorded return, as frozen at drop-off.
    pub fn late_fee_breakdown(&self, return_id: ReturnId) -> DomainResult<LateFeeBreakdown> {
        let ret = self
            .returns
            .get(return_id)
            .ok_or_else(DomainError::not_found)?;
        let lines = ret
            .lines()
            .iter()
            .map(|line| LateFeeLine {
                line_no: line.line_no,
                quantity: line.quantity,
                daily_rate: line.daily_rate,
                days_late: line.days_late,
                amount: line.late_fee,
            })
            .collect();
        Ok(LateFeeBreakdown::new(lines))
    }

    /// Quote the late fees that would accrue if everything still outstanding
    /// came back at `as_of`.
    ///
    /// A pure read: nothing is recorded and nothing is frozen. Quantity
    /// already returned keeps the fee frozen at its own drop-off and is not
    /// part of the quote, so after a partial return the projection covers
    /// only the remainder.
    pub fn project_late_fees(
        &self,
        transaction_id: TransactionId,
        as_of: DateTime<Utc>,
    ) -> DomainResult<LateFeeBreakdown> {
        let txn = self
            .transactions
            .get(transaction_id)
            .ok_or_else(DomainError::not_found)?;
        if txn.kind() != TransactionKind::Rental {
            return Err(DomainError::validation(
                "late fees apply to rental transactions",
            ));
        }

        let mut lines = Vec::new();
        for line in txn.lines() {
            if line.outstanding == 0 {
                continue;
            }
            let window = line.window.ok_or_else(|| {
                DomainError::invariant(format!("line {} has no booking window", line.line_no))
            })?;
            lines.push(LateFeeLine::compute(
                line.line_no,
                line.outstanding,
                line.daily_rate,
                self.policy.late_fee_due(window.ends_at),
                as_of,
            ));
        }
        Ok(LateFeeBreakdown::new(lines))
    }

    /// Derive the deposit settlement without touching anything.
    ///
    /// Usable at any point in the transaction's life; fees accumulate as
    /// returns come in.
    pub fn preview_settlement(
        &self,
        transaction_id: TransactionId,
    ) -> DomainResult<DepositSettlement> {
        let txn = self
            .transactions
            .get(transaction_id)
            .ok_or_else(DomainError::not_found)?;
        let mut late_fees = 0u64;
        let mut damage_fees = 0u64;
        let mut cleaning_fees = 0u64;
        for ret in self.returns.for_transaction(transaction_id) {
            late_fees = late_fees.saturating_add(ret.late_fees());
            damage_fees = damage_fees.saturating_add(ret.damage_fees());
            cleaning_fees = cleaning_fees.saturating_add(ret.cleaning_fees());
        }
        Ok(DepositSettlement::derive(
            transaction_id,
            txn.deposit_held(),
            late_fees,
            damage_fees,
            cleaning_fees,
        ))
    }

    /// Settle the held deposit of a finished transaction.
    ///
    /// The release is the same derivation as [`Self::preview_settlement`];
    /// an override replaces the computed amount, is capped at the held
    /// deposit and must carry a reason. Each call lands in the audit journal
    /// with the full settlement snapshot.
    pub fn release_deposit(
        &self,
        transaction_id: TransactionId,
        override_with: Option<(u64, String)>,
        actor: UserId,
    ) -> DomainResult<DepositSettlement> {
        let _gate = self.guard();
        let txn = self
            .transactions
            .get(transaction_id)
            .ok_or_else(DomainError::not_found)?;
        if !matches!(
            txn.status(),
            TransactionStatus::Completed | TransactionStatus::Refunded
        ) {
            return Err(DomainError::invalid_transition(
                format!("transaction {transaction_id}"),
                txn.status().to_string(),
                "settled",
            ));
        }

        let mut settlement = self.preview_settlement(transaction_id)?;
        if let Some((amount, reason)) = override_with {
            settlement = settlement.with_override(amount, reason)?;
        }

        let details = serde_json::to_value(&settlement).unwrap_or(JsonValue::Null);
        let mut entry = AuditEntry::new(
            EntityRef::settlement(transaction_id.0),
            "settlement.deposit.released",
            actor,
            self.now(),
        )
        .with_details(details);
        if let Some(applied) = &settlement.applied_override {
            entry = entry.with_reason(applied.reason.clone());
        }
        self.journal.record(entry);

        info!(
            transaction = %transaction_id,
            release = settlement.release_amount,
            outstanding = settlement.outstanding_balance,
            "deposit settled"
        );
        Ok(settlement)
    }

    /// Apply a payment against an open transaction's balance.
    ///
    /// Payment status walks pending, partially paid, paid as the running
    /// total covers the amount due; overpayment is recorded, not rejected.
    pub fn record_payment(
        &self,
        transaction_id: TransactionId,
        amount: u64,
        method: PaymentMethod,
        reference: Option<String>,
        actor: UserId,
    ) -> DomainResult<()> {
        let _gate = self.guard();
        let txn = self
            .transactions
            .get(transaction_id)
            .ok_or_else(DomainError::not_found)?;
        let events = self.transactions.execute(
            transaction_id,
            ExpectedVersion::Exact(txn.version()),
            &TransactionCommand::RecordPayment(RecordPayment {
                transaction_id,
                amount,
                method,
                reference,
                actor,
                occurred_at: self.now(),
            }),
        )?;
        self.audit_all(&events);
        Ok(())
    }

    /// Flag an unpaid confirmed or running transaction as overdue.
    pub fn mark_payment_overdue(
        &self,
        transaction_id: TransactionId,
        actor: UserId,
    ) -> DomainResult<()> {
        let _gate = self.guard();
        let txn = self
            .transactions
            .get(transaction_id)
            .ok_or_else(DomainError::not_found)?;
        let events = self.transactions.execute(
            transaction_id,
            ExpectedVersion::Exact(txn.version()),
            &TransactionCommand::MarkPaymentOverdue(MarkPaymentOverdue {
                transaction_id,
                actor,
                occurred_at: self.now(),
            }),
        )?;
        self.audit_all(&events);
        Ok(())
    }

    /// Refund a completed transaction.
    pub fn refund_transaction(
        &self,
        transaction_id: TransactionId,
        reason: impl Into<String>,
        actor: UserId,
    ) -> DomainResult<()> {
        let _gate = self.guard();
        let txn = self
            .transactions
            .get(transaction_id)
            .ok_or_else(DomainError::not_found)?;
        let events = self.transactions.execute(
            transaction_id,
            ExpectedVersion::Exact(txn.version()),
            &TransactionCommand::RefundTransaction(RefundTransaction {
                transaction_id,
                reason: reason.into(),
                actor,
                occurred_at: self.now(),
            }),
        )?;
        self.audit_all(&events);
        info!(transaction = %transaction_id, "transaction refunded");
        Ok(())
    }
}
