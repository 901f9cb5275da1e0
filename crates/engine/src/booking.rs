//! Booking and sale pipelines: from quote to units out the door.
//!
//! Each pipeline runs under the engine gate and follows validate-first
//! dispatch: commands are dry-run against a clone before anything moves, so
//! the common rejections cost nothing. Multi-step creation keeps an undo
//! list; a failure part-way releases claims and retires the draft instead
//! of leaving it half-built.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use rentflow_audit::AuditJournal;
use rentflow_catalog::{CatalogSource, SkuId};
use rentflow_core::{
    Aggregate, AggregateId, CustomerId, DomainError, DomainResult, ExpectedVersion, LocationId,
    UserId,
};
use rentflow_inventory::{TransitionUnit, UnitCommand, UnitStatus};
use rentflow_rentals::{
    AddLine, AttachClaim, BookingWindow, CancelTransaction, CompleteTransaction,
    ConfirmTransaction, DeactivateTransaction, ExtendRental, LineDraft, OpenTransaction,
    PaymentMethod, PriceTransaction, RecordPayment, StartRental, SubmitTransaction,
    TransactionCommand, TransactionEvent, TransactionId, TransactionKind, TransactionStatus,
};

use crate::book::ClaimKey;
use crate::service::RentalEngine;

/// One requested line of a booking or sale.
#[derive(Debug, Clone)]
pub struct OrderItem {
    pub sku_id: SkuId,
    pub quantity: u32,
    /// Replaces the catalog rate: the daily rate for rental lines, the
    /// unit price for sale lines.
    pub price_override: Option<u64>,
    /// Flat discount off the line gross, in cents.
    pub discount: u64,
}

/// Undo actions for an aborted creation pipeline, run newest first.
enum CompensationStep {
    ReleaseClaim(ClaimKey),
    DeactivateTransaction(TransactionId),
}

impl<C, J> RentalEngine<C, J>
where
    C: CatalogSource,
    J: AuditJournal,
{
    /// Open, fill, claim, price and submit a rental booking in one step.
    ///
    /// All lines share the requested window. Returns the transaction id of
    /// the new booking, left in `Pending` awaiting checkout.
    pub fn create_booking(
        &self,
        customer_id: CustomerId,
        location: LocationId,
        items: Vec<OrderItem>,
        window: BookingWindow,
        actor: UserId,
    ) -> DomainResult<TransactionId> {
        let _gate = self.guard();
        if items.is_empty() {
            return Err(DomainError::validation("a booking needs at least one item"));
        }

        let days = window.rental_days();
        let mut drafts = Vec::with_capacity(items.len());
        for item in &items {
            let sku = self.sku(item.sku_id)?;
            if !sku.allows_rental_days(days) {
                return Err(DomainError::validation(format!(
                    "SKU {} cannot be rented for {days} days",
                    sku.id
                )));
            }
            drafts.push(LineDraft {
                sku_id: item.sku_id,
                quantity: item.quantity,
                unit_price: 0,
                discount: item.discount,
                daily_rate: item.price_override.unwrap_or(sku.daily_rate),
                window: Some(window),
            });
        }

        let transaction_id = TransactionId::new(AggregateId::new());
        let mut undo = Vec::new();
        if let Err(err) = self.build_transaction(
            transaction_id,
            customer_id,
            location,
            TransactionKind::Rental,
            drafts,
            actor,
            &mut undo,
        ) {
            self.compensate(undo, actor);
            return Err(err);
        }
        info!(transaction = %transaction_id, items = items.len(), "booking created");
        Ok(transaction_id)
    }

    /// Open, fill, claim, price and submit a sale in one step.
    pub fn create_sale(
        &self,
        customer_id: CustomerId,
        location: LocationId,
        items: Vec<OrderItem>,
        actor: UserId,
    ) -> DomainResult<TransactionId> {
        let _gate = self.guard();
        if items.is_empty() {
            return Err(DomainError::validation("a sale needs at least one item"));
        }

        let mut drafts = Vec::with_capacity(items.len());
        for item in &items {
            let sku = self.sku(item.sku_id)?;
            if !sku.is_saleable {
                return Err(DomainError::validation(format!(
                    "SKU {} is not saleable",
                    sku.id
                )));
            }
            drafts.push(LineDraft {
                sku_id: item.sku_id,
                quantity: item.quantity,
                unit_price: item.price_override.unwrap_or(sku.unit_price),
                discount: item.discount,
                daily_rate: 0,
                window: None,
            });
        }

        let transaction_id = TransactionId::new(AggregateId::new());
        let mut undo = Vec::new();
        if let Err(err) = self.build_transaction(
            transaction_id,
            customer_id,
            location,
            TransactionKind::Sale,
            drafts,
            actor,
            &mut undo,
        ) {
            self.compensate(undo, actor);
            return Err(err);
        }
        info!(transaction = %transaction_id, items = items.len(), "sale created");
        Ok(transaction_id)
    }

    /// Take payment on a pending transaction and confirm it.
    pub fn checkout(
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
        if txn.status() != TransactionStatus::Pending {
            return Err(DomainError::invalid_transition(
                format!("transaction {transaction_id}"),
                txn.status().to_string(),
                "confirmed",
            ));
        }

        let occurred_at = self.now();
        let events = self.transactions.execute(
            transaction_id,
            ExpectedVersion::Exact(txn.version()),
            &TransactionCommand::RecordPayment(RecordPayment {
                transaction_id,
                amount,
                method,
                reference,
                actor,
                occurred_at,
            }),
        )?;
        self.audit_all(&events);

        let events = self.transactions.execute(
            transaction_id,
            ExpectedVersion::Any,
            &TransactionCommand::ConfirmTransaction(ConfirmTransaction {
                transaction_id,
                actor,
                occurred_at,
            }),
        )?;
        self.audit_all(&events);
        info!(transaction = %transaction_id, amount, "checkout complete");
        Ok(())
    }

    /// Hand the claimed units to the customer and start the rental clock.
    pub fn pickup(&self, transaction_id: TransactionId, actor: UserId) -> DomainResult<()> {
        let _gate = self.guard();
        let txn = self
            .transactions
            .get(transaction_id)
            .ok_or_else(DomainError::not_found)?;

        let occurred_at = self.now();
        let start = TransactionCommand::StartRental(StartRental {
            transaction_id,
            actor,
            occurred_at,
        });
        txn.handle(&start)?;

        let claims = self.book.claims_for_transaction(transaction_id);
        if claims.is_empty() {
            return Err(DomainError::invariant(format!(
                "transaction {transaction_id} has no claims to pick up"
            )));
        }

        let commands: Vec<UnitCommand> = claims
            .iter()
            .flat_map(|claim| claim.unit_ids.iter().copied())
            .map(|unit_id| {
                UnitCommand::TransitionUnit(TransitionUnit {
                    unit_id,
                    new_status: UnitStatus::Rented,
                    reason: Some(format!("picked up on {transaction_id}")),
                    actor,
                    occurred_at,
                })
            })
            .collect();
        let unit_events = self.registry.execute_batch(&commands)?;

        let events = self.transactions.execute(
            transaction_id,
            ExpectedVersion::Exact(txn.version()),
            &start,
        )?;
        self.book.mark_picked_up(transaction_id)?;

        self.audit_all(&unit_events);
        self.audit_all(&events);
        info!(transaction = %transaction_id, units = commands.len(), "rental picked up");
        Ok(())
    }

    /// Push an in-progress rental's end date out, charging for the extra
    /// days. Returns the added charge in cents.
    pub fn extend_rental(
        &self,
        transaction_id: TransactionId,
        new_ends_at: DateTime<Utc>,
        actor: UserId,
    ) -> DomainResult<u64> {
        let _gate = self.guard();
        let txn = self
            .transactions
            .get(transaction_id)
            .ok_or_else(DomainError::not_found)?;

        // Lines the extension actually reaches must stay inside their
        // SKU's rental limits.
        for line in txn.lines() {
            let Some(window) = line.window else { continue };
            let Ok(extended) = window.extended_to(new_ends_at) else {
                continue;
            };
            let sku = self.sku(line.sku_id)?;
            if !sku.allows_rental_days(extended.rental_days()) {
                return Err(DomainError::validation(format!(
                    "SKU {} cannot be rented for {} days",
                    sku.id,
                    extended.rental_days()
                )));
            }
        }

        let events = self.transactions.execute(
            transaction_id,
            ExpectedVersion::Exact(txn.version()),
            &TransactionCommand::ExtendRental(ExtendRental {
                transaction_id,
                new_ends_at,
                actor,
                occurred_at: self.now(),
            }),
        )?;
        self.book.extend_windows(transaction_id, new_ends_at)?;

        let added: u64 = events
            .iter()
            .map(|event| match event {
                TransactionEvent::RentalExtended(e) => {
                    e.lines.iter().map(|l| l.charge).sum::<u64>()
                }
                _ => 0,
            })
            .sum();
        self.audit_all(&events);
        info!(transaction = %transaction_id, added, "rental extended");
        Ok(added)
    }

    /// Cancel a transaction that has not gone out, releasing its claims.
    pub fn cancel_transaction(
        &self,
        transaction_id: TransactionId,
        reason: Option<String>,
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
            &TransactionCommand::CancelTransaction(CancelTransaction {
                transaction_id,
                reason,
                actor,
                occurred_at: self.now(),
            }),
        )?;
        self.audit_all(&events);

        for claim in self.book.claims_for_transaction(transaction_id) {
            let released = self.release_inner(claim.key, actor)?;
            self.audit_all(&released);
        }
        info!(transaction = %transaction_id, "transaction cancelled");
        Ok(())
    }

    /// Finalize a confirmed sale: the claimed units leave as sold and the
    /// transaction completes.
    pub fn complete_sale(&self, transaction_id: TransactionId, actor: UserId) -> DomainResult<()> {
        let _gate = self.guard();
        let txn = self
            .transactions
            .get(transaction_id)
            .ok_or_else(DomainError::not_found)?;
        if txn.kind() != TransactionKind::Sale {
            return Err(DomainError::validation(format!(
                "transaction {transaction_id} is not a sale"
            )));
        }

        let occurred_at = self.now();
        let complete = TransactionCommand::CompleteTransaction(CompleteTransaction {
            transaction_id,
            actor,
            occurred_at,
        });
        txn.handle(&complete)?;

        let claims = self.book.claims_for_transaction(transaction_id);
        let commands: Vec<UnitCommand> = claims
            .iter()
            .flat_map(|claim| claim.unit_ids.iter().copied())
            .map(|unit_id| {
                UnitCommand::TransitionUnit(TransitionUnit {
                    unit_id,
                    new_status: UnitStatus::Sold,
                    reason: Some(format!("sold on {transaction_id}")),
                    actor,
                    occurred_at,
                })
            })
            .collect();
        let unit_events = self.registry.execute_batch(&commands)?;

        let events = self.transactions.execute(
            transaction_id,
            ExpectedVersion::Exact(txn.version()),
            &complete,
        )?;
        for claim in &claims {
            self.book.remove(claim.key);
        }

        self.audit_all(&unit_events);
        self.audit_all(&events);
        info!(transaction = %transaction_id, units = commands.len(), "sale completed");
        Ok(())
    }

    /// Soft-delete a transaction that never went out, releasing any claims
    /// it still holds.
    pub fn deactivate_transaction(
        &self,
        transaction_id: TransactionId,
        reason: String,
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
            &TransactionCommand::DeactivateTransaction(DeactivateTransaction {
                transaction_id,
                reason,
                actor,
                occurred_at: self.now(),
            }),
        )?;
        self.audit_all(&events);

        for claim in self.book.claims_for_transaction(transaction_id) {
            let released = self.release_inner(claim.key, actor)?;
            self.audit_all(&released);
        }
        info!(transaction = %transaction_id, "transaction deactivated");
        Ok(())
    }

    /// Shared creation pipeline: open, add lines, claim units, price,
    /// submit. Pushes undo steps as it goes; the caller compensates on
    /// failure.
    #[allow(clippy::too_many_arguments)]
    fn build_transaction(
        &self,
        transaction_id: TransactionId,
        customer_id: CustomerId,
        location: LocationId,
        kind: TransactionKind,
        drafts: Vec<LineDraft>,
        actor: UserId,
        undo: &mut Vec<CompensationStep>,
    ) -> DomainResult<()> {
        let occurred_at = self.now();

        let events = self.transactions.execute(
            transaction_id,
            ExpectedVersion::Exact(0),
            &TransactionCommand::OpenTransaction(OpenTransaction {
                transaction_id,
                kind,
                customer_id,
                location,
                actor,
                occurred_at,
            }),
        )?;
        self.audit_all(&events);
        undo.push(CompensationStep::DeactivateTransaction(transaction_id));

        for draft in drafts {
            let events = self.transactions.execute(
                transaction_id,
                ExpectedVersion::Any,
                &TransactionCommand::AddLine(AddLine {
                    transaction_id,
                    line: draft,
                    actor,
                    occurred_at,
                }),
            )?;
            self.audit_all(&events);
        }

        let txn = self
            .transactions
            .get(transaction_id)
            .ok_or_else(DomainError::not_found)?;
        let specs: Vec<(u32, SkuId, u32, Option<BookingWindow>)> = txn
            .lines()
            .iter()
            .map(|l| (l.line_no, l.sku_id, l.quantity, l.window))
            .collect();

        for (line_no, sku_id, quantity, window) in specs {
            let key = ClaimKey {
                transaction_id,
                line_no,
            };
            let (unit_ids, unit_events) =
                self.claim_inner(key, sku_id, location, quantity, window, kind, actor)?;
            undo.push(CompensationStep::ReleaseClaim(key));
            self.audit_all(&unit_events);

            let events = self.transactions.execute(
                transaction_id,
                ExpectedVersion::Any,
                &TransactionCommand::AttachClaim(AttachClaim {
                    transaction_id,
                    line_no,
                    unit_ids,
                    actor,
                    occurred_at,
                }),
            )?;
            self.audit_all(&events);
        }

        let txn = self
            .transactions
            .get(transaction_id)
            .ok_or_else(DomainError::not_found)?;
        let subtotal: u64 = txn.lines().iter().map(|l| l.line_total(kind)).sum();
        let tax = self.policy.tax_for(subtotal);
        let deposit = match kind {
            TransactionKind::Rental => self.policy.deposit_for(subtotal + tax),
            TransactionKind::Sale => 0,
        };

        let events = self.transactions.execute(
            transaction_id,
            ExpectedVersion::Any,
            &TransactionCommand::PriceTransaction(PriceTransaction {
                transaction_id,
                tax,
                deposit,
                actor,
                occurred_at,
            }),
        )?;
        self.audit_all(&events);

        let events = self.transactions.execute(
            transaction_id,
            ExpectedVersion::Any,
            &TransactionCommand::SubmitTransaction(SubmitTransaction {
                transaction_id,
                actor,
                occurred_at,
            }),
        )?;
        self.audit_all(&events);
        Ok(())
    }

    /// Run undo steps newest first. Failures are logged, never propagated;
    /// the pipeline's original error is what the caller sees.
    fn compensate(&self, undo: Vec<CompensationStep>, actor: UserId) {
        for step in undo.into_iter().rev() {
            let outcome = match step {
                CompensationStep::ReleaseClaim(key) => self
                    .release_inner(key, actor)
                    .map(|events| self.audit_all(&events)),
                CompensationStep::DeactivateTransaction(transaction_id) => self
                    .transactions
                    .execute(
                        transaction_id,
                        ExpectedVersion::Any,
                        &TransactionCommand::DeactivateTransaction(DeactivateTransaction {
                            transaction_id,
                            reason: "creation aborted".to_string(),
                            actor,
                            occurred_at: self.now(),
                        }),
                    )
                    .map(|events| self.audit_all(&events)),
            };
            if let Err(err) = outcome {
                warn!(error = %err, "compensation step failed");
            }
        }
    }
}
