//! Claiming concrete units for transaction lines and letting them go.
//!
//! A claim binds specific units to one transaction line and parks them in a
//! reserved status. Selection prefers the best condition grade, oldest
//! purchase first, so wear spreads across the pool.

use tracing::{info, warn};

use rentflow_audit::AuditJournal;
use rentflow_catalog::{CatalogSource, SkuId};
use rentflow_core::{Aggregate, DomainError, DomainResult, ExpectedVersion, LocationId, UserId};
use rentflow_inventory::{TransitionUnit, UnitCommand, UnitEvent, UnitId, UnitStatus};
use rentflow_rentals::{
    AttachClaim, BookingWindow, TransactionCommand, TransactionId, TransactionKind,
};

use chrono::{DateTime, Utc};

use crate::book::{Claim, ClaimKey};
use crate::service::RentalEngine;

impl<C, J> RentalEngine<C, J>
where
    C: CatalogSource,
    J: AuditJournal,
{
    /// Claim units for one line of a draft transaction.
    ///
    /// Picks the units, parks them in the reserved pool, records the claim
    /// and attaches the unit ids to the line. Fails with
    /// [`DomainError::InsufficientStock`] when the source pool is short.
    pub fn claim_stock(
        &self,
        transaction_id: TransactionId,
        line_no: u32,
        actor: UserId,
    ) -> DomainResult<Vec<UnitId>> {
        let _gate = self.guard();

        let txn = self
            .transactions
            .get(transaction_id)
            .ok_or_else(DomainError::not_found)?;
        let line = txn
            .line(line_no)
            .ok_or_else(|| DomainError::validation(format!("unknown line {line_no}")))?;
        let location = txn
            .location()
            .ok_or_else(|| DomainError::invariant("transaction has no location"))?;

        let key = ClaimKey {
            transaction_id,
            line_no,
        };
        let (unit_ids, unit_events) = self.claim_inner(
            key,
            line.sku_id,
            location,
            line.quantity,
            line.window,
            txn.kind(),
            actor,
        )?;

        let attach = TransactionCommand::AttachClaim(AttachClaim {
            transaction_id,
            line_no,
            unit_ids: unit_ids.clone(),
            actor,
            occurred_at: self.now(),
        });
        match self
            .transactions
            .execute(transaction_id, ExpectedVersion::Exact(txn.version()), &attach)
        {
            Ok(events) => self.audit_all(&events),
            Err(err) => {
                match self.release_inner(key, actor) {
                    Ok(released) => self.audit_all(&released),
                    Err(unwind) => {
                        warn!(claim = %key, error = %unwind, "claim unwind failed after attach rejection");
                    }
                }
                return Err(err);
            }
        }

        self.audit_all(&unit_events);
        info!(claim = %key, quantity = unit_ids.len(), "stock claimed");
        Ok(unit_ids)
    }

    /// Release a claim that has not been picked up, returning its units to
    /// the pool they came from.
    pub fn release_claim(
        &self,
        transaction_id: TransactionId,
        line_no: u32,
        actor: UserId,
    ) -> DomainResult<()> {
        let _gate = self.guard();
        let key = ClaimKey {
            transaction_id,
            line_no,
        };
        let events = self.release_inner(key, actor)?;
        self.audit_all(&events);
        info!(claim = %key, "claim released");
        Ok(())
    }

    /// Pick and reserve units under an already-held gate.
    ///
    /// The claim is recorded in the book before the units move; a failed
    /// batch takes the claim back out, so book and registry stay agreed.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn claim_inner(
        &self,
        key: ClaimKey,
        sku_id: SkuId,
        location: LocationId,
        quantity: u32,
        window: Option<BookingWindow>,
        kind: TransactionKind,
        actor: UserId,
    ) -> DomainResult<(Vec<UnitId>, Vec<UnitEvent>)> {
        let (source, target) = match kind {
            TransactionKind::Rental => (UnitStatus::AvailableRent, UnitStatus::ReservedRent),
            TransactionKind::Sale => (UnitStatus::AvailableSale, UnitStatus::ReservedSale),
        };

        let units = self.registry.units_for_sku(sku_id, location);
        let mut free: Vec<_> = units
            .iter()
            .filter(|u| u.is_active() && u.status() == source)
            .collect();
        if (free.len() as u32) < quantity {
            return Err(DomainError::insufficient_stock(quantity, free.len() as u32));
        }
        free.sort_by_key(|u| {
            (
                u.condition(),
                u.purchased_on().unwrap_or(DateTime::<Utc>::MIN_UTC),
            )
        });
        let unit_ids: Vec<UnitId> = free
            .iter()
            .take(quantity as usize)
            .map(|u| u.id())
            .collect();

        self.book.insert(Claim {
            key,
            sku_id,
            location,
            unit_ids: unit_ids.clone(),
            quantity,
            window,
            picked_up: false,
        })?;

        let occurred_at = self.now();
        let commands: Vec<UnitCommand> = unit_ids
            .iter()
            .map(|&unit_id| {
                UnitCommand::TransitionUnit(TransitionUnit {
                    unit_id,
                    new_status: target,
                    reason: Some(format!("claimed by {key}")),
                    actor,
                    occurred_at,
                })
            })
            .collect();

        match self.registry.execute_batch(&commands) {
            Ok(events) => Ok((unit_ids, events)),
            Err(err) => {
                self.book.remove(key);
                Err(err)
            }
        }
    }

    /// Undo a not-yet-picked-up claim under an already-held gate.
    pub(crate) fn release_inner(
        &self,
        key: ClaimKey,
        actor: UserId,
    ) -> DomainResult<Vec<UnitEvent>> {
        let claim = self.book.get(key).ok_or_else(DomainError::not_found)?;
        if claim.picked_up {
            return Err(DomainError::invariant(format!(
                "claim {key} is already picked up"
            )));
        }

        let occurred_at = self.now();
        let mut commands = Vec::with_capacity(claim.unit_ids.len());
        for &unit_id in &claim.unit_ids {
            let unit = self
                .registry
                .unit(unit_id)
                .ok_or_else(DomainError::not_found)?;
            let target = match unit.status() {
                UnitStatus::ReservedRent => UnitStatus::AvailableRent,
                UnitStatus::ReservedSale => UnitStatus::AvailableSale,
                other => {
                    return Err(DomainError::invariant(format!(
                        "unit {unit_id} in claim {key} is {other}, not reserved"
                    )));
                }
            };
            commands.push(UnitCommand::TransitionUnit(TransitionUnit {
                unit_id,
                new_status: target,
                reason: Some("claim released".to_string()),
                actor,
                occurred_at,
            }));
        }

        let events = self.registry.execute_batch(&commands)?;
        self.book.remove(key);
        Ok(events)
    }
}
