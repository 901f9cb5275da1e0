//! Return intake, inspection and release pipelines.
//!
//! A return comes back in up to three steps: drop-off parks the units in
//! inspection and freezes the late fee, assessment records the inspector's
//! verdict per line, and finalization routes every unit to cleaning,
//! maintenance or straight back to the rentable pool. A transaction whose
//! last outstanding item comes back completes on finalization.

use tracing::info;

use rentflow_audit::AuditJournal;
use rentflow_catalog::CatalogSource;
use rentflow_core::{
    Aggregate, AggregateId, DomainError, DomainResult, ExpectedVersion, UserId,
};
use rentflow_inventory::{
    ConditionGrade, RecordRentalOutcome, ReviseCondition, TransitionUnit, UnitCommand, UnitId,
    UnitStatus,
};
use rentflow_rentals::{
    CompleteTransaction, LineReturnEntry, RecordReturn, TransactionCommand, TransactionId,
    TransactionStatus,
};
use rentflow_returns::{
    AssessmentEntry, FinalizeReturn, OpenReturn, RecordAssessments, ReturnCommand, ReturnId,
    ReturnKind, ReturnLineDraft,
};
use rentflow_settlement::LateFeeLine;

use crate::book::ClaimKey;
use crate::service::RentalEngine;

/// One returned slice of a transaction line.
#[derive(Debug, Clone, Copy)]
pub struct ReturnItem {
    pub line_no: u32,
    pub quantity: u32,
}

impl<C, J> RentalEngine<C, J>
where
    C: CatalogSource,
    J: AuditJournal,
{
    /// Record a drop-off: the listed quantities come back, their units move
    /// to inspection and the late fee is frozen against each line.
    ///
    /// Units are taken from the front of each line's claim; with serialized
    /// stock that matches the units that physically went out.
    pub fn initiate_return(
        &self,
        transaction_id: TransactionId,
        items: &[ReturnItem],
        actor: UserId,
    ) -> DomainResult<ReturnId> {
        let _gate = self.guard();
        if items.is_empty() {
            return Err(DomainError::validation("a return needs at least one line"));
        }

        let txn = self
            .transactions
            .get(transaction_id)
            .ok_or_else(DomainError::not_found)?;
        let occurred_at = self.now();

        let mut entries = Vec::with_capacity(items.len());
        let mut prepared = Vec::with_capacity(items.len());
        for item in items {
            let line = txn.line(item.line_no).ok_or_else(|| {
                DomainError::validation(format!("unknown line {}", item.line_no))
            })?;
            let window = line.window.ok_or_else(|| {
                DomainError::invariant(format!("line {} has no booking window", item.line_no))
            })?;
            let fee = LateFeeLine::compute(
                item.line_no,
                item.quantity,
                line.daily_rate,
                self.policy.late_fee_due(window.ends_at),
                occurred_at,
            );
            entries.push(LineReturnEntry {
                line_no: item.line_no,
                quantity: item.quantity,
                late_fee: fee.amount,
            });
            prepared.push((*item, line.sku_id, line.daily_rate, fee));
        }

        // Dry-run the commercial side before any unit moves.
        let record = TransactionCommand::RecordReturn(RecordReturn {
            transaction_id,
            entries,
            actor,
            occurred_at,
        });
        txn.handle(&record)?;

        let mut drafts = Vec::with_capacity(prepared.len());
        let mut returned_units: Vec<UnitId> = Vec::new();
        for (item, sku_id, daily_rate, fee) in prepared {
            let key = ClaimKey {
                transaction_id,
                line_no: item.line_no,
            };
            let claim = self.book.get(key).ok_or_else(|| {
                DomainError::invariant(format!("no claim recorded for line {}", item.line_no))
            })?;
            if (claim.unit_ids.len() as u32) < item.quantity {
                return Err(DomainError::invariant(format!(
                    "claim {key} holds {} units, return lists {}",
                    claim.unit_ids.len(),
                    item.quantity
                )));
            }
            let unit_ids: Vec<UnitId> = claim
                .unit_ids
                .iter()
                .copied()
                .take(item.quantity as usize)
                .collect();
            drafts.push(ReturnLineDraft {
                line_no: item.line_no,
                sku_id,
                quantity: item.quantity,
                daily_rate,
                days_late: fee.days_late,
                late_fee: fee.amount,
                unit_ids: unit_ids.clone(),
            });
            returned_units.extend(unit_ids);
        }

        let returned_quantity: u32 = items.iter().map(|i| i.quantity).sum();
        let kind = if returned_quantity == txn.outstanding_quantity() {
            ReturnKind::Full
        } else {
            ReturnKind::Partial
        };

        let commands: Vec<UnitCommand> = returned_units
            .iter()
            .map(|&unit_id| {
                UnitCommand::TransitionUnit(TransitionUnit {
                    unit_id,
                    new_status: UnitStatus::InspectionPending,
                    reason: Some(format!("returned on {transaction_id}")),
                    actor,
                    occurred_at,
                })
            })
            .collect();
        let unit_events = self.registry.execute_batch(&commands)?;

        let events = self.transactions.execute(
            transaction_id,
            ExpectedVersion::Exact(txn.version()),
            &record,
        )?;

        let return_id = ReturnId::new(AggregateId::new());
        let return_events = self.returns.execute(
            return_id,
            ExpectedVersion::Exact(0),
            &ReturnCommand::OpenReturn(OpenReturn {
                return_id,
                transaction_id,
                kind,
                lines: drafts,
                actor,
                occurred_at,
            }),
        )?;

        self.book.strip_units(&returned_units)?;

        self.audit_all(&unit_events);
        self.audit_all(&events);
        self.audit_all(&return_events);
        info!(
            transaction = %transaction_id,
            return_id = %return_id,
            units = returned_units.len(),
            "return initiated"
        );
        Ok(return_id)
    }

    /// Record inspector verdicts for lines of an open return.
    ///
    /// Can be called repeatedly until finalization; a later verdict for a
    /// line replaces the earlier one.
    pub fn assess_damage(
        &self,
        return_id: ReturnId,
        entries: Vec<AssessmentEntry>,
        actor: UserId,
    ) -> DomainResult<()> {
        let _gate = self.guard();
        let ret = self
            .returns
            .get(return_id)
            .ok_or_else(DomainError::not_found)?;
        let events = self.returns.execute(
            return_id,
            ExpectedVersion::Exact(ret.version()),
            &ReturnCommand::RecordAssessments(RecordAssessments {
                return_id,
                entries,
                actor,
                occurred_at: self.now(),
            }),
        )?;
        self.audit_all(&events);
        Ok(())
    }

    /// Close a return: route every unit by its line's verdict, bank the
    /// rental history on the units, and complete the transaction if nothing
    /// is left outstanding.
    ///
    /// `force` closes over missing assessments; those lines release to the
    /// rentable pool untouched.
    pub fn finalize_return(
        &self,
        return_id: ReturnId,
        force: bool,
        actor: UserId,
    ) -> DomainResult<()> {
        let _gate = self.guard();
        let ret = self
            .returns
            .get(return_id)
            .ok_or_else(DomainError::not_found)?;
        let occurred_at = self.now();
        let finalize = ReturnCommand::FinalizeReturn(FinalizeReturn {
            return_id,
            force,
            actor,
            occurred_at,
        });
        ret.handle(&finalize)?;

        let transaction_id = ret
            .transaction_id()
            .ok_or_else(|| DomainError::invariant("return carries no transaction"))?;
        let txn = self
            .transactions
            .get(transaction_id)
            .ok_or_else(DomainError::not_found)?;

        let mut commands = Vec::new();
        for line in ret.lines() {
            let target = line.release_status();
            let days = txn
                .line(line.line_no)
                .and_then(|l| l.window)
                .map(|w| w.rental_days())
                .unwrap_or(0);
            for &unit_id in &line.unit_ids {
                commands.push(UnitCommand::TransitionUnit(TransitionUnit {
                    unit_id,
                    new_status: target,
                    reason: Some(format!("inspection closed on {return_id}")),
                    actor,
                    occurred_at,
                }));
                if let Some(assessment) = &line.assessment {
                    let unit = self
                        .registry
                        .unit(unit_id)
                        .ok_or_else(DomainError::not_found)?;
                    if unit.condition() != assessment.grade {
                        commands.push(UnitCommand::ReviseCondition(ReviseCondition {
                            unit_id,
                            condition: assessment.grade,
                            note: assessment.note.clone(),
                            actor,
                            occurred_at,
                        }));
                    }
                }
                commands.push(UnitCommand::RecordRentalOutcome(RecordRentalOutcome {
                    unit_id,
                    days,
                    actor,
                    occurred_at,
                }));
            }
        }
        let unit_events = self.registry.execute_batch(&commands)?;

        let return_events = self.returns.execute(
            return_id,
            ExpectedVersion::Exact(ret.version()),
            &finalize,
        )?;
        self.audit_all(&unit_events);
        self.audit_all(&return_events);

        let txn = self
            .transactions
            .get(transaction_id)
            .ok_or_else(DomainError::not_found)?;
        if txn.status() == TransactionStatus::InProgress && txn.fully_returned() {
            let events = self.transactions.execute(
                transaction_id,
                ExpectedVersion::Any,
                &TransactionCommand::CompleteTransaction(CompleteTransaction {
                    transaction_id,
                    actor,
                    occurred_at,
                }),
            )?;
            self.audit_all(&events);
        }
        info!(return_id = %return_id, forced = force, "return finalized");
        Ok(())
    }

    /// Bring cleaned units back into the rentable pool.
    pub fn complete_cleaning(&self, unit_ids: &[UnitId], actor: UserId) -> DomainResult<()> {
        let _gate = self.guard();
        if unit_ids.is_empty() {
            return Err(DomainError::validation("no units listed"));
        }
        let occurred_at = self.now();
        let commands: Vec<UnitCommand> = unit_ids
            .iter()
            .map(|&unit_id| {
                UnitCommand::TransitionUnit(TransitionUnit {
                    unit_id,
                    new_status: UnitStatus::AvailableRent,
                    reason: Some("cleaning complete".to_string()),
                    actor,
                    occurred_at,
                })
            })
            .collect();
        let events = self.registry.execute_batch(&commands)?;
        self.audit_all(&events);
        Ok(())
    }

    /// Restore repaired units to a pool with their post-repair grade.
    pub fn complete_repair(
        &self,
        unit_ids: &[UnitId],
        restored: ConditionGrade,
        target: UnitStatus,
        actor: UserId,
    ) -> DomainResult<()> {
        let _gate = self.guard();
        if unit_ids.is_empty() {
            return Err(DomainError::validation("no units listed"));
        }
        if !matches!(target, UnitStatus::AvailableRent | UnitStatus::AvailableSale) {
            return Err(DomainError::validation(
                "repaired units release to an available status",
            ));
        }
        let occurred_at = self.now();
        let mut commands = Vec::with_capacity(unit_ids.len() * 2);
        for &unit_id in unit_ids {
            commands.push(UnitCommand::ReviseCondition(ReviseCondition {
                unit_id,
                condition: restored,
                note: Some("repair complete".to_string()),
                actor,
                occurred_at,
            }));
            commands.push(UnitCommand::TransitionUnit(TransitionUnit {
                unit_id,
                new_status: target,
                reason: Some("repair complete".to_string()),
                actor,
                occurred_at,
            }));
        }
        let events = self.registry.execute_batch(&commands)?;
        self.audit_all(&events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};

    use rentflow_audit::InMemoryAuditJournal;
    use rentflow_catalog::{InMemoryCatalog, SkuId, SkuRecord};
    use rentflow_core::{CustomerId, FixedClock, LocationId};
    use rentflow_inventory::RegisterUnit;
    use rentflow_rentals::{BookingWindow, PaymentMethod};
    use rentflow_returns::{ConditionAssessment, FindingKind, FindingSeverity, InspectionFinding, ReturnStatus};

    use crate::booking::OrderItem;
    use crate::config::RentalPolicy;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, day, hour, 0, 0).unwrap()
    }

    fn drill_sku() -> SkuRecord {
        SkuRecord {
            id: SkuId::new(AggregateId::new()),
            name: "Rotary hammer drill".to_string(),
            is_serialized: true,
            is_rentable: true,
            is_saleable: false,
            unit_price: 0,
            daily_rate: 4500,
            min_rental_days: 1,
            max_rental_days: 30,
            reorder_point: 0,
            reorder_quantity: 0,
            maximum_stock: 50,
        }
    }

    struct Fixture {
        engine: RentalEngine<InMemoryCatalog, InMemoryAuditJournal>,
        sku_id: SkuId,
        location: LocationId,
        transaction_id: TransactionId,
        actor: UserId,
    }

    /// An in-progress rental of two drills, window day 2..4, with the
    /// engine clock parked at `clock_day`.
    fn out_on_rent(clock_day: u32) -> Fixture {
        out_on_rent_with(clock_day, RentalPolicy::default())
    }

    fn out_on_rent_with(clock_day: u32, policy: RentalPolicy) -> Fixture {
        let sku = drill_sku();
        let sku_id = sku.id;
        let catalog = InMemoryCatalog::new();
        catalog.upsert(sku).unwrap();
        let engine = RentalEngine::new(
            catalog,
            InMemoryAuditJournal::new(),
            Arc::new(FixedClock(at(clock_day, 12))),
            policy,
        );

        let location = LocationId::new();
        let actor = UserId::new();
        for i in 0..3 {
            engine
                .register_unit(RegisterUnit {
                    unit_id: UnitId::new(AggregateId::new()),
                    sku_id,
                    location,
                    serial: Some(format!("DRL-{i}")),
                    sku_is_serialized: true,
                    initial_status: UnitStatus::AvailableRent,
                    condition: ConditionGrade::A,
                    purchase_cost: 80000,
                    purchased_on: Some(at(1, 8)),
                    warranty_until: None,
                    actor,
                    occurred_at: at(1, 8),
                })
                .unwrap();
        }

        let transaction_id = engine
            .create_booking(
                CustomerId::new(),
                location,
                vec![OrderItem {
                    sku_id,
                    quantity: 2,
                    price_override: None,
                    discount: 0,
                }],
                BookingWindow::new(at(2, 9), at(4, 17)).unwrap(),
                actor,
            )
            .unwrap();
        engine
            .checkout(transaction_id, 37995, PaymentMethod::Card, None, actor)
            .unwrap();
        engine.pickup(transaction_id, actor).unwrap();

        Fixture {
            engine,
            sku_id,
            location,
            transaction_id,
            actor,
        }
    }

    #[test]
    fn on_time_return_freezes_no_late_fee() {
        let f = out_on_rent(4);
        let return_id = f
            .engine
            .initiate_return(
                f.transaction_id,
                &[ReturnItem {
                    line_no: 1,
                    quantity: 2,
                }],
                f.actor,
            )
            .unwrap();

        let ret = f.engine.returns.get(return_id).unwrap();
        assert_eq!(ret.kind(), ReturnKind::Full);
        assert_eq!(ret.late_fees(), 0);
        assert_eq!(ret.lines()[0].days_late, 0);

        let txn = f.engine.transactions.get(f.transaction_id).unwrap();
        assert_eq!(txn.outstanding_quantity(), 0);
        assert!(txn.fully_returned());

        // Units sit in inspection; the claim is gone.
        let level = f.engine.registry.stock_level(f.sku_id, f.location).unwrap();
        assert_eq!(level.out, 0);
        assert_eq!(level.maintenance, 2);
        assert!(f.engine.book.is_empty());
    }

    #[test]
    fn late_return_bills_days_by_date() {
        // Due day 4, returned day 7: three days late, two units.
        let f = out_on_rent(7);
        let return_id = f
            .engine
            .initiate_return(
                f.transaction_id,
                &[ReturnItem {
                    line_no: 1,
                    quantity: 2,
                }],
                f.actor,
            )
            .unwrap();

        let ret = f.engine.returns.get(return_id).unwrap();
        assert_eq!(ret.lines()[0].days_late, 3);
        assert_eq!(ret.late_fees(), 2 * 4500 * 3);

        let txn = f.engine.transactions.get(f.transaction_id).unwrap();
        assert_eq!(txn.total_late_fees(), 27000);
    }

    #[test]
    fn grace_days_absorb_lateness() {
        // Due day 4 with two grace days; returned day 7 bills one late day.
        let f = out_on_rent_with(
            7,
            RentalPolicy {
                late_fee_grace_days: 2,
                ..RentalPolicy::default()
            },
        );
        let return_id = f
            .engine
            .initiate_return(
                f.transaction_id,
                &[ReturnItem {
                    line_no: 1,
                    quantity: 2,
                }],
                f.actor,
            )
            .unwrap();

        let ret = f.engine.returns.get(return_id).unwrap();
        assert_eq!(ret.lines()[0].days_late, 1);
        assert_eq!(ret.late_fees(), 2 * 4500);
    }

    #[test]
    fn partial_return_keeps_the_rest_out() {
        let f = out_on_rent(4);
        let return_id = f
            .engine
            .initiate_return(
                f.transaction_id,
                &[ReturnItem {
                    line_no: 1,
                    quantity: 1,
                }],
                f.actor,
            )
            .unwrap();

        let ret = f.engine.returns.get(return_id).unwrap();
        assert_eq!(ret.kind(), ReturnKind::Partial);

        let txn = f.engine.transactions.get(f.transaction_id).unwrap();
        assert_eq!(txn.outstanding_quantity(), 1);

        let claims = f.engine.book.claims_for_transaction(f.transaction_id);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].quantity, 1);
        assert_eq!(claims[0].unit_ids.len(), 1);

        let level = f.engine.registry.stock_level(f.sku_id, f.location).unwrap();
        assert_eq!(level.out, 1);
        assert_eq!(level.maintenance, 1);
    }

    #[test]
    fn over_return_is_rejected_whole() {
        let f = out_on_rent(4);
        let err = f
            .engine
            .initiate_return(
                f.transaction_id,
                &[ReturnItem {
                    line_no: 1,
                    quantity: 3,
                }],
                f.actor,
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::OverReturn { .. }));

        // Nothing moved.
        let level = f.engine.registry.stock_level(f.sku_id, f.location).unwrap();
        assert_eq!(level.out, 2);
        assert!(f.engine.returns.for_transaction(f.transaction_id).is_empty());
    }

    #[test]
    fn finalize_routes_units_and_completes_the_rental() {
        let f = out_on_rent(4);
        let return_id = f
            .engine
            .initiate_return(
                f.transaction_id,
                &[ReturnItem {
                    line_no: 1,
                    quantity: 2,
                }],
                f.actor,
            )
            .unwrap();

        let ret = f.engine.returns.get(return_id).unwrap();
        let unit_ids = ret.lines()[0].unit_ids.clone();

        f.engine
            .assess_damage(
                return_id,
                vec![AssessmentEntry {
                    line_no: 1,
                    assessment: ConditionAssessment {
                        grade: ConditionGrade::B,
                        cleaning_required: false,
                        cleaning_fee: 0,
                        replacement_required: false,
                        note: Some("scuffed casing".to_string()),
                    },
                    findings: vec![InspectionFinding::new(
                        FindingKind::Damage,
                        FindingSeverity::Minor,
                        "chipped side handle",
                        15000,
                        50,
                    )
                    .unwrap()],
                }],
                f.actor,
            )
            .unwrap();

        f.engine.finalize_return(return_id, false, f.actor).unwrap();

        let ret = f.engine.returns.get(return_id).unwrap();
        assert_eq!(ret.status(), ReturnStatus::Completed);
        assert_eq!(ret.damage_fees(), 7500);

        // Damage findings with a dropped grade route to maintenance, and
        // the rental history lands on the units.
        for &unit_id in &unit_ids {
            let unit = f.engine.registry.unit(unit_id).unwrap();
            assert_eq!(unit.status(), UnitStatus::MaintenanceRequired);
            assert_eq!(unit.condition(), ConditionGrade::B);
            assert_eq!(unit.rental_count(), 1);
            assert_eq!(unit.total_rental_days(), 3);
        }

        let txn = f.engine.transactions.get(f.transaction_id).unwrap();
        assert_eq!(txn.status(), TransactionStatus::Completed);

        // Repair brings them back.
        f.engine
            .complete_repair(&unit_ids, ConditionGrade::A, UnitStatus::AvailableRent, f.actor)
            .unwrap();
        let level = f.engine.registry.stock_level(f.sku_id, f.location).unwrap();
        assert_eq!(level.available, 3);
        assert_eq!(level.maintenance, 0);
    }

    #[test]
    fn unassessed_finalize_needs_force() {
        let f = out_on_rent(4);
        let return_id = f
            .engine
            .initiate_return(
                f.transaction_id,
                &[ReturnItem {
                    line_no: 1,
                    quantity: 2,
                }],
                f.actor,
            )
            .unwrap();

        let err = f
            .engine
            .finalize_return(return_id, false, f.actor)
            .unwrap_err();
        assert!(matches!(err, DomainError::IncompleteAssessment(_)));

        f.engine.finalize_return(return_id, true, f.actor).unwrap();

        // Force releases untouched units straight back to the pool.
        let level = f.engine.registry.stock_level(f.sku_id, f.location).unwrap();
        assert_eq!(level.available, 3);
        let txn = f.engine.transactions.get(f.transaction_id).unwrap();
        assert_eq!(txn.status(), TransactionStatus::Completed);
    }

    #[test]
    fn cleaning_flow_round_trips_through_the_pool() {
        let f = out_on_rent(4);
        let return_id = f
            .engine
            .initiate_return(
                f.transaction_id,
                &[ReturnItem {
                    line_no: 1,
                    quantity: 2,
                }],
                f.actor,
            )
            .unwrap();

        f.engine
            .assess_damage(
                return_id,
                vec![AssessmentEntry {
                    line_no: 1,
                    assessment: ConditionAssessment {
                        grade: ConditionGrade::A,
                        cleaning_required: true,
                        cleaning_fee: 2500,
                        replacement_required: false,
                        note: None,
                    },
                    findings: vec![],
                }],
                f.actor,
            )
            .unwrap();
        f.engine.finalize_return(return_id, false, f.actor).unwrap();

        let ret = f.engine.returns.get(return_id).unwrap();
        assert_eq!(ret.cleaning_fees(), 2500);

        let unit_ids = ret.lines()[0].unit_ids.clone();
        for &unit_id in &unit_ids {
            assert_eq!(
                f.engine.registry.unit(unit_id).unwrap().status(),
                UnitStatus::CleaningRequired
            );
        }

        f.engine.complete_cleaning(&unit_ids, f.actor).unwrap();
        let level = f.engine.registry.stock_level(f.sku_id, f.location).unwrap();
        assert_eq!(level.available, 3);
    }
}
