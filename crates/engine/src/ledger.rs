//! Stock ledger operations: intake, unit administration and availability.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use rentflow_audit::AuditJournal;
use rentflow_catalog::{CatalogSource, SkuId};
use rentflow_core::{Aggregate, DomainError, DomainResult, ExpectedVersion, LocationId, UserId};
use rentflow_inventory::{
    ConditionGrade, DeactivateUnit, InventoryUnit, RegisterUnit, ReviseCondition, StockLevel,
    TransitionUnit, UnitCommand, UnitId, UnitStatus,
};
use rentflow_rentals::BookingWindow;

use crate::service::RentalEngine;
use crate::store::ReceiveStock;

/// Forward-looking availability for one SKU at one location.
///
/// `available` counts units free right now plus units whose active claim
/// windows do not touch the requested window. `candidates` lists only the
/// units free right now, best condition first.
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityReport {
    pub sku_id: SkuId,
    pub location: LocationId,
    pub window: BookingWindow,
    pub available: u32,
    pub candidates: Vec<UnitId>,
}

/// A SKU whose rentable pool has fallen to its reorder point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReorderAlert {
    pub sku_id: SkuId,
    pub location: LocationId,
    pub available: u32,
    pub reorder_point: u32,
    pub suggested_quantity: u32,
}

impl<C, J> RentalEngine<C, J>
where
    C: CatalogSource,
    J: AuditJournal,
{
    /// Admit a single unit into stock. The serial handling rule comes from
    /// the catalog, not the caller.
    pub fn register_unit(&self, mut cmd: RegisterUnit) -> DomainResult<UnitId> {
        let _gate = self.guard();
        let sku = self.sku(cmd.sku_id)?;
        cmd.sku_is_serialized = sku.is_serialized;
        let unit_id = cmd.unit_id;
        let events = self.registry.register(cmd)?;
        self.audit_all(&events);
        info!(unit = %unit_id, sku = %sku.id, "unit registered");
        Ok(unit_id)
    }

    /// Bulk intake of purchased stock, consuming any inbound expectation.
    pub fn receive_stock(&self, mut intake: ReceiveStock) -> DomainResult<Vec<UnitId>> {
        let _gate = self.guard();
        let sku = self.sku(intake.sku_id)?;
        intake.sku_is_serialized = sku.is_serialized;
        let location = intake.location;
        let (unit_ids, events) = self.registry.receive(intake)?;
        self.audit_all(&events);
        info!(sku = %sku.id, location = %location, quantity = unit_ids.len(), "stock received");
        Ok(unit_ids)
    }

    /// Record quantity on order but not yet arrived.
    pub fn expect_inbound(
        &self,
        sku_id: SkuId,
        location: LocationId,
        quantity: u32,
    ) -> DomainResult<()> {
        let _gate = self.guard();
        self.sku(sku_id)?;
        self.registry.expect_inbound(sku_id, location, quantity)
    }

    /// Operator-driven status move (maintenance, cleaning, pool changes).
    ///
    /// Units held by a claim are off limits here; their statuses move
    /// through the booking and return pipelines that also maintain the
    /// reservation book.
    pub fn transition_unit(
        &self,
        unit_id: UnitId,
        new_status: UnitStatus,
        reason: Option<String>,
        actor: UserId,
    ) -> DomainResult<()> {
        let _gate = self.guard();
        self.ensure_unclaimed(unit_id)?;
        let events = self.registry.execute(
            unit_id,
            ExpectedVersion::Any,
            &UnitCommand::TransitionUnit(TransitionUnit {
                unit_id,
                new_status,
                reason,
                actor,
                occurred_at: self.now(),
            }),
        )?;
        self.audit_all(&events);
        Ok(())
    }

    /// Record a corrected condition grade for a unit.
    pub fn revise_unit_condition(
        &self,
        unit_id: UnitId,
        condition: ConditionGrade,
        note: Option<String>,
        actor: UserId,
    ) -> DomainResult<()> {
        let _gate = self.guard();
        let events = self.registry.execute(
            unit_id,
            ExpectedVersion::Any,
            &UnitCommand::ReviseCondition(ReviseCondition {
                unit_id,
                condition,
                note,
                actor,
                occurred_at: self.now(),
            }),
        )?;
        self.audit_all(&events);
        Ok(())
    }

    /// Retire a unit from the pool (write-off, disposal).
    pub fn deactivate_unit(
        &self,
        unit_id: UnitId,
        reason: String,
        actor: UserId,
    ) -> DomainResult<()> {
        let _gate = self.guard();
        self.ensure_unclaimed(unit_id)?;
        let events = self.registry.execute(
            unit_id,
            ExpectedVersion::Any,
            &UnitCommand::DeactivateUnit(DeactivateUnit {
                unit_id,
                reason,
                actor,
                occurred_at: self.now(),
            }),
        )?;
        self.audit_all(&events);
        info!(unit = %unit_id, "unit deactivated");
        Ok(())
    }

    /// Recompute one stock level from unit state.
    pub fn rebuild_stock(&self, sku_id: SkuId, location: LocationId) -> DomainResult<StockLevel> {
        let _gate = self.guard();
        self.registry.rebuild_stock_level(sku_id, location)
    }

    /// Rental availability for a requested window.
    ///
    /// Advisory only: the numbers can change between this call and a claim.
    /// The claim path re-checks under the engine gate.
    pub fn check_availability(
        &self,
        sku_id: SkuId,
        location: LocationId,
        window: BookingWindow,
    ) -> DomainResult<AvailabilityReport> {
        let sku = self.sku(sku_id)?;
        if !sku.is_rentable {
            return Err(DomainError::validation(format!(
                "SKU {} is not rentable",
                sku.id
            )));
        }

        let units = self.registry.units_for_sku(sku_id, location);
        let mut free: Vec<&InventoryUnit> = units
            .iter()
            .filter(|u| u.is_active() && u.status() == UnitStatus::AvailableRent)
            .collect();
        free.sort_by_key(|u| {
            (
                u.condition(),
                u.purchased_on().unwrap_or(DateTime::<Utc>::MIN_UTC),
            )
        });
        let candidates: Vec<UnitId> = free.iter().map(|u| u.id()).collect();

        // Units out on a claim still count when their window ends before
        // ours starts (or starts after ours ends).
        let returning: u32 = self
            .book
            .claims_for_sku(sku_id, location)
            .iter()
            .filter(|c| matches!(&c.window, Some(w) if !w.overlaps(&window)))
            .map(|c| c.quantity)
            .sum();

        Ok(AvailabilityReport {
            sku_id,
            location,
            window,
            available: candidates.len() as u32 + returning,
            candidates,
        })
    }

    /// Reorder alert for one SKU at one location, if its available count
    /// has fallen to the reorder point.
    pub fn reorder_alert(
        &self,
        sku_id: SkuId,
        location: LocationId,
    ) -> DomainResult<Option<ReorderAlert>> {
        let sku = self.sku(sku_id)?;
        let level = self
            .registry
            .stock_level(sku_id, location)
            .unwrap_or_else(|| StockLevel::new(sku_id, location));
        if !level.needs_reorder(&sku) {
            return Ok(None);
        }
        Ok(Some(ReorderAlert {
            sku_id,
            location,
            available: level.available,
            reorder_point: sku.reorder_point,
            suggested_quantity: level.suggested_order_quantity(&sku),
        }))
    }

    /// All stock levels currently at or below their reorder point,
    /// emptiest first. Levels whose SKU the catalog cannot answer for are
    /// skipped; the report is best effort.
    pub fn low_stock_report(&self) -> Vec<ReorderAlert> {
        let mut alerts: Vec<ReorderAlert> = self
            .registry
            .stock_levels()
            .into_iter()
            .filter_map(|level| {
                let sku = self.catalog.sku(level.sku_id).ok().flatten()?;
                if !level.needs_reorder(&sku) {
                    return None;
                }
                Some(ReorderAlert {
                    sku_id: level.sku_id,
                    location: level.location,
                    available: level.available,
                    reorder_point: sku.reorder_point,
                    suggested_quantity: level.suggested_order_quantity(&sku),
                })
            })
            .collect();
        alerts.sort_by_key(|a| a.available);
        alerts
    }

    pub(crate) fn ensure_unclaimed(&self, unit_id: UnitId) -> DomainResult<()> {
        if let Some(key) = self.book.claim_for_unit(unit_id) {
            return Err(DomainError::claim_conflict(format!(
                "unit {unit_id} is held by claim {key}"
            )));
        }
        Ok(())
    }
}
