use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentflow_audit::{AuditedEvent, EntityRef};
use rentflow_catalog::SkuId;
use rentflow_core::{
    Aggregate, AggregateId, DomainError, DomainResult, EntityMeta, LocationId, UserId,
};

use crate::status::{ConditionGrade, StockBucket, UnitStatus};

/// Inventory unit identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub AggregateId);

impl UnitId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for UnitId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: one trackable unit of stock.
///
/// Serialized SKUs register one unit per serial number. Non-serialized SKUs
/// register anonymous units (no serial) so quantity counts stay recomputable
/// from unit state. Units are never hard-deleted; they leave the pool through
/// deactivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryUnit {
    id: UnitId,
    sku_id: Option<SkuId>,
    location: Option<LocationId>,
    serial: Option<String>,
    status: UnitStatus,
    condition: ConditionGrade,
    purchase_cost: u64,
    purchased_on: Option<DateTime<Utc>>,
    warranty_until: Option<DateTime<Utc>>,
    rental_count: u32,
    total_rental_days: u32,
    meta: Option<EntityMeta>,
    version: u64,
    created: bool,
}

impl InventoryUnit {
    /// Create an empty, not-yet-registered aggregate instance for rehydration.
    pub fn empty(id: UnitId) -> Self {
        Self {
            id,
            sku_id: None,
            location: None,
            serial: None,
            status: UnitStatus::AvailableSale,
            condition: ConditionGrade::A,
            purchase_cost: 0,
            purchased_on: None,
            warranty_until: None,
            rental_count: 0,
            total_rental_days: 0,
            meta: None,
            version: 0,
            created: false,
        }
    }

    pub fn sku_id(&self) -> Option<SkuId> {
        self.sku_id
    }

    pub fn location(&self) -> Option<LocationId> {
        self.location
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    pub fn status(&self) -> UnitStatus {
        self.status
    }

    pub fn bucket(&self) -> StockBucket {
        self.status.bucket()
    }

    pub fn condition(&self) -> ConditionGrade {
        self.condition
    }

    pub fn purchase_cost(&self) -> u64 {
        self.purchase_cost
    }

    pub fn purchased_on(&self) -> Option<DateTime<Utc>> {
        self.purchased_on
    }

    pub fn warranty_until(&self) -> Option<DateTime<Utc>> {
        self.warranty_until
    }

    pub fn rental_count(&self) -> u32 {
        self.rental_count
    }

    pub fn total_rental_days(&self) -> u32 {
        self.total_rental_days
    }

    pub fn meta(&self) -> Option<&EntityMeta> {
        self.meta.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.meta.as_ref().map(|m| m.is_active).unwrap_or(false)
    }

    /// Check if the unit can satisfy a new reservation right now.
    pub fn is_free(&self) -> bool {
        self.is_active() && self.bucket() == StockBucket::Available
    }
}

/// Command: RegisterUnit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterUnit {
    pub unit_id: UnitId,
    pub sku_id: SkuId,
    pub location: LocationId,
    pub serial: Option<String>,
    /// Serial handling rule for this SKU, resolved from the catalog by the
    /// caller before dispatch.
    pub sku_is_serialized: bool,
    pub initial_status: UnitStatus,
    pub condition: ConditionGrade,
    pub purchase_cost: u64,
    pub purchased_on: Option<DateTime<Utc>>,
    pub warranty_until: Option<DateTime<Utc>>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TransitionUnit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionUnit {
    pub unit_id: UnitId,
    pub new_status: UnitStatus,
    pub reason: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReviseCondition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseCondition {
    pub unit_id: UnitId,
    pub condition: ConditionGrade,
    pub note: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordRentalOutcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRentalOutcome {
    pub unit_id: UnitId,
    /// Billable days of the completed rental, inclusive of both end dates.
    pub days: u32,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateUnit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateUnit {
    pub unit_id: UnitId,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitCommand {
    RegisterUnit(RegisterUnit),
    TransitionUnit(TransitionUnit),
    ReviseCondition(ReviseCondition),
    RecordRentalOutcome(RecordRentalOutcome),
    DeactivateUnit(DeactivateUnit),
}

/// Event: UnitRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRegistered {
    pub unit_id: UnitId,
    pub sku_id: SkuId,
    pub location: LocationId,
    pub serial: Option<String>,
    pub status: UnitStatus,
    pub condition: ConditionGrade,
    pub purchase_cost: u64,
    pub purchased_on: Option<DateTime<Utc>>,
    pub warranty_until: Option<DateTime<Utc>>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub unit_id: UnitId,
    pub from: UnitStatus,
    pub to: UnitStatus,
    pub reason: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ConditionRevised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionRevised {
    pub unit_id: UnitId,
    pub from: ConditionGrade,
    pub to: ConditionGrade,
    pub note: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RentalOutcomeRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalOutcomeRecorded {
    pub unit_id: UnitId,
    pub days: u32,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: UnitDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDeactivated {
    pub unit_id: UnitId,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitEvent {
    UnitRegistered(UnitRegistered),
    StatusChanged(StatusChanged),
    ConditionRevised(ConditionRevised),
    RentalOutcomeRecorded(RentalOutcomeRecorded),
    UnitDeactivated(UnitDeactivated),
}

impl AuditedEvent for UnitEvent {
    fn entity(&self) -> EntityRef {
        let unit_id = match self {
            UnitEvent::UnitRegistered(e) => e.unit_id,
            UnitEvent::StatusChanged(e) => e.unit_id,
            UnitEvent::ConditionRevised(e) => e.unit_id,
            UnitEvent::RentalOutcomeRecorded(e) => e.unit_id,
            UnitEvent::UnitDeactivated(e) => e.unit_id,
        };
        EntityRef::unit(unit_id.0)
    }

    fn action(&self) -> &'static str {
        match self {
            UnitEvent::UnitRegistered(_) => "inventory.unit.registered",
            UnitEvent::StatusChanged(_) => "inventory.unit.status_changed",
            UnitEvent::ConditionRevised(_) => "inventory.unit.condition_revised",
            UnitEvent::RentalOutcomeRecorded(_) => "inventory.unit.rental_outcome_recorded",
            UnitEvent::UnitDeactivated(_) => "inventory.unit.deactivated",
        }
    }

    fn actor(&self) -> UserId {
        match self {
            UnitEvent::UnitRegistered(e) => e.actor,
            UnitEvent::StatusChanged(e) => e.actor,
            UnitEvent::ConditionRevised(e) => e.actor,
            UnitEvent::RentalOutcomeRecorded(e) => e.actor,
            UnitEvent::UnitDeactivated(e) => e.actor,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UnitEvent::UnitRegistered(e) => e.occurred_at,
            UnitEvent::StatusChanged(e) => e.occurred_at,
            UnitEvent::ConditionRevised(e) => e.occurred_at,
            UnitEvent::RentalOutcomeRecorded(e) => e.occurred_at,
            UnitEvent::UnitDeactivated(e) => e.occurred_at,
        }
    }

    fn reason(&self) -> Option<String> {
        match self {
            UnitEvent::StatusChanged(e) => e.reason.clone(),
            UnitEvent::UnitDeactivated(e) => Some(e.reason.clone()),
            _ => None,
        }
    }
}

impl Aggregate for InventoryUnit {
    type Id = UnitId;
    type Command = UnitCommand;
    type Event = UnitEvent;

    fn id(&self) -> UnitId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UnitEvent::UnitRegistered(e) => {
                self.id = e.unit_id;
                self.sku_id = Some(e.sku_id);
                self.location = Some(e.location);
                self.serial = e.serial.clone();
                self.status = e.status;
                self.condition = e.condition;
                self.purchase_cost = e.purchase_cost;
                self.purchased_on = e.purchased_on;
                self.warranty_until = e.warranty_until;
                self.meta = Some(EntityMeta::new(e.actor, e.occurred_at));
                self.created = true;
            }
            UnitEvent::StatusChanged(e) => {
                self.status = e.to;
                if let Some(meta) = self.meta.as_mut() {
                    meta.touch(e.actor, e.occurred_at);
                }
            }
            UnitEvent::ConditionRevised(e) => {
                self.condition = e.to;
                if let Some(meta) = self.meta.as_mut() {
                    meta.touch(e.actor, e.occurred_at);
                }
            }
            UnitEvent::RentalOutcomeRecorded(e) => {
                self.rental_count = self.rental_count.saturating_add(1);
                self.total_rental_days = self.total_rental_days.saturating_add(e.days);
                if let Some(meta) = self.meta.as_mut() {
                    meta.touch(e.actor, e.occurred_at);
                }
            }
            UnitEvent::UnitDeactivated(e) => {
                if let Some(meta) = self.meta.as_mut() {
                    meta.deactivate(e.actor, e.occurred_at);
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> DomainResult<Vec<Self::Event>> {
        match command {
            UnitCommand::RegisterUnit(cmd) => self.handle_register(cmd),
            UnitCommand::TransitionUnit(cmd) => self.handle_transition(cmd),
            UnitCommand::ReviseCondition(cmd) => self.handle_revise_condition(cmd),
            UnitCommand::RecordRentalOutcome(cmd) => self.handle_rental_outcome(cmd),
            UnitCommand::DeactivateUnit(cmd) => self.handle_deactivate(cmd),
        }
    }
}

impl InventoryUnit {
    fn ensure_registered(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_unit_id(&self, unit_id: UnitId) -> Result<(), DomainError> {
        if self.id != unit_id {
            return Err(DomainError::invariant("unit_id mismatch"));
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if !self.is_active() {
            return Err(DomainError::invariant("unit is deactivated"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterUnit) -> Result<Vec<UnitEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("unit already registered"));
        }

        match (&cmd.serial, cmd.sku_is_serialized) {
            (None, true) => {
                return Err(DomainError::validation(
                    "serialized SKU requires a serial number",
                ));
            }
            (Some(_), false) => {
                return Err(DomainError::validation(
                    "non-serialized SKU cannot carry a serial number",
                ));
            }
            (Some(serial), true) if serial.trim().is_empty() => {
                return Err(DomainError::validation("serial number cannot be empty"));
            }
            _ => {}
        }

        if !matches!(
            cmd.initial_status,
            UnitStatus::AvailableSale | UnitStatus::AvailableRent
        ) {
            return Err(DomainError::validation(
                "units enter the pool in an available status",
            ));
        }

        Ok(vec![UnitEvent::UnitRegistered(UnitRegistered {
            unit_id: cmd.unit_id,
            sku_id: cmd.sku_id,
            location: cmd.location,
            serial: cmd.serial.clone(),
            status: cmd.initial_status,
            condition: cmd.condition,
            purchase_cost: cmd.purchase_cost,
            purchased_on: cmd.purchased_on,
            warranty_until: cmd.warranty_until,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transition(&self, cmd: &TransitionUnit) -> Result<Vec<UnitEvent>, DomainError> {
        self.ensure_registered()?;
        self.ensure_unit_id(cmd.unit_id)?;
        self.ensure_active()?;

        if !self.status.can_transition_to(cmd.new_status) {
            return Err(DomainError::invalid_transition(
                format!("unit {}", self.id),
                self.status.to_string(),
                cmd.new_status.to_string(),
            ));
        }

        Ok(vec![UnitEvent::StatusChanged(StatusChanged {
            unit_id: cmd.unit_id,
            from: self.status,
            to: cmd.new_status,
            reason: cmd.reason.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revise_condition(
        &self,
        cmd: &ReviseCondition,
    ) -> Result<Vec<UnitEvent>, DomainError> {
        self.ensure_registered()?;
        self.ensure_unit_id(cmd.unit_id)?;
        self.ensure_active()?;

        Ok(vec![UnitEvent::ConditionRevised(ConditionRevised {
            unit_id: cmd.unit_id,
            from: self.condition,
            to: cmd.condition,
            note: cmd.note.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_rental_outcome(
        &self,
        cmd: &RecordRentalOutcome,
    ) -> Result<Vec<UnitEvent>, DomainError> {
        self.ensure_registered()?;
        self.ensure_unit_id(cmd.unit_id)?;
        self.ensure_active()?;

        if cmd.days == 0 {
            return Err(DomainError::validation(
                "rental outcome must cover at least one day",
            ));
        }

        Ok(vec![UnitEvent::RentalOutcomeRecorded(
            RentalOutcomeRecorded {
                unit_id: cmd.unit_id,
                days: cmd.days,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_deactivate(&self, cmd: &DeactivateUnit) -> Result<Vec<UnitEvent>, DomainError> {
        self.ensure_registered()?;
        self.ensure_unit_id(cmd.unit_id)?;

        if !self.is_active() {
            return Err(DomainError::conflict("unit is already inactive"));
        }

        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("deactivation reason cannot be empty"));
        }

        if matches!(
            self.status,
            UnitStatus::ReservedSale | UnitStatus::ReservedRent | UnitStatus::Rented
        ) {
            return Err(DomainError::invariant(
                "unit with active obligations cannot be deactivated",
            ));
        }

        Ok(vec![UnitEvent::UnitDeactivated(UnitDeactivated {
            unit_id: cmd.unit_id,
            reason: cmd.reason.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}
