use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use rentflow_catalog::SkuId;
use rentflow_core::{
    Aggregate, AggregateId, DomainError, DomainResult, ExpectedVersion, LocationId, UserId,
};
use rentflow_inventory::{
    ConditionGrade, InventoryUnit, RegisterUnit, StockBucket, StockLevel, UnitCommand, UnitEvent,
    UnitId, UnitStatus,
};
use rentflow_rentals::{RentalTransaction, TransactionCommand, TransactionEvent, TransactionId};
use rentflow_returns::{RentalReturn, ReturnCommand, ReturnEvent, ReturnId};

/// Bulk intake of purchased stock.
///
/// Serialized SKUs list one serial per arriving unit; non-serialized SKUs
/// leave `serials` empty and get anonymous unit records so the stock counts
/// stay recomputable either way.
#[derive(Debug, Clone)]
pub struct ReceiveStock {
    pub sku_id: SkuId,
    pub location: LocationId,
    pub quantity: u32,
    pub serials: Vec<String>,
    pub sku_is_serialized: bool,
    pub initial_status: UnitStatus,
    pub condition: ConditionGrade,
    /// Purchase cost per unit, in cents.
    pub unit_cost: u64,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Default)]
struct RegistryState {
    units: HashMap<UnitId, InventoryUnit>,
    stock: HashMap<(SkuId, LocationId), StockLevel>,
    serials: HashMap<(SkuId, String), UnitId>,
}

/// Unit registry plus the stock count projection, guarded by one lock.
///
/// A unit's status and its bucket membership change together under a single
/// write guard; batches are staged on copies and merged only when every step
/// has succeeded, so other callers never observe a half-applied batch.
pub struct InventoryRegistry {
    state: RwLock<RegistryState>,
}

impl InventoryRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    fn write_state(&self) -> DomainResult<RwLockWriteGuard<'_, RegistryState>> {
        self.state
            .write()
            .map_err(|_| DomainError::conflict("inventory registry lock poisoned"))
    }

    /// Admit one unit into the registry and its stock level.
    ///
    /// `via_receive` counts the unit against an inbound expectation instead
    /// of plain admission.
    fn admit(
        state: &mut RegistryState,
        cmd: RegisterUnit,
        via_receive: bool,
    ) -> DomainResult<Vec<UnitEvent>> {
        if state.units.contains_key(&cmd.unit_id) {
            return Err(DomainError::conflict(format!(
                "unit {} is already registered",
                cmd.unit_id
            )));
        }

        if let Some(serial) = &cmd.serial {
            let key = (cmd.sku_id, serial.clone());
            if let Some(existing) = state.serials.get(&key) {
                let still_active = state
                    .units
                    .get(existing)
                    .map(|u| u.is_active())
                    .unwrap_or(false);
                if still_active {
                    return Err(DomainError::conflict(format!(
                        "serial {serial} is already registered for this SKU"
                    )));
                }
            }
        }

        let unit = InventoryUnit::empty(cmd.unit_id);
        let events = unit.handle(&UnitCommand::RegisterUnit(cmd.clone()))?;
        let mut unit = unit;
        for event in &events {
            unit.apply(event);
        }

        let level = state
            .stock
            .entry((cmd.sku_id, cmd.location))
            .or_insert_with(|| StockLevel::new(cmd.sku_id, cmd.location));
        if via_receive {
            level.receive(1);
        } else {
            level.add_unit(cmd.initial_status.bucket());
        }

        if let Some(serial) = &cmd.serial {
            state.serials.insert((cmd.sku_id, serial.clone()), cmd.unit_id);
        }
        state.units.insert(cmd.unit_id, unit);
        Ok(events)
    }

    /// Register a single unit.
    pub fn register(&self, cmd: RegisterUnit) -> DomainResult<Vec<UnitEvent>> {
        let mut state = self.write_state()?;
        Self::admit(&mut state, cmd, false)
    }

    /// Receive a purchased quantity: registers one unit per arriving piece
    /// and consumes any matching inbound expectation.
    ///
    /// The whole intake is validated up front; serial problems reject the
    /// batch before any unit is admitted.
    pub fn receive(&self, intake: ReceiveStock) -> DomainResult<(Vec<UnitId>, Vec<UnitEvent>)> {
        if intake.quantity == 0 {
            return Err(DomainError::validation("received quantity must be at least 1"));
        }
        if intake.initial_status.bucket() != StockBucket::Available {
            return Err(DomainError::validation(
                "received stock must enter an available status",
            ));
        }
        if intake.sku_is_serialized {
            if intake.serials.len() as u32 != intake.quantity {
                return Err(DomainError::validation(format!(
                    "{} serials supplied for a quantity of {}",
                    intake.serials.len(),
                    intake.quantity
                )));
            }
            let mut seen = HashSet::new();
            for serial in &intake.serials {
                if serial.trim().is_empty() {
                    return Err(DomainError::validation("serial number cannot be blank"));
                }
                if !seen.insert(serial.as_str()) {
                    return Err(DomainError::validation(format!(
                        "serial {serial} listed twice in intake"
                    )));
                }
            }
        } else if !intake.serials.is_empty() {
            return Err(DomainError::validation(
                "serials supplied for a non-serialized SKU",
            ));
        }

        let mut state = self.write_state()?;

        if intake.sku_is_serialized {
            for serial in &intake.serials {
                let key = (intake.sku_id, serial.clone());
                if let Some(existing) = state.serials.get(&key) {
                    let still_active = state
                        .units
                        .get(existing)
                        .map(|u| u.is_active())
                        .unwrap_or(false);
                    if still_active {
                        return Err(DomainError::conflict(format!(
                            "serial {serial} is already registered for this SKU"
                        )));
                    }
                }
            }
        }

        let mut unit_ids = Vec::with_capacity(intake.quantity as usize);
        let mut events = Vec::new();
        for i in 0..intake.quantity as usize {
            let serial = intake.sku_is_serialized.then(|| intake.serials[i].clone());
            let cmd = RegisterUnit {
                unit_id: UnitId::new(AggregateId::new()),
                sku_id: intake.sku_id,
                location: intake.location,
                serial,
                sku_is_serialized: intake.sku_is_serialized,
                initial_status: intake.initial_status,
                condition: intake.condition,
                purchase_cost: intake.unit_cost,
                purchased_on: Some(intake.occurred_at),
                warranty_until: None,
                actor: intake.actor,
                occurred_at: intake.occurred_at,
            };
            unit_ids.push(cmd.unit_id);
            events.extend(Self::admit(&mut state, cmd, true)?);
        }

        Ok((unit_ids, events))
    }

    /// Record quantity ordered but not yet arrived.
    pub fn expect_inbound(
        &self,
        sku_id: SkuId,
        location: LocationId,
        quantity: u32,
    ) -> DomainResult<()> {
        if quantity == 0 {
            return Err(DomainError::validation("inbound quantity must be at least 1"));
        }
        let mut state = self.write_state()?;
        state
            .stock
            .entry((sku_id, location))
            .or_insert_with(|| StockLevel::new(sku_id, location))
            .expect_inbound(quantity);
        Ok(())
    }

    /// Dispatch a command against one existing unit, keeping its stock
    /// bucket in step with any status change.
    pub fn execute(
        &self,
        unit_id: UnitId,
        expected: ExpectedVersion,
        cmd: &UnitCommand,
    ) -> DomainResult<Vec<UnitEvent>> {
        if unit_command_target(cmd)? != unit_id {
            return Err(DomainError::invariant("command targets a different unit"));
        }

        let mut state = self.write_state()?;
        let state = &mut *state;

        let unit = state.units.get(&unit_id).ok_or_else(DomainError::not_found)?;
        expected.check(unit.version())?;

        let events = unit.handle(cmd)?;
        let mut updated = unit.clone();
        let key = stock_binding(&updated)?;
        let mut level = state
            .stock
            .get(&key)
            .cloned()
            .ok_or_else(|| DomainError::invariant("stock level missing for unit"))?;

        for event in &events {
            apply_stock_effect(&mut level, &updated, event)?;
            updated.apply(event);
        }

        state.units.insert(unit_id, updated);
        state.stock.insert(key, level);
        Ok(events)
    }

    /// Dispatch a batch of commands atomically: either every command
    /// succeeds and the combined result is committed, or nothing changes.
    pub fn execute_batch(&self, commands: &[UnitCommand]) -> DomainResult<Vec<UnitEvent>> {
        let mut state = self.write_state()?;
        let state = &mut *state;

        let mut staged_units: HashMap<UnitId, InventoryUnit> = HashMap::new();
        let mut staged_stock: HashMap<(SkuId, LocationId), StockLevel> = HashMap::new();
        let mut all_events = Vec::new();

        for cmd in commands {
            let unit_id = unit_command_target(cmd)?;
            let unit = match staged_units.get(&unit_id) {
                Some(staged) => staged.clone(),
                None => state
                    .units
                    .get(&unit_id)
                    .cloned()
                    .ok_or_else(DomainError::not_found)?,
            };

            let events = unit.handle(cmd)?;
            let mut updated = unit;
            let key = stock_binding(&updated)?;
            let mut level = match staged_stock.get(&key) {
                Some(staged) => staged.clone(),
                None => state
                    .stock
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| DomainError::invariant("stock level missing for unit"))?,
            };

            for event in &events {
                apply_stock_effect(&mut level, &updated, event)?;
                updated.apply(event);
            }

            staged_units.insert(unit_id, updated);
            staged_stock.insert(key, level);
            all_events.extend(events);
        }

        for (unit_id, unit) in staged_units {
            state.units.insert(unit_id, unit);
        }
        for (key, level) in staged_stock {
            state.stock.insert(key, level);
        }
        Ok(all_events)
    }

    pub fn unit(&self, unit_id: UnitId) -> Option<InventoryUnit> {
        let state = self.state.read().ok()?;
        state.units.get(&unit_id).cloned()
    }

    pub fn units_for_sku(&self, sku_id: SkuId, location: LocationId) -> Vec<InventoryUnit> {
        let Ok(state) = self.state.read() else {
            return vec![];
        };
        state
            .units
            .values()
            .filter(|u| u.sku_id() == Some(sku_id) && u.location() == Some(location))
            .cloned()
            .collect()
    }

    pub fn stock_level(&self, sku_id: SkuId, location: LocationId) -> Option<StockLevel> {
        let state = self.state.read().ok()?;
        state.stock.get(&(sku_id, location)).cloned()
    }

    pub fn stock_levels(&self) -> Vec<StockLevel> {
        let Ok(state) = self.state.read() else {
            return vec![];
        };
        state.stock.values().cloned().collect()
    }

    /// Recompute one stock level from unit state, replacing the running
    /// projection. The inbound expectation is carried over.
    pub fn rebuild_stock_level(
        &self,
        sku_id: SkuId,
        location: LocationId,
    ) -> DomainResult<StockLevel> {
        let mut state = self.write_state()?;
        let in_transit = state
            .stock
            .get(&(sku_id, location))
            .map(|l| l.in_transit)
            .unwrap_or(0);
        let statuses: Vec<UnitStatus> = state
            .units
            .values()
            .filter(|u| {
                u.sku_id() == Some(sku_id) && u.location() == Some(location) && u.is_active()
            })
            .map(|u| u.status())
            .collect();

        let level = StockLevel::rebuild(sku_id, location, statuses, in_transit);
        state.stock.insert((sku_id, location), level.clone());
        Ok(level)
    }
}

impl Default for InventoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn unit_command_target(cmd: &UnitCommand) -> DomainResult<UnitId> {
    match cmd {
        UnitCommand::RegisterUnit(_) => Err(DomainError::invariant(
            "registration goes through the registry, not command dispatch",
        )),
        UnitCommand::TransitionUnit(c) => Ok(c.unit_id),
        UnitCommand::ReviseCondition(c) => Ok(c.unit_id),
        UnitCommand::RecordRentalOutcome(c) => Ok(c.unit_id),
        UnitCommand::DeactivateUnit(c) => Ok(c.unit_id),
    }
}

fn stock_binding(unit: &InventoryUnit) -> DomainResult<(SkuId, LocationId)> {
    match (unit.sku_id(), unit.location()) {
        (Some(sku_id), Some(location)) => Ok((sku_id, location)),
        _ => Err(DomainError::invariant("unit has no stock binding")),
    }
}

/// Mirror one unit event onto the stock counts. `unit` is the state before
/// the event is applied.
fn apply_stock_effect(
    level: &mut StockLevel,
    unit: &InventoryUnit,
    event: &UnitEvent,
) -> DomainResult<()> {
    match event {
        UnitEvent::StatusChanged(e) => level.apply_move(e.from.bucket(), e.to.bucket()),
        UnitEvent::UnitDeactivated(_) => level.remove_unit(unit.status().bucket()),
        _ => Ok(()),
    }
}

/// In-memory transaction store with expected-version dispatch.
pub struct TransactionStore {
    items: RwLock<HashMap<TransactionId, RentalTransaction>>,
}

impl TransactionStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }

    pub fn execute(
        &self,
        id: TransactionId,
        expected: ExpectedVersion,
        cmd: &TransactionCommand,
    ) -> DomainResult<Vec<TransactionEvent>> {
        let mut items = self
            .items
            .write()
            .map_err(|_| DomainError::conflict("transaction store lock poisoned"))?;

        let mut txn = items
            .get(&id)
            .cloned()
            .unwrap_or_else(|| RentalTransaction::empty(id));
        expected.check(txn.version())?;

        let events = txn.handle(cmd)?;
        for event in &events {
            txn.apply(event);
        }
        items.insert(id, txn);
        Ok(events)
    }

    pub fn get(&self, id: TransactionId) -> Option<RentalTransaction> {
        let items = self.items.read().ok()?;
        items.get(&id).cloned()
    }

    pub fn list(&self) -> Vec<RentalTransaction> {
        let Ok(items) = self.items.read() else {
            return vec![];
        };
        items.values().cloned().collect()
    }
}

impl Default for TransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory return store with expected-version dispatch.
pub struct ReturnStore {
    items: RwLock<HashMap<ReturnId, RentalReturn>>,
}

impl ReturnStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }

    pub fn execute(
        &self,
        id: ReturnId,
        expected: ExpectedVersion,
        cmd: &ReturnCommand,
    ) -> DomainResult<Vec<ReturnEvent>> {
        let mut items = self
            .items
            .write()
            .map_err(|_| DomainError::conflict("return store lock poisoned"))?;

        let mut ret = items
            .get(&id)
            .cloned()
            .unwrap_or_else(|| RentalReturn::empty(id));
        expected.check(ret.version())?;

        let events = ret.handle(cmd)?;
        for event in &events {
            ret.apply(event);
        }
        items.insert(id, ret);
        Ok(events)
    }

    pub fn get(&self, id: ReturnId) -> Option<RentalReturn> {
        let items = self.items.read().ok()?;
        items.get(&id).cloned()
    }

    /// All return events recorded against one transaction.
    pub fn for_transaction(&self, transaction_id: TransactionId) -> Vec<RentalReturn> {
        let Ok(items) = self.items.read() else {
            return vec![];
        };
        let mut returns: Vec<RentalReturn> = items
            .values()
            .filter(|r| r.transaction_id() == Some(transaction_id))
            .cloned()
            .collect();
        returns.sort_by_key(|r| r.returned_at());
        returns
    }
}

impl Default for ReturnStore {
    fn default() -> Self {
        Self::new()
    }
}
