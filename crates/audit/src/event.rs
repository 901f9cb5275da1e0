use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentflow_core::{AggregateId, UserId};

/// Kind tag for audited entities.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    InventoryUnit,
    RentalTransaction,
    RentalReturn,
    DepositSettlement,
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            EntityKind::InventoryUnit => "inventory_unit",
            EntityKind::RentalTransaction => "rental_transaction",
            EntityKind::RentalReturn => "rental_return",
            EntityKind::DepositSettlement => "deposit_settlement",
        };
        f.write_str(s)
    }
}

/// Tagged reference to any audited entity.
///
/// The pair `(kind, id)` is the journal's lookup key. Typed identifiers are
/// erased to [`AggregateId`] here; callers resolve them back through the
/// owning store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: AggregateId,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: AggregateId) -> Self {
        Self { kind, id }
    }

    pub fn unit(id: AggregateId) -> Self {
        Self::new(EntityKind::InventoryUnit, id)
    }

    pub fn transaction(id: AggregateId) -> Self {
        Self::new(EntityKind::RentalTransaction, id)
    }

    pub fn rental_return(id: AggregateId) -> Self {
        Self::new(EntityKind::RentalReturn, id)
    }

    pub fn settlement(id: AggregateId) -> Self {
        Self::new(EntityKind::DepositSettlement, id)
    }
}

impl core::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Domain events that feed the audit journal.
///
/// Implemented by aggregate event enums. `action` is a stable dotted label
/// (e.g. `"inventory.unit.status_changed"`) used for filtering; `reason`
/// carries the operator-supplied justification where one was required.
/// `Serialize` is a supertrait so every entry can snapshot its payload.
pub trait AuditedEvent: Serialize {
    fn entity(&self) -> EntityRef;
    fn action(&self) -> &'static str;
    fn actor(&self) -> UserId;
    fn occurred_at(&self) -> DateTime<Utc>;

    fn reason(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ref_display_is_kind_slash_id() {
        let id = AggregateId::new();
        let entity = EntityRef::unit(id);
        assert_eq!(entity.to_string(), format!("inventory_unit/{id}"));
    }

    #[test]
    fn refs_with_same_id_but_different_kind_are_distinct() {
        let id = AggregateId::new();
        assert_ne!(EntityRef::unit(id), EntityRef::transaction(id));
    }
}
