//! `rentflow-inventory` — physical stock domain.
//!
//! This crate contains the unit lifecycle state machine and the per-location
//! stock ledger counts, implemented purely as deterministic domain logic
//! (no IO, no HTTP, no storage).
//!
//! Serialized SKUs track one [`unit::InventoryUnit`] per serial number.
//! Non-serialized SKUs are tracked as quantity, backed by anonymous unit
//! records so the [`stock::StockLevel`] counts stay recomputable either way.

pub mod status;
pub mod stock;
pub mod unit;

pub use status::{ConditionGrade, StockBucket, UnitStatus};
pub use stock::StockLevel;
pub use unit::{
    DeactivateUnit, InventoryUnit, RecordRentalOutcome, RegisterUnit, ReviseCondition,
    TransitionUnit, UnitCommand, UnitEvent, UnitId,
};
