//! `rentflow-engine` — orchestration over the rental domain.
//!
//! The [`service::RentalEngine`] ties the pure aggregates together: it loads
//! state from the in-memory stores, dispatches commands, keeps unit statuses
//! and stock bucket counts in lockstep, maintains the reservation book, and
//! writes every emitted event to the audit journal.
//!
//! Mutating pipelines run under a single engine gate so that multi-entity
//! steps (claim a unit, move its bucket, record the claim) are never visible
//! half-applied. Contention surfaces as `InsufficientStock` or
//! `ClaimConflict`, both safe for the caller to retry after a re-check.

pub mod book;
pub mod booking;
pub mod config;
pub mod ledger;
pub mod reservation;
pub mod returns;
pub mod service;
pub mod settlement;
pub mod store;

pub use book::{Claim, ClaimKey, ReservationBook};
pub use booking::OrderItem;
pub use config::RentalPolicy;
pub use ledger::{AvailabilityReport, ReorderAlert};
pub use returns::ReturnItem;
pub use service::RentalEngine;
pub use store::{InventoryRegistry, ReceiveStock, ReturnStore, TransactionStore};
