//! Engine construction and shared plumbing.
//!
//! [`RentalEngine`] composes the pure domain aggregates with the in-memory
//! stores, the reservation book and the audit journal. The operation
//! pipelines themselves live in the sibling modules (`booking`, `ledger`,
//! `reservation`, `returns`, `settlement`), each adding an `impl` block to
//! this type.
//!
//! ## Execution model
//!
//! Every mutating pipeline follows the same shape:
//!
//! 1. Take the engine gate, so multi-entity steps are never interleaved.
//! 2. Validate against current state (pure `handle` calls, no mutation).
//! 3. Dispatch the commands, unit batches all-or-nothing.
//! 4. Write every emitted event to the audit journal.
//!
//! Reads skip the gate; they see the registry and stores at whatever point
//! the last committed pipeline left them.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use rentflow_audit::{AuditEntry, AuditJournal, AuditedEvent};
use rentflow_catalog::{CatalogSource, SkuId, SkuRecord};
use rentflow_core::{Clock, DomainError, DomainResult};

use crate::book::ReservationBook;
use crate::config::RentalPolicy;
use crate::store::{InventoryRegistry, ReturnStore, TransactionStore};

/// Orchestrates rentals, sales, stock and returns over in-memory state.
///
/// Generic over the catalog source and the audit journal so tests can plug
/// in fixtures and hosts can plug in real backends.
pub struct RentalEngine<C, J> {
    pub(crate) catalog: C,
    pub(crate) journal: J,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) policy: RentalPolicy,
    pub(crate) registry: InventoryRegistry,
    pub(crate) book: ReservationBook,
    pub(crate) transactions: TransactionStore,
    pub(crate) returns: ReturnStore,
    gate: Mutex<()>,
}

impl<C, J> RentalEngine<C, J>
where
    C: CatalogSource,
    J: AuditJournal,
{
    pub fn new(catalog: C, journal: J, clock: Arc<dyn Clock>, policy: RentalPolicy) -> Self {
        Self {
            catalog,
            journal,
            clock,
            policy,
            registry: InventoryRegistry::new(),
            book: ReservationBook::new(),
            transactions: TransactionStore::new(),
            returns: ReturnStore::new(),
            gate: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &InventoryRegistry {
        &self.registry
    }

    pub fn book(&self) -> &ReservationBook {
        &self.book
    }

    pub fn transactions(&self) -> &TransactionStore {
        &self.transactions
    }

    pub fn returns(&self) -> &ReturnStore {
        &self.returns
    }

    pub fn journal(&self) -> &J {
        &self.journal
    }

    pub fn policy(&self) -> &RentalPolicy {
        &self.policy
    }

    /// Serializes mutating pipelines. A poisoned gate is recovered rather
    /// than propagated: the in-memory stores stage their writes, so a
    /// panicking pipeline leaves no partial state behind.
    pub(crate) fn guard(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn sku(&self, id: SkuId) -> DomainResult<SkuRecord> {
        self.catalog.sku(id)?.ok_or_else(DomainError::not_found)
    }

    pub(crate) fn audit<E: AuditedEvent>(&self, event: &E) {
        self.journal.record(AuditEntry::from_event(event));
    }

    pub(crate) fn audit_all<'a, E, I>(&self, events: I)
    where
        E: AuditedEvent + 'a,
        I: IntoIterator<Item = &'a E>,
    {
        for event in events {
            self.audit(event);
        }
    }
}
