//! `rentflow-audit` — append-only audit trail for rental operations.
//!
//! Every state change that matters to a dispute (status transitions, claims,
//! deposit decisions, overrides) produces an [`AuditEntry`]. Entries reference
//! their subject through a tagged [`EntityRef`] so one journal serves all
//! entity types.

pub mod event;
pub mod journal;

pub use event::{AuditedEvent, EntityKind, EntityRef};
pub use journal::{AuditEntry, AuditJournal, InMemoryAuditJournal};
