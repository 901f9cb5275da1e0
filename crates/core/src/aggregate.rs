//! Command-to-event contract shared by the stateful rental models.

use crate::error::{DomainError, DomainResult};

/// A pure, replayable state machine.
///
/// `handle` validates a command against current state and names the events
/// it produces, without mutating anything. `apply` folds one event in and
/// advances the version. Stores run the pair under their own locking, so
/// both sides must stay deterministic and free of IO.
pub trait Aggregate {
    /// Strongly-typed identifier for this model.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;

    fn id(&self) -> Self::Id;

    /// Events folded in so far. An empty shell reports 0.
    fn version(&self) -> u64;

    /// Decide. Rejections surface here; accepted commands come back as the
    /// events to record.
    fn handle(&self, command: &Self::Command) -> DomainResult<Vec<Self::Event>>;

    /// Evolve. One event, one version step.
    fn apply(&mut self, event: &Self::Event);
}

/// What version a caller believes an aggregate is at when dispatching a
/// command. `Exact` turns concurrent writers into losers with a retryable
/// conflict instead of silent lost updates.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// No expectation; the command lands on whatever state is current.
    Any,
    /// The aggregate must be at exactly this version.
    Exact(u64),
}

impl ExpectedVersion {
    /// True when `actual` satisfies the expectation.
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(expected) => expected == actual,
        }
    }

    /// Same test, surfaced as the retryable [`DomainError::Conflict`].
    pub fn check(self, actual: u64) -> DomainResult<()> {
        match self {
            ExpectedVersion::Any => Ok(()),
            ExpectedVersion::Exact(expected) if expected == actual => Ok(()),
            ExpectedVersion::Exact(expected) => Err(DomainError::conflict(format!(
                "stale write: expected version {expected}, found {actual}"
            ))),
        }
    }
}
