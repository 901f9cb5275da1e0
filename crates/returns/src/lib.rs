//! `rentflow-returns` — return and inspection domain.
//!
//! One [`rental_return::RentalReturn`] is recorded per physical return event;
//! a transaction returned in several trips yields several return aggregates.
//! Each return line carries the late fee frozen at drop-off, the inspector's
//! condition assessment and any damage findings, and decides where its units
//! go when the return is finalized (cleaning, maintenance or straight back to
//! the rentable pool).

pub mod inspection;
pub mod rental_return;

pub use inspection::{ConditionAssessment, FindingKind, FindingSeverity, InspectionFinding};
pub use rental_return::{
    AssessmentEntry, FinalizeReturn, OpenReturn, RecordAssessments, RentalReturn, ReturnCommand,
    ReturnEvent, ReturnId, ReturnKind, ReturnLine, ReturnLineDraft, ReturnStatus,
};
