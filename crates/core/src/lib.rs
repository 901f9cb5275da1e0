//! `rentflow-core` — shared primitives for the rental domain.
//!
//! Identifiers, entity metadata, the aggregate contract, error types and the
//! clock seam live here. **Pure domain** only: no IO, no persistence.

pub mod aggregate;
pub mod clock;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, ExpectedVersion};
pub use clock::{Clock, FixedClock, SystemClock};
pub use entity::EntityMeta;
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, CustomerId, LocationId, UserId};
pub use value_object::ValueObject;
