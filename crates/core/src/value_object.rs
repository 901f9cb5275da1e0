//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. They represent
/// concepts where identity doesn't matter, e.g. a booking window or a fee
/// breakdown. To "modify" one, construct a new one.
///
/// The trait requires:
/// - **Clone**: value objects are cheap to copy around
/// - **PartialEq**: compared by their attribute values
/// - **Debug**: debuggable (helpful for logging, testing)
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
