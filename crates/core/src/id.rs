//! Strongly-typed identifiers used across the rental domain.
//!
//! Every identifier is a UUIDv7 newtype: time-ordered, so listings sort by
//! creation without a separate sequence, and typed, so a unit id can never
//! land where a transaction id belongs.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $t:ident) => {
        $(#[$doc])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(Uuid);

        impl $t {
            /// Mint a fresh, time-ordered identifier.
            ///
            /// Tests that care about determinism should construct ids from
            /// fixed UUIDs instead.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s)
                    .map(Self)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {e}", stringify!($t))))
            }
        }
    };
}

uuid_id! {
    /// Identifier of a user (actor identity).
    UserId
}

uuid_id! {
    /// Identifier of a customer (the renting or purchasing party).
    CustomerId
}

uuid_id! {
    /// Identifier of a stock location (warehouse, branch, van).
    LocationId
}

uuid_id! {
    /// Identifier of an aggregate root.
    AggregateId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_uuid() {
        let id: AggregateId = "0191d4b0-1111-7aaa-8bbb-0123456789ab".parse().unwrap();
        assert_eq!(id.to_string(), "0191d4b0-1111-7aaa-8bbb-0123456789ab");
    }

    #[test]
    fn rejects_malformed_uuid() {
        let result: Result<UserId, _> = "not-a-uuid".parse();
        assert!(matches!(result, Err(DomainError::InvalidId(_))));
    }

    #[test]
    fn new_ids_are_distinct() {
        assert_ne!(LocationId::new(), LocationId::new());
    }
}
