//! Lifecycle bookkeeping shared by managed records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Lifecycle bookkeeping shared by managed records.
///
/// Composed into records rather than inherited; a record with a `meta` field
/// carries who touched it and when, plus a soft-delete flag. Deactivated
/// records stay queryable for audit but are excluded from operational flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: UserId,
    pub updated_by: UserId,
    pub is_active: bool,
}

impl EntityMeta {
    pub fn new(actor: UserId, at: DateTime<Utc>) -> Self {
        Self {
            created_at: at,
            updated_at: at,
            created_by: actor,
            updated_by: actor,
            is_active: true,
        }
    }

    /// Record a modification.
    pub fn touch(&mut self, actor: UserId, at: DateTime<Utc>) {
        self.updated_at = at;
        self.updated_by = actor;
    }

    /// Soft-delete. The record remains readable.
    pub fn deactivate(&mut self, actor: UserId, at: DateTime<Utc>) {
        self.is_active = false;
        self.touch(actor, at);
    }

    pub fn reactivate(&mut self, actor: UserId, at: DateTime<Utc>) {
        self.is_active = true;
        self.touch(actor, at);
    }
}
