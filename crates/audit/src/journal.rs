use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use rentflow_core::UserId;

use crate::event::{AuditedEvent, EntityRef};

/// One append-only journal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    pub entity: EntityRef,
    pub action: String,
    pub actor: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
    /// Event payload snapshot, for dispute reconstruction.
    pub details: JsonValue,
}

impl AuditEntry {
    pub fn new(
        entity: EntityRef,
        action: impl Into<String>,
        actor: UserId,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_id: Uuid::now_v7(),
            entity,
            action: action.into(),
            actor,
            reason: None,
            occurred_at,
            details: JsonValue::Null,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = details;
        self
    }

    /// Build an entry from a domain event, snapshotting its payload.
    pub fn from_event<E: AuditedEvent>(event: &E) -> Self {
        let details = serde_json::to_value(event).unwrap_or(JsonValue::Null);
        Self {
            entry_id: Uuid::now_v7(),
            entity: event.entity(),
            action: event.action().to_string(),
            actor: event.actor(),
            reason: event.reason(),
            occurred_at: event.occurred_at(),
            details,
        }
    }
}

/// Append-only audit journal.
pub trait AuditJournal: Send + Sync {
    fn record(&self, entry: AuditEntry);

    /// Entries for one entity, oldest first.
    fn entries_for(&self, entity: EntityRef) -> Vec<AuditEntry>;
}

impl<J> AuditJournal for Arc<J>
where
    J: AuditJournal + ?Sized,
{
    fn record(&self, entry: AuditEntry) {
        (**self).record(entry)
    }

    fn entries_for(&self, entity: EntityRef) -> Vec<AuditEntry> {
        (**self).entries_for(entity)
    }
}

/// In-memory journal for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAuditJournal {
    inner: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditJournal for InMemoryAuditJournal {
    fn record(&self, entry: AuditEntry) {
        if let Ok(mut entries) = self.inner.write() {
            entries.push(entry);
        }
    }

    fn entries_for(&self, entity: EntityRef) -> Vec<AuditEntry> {
        let entries = match self.inner.read() {
            Ok(e) => e,
            Err(_) => return vec![],
        };

        entries
            .iter()
            .filter(|e| e.entity == entity)
            .cloned()
            .collect()
    }
}
