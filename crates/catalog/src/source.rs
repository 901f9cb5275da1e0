use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rentflow_core::{DomainError, DomainResult};

use crate::sku::{SkuId, SkuRecord};

/// Read-only SKU lookup abstraction.
///
/// Implementations return a snapshot of the record; the rental core treats
/// catalog data as static for the duration of one operation.
pub trait CatalogSource: Send + Sync {
    /// Look up one SKU. `Ok(None)` means the SKU does not exist; `Err` is a
    /// failed lookup (backend unavailable, lock poisoned), never absence.
    fn sku(&self, id: SkuId) -> DomainResult<Option<SkuRecord>>;
}

impl<S> CatalogSource for Arc<S>
where
    S: CatalogSource + ?Sized,
{
    fn sku(&self, id: SkuId) -> DomainResult<Option<SkuRecord>> {
        (**self).sku(id)
    }
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    inner: RwLock<HashMap<SkuId, SkuRecord>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and admit a record, replacing any previous version.
    pub fn upsert(&self, record: SkuRecord) -> DomainResult<()> {
        record.validate()?;
        let mut map = self
            .inner
            .write()
            .map_err(|_| DomainError::conflict("catalog lock poisoned"))?;
        map.insert(record.id, record);
        Ok(())
    }
}

impl CatalogSource for InMemoryCatalog {
    fn sku(&self, id: SkuId) -> DomainResult<Option<SkuRecord>> {
        let map = self
            .inner
            .read()
            .map_err(|_| DomainError::conflict("catalog lock poisoned"))?;
        Ok(map.get(&id).cloned())
    }
}
