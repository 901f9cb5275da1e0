//! `rentflow-catalog` — SKU master data consumed by the rental core.
//!
//! The catalog is **read-only** from this workspace's point of view: SKU
//! records (pricing, rentability flags, reorder parameters) are maintained
//! elsewhere and supplied through the [`CatalogSource`] trait. The in-memory
//! implementation backs tests and dev setups.

pub mod sku;
pub mod source;

pub use sku::{SkuId, SkuRecord};
pub use source::{CatalogSource, InMemoryCatalog};
