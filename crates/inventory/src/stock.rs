use serde::{Deserialize, Serialize};

use rentflow_catalog::{SkuId, SkuRecord};
use rentflow_core::{DomainError, DomainResult, LocationId};

use crate::status::{StockBucket, UnitStatus};

/// Per-(SKU, location) count projection of the unit registry.
///
/// The bucket counts are maintained transactionally alongside unit status
/// changes and must always sum to the number of active units of the SKU at
/// the location. `in_transit` tracks inbound stock and sits outside that sum.
/// The projection is recomputable from unit state via [`StockLevel::rebuild`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub sku_id: SkuId,
    pub location: LocationId,
    pub available: u32,
    pub reserved: u32,
    pub out: u32,
    pub maintenance: u32,
    pub in_transit: u32,
}

impl StockLevel {
    pub fn new(sku_id: SkuId, location: LocationId) -> Self {
        Self {
            sku_id,
            location,
            available: 0,
            reserved: 0,
            out: 0,
            maintenance: 0,
            in_transit: 0,
        }
    }

    /// Recompute counts from the statuses of all active units at this
    /// (SKU, location). `in_transit` is carried over; it is not derivable
    /// from unit state.
    pub fn rebuild(
        sku_id: SkuId,
        location: LocationId,
        statuses: impl IntoIterator<Item = UnitStatus>,
        in_transit: u32,
    ) -> Self {
        let mut level = Self::new(sku_id, location);
        level.in_transit = in_transit;
        for status in statuses {
            level.add_unit(status.bucket());
        }
        level
    }

    pub fn count(&self, bucket: StockBucket) -> u32 {
        match bucket {
            StockBucket::Available => self.available,
            StockBucket::Reserved => self.reserved,
            StockBucket::Out => self.out,
            StockBucket::Maintenance => self.maintenance,
        }
    }

    fn count_mut(&mut self, bucket: StockBucket) -> &mut u32 {
        match bucket {
            StockBucket::Available => &mut self.available,
            StockBucket::Reserved => &mut self.reserved,
            StockBucket::Out => &mut self.out,
            StockBucket::Maintenance => &mut self.maintenance,
        }
    }

    /// Total units currently in the pool (all buckets, excluding inbound).
    pub fn on_hand(&self) -> u32 {
        self.available + self.reserved + self.out + self.maintenance
    }

    pub fn is_empty(&self) -> bool {
        self.on_hand() == 0
    }

    /// Count a newly admitted unit.
    pub fn add_unit(&mut self, bucket: StockBucket) {
        *self.count_mut(bucket) = self.count(bucket).saturating_add(1);
    }

    /// Remove a unit leaving the pool (deactivation).
    pub fn remove_unit(&mut self, bucket: StockBucket) -> DomainResult<()> {
        let count = self.count_mut(bucket);
        if *count == 0 {
            return Err(DomainError::invariant(format!(
                "stock count underflow in {bucket:?} bucket"
            )));
        }
        *count -= 1;
        Ok(())
    }

    /// Shift one unit between buckets, mirroring a status transition.
    /// Moves within the same bucket (e.g. between the two available
    /// statuses) leave counts untouched.
    pub fn apply_move(&mut self, from: StockBucket, to: StockBucket) -> DomainResult<()> {
        if from == to {
            return Ok(());
        }
        self.remove_unit(from)?;
        self.add_unit(to);
        Ok(())
    }

    /// Bulk intake. Arriving quantity consumes any matching inbound
    /// expectation before counting as available.
    pub fn receive(&mut self, quantity: u32) {
        self.in_transit = self.in_transit.saturating_sub(quantity);
        self.available = self.available.saturating_add(quantity);
    }

    /// Record quantity ordered but not yet arrived.
    pub fn expect_inbound(&mut self, quantity: u32) {
        self.in_transit = self.in_transit.saturating_add(quantity);
    }

    pub fn needs_reorder(&self, sku: &SkuRecord) -> bool {
        self.available <= sku.reorder_point
    }

    /// How much to order: the SKU's reorder quantity, capped so that
    /// on-hand plus inbound never exceeds maximum stock.
    pub fn suggested_order_quantity(&self, sku: &SkuRecord) -> u32 {
        let headroom = sku
            .maximum_stock
            .saturating_sub(self.on_hand() + self.in_transit);
        sku.reorder_quantity.min(headroom)
    }
}
