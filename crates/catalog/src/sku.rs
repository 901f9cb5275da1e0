use serde::{Deserialize, Serialize};

use rentflow_core::{AggregateId, DomainError};

/// SKU identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkuId(pub AggregateId);

impl SkuId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SkuId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Master record for one stock-keeping unit.
///
/// Monetary amounts are in the smallest currency unit (cents). Rental
/// durations are in whole days. Reorder parameters drive the low-stock
/// reporting in the stock ledger; they describe the SKU, not any particular
/// location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuRecord {
    pub id: SkuId,
    pub name: String,
    /// Serialized SKUs track one unit per serial number; non-serialized SKUs
    /// are tracked as quantity.
    pub is_serialized: bool,
    pub is_rentable: bool,
    pub is_saleable: bool,
    /// Sale price per unit, in cents.
    pub unit_price: u64,
    /// Rental price per unit per day, in cents.
    pub daily_rate: u64,
    pub min_rental_days: u32,
    pub max_rental_days: u32,
    pub reorder_point: u32,
    pub reorder_quantity: u32,
    pub maximum_stock: u32,
}

impl SkuRecord {
    /// Validate internal consistency. Call before admitting a record into a
    /// catalog source.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("SKU name cannot be empty"));
        }
        if !self.is_rentable && !self.is_saleable {
            return Err(DomainError::validation(
                "SKU must be rentable, saleable, or both",
            ));
        }
        if self.is_rentable {
            if self.min_rental_days == 0 {
                return Err(DomainError::validation(
                    "min_rental_days must be at least 1 for rentable SKUs",
                ));
            }
            if self.max_rental_days < self.min_rental_days {
                return Err(DomainError::validation(format!(
                    "max_rental_days ({}) must not be below min_rental_days ({})",
                    self.max_rental_days, self.min_rental_days
                )));
            }
        }
        Ok(())
    }

    /// Whether a rental duration in days falls inside this SKU's allowed span.
    pub fn allows_rental_days(&self, days: u32) -> bool {
        self.is_rentable && days >= self.min_rental_days && days <= self.max_rental_days
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rentable_sku() -> SkuRecord {
        SkuRecord {
            id: SkuId::new(AggregateId::new()),
            name: "Floor sander".to_string(),
            is_serialized: true,
            is_rentable: true,
            is_saleable: false,
            unit_price: 0,
            daily_rate: 4500,
            min_rental_days: 1,
            max_rental_days: 30,
            reorder_point: 2,
            reorder_quantity: 5,
            maximum_stock: 10,
        }
    }

    #[test]
    fn valid_record_passes_validation() {
        assert!(rentable_sku().validate().is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        let mut sku = rentable_sku();
        sku.name = "   ".to_string();
        assert!(matches!(
            sku.validate(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn rejects_neither_rentable_nor_saleable() {
        let mut sku = rentable_sku();
        sku.is_rentable = false;
        sku.is_saleable = false;
        assert!(sku.validate().is_err());
    }

    #[test]
    fn rejects_inverted_rental_span() {
        let mut sku = rentable_sku();
        sku.min_rental_days = 7;
        sku.max_rental_days = 3;
        assert!(sku.validate().is_err());
    }

    #[test]
    fn rental_days_span_is_inclusive_on_both_ends() {
        let sku = rentable_sku();
        assert!(!sku.allows_rental_days(0));
        assert!(sku.allows_rental_days(1));
        assert!(sku.allows_rental_days(30));
        assert!(!sku.allows_rental_days(31));
    }

    #[test]
    fn sale_only_sku_allows_no_rental_days() {
        let mut sku = rentable_sku();
        sku.is_rentable = false;
        sku.is_saleable = true;
        assert!(sku.validate().is_ok());
        assert!(!sku.allows_rental_days(1));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            /// Property: any valid record accepts exactly the days within its span.
            #[test]
            fn allowed_days_match_declared_span(
                min in 1u32..30,
                extra in 0u32..30,
                days in 0u32..90
            ) {
                let mut sku = rentable_sku();
                sku.min_rental_days = min;
                sku.max_rental_days = min + extra;
                prop_assert!(sku.validate().is_ok());

                let expected = days >= min && days <= min + extra;
                prop_assert_eq!(sku.allows_rental_days(days), expected);
            }
        }
    }
}
