use std::collections::HashMap;
use std::sync::RwLock;

use rentflow_catalog::SkuId;
use rentflow_core::{DomainError, DomainResult, LocationId};
use rentflow_inventory::UnitId;
use rentflow_rentals::{BookingWindow, TransactionId};

/// A claim is keyed by the transaction line it serves.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ClaimKey {
    pub transaction_id: TransactionId,
    pub line_no: u32,
}

impl core::fmt::Display for ClaimKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.transaction_id, self.line_no)
    }
}

/// Concrete units held for one transaction line.
///
/// `window` is present for rental claims and drives window-overlap
/// availability math; sale claims have none (a sold unit never frees up).
/// The claim survives pickup (`picked_up` flips) and shrinks as quantity is
/// returned, disappearing when nothing is left out with the customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub key: ClaimKey,
    pub sku_id: SkuId,
    pub location: LocationId,
    pub unit_ids: Vec<UnitId>,
    pub quantity: u32,
    pub window: Option<BookingWindow>,
    pub picked_up: bool,
}

#[derive(Default)]
struct BookState {
    claims: HashMap<ClaimKey, Claim>,
    by_unit: HashMap<UnitId, ClaimKey>,
}

/// In-memory registry of active claims with a per-unit reverse index.
pub struct ReservationBook {
    state: RwLock<BookState>,
}

impl ReservationBook {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(BookState::default()),
        }
    }

    pub fn insert(&self, claim: Claim) -> DomainResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| DomainError::conflict("reservation book lock poisoned"))?;

        if state.claims.contains_key(&claim.key) {
            return Err(DomainError::claim_conflict(format!(
                "line {} already holds a claim",
                claim.key
            )));
        }
        for unit_id in &claim.unit_ids {
            if state.by_unit.contains_key(unit_id) {
                return Err(DomainError::claim_conflict(format!(
                    "unit {unit_id} is already claimed"
                )));
            }
        }

        for unit_id in &claim.unit_ids {
            state.by_unit.insert(*unit_id, claim.key);
        }
        state.claims.insert(claim.key, claim);
        Ok(())
    }

    pub fn remove(&self, key: ClaimKey) -> Option<Claim> {
        let mut state = self.state.write().ok()?;
        let claim = state.claims.remove(&key)?;
        for unit_id in &claim.unit_ids {
            state.by_unit.remove(unit_id);
        }
        Some(claim)
    }

    pub fn get(&self, key: ClaimKey) -> Option<Claim> {
        let state = self.state.read().ok()?;
        state.claims.get(&key).cloned()
    }

    /// The claim currently holding a unit, if any.
    pub fn claim_for_unit(&self, unit_id: UnitId) -> Option<ClaimKey> {
        let state = self.state.read().ok()?;
        state.by_unit.get(&unit_id).copied()
    }

    pub fn claims_for_transaction(&self, transaction_id: TransactionId) -> Vec<Claim> {
        let Ok(state) = self.state.read() else {
            return vec![];
        };
        let mut claims: Vec<Claim> = state
            .claims
            .values()
            .filter(|c| c.key.transaction_id == transaction_id)
            .cloned()
            .collect();
        claims.sort_by_key(|c| c.key.line_no);
        claims
    }

    pub fn claims_for_sku(&self, sku_id: SkuId, location: LocationId) -> Vec<Claim> {
        let Ok(state) = self.state.read() else {
            return vec![];
        };
        state
            .claims
            .values()
            .filter(|c| c.sku_id == sku_id && c.location == location)
            .cloned()
            .collect()
    }

    pub fn mark_picked_up(&self, transaction_id: TransactionId) -> DomainResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| DomainError::conflict("reservation book lock poisoned"))?;
        for claim in state.claims.values_mut() {
            if claim.key.transaction_id == transaction_id {
                claim.picked_up = true;
            }
        }
        Ok(())
    }

    /// Drop returned units from their claims; a claim with nothing left out
    /// disappears entirely.
    pub fn strip_units(&self, unit_ids: &[UnitId]) -> DomainResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| DomainError::conflict("reservation book lock poisoned"))?;

        for unit_id in unit_ids {
            let Some(key) = state.by_unit.remove(unit_id) else {
                continue;
            };
            let emptied = match state.claims.get_mut(&key) {
                Some(claim) => {
                    claim.unit_ids.retain(|u| u != unit_id);
                    claim.quantity = claim.quantity.saturating_sub(1);
                    claim.quantity == 0
                }
                None => false,
            };
            if emptied {
                state.claims.remove(&key);
            }
        }
        Ok(())
    }

    /// Push claim windows outward after a rental extension. Windows never
    /// move inward here.
    pub fn extend_windows(
        &self,
        transaction_id: TransactionId,
        new_ends_at: chrono::DateTime<chrono::Utc>,
    ) -> DomainResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| DomainError::conflict("reservation book lock poisoned"))?;
        for claim in state.claims.values_mut() {
            if claim.key.transaction_id != transaction_id {
                continue;
            }
            if let Some(window) = claim.window {
                if new_ends_at > window.ends_at {
                    claim.window = Some(BookingWindow {
                        starts_at: window.starts_at,
                        ends_at: new_ends_at,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.claims.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReservationBook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rentflow_core::AggregateId;

    fn key(line_no: u32) -> ClaimKey {
        ClaimKey {
            transaction_id: TransactionId::new(AggregateId::new()),
            line_no,
        }
    }

    fn window() -> BookingWindow {
        BookingWindow::new(
            Utc.with_ymd_and_hms(2025, 5, 5, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 5, 7, 9, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn claim_with(key: ClaimKey, units: Vec<UnitId>) -> Claim {
        Claim {
            key,
            sku_id: SkuId::new(AggregateId::new()),
            location: LocationId::new(),
            quantity: units.len() as u32,
            unit_ids: units,
            window: Some(window()),
            picked_up: false,
        }
    }

    #[test]
    fn insert_and_lookup_by_unit() {
        let book = ReservationBook::new();
        let key = key(1);
        let unit = UnitId::new(AggregateId::new());

        book.insert(claim_with(key, vec![unit])).unwrap();

        assert_eq!(book.claim_for_unit(unit), Some(key));
        assert_eq!(book.get(key).unwrap().quantity, 1);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn double_claim_on_same_line_conflicts() {
        let book = ReservationBook::new();
        let key = key(1);
        book.insert(claim_with(key, vec![UnitId::new(AggregateId::new())]))
            .unwrap();

        let err = book
            .insert(claim_with(key, vec![UnitId::new(AggregateId::new())]))
            .unwrap_err();
        assert!(matches!(err, DomainError::ClaimConflict(_)));
    }

    #[test]
    fn claimed_unit_cannot_be_claimed_again() {
        let book = ReservationBook::new();
        let unit = UnitId::new(AggregateId::new());
        book.insert(claim_with(key(1), vec![unit])).unwrap();

        let err = book.insert(claim_with(key(2), vec![unit])).unwrap_err();
        assert!(matches!(err, DomainError::ClaimConflict(_)));
    }

    #[test]
    fn remove_frees_units() {
        let book = ReservationBook::new();
        let key = key(1);
        let unit = UnitId::new(AggregateId::new());
        book.insert(claim_with(key, vec![unit])).unwrap();

        let removed = book.remove(key).unwrap();
        assert_eq!(removed.unit_ids, vec![unit]);
        assert_eq!(book.claim_for_unit(unit), None);
        assert!(book.is_empty());
    }

    #[test]
    fn strip_units_shrinks_then_drops_claim() {
        let book = ReservationBook::new();
        let key = key(1);
        let u1 = UnitId::new(AggregateId::new());
        let u2 = UnitId::new(AggregateId::new());
        book.insert(claim_with(key, vec![u1, u2])).unwrap();

        book.strip_units(&[u1]).unwrap();
        let claim = book.get(key).unwrap();
        assert_eq!(claim.quantity, 1);
        assert_eq!(claim.unit_ids, vec![u2]);
        assert_eq!(book.claim_for_unit(u1), None);

        book.strip_units(&[u2]).unwrap();
        assert!(book.get(key).is_none());
        assert!(book.is_empty());
    }

    #[test]
    fn extend_windows_only_moves_outward() {
        let book = ReservationBook::new();
        let key = key(1);
        let txn = key.transaction_id;
        book.insert(claim_with(key, vec![UnitId::new(AggregateId::new())]))
            .unwrap();

        let earlier = Utc.with_ymd_and_hms(2025, 5, 6, 9, 0, 0).unwrap();
        book.extend_windows(txn, earlier).unwrap();
        assert_eq!(book.get(key).unwrap().window.unwrap().ends_at, window().ends_at);

        let later = Utc.with_ymd_and_hms(2025, 5, 9, 9, 0, 0).unwrap();
        book.extend_windows(txn, later).unwrap();
        assert_eq!(book.get(key).unwrap().window.unwrap().ends_at, later);
    }

    #[test]
    fn claims_for_transaction_sorted_by_line() {
        let book = ReservationBook::new();
        let txn = TransactionId::new(AggregateId::new());
        for line_no in [3u32, 1, 2] {
            book.insert(claim_with(
                ClaimKey {
                    transaction_id: txn,
                    line_no,
                },
                vec![UnitId::new(AggregateId::new())],
            ))
            .unwrap();
        }

        let lines: Vec<u32> = book
            .claims_for_transaction(txn)
            .iter()
            .map(|c| c.key.line_no)
            .collect();
        assert_eq!(lines, vec![1, 2, 3]);
    }
}
