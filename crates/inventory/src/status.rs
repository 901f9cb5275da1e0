use serde::{Deserialize, Serialize};

/// Lifecycle status of an inventory unit.
///
/// Units move along two paths that meet at the availability states: the sale
/// path (`AvailableSale → ReservedSale → Sold`) and the rental loop
/// (`AvailableRent → ReservedRent → Rented → InspectionPending → … →
/// AvailableRent`). Every change must follow [`UnitStatus::successors`];
/// `Sold` is terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    AvailableSale,
    ReservedSale,
    Sold,
    AvailableRent,
    ReservedRent,
    Rented,
    InspectionPending,
    CleaningRequired,
    MaintenanceRequired,
}

impl UnitStatus {
    /// Allowed successor statuses.
    ///
    /// Cross-path moves are permitted only between the two available states
    /// (repurposing idle stock). Post-rental units must pass inspection
    /// before becoming available again.
    pub fn successors(self) -> &'static [UnitStatus] {
        use UnitStatus::*;
        match self {
            AvailableSale => &[ReservedSale, AvailableRent, InspectionPending, MaintenanceRequired],
            ReservedSale => &[Sold, AvailableSale],
            Sold => &[],
            AvailableRent => &[ReservedRent, AvailableSale, InspectionPending, MaintenanceRequired],
            ReservedRent => &[Rented, AvailableRent],
            Rented => &[InspectionPending],
            InspectionPending => &[CleaningRequired, MaintenanceRequired, AvailableRent, AvailableSale],
            CleaningRequired => &[AvailableRent, MaintenanceRequired],
            MaintenanceRequired => &[AvailableRent, AvailableSale],
        }
    }

    pub fn can_transition_to(self, to: UnitStatus) -> bool {
        self.successors().contains(&to)
    }

    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    /// Ledger bucket this status counts toward.
    pub fn bucket(self) -> StockBucket {
        use UnitStatus::*;
        match self {
            AvailableSale | AvailableRent => StockBucket::Available,
            ReservedSale | ReservedRent => StockBucket::Reserved,
            Rented | Sold => StockBucket::Out,
            InspectionPending | CleaningRequired | MaintenanceRequired => StockBucket::Maintenance,
        }
    }
}

impl core::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            UnitStatus::AvailableSale => "available_sale",
            UnitStatus::ReservedSale => "reserved_sale",
            UnitStatus::Sold => "sold",
            UnitStatus::AvailableRent => "available_rent",
            UnitStatus::ReservedRent => "reserved_rent",
            UnitStatus::Rented => "rented",
            UnitStatus::InspectionPending => "inspection_pending",
            UnitStatus::CleaningRequired => "cleaning_required",
            UnitStatus::MaintenanceRequired => "maintenance_required",
        };
        f.write_str(s)
    }
}

/// Aggregated count buckets of the stock ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockBucket {
    Available,
    Reserved,
    /// Physically gone from the shelf: rented out or sold.
    Out,
    /// Inspection, cleaning or repair pipeline.
    Maintenance,
}

impl StockBucket {
    pub const ALL: [StockBucket; 4] = [
        StockBucket::Available,
        StockBucket::Reserved,
        StockBucket::Out,
        StockBucket::Maintenance,
    ];
}

/// Physical condition grade, `A` (best) through `D` (worst).
///
/// Derived ordering puts `A` first, so an ascending sort yields
/// best-condition-first candidate lists.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConditionGrade {
    A,
    B,
    C,
    D,
}

impl core::fmt::Display for ConditionGrade {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ConditionGrade::A => "A",
            ConditionGrade::B => "B",
            ConditionGrade::C => "C",
            ConditionGrade::D => "D",
        };
        f.write_str(s)
    }
}
