use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentflow_core::{DomainError, DomainResult, ValueObject};

/// Half-open time span `[starts_at, ends_at)` a rental occupies.
///
/// Overlap checks use the raw timestamps, so back-to-back bookings where one
/// ends exactly when the next starts do not collide. Billing counts calendar
/// days inclusively: a same-day window is one billable day.
///
/// Construct through [`BookingWindow::new`]; the fields are public for
/// serialization and in-crate event replay.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingWindow {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl BookingWindow {
    pub fn new(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> DomainResult<Self> {
        if starts_at >= ends_at {
            return Err(DomainError::validation(format!(
                "booking window must end after it starts ({starts_at} >= {ends_at})"
            )));
        }
        Ok(Self { starts_at, ends_at })
    }

    /// Half-open interval overlap.
    pub fn overlaps(&self, other: &BookingWindow) -> bool {
        self.starts_at < other.ends_at && other.starts_at < self.ends_at
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.starts_at && at < self.ends_at
    }

    /// Billable days, inclusive of both end dates.
    pub fn rental_days(&self) -> u32 {
        let days = (self.ends_at.date_naive() - self.starts_at.date_naive())
            .num_days()
            .max(0) as u32;
        days + 1
    }

    /// Same start, later end.
    pub fn extended_to(&self, new_ends_at: DateTime<Utc>) -> DomainResult<Self> {
        if new_ends_at <= self.ends_at {
            return Err(DomainError::validation(
                "extension must move the end of the window forward",
            ));
        }
        Self::new(self.starts_at, new_ends_at)
    }
}

impl ValueObject for BookingWindow {}
