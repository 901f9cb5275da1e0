use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use rentflow_settlement::apply_basis_points;

/// Commercial policy knobs, rates in basis points (1/100 of a percent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalPolicy {
    /// Deposit held on rentals, as a share of the transaction total.
    #[serde(default = "default_deposit_rate_bp")]
    pub deposit_rate_bp: u32,
    /// Sales tax applied to the subtotal.
    #[serde(default = "default_tax_rate_bp")]
    pub tax_rate_bp: u32,
    /// Whole days past the booked end date before late fees start.
    #[serde(default)]
    pub late_fee_grace_days: u32,
    /// Display label only; amounts stay integer cents throughout.
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_deposit_rate_bp() -> u32 {
    3000
}

fn default_tax_rate_bp() -> u32 {
    825
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for RentalPolicy {
    fn default() -> Self {
        Self {
            deposit_rate_bp: default_deposit_rate_bp(),
            tax_rate_bp: default_tax_rate_bp(),
            late_fee_grace_days: 0,
            currency: default_currency(),
        }
    }
}

impl RentalPolicy {
    pub fn tax_for(&self, subtotal: u64) -> u64 {
        apply_basis_points(subtotal, self.tax_rate_bp)
    }

    pub fn deposit_for(&self, total: u64) -> u64 {
        apply_basis_points(total, self.deposit_rate_bp)
    }

    /// The instant from which lateness is counted: the booked end pushed
    /// out by the grace period.
    pub fn late_fee_due(&self, ends_at: DateTime<Utc>) -> DateTime<Utc> {
        ends_at + Duration::days(i64::from(self.late_fee_grace_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn default_policy_matches_house_rates() {
        let policy = RentalPolicy::default();
        // 30% deposit on 324.00, 8.25% tax on 450.00.
        assert_eq!(policy.deposit_for(32400), 9720);
        assert_eq!(policy.tax_for(45000), 3712);
        assert_eq!(policy.currency, "USD");
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let policy: RentalPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, RentalPolicy::default());

        let policy: RentalPolicy =
            serde_json::from_str(r#"{"deposit_rate_bp": 5000}"#).unwrap();
        assert_eq!(policy.deposit_rate_bp, 5000);
        assert_eq!(policy.tax_rate_bp, 825);
        assert_eq!(policy.late_fee_grace_days, 0);
    }

    #[test]
    fn grace_days_push_the_due_date_out() {
        let due = Utc.with_ymd_and_hms(2025, 5, 4, 17, 0, 0).unwrap();
        let policy = RentalPolicy {
            late_fee_grace_days: 2,
            ..RentalPolicy::default()
        };
        assert_eq!(
            policy.late_fee_due(due),
            Utc.with_ymd_and_hms(2025, 5, 6, 17, 0, 0).unwrap()
        );

        let strict = RentalPolicy::default();
        assert_eq!(strict.late_fee_due(due), due);
    }
}
