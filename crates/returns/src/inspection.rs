use serde::{Deserialize, Serialize};

use rentflow_core::{DomainError, DomainResult, ValueObject};
use rentflow_inventory::ConditionGrade;

/// What the inspector found wrong with a returned unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Damage,
    MissingParts,
    WearTear,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingSeverity {
    Minor,
    Major,
    TotalLoss,
}

/// A single inspection finding on a return line.
///
/// `liability_pct` is the share of `estimated_cost` charged to the customer,
/// as a whole percentage. Evidence entries are opaque URIs kept for the
/// paper trail and never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionFinding {
    pub kind: FindingKind,
    pub severity: FindingSeverity,
    pub description: String,
    /// Estimated repair or replacement cost in cents.
    pub estimated_cost: u64,
    /// Customer liability share, 0 to 100.
    pub liability_pct: u8,
    pub evidence: Vec<String>,
}

impl InspectionFinding {
    pub fn new(
        kind: FindingKind,
        severity: FindingSeverity,
        description: impl Into<String>,
        estimated_cost: u64,
        liability_pct: u8,
    ) -> DomainResult<Self> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(DomainError::validation(
                "finding description cannot be empty",
            ));
        }
        if liability_pct > 100 {
            return Err(DomainError::validation(format!(
                "liability percentage {liability_pct} exceeds 100"
            )));
        }

        Ok(Self {
            kind,
            severity,
            description,
            estimated_cost,
            liability_pct,
            evidence: Vec::new(),
        })
    }

    pub fn with_evidence(mut self, uri: impl Into<String>) -> Self {
        self.evidence.push(uri.into());
        self
    }

    /// Portion of the estimated cost billed to the customer, in cents.
    ///
    /// Widened to u128 internally so large estimates cannot overflow; the
    /// share never exceeds the cost, so the narrowing cast is lossless.
    pub fn customer_charge(&self) -> u64 {
        (self.estimated_cost as u128 * self.liability_pct as u128 / 100) as u64
    }
}

impl ValueObject for InspectionFinding {}

/// Inspector's verdict on one return line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionAssessment {
    pub grade: ConditionGrade,
    pub cleaning_required: bool,
    /// Cleaning fee in cents; only charged when `cleaning_required` is set.
    pub cleaning_fee: u64,
    pub replacement_required: bool,
    pub note: Option<String>,
}

impl ConditionAssessment {
    pub fn clean(grade: ConditionGrade) -> Self {
        Self {
            grade,
            cleaning_required: false,
            cleaning_fee: 0,
            replacement_required: false,
            note: None,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.cleaning_fee > 0 && !self.cleaning_required {
            return Err(DomainError::validation(
                "cleaning fee set without the cleaning flag",
            ));
        }
        Ok(())
    }

    /// Cleaning fee actually owed, in cents.
    pub fn charged_cleaning_fee(&self) -> u64 {
        if self.cleaning_required {
            self.cleaning_fee
        } else {
            0
        }
    }
}

impl ValueObject for ConditionAssessment {}
