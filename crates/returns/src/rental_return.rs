use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentflow_audit::{AuditedEvent, EntityRef};
use rentflow_catalog::SkuId;
use rentflow_core::{Aggregate, AggregateId, DomainError, DomainResult, EntityMeta, UserId};
use rentflow_inventory::{ConditionGrade, UnitId, UnitStatus};
use rentflow_rentals::TransactionId;

use crate::inspection::{ConditionAssessment, InspectionFinding};

/// Return identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReturnId(pub AggregateId);

impl ReturnId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ReturnId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Whether this return event clears the whole transaction or part of it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    Full,
    Partial,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Initiated,
    InInspection,
    Completed,
}

impl core::fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ReturnStatus::Initiated => "initiated",
            ReturnStatus::InInspection => "in_inspection",
            ReturnStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Line input for [`OpenReturn`].
///
/// The fee inputs (`daily_rate`, `days_late`, `late_fee`) are frozen here by
/// the caller; nothing downstream recomputes them. `unit_ids` are the units
/// physically received back and must match `quantity` one for one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLineDraft {
    pub line_no: u32,
    pub sku_id: SkuId,
    pub quantity: u32,
    pub daily_rate: u64,
    pub days_late: u32,
    pub late_fee: u64,
    pub unit_ids: Vec<UnitId>,
}

/// One line of a return event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLine {
    pub line_no: u32,
    pub sku_id: SkuId,
    pub quantity: u32,
    /// Rate and lateness captured at drop-off for the fee paper trail.
    pub daily_rate: u64,
    pub days_late: u32,
    /// Late fee in cents, frozen at drop-off.
    pub late_fee: u64,
    pub unit_ids: Vec<UnitId>,
    pub assessment: Option<ConditionAssessment>,
    pub findings: Vec<InspectionFinding>,
}

impl ReturnLine {
    /// Customer-billable damage total for this line, in cents.
    pub fn damage_fee(&self) -> u64 {
        self.findings.iter().map(|f| f.customer_charge()).sum()
    }

    /// Cleaning fee owed for this line, in cents.
    pub fn cleaning_fee(&self) -> u64 {
        self.assessment
            .as_ref()
            .map(|a| a.charged_cleaning_fee())
            .unwrap_or(0)
    }

    /// Where this line's units go when the return is finalized.
    ///
    /// Cleaning wins over maintenance; a unit needing both is cleaned first
    /// and routed onward from there. Unassessed lines (forced finalize) go
    /// straight back to the rentable pool.
    pub fn release_status(&self) -> UnitStatus {
        match &self.assessment {
            None => UnitStatus::AvailableRent,
            Some(a) if a.cleaning_required => UnitStatus::CleaningRequired,
            Some(a) if a.replacement_required => UnitStatus::MaintenanceRequired,
            Some(a) if !self.findings.is_empty() && a.grade != ConditionGrade::A => {
                UnitStatus::MaintenanceRequired
            }
            Some(_) => UnitStatus::AvailableRent,
        }
    }
}

/// Aggregate root: one physical return event against a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentalReturn {
    id: ReturnId,
    transaction_id: Option<TransactionId>,
    kind: ReturnKind,
    status: ReturnStatus,
    lines: Vec<ReturnLine>,
    returned_at: Option<DateTime<Utc>>,
    finalized_at: Option<DateTime<Utc>>,
    meta: Option<EntityMeta>,
    version: u64,
    created: bool,
}

impl RentalReturn {
    /// Create an empty, not-yet-opened aggregate instance for rehydration.
    pub fn empty(id: ReturnId) -> Self {
        Self {
            id,
            transaction_id: None,
            kind: ReturnKind::Partial,
            status: ReturnStatus::Initiated,
            lines: Vec::new(),
            returned_at: None,
            finalized_at: None,
            meta: None,
            version: 0,
            created: false,
        }
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction_id
    }

    pub fn kind(&self) -> ReturnKind {
        self.kind
    }

    pub fn status(&self) -> ReturnStatus {
        self.status
    }

    pub fn lines(&self) -> &[ReturnLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&ReturnLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn returned_at(&self) -> Option<DateTime<Utc>> {
        self.returned_at
    }

    pub fn finalized_at(&self) -> Option<DateTime<Utc>> {
        self.finalized_at
    }

    /// Sum of frozen late fees across lines, in cents.
    pub fn late_fees(&self) -> u64 {
        self.lines.iter().map(|l| l.late_fee).sum()
    }

    /// Sum of customer-billable damage charges across lines, in cents.
    pub fn damage_fees(&self) -> u64 {
        self.lines.iter().map(|l| l.damage_fee()).sum()
    }

    /// Sum of cleaning fees across lines, in cents.
    pub fn cleaning_fees(&self) -> u64 {
        self.lines.iter().map(|l| l.cleaning_fee()).sum()
    }

    pub fn is_fully_assessed(&self) -> bool {
        self.lines.iter().all(|l| l.assessment.is_some())
    }

    /// Line numbers still waiting on an inspector verdict.
    pub fn unassessed_lines(&self) -> Vec<u32> {
        self.lines
            .iter()
            .filter(|l| l.assessment.is_none())
            .map(|l| l.line_no)
            .collect()
    }

    pub fn meta(&self) -> Option<&EntityMeta> {
        self.meta.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.meta.as_ref().map(|m| m.is_active).unwrap_or(false)
    }
}

/// Command: OpenReturn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenReturn {
    pub return_id: ReturnId,
    pub transaction_id: TransactionId,
    pub kind: ReturnKind,
    pub lines: Vec<ReturnLineDraft>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// One inspector verdict within a [`RecordAssessments`] batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentEntry {
    pub line_no: u32,
    pub assessment: ConditionAssessment,
    pub findings: Vec<InspectionFinding>,
}

/// Command: RecordAssessments.
///
/// Re-assessing a line before finalization replaces the earlier verdict and
/// its findings wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAssessments {
    pub return_id: ReturnId,
    pub entries: Vec<AssessmentEntry>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FinalizeReturn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeReturn {
    pub return_id: ReturnId,
    /// Allow finalization with unassessed lines; those release to
    /// `AVAILABLE_RENT` untouched.
    pub force: bool,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnCommand {
    OpenReturn(OpenReturn),
    RecordAssessments(RecordAssessments),
    FinalizeReturn(FinalizeReturn),
}

/// Event: ReturnOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnOpened {
    pub return_id: ReturnId,
    pub transaction_id: TransactionId,
    pub kind: ReturnKind,
    pub lines: Vec<ReturnLineDraft>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AssessmentsRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentsRecorded {
    pub return_id: ReturnId,
    pub entries: Vec<AssessmentEntry>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnFinalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnFinalized {
    pub return_id: ReturnId,
    pub forced: bool,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnEvent {
    ReturnOpened(ReturnOpened),
    AssessmentsRecorded(AssessmentsRecorded),
    ReturnFinalized(ReturnFinalized),
}

impl ReturnEvent {
    fn return_id(&self) -> ReturnId {
        match self {
            ReturnEvent::ReturnOpened(e) => e.return_id,
            ReturnEvent::AssessmentsRecorded(e) => e.return_id,
            ReturnEvent::ReturnFinalized(e) => e.return_id,
        }
    }
}

impl AuditedEvent for ReturnEvent {
    fn entity(&self) -> EntityRef {
        EntityRef::rental_return(self.return_id().0)
    }

    fn action(&self) -> &'static str {
        match self {
            ReturnEvent::ReturnOpened(_) => "returns.return.opened",
            ReturnEvent::AssessmentsRecorded(_) => "returns.return.assessed",
            ReturnEvent::ReturnFinalized(_) => "returns.return.finalized",
        }
    }

    fn actor(&self) -> UserId {
        match self {
            ReturnEvent::ReturnOpened(e) => e.actor,
            ReturnEvent::AssessmentsRecorded(e) => e.actor,
            ReturnEvent::ReturnFinalized(e) => e.actor,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReturnEvent::ReturnOpened(e) => e.occurred_at,
            ReturnEvent::AssessmentsRecorded(e) => e.occurred_at,
            ReturnEvent::ReturnFinalized(e) => e.occurred_at,
        }
    }

    fn reason(&self) -> Option<String> {
        match self {
            ReturnEvent::ReturnFinalized(e) if e.forced => {
                Some("finalized with unassessed lines".to_string())
            }
            _ => None,
        }
    }
}

impl Aggregate for RentalReturn {
    type Id = ReturnId;
    type Command = ReturnCommand;
    type Event = ReturnEvent;

    fn id(&self) -> ReturnId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReturnEvent::ReturnOpened(e) => {
                self.id = e.return_id;
                self.transaction_id = Some(e.transaction_id);
                self.kind = e.kind;
                self.status = ReturnStatus::Initiated;
                self.lines = e
                    .lines
                    .iter()
                    .map(|draft| ReturnLine {
                        line_no: draft.line_no,
                        sku_id: draft.sku_id,
                        quantity: draft.quantity,
                        daily_rate: draft.daily_rate,
                        days_late: draft.days_late,
                        late_fee: draft.late_fee,
                        unit_ids: draft.unit_ids.clone(),
                        assessment: None,
                        findings: Vec::new(),
                    })
                    .collect();
                self.returned_at = Some(e.occurred_at);
                self.meta = Some(EntityMeta::new(e.actor, e.occurred_at));
                self.created = true;
            }
            ReturnEvent::AssessmentsRecorded(e) => {
                for entry in &e.entries {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == entry.line_no)
                    {
                        line.assessment = Some(entry.assessment.clone());
                        line.findings = entry.findings.clone();
                    }
                }
                self.status = ReturnStatus::InInspection;
                if let Some(meta) = self.meta.as_mut() {
                    meta.touch(e.actor, e.occurred_at);
                }
            }
            ReturnEvent::ReturnFinalized(e) => {
                self.status = ReturnStatus::Completed;
                self.finalized_at = Some(e.occurred_at);
                if let Some(meta) = self.meta.as_mut() {
                    meta.touch(e.actor, e.occurred_at);
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> DomainResult<Vec<Self::Event>> {
        match command {
            ReturnCommand::OpenReturn(cmd) => self.handle_open(cmd),
            ReturnCommand::RecordAssessments(cmd) => self.handle_record_assessments(cmd),
            ReturnCommand::FinalizeReturn(cmd) => self.handle_finalize(cmd),
        }
    }
}

impl RentalReturn {
    fn ensure_open(&self, return_id: ReturnId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != return_id {
            return Err(DomainError::invariant("return_id mismatch"));
        }
        Ok(())
    }

    fn ensure_not_completed(&self, target: &str) -> Result<(), DomainError> {
        if self.status == ReturnStatus::Completed {
            return Err(DomainError::invalid_transition(
                format!("return {}", self.id),
                self.status.to_string(),
                target,
            ));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenReturn) -> Result<Vec<ReturnEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("return already opened"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("return must cover at least one line"));
        }

        let mut seen_lines = std::collections::HashSet::new();
        let mut seen_units = std::collections::HashSet::new();
        for draft in &cmd.lines {
            if !seen_lines.insert(draft.line_no) {
                return Err(DomainError::validation(format!(
                    "line {} appears twice in return",
                    draft.line_no
                )));
            }
            if draft.quantity == 0 {
                return Err(DomainError::validation(
                    "returned quantity must be at least 1",
                ));
            }
            if draft.unit_ids.len() as u32 != draft.quantity {
                return Err(DomainError::validation(format!(
                    "line {} lists {} units for a quantity of {}",
                    draft.line_no,
                    draft.unit_ids.len(),
                    draft.quantity
                )));
            }
            for unit_id in &draft.unit_ids {
                if !seen_units.insert(*unit_id) {
                    return Err(DomainError::validation(format!(
                        "unit {unit_id} listed twice in return"
                    )));
                }
            }
        }

        Ok(vec![ReturnEvent::ReturnOpened(ReturnOpened {
            return_id: cmd.return_id,
            transaction_id: cmd.transaction_id,
            kind: cmd.kind,
            lines: cmd.lines.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_assessments(
        &self,
        cmd: &RecordAssessments,
    ) -> Result<Vec<ReturnEvent>, DomainError> {
        self.ensure_open(cmd.return_id)?;
        self.ensure_not_completed("assessed")?;

        if cmd.entries.is_empty() {
            return Err(DomainError::validation("assessment batch cannot be empty"));
        }

        let mut seen = std::collections::HashSet::new();
        for entry in &cmd.entries {
            if !seen.insert(entry.line_no) {
                return Err(DomainError::validation(format!(
                    "line {} assessed twice in one batch",
                    entry.line_no
                )));
            }
            if self.line(entry.line_no).is_none() {
                return Err(DomainError::validation(format!(
                    "unknown return line {}",
                    entry.line_no
                )));
            }
            entry.assessment.validate()?;
            for finding in &entry.findings {
                if finding.liability_pct > 100 {
                    return Err(DomainError::validation(format!(
                        "liability percentage {} exceeds 100",
                        finding.liability_pct
                    )));
                }
            }
        }

        Ok(vec![ReturnEvent::AssessmentsRecorded(AssessmentsRecorded {
            return_id: cmd.return_id,
            entries: cmd.entries.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_finalize(&self, cmd: &FinalizeReturn) -> Result<Vec<ReturnEvent>, DomainError> {
        self.ensure_open(cmd.return_id)?;
        self.ensure_not_completed("finalized")?;

        if !cmd.force {
            let unassessed = self.unassessed_lines();
            if !unassessed.is_empty() {
                return Err(DomainError::incomplete_assessment(format!(
                    "lines {unassessed:?} lack a condition assessment"
                )));
            }
        }

        Ok(vec![ReturnEvent::ReturnFinalized(ReturnFinalized {
            return_id: cmd.return_id,
            forced: cmd.force,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}
