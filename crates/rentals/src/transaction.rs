use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentflow_audit::{AuditedEvent, EntityRef};
use rentflow_catalog::SkuId;
use rentflow_core::{
    Aggregate, AggregateId, CustomerId, DomainError, DomainResult, EntityMeta, LocationId, UserId,
};
use rentflow_inventory::UnitId;

use crate::window::BookingWindow;

/// Transaction identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub AggregateId);

impl TransactionId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Sale,
    Rental,
}

/// Commercial lifecycle of a transaction.
///
/// `Draft → Pending → Confirmed → InProgress → Completed`, with
/// `Cancelled` reachable until pickup and `Refunded` only from `Completed`.
/// Sale transactions skip `InProgress` (nothing comes back).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Draft,
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    Refunded,
}

impl core::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            TransactionStatus::Draft => "draft",
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::InProgress => "in_progress",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    PartiallyPaid,
    Paid,
    Overdue,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
}

/// One priced line of a transaction.
///
/// Monetary amounts are cents. `outstanding` counts rental quantity not yet
/// returned; sale lines carry zero. `late_fee_accrued` is frozen per returned
/// slice at return initiation and never recomputed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLine {
    pub line_no: u32,
    pub sku_id: SkuId,
    pub quantity: u32,
    /// Sale price per unit; unused for rental lines.
    pub unit_price: u64,
    /// Absolute line discount in cents.
    pub discount: u64,
    /// Rental price per unit per day; unused for sale lines.
    pub daily_rate: u64,
    pub window: Option<BookingWindow>,
    /// Concrete units claimed for this line (serialized SKUs).
    pub unit_ids: Vec<UnitId>,
    pub outstanding: u32,
    pub late_fee_accrued: u64,
    pub extension_charge: u64,
}

impl TransactionLine {
    /// Net line amount: gross (per kind) plus extension charges minus discount.
    pub fn line_total(&self, kind: TransactionKind) -> u64 {
        self.gross(kind)
            .saturating_add(self.extension_charge)
            .saturating_sub(self.discount)
    }

    fn gross(&self, kind: TransactionKind) -> u64 {
        match kind {
            TransactionKind::Sale => self.quantity as u64 * self.unit_price,
            TransactionKind::Rental => {
                let days = self.window.map(|w| w.rental_days()).unwrap_or(0) as u64;
                self.quantity as u64 * self.daily_rate * days
            }
        }
    }
}

/// Line input for [`AddLine`], before a line number is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDraft {
    pub sku_id: SkuId,
    pub quantity: u32,
    pub unit_price: u64,
    pub discount: u64,
    pub daily_rate: u64,
    pub window: Option<BookingWindow>,
}

/// One returned slice of a line, with its frozen late fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineReturnEntry {
    pub line_no: u32,
    pub quantity: u32,
    /// Late fee for this slice in cents, computed by the caller at return
    /// initiation and frozen here.
    pub late_fee: u64,
}

/// Per-line outcome of an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineExtension {
    pub line_no: u32,
    pub additional_days: u32,
    pub charge: u64,
}

/// Aggregate root: a rental or sale transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentalTransaction {
    id: TransactionId,
    kind: TransactionKind,
    customer_id: Option<CustomerId>,
    location: Option<LocationId>,
    status: TransactionStatus,
    payment_status: PaymentStatus,
    lines: Vec<TransactionLine>,
    subtotal: u64,
    tax: u64,
    total: u64,
    deposit_held: u64,
    paid_amount: u64,
    priced: bool,
    opened_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    meta: Option<EntityMeta>,
    version: u64,
    created: bool,
}

impl RentalTransaction {
    /// Create an empty, not-yet-opened aggregate instance for rehydration.
    pub fn empty(id: TransactionId) -> Self {
        Self {
            id,
            kind: TransactionKind::Rental,
            customer_id: None,
            location: None,
            status: TransactionStatus::Draft,
            payment_status: PaymentStatus::Pending,
            lines: Vec::new(),
            subtotal: 0,
            tax: 0,
            total: 0,
            deposit_held: 0,
            paid_amount: 0,
            priced: false,
            opened_at: None,
            completed_at: None,
            meta: None,
            version: 0,
            created: false,
        }
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn location(&self) -> Option<LocationId> {
        self.location
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn lines(&self) -> &[TransactionLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&TransactionLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn subtotal(&self) -> u64 {
        self.subtotal
    }

    pub fn tax(&self) -> u64 {
        self.tax
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn deposit_held(&self) -> u64 {
        self.deposit_held
    }

    pub fn paid_amount(&self) -> u64 {
        self.paid_amount
    }

    /// What the customer still owes for rent/sale plus deposit.
    pub fn amount_due(&self) -> u64 {
        (self.total + self.deposit_held).saturating_sub(self.paid_amount)
    }

    /// Late fees frozen across all lines so far.
    pub fn total_late_fees(&self) -> u64 {
        self.lines.iter().map(|l| l.late_fee_accrued).sum()
    }

    pub fn outstanding_quantity(&self) -> u32 {
        self.lines.iter().map(|l| l.outstanding).sum()
    }

    pub fn fully_returned(&self) -> bool {
        self.lines.iter().all(|l| l.outstanding == 0)
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn meta(&self) -> Option<&EntityMeta> {
        self.meta.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.meta.as_ref().map(|m| m.is_active).unwrap_or(false)
    }
}

/// Command: OpenTransaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenTransaction {
    pub transaction_id: TransactionId,
    pub kind: TransactionKind,
    pub customer_id: CustomerId,
    pub location: LocationId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub transaction_id: TransactionId,
    pub line: LineDraft,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PriceTransaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTransaction {
    pub transaction_id: TransactionId,
    /// Tax amount in cents, computed by the caller's policy.
    pub tax: u64,
    /// Deposit to hold in cents, computed by the caller's policy.
    pub deposit: u64,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AttachClaim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachClaim {
    pub transaction_id: TransactionId,
    pub line_no: u32,
    pub unit_ids: Vec<UnitId>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitTransaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitTransaction {
    pub transaction_id: TransactionId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub transaction_id: TransactionId,
    pub amount: u64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmTransaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmTransaction {
    pub transaction_id: TransactionId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StartRental.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRental {
    pub transaction_id: TransactionId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkPaymentOverdue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPaymentOverdue {
    pub transaction_id: TransactionId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ExtendRental.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendRental {
    pub transaction_id: TransactionId,
    pub new_ends_at: DateTime<Utc>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordReturn.
///
/// All entries are validated before any is applied; one bad entry rejects
/// the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReturn {
    pub transaction_id: TransactionId,
    pub entries: Vec<LineReturnEntry>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteTransaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteTransaction {
    pub transaction_id: TransactionId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelTransaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTransaction {
    pub transaction_id: TransactionId,
    pub reason: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RefundTransaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundTransaction {
    pub transaction_id: TransactionId,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateTransaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateTransaction {
    pub transaction_id: TransactionId,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionCommand {
    OpenTransaction(OpenTransaction),
    AddLine(AddLine),
    PriceTransaction(PriceTransaction),
    AttachClaim(AttachClaim),
    SubmitTransaction(SubmitTransaction),
    RecordPayment(RecordPayment),
    ConfirmTransaction(ConfirmTransaction),
    StartRental(StartRental),
    MarkPaymentOverdue(MarkPaymentOverdue),
    ExtendRental(ExtendRental),
    RecordReturn(RecordReturn),
    CompleteTransaction(CompleteTransaction),
    CancelTransaction(CancelTransaction),
    RefundTransaction(RefundTransaction),
    DeactivateTransaction(DeactivateTransaction),
}

/// Event: TransactionOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOpened {
    pub transaction_id: TransactionId,
    pub kind: TransactionKind,
    pub customer_id: CustomerId,
    pub location: LocationId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub transaction_id: TransactionId,
    pub line_no: u32,
    pub line: LineDraft,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransactionPriced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPriced {
    pub transaction_id: TransactionId,
    pub subtotal: u64,
    pub tax: u64,
    pub total: u64,
    pub deposit: u64,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ClaimAttached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimAttached {
    pub transaction_id: TransactionId,
    pub line_no: u32,
    pub unit_ids: Vec<UnitId>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransactionSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSubmitted {
    pub transaction_id: TransactionId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub transaction_id: TransactionId,
    pub amount: u64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransactionConfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionConfirmed {
    pub transaction_id: TransactionId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RentalStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalStarted {
    pub transaction_id: TransactionId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentMarkedOverdue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMarkedOverdue {
    pub transaction_id: TransactionId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RentalExtended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalExtended {
    pub transaction_id: TransactionId,
    pub new_ends_at: DateTime<Utc>,
    pub lines: Vec<LineExtension>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRecorded {
    pub transaction_id: TransactionId,
    pub entries: Vec<LineReturnEntry>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransactionCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCompleted {
    pub transaction_id: TransactionId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransactionCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCancelled {
    pub transaction_id: TransactionId,
    pub reason: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransactionRefunded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRefunded {
    pub transaction_id: TransactionId,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransactionDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDeactivated {
    pub transaction_id: TransactionId,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionEvent {
    TransactionOpened(TransactionOpened),
    LineAdded(LineAdded),
    TransactionPriced(TransactionPriced),
    ClaimAttached(ClaimAttached),
    TransactionSubmitted(TransactionSubmitted),
    PaymentRecorded(PaymentRecorded),
    TransactionConfirmed(TransactionConfirmed),
    RentalStarted(RentalStarted),
    PaymentMarkedOverdue(PaymentMarkedOverdue),
    RentalExtended(RentalExtended),
    ReturnRecorded(ReturnRecorded),
    TransactionCompleted(TransactionCompleted),
    TransactionCancelled(TransactionCancelled),
    TransactionRefunded(TransactionRefunded),
    TransactionDeactivated(TransactionDeactivated),
}

impl TransactionEvent {
    fn transaction_id(&self) -> TransactionId {
        match self {
            TransactionEvent::TransactionOpened(e) => e.transaction_id,
            TransactionEvent::LineAdded(e) => e.transaction_id,
            TransactionEvent::TransactionPriced(e) => e.transaction_id,
            TransactionEvent::ClaimAttached(e) => e.transaction_id,
            TransactionEvent::TransactionSubmitted(e) => e.transaction_id,
            TransactionEvent::PaymentRecorded(e) => e.transaction_id,
            TransactionEvent::TransactionConfirmed(e) => e.transaction_id,
            TransactionEvent::RentalStarted(e) => e.transaction_id,
            TransactionEvent::PaymentMarkedOverdue(e) => e.transaction_id,
            TransactionEvent::RentalExtended(e) => e.transaction_id,
            TransactionEvent::ReturnRecorded(e) => e.transaction_id,
            TransactionEvent::TransactionCompleted(e) => e.transaction_id,
            TransactionEvent::TransactionCancelled(e) => e.transaction_id,
            TransactionEvent::TransactionRefunded(e) => e.transaction_id,
            TransactionEvent::TransactionDeactivated(e) => e.transaction_id,
        }
    }
}

impl AuditedEvent for TransactionEvent {
    fn entity(&self) -> EntityRef {
        EntityRef::transaction(self.transaction_id().0)
    }

    fn action(&self) -> &'static str {
        match self {
            TransactionEvent::TransactionOpened(_) => "rentals.transaction.opened",
            TransactionEvent::LineAdded(_) => "rentals.transaction.line_added",
            TransactionEvent::TransactionPriced(_) => "rentals.transaction.priced",
            TransactionEvent::ClaimAttached(_) => "rentals.transaction.claim_attached",
            TransactionEvent::TransactionSubmitted(_) => "rentals.transaction.submitted",
            TransactionEvent::PaymentRecorded(_) => "rentals.transaction.payment_recorded",
            TransactionEvent::TransactionConfirmed(_) => "rentals.transaction.confirmed",
            TransactionEvent::RentalStarted(_) => "rentals.transaction.rental_started",
            TransactionEvent::PaymentMarkedOverdue(_) => "rentals.transaction.payment_overdue",
            TransactionEvent::RentalExtended(_) => "rentals.transaction.extended",
            TransactionEvent::ReturnRecorded(_) => "rentals.transaction.return_recorded",
            TransactionEvent::TransactionCompleted(_) => "rentals.transaction.completed",
            TransactionEvent::TransactionCancelled(_) => "rentals.transaction.cancelled",
            TransactionEvent::TransactionRefunded(_) => "rentals.transaction.refunded",
            TransactionEvent::TransactionDeactivated(_) => "rentals.transaction.deactivated",
        }
    }

    fn actor(&self) -> UserId {
        match self {
            TransactionEvent::TransactionOpened(e) => e.actor,
            TransactionEvent::LineAdded(e) => e.actor,
            TransactionEvent::TransactionPriced(e) => e.actor,
            TransactionEvent::ClaimAttached(e) => e.actor,
            TransactionEvent::TransactionSubmitted(e) => e.actor,
            TransactionEvent::PaymentRecorded(e) => e.actor,
            TransactionEvent::TransactionConfirmed(e) => e.actor,
            TransactionEvent::RentalStarted(e) => e.actor,
            TransactionEvent::PaymentMarkedOverdue(e) => e.actor,
            TransactionEvent::RentalExtended(e) => e.actor,
            TransactionEvent::ReturnRecorded(e) => e.actor,
            TransactionEvent::TransactionCompleted(e) => e.actor,
            TransactionEvent::TransactionCancelled(e) => e.actor,
            TransactionEvent::TransactionRefunded(e) => e.actor,
            TransactionEvent::TransactionDeactivated(e) => e.actor,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransactionEvent::TransactionOpened(e) => e.occurred_at,
            TransactionEvent::LineAdded(e) => e.occurred_at,
            TransactionEvent::TransactionPriced(e) => e.occurred_at,
            TransactionEvent::ClaimAttached(e) => e.occurred_at,
            TransactionEvent::TransactionSubmitted(e) => e.occurred_at,
            TransactionEvent::PaymentRecorded(e) => e.occurred_at,
            TransactionEvent::TransactionConfirmed(e) => e.occurred_at,
            TransactionEvent::RentalStarted(e) => e.occurred_at,
            TransactionEvent::PaymentMarkedOverdue(e) => e.occurred_at,
            TransactionEvent::RentalExtended(e) => e.occurred_at,
            TransactionEvent::ReturnRecorded(e) => e.occurred_at,
            TransactionEvent::TransactionCompleted(e) => e.occurred_at,
            TransactionEvent::TransactionCancelled(e) => e.occurred_at,
            TransactionEvent::TransactionRefunded(e) => e.occurred_at,
            TransactionEvent::TransactionDeactivated(e) => e.occurred_at,
        }
    }

    fn reason(&self) -> Option<String> {
        match self {
            TransactionEvent::TransactionCancelled(e) => e.reason.clone(),
            TransactionEvent::TransactionRefunded(e) => Some(e.reason.clone()),
            TransactionEvent::TransactionDeactivated(e) => Some(e.reason.clone()),
            _ => None,
        }
    }
}

impl Aggregate for RentalTransaction {
    type Id = TransactionId;
    type Command = TransactionCommand;
    type Event = TransactionEvent;

    fn id(&self) -> TransactionId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransactionEvent::TransactionOpened(e) => {
                self.id = e.transaction_id;
                self.kind = e.kind;
                self.customer_id = Some(e.customer_id);
                self.location = Some(e.location);
                self.status = TransactionStatus::Draft;
                self.opened_at = Some(e.occurred_at);
                self.meta = Some(EntityMeta::new(e.actor, e.occurred_at));
                self.created = true;
            }
            TransactionEvent::LineAdded(e) => {
                let outstanding = match self.kind {
                    TransactionKind::Rental => e.line.quantity,
                    TransactionKind::Sale => 0,
                };
                self.lines.push(TransactionLine {
                    line_no: e.line_no,
                    sku_id: e.line.sku_id,
                    quantity: e.line.quantity,
                    unit_price: e.line.unit_price,
                    discount: e.line.discount,
                    daily_rate: e.line.daily_rate,
                    window: e.line.window,
                    unit_ids: Vec::new(),
                    outstanding,
                    late_fee_accrued: 0,
                    extension_charge: 0,
                });
                self.touch(e.actor, e.occurred_at);
            }
            TransactionEvent::TransactionPriced(e) => {
                self.subtotal = e.subtotal;
                self.tax = e.tax;
                self.total = e.total;
                self.deposit_held = e.deposit;
                self.priced = true;
                self.touch(e.actor, e.occurred_at);
            }
            TransactionEvent::ClaimAttached(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == e.line_no) {
                    line.unit_ids = e.unit_ids.clone();
                }
                self.touch(e.actor, e.occurred_at);
            }
            TransactionEvent::TransactionSubmitted(e) => {
                self.status = TransactionStatus::Pending;
                self.touch(e.actor, e.occurred_at);
            }
            TransactionEvent::PaymentRecorded(e) => {
                self.paid_amount = self.paid_amount.saturating_add(e.amount);
                self.payment_status = if self.paid_amount >= self.total + self.deposit_held {
                    PaymentStatus::Paid
                } else {
                    PaymentStatus::PartiallyPaid
                };
                self.touch(e.actor, e.occurred_at);
            }
            TransactionEvent::TransactionConfirmed(e) => {
                self.status = TransactionStatus::Confirmed;
                self.touch(e.actor, e.occurred_at);
            }
            TransactionEvent::RentalStarted(e) => {
                self.status = TransactionStatus::InProgress;
                self.touch(e.actor, e.occurred_at);
            }
            TransactionEvent::PaymentMarkedOverdue(e) => {
                self.payment_status = PaymentStatus::Overdue;
                self.touch(e.actor, e.occurred_at);
            }
            TransactionEvent::RentalExtended(e) => {
                for ext in &e.lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == ext.line_no) {
                        if let Some(window) = line.window {
                            line.window = Some(BookingWindow {
                                starts_at: window.starts_at,
                                ends_at: e.new_ends_at,
                            });
                        }
                        line.extension_charge = line.extension_charge.saturating_add(ext.charge);
                        self.subtotal = self.subtotal.saturating_add(ext.charge);
                        self.total = self.total.saturating_add(ext.charge);
                    }
                }
                // Re-derive payment status against the grown total.
                if self.payment_status == PaymentStatus::Paid
                    && self.paid_amount < self.total + self.deposit_held
                {
                    self.payment_status = PaymentStatus::PartiallyPaid;
                }
                self.touch(e.actor, e.occurred_at);
            }
            TransactionEvent::ReturnRecorded(e) => {
                for entry in &e.entries {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == entry.line_no)
                    {
                        line.outstanding = line.outstanding.saturating_sub(entry.quantity);
                        line.late_fee_accrued =
                            line.late_fee_accrued.saturating_add(entry.late_fee);
                    }
                }
                self.touch(e.actor, e.occurred_at);
            }
            TransactionEvent::TransactionCompleted(e) => {
                self.status = TransactionStatus::Completed;
                self.completed_at = Some(e.occurred_at);
                self.touch(e.actor, e.occurred_at);
            }
            TransactionEvent::TransactionCancelled(e) => {
                self.status = TransactionStatus::Cancelled;
                self.touch(e.actor, e.occurred_at);
            }
            TransactionEvent::TransactionRefunded(e) => {
                self.status = TransactionStatus::Refunded;
                self.touch(e.actor, e.occurred_at);
            }
            TransactionEvent::TransactionDeactivated(e) => {
                if let Some(meta) = self.meta.as_mut() {
                    meta.deactivate(e.actor, e.occurred_at);
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> DomainResult<Vec<Self::Event>> {
        match command {
            TransactionCommand::OpenTransaction(cmd) => self.handle_open(cmd),
            TransactionCommand::AddLine(cmd) => self.handle_add_line(cmd),
            TransactionCommand::PriceTransaction(cmd) => self.handle_price(cmd),
            TransactionCommand::AttachClaim(cmd) => self.handle_attach_claim(cmd),
            TransactionCommand::SubmitTransaction(cmd) => self.handle_submit(cmd),
            TransactionCommand::RecordPayment(cmd) => self.handle_record_payment(cmd),
            TransactionCommand::ConfirmTransaction(cmd) => self.handle_confirm(cmd),
            TransactionCommand::StartRental(cmd) => self.handle_start_rental(cmd),
            TransactionCommand::MarkPaymentOverdue(cmd) => self.handle_mark_overdue(cmd),
            TransactionCommand::ExtendRental(cmd) => self.handle_extend(cmd),
            TransactionCommand::RecordReturn(cmd) => self.handle_record_return(cmd),
            TransactionCommand::CompleteTransaction(cmd) => self.handle_complete(cmd),
            TransactionCommand::CancelTransaction(cmd) => self.handle_cancel(cmd),
            TransactionCommand::RefundTransaction(cmd) => self.handle_refund(cmd),
            TransactionCommand::DeactivateTransaction(cmd) => self.handle_deactivate(cmd),
        }
    }
}

impl RentalTransaction {
    fn touch(&mut self, actor: UserId, at: DateTime<Utc>) {
        if let Some(meta) = self.meta.as_mut() {
            meta.touch(actor, at);
        }
    }

    fn ensure_open(&self, transaction_id: TransactionId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != transaction_id {
            return Err(DomainError::invariant("transaction_id mismatch"));
        }
        if !self.is_active() {
            return Err(DomainError::invariant("transaction is deactivated"));
        }
        Ok(())
    }

    fn ensure_status(&self, allowed: &[TransactionStatus], target: &str) -> Result<(), DomainError> {
        if allowed.contains(&self.status) {
            return Ok(());
        }
        Err(DomainError::invalid_transition(
            format!("transaction {}", self.id),
            self.status.to_string(),
            target,
        ))
    }

    fn handle_open(&self, cmd: &OpenTransaction) -> Result<Vec<TransactionEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("transaction already opened"));
        }

        Ok(vec![TransactionEvent::TransactionOpened(TransactionOpened {
            transaction_id: cmd.transaction_id,
            kind: cmd.kind,
            customer_id: cmd.customer_id,
            location: cmd.location,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<TransactionEvent>, DomainError> {
        self.ensure_open(cmd.transaction_id)?;
        self.ensure_status(&[TransactionStatus::Draft], "line_added")?;

        if self.priced {
            return Err(DomainError::conflict(
                "transaction already priced, lines are frozen",
            ));
        }

        let draft = &cmd.line;
        if draft.quantity == 0 {
            return Err(DomainError::validation("line quantity must be at least 1"));
        }

        let gross = match self.kind {
            TransactionKind::Sale => {
                if draft.window.is_some() {
                    return Err(DomainError::validation(
                        "sale lines cannot carry a booking window",
                    ));
                }
                draft.quantity as u64 * draft.unit_price
            }
            TransactionKind::Rental => {
                let window = draft.window.ok_or_else(|| {
                    DomainError::validation("rental lines require a booking window")
                })?;
                draft.quantity as u64 * draft.daily_rate * window.rental_days() as u64
            }
        };

        if draft.discount > gross {
            return Err(DomainError::validation(format!(
                "discount {} exceeds line gross {gross}",
                draft.discount
            )));
        }

        let line_no = self.lines.len() as u32 + 1;
        Ok(vec![TransactionEvent::LineAdded(LineAdded {
            transaction_id: cmd.transaction_id,
            line_no,
            line: draft.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_price(&self, cmd: &PriceTransaction) -> Result<Vec<TransactionEvent>, DomainError> {
        self.ensure_open(cmd.transaction_id)?;
        self.ensure_status(&[TransactionStatus::Draft], "priced")?;

        if self.lines.is_empty() {
            return Err(DomainError::validation(
                "cannot price a transaction without lines",
            ));
        }
        if self.priced {
            return Err(DomainError::conflict("transaction already priced"));
        }

        let subtotal: u64 = self.lines.iter().map(|l| l.line_total(self.kind)).sum();
        let total = subtotal + cmd.tax;

        Ok(vec![TransactionEvent::TransactionPriced(TransactionPriced {
            transaction_id: cmd.transaction_id,
            subtotal,
            tax: cmd.tax,
            total,
            deposit: cmd.deposit,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_attach_claim(&self, cmd: &AttachClaim) -> Result<Vec<TransactionEvent>, DomainError> {
        self.ensure_open(cmd.transaction_id)?;
        self.ensure_status(&[TransactionStatus::Draft], "claim_attached")?;

        let line = self
            .line(cmd.line_no)
            .ok_or_else(|| DomainError::validation(format!("unknown line {}", cmd.line_no)))?;

        if cmd.unit_ids.len() as u32 > line.quantity {
            return Err(DomainError::validation(format!(
                "claim lists {} units for a quantity of {}",
                cmd.unit_ids.len(),
                line.quantity
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for unit_id in &cmd.unit_ids {
            if !seen.insert(*unit_id) {
                return Err(DomainError::validation(format!(
                    "unit {unit_id} listed twice in claim"
                )));
            }
        }

        Ok(vec![TransactionEvent::ClaimAttached(ClaimAttached {
            transaction_id: cmd.transaction_id,
            line_no: cmd.line_no,
            unit_ids: cmd.unit_ids.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit(&self, cmd: &SubmitTransaction) -> Result<Vec<TransactionEvent>, DomainError> {
        self.ensure_open(cmd.transaction_id)?;
        self.ensure_status(&[TransactionStatus::Draft], "pending")?;

        if self.lines.is_empty() {
            return Err(DomainError::validation(
                "cannot submit a transaction without lines",
            ));
        }
        if !self.priced {
            return Err(DomainError::invariant(
                "transaction must be priced before submission",
            ));
        }

        Ok(vec![TransactionEvent::TransactionSubmitted(
            TransactionSubmitted {
                transaction_id: cmd.transaction_id,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_record_payment(
        &self,
        cmd: &RecordPayment,
    ) -> Result<Vec<TransactionEvent>, DomainError> {
        self.ensure_open(cmd.transaction_id)?;
        self.ensure_status(
            &[
                TransactionStatus::Pending,
                TransactionStatus::Confirmed,
                TransactionStatus::InProgress,
                TransactionStatus::Completed,
            ],
            "payment_recorded",
        )?;

        if cmd.amount == 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }

        Ok(vec![TransactionEvent::PaymentRecorded(PaymentRecorded {
            transaction_id: cmd.transaction_id,
            amount: cmd.amount,
            method: cmd.method,
            reference: cmd.reference.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &ConfirmTransaction) -> Result<Vec<TransactionEvent>, DomainError> {
        self.ensure_open(cmd.transaction_id)?;
        self.ensure_status(&[TransactionStatus::Pending], "confirmed")?;

        if self.payment_status == PaymentStatus::Pending {
            return Err(DomainError::invariant(
                "cannot confirm a transaction with no payment recorded",
            ));
        }

        Ok(vec![TransactionEvent::TransactionConfirmed(
            TransactionConfirmed {
                transaction_id: cmd.transaction_id,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_start_rental(&self, cmd: &StartRental) -> Result<Vec<TransactionEvent>, DomainError> {
        self.ensure_open(cmd.transaction_id)?;
        self.ensure_status(&[TransactionStatus::Confirmed], "in_progress")?;

        if self.kind != TransactionKind::Rental {
            return Err(DomainError::invariant(
                "sale transactions have no rental phase",
            ));
        }

        Ok(vec![TransactionEvent::RentalStarted(RentalStarted {
            transaction_id: cmd.transaction_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_overdue(
        &self,
        cmd: &MarkPaymentOverdue,
    ) -> Result<Vec<TransactionEvent>, DomainError> {
        self.ensure_open(cmd.transaction_id)?;
        self.ensure_status(
            &[TransactionStatus::Confirmed, TransactionStatus::InProgress],
            "payment_overdue",
        )?;

        if self.payment_status == PaymentStatus::Paid {
            return Err(DomainError::conflict("payment is already settled"));
        }

        Ok(vec![TransactionEvent::PaymentMarkedOverdue(
            PaymentMarkedOverdue {
                transaction_id: cmd.transaction_id,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_extend(&self, cmd: &ExtendRental) -> Result<Vec<TransactionEvent>, DomainError> {
        self.ensure_open(cmd.transaction_id)?;
        self.ensure_status(&[TransactionStatus::InProgress], "extended")?;

        if self.kind != TransactionKind::Rental {
            return Err(DomainError::invariant("sale transactions cannot be extended"));
        }

        let mut extensions = Vec::new();
        for line in &self.lines {
            let Some(window) = line.window else { continue };
            if cmd.new_ends_at <= window.ends_at {
                continue;
            }
            let extended = window.extended_to(cmd.new_ends_at)?;
            let additional_days = extended.rental_days() - window.rental_days();
            let charge = line.quantity as u64 * line.daily_rate * additional_days as u64;
            extensions.push(LineExtension {
                line_no: line.line_no,
                additional_days,
                charge,
            });
        }

        if extensions.is_empty() {
            return Err(DomainError::validation(
                "extension does not lengthen any line",
            ));
        }

        Ok(vec![TransactionEvent::RentalExtended(RentalExtended {
            transaction_id: cmd.transaction_id,
            new_ends_at: cmd.new_ends_at,
            lines: extensions,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_return(
        &self,
        cmd: &RecordReturn,
    ) -> Result<Vec<TransactionEvent>, DomainError> {
        self.ensure_open(cmd.transaction_id)?;
        self.ensure_status(&[TransactionStatus::InProgress], "return_recorded")?;

        if self.kind != TransactionKind::Rental {
            return Err(DomainError::invariant("sale transactions take no returns"));
        }
        if cmd.entries.is_empty() {
            return Err(DomainError::validation("return batch cannot be empty"));
        }

        // Validate the whole batch before emitting anything.
        let mut seen = std::collections::HashSet::new();
        for entry in &cmd.entries {
            if !seen.insert(entry.line_no) {
                return Err(DomainError::validation(format!(
                    "line {} appears twice in return batch",
                    entry.line_no
                )));
            }
            let line = self.line(entry.line_no).ok_or_else(|| {
                DomainError::validation(format!("unknown line {}", entry.line_no))
            })?;
            if entry.quantity == 0 {
                return Err(DomainError::validation(
                    "returned quantity must be at least 1",
                ));
            }
            if entry.quantity > line.outstanding {
                return Err(DomainError::over_return(
                    entry.line_no,
                    entry.quantity,
                    line.outstanding,
                ));
            }
        }

        Ok(vec![TransactionEvent::ReturnRecorded(ReturnRecorded {
            transaction_id: cmd.transaction_id,
            entries: cmd.entries.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(
        &self,
        cmd: &CompleteTransaction,
    ) -> Result<Vec<TransactionEvent>, DomainError> {
        self.ensure_open(cmd.transaction_id)?;

        match self.kind {
            TransactionKind::Sale => {
                self.ensure_status(&[TransactionStatus::Confirmed], "completed")?;
            }
            TransactionKind::Rental => {
                self.ensure_status(&[TransactionStatus::InProgress], "completed")?;
                if !self.fully_returned() {
                    return Err(DomainError::invariant(format!(
                        "{} items still outstanding",
                        self.outstanding_quantity()
                    )));
                }
            }
        }

        Ok(vec![TransactionEvent::TransactionCompleted(
            TransactionCompleted {
                transaction_id: cmd.transaction_id,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_cancel(&self, cmd: &CancelTransaction) -> Result<Vec<TransactionEvent>, DomainError> {
        self.ensure_open(cmd.transaction_id)?;
        self.ensure_status(
            &[
                TransactionStatus::Draft,
                TransactionStatus::Pending,
                TransactionStatus::Confirmed,
            ],
            "cancelled",
        )?;

        Ok(vec![TransactionEvent::TransactionCancelled(
            TransactionCancelled {
                transaction_id: cmd.transaction_id,
                reason: cmd.reason.clone(),
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_refund(&self, cmd: &RefundTransaction) -> Result<Vec<TransactionEvent>, DomainError> {
        self.ensure_open(cmd.transaction_id)?;
        self.ensure_status(&[TransactionStatus::Completed], "refunded")?;

        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("refund reason cannot be empty"));
        }

        Ok(vec![TransactionEvent::TransactionRefunded(
            TransactionRefunded {
                transaction_id: cmd.transaction_id,
                reason: cmd.reason.clone(),
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_deactivate(
        &self,
        cmd: &DeactivateTransaction,
    ) -> Result<Vec<TransactionEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != cmd.transaction_id {
            return Err(DomainError::invariant("transaction_id mismatch"));
        }
        if !self.is_active() {
            return Err(DomainError::conflict("transaction is already inactive"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("deactivation reason cannot be empty"));
        }

        if !matches!(
            self.status,
            TransactionStatus::Draft | TransactionStatus::Pending | TransactionStatus::Cancelled
        ) {
            return Err(DomainError::invariant(
                "only draft, pending or cancelled transactions can be deactivated",
            ));
        }

        Ok(vec![TransactionEvent::TransactionDeactivated(
            TransactionDeactivated {
                transaction_id: cmd.transaction_id,
                reason: cmd.reason.clone(),
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}
