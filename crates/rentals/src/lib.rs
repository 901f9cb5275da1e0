//! `rentflow-rentals` — rental and sale transaction domain.
//!
//! A [`transaction::RentalTransaction`] is the commercial side of a booking:
//! customer, lines, pricing, payment state and the claimed inventory units.
//! The physical side (unit statuses, stock counts) lives in
//! `rentflow-inventory`; the engine crate keeps the two consistent.

pub mod transaction;
pub mod window;

pub use transaction::{
    AddLine, AttachClaim, CancelTransaction, CompleteTransaction, ConfirmTransaction,
    DeactivateTransaction, ExtendRental, LineDraft, LineExtension, LineReturnEntry,
    MarkPaymentOverdue, OpenTransaction, PaymentMethod, PaymentStatus, PriceTransaction,
    RecordPayment, RecordReturn, RefundTransaction, RentalTransaction, StartRental,
    SubmitTransaction, TransactionCommand, TransactionEvent, TransactionId, TransactionKind,
    TransactionLine, TransactionStatus,
};
pub use window::BookingWindow;
