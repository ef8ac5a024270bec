//! Domain models for wallet-service.

mod entry;
mod invoice;
mod month;
mod wallet;

pub use entry::{PaidBreakdown, TeacherPayment, TeacherPaymentRow};
pub use invoice::{
    Invoice, InvoiceRow, Membership, MembershipRow, Offer, OfferRow, PaymentContext,
    TeacherAssignment,
};
pub use month::{month_tokens, parse_months, Month, ParseMonthError};
pub use wallet::{
    WalletDelta, WalletStatement, WalletTransaction, WalletTransactionKind, WalletTransactionRow,
};
