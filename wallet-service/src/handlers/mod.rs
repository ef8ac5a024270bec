//! HTTP handlers for wallet-service.

pub mod health;
pub mod payments;
pub mod reports;

pub use health::{health_check, metrics_handler, readiness_check};
pub use payments::{accrue_invoice, reverse_invoice, reverse_membership, run_disbursement};
pub use reports::{entry_paid_amount, teacher_reconciliation, teacher_wallet};
