//! Persistence port for the payment engine.

use crate::models::{
    Invoice, Membership, Month, Offer, TeacherPayment, WalletDelta, WalletTransaction,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

/// One atomic unit: the entry's new state plus the wallet movement it implies.
#[derive(Debug, Clone)]
pub struct EntryWrite {
    /// Desired state of the entry. `version` is ignored; the store assigns it.
    pub entry: TeacherPayment,
    /// `None` inserts a new entry; `Some(v)` updates only if the stored version is still `v`.
    pub expected_version: Option<i64>,
    pub wallet_delta: Option<WalletDelta>,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError>;
    async fn invoices_for_membership(&self, membership_id: Uuid) -> Result<Vec<Invoice>, AppError>;
    async fn get_membership(&self, membership_id: Uuid) -> Result<Option<Membership>, AppError>;
    async fn get_offer(&self, offer_id: Uuid) -> Result<Option<Offer>, AppError>;
    async fn teacher_exists(&self, teacher_id: Uuid) -> Result<bool, AppError>;

    async fn find_entry(
        &self,
        teacher_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<TeacherPayment>, AppError>;
    async fn get_entry(&self, entry_id: Uuid) -> Result<Option<TeacherPayment>, AppError>;
    async fn entries_for_invoice(&self, invoice_id: Uuid) -> Result<Vec<TeacherPayment>, AppError>;
    async fn entries_for_teacher(&self, teacher_id: Uuid) -> Result<Vec<TeacherPayment>, AppError>;
    /// Active entries with `month` both selected and still unpaid.
    async fn entries_due(&self, month: Month) -> Result<Vec<TeacherPayment>, AppError>;

    /// Apply the entry write and its wallet delta atomically.
    ///
    /// Returns `AppError::Conflict` when another writer got there first
    /// (duplicate insert or stale `expected_version`).
    async fn commit_entry(&self, write: EntryWrite) -> Result<TeacherPayment, AppError>;

    /// Last-resort deactivation with no wallet movement.
    async fn deactivate_entry(&self, entry_id: Uuid) -> Result<(), AppError>;

    async fn wallet_balance(&self, teacher_id: Uuid) -> Result<Decimal, AppError>;
    async fn wallet_total_for_entry(&self, entry_id: Uuid) -> Result<Decimal, AppError>;
    async fn wallet_transactions(&self, teacher_id: Uuid)
        -> Result<Vec<WalletTransaction>, AppError>;
}
