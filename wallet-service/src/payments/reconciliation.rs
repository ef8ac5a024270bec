//! Read-only reporting and drift detection.

use super::TeacherPaymentService;
use crate::models::{PaidBreakdown, TeacherPayment, WalletStatement};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// What has reached the wallet for one entry so far.
pub fn calculate_teacher_paid_amount(entry: &TeacherPayment) -> PaidBreakdown {
    entry.paid_breakdown()
}

/// An entry whose recorded total disagrees with its wallet transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDrift {
    pub entry_id: Uuid,
    pub invoice_id: Uuid,
    pub recorded_total_paid: Decimal,
    pub wallet_total: Decimal,
    /// `recorded_total_paid - wallet_total`.
    pub difference: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub teacher_id: Uuid,
    pub wallet_balance: Decimal,
    pub entries_checked: usize,
    pub drifts: Vec<EntryDrift>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.drifts.is_empty()
    }
}

impl TeacherPaymentService {
    #[instrument(skip(self), fields(entry_id = %entry_id))]
    pub async fn paid_amount_for_entry(&self, entry_id: Uuid) -> Result<PaidBreakdown, AppError> {
        let entry = self
            .store
            .get_entry(entry_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Entry {} not found", entry_id)))?;
        Ok(calculate_teacher_paid_amount(&entry))
    }

    pub async fn wallet_balance(&self, teacher_id: Uuid) -> Result<Decimal, AppError> {
        self.store.wallet_balance(teacher_id).await
    }

    #[instrument(skip(self), fields(teacher_id = %teacher_id))]
    pub async fn wallet_statement(&self, teacher_id: Uuid) -> Result<WalletStatement, AppError> {
        let transactions = self.store.wallet_transactions(teacher_id).await?;
        let balance = transactions.iter().map(|t| t.amount).sum();
        Ok(WalletStatement {
            teacher_id,
            balance,
            transactions,
        })
    }

    /// Compare every entry's `total_paid_to_teacher` with the wallet
    /// transactions recorded against it. Never writes.
    #[instrument(skip(self), fields(teacher_id = %teacher_id))]
    pub async fn reconcile_teacher(&self, teacher_id: Uuid) -> Result<ReconciliationReport, AppError> {
        let entries = self.store.entries_for_teacher(teacher_id).await?;
        let wallet_balance = self.store.wallet_balance(teacher_id).await?;

        let mut drifts = Vec::new();
        for entry in &entries {
            let wallet_total = self.store.wallet_total_for_entry(entry.entry_id).await?;
            if wallet_total != entry.total_paid_to_teacher {
                warn!(
                    entry_id = %entry.entry_id,
                    recorded = %entry.total_paid_to_teacher,
                    wallet = %wallet_total,
                    "Ledger entry drifted from wallet"
                );
                drifts.push(EntryDrift {
                    entry_id: entry.entry_id,
                    invoice_id: entry.invoice_id,
                    recorded_total_paid: entry.total_paid_to_teacher,
                    wallet_total,
                    difference: entry.total_paid_to_teacher - wallet_total,
                });
            }
        }

        info!(
            entries_checked = entries.len(),
            drifts = drifts.len(),
            balance = %wallet_balance,
            "Teacher reconciliation finished"
        );

        Ok(ReconciliationReport {
            teacher_id,
            wallet_balance,
            entries_checked: entries.len(),
            drifts,
        })
    }
}
