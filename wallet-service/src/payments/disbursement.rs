//! Monthly disbursement of scheduled teacher amounts.

use super::TeacherPaymentService;
use crate::models::{Month, WalletDelta, WalletTransactionKind};
use crate::services::{record_disbursement, record_error, record_wallet_amount, EntryWrite};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use tracing::{error, info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisbursementSummary {
    pub month: Month,
    pub processed_count: usize,
    pub failed_count: usize,
    pub total_amount_disbursed: Decimal,
}

impl TeacherPaymentService {
    /// Pay `month` to every active entry that still owes it.
    ///
    /// One failing entry never blocks the rest. Running twice for the same
    /// month moves no money the second time.
    #[instrument(skip(self), fields(month = %month))]
    pub async fn process_monthly_payments(&self, month: Month) -> Result<DisbursementSummary, AppError> {
        let due = self.store.entries_due(month).await.map_err(|e| {
            record_error(e.kind(), "disbursement");
            error!(error = %e, "Failed to load entries due");
            e
        })?;

        info!(due = due.len(), "Starting monthly disbursement");

        let mut summary = DisbursementSummary {
            month,
            processed_count: 0,
            failed_count: 0,
            total_amount_disbursed: Decimal::ZERO,
        };

        for entry in due {
            let result = self
                .retry_on_conflict("disbursement", || self.disburse_entry(entry.entry_id, month))
                .await;

            match result {
                Ok(Some(amount)) => {
                    summary.processed_count += 1;
                    summary.total_amount_disbursed += amount;
                    record_disbursement("ok");
                }
                // Paid or deactivated since the scan.
                Ok(None) => record_disbursement("skipped"),
                Err(e) => {
                    summary.failed_count += 1;
                    record_disbursement("failed");
                    record_error(e.kind(), "disbursement");
                    error!(
                        entry_id = %entry.entry_id,
                        teacher_id = %entry.teacher_id,
                        error = %e,
                        "Failed to disburse entry"
                    );
                }
            }
        }

        info!(
            processed = summary.processed_count,
            failed = summary.failed_count,
            total = %summary.total_amount_disbursed,
            "Monthly disbursement finished"
        );

        Ok(summary)
    }

    /// Returns the amount paid, or `None` when the entry no longer owes `month`.
    async fn disburse_entry(&self, entry_id: Uuid, month: Month) -> Result<Option<Decimal>, AppError> {
        let Some(entry) = self.store.get_entry(entry_id).await? else {
            return Ok(None);
        };
        if !entry.is_due(month) {
            return Ok(None);
        }

        let amount = entry.monthly_teacher_amount;
        let mut updated = entry.clone();
        updated.months_rest_not_paid_yet.remove(&month);
        updated.total_paid_to_teacher += amount;
        updated.updated_utc = self.clock.now();

        let wallet_delta = WalletDelta::new(WalletTransactionKind::Disbursement, amount, Some(month));
        self.store
            .commit_entry(EntryWrite {
                entry: updated,
                expected_version: Some(entry.version),
                wallet_delta,
            })
            .await?;

        record_wallet_amount(WalletTransactionKind::Disbursement.as_str(), amount);
        Ok(Some(amount))
    }
}
