//! Reversal of accrued teacher payments when an invoice is cancelled or reduced.

use super::calc::{days_since_billing, decide_reversal, ReversalDecision, ReversalKind};
use super::TeacherPaymentService;
use crate::models::{Invoice, Month, WalletDelta, WalletTransactionKind};
use crate::services::{record_error, record_reversal, record_wallet_amount, EntryWrite};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReversalReport {
    pub invoice_id: Uuid,
    /// Entries deactivated by a committed reversal.
    pub reversed_count: usize,
    /// Positive total taken out of wallets.
    pub total_reversed: Decimal,
    /// Entries force-deactivated after their reversal failed, or the load
    /// failure that kept the invoice from being reversed at all.
    pub failures: Vec<String>,
}

impl ReversalKind {
    fn label(&self) -> &'static str {
        match self {
            ReversalKind::Full => "full",
            ReversalKind::FutureProportion => "future_proportion",
            ReversalKind::DeactivateOnly => "deactivate_only",
        }
    }
}

impl TeacherPaymentService {
    /// Claw back what the invoice's active entries credited and deactivate them.
    ///
    /// Within the grace window after the bill date everything comes back;
    /// afterwards only the share of the months after the current one does.
    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.invoice_id))]
    pub async fn reverse_invoice_payments(&self, invoice: &Invoice) -> Result<ReversalReport, AppError> {
        let now = self.clock.now();
        let current = Month::of(now);
        let days = days_since_billing(invoice.bill_date, now.date_naive());

        let entries = self
            .store
            .entries_for_invoice(invoice.invoice_id)
            .await
            .map_err(|e| {
                record_error(e.kind(), "reversal");
                e
            })?;

        let mut report = ReversalReport {
            invoice_id: invoice.invoice_id,
            reversed_count: 0,
            total_reversed: Decimal::ZERO,
            failures: Vec::new(),
        };

        for entry in entries.iter().filter(|e| e.is_active) {
            let result = self
                .retry_on_conflict("reversal", || self.reverse_entry(entry.entry_id, current, days))
                .await;

            match result {
                Ok(Some(decision)) => {
                    report.reversed_count += 1;
                    report.total_reversed += decision.amount;
                    record_reversal(decision.kind.label(), "ok");
                }
                Ok(None) => {}
                Err(e) => {
                    record_reversal("unknown", "failed");
                    record_error(e.kind(), "reversal");
                    error!(
                        entry_id = %entry.entry_id,
                        teacher_id = %entry.teacher_id,
                        error = %e,
                        "Reversal failed, forcing deactivation; manual reconciliation required"
                    );
                    if let Err(deactivate_err) = self.store.deactivate_entry(entry.entry_id).await {
                        error!(
                            entry_id = %entry.entry_id,
                            error = %deactivate_err,
                            "Forced deactivation failed"
                        );
                    }
                    report
                        .failures
                        .push(format!("Entry {}: {}", entry.entry_id, e));
                }
            }
        }

        info!(
            reversed = report.reversed_count,
            total_reversed = %report.total_reversed,
            failures = report.failures.len(),
            days_since_billing = ?days,
            "Invoice reversal finished"
        );

        Ok(report)
    }

    /// Reverse every invoice of a deleted membership.
    ///
    /// An invoice that cannot be reversed is reported through its `failures`
    /// and the remaining invoices are still processed.
    #[instrument(skip(self), fields(membership_id = %membership_id))]
    pub async fn reverse_membership_payments(&self, membership_id: Uuid) -> Result<Vec<ReversalReport>, AppError> {
        let invoices = self.store.invoices_for_membership(membership_id).await?;
        if invoices.is_empty() {
            warn!("Membership has no invoices to reverse");
        }

        let mut reports = Vec::with_capacity(invoices.len());
        for invoice in &invoices {
            match self.reverse_invoice_payments(invoice).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(
                        invoice_id = %invoice.invoice_id,
                        error = %e,
                        "Invoice reversal failed; manual reconciliation required"
                    );
                    reports.push(ReversalReport {
                        invoice_id: invoice.invoice_id,
                        reversed_count: 0,
                        total_reversed: Decimal::ZERO,
                        failures: vec![format!("Invoice {}: {}", invoice.invoice_id, e)],
                    });
                }
            }
        }
        Ok(reports)
    }

    async fn reverse_entry(
        &self,
        entry_id: Uuid,
        current: Month,
        days_since_billing: Option<i64>,
    ) -> Result<Option<ReversalDecision>, AppError> {
        let Some(entry) = self.store.get_entry(entry_id).await? else {
            return Ok(None);
        };
        if !entry.is_active {
            return Ok(None);
        }

        let decision = decide_reversal(
            &entry,
            current,
            days_since_billing,
            self.settings.grace_window_days,
        );

        let mut updated = entry.clone();
        updated.is_active = false;
        updated.months_rest_not_paid_yet.clear();
        updated.total_paid_to_teacher -= decision.amount;
        if decision.kind == ReversalKind::Full {
            updated.immediate_wallet_amount = Decimal::ZERO;
        }
        updated.updated_utc = self.clock.now();

        let wallet_delta = WalletDelta::new(WalletTransactionKind::Reversal, -decision.amount, None);
        self.store
            .commit_entry(EntryWrite {
                entry: updated,
                expected_version: Some(entry.version),
                wallet_delta,
            })
            .await?;

        record_wallet_amount(WalletTransactionKind::Reversal.as_str(), decision.amount);
        info!(
            entry_id = %entry.entry_id,
            teacher_id = %entry.teacher_id,
            kind = decision.kind.label(),
            amount = %decision.amount,
            "Entry reversed"
        );

        Ok(Some(decision))
    }
}
