//! Invoice payment accrual into per-teacher ledger entries.

use super::calc::{accrual_figures, normalize_months, payment_percentage};
use super::{ReversalReport, TeacherPaymentService};
use crate::models::{
    Invoice, Month, PaymentContext, TeacherAssignment, TeacherPayment, WalletDelta,
    WalletTransactionKind,
};
use crate::services::{record_accrual, record_error, record_wallet_amount, EntryWrite};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::collections::BTreeSet;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Result of one accrual run over an invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub success: bool,
    pub created_or_updated_count: usize,
    pub errors: Vec<String>,
}

impl PaymentOutcome {
    fn failed(message: String) -> Self {
        Self {
            success: false,
            created_or_updated_count: 0,
            errors: vec![message],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceUpdateOutcome {
    /// Present when the paid amount went down and entries were reversed first.
    pub reversal: Option<ReversalReport>,
    pub accrual: PaymentOutcome,
}

/// Inputs shared by every teacher of one accrual run.
struct AccrualRun<'a> {
    invoice: &'a Invoice,
    months: &'a BTreeSet<Month>,
    current: Month,
    payment_percentage: Decimal,
    partial_amount: Option<Decimal>,
}

impl TeacherPaymentService {
    /// Attribute the invoice's cumulative payment to each teacher of its
    /// membership and credit the current-month share to their wallets.
    ///
    /// Safe to call repeatedly: an unchanged `amount_paid` moves no money.
    #[instrument(skip(self, invoice, ctx), fields(invoice_id = %invoice.invoice_id, membership_id = %invoice.membership_id))]
    pub async fn process_invoice_payment(&self, invoice: &Invoice, ctx: &PaymentContext) -> PaymentOutcome {
        let outcome = self.accrue(invoice, ctx).await;
        record_accrual(outcome.success);

        if outcome.success {
            info!(
                entries = outcome.created_or_updated_count,
                skipped = outcome.errors.len(),
                "Invoice payment accrued"
            );
        } else {
            warn!(errors = ?outcome.errors, "Invoice payment produced no ledger entries");
        }
        outcome
    }

    /// React to an edited invoice. A lower cumulative payment reverses the
    /// existing entries before re-accruing.
    #[instrument(skip(self, invoice, ctx), fields(invoice_id = %invoice.invoice_id))]
    pub async fn handle_invoice_update(
        &self,
        invoice: &Invoice,
        previous_amount_paid: Decimal,
        ctx: &PaymentContext,
    ) -> Result<InvoiceUpdateOutcome, AppError> {
        let reversal = if invoice.amount_paid < previous_amount_paid {
            info!(
                previous = %previous_amount_paid,
                current = %invoice.amount_paid,
                "Paid amount decreased, reversing before re-accrual"
            );
            Some(self.reverse_invoice_payments(invoice).await?)
        } else {
            None
        };

        let accrual = self.process_invoice_payment(invoice, ctx).await;
        Ok(InvoiceUpdateOutcome { reversal, accrual })
    }

    async fn accrue(&self, invoice: &Invoice, ctx: &PaymentContext) -> PaymentOutcome {
        let now = self.clock.now();
        let current = Month::of(now);

        let membership = match self.store.get_membership(invoice.membership_id).await {
            Ok(Some(m)) => m,
            Ok(None) => {
                return PaymentOutcome::failed(format!(
                    "Membership {} not found",
                    invoice.membership_id
                ))
            }
            Err(e) => {
                record_error(e.kind(), "accrual");
                error!(error = %e, "Failed to load membership");
                return PaymentOutcome::failed(format!("Failed to load membership: {}", e));
            }
        };

        let offer = match membership.offer_id {
            Some(offer_id) => match self.store.get_offer(offer_id).await {
                Ok(offer) => offer,
                Err(e) => {
                    record_error(e.kind(), "accrual");
                    error!(error = %e, offer_id = %offer_id, "Failed to load offer");
                    return PaymentOutcome::failed(format!("Failed to load offer: {}", e));
                }
            },
            None => None,
        };
        if offer.is_none() {
            warn!(offer_id = ?membership.offer_id, "Offer not found, teachers accrue 0%");
        }

        let months = normalize_months(
            &invoice.selected_months,
            ctx,
            current,
            invoice.bill_date,
            invoice.created_utc,
        );
        let run = AccrualRun {
            invoice,
            months: &months,
            current,
            payment_percentage: payment_percentage(invoice.amount_paid, invoice.total_amount),
            partial_amount: ctx.partial_amount(),
        };

        let mut outcome = PaymentOutcome::default();

        for assignment in &membership.teachers {
            match self.store.teacher_exists(assignment.teacher_id).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(teacher_id = %assignment.teacher_id, "Teacher not found, skipping");
                    outcome
                        .errors
                        .push(format!("Teacher {} not found", assignment.teacher_id));
                    continue;
                }
                Err(e) => {
                    record_error(e.kind(), "accrual");
                    error!(teacher_id = %assignment.teacher_id, error = %e, "Failed to load teacher");
                    outcome
                        .errors
                        .push(format!("Teacher {}: {}", assignment.teacher_id, e));
                    continue;
                }
            }

            let teacher_percentage = offer
                .as_ref()
                .and_then(|o| o.percentage_for(&assignment.subject))
                .unwrap_or_else(|| {
                    if offer.is_some() {
                        warn!(
                            teacher_id = %assignment.teacher_id,
                            subject = %assignment.subject,
                            "No percentage for subject, accruing 0%"
                        );
                    }
                    Decimal::ZERO
                });

            let result = self
                .retry_on_conflict("accrual", || {
                    self.upsert_entry(&run, assignment, teacher_percentage)
                })
                .await;

            match result {
                Ok(_) => outcome.created_or_updated_count += 1,
                Err(e) => {
                    record_error(e.kind(), "accrual");
                    error!(teacher_id = %assignment.teacher_id, error = %e, "Failed to write ledger entry");
                    outcome
                        .errors
                        .push(format!("Teacher {}: {}", assignment.teacher_id, e));
                }
            }
        }

        outcome.success = outcome.created_or_updated_count > 0;
        outcome
    }

    /// Create or recompute the entry for one teacher and commit it together
    /// with the wallet difference.
    async fn upsert_entry(
        &self,
        run: &AccrualRun<'_>,
        assignment: &TeacherAssignment,
        teacher_percentage: Decimal,
    ) -> Result<TeacherPayment, AppError> {
        let invoice = run.invoice;
        let existing = self
            .store
            .find_entry(assignment.teacher_id, invoice.invoice_id)
            .await?;
        let now = self.clock.now();

        let write = match existing {
            None => {
                let figures = accrual_figures(
                    invoice.amount_paid,
                    teacher_percentage,
                    run.months,
                    run.current,
                    run.partial_amount,
                );
                let entry = TeacherPayment {
                    entry_id: Uuid::new_v4(),
                    teacher_id: assignment.teacher_id,
                    invoice_id: invoice.invoice_id,
                    membership_id: invoice.membership_id,
                    subject: assignment.subject.clone(),
                    teacher_percentage,
                    payment_percentage: run.payment_percentage,
                    selected_months: run.months.clone(),
                    months_rest_not_paid_yet: figures.future_months,
                    total_teacher_amount: figures.total_teacher_amount,
                    monthly_teacher_amount: figures.monthly_teacher_amount,
                    immediate_wallet_amount: figures.immediate_amount,
                    total_paid_to_teacher: figures.immediate_amount,
                    is_active: true,
                    version: 0,
                    created_utc: now,
                    updated_utc: now,
                };
                EntryWrite {
                    wallet_delta: WalletDelta::new(
                        WalletTransactionKind::Accrual,
                        figures.immediate_amount,
                        Some(run.current),
                    ),
                    expected_version: None,
                    entry,
                }
            }
            Some(existing) => {
                let merged: BTreeSet<Month> = existing
                    .selected_months
                    .union(run.months)
                    .copied()
                    .collect();
                let figures = accrual_figures(
                    invoice.amount_paid,
                    teacher_percentage,
                    &merged,
                    run.current,
                    run.partial_amount,
                );
                let delta = figures.immediate_amount - existing.immediate_wallet_amount;

                let mut entry = existing.clone();
                entry.subject = assignment.subject.clone();
                entry.teacher_percentage = teacher_percentage;
                entry.payment_percentage = run.payment_percentage;
                entry.selected_months = merged;
                entry.months_rest_not_paid_yet = figures.future_months;
                entry.total_teacher_amount = figures.total_teacher_amount;
                entry.monthly_teacher_amount = figures.monthly_teacher_amount;
                entry.immediate_wallet_amount = figures.immediate_amount;
                entry.total_paid_to_teacher = existing.total_paid_to_teacher
                    - existing.immediate_wallet_amount
                    + figures.immediate_amount;
                entry.is_active = true;
                entry.updated_utc = now;

                EntryWrite {
                    wallet_delta: WalletDelta::new(
                        WalletTransactionKind::Accrual,
                        delta,
                        Some(run.current),
                    ),
                    expected_version: Some(existing.version),
                    entry,
                }
            }
        };

        let delta = write.wallet_delta;
        let entry = self.store.commit_entry(write).await?;

        if let Some(delta) = delta {
            record_wallet_amount(delta.kind.as_str(), delta.amount);
        }
        info!(
            entry_id = %entry.entry_id,
            teacher_id = %entry.teacher_id,
            total_teacher_amount = %entry.total_teacher_amount,
            immediate = %entry.immediate_wallet_amount,
            monthly = %entry.monthly_teacher_amount,
            wallet_delta = %delta.map(|d| d.amount).unwrap_or_default(),
            "Ledger entry committed"
        );

        Ok(entry)
    }
}
