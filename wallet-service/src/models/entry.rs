//! Accrual ledger entry: one row per (teacher, invoice).

use super::month::{parse_months, Month};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Durable record of how much of an invoice's cumulative payment belongs to
/// one teacher, how much of it has reached the wallet, and what is still
/// scheduled.
///
/// `total_paid_to_teacher` always equals the sum of wallet transactions
/// recorded against `entry_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherPayment {
    pub entry_id: Uuid,
    pub teacher_id: Uuid,
    pub invoice_id: Uuid,
    pub membership_id: Uuid,
    pub subject: String,
    pub teacher_percentage: Decimal,
    pub payment_percentage: Decimal,
    pub selected_months: BTreeSet<Month>,
    pub months_rest_not_paid_yet: BTreeSet<Month>,
    pub total_teacher_amount: Decimal,
    pub monthly_teacher_amount: Decimal,
    pub immediate_wallet_amount: Decimal,
    pub total_paid_to_teacher: Decimal,
    pub is_active: bool,
    /// Optimistic concurrency counter, bumped on every committed write.
    pub version: i64,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl TeacherPayment {
    /// Whether the monthly disbursement job owes this entry `month`.
    pub fn is_due(&self, month: Month) -> bool {
        self.is_active
            && self.selected_months.contains(&month)
            && self.months_rest_not_paid_yet.contains(&month)
    }

    /// Number of selected months strictly after `current`.
    pub fn future_month_count(&self, current: Month) -> usize {
        self.selected_months.range(current.next()..).count()
    }

    /// Read-only breakdown of what has reached the wallet so far.
    pub fn paid_breakdown(&self) -> PaidBreakdown {
        let months_paid = self
            .selected_months
            .len()
            .saturating_sub(self.months_rest_not_paid_yet.len());
        let scheduled = (self.total_paid_to_teacher - self.immediate_wallet_amount).max(Decimal::ZERO);

        PaidBreakdown {
            months_paid,
            scheduled_paid_amount: scheduled,
            immediate_paid_amount: self.immediate_wallet_amount,
            total_paid_amount: self.total_paid_to_teacher,
        }
    }
}

/// Reporting view over a ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaidBreakdown {
    pub months_paid: usize,
    pub scheduled_paid_amount: Decimal,
    pub immediate_paid_amount: Decimal,
    pub total_paid_amount: Decimal,
}

/// Database row for `teacher_payments`.
#[derive(Debug, Clone, FromRow)]
pub struct TeacherPaymentRow {
    pub entry_id: Uuid,
    pub teacher_id: Uuid,
    pub invoice_id: Uuid,
    pub membership_id: Uuid,
    pub subject: String,
    pub teacher_percentage: Decimal,
    pub payment_percentage: Decimal,
    pub selected_months: Vec<String>,
    pub months_rest_not_paid_yet: Vec<String>,
    pub total_teacher_amount: Decimal,
    pub monthly_teacher_amount: Decimal,
    pub immediate_wallet_amount: Decimal,
    pub total_paid_to_teacher: Decimal,
    pub is_active: bool,
    pub version: i64,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl TryFrom<TeacherPaymentRow> for TeacherPayment {
    type Error = anyhow::Error;

    fn try_from(row: TeacherPaymentRow) -> Result<Self, Self::Error> {
        let selected_months = parse_months(&row.selected_months)
            .map_err(|e| anyhow::anyhow!("Entry {} has malformed months: {}", row.entry_id, e))?;
        let months_rest_not_paid_yet = parse_months(&row.months_rest_not_paid_yet)
            .map_err(|e| anyhow::anyhow!("Entry {} has malformed months: {}", row.entry_id, e))?;

        Ok(Self {
            entry_id: row.entry_id,
            teacher_id: row.teacher_id,
            invoice_id: row.invoice_id,
            membership_id: row.membership_id,
            subject: row.subject,
            teacher_percentage: row.teacher_percentage,
            payment_percentage: row.payment_percentage,
            selected_months,
            months_rest_not_paid_yet,
            total_teacher_amount: row.total_teacher_amount,
            monthly_teacher_amount: row.monthly_teacher_amount,
            immediate_wallet_amount: row.immediate_wallet_amount,
            total_paid_to_teacher: row.total_paid_to_teacher,
            is_active: row.is_active,
            version: row.version,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        })
    }
}
