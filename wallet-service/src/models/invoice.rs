//! Invoice, membership and offer models read from the school back office.

use super::month::{parse_months, Month};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Commercial offer: subject name -> teacher percentage (0-100).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub offer_id: Uuid,
    pub name: String,
    pub percentage: BTreeMap<String, Decimal>,
}

impl Offer {
    pub fn percentage_for(&self, subject: &str) -> Option<Decimal> {
        self.percentage.get(subject).copied()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OfferRow {
    pub offer_id: Uuid,
    pub name: String,
    pub percentage: Json<BTreeMap<String, Decimal>>,
}

impl From<OfferRow> for Offer {
    fn from(row: OfferRow) -> Self {
        Self {
            offer_id: row.offer_id,
            name: row.name,
            percentage: row.percentage.0,
        }
    }
}

/// One teacher teaching one subject of the membership's offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherAssignment {
    pub teacher_id: Uuid,
    pub subject: String,
    #[serde(default)]
    pub amount: Decimal,
}

/// A student's enrolment in an offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub membership_id: Uuid,
    pub student_id: Uuid,
    pub offer_id: Option<Uuid>,
    pub teachers: Vec<TeacherAssignment>,
}

#[derive(Debug, Clone, FromRow)]
pub struct MembershipRow {
    pub membership_id: Uuid,
    pub student_id: Uuid,
    pub offer_id: Option<Uuid>,
    pub teachers: Json<Vec<TeacherAssignment>>,
}

impl From<MembershipRow> for Membership {
    fn from(row: MembershipRow) -> Self {
        Self {
            membership_id: row.membership_id,
            student_id: row.student_id,
            offer_id: row.offer_id,
            teachers: row.teachers.0,
        }
    }
}

/// Cumulative payment record against a membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub membership_id: Uuid,
    pub total_amount: Decimal,
    /// Cumulative amount paid to date.
    pub amount_paid: Decimal,
    pub selected_months: BTreeSet<Month>,
    pub include_partial_month: bool,
    pub partial_month_amount: Decimal,
    pub bill_date: Option<NaiveDate>,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct InvoiceRow {
    pub invoice_id: Uuid,
    pub membership_id: Uuid,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub selected_months: Vec<String>,
    pub include_partial_month: bool,
    pub partial_month_amount: Decimal,
    pub bill_date: Option<NaiveDate>,
    pub created_utc: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = anyhow::Error;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        let selected_months = parse_months(&row.selected_months).map_err(|e| {
            anyhow::anyhow!("Invoice {} has malformed months: {}", row.invoice_id, e)
        })?;

        Ok(Self {
            invoice_id: row.invoice_id,
            membership_id: row.membership_id,
            total_amount: row.total_amount,
            amount_paid: row.amount_paid,
            selected_months,
            include_partial_month: row.include_partial_month,
            partial_month_amount: row.partial_month_amount,
            bill_date: row.bill_date,
            created_utc: row.created_utc,
        })
    }
}

/// Validated request context for one accrual run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentContext {
    #[serde(default)]
    pub include_partial_month: bool,
    #[serde(default)]
    pub partial_month_amount: Decimal,
}

impl PaymentContext {
    pub fn from_invoice(invoice: &Invoice) -> Self {
        Self {
            include_partial_month: invoice.include_partial_month,
            partial_month_amount: invoice.partial_month_amount,
        }
    }

    /// The partial-month amount, only when the flag is set and the amount is positive.
    pub fn partial_amount(&self) -> Option<Decimal> {
        (self.include_partial_month && self.partial_month_amount > Decimal::ZERO)
            .then_some(self.partial_month_amount)
    }
}
