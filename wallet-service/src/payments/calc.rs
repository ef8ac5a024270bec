//! Pure arithmetic behind accrual and reversal. No I/O.

use crate::models::{Month, PaymentContext, TeacherPayment};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeSet;

pub const MONEY_SCALE: u32 = 2;

/// Round to cents, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Share of the invoice paid so far, in percent, capped at 100. Audit only.
pub fn payment_percentage(amount_paid: Decimal, total_amount: Decimal) -> Decimal {
    if total_amount <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let pct = amount_paid / total_amount * Decimal::ONE_HUNDRED;
    round_money(pct.min(Decimal::ONE_HUNDRED))
}

/// Months an accrual run covers.
///
/// A partially paid current month is added to the selection. An empty
/// selection falls back to the bill-date month, then the creation month.
pub fn normalize_months(
    selected: &BTreeSet<Month>,
    ctx: &PaymentContext,
    current: Month,
    bill_date: Option<NaiveDate>,
    created_utc: DateTime<Utc>,
) -> BTreeSet<Month> {
    let mut months = selected.clone();

    if ctx.partial_amount().is_some() {
        months.insert(current);
    }

    if months.is_empty() {
        let fallback = bill_date
            .map(Month::from_date)
            .unwrap_or_else(|| Month::of(created_utc));
        months.insert(fallback);
    }

    months
}

/// Per-teacher figures for one accrual run.
#[derive(Debug, Clone, PartialEq)]
pub struct AccrualFigures {
    pub total_teacher_amount: Decimal,
    pub immediate_amount: Decimal,
    pub monthly_teacher_amount: Decimal,
    pub future_months: BTreeSet<Month>,
}

/// Split a teacher's share of the cumulative payment into what is credited
/// now (current month) and what is spread over the strictly future months.
pub fn accrual_figures(
    amount_paid: Decimal,
    teacher_percentage: Decimal,
    months: &BTreeSet<Month>,
    current: Month,
    partial_amount: Option<Decimal>,
) -> AccrualFigures {
    let total_teacher_amount = round_money(amount_paid * teacher_percentage / Decimal::ONE_HUNDRED);

    let immediate_amount = if months.contains(&current) {
        match partial_amount {
            Some(partial) => round_money(partial * teacher_percentage / Decimal::ONE_HUNDRED),
            // Even share across every selected month, not one month's worth.
            None => round_money(total_teacher_amount / Decimal::from(months.len())),
        }
    } else {
        Decimal::ZERO
    };

    let future_months: BTreeSet<Month> = months.range(current.next()..).copied().collect();

    let monthly_teacher_amount = if future_months.is_empty() {
        Decimal::ZERO
    } else {
        round_money((total_teacher_amount - immediate_amount) / Decimal::from(future_months.len()))
    };

    AccrualFigures {
        total_teacher_amount,
        immediate_amount,
        monthly_teacher_amount,
        future_months,
    }
}

/// Whole days between the bill date and `today`; `None` without a bill date.
pub fn days_since_billing(bill_date: Option<NaiveDate>, today: NaiveDate) -> Option<i64> {
    bill_date.map(|billed| (today - billed).num_days())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReversalKind {
    /// Claw back everything credited for the entry.
    Full,
    /// Claw back the share attributable to months after the current one.
    FutureProportion,
    /// Deactivate only.
    DeactivateOnly,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReversalDecision {
    pub kind: ReversalKind,
    /// Positive amount to take out of the wallet.
    pub amount: Decimal,
}

impl ReversalDecision {
    fn deactivate_only() -> Self {
        Self {
            kind: ReversalKind::DeactivateOnly,
            amount: Decimal::ZERO,
        }
    }
}

/// Decide how much of an entry's credit to claw back.
///
/// A missing bill date counts as outside the grace window.
pub fn decide_reversal(
    entry: &TeacherPayment,
    current: Month,
    days_since_billing: Option<i64>,
    grace_window_days: i64,
) -> ReversalDecision {
    let within_window = days_since_billing.is_some_and(|days| days <= grace_window_days);
    let all_months = entry.selected_months.len();

    if all_months <= 1 {
        let is_current = entry.selected_months.first() == Some(&current);
        return if is_current && within_window {
            ReversalDecision {
                kind: ReversalKind::Full,
                amount: entry.total_paid_to_teacher,
            }
        } else {
            ReversalDecision::deactivate_only()
        };
    }

    if within_window {
        return ReversalDecision {
            kind: ReversalKind::Full,
            amount: entry.total_paid_to_teacher,
        };
    }

    let future_months = entry.future_month_count(current);
    if future_months == 0 {
        return ReversalDecision::deactivate_only();
    }

    let amount = round_money(
        entry.total_teacher_amount / Decimal::from(all_months) * Decimal::from(future_months),
    );
    ReversalDecision {
        kind: ReversalKind::FutureProportion,
        amount,
    }
}
