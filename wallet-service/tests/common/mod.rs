//! Common test utilities for wallet-service integration tests.

#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::observability::init_test_tracing;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Once};
use uuid::Uuid;
use wallet_service::models::{
    parse_months, Invoice, Membership, Month, Offer, TeacherAssignment, TeacherPayment,
};
use wallet_service::payments::{PaymentSettings, TeacherPaymentService};
use wallet_service::services::{FixedClock, InMemoryStore, PaymentStore};

static INIT: Once = Once::new();

/// "Now" for most tests: the current month is 2025-03.
pub const NOW: &str = "2025-03-15T10:00:00Z";

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        init_test_tracing("info,wallet_service=debug,sqlx=warn");
    });
}

pub fn at(timestamp: &str) -> DateTime<Utc> {
    timestamp.parse().expect("valid RFC 3339 timestamp")
}

pub fn month(token: &str) -> Month {
    token.parse().expect("valid month token")
}

pub fn months(tokens: &[&str]) -> BTreeSet<Month> {
    parse_months(tokens).expect("valid month tokens")
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// Engine over an in-memory store and a settable clock.
pub struct TestEngine {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<FixedClock>,
    pub service: TeacherPaymentService,
}

pub fn spawn_engine() -> TestEngine {
    spawn_engine_at(NOW)
}

pub fn spawn_engine_at(now: &str) -> TestEngine {
    init_tracing();

    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(FixedClock::new(at(now)));
    let service = TeacherPaymentService::new(
        store.clone(),
        clock.clone(),
        PaymentSettings::default(),
    );

    TestEngine {
        store,
        clock,
        service,
    }
}

/// One membership with one teacher per subject.
pub struct Enrolment {
    pub membership_id: Uuid,
    pub offer_id: Uuid,
    pub teacher_ids: Vec<Uuid>,
}

impl Enrolment {
    pub fn teacher(&self) -> Uuid {
        self.teacher_ids[0]
    }
}

impl TestEngine {
    /// Seed an offer, its teachers and a membership linking them.
    pub async fn enrol(&self, subjects: &[(&str, Decimal)]) -> Enrolment {
        let offer_id = Uuid::new_v4();
        let percentage: BTreeMap<String, Decimal> = subjects
            .iter()
            .map(|(subject, pct)| (subject.to_string(), *pct))
            .collect();
        self.store
            .insert_offer(Offer {
                offer_id,
                name: "Test offer".to_string(),
                percentage,
            })
            .await;

        let mut teacher_ids = Vec::new();
        let mut teachers = Vec::new();
        for (subject, _) in subjects {
            let teacher_id = Uuid::new_v4();
            self.store.insert_teacher(teacher_id).await;
            teacher_ids.push(teacher_id);
            teachers.push(TeacherAssignment {
                teacher_id,
                subject: subject.to_string(),
                amount: Decimal::ZERO,
            });
        }

        let membership_id = self.insert_membership(Some(offer_id), teachers).await;

        Enrolment {
            membership_id,
            offer_id,
            teacher_ids,
        }
    }

    pub async fn insert_membership(
        &self,
        offer_id: Option<Uuid>,
        teachers: Vec<TeacherAssignment>,
    ) -> Uuid {
        let membership_id = Uuid::new_v4();
        self.store
            .insert_membership(Membership {
                membership_id,
                student_id: Uuid::new_v4(),
                offer_id,
                teachers,
            })
            .await;
        membership_id
    }

    /// Store and return an invoice with no partial-month payment.
    pub async fn invoice(
        &self,
        membership_id: Uuid,
        amount_paid: Decimal,
        total_amount: Decimal,
        selected: &[&str],
        bill_date: Option<NaiveDate>,
    ) -> Invoice {
        let invoice = Invoice {
            invoice_id: Uuid::new_v4(),
            membership_id,
            total_amount,
            amount_paid,
            selected_months: months(selected),
            include_partial_month: false,
            partial_month_amount: Decimal::ZERO,
            bill_date,
            created_utc: at(NOW),
        };
        self.store.upsert_invoice(invoice.clone()).await;
        invoice
    }

    pub async fn entry(&self, teacher_id: Uuid, invoice_id: Uuid) -> TeacherPayment {
        self.store
            .find_entry(teacher_id, invoice_id)
            .await
            .expect("store read")
            .expect("entry exists")
    }

    pub async fn balance(&self, teacher_id: Uuid) -> Decimal {
        self.store
            .wallet_balance(teacher_id)
            .await
            .expect("store read")
    }

    pub async fn transaction_count(&self, teacher_id: Uuid) -> usize {
        self.store
            .wallet_transactions(teacher_id)
            .await
            .expect("store read")
            .len()
    }
}
