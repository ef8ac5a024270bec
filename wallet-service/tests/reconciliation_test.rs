//! Reporting, wallet statement and drift detection tests.

mod common;

use common::{date, month, spawn_engine};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;
use wallet_service::models::PaymentContext;
use wallet_service::payments::calculate_teacher_paid_amount;
use wallet_service::services::{EntryWrite, PaymentStore};

#[tokio::test]
async fn paid_breakdown_tracks_disbursed_months() {
    let engine = spawn_engine();
    let enrolment = engine.enrol(&[("piano", dec!(50))]).await;
    let teacher = enrolment.teacher();
    let invoice = engine
        .invoice(
            enrolment.membership_id,
            dec!(900),
            dec!(900),
            &["2025-03", "2025-04", "2025-05"],
            None,
        )
        .await;
    engine
        .service
        .process_invoice_payment(&invoice, &PaymentContext::default())
        .await;
    engine
        .service
        .process_monthly_payments(month("2025-04"))
        .await
        .unwrap();

    let entry = engine.entry(teacher, invoice.invoice_id).await;
    let breakdown = calculate_teacher_paid_amount(&entry);
    assert_eq!(breakdown.months_paid, 2);
    assert_eq!(breakdown.immediate_paid_amount, dec!(150));
    assert_eq!(breakdown.scheduled_paid_amount, dec!(150));
    assert_eq!(breakdown.total_paid_amount, dec!(300));

    let by_id = engine
        .service
        .paid_amount_for_entry(entry.entry_id)
        .await
        .unwrap();
    assert_eq!(by_id, breakdown);
}

#[tokio::test]
async fn paid_amount_for_unknown_entry_is_not_found() {
    let engine = spawn_engine();
    let err = engine
        .service
        .paid_amount_for_entry(Uuid::new_v4())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn wallet_statement_sums_to_balance() {
    let engine = spawn_engine();
    let enrolment = engine.enrol(&[("piano", dec!(50))]).await;
    let teacher = enrolment.teacher();
    let invoice = engine
        .invoice(
            enrolment.membership_id,
            dec!(900),
            dec!(900),
            &["2025-03", "2025-04", "2025-05"],
            Some(date(2025, 2, 1)),
        )
        .await;
    engine
        .service
        .process_invoice_payment(&invoice, &PaymentContext::default())
        .await;
    engine
        .service
        .process_monthly_payments(month("2025-04"))
        .await
        .unwrap();
    engine.service.reverse_invoice_payments(&invoice).await.unwrap();

    let statement = engine.service.wallet_statement(teacher).await.unwrap();
    assert_eq!(statement.transactions.len(), 3);
    assert_eq!(statement.balance, engine.service.wallet_balance(teacher).await.unwrap());
    // 150 accrued, 150 disbursed for April, 300 clawed back for April and May.
    assert_eq!(statement.balance, Decimal::ZERO);
}

#[tokio::test]
async fn engine_operations_leave_no_drift() {
    let engine = spawn_engine();
    let enrolment = engine
        .enrol(&[("math", dec!(33.3333)), ("art", dec!(12.5))])
        .await;
    let ctx = PaymentContext {
        include_partial_month: true,
        partial_month_amount: dec!(77.77),
    };
    let mut invoice = engine
        .invoice(
            enrolment.membership_id,
            dec!(250),
            dec!(1000),
            &["2025-03", "2025-04", "2025-05", "2025-06"],
            Some(date(2025, 2, 10)),
        )
        .await;

    engine.service.process_invoice_payment(&invoice, &ctx).await;
    invoice.amount_paid = dec!(640.10);
    engine.service.process_invoice_payment(&invoice, &ctx).await;
    engine
        .service
        .process_monthly_payments(month("2025-04"))
        .await
        .unwrap();
    engine.service.reverse_invoice_payments(&invoice).await.unwrap();

    for teacher in &enrolment.teacher_ids {
        let report = engine.service.reconcile_teacher(*teacher).await.unwrap();
        assert_eq!(report.entries_checked, 1);
        assert!(report.is_consistent(), "drifts: {:?}", report.drifts);
        assert_eq!(report.wallet_balance, engine.balance(*teacher).await);
    }
}

#[tokio::test]
async fn reconciliation_reports_tampered_entry() {
    let engine = spawn_engine();
    let enrolment = engine.enrol(&[("math", dec!(40))]).await;
    let teacher = enrolment.teacher();
    let invoice = engine
        .invoice(enrolment.membership_id, dec!(1000), dec!(1000), &["2025-03"], None)
        .await;
    engine
        .service
        .process_invoice_payment(&invoice, &PaymentContext::default())
        .await;

    // Change the recorded total without a matching wallet transaction.
    let mut entry = engine.entry(teacher, invoice.invoice_id).await;
    let version = entry.version;
    entry.total_paid_to_teacher += dec!(50);
    engine
        .store
        .commit_entry(EntryWrite {
            entry: entry.clone(),
            expected_version: Some(version),
            wallet_delta: None,
        })
        .await
        .unwrap();

    let report = engine.service.reconcile_teacher(teacher).await.unwrap();
    assert!(!report.is_consistent());
    assert_eq!(report.drifts.len(), 1);
    let drift = &report.drifts[0];
    assert_eq!(drift.entry_id, entry.entry_id);
    assert_eq!(drift.recorded_total_paid, dec!(450));
    assert_eq!(drift.wallet_total, dec!(400));
    assert_eq!(drift.difference, dec!(50));

    // Reconciliation never writes.
    let again = engine.service.reconcile_teacher(teacher).await.unwrap();
    assert_eq!(again, report);
}

#[tokio::test]
async fn stale_version_and_duplicate_insert_conflict() {
    let engine = spawn_engine();
    let enrolment = engine.enrol(&[("math", dec!(40))]).await;
    let teacher = enrolment.teacher();
    let invoice = engine
        .invoice(enrolment.membership_id, dec!(1000), dec!(1000), &["2025-03"], None)
        .await;
    engine
        .service
        .process_invoice_payment(&invoice, &PaymentContext::default())
        .await;
    let entry = engine.entry(teacher, invoice.invoice_id).await;

    let stale = engine
        .store
        .commit_entry(EntryWrite {
            entry: entry.clone(),
            expected_version: Some(entry.version - 1),
            wallet_delta: None,
        })
        .await
        .unwrap_err();
    assert!(stale.is_conflict());

    let mut duplicate = entry.clone();
    duplicate.entry_id = Uuid::new_v4();
    let err = engine
        .store
        .commit_entry(EntryWrite {
            entry: duplicate,
            expected_version: None,
            wallet_delta: None,
        })
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    assert_eq!(engine.balance(teacher).await, dec!(400));
}
