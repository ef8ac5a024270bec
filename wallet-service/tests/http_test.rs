//! HTTP surface tests, driven through the router without a listener.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{spawn_engine, TestEngine};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::de::DeserializeOwned;
use tower::ServiceExt;
use uuid::Uuid;
use wallet_service::models::{PaidBreakdown, PaymentContext, WalletStatement};
use wallet_service::payments::{
    DisbursementSummary, PaymentOutcome, ReconciliationReport, ReversalReport,
};
use wallet_service::startup::{router, AppState};

fn app(engine: &TestEngine) -> Router {
    router(AppState {
        service_name: "wallet-service-test".to_string(),
        service: engine.service.clone(),
    })
}

async fn send(app: Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

fn parse<T: DeserializeOwned>(bytes: &[u8]) -> T {
    serde_json::from_slice(bytes).expect("response body parses")
}

#[tokio::test]
async fn health_reports_service_name() {
    let engine = spawn_engine();
    let (status, body) = send(app(&engine), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = parse(&body);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "wallet-service-test");

    let (status, _) = send(app(&engine), "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn accrual_endpoint_credits_wallet() {
    let engine = spawn_engine();
    let enrolment = engine.enrol(&[("piano", dec!(50))]).await;
    let invoice = engine
        .invoice(enrolment.membership_id, dec!(600), dec!(600), &["2025-03"], None)
        .await;

    let uri = format!("/invoices/{}/accrual", invoice.invoice_id);
    let (status, body) = send(app(&engine), "POST", &uri, None).await;

    assert_eq!(status, StatusCode::OK);
    let outcome: PaymentOutcome = parse(&body);
    assert!(outcome.success);
    assert_eq!(outcome.created_or_updated_count, 1);
    assert!(outcome.errors.is_empty());
    assert_eq!(engine.balance(enrolment.teacher()).await, dec!(300));
}

#[tokio::test]
async fn accrual_body_overrides_invoice_context() {
    let engine = spawn_engine();
    let enrolment = engine.enrol(&[("piano", dec!(50))]).await;
    let invoice = engine
        .invoice(
            enrolment.membership_id,
            dec!(900),
            dec!(900),
            &["2025-03", "2025-04", "2025-05"],
            None,
        )
        .await;

    let ctx = PaymentContext {
        include_partial_month: true,
        partial_month_amount: dec!(100),
    };
    let uri = format!("/invoices/{}/accrual", invoice.invoice_id);
    let (status, _) = send(
        app(&engine),
        "POST",
        &uri,
        Some(serde_json::to_value(ctx).unwrap()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let entry = engine.entry(enrolment.teacher(), invoice.invoice_id).await;
    assert_eq!(entry.immediate_wallet_amount, dec!(50));
    assert_eq!(entry.monthly_teacher_amount, dec!(200));
}

#[tokio::test]
async fn accrual_rejects_malformed_context() {
    let engine = spawn_engine();
    let enrolment = engine.enrol(&[("piano", dec!(50))]).await;
    let invoice = engine
        .invoice(enrolment.membership_id, dec!(600), dec!(600), &["2025-03"], None)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/invoices/{}/accrual", invoice.invoice_id))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"partial_month_amount":"abc"}"#))
        .unwrap();
    let response = app(&engine).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(engine.transaction_count(enrolment.teacher()).await, 0);
}

#[tokio::test]
async fn accrual_without_entries_is_unprocessable() {
    let engine = spawn_engine();
    let membership_id = engine.insert_membership(None, Vec::new()).await;
    let invoice = engine
        .invoice(membership_id, dec!(100), dec!(100), &["2025-03"], None)
        .await;

    let uri = format!("/invoices/{}/accrual", invoice.invoice_id);
    let (status, body) = send(app(&engine), "POST", &uri, None).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let outcome: PaymentOutcome = parse(&body);
    assert!(!outcome.success);
    assert_eq!(outcome.created_or_updated_count, 0);
}

#[tokio::test]
async fn unknown_invoice_is_not_found() {
    let engine = spawn_engine();
    let uri = format!("/invoices/{}/accrual", Uuid::new_v4());
    let (status, _) = send(app(&engine), "POST", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let uri = format!("/invoices/{}/reversal", Uuid::new_v4());
    let (status, _) = send(app(&engine), "POST", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn disbursement_rejects_malformed_month() {
    let engine = spawn_engine();
    let (status, _) = send(app(&engine), "POST", "/disbursements/2025-13", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(app(&engine), "POST", "/disbursements/march", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn disbursement_and_reports_round_trip() {
    let engine = spawn_engine();
    let enrolment = engine.enrol(&[("piano", dec!(50))]).await;
    let teacher = enrolment.teacher();
    let invoice = engine
        .invoice(enrolment.membership_id, dec!(400), dec!(400), &["2025-03", "2025-04"], None)
        .await;
    let uri = format!("/invoices/{}/accrual", invoice.invoice_id);
    send(app(&engine), "POST", &uri, None).await;

    let (status, body) = send(app(&engine), "POST", "/disbursements/2025-04", None).await;
    assert_eq!(status, StatusCode::OK);
    let summary: DisbursementSummary = parse(&body);
    assert_eq!(summary.processed_count, 1);
    assert_eq!(summary.total_amount_disbursed, dec!(100));

    let entry = engine.entry(teacher, invoice.invoice_id).await;
    let uri = format!("/entries/{}/paid-amount", entry.entry_id);
    let (status, body) = send(app(&engine), "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let breakdown: PaidBreakdown = parse(&body);
    assert_eq!(breakdown.months_paid, 2);
    assert_eq!(breakdown.total_paid_amount, dec!(200));

    let uri = format!("/teachers/{}/wallet", teacher);
    let (status, body) = send(app(&engine), "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let statement: WalletStatement = parse(&body);
    assert_eq!(statement.balance, dec!(200));
    assert_eq!(statement.transactions.len(), 2);

    let uri = format!("/teachers/{}/reconciliation", teacher);
    let (status, body) = send(app(&engine), "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let report: ReconciliationReport = parse(&body);
    assert!(report.is_consistent());
    assert_eq!(report.entries_checked, 1);

    let uri = format!("/entries/{}/paid-amount", Uuid::new_v4());
    let (status, _) = send(app(&engine), "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn membership_reversal_endpoint() {
    let engine = spawn_engine();
    let enrolment = engine.enrol(&[("piano", dec!(50))]).await;
    let invoice = engine
        .invoice(
            enrolment.membership_id,
            dec!(400),
            dec!(400),
            &["2025-03"],
            Some(common::date(2025, 3, 14)),
        )
        .await;
    let uri = format!("/invoices/{}/accrual", invoice.invoice_id);
    send(app(&engine), "POST", &uri, None).await;

    let uri = format!("/memberships/{}/reversal", enrolment.membership_id);
    let (status, body) = send(app(&engine), "POST", &uri, None).await;

    assert_eq!(status, StatusCode::OK);
    let reports: Vec<ReversalReport> = parse(&body);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].invoice_id, invoice.invoice_id);
    assert_eq!(reports[0].reversed_count, 1);
    assert_eq!(reports[0].total_reversed, dec!(200));
    assert_eq!(engine.balance(enrolment.teacher()).await, Decimal::ZERO);
}
