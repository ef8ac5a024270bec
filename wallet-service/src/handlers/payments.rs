use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::models::{Invoice, Month, PaymentContext};
use crate::payments::{DisbursementSummary, PaymentOutcome, ReversalReport};
use crate::startup::AppState;
use service_core::error::AppError;

fn parse_context(body: &[u8]) -> Result<Option<PaymentContext>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid payment context: {}", e)))
}

async fn load_invoice(state: &AppState, invoice_id: Uuid) -> Result<Invoice, AppError> {
    state
        .service
        .store()
        .get_invoice(invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found: {}", invoice_id)))
}

/// Accrue an invoice. A JSON `PaymentContext` body overrides the invoice's
/// own partial-month fields; an empty body uses them as stored.
#[tracing::instrument(skip(state, body))]
pub async fn accrue_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    body: Bytes,
) -> Result<(StatusCode, Json<PaymentOutcome>), AppError> {
    let context = parse_context(&body)?;
    let invoice = load_invoice(&state, invoice_id).await?;
    let ctx = context.unwrap_or_else(|| PaymentContext::from_invoice(&invoice));

    let outcome = state.service.process_invoice_payment(&invoice, &ctx).await;
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((status, Json(outcome)))
}

#[tracing::instrument(skip(state))]
pub async fn reverse_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<ReversalReport>, AppError> {
    let invoice = load_invoice(&state, invoice_id).await?;
    let report = state.service.reverse_invoice_payments(&invoice).await?;
    Ok(Json(report))
}

#[tracing::instrument(skip(state))]
pub async fn reverse_membership(
    State(state): State<AppState>,
    Path(membership_id): Path<Uuid>,
) -> Result<Json<Vec<ReversalReport>>, AppError> {
    let reports = state
        .service
        .reverse_membership_payments(membership_id)
        .await?;
    Ok(Json(reports))
}

#[tracing::instrument(skip(state))]
pub async fn run_disbursement(
    State(state): State<AppState>,
    Path(month): Path<String>,
) -> Result<Json<DisbursementSummary>, AppError> {
    let month: Month = month
        .parse()
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("{}", e)))?;
    let summary = state.service.process_monthly_payments(month).await?;
    Ok(Json(summary))
}
