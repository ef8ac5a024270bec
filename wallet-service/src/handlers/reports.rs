use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::models::{PaidBreakdown, WalletStatement};
use crate::payments::ReconciliationReport;
use crate::startup::AppState;
use service_core::error::AppError;

#[tracing::instrument(skip(state))]
pub async fn entry_paid_amount(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
) -> Result<Json<PaidBreakdown>, AppError> {
    Ok(Json(state.service.paid_amount_for_entry(entry_id).await?))
}

#[tracing::instrument(skip(state))]
pub async fn teacher_wallet(
    State(state): State<AppState>,
    Path(teacher_id): Path<Uuid>,
) -> Result<Json<WalletStatement>, AppError> {
    Ok(Json(state.service.wallet_statement(teacher_id).await?))
}

#[tracing::instrument(skip(state))]
pub async fn teacher_reconciliation(
    State(state): State<AppState>,
    Path(teacher_id): Path<Uuid>,
) -> Result<Json<ReconciliationReport>, AppError> {
    Ok(Json(state.service.reconcile_teacher(teacher_id).await?))
}
