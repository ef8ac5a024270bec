//! Prometheus metrics for wallet-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Accrual runs by outcome.
pub static ACCRUALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wallet_accruals_total",
        "Total number of invoice accrual runs",
        &["status"] // ok, failed
    )
    .expect("Failed to register accruals_total")
});

/// Per-entry disbursement outcomes.
pub static DISBURSEMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wallet_disbursements_total",
        "Total number of monthly disbursements by outcome",
        &["status"]
    )
    .expect("Failed to register disbursements_total")
});

/// Per-entry reversal outcomes by branch.
pub static REVERSALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wallet_reversals_total",
        "Total number of entry reversals",
        &["kind", "status"]
    )
    .expect("Failed to register reversals_total")
});

/// Money moved into or out of wallets, by transaction kind.
pub static WALLET_AMOUNT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wallet_amount_total",
        "Absolute wallet amount moved by transaction kind",
        &["kind"]
    )
    .expect("Failed to register wallet_amount_total")
});

/// Commit conflicts that forced a reload.
pub static COMMIT_CONFLICTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wallet_commit_conflicts_total",
        "Optimistic concurrency conflicts by operation",
        &["operation"]
    )
    .expect("Failed to register commit_conflicts_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wallet_errors_total",
        "Total number of errors by type",
        &["error_type", "operation"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "wallet_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&ACCRUALS_TOTAL);
    Lazy::force(&DISBURSEMENTS_TOTAL);
    Lazy::force(&REVERSALS_TOTAL);
    Lazy::force(&WALLET_AMOUNT_TOTAL);
    Lazy::force(&COMMIT_CONFLICTS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}

pub fn record_accrual(success: bool) {
    let status = if success { "ok" } else { "failed" };
    ACCRUALS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_disbursement(status: &str) {
    DISBURSEMENTS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_reversal(kind: &str, status: &str) {
    REVERSALS_TOTAL.with_label_values(&[kind, status]).inc();
}

pub fn record_wallet_amount(kind: &str, amount: Decimal) {
    if let Some(value) = amount.abs().to_f64() {
        WALLET_AMOUNT_TOTAL.with_label_values(&[kind]).inc_by(value);
    }
}

pub fn record_conflict(operation: &str) {
    COMMIT_CONFLICTS_TOTAL.with_label_values(&[operation]).inc();
}

pub fn record_error(error_type: &str, operation: &str) {
    ERRORS_TOTAL
        .with_label_values(&[error_type, operation])
        .inc();
}
