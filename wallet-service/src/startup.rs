//! Application startup and lifecycle management.

use crate::config::WalletConfig;
use crate::handlers::{
    accrue_invoice, entry_paid_amount, health_check, metrics_handler, readiness_check,
    reverse_invoice, reverse_membership, run_disbursement, teacher_reconciliation, teacher_wallet,
};
use crate::payments::{PaymentSettings, TeacherPaymentService};
use crate::scheduler::DisbursementScheduler;
use crate::services::{init_metrics, Database, InMemoryStore, PaymentStore, SystemClock};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::request_context_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub service: TeacherPaymentService,
}

/// HTTP routes over the payment engine.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/invoices/:invoice_id/accrual", post(accrue_invoice))
        .route("/invoices/:invoice_id/reversal", post(reverse_invoice))
        .route("/memberships/:membership_id/reversal", post(reverse_membership))
        .route("/disbursements/:month", post(run_disbursement))
        .route("/entries/:entry_id/paid-amount", get(entry_paid_amount))
        .route("/teachers/:teacher_id/wallet", get(teacher_wallet))
        .route("/teachers/:teacher_id/reconciliation", get(teacher_reconciliation))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_context_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
    disbursement_interval: Duration,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: WalletConfig) -> Result<Self, AppError> {
        init_metrics();

        let store: Arc<dyn PaymentStore> = if config.database.is_in_memory() {
            tracing::warn!("WALLET_DATABASE_URL=in-memory, state is lost on restart");
            Arc::new(InMemoryStore::new())
        } else {
            let db = Database::new(
                &config.database.url,
                config.database.max_connections,
                config.database.min_connections,
            )
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                e
            })?;

            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;

            Arc::new(db)
        };

        let service = TeacherPaymentService::new(
            store,
            Arc::new(SystemClock),
            PaymentSettings::from(&config.payments),
        );

        let state = AppState {
            service_name: config.service_name.clone(),
            service,
        };

        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Wallet service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state,
            disbursement_interval: Duration::from_secs(config.payments.disbursement_interval_secs),
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn service(&self) -> &TeacherPaymentService {
        &self.state.service
    }

    /// Serve HTTP and run the disbursement scheduler until `shutdown` flips to `true`.
    pub async fn run_until_stopped(self, shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let scheduler = DisbursementScheduler::new(self.state.service.clone(), self.disbursement_interval);
        let scheduler_handle = tokio::spawn(scheduler.run(shutdown.clone()));

        let http_router = router(self.state);

        tracing::info!(
            service = "wallet-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        let mut server_shutdown = shutdown;
        let result = axum::serve(self.http_listener, http_router)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stopped| *stopped).await;
            })
            .await;

        if result.is_err() {
            scheduler_handle.abort();
        }
        if let Err(e) = scheduler_handle.await {
            if !e.is_cancelled() {
                tracing::error!(error = %e, "Disbursement scheduler task failed");
            }
        }

        result.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
