//! Teacher payment engine: accrual, monthly disbursement, reversal and
//! reconciliation over a `PaymentStore`.

pub mod accrual;
pub mod calc;
pub mod disbursement;
pub mod reconciliation;
pub mod reversal;

pub use accrual::{InvoiceUpdateOutcome, PaymentOutcome};
pub use disbursement::DisbursementSummary;
pub use reconciliation::{calculate_teacher_paid_amount, EntryDrift, ReconciliationReport};
pub use reversal::ReversalReport;

use crate::config::PaymentsConfig;
use crate::models::Month;
use crate::services::{record_conflict, Clock, PaymentStore};
use service_core::error::AppError;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Engine knobs.
#[derive(Debug, Clone, Copy)]
pub struct PaymentSettings {
    pub grace_window_days: i64,
    /// Total tries per entry write, first attempt included.
    pub max_commit_attempts: u32,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self::from(&PaymentsConfig::default())
    }
}

impl From<&PaymentsConfig> for PaymentSettings {
    fn from(config: &PaymentsConfig) -> Self {
        Self {
            grace_window_days: config.grace_window_days,
            max_commit_attempts: config.max_commit_attempts,
        }
    }
}

#[derive(Clone)]
pub struct TeacherPaymentService {
    store: Arc<dyn PaymentStore>,
    clock: Arc<dyn Clock>,
    settings: PaymentSettings,
}

impl TeacherPaymentService {
    pub fn new(store: Arc<dyn PaymentStore>, clock: Arc<dyn Clock>, settings: PaymentSettings) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn PaymentStore> {
        &self.store
    }

    pub fn settings(&self) -> PaymentSettings {
        self.settings
    }

    pub fn current_month(&self) -> Month {
        Month::of(self.clock.now())
    }

    /// Run `attempt` until it commits, reloading after each lost race.
    ///
    /// Only `AppError::Conflict` is retried; every attempt must re-read the
    /// entry it writes.
    async fn retry_on_conflict<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let max_attempts = self.settings.max_commit_attempts.max(1);
        let mut tries = 0;

        loop {
            tries += 1;
            match attempt().await {
                Err(e) if e.is_conflict() && tries < max_attempts => {
                    record_conflict(operation);
                    warn!(
                        operation = operation,
                        attempt = tries,
                        max_attempts = max_attempts,
                        error = %e,
                        "Concurrent write detected, reloading"
                    );
                }
                Err(e) if e.is_conflict() => {
                    record_conflict(operation);
                    return Err(e);
                }
                other => return other,
            }
        }
    }
}
