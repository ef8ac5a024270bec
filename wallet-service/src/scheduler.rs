//! Background trigger for the monthly disbursement job.

use crate::payments::{DisbursementSummary, TeacherPaymentService};
use crate::services::record_error;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Runs `process_monthly_payments(current month)` on every tick. Ticks
/// after the first in a month find nothing left to pay.
pub struct DisbursementScheduler {
    service: TeacherPaymentService,
    interval: Duration,
}

impl DisbursementScheduler {
    /// `interval` is raised to at least one millisecond; tokio rejects a zero period.
    pub fn new(service: TeacherPaymentService, interval: Duration) -> Self {
        Self {
            service,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Tick until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = self.interval.as_secs(), "Disbursement scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Disbursement scheduler stopped");
    }

    pub async fn tick(&self) -> Option<DisbursementSummary> {
        let month = self.service.current_month();
        match self.service.process_monthly_payments(month).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                record_error(e.kind(), "scheduler");
                error!(month = %month, error = %e, "Scheduled disbursement failed");
                None
            }
        }
    }
}
