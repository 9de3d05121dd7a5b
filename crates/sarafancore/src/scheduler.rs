//! Background reminder scheduler.
//!
//! Runs as a `tokio::spawn`ed task. Each tick sends due consultation
//! reminders and re-posts order announcements that never reached staff.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::core::error::AppError;
use crate::orders::{OrderService, SweepReport};

pub struct ReminderScheduler {
    service: Arc<OrderService>,
    check_interval: Duration,
}

/// Outcome of one tick.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub reminders: SweepReport,
    pub announcements: SweepReport,
}

impl ReminderScheduler {
    pub fn new(service: Arc<OrderService>, check_interval: Duration) -> Self {
        Self {
            service,
            check_interval,
        }
    }

    /// Start the scheduler background task. The first cycle runs immediately.
    pub fn spawn(self, stop: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(interval_secs = self.check_interval.as_secs(), "Reminder scheduler started");

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        self.run_cycle().await;
                    }
                }
            }

            tracing::info!("Reminder scheduler stopped");
        })
    }

    /// Run one cycle. Failures are logged; the next tick tries again.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        match self.service.check_consultation_timeouts(Utc::now()).await {
            Ok(sweep) => report.reminders = sweep,
            Err(e) => log_sweep_failure("reminder", &e),
        }

        match self.service.resend_pending_notifications().await {
            Ok(sweep) => report.announcements = sweep,
            Err(e) => log_sweep_failure("announcement", &e),
        }

        report
    }
}

fn log_sweep_failure(sweep: &str, error: &AppError) {
    if error.is_transient() {
        tracing::warn!(sweep, error = %error, "Sweep hit a busy store, retrying next tick");
    } else {
        tracing::error!(sweep, error = %error, "Sweep failed");
    }
}
