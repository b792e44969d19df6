//! Reminder delivery loop.
//!
//! One poll per interval. A pending reminder fires when the cycle's clock is
//! at or past its due time by less than one interval, so each reminder gets
//! exactly one delivery window. A failed send leaves it pending; the window
//! then closes and it is never retried.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use taskflow_core::traits::NotificationSender;
use taskflow_memory::{PendingReminder, ReminderPatch, Store};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Counts from one scheduler pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Delivered and marked sent.
    pub fired: usize,
    /// Due, but the send failed.
    pub failed: usize,
    /// Not yet due, or its window already closed.
    pub skipped: usize,
}

pub struct ReminderScheduler {
    store: Store,
    sender: Arc<dyn NotificationSender>,
    poll_interval: Duration,
    default_zone: Tz,
}

/// Text delivered for a reminder.
pub fn reminder_text(task: &str) -> String {
    format!("⏰ REMINDER:\n📝 {task}")
}

impl ReminderScheduler {
    pub fn new(store: Store, sender: Arc<dyn NotificationSender>, poll_interval: Duration) -> Self {
        let default_zone = store.default_zone();
        Self {
            store,
            sender,
            poll_interval,
            default_zone,
        }
    }

    /// Run the loop on its own task until `token` is cancelled.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(token).await })
    }

    /// Poll until cancelled. Cancellation is only observed between cycles.
    pub async fn run(self, token: CancellationToken) {
        info!(
            "scheduler running | poll: {}s | sender: {}",
            self.poll_interval.as_secs(),
            self.sender.name()
        );
        loop {
            let report = self.run_cycle(Utc::now).await;
            if report.fired > 0 || report.failed > 0 {
                info!(
                    "scheduler cycle: {} sent, {} failed, {} waiting",
                    report.fired, report.failed, report.skipped
                );
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        info!("scheduler stopped");
    }

    /// One pass over every pending reminder.
    ///
    /// `clock` is read once per reminder, so a slow send does not age the
    /// due check of the reminders after it.
    pub async fn run_cycle(&self, clock: impl Fn() -> DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();
        let window = chrono::Duration::from_std(self.poll_interval)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));

        for pending in self.store.get_all_pending_reminders().await {
            let zone = pending.reminder.zone(self.default_zone);
            let local_now = clock().with_timezone(&zone);
            let elapsed = local_now.fixed_offset() - pending.reminder.datetime;

            if elapsed < chrono::Duration::zero() || elapsed >= window {
                if elapsed >= window {
                    debug!(
                        "reminder {} for {} missed its window",
                        pending.reminder.id, pending.user_id
                    );
                }
                report.skipped += 1;
                continue;
            }

            if self.deliver(&pending, local_now).await {
                report.fired += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }

    async fn deliver(&self, pending: &PendingReminder, local_now: DateTime<Tz>) -> bool {
        let PendingReminder { user_id, reminder } = pending;
        let text = reminder_text(&reminder.task);

        if let Err(e) = self.sender.send(user_id, &text).await {
            error!(
                "reminder {} for {user_id} not delivered: {e}",
                reminder.id
            );
            return false;
        }
        info!("reminder {} delivered to {user_id}", reminder.id);

        let sent = ReminderPatch::sent(local_now.fixed_offset());
        match self.store.update_reminder(user_id, &reminder.id, sent).await {
            Ok(true) => {}
            Ok(false) => error!("reminder {} vanished before it could be marked sent", reminder.id),
            Err(e) => error!("failed to mark reminder {} sent: {e}", reminder.id),
        }
        true
    }
}
