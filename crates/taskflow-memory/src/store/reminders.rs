//! Reminder CRUD, status transitions, and the cross-user pending scan.

use super::users::{user_entry, user_key};
use super::Store;
use crate::types::{PendingReminder, Reminder, ReminderPatch, ReminderStatus};
use chrono::Utc;
use taskflow_core::error::TaskflowError;
use taskflow_core::normalize_user_id;
use tracing::info;
use uuid::Uuid;

impl Store {
    /// Store a reminder. An empty id is replaced with a fresh UUID.
    ///
    /// Returns the reminder id; a duplicate id for the same user is rejected.
    pub async fn add_reminder(
        &self,
        user_id: &str,
        mut reminder: Reminder,
    ) -> Result<String, TaskflowError> {
        let key = user_key(user_id)?;
        if reminder.id.is_empty() {
            reminder.id = Uuid::new_v4().to_string();
        }
        self.mutate(|root| {
            let now = Utc::now();
            let (user, _) = user_entry(root, &key, now);
            if user.reminders.iter().any(|r| r.id == reminder.id) {
                return Err(TaskflowError::Validation(format!(
                    "reminder {} already exists",
                    reminder.id
                )));
            }
            let id = reminder.id.clone();
            info!("reminder {id} for {key} due {}", reminder.datetime);
            user.reminders.push(reminder);
            user.last_interaction = now;
            Ok((id, true))
        })
        .await
    }

    /// Apply `patch` to one reminder. `false` if the reminder is unknown.
    ///
    /// A status change that leaves a terminal state is a `Validation` error;
    /// re-applying the current status is accepted and changes nothing.
    pub async fn update_reminder(
        &self,
        user_id: &str,
        reminder_id: &str,
        patch: ReminderPatch,
    ) -> Result<bool, TaskflowError> {
        let key = normalize_user_id(user_id);
        self.mutate(|root| {
            let Some(user) = root.users.get_mut(&key) else {
                return Ok((false, false));
            };
            let Some(reminder) = user.reminders.iter_mut().find(|r| r.id == reminder_id) else {
                return Ok((false, false));
            };

            if let Some(next) = patch.status {
                if !reminder.status.can_transition_to(next) {
                    return Err(TaskflowError::Validation(format!(
                        "reminder {reminder_id} cannot go from {} to {next}",
                        reminder.status
                    )));
                }
            }

            let mut changed = false;
            if let Some(next) = patch.status {
                changed |= reminder.status != next;
                reminder.status = next;
            }
            if let Some(task) = patch.task {
                changed |= reminder.task != task;
                reminder.task = task;
            }
            if let Some(datetime) = patch.datetime {
                changed |= reminder.datetime != datetime;
                reminder.datetime = datetime;
            }
            if let Some(sent_at) = patch.sent_at {
                changed |= reminder.sent_at != Some(sent_at);
                reminder.sent_at = Some(sent_at);
            }
            if changed {
                user.last_interaction = Utc::now();
            }
            Ok((true, changed))
        })
        .await
    }

    /// Cancel a pending reminder. `false` if the reminder is unknown.
    pub async fn cancel_reminder(
        &self,
        user_id: &str,
        reminder_id: &str,
    ) -> Result<bool, TaskflowError> {
        self.update_reminder(
            user_id,
            reminder_id,
            ReminderPatch::status(ReminderStatus::Cancelled),
        )
        .await
    }

    /// The user's reminders, optionally filtered by status, in insertion order.
    pub async fn get_reminders(
        &self,
        user_id: &str,
        status: Option<ReminderStatus>,
    ) -> Vec<Reminder> {
        let key = normalize_user_id(user_id);
        self.read(|root| {
            root.users
                .get(&key)
                .map(|u| {
                    u.reminders
                        .iter()
                        .filter(|r| status.map_or(true, |s| r.status == s))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        })
        .await
    }

    /// Every pending reminder across all users.
    pub async fn get_all_pending_reminders(&self) -> Vec<PendingReminder> {
        self.read(|root| {
            root.users
                .iter()
                .flat_map(|(user_id, user)| {
                    user.reminders
                        .iter()
                        .filter(|r| r.is_pending())
                        .map(move |r| PendingReminder {
                            user_id: user_id.clone(),
                            reminder: r.clone(),
                        })
                })
                .collect()
        })
        .await
    }
}
