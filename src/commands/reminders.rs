//! Reminder commands: /remind, /reminders, /cancel.
//!
//! Also the shared request → reminder path used by the CLI.

use super::{args, pick, pipe_fields, user_error, CommandContext};
use chrono::{DateTime, Utc};
use taskflow_core::due::parse_due_time;
use taskflow_core::error::TaskflowError;
use taskflow_core::timezone::{detect_country_hint, is_known_country, TimezoneResolver};
use taskflow_memory::{Reminder, ReminderStatus, Store};

/// Entities extracted from a "remind me" message.
#[derive(Debug, Clone, Default)]
pub struct ReminderRequest {
    pub task: String,
    pub when: Option<String>,
    pub country: Option<String>,
    pub location: Option<String>,
}

impl ReminderRequest {
    /// Attach a free-text place, filed as a country when it is one, else as a location.
    pub fn with_place(mut self, place: &str) -> Self {
        let place = place.trim();
        if place.is_empty() {
            return self;
        }
        if is_known_country(place) {
            self.country = Some(place.to_string());
        } else {
            self.location = Some(place.to_string());
        }
        self
    }
}

/// Validate `req`, resolve its zone and due time, and store it as a pending reminder.
pub async fn create_reminder(
    store: &Store,
    resolver: &TimezoneResolver,
    user_id: &str,
    req: ReminderRequest,
    now: DateTime<Utc>,
) -> Result<Reminder, TaskflowError> {
    let task = req.task.trim();
    if task.is_empty() {
        return Err(TaskflowError::Validation(
            "What should I remind you about?".into(),
        ));
    }
    let when = req
        .when
        .as_deref()
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .ok_or_else(|| TaskflowError::Validation("When should I remind you?".into()))?;

    let mut country = req.country.clone();
    let location = req.location.clone();
    if country.is_none() && location.is_none() {
        country = detect_country_hint(when).map(str::to_string);
    }
    let zone = if country.is_none() && location.is_none() {
        resolver.default_zone()
    } else {
        resolver.resolve(country.as_deref(), location.as_deref())
    };

    let local_now = now.with_timezone(&zone);
    let due = parse_due_time(when, zone, local_now).ok_or_else(|| {
        TaskflowError::Validation(format!(
            "I couldn't understand the time \"{when}\". Try \"tomorrow at 9am\" or \"in 30 minutes\"."
        ))
    })?;
    if due <= local_now {
        return Err(TaskflowError::Validation(
            "That time is in the past. Please pick a future time.".into(),
        ));
    }

    let mut reminder = Reminder::new(task, due, local_now);
    reminder.country = country;
    reminder.location = location;
    reminder.id = store.add_reminder(user_id, reminder.clone()).await?;
    Ok(reminder)
}

/// Pending reminders, soonest first. List numbers refer to this order.
pub async fn list_pending(store: &Store, user_id: &str) -> Vec<Reminder> {
    let mut pending = store
        .get_reminders(user_id, Some(ReminderStatus::Pending))
        .await;
    pending.sort_by_key(|r| r.datetime);
    pending
}

/// Cancel by list number, id, or id prefix. Returns the cancelled reminder.
pub async fn cancel_by_target(
    store: &Store,
    user_id: &str,
    target: &str,
) -> Result<Reminder, TaskflowError> {
    let pending = list_pending(store, user_id).await;
    let reminder = pick(&pending, target, |r| r.id.as_str(), "reminder")?.clone();
    if store.cancel_reminder(user_id, &reminder.id).await? {
        Ok(reminder)
    } else {
        Err(TaskflowError::Validation(
            "I couldn't find that reminder.".into(),
        ))
    }
}

/// `Mon 02 Mar 2026, 06:00 PM (Asia/Kolkata)`.
pub fn format_due(reminder: &Reminder) -> String {
    format!(
        "{} ({})",
        reminder.datetime.format("%a %d %b %Y, %I:%M %p"),
        reminder.timezone
    )
}

/// Numbered listing of `reminders`.
pub fn format_list(reminders: &[Reminder]) -> String {
    if reminders.is_empty() {
        return "You have no pending reminders.".to_string();
    }
    let mut out = String::from("📋 Your reminders:\n");
    for (i, r) in reminders.iter().enumerate() {
        out.push_str(&format!(
            "\n{}. {}\n   ⏰ {}\n   🆔 {}",
            i + 1,
            r.task,
            format_due(r),
            r.id.chars().take(8).collect::<String>()
        ));
    }
    out
}

pub(super) async fn handle_remind(ctx: &CommandContext<'_>) -> String {
    let fields = pipe_fields(args(ctx.text));
    if fields.len() < 2 || fields.len() > 3 {
        return "Usage: /remind <when> | <task> [| <country or city>]".to_string();
    }

    let mut req = ReminderRequest {
        task: fields[1].to_string(),
        when: Some(fields[0].to_string()),
        ..Default::default()
    };
    if let Some(place) = fields.get(2) {
        req = req.with_place(place);
    }

    match create_reminder(ctx.store, ctx.resolver, ctx.user_id, req, Utc::now()).await {
        Ok(r) => format!("✅ Reminder set!\n📝 {}\n⏰ {}", r.task, format_due(&r)),
        Err(e) => user_error(&e),
    }
}

pub(super) async fn handle_reminders(ctx: &CommandContext<'_>) -> String {
    format_list(&list_pending(ctx.store, ctx.user_id).await)
}

pub(super) async fn handle_cancel(ctx: &CommandContext<'_>) -> String {
    let target = args(ctx.text);
    if target.is_empty() {
        return "Usage: /cancel <number or id>".to_string();
    }
    match cancel_by_target(ctx.store, ctx.user_id, target).await {
        Ok(r) => format!("❌ Cancelled reminder: {}", r.task),
        Err(e) => user_error(&e),
    }
}
