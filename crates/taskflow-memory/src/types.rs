//! Typed records persisted in the store document.

use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::migrate::CURRENT_VERSION;

/// The whole persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRoot {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub users: BTreeMap<String, UserRecord>,
}

impl StoreRoot {
    /// A fresh, empty document at the current schema version.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            version: CURRENT_VERSION,
            created_at: now,
            users: BTreeMap::new(),
        }
    }
}

/// Everything remembered about one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub first_seen: DateTime<Utc>,
    pub last_interaction: DateTime<Utc>,
    #[serde(default)]
    pub preferences: BTreeMap<String, Value>,
    #[serde(default)]
    pub conversation_history: Vec<ConversationEntry>,
    #[serde(default)]
    pub tracked_products: Vec<TrackedProduct>,
    #[serde(default)]
    pub reminders: Vec<Reminder>,
    /// Keys this version does not know about, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserRecord {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            first_seen: now,
            last_interaction: now,
            preferences: BTreeMap::new(),
            conversation_history: Vec::new(),
            tracked_products: Vec::new(),
            reminders: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Drop the oldest history entries beyond `cap`. Returns whether anything was dropped.
    pub fn enforce_history_cap(&mut self, cap: usize) -> bool {
        let len = self.conversation_history.len();
        if len > cap {
            self.conversation_history.drain(..len - cap);
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub timestamp: DateTime<Utc>,
    pub user_message: String,
    pub agent_response: String,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub tool_used: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedProduct {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub target_price: Option<f64>,
    pub tracked_since: DateTime<Utc>,
    pub last_checked: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Input for [`Store::add_tracked_product`](crate::Store::add_tracked_product).
#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub title: String,
    pub url: String,
    pub current_price: Option<f64>,
    pub target_price: Option<f64>,
}

/// Partial update for a tracked product. `None` fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub title: Option<String>,
    pub url: Option<String>,
    pub current_price: Option<f64>,
    pub target_price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    Pending,
    Sent,
    Cancelled,
}

impl ReminderStatus {
    /// `pending` may move to `sent` or `cancelled`; both of those are terminal.
    /// Staying in the same status is always allowed.
    pub fn can_transition_to(self, next: ReminderStatus) -> bool {
        self == next || self == ReminderStatus::Pending
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub task: String,
    /// Due instant, carrying the offset of `timezone` at that moment.
    pub datetime: DateTime<FixedOffset>,
    /// IANA zone id the reminder was scheduled in.
    pub timezone: String,
    pub status: ReminderStatus,
    pub created_at: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Reminder {
    /// A pending reminder due at `due`, created at `now`. The id is assigned by the store.
    pub fn new(task: impl Into<String>, due: DateTime<Tz>, now: DateTime<Tz>) -> Self {
        Self {
            id: String::new(),
            task: task.into(),
            datetime: due.fixed_offset(),
            timezone: due.timezone().name().to_string(),
            status: ReminderStatus::Pending,
            created_at: now.fixed_offset(),
            sent_at: None,
            country: None,
            location: None,
            extra: Map::new(),
        }
    }

    /// The recorded zone, or `fallback` if it no longer parses.
    pub fn zone(&self, fallback: Tz) -> Tz {
        self.timezone.parse().unwrap_or(fallback)
    }

    pub fn is_pending(&self) -> bool {
        self.status == ReminderStatus::Pending
    }
}

/// Partial update for a reminder. `None` fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct ReminderPatch {
    pub task: Option<String>,
    pub datetime: Option<DateTime<FixedOffset>>,
    pub status: Option<ReminderStatus>,
    pub sent_at: Option<DateTime<FixedOffset>>,
}

impl ReminderPatch {
    pub fn status(status: ReminderStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Mark delivered at `at`.
    pub fn sent(at: DateTime<FixedOffset>) -> Self {
        Self {
            status: Some(ReminderStatus::Sent),
            sent_at: Some(at),
            ..Default::default()
        }
    }
}

/// A pending reminder together with its owner (normalized user id).
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReminder {
    pub user_id: String,
    pub reminder: Reminder,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_transitions() {
        use ReminderStatus::*;
        assert!(Pending.can_transition_to(Sent));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Pending));
        assert!(Sent.can_transition_to(Sent));
        assert!(Cancelled.can_transition_to(Cancelled));
        assert!(!Sent.can_transition_to(Pending));
        assert!(!Sent.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Sent));
        assert!(!Cancelled.can_transition_to(Pending));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ReminderStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
        let s: ReminderStatus = serde_json::from_str("\"sent\"").unwrap();
        assert_eq!(s, ReminderStatus::Sent);
    }

    #[test]
    fn test_reminder_keeps_local_offset() {
        let tz = chrono_tz::Asia::Kolkata;
        let due = tz.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap();
        let now = tz.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let r = Reminder::new("call mom", due, now);
        assert_eq!(r.timezone, "Asia/Kolkata");
        assert_eq!(r.datetime.to_rfc3339(), "2026-03-02T18:00:00+05:30");
        assert_eq!(r.zone(chrono_tz::UTC), tz);

        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("sent_at").is_none());
        assert_eq!(json["status"], "pending");
    }

    #[test]
    fn test_unknown_user_keys_survive_round_trip() {
        let raw = serde_json::json!({
            "first_seen": "2026-01-01T00:00:00Z",
            "last_interaction": "2026-01-02T00:00:00Z",
            "nickname": "ravi",
            "flags": {"beta": true}
        });
        let user: UserRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(user.extra["nickname"], "ravi");
        let back = serde_json::to_value(&user).unwrap();
        assert_eq!(back["flags"]["beta"], true);
        assert_eq!(back["reminders"], serde_json::json!([]));
    }

    #[test]
    fn test_history_cap_drops_oldest() {
        let now = Utc::now();
        let mut user = UserRecord::new(now);
        for i in 0..5 {
            user.conversation_history.push(ConversationEntry {
                timestamp: now,
                user_message: format!("m{i}"),
                agent_response: String::new(),
                intent: None,
                tool_used: None,
            });
        }
        assert!(user.enforce_history_cap(3));
        assert_eq!(user.conversation_history[0].user_message, "m2");
        assert!(!user.enforce_history_cap(3));
    }
}
