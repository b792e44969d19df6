//! Schema migrations over the raw JSON document.
//!
//! Each step upgrades the document by exactly one version. Steps run in order
//! until [`CURRENT_VERSION`] is reached, before typed deserialization.
//!
//! | from | step |
//! |------|------|
//! | 0 | wrap a flat `{user_id: record}` map into `{version, created_at, users}` |
//! | 1 | rename legacy per-user fields, backfill missing ones, normalize timestamps |
//!
//! The step-1 normalization is idempotent and also runs over documents that
//! are already current, so one incomplete record never fails the whole load.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::{json, Map, Value};
use taskflow_core::error::TaskflowError;
use taskflow_core::normalize_user_id;
use tracing::{info, warn};
use uuid::Uuid;

/// Schema version written by this build.
pub const CURRENT_VERSION: u32 = 2;

/// Inputs shared by every migration step.
#[derive(Debug, Clone, Copy)]
pub struct MigrationContext {
    /// Zone for naive reminder times whose own zone is unknown.
    pub default_zone: Tz,
    /// Stand-in for timestamps that are missing entirely.
    pub now: DateTime<Utc>,
}

type Step = fn(&mut Value, &MigrationContext) -> Result<(), TaskflowError>;

/// Ordered by source version.
const MIGRATIONS: &[(u32, Step)] = &[(0, wrap_flat_users), (1, normalize_user_records)];

/// Outcome of [`migrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migrated {
    pub from: u32,
    pub to: u32,
}

impl Migrated {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Schema version of a raw document.
///
/// No `users` object means the flat pre-versioned layout (0). An integer
/// `version` is taken as-is. Anything else, like the legacy string `"2.0"`,
/// counts as 1.
pub fn detect_version(doc: &Value) -> u32 {
    if !doc.get("users").is_some_and(Value::is_object) {
        return 0;
    }
    doc.get("version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(1)
}

/// Upgrade `doc` in place to [`CURRENT_VERSION`].
pub fn migrate(doc: &mut Value, ctx: &MigrationContext) -> Result<Migrated, TaskflowError> {
    if !doc.is_object() {
        return Err(TaskflowError::StorageCorruption(
            "store document is not a JSON object".into(),
        ));
    }

    let from = detect_version(doc);
    if from > CURRENT_VERSION {
        warn!("store schema version {from} is newer than {CURRENT_VERSION}; loading as-is");
        return Ok(Migrated { from, to: from });
    }

    let mut version = from;
    for (source, step) in MIGRATIONS {
        if *source < version {
            continue;
        }
        step(doc, ctx)?;
        version = source + 1;
        set_version(doc, version);
        info!("migrated store schema {source} -> {version}");
    }
    if from == CURRENT_VERSION {
        // Fill fields missing from individual records. Not a version change:
        // the repairs are written back with the next mutation.
        normalize_user_records(doc, ctx)?;
    }

    Ok(Migrated { from, to: version })
}

fn set_version(doc: &mut Value, version: u32) {
    if let Some(obj) = doc.as_object_mut() {
        obj.insert("version".into(), json!(version));
    }
}

// --- 0 -> 1 ---

fn wrap_flat_users(doc: &mut Value, ctx: &MigrationContext) -> Result<(), TaskflowError> {
    let users = std::mem::take(doc);
    *doc = json!({
        "version": 1,
        "created_at": ctx.now.to_rfc3339(),
        "users": users,
    });
    Ok(())
}

// --- 1 -> 2 ---

fn normalize_user_records(doc: &mut Value, ctx: &MigrationContext) -> Result<(), TaskflowError> {
    let root = doc
        .as_object_mut()
        .ok_or_else(|| TaskflowError::StorageCorruption("store root is not an object".into()))?;

    let created = utc_or(root.get("created_at"), ctx.now);
    root.insert("created_at".into(), json!(created));

    let Some(users) = root.get_mut("users").and_then(Value::as_object_mut) else {
        return Err(TaskflowError::StorageCorruption(
            "store has no users object".into(),
        ));
    };

    let mut rekeyed: Map<String, Value> = Map::new();
    for (id, record) in std::mem::take(users) {
        let Value::Object(mut user) = record else {
            warn!("dropping malformed user record {id}");
            continue;
        };
        normalize_user(&mut user, ctx);

        let key = normalize_user_id(&id);
        match rekeyed.get_mut(&key).and_then(Value::as_object_mut) {
            Some(existing) => {
                warn!("merging user record {id} into {key}");
                merge_user(existing, user);
            }
            None => {
                rekeyed.insert(key, Value::Object(user));
            }
        }
    }
    *users = rekeyed;
    Ok(())
}

/// Fold `other` into `into` when two legacy keys normalize to the same user.
fn merge_user(into: &mut Map<String, Value>, other: Map<String, Value>) {
    for (key, value) in other {
        if !into.contains_key(&key) {
            into.insert(key, value);
            continue;
        }
        match (into.get_mut(&key), value) {
            (Some(Value::Array(mine)), Value::Array(theirs)) => mine.extend(theirs),
            (Some(Value::Object(mine)), Value::Object(theirs)) => {
                for (k, v) in theirs {
                    mine.entry(k).or_insert(v);
                }
            }
            _ => {}
        }
    }
}

fn normalize_user(user: &mut Map<String, Value>, ctx: &MigrationContext) {
    // Identity timestamps.
    let legacy_created = user.remove("created_at");
    let legacy_updated = user.remove("last_updated");
    let first_seen = utc_or(user.get("first_seen").or(legacy_created.as_ref()), ctx.now);
    let last_interaction = utc_or(
        user.get("last_interaction").or(legacy_updated.as_ref()),
        first_seen,
    );
    user.insert("first_seen".into(), json!(first_seen));
    user.insert("last_interaction".into(), json!(last_interaction));

    if !user.get("preferences").is_some_and(Value::is_object) {
        user.insert("preferences".into(), json!({}));
    }

    // Conversation history.
    if !user.contains_key("conversation_history") {
        let legacy = user.remove("conversations").unwrap_or_else(|| json!([]));
        user.insert("conversation_history".into(), legacy);
    }
    let history = take_array(user, "conversation_history")
        .into_iter()
        .filter_map(|entry| normalize_conversation(entry, ctx))
        .collect();
    user.insert("conversation_history".into(), Value::Array(history));

    // Tracked products.
    if !user.contains_key("tracked_products") {
        let legacy = user.remove("tracked_items").unwrap_or_else(|| json!([]));
        user.insert("tracked_products".into(), legacy);
    }
    let products = take_array(user, "tracked_products")
        .into_iter()
        .filter_map(|p| normalize_product(p, ctx))
        .collect();
    user.insert("tracked_products".into(), Value::Array(products));

    // Reminders.
    let reminders = take_array(user, "reminders")
        .into_iter()
        .filter_map(|r| normalize_reminder(r, ctx))
        .collect();
    user.insert("reminders".into(), Value::Array(reminders));
}

fn normalize_conversation(entry: Value, ctx: &MigrationContext) -> Option<Value> {
    let Value::Object(mut e) = entry else {
        return None;
    };
    if let Some(msg) = e.remove("message") {
        e.entry("user_message").or_insert(msg);
    }
    if let Some(resp) = e.remove("response") {
        e.entry("agent_response").or_insert(resp);
    }
    for key in ["user_message", "agent_response"] {
        if !e.get(key).is_some_and(Value::is_string) {
            e.insert(key.into(), json!(""));
        }
    }
    e.entry("intent").or_insert(Value::Null);
    e.entry("tool_used").or_insert(Value::Null);
    let ts = utc_or(e.get("timestamp"), ctx.now);
    e.insert("timestamp".into(), json!(ts));
    Some(Value::Object(e))
}

fn normalize_product(product: Value, ctx: &MigrationContext) -> Option<Value> {
    let Value::Object(mut p) = product else {
        return None;
    };
    if !p.get("id").is_some_and(Value::is_string) {
        p.insert("id".into(), json!(Uuid::new_v4().to_string()));
    }
    for key in ["title", "url"] {
        if !p.get(key).is_some_and(Value::is_string) {
            p.insert(key.into(), json!(""));
        }
    }
    for key in ["current_price", "target_price"] {
        let price = p.get(key).and_then(coerce_price);
        p.insert(key.into(), json!(price));
    }
    let since = utc_or(p.get("tracked_since"), ctx.now);
    let checked = utc_or(p.get("last_checked"), since);
    p.insert("tracked_since".into(), json!(since));
    p.insert("last_checked".into(), json!(checked));
    Some(Value::Object(p))
}

fn normalize_reminder(reminder: Value, ctx: &MigrationContext) -> Option<Value> {
    let Value::Object(mut r) = reminder else {
        return None;
    };

    let zone: Tz = r
        .get("timezone")
        .and_then(Value::as_str)
        .and_then(|z| z.parse().ok())
        .unwrap_or(ctx.default_zone);
    r.insert("timezone".into(), json!(zone.name()));

    let Some(due) = r.get("datetime").and_then(|v| zoned(v, zone)) else {
        let id = r.get("id").and_then(|v| v.as_str()).unwrap_or("?");
        warn!("dropping reminder {id} with unreadable datetime");
        return None;
    };
    r.insert("datetime".into(), json!(due));

    if !r.get("id").is_some_and(Value::is_string) {
        r.insert("id".into(), json!(Uuid::new_v4().to_string()));
    }
    if !r.get("task").is_some_and(Value::is_string) {
        r.insert("task".into(), json!(""));
    }

    let status = r
        .get("status")
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase)
        .filter(|s| matches!(s.as_str(), "pending" | "sent" | "cancelled"))
        .unwrap_or_else(|| "pending".to_string());
    r.insert("status".into(), json!(status));

    let created = r
        .get("created_at")
        .and_then(|v| zoned(v, zone))
        .unwrap_or_else(|| ctx.now.with_timezone(&zone).fixed_offset().to_rfc3339());
    r.insert("created_at".into(), json!(created));

    match r.get("sent_at").and_then(|v| zoned(v, zone)) {
        Some(sent) => {
            r.insert("sent_at".into(), json!(sent));
        }
        None => {
            r.remove("sent_at");
        }
    }

    for key in ["country", "location"] {
        if r.get(key).is_some_and(Value::is_null) {
            r.remove(key);
        }
    }

    Some(Value::Object(r))
}

fn take_array(obj: &mut Map<String, Value>, key: &str) -> Vec<Value> {
    match obj.remove(key) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// `"₹1,299.00"` → 1299.0. Non-numeric strings become `None`.
fn coerce_price(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let digits: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
}

/// A timestamp as UTC. Naive values are read as UTC; missing or unreadable ones become `fallback`.
fn utc_or(v: Option<&Value>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    let Some(s) = v.and_then(Value::as_str).map(str::trim) else {
        return fallback;
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    parse_naive(s)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(fallback)
}

/// RFC 3339 with the offset of `zone`. Naive values are taken as local time in `zone`.
fn zoned(v: &Value, zone: Tz) -> Option<String> {
    let s = v.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.to_rfc3339());
    }
    let naive = parse_naive(s)?;
    zone.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.fixed_offset().to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StoreRoot;

    fn ctx() -> MigrationContext {
        MigrationContext {
            default_zone: chrono_tz::Asia::Kolkata,
            now: Utc.with_ymd_and_hms(2026, 3, 2, 4, 45, 0).unwrap(),
        }
    }

    fn legacy_flat() -> Value {
        json!({
            "919876500000": {
                "created_at": "2025-11-01T09:00:00",
                "last_updated": "2025-11-02T10:30:00",
                "conversations": [
                    {"timestamp": "2025-11-01T09:00:00", "message": "hi", "response": "hello", "intent": "greeting"}
                ],
                "tracked_items": [
                    {"id": "p1", "title": "Phone", "url": "https://shop/p1", "current_price": "₹12,999"}
                ],
                "reminders": [
                    {"id": "r1", "task": "call mom", "datetime": "2025-11-03T18:00:00", "timezone": "Asia/Kolkata"}
                ],
                "nickname": "ravi"
            }
        })
    }

    #[test]
    fn test_detect_version() {
        assert_eq!(detect_version(&json!({"a": {}})), 0);
        assert_eq!(detect_version(&json!({"version": "2.0", "users": {}})), 1);
        assert_eq!(detect_version(&json!({"users": {}})), 1);
        assert_eq!(detect_version(&json!({"version": 2, "users": {}})), 2);
    }

    #[test]
    fn test_flat_legacy_file_reaches_current_shape() {
        let mut doc = legacy_flat();
        let out = migrate(&mut doc, &ctx()).unwrap();
        assert_eq!(out, Migrated { from: 0, to: CURRENT_VERSION });

        let root: StoreRoot = serde_json::from_value(doc).unwrap();
        let user = &root.users["919876500000"];
        assert_eq!(user.first_seen.to_rfc3339(), "2025-11-01T09:00:00+00:00");
        assert_eq!(user.last_interaction.to_rfc3339(), "2025-11-02T10:30:00+00:00");
        assert_eq!(user.conversation_history.len(), 1);
        assert_eq!(user.conversation_history[0].user_message, "hi");
        assert_eq!(user.conversation_history[0].agent_response, "hello");
        assert_eq!(user.conversation_history[0].intent.as_deref(), Some("greeting"));
        assert_eq!(user.tracked_products[0].current_price, Some(12999.0));
        assert_eq!(user.reminders[0].datetime.to_rfc3339(), "2025-11-03T18:00:00+05:30");
        assert_eq!(user.reminders[0].status, crate::ReminderStatus::Pending);
        assert_eq!(user.extra["nickname"], "ravi");
        assert!(!user.extra.contains_key("conversations"));
        assert!(!user.extra.contains_key("tracked_items"));
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let mut doc = legacy_flat();
        migrate(&mut doc, &ctx()).unwrap();
        let once = doc.clone();
        let out = migrate(&mut doc, &ctx()).unwrap();
        assert!(!out.changed());
        assert_eq!(doc, once);
    }

    #[test]
    fn test_current_version_backfills_incomplete_records() {
        let mut doc = json!({
            "version": 2,
            "created_at": "2026-01-01T00:00:00Z",
            "users": {
                "bob": {
                    "preferences": {"lang": "en"},
                    "tracked_products": [{"id": "p1", "title": "Kettle", "url": "u"}]
                }
            }
        });
        let out = migrate(&mut doc, &ctx()).unwrap();
        assert_eq!(out, Migrated { from: 2, to: 2 });
        assert!(!out.changed());

        let root: StoreRoot = serde_json::from_value(doc).unwrap();
        let bob = &root.users["bob"];
        assert_eq!(bob.first_seen, ctx().now);
        assert_eq!(bob.last_interaction, ctx().now);
        assert_eq!(bob.preferences["lang"], "en");
        assert_eq!(bob.tracked_products[0].tracked_since, ctx().now);
        assert!(bob.reminders.is_empty());
    }

    #[test]
    fn test_string_version_runs_record_step_only() {
        let mut doc = json!({
            "version": "2.0",
            "created_at": "2025-10-01T00:00:00",
            "users": {
                "u": {"first_seen": "2025-10-01T00:00:00", "reminders": [
                    {"id": "r", "task": "t", "datetime": "2025-10-02T08:00:00", "timezone": "Europe/London", "status": "sent"}
                ]}
            }
        });
        let out = migrate(&mut doc, &ctx()).unwrap();
        assert_eq!(out, Migrated { from: 1, to: 2 });
        assert_eq!(doc["version"], 2);
        assert_eq!(doc["users"]["u"]["reminders"][0]["datetime"], "2025-10-02T08:00:00+01:00");
        assert_eq!(doc["users"]["u"]["reminders"][0]["status"], "sent");
        assert_eq!(doc["users"]["u"]["last_interaction"], doc["users"]["u"]["first_seen"]);
    }

    #[test]
    fn test_legacy_keys_are_normalized_and_merged() {
        let mut doc = json!({
            "whatsapp:+919876500000": {"first_seen": "2025-01-01T00:00:00Z", "preferences": {"lang": "en"},
                "conversations": [{"message": "a", "response": "b"}]},
            "+91 98765 00000": {"first_seen": "2025-02-01T00:00:00Z", "preferences": {"lang": "hi", "city": "Pune"},
                "conversations": [{"message": "c", "response": "d"}]}
        });
        migrate(&mut doc, &ctx()).unwrap();
        let users = doc["users"].as_object().unwrap();
        assert_eq!(users.len(), 1);
        let user = &users["919876500000"];
        assert_eq!(user["conversation_history"].as_array().unwrap().len(), 2);
        assert_eq!(user["preferences"]["city"], "Pune");
        assert!(user["preferences"]["lang"].is_string());
    }

    #[test]
    fn test_unknown_zone_falls_back_to_default() {
        let mut doc = json!({"version": 1, "users": {"u": {"reminders": [
            {"id": "r", "task": "t", "datetime": "2025-10-02 08:00"}
        ]}}});
        migrate(&mut doc, &ctx()).unwrap();
        let r = &doc["users"]["u"]["reminders"][0];
        assert_eq!(r["timezone"], "Asia/Kolkata");
        assert_eq!(r["datetime"], "2025-10-02T08:00:00+05:30");
    }

    #[test]
    fn test_newer_version_is_left_alone() {
        let mut doc = json!({"version": 9, "users": {}});
        let out = migrate(&mut doc, &ctx()).unwrap();
        assert_eq!(out, Migrated { from: 9, to: 9 });
        assert_eq!(doc, json!({"version": 9, "users": {}}));
    }

    #[test]
    fn test_non_object_root_is_corruption() {
        let mut doc = json!([1, 2, 3]);
        assert!(matches!(
            migrate(&mut doc, &ctx()),
            Err(TaskflowError::StorageCorruption(_))
        ));
    }
}
