//! User record lookup, lazy creation, and preferences.

use super::Store;
use crate::types::{StoreRoot, UserRecord};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use taskflow_core::error::TaskflowError;
use taskflow_core::normalize_user_id;
use tracing::info;

/// Normalized store key for a raw identifier.
pub(super) fn user_key(raw: &str) -> Result<String, TaskflowError> {
    let key = normalize_user_id(raw);
    if key.is_empty() {
        return Err(TaskflowError::Validation(format!(
            "empty user id: {raw:?}"
        )));
    }
    Ok(key)
}

/// The record for `key`, created if absent. The flag reports creation.
pub(super) fn user_entry<'a>(
    root: &'a mut StoreRoot,
    key: &str,
    now: DateTime<Utc>,
) -> (&'a mut UserRecord, bool) {
    let created = !root.users.contains_key(key);
    if created {
        info!("new user {key}");
    }
    let user = root
        .users
        .entry(key.to_string())
        .or_insert_with(|| UserRecord::new(now));
    (user, created)
}

impl Store {
    /// Snapshot of the user's record, creating and persisting it on first contact.
    pub async fn get_user_record(&self, user_id: &str) -> Result<UserRecord, TaskflowError> {
        let key = user_key(user_id)?;
        let cap = self.inner.options.max_conversation_history;
        self.mutate(|root| {
            let (user, created) = user_entry(root, &key, Utc::now());
            let trimmed = user.enforce_history_cap(cap);
            Ok((user.clone(), created || trimmed))
        })
        .await
    }

    /// Whether a record exists for this user. Never creates one.
    pub async fn has_user(&self, user_id: &str) -> bool {
        let key = normalize_user_id(user_id);
        self.read(|root| root.users.contains_key(&key)).await
    }

    pub async fn update_preference(
        &self,
        user_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), TaskflowError> {
        let mut prefs = BTreeMap::new();
        prefs.insert(key.to_string(), value);
        self.update_preferences(user_id, prefs).await
    }

    /// Merge `prefs` into the user's preferences.
    pub async fn update_preferences(
        &self,
        user_id: &str,
        prefs: BTreeMap<String, Value>,
    ) -> Result<(), TaskflowError> {
        let key = user_key(user_id)?;
        self.mutate(|root| {
            let now = Utc::now();
            let (user, _) = user_entry(root, &key, now);
            user.preferences.extend(prefs);
            user.last_interaction = now;
            Ok(((), true))
        })
        .await
    }

    pub async fn get_preference(&self, user_id: &str, key: &str) -> Option<Value> {
        let user_key = normalize_user_id(user_id);
        self.read(|root| {
            root.users
                .get(&user_key)
                .and_then(|u| u.preferences.get(key).cloned())
        })
        .await
    }
}
