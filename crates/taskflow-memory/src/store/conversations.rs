//! Capped conversation history.

use super::users::{user_entry, user_key};
use super::Store;
use crate::types::ConversationEntry;
use chrono::Utc;
use taskflow_core::error::TaskflowError;
use taskflow_core::normalize_user_id;

impl Store {
    /// Append one exchange, evicting the oldest entries beyond the cap, and persist.
    pub async fn add_conversation(
        &self,
        user_id: &str,
        user_message: &str,
        agent_response: &str,
        intent: Option<&str>,
        tool_used: Option<&str>,
    ) -> Result<(), TaskflowError> {
        let key = user_key(user_id)?;
        let cap = self.inner.options.max_conversation_history;
        let entry = ConversationEntry {
            timestamp: Utc::now(),
            user_message: user_message.to_string(),
            agent_response: agent_response.to_string(),
            intent: intent.map(str::to_string),
            tool_used: tool_used.map(str::to_string),
        };
        self.mutate(|root| {
            let (user, _) = user_entry(root, &key, entry.timestamp);
            user.last_interaction = entry.timestamp;
            user.conversation_history.push(entry);
            user.enforce_history_cap(cap);
            Ok(((), true))
        })
        .await
    }

    /// The last `limit` exchanges, oldest first.
    pub async fn get_recent_conversations(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Vec<ConversationEntry> {
        let key = normalize_user_id(user_id);
        self.read(|root| {
            root.users
                .get(&key)
                .map(|u| {
                    let history = &u.conversation_history;
                    history[history.len().saturating_sub(limit)..].to_vec()
                })
                .unwrap_or_default()
        })
        .await
    }
}
