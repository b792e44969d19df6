//! Help, history, and preference commands.

use super::{args, user_error, CommandContext};
use serde_json::Value;

const HISTORY_LIMIT: usize = 5;

pub(super) fn handle_help() -> String {
    "Here's what I can do:\n\n\
     /remind <when> | <task> [| <country or city>]\n   e.g. /remind tomorrow 9am | call the bank\n\
     /reminders - list pending reminders\n\
     /cancel <number or id> - cancel a reminder\n\
     /track <title> | <url> | <price> [| <target>]\n\
     /tracked - list tracked products\n\
     /untrack <number or id>\n\
     /history - our recent messages\n\
     /pref <key> [value] - show or set a preference"
        .to_string()
}

pub(super) async fn handle_history(ctx: &CommandContext<'_>) -> String {
    let recent = ctx
        .store
        .get_recent_conversations(ctx.user_id, HISTORY_LIMIT)
        .await;
    if recent.is_empty() {
        return "No conversation history yet.".to_string();
    }
    let mut out = String::from("🕘 Recent conversation:\n");
    for entry in &recent {
        out.push_str(&format!(
            "\n[{}]\nYou: {}\nMe: {}\n",
            entry.timestamp.format("%d %b %H:%M"),
            entry.user_message,
            first_line(&entry.agent_response)
        ));
    }
    out
}

/// `/pref key` shows a preference, `/pref key value` sets it.
/// Values that parse as JSON (numbers, booleans) are stored typed.
pub(super) async fn handle_pref(ctx: &CommandContext<'_>) -> String {
    let rest = args(ctx.text);
    let (key, raw) = match rest.split_once(char::is_whitespace) {
        Some((k, v)) => (k, v.trim()),
        None => (rest, ""),
    };
    if key.is_empty() {
        return "Usage: /pref <key> [value]".to_string();
    }

    if raw.is_empty() {
        return match ctx.store.get_preference(ctx.user_id, key).await {
            Some(v) => format!("{key} = {}", display(&v)),
            None => format!("{key} is not set."),
        };
    }

    let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.into()));
    let shown = display(&value);
    match ctx.store.update_preference(ctx.user_id, key, value).await {
        Ok(()) => format!("✅ Saved {key} = {shown}"),
        Err(e) => user_error(&e),
    }
}

fn display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}
