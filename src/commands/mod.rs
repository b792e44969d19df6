//! Built-in commands: instant responses, no language service call.

mod products;
mod profile;
pub mod reminders;


use taskflow_core::error::TaskflowError;
use taskflow_core::timezone::TimezoneResolver;
use taskflow_memory::Store;
use tracing::error;

/// Grouped context for command execution.
pub struct CommandContext<'a> {
    pub store: &'a Store,
    pub resolver: &'a TimezoneResolver,
    pub user_id: &'a str,
    pub text: &'a str,
}

/// Known commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Remind,
    Reminders,
    Cancel,
    Track,
    Tracked,
    Untrack,
    History,
    Pref,
}

impl Command {
    /// Parse a command from message text. `None` for plain text and unknown `/` words.
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        match first.to_ascii_lowercase().as_str() {
            "/help" | "/start" => Some(Self::Help),
            "/remind" => Some(Self::Remind),
            "/reminders" => Some(Self::Reminders),
            "/cancel" => Some(Self::Cancel),
            "/track" => Some(Self::Track),
            "/tracked" => Some(Self::Tracked),
            "/untrack" => Some(Self::Untrack),
            "/history" => Some(Self::History),
            "/pref" => Some(Self::Pref),
            _ => None,
        }
    }

    /// Intent label recorded with the exchange.
    pub fn intent(self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Remind => "remind",
            Self::Reminders => "reminders",
            Self::Cancel => "cancel",
            Self::Track => "track",
            Self::Tracked => "tracked",
            Self::Untrack => "untrack",
            Self::History => "history",
            Self::Pref => "pref",
        }
    }

    /// Tool label recorded with the exchange, if the command used one.
    pub fn tool(self) -> Option<&'static str> {
        match self {
            Self::Remind | Self::Reminders | Self::Cancel => Some("reminder"),
            Self::Track | Self::Tracked | Self::Untrack => Some("price_tracker"),
            Self::Help | Self::History | Self::Pref => None,
        }
    }
}

/// Handle a command and return the response text.
pub async fn handle(cmd: &Command, ctx: &CommandContext<'_>) -> String {
    match cmd {
        Command::Help => profile::handle_help(),
        Command::Remind => reminders::handle_remind(ctx).await,
        Command::Reminders => reminders::handle_reminders(ctx).await,
        Command::Cancel => reminders::handle_cancel(ctx).await,
        Command::Track => products::handle_track(ctx).await,
        Command::Tracked => products::handle_tracked(ctx).await,
        Command::Untrack => products::handle_untrack(ctx).await,
        Command::History => profile::handle_history(ctx).await,
        Command::Pref => profile::handle_pref(ctx).await,
    }
}

/// Text after the command word.
fn args(text: &str) -> &str {
    let text = text.trim();
    match text.split_once(char::is_whitespace) {
        Some((_, rest)) => rest.trim(),
        None => "",
    }
}

/// `a | b | c` → `["a", "b", "c"]`, trimmed.
fn pipe_fields(args: &str) -> Vec<&str> {
    args.split('|').map(str::trim).collect()
}

/// Turn an error into text safe to show the user. Details go to the log.
pub(crate) fn user_error(err: &TaskflowError) -> String {
    match err {
        TaskflowError::Validation(msg) => msg.clone(),
        other => {
            error!("command failed: {other}");
            "Sorry, something went wrong. Please try again.".to_string()
        }
    }
}

/// Pick an item by 1-based position, full id, or unique id prefix.
pub(crate) fn pick<'a, T>(
    items: &'a [T],
    target: &str,
    id_of: impl Fn(&T) -> &str,
    what: &str,
) -> Result<&'a T, TaskflowError> {
    let target = target.trim().trim_start_matches('#');
    let not_found = || {
        TaskflowError::Validation(format!(
            "I couldn't find that {what}. Send the number from the list or its id."
        ))
    };
    if target.is_empty() {
        return Err(not_found());
    }

    if let Ok(n) = target.parse::<usize>() {
        if n >= 1 && n <= items.len() {
            return Ok(&items[n - 1]);
        }
    }
    if let Some(item) = items.iter().find(|i| id_of(*i) == target) {
        return Ok(item);
    }

    let mut matches = items.iter().filter(|i| id_of(*i).starts_with(target));
    match (matches.next(), matches.next()) {
        (Some(item), None) => Ok(item),
        (Some(_), Some(_)) => Err(TaskflowError::Validation(format!(
            "\"{target}\" matches more than one {what}. Use a longer id or the list number."
        ))),
        (None, _) => Err(not_found()),
    }
}
