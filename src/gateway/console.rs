//! Console channel: stdin in, stdout out.
//!
//! Each input line is `<user> <text>`. Replies and reminder notifications are
//! written to stdout prefixed with the recipient.

use async_trait::async_trait;
use std::io::Write;
use taskflow_core::error::TaskflowError;
use taskflow_core::traits::NotificationSender;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One message typed at the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingLine {
    pub user_id: String,
    pub text: String,
}

/// Split `<user> <text>`. Blank lines and lines with no text are rejected.
pub fn parse_line(line: &str) -> Option<IncomingLine> {
    let (user, text) = line.trim().split_once(char::is_whitespace)?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(IncomingLine {
        user_id: user.to_string(),
        text: text.to_string(),
    })
}

/// Start reading stdin. The receiver closes at EOF.
pub fn start() -> mpsc::Receiver<IncomingLine> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_line(&line) {
                        Some(incoming) => {
                            if tx.send(incoming).await.is_err() {
                                break;
                            }
                        }
                        None => warn!("console: expected `<user> <message>`, got {line:?}"),
                    }
                }
                Ok(None) => {
                    info!("console: stdin closed");
                    break;
                }
                Err(e) => {
                    warn!("console: read failed: {e}");
                    break;
                }
            }
        }
    });
    rx
}

/// Delivers notifications by printing them.
pub struct ConsoleSender;

#[async_trait]
impl NotificationSender for ConsoleSender {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, recipient: &str, text: &str) -> Result<(), TaskflowError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "[to {recipient}]\n{text}\n")
            .and_then(|_| out.flush())
            .map_err(|e| TaskflowError::Delivery(format!("stdout: {e}")))
    }
}
