//! Gateway: owns the store, rate limiter, timezone resolver, sender, and the
//! scheduler task, and routes console messages to command handlers.

pub mod console;
pub mod scheduler;

use crate::commands::{self, Command, CommandContext};
use console::IncomingLine;
use scheduler::ReminderScheduler;
use std::sync::Arc;
use taskflow_core::config::{Config, SchedulerConfig};
use taskflow_core::error::TaskflowError;
use taskflow_core::rate_limit::RateLimiter;
use taskflow_core::timezone::TimezoneResolver;
use taskflow_core::traits::NotificationSender;
use taskflow_memory::Store;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const WELCOME: &str = "👋 Welcome to TaskFlow! I can set reminders and track product prices. \
                       Send /help to see what I can do.";

const FALLBACK_REPLY: &str = "I can help with reminders and price tracking. \
                              Send /help for the list of commands.";

/// The central gateway between channels, memory, and the scheduler.
pub struct Gateway {
    pub(crate) store: Store,
    pub(crate) limiter: RateLimiter,
    pub(crate) resolver: TimezoneResolver,
    pub(crate) sender: Arc<dyn NotificationSender>,
    scheduler_config: SchedulerConfig,
    name: String,
}

impl Gateway {
    pub fn new(
        config: &Config,
        store: Store,
        sender: Arc<dyn NotificationSender>,
    ) -> Result<Self, TaskflowError> {
        Ok(Self {
            store,
            limiter: RateLimiter::new(config.rate_limit.max_requests, config.rate_limit.window()),
            resolver: TimezoneResolver::new(config.timezone.zone()?),
            sender,
            scheduler_config: config.scheduler.clone(),
            name: config.taskflow.name.clone(),
        })
    }

    /// Start the scheduler, serve `incoming` until it closes or Ctrl-C, then shut down.
    pub async fn run(self: Arc<Self>, mut incoming: mpsc::Receiver<IncomingLine>) -> anyhow::Result<()> {
        info!(
            "{} gateway running | sender: {} | scheduler: {}",
            self.name,
            self.sender.name(),
            if self.scheduler_config.enabled {
                "enabled"
            } else {
                "disabled"
            },
        );

        let token = CancellationToken::new();
        let sched_handle = if self.scheduler_config.enabled {
            let scheduler = ReminderScheduler::new(
                self.store.clone(),
                self.sender.clone(),
                self.scheduler_config.poll_interval(),
            );
            Some(scheduler.spawn(token.clone()))
        } else {
            None
        };

        loop {
            tokio::select! {
                line = incoming.recv() => match line {
                    Some(line) => {
                        let reply = self.handle_message(&line.user_id, &line.text).await;
                        if let Err(e) = self.sender.send(&line.user_id, &reply).await {
                            warn!("failed to reply to {}: {e}", line.user_id);
                        }
                    }
                    None => {
                        info!("input closed");
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.shutdown(token, sched_handle).await;
        Ok(())
    }

    /// Handle one inbound message and return the reply text.
    ///
    /// Rate-limited messages are answered but not recorded.
    pub async fn handle_message(&self, user_id: &str, text: &str) -> String {
        let decision = self.limiter.is_allowed(user_id);
        if !decision.allowed {
            return format!(
                "⏳ You're sending messages too quickly. Please wait {} seconds.",
                decision.wait_secs
            );
        }

        let first_contact = !self.store.has_user(user_id).await;

        let (mut reply, intent, tool) = match Command::parse(text) {
            Some(cmd) => {
                let ctx = CommandContext {
                    store: &self.store,
                    resolver: &self.resolver,
                    user_id,
                    text,
                };
                let reply = commands::handle(&cmd, &ctx).await;
                (reply, Some(cmd.intent()), cmd.tool())
            }
            None => (FALLBACK_REPLY.to_string(), Some("chat"), None),
        };

        if first_contact {
            reply = format!("{WELCOME}\n\n{reply}");
        }

        if let Err(e) = self
            .store
            .add_conversation(user_id, text, &reply, intent, tool)
            .await
        {
            error!("failed to record conversation for {user_id}: {e}");
        }
        reply
    }

    /// Stop the scheduler, wait for it, then flush the store.
    async fn shutdown(&self, token: CancellationToken, sched_handle: Option<JoinHandle<()>>) {
        info!("Shutting down...");
        token.cancel();
        if let Some(handle) = sched_handle {
            if let Err(e) = handle.await {
                warn!("scheduler task ended abnormally: {e}");
            }
        }
        if let Err(e) = self.store.save().await {
            error!("final save failed: {e}");
        }
        info!("Shutdown complete.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use taskflow_memory::StoreOptions;

    struct NullSender;

    #[async_trait]
    impl NotificationSender for NullSender {
        fn name(&self) -> &str {
            "null"
        }
        async fn send(&self, _recipient: &str, _text: &str) -> Result<(), TaskflowError> {
            Ok(())
        }
    }

    async fn test_gateway(config: Config) -> (tempfile::TempDir, Gateway) {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open(tmp.path().join("user_memory.json"), StoreOptions::default())
            .await
            .unwrap();
        let gw = Gateway::new(&config, store, Arc::new(NullSender)).unwrap();
        (tmp, gw)
    }

    #[tokio::test]
    async fn test_first_contact_gets_welcome_once() {
        let (_tmp, gw) = test_gateway(Config::default()).await;
        let first = gw.handle_message("u1", "/help").await;
        assert!(first.starts_with(WELCOME));
        let second = gw.handle_message("u1", "/help").await;
        assert!(!second.contains("Welcome"));
    }

    #[tokio::test]
    async fn test_exchanges_are_recorded_with_intent() {
        let (_tmp, gw) = test_gateway(Config::default()).await;
        gw.handle_message("u1", "hello there").await;
        gw.handle_message("u1", "/remind in 10 minutes | stretch").await;

        let history = gw.store.get_recent_conversations("u1", 10).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].intent.as_deref(), Some("chat"));
        assert_eq!(history[1].intent.as_deref(), Some("remind"));
        assert_eq!(history[1].tool_used.as_deref(), Some("reminder"));
        assert_eq!(gw.store.get_all_pending_reminders().await.len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_messages_not_recorded() {
        let mut config = Config::default();
        config.rate_limit.max_requests = 2;
        let (_tmp, gw) = test_gateway(config).await;

        gw.handle_message("u1", "one").await;
        gw.handle_message("u1", "two").await;
        let third = gw.handle_message("u1", "three").await;
        assert!(third.contains("Please wait"));
        assert_eq!(gw.store.get_recent_conversations("u1", 10).await.len(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_when_input_closes() {
        let mut config = Config::default();
        config.scheduler.poll_interval_secs = 3600;
        let (_tmp, gw) = test_gateway(config).await;
        let gw = Arc::new(gw);

        let (tx, rx) = mpsc::channel(4);
        tx.send(IncomingLine {
            user_id: "u1".into(),
            text: "/pref language hi".into(),
        })
        .await
        .unwrap();
        drop(tx);

        tokio::time::timeout(std::time::Duration::from_secs(5), gw.clone().run(rx))
            .await
            .expect("gateway should stop at end of input")
            .unwrap();
        assert_eq!(
            gw.store.get_preference("u1", "language").await,
            Some(serde_json::json!("hi"))
        );
    }
}
