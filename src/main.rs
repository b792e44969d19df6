mod commands;
mod gateway;

use anyhow::Context as _;
use chrono::Utc;
use clap::{Parser, Subcommand};
use commands::reminders::{self, ReminderRequest};
use gateway::console::{self, ConsoleSender};
use std::sync::Arc;
use taskflow_core::config::{self, Config};
use taskflow_core::timezone::TimezoneResolver;
use taskflow_memory::{Store, StoreOptions};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "taskflow",
    version,
    about = "TaskFlow: durable memory and reminders for a chat assistant"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the assistant: console channel plus reminder scheduler.
    Start,
    /// Show config and store health.
    Status,
    /// Schedule a reminder for a user.
    Remind {
        #[arg(short, long)]
        user: String,
        /// When to fire, e.g. "tomorrow 9am" or "in 30 minutes".
        #[arg(short, long)]
        when: String,
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        location: Option<String>,
        /// What to remind about.
        #[arg(trailing_var_arg = true, required = true)]
        task: Vec<String>,
    },
    /// List a user's pending reminders.
    Reminders {
        #[arg(short, long)]
        user: String,
    },
    /// Cancel a pending reminder by list number, id, or id prefix.
    Cancel {
        #[arg(short, long)]
        user: String,
        target: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;
    let _guard = init_tracing(&cfg)?;

    match cli.command {
        Commands::Start => {
            let store = open_store(&cfg).await?;
            eprintln!("{} is running. Type `<user> <message>`, Ctrl-D to quit.", cfg.taskflow.name);
            let gw = gateway::Gateway::new(&cfg, store, Arc::new(ConsoleSender))?;
            Arc::new(gw).run(console::start()).await?;
        }
        Commands::Status => {
            let store = open_store(&cfg).await?;
            let stats = store.stats().await;
            println!("{} status\n", cfg.taskflow.name);
            println!("Config:            {}", cli.config);
            println!("Store:             {}", stats.path.display());
            println!("Users:             {}", stats.users);
            println!("Pending reminders: {}", stats.pending_reminders);
            println!("Backups:           {}", stats.backups);
            println!(
                "Scheduler:         {}",
                if cfg.scheduler.enabled {
                    format!("every {}s", cfg.scheduler.poll_interval_secs)
                } else {
                    "disabled".to_string()
                }
            );
        }
        Commands::Remind {
            user,
            when,
            country,
            location,
            task,
        } => {
            let store = open_store(&cfg).await?;
            let resolver = TimezoneResolver::new(cfg.timezone.zone()?);
            let req = ReminderRequest {
                task: task.join(" "),
                when: Some(when),
                country,
                location,
            };
            let reminder = reminders::create_reminder(&store, &resolver, &user, req, Utc::now())
                .await
                .context("could not schedule reminder")?;
            println!(
                "Reminder {} set for {}: {}",
                reminder.id,
                reminders::format_due(&reminder),
                reminder.task
            );
        }
        Commands::Reminders { user } => {
            let store = open_store(&cfg).await?;
            println!(
                "{}",
                reminders::format_list(&reminders::list_pending(&store, &user).await)
            );
        }
        Commands::Cancel { user, target } => {
            let store = open_store(&cfg).await?;
            let reminder = reminders::cancel_by_target(&store, &user, &target)
                .await
                .context("could not cancel reminder")?;
            println!("Cancelled {}: {}", reminder.id, reminder.task);
        }
    }

    Ok(())
}

/// Console output on stderr plus a daily log file. Keep the guard alive until exit.
fn init_tracing(cfg: &Config) -> anyhow::Result<WorkerGuard> {
    let logs_dir = cfg.taskflow.logs_dir();
    std::fs::create_dir_all(&logs_dir)
        .with_context(|| format!("failed to create {}", logs_dir.display()))?;
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&logs_dir, "taskflow.log"));

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.taskflow.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();
    Ok(guard)
}

async fn open_store(cfg: &Config) -> anyhow::Result<Store> {
    let path = cfg.memory.resolved_path();
    Store::open(&path, StoreOptions::from_config(cfg)?)
        .await
        .with_context(|| format!("failed to open store at {}", path.display()))
}
