use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use slack_core::config::AppConfig;
use slack_core::{Pushgateway, SlackClient};
use slack_jobs::retention::RetentionOptions;
use slack_jobs::tracker::TrackerOptions;
use slack_jobs::{retention, summary, tracker};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "manage-slack",
    about = "Daily summaries, retention and thread tracking for a Slack workspace",
    version,
    author
)]
struct Cli {
    /// Path to config file (default: ~/.config/manage-slack/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Post yesterday's per-channel activity report
    Summary,

    /// Delete messages and files older than the retention window
    Remove {
        /// Retention window in days
        #[arg(long)]
        days: Option<u32>,
        /// Log what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Check tracked threads for recent replies
    Track {
        /// Tracked thread file
        #[arg(long)]
        data: Option<PathBuf>,
        /// Post the result to the report channel
        #[arg(long)]
        notify: bool,
    },

    /// Show or manage configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Initialize default configuration file
    Init,
    /// Print config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "manage_slack=info,slack_jobs=info,slack_core=info,warn".into()
        }))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        // `config init` may target a file that does not exist yet.
        Some(path) if !path.exists() && matches!(cli.command, Commands::Config { .. }) => {
            AppConfig::default()
        }
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("can not load config {}", path.display()))?,
        None => AppConfig::load()?,
    };
    config.apply_env();

    match cli.command {
        Commands::Summary => {
            let user = user_client(&config)?;
            let bot = bot_client(&config)?;
            let metrics = Pushgateway::from_config(&config.metrics, summary::PUSHER)?;
            let outcome = summary::run(
                &user,
                &bot,
                config.slack.report_channel.as_deref(),
                metrics.as_ref(),
                chrono::Local::now(),
            )
            .await;
            for (host, count) in outcome.activity.top_hosts(5) {
                tracing::debug!("{}: {} links", host, count);
            }
        }
        Commands::Remove { days, dry_run } => {
            if let Some(days) = days {
                config.retention.days = days;
            }
            let user = user_client(&config)?;
            let bot = bot_client(&config)?;
            let metrics = Pushgateway::from_config(&config.metrics, retention::PUSHER)?;
            let options = RetentionOptions {
                days: config.retention.days,
                dry_run,
                start_message: config.retention.start_message.clone(),
                report_channel: config.slack.report_channel.clone(),
            };
            retention::run(&user, &bot, &options, metrics.as_ref(), chrono::Utc::now()).await?;
        }
        Commands::Track { data, notify } => {
            if let Some(data) = data {
                config.tracker.data_file = data;
            }
            let notify = notify || config.tracker.notify;
            let user = user_client(&config)?;
            let tracked = tracker::load_threads(&config.tracker.data_file)?;
            tracing::info!(
                "tracking {} threads from {}",
                tracked.threads.len(),
                config.tracker.data_file.display()
            );
            let options = TrackerOptions::from(&config.tracker);
            let statuses =
                tracker::run(&user, &tracked.threads, &options, chrono::Utc::now()).await;

            if notify {
                match config.slack.report_channel.as_deref() {
                    Some(channel) => {
                        let bot = bot_client(&config)?;
                        if let Err(e) = tracker::notify(&bot, channel, &statuses).await {
                            tracing::warn!("can not post tracker report: {}", e);
                        }
                    }
                    None => tracing::warn!("notify requested but no report channel configured"),
                }
            }
        }
        Commands::Config { action } => {
            handle_config_command(action, &config, cli.config.as_deref())?;
        }
    }

    Ok(())
}

fn user_client(config: &AppConfig) -> Result<SlackClient> {
    let token = config
        .slack
        .user_token
        .clone()
        .context("SLACK_USER_TOKEN is not set")?;
    Ok(SlackClient::new(token, &config.slack)?)
}

fn bot_client(config: &AppConfig) -> Result<SlackClient> {
    let token = config
        .slack
        .bot_token
        .clone()
        .context("SLACK_BOT_TOKEN is not set")?;
    Ok(SlackClient::new(token, &config.slack)?)
}

fn handle_config_command(
    action: Option<ConfigAction>,
    config: &AppConfig,
    explicit_path: Option<&Path>,
) -> Result<()> {
    let path = explicit_path
        .map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::default_path);
    match action {
        Some(ConfigAction::Show) | None => {
            let toml_str = toml::to_string_pretty(&config.redacted())?;
            println!("{}", toml_str);
        }
        Some(ConfigAction::Init) => {
            if path.exists() {
                println!("Config already exists at: {}", path.display());
            } else {
                AppConfig::default().save_to(&path)?;
                println!("Created default config at: {}", path.display());
            }
        }
        Some(ConfigAction::Path) => {
            println!("{}", path.display());
        }
    }
    Ok(())
}
