//! Message and file retention.
//!
//! Deletes history older than the retention window from every channel the
//! user can see, along with thread replies, then deletes old files. Messages
//! with reactions are kept. Every deletion is best effort: failures are logged
//! and counted, and the run moves on.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use slack_analytics::{ReportGenerator, RetentionStats};
use slack_core::error::Result;
use slack_core::types::{HistoryWindow, Message, ThreadTarget};
use slack_core::{ChatApi, Pushgateway};
use tracing::{debug, info, warn};

/// Label attached to pushed retention metrics.
pub const PUSHER: &str = "slack-remover";

/// Options for one retention run.
#[derive(Debug, Clone)]
pub struct RetentionOptions {
    pub days: u32,
    pub dry_run: bool,
    /// Banner posted before the run starts.
    pub start_message: String,
    /// Channel receiving the start banner and the closing summary.
    pub report_channel: Option<String>,
}

/// Run the retention job.
///
/// History is read and deleted with `user`; files and reports go through `bot`.
pub async fn run(
    user: &dyn ChatApi,
    bot: &dyn ChatApi,
    options: &RetentionOptions,
    metrics: Option<&Pushgateway>,
    now: DateTime<Utc>,
) -> Result<RetentionStats> {
    let started = Instant::now();
    let cutoff = (now - Duration::days(i64::from(options.days))).timestamp();
    info!(
        "deleting messages and files older than {} days (before {}){}",
        options.days,
        cutoff,
        if options.dry_run { ", dry run" } else { "" }
    );

    let banner_ts = post_start_banner(bot, options).await;

    let channels = match user.conversations_for_user().await {
        Ok(channels) => channels,
        Err(e) => {
            warn!("can not get channels: {}", e);
            return Err(e);
        }
    };

    let mut stats = RetentionStats::default();
    for channel in &channels {
        let history = match user.history(&channel.id, HistoryWindow::before(cutoff)).await {
            Ok(history) => history,
            Err(e) => {
                warn!("can not get history {}: {}", channel.id, e);
                continue;
            }
        };
        debug!("{}: {} candidate messages", channel.id, history.len());

        for message in &history {
            if message.has_reactions() {
                stats.messages_kept += 1;
                continue;
            }
            if message.has_replies() {
                delete_thread_replies(user, &channel.id, message, options.dry_run, &mut stats).await;
            }
            delete_message(user, &channel.id, &message.ts, options.dry_run, &mut stats).await;
        }
    }

    delete_files(bot, cutoff, options.dry_run, &mut stats).await;

    let elapsed = started.elapsed();
    info!(
        "retention done in {:?}: {} messages deleted, {} failed, {} kept, {} files deleted",
        elapsed, stats.messages_deleted, stats.messages_failed, stats.messages_kept, stats.files_deleted
    );

    if let Some(channel) = options.report_channel.as_deref() {
        let text = ReportGenerator::retention_finished(&stats, elapsed);
        let thread = banner_ts.map(|ts| ThreadTarget {
            thread_ts: ts,
            broadcast: true,
        });
        if let Err(e) = bot.post_message(channel, &text, thread.as_ref()).await {
            warn!("end message can not post: {}", e);
        }
    }

    if let Some(metrics) = metrics {
        metrics
            .push_counter_logged(
                "deleted_messages",
                "messages deleted by the retention job",
                u64::from(stats.messages_deleted),
            )
            .await;
        metrics
            .push_counter_logged(
                "deleted_files",
                "files deleted by the retention job",
                u64::from(stats.files_deleted),
            )
            .await;
        if let Err(e) = metrics
            .push_histogram(
                "remover_duration_seconds",
                "retention run duration",
                elapsed.as_secs_f64(),
            )
            .await
        {
            warn!("can not push remover_duration_seconds: {}", e);
        }
    }

    Ok(stats)
}

/// Post the start banner and return its ts for threading the closing summary.
async fn post_start_banner(bot: &dyn ChatApi, options: &RetentionOptions) -> Option<String> {
    let channel = options.report_channel.as_deref()?;
    let banner =
        ReportGenerator::retention_started(&options.start_message, options.days, options.dry_run);
    match bot.post_message(channel, &banner, None).await {
        Ok(posted) if !posted.ts.is_empty() => Some(posted.ts),
        Ok(_) => None,
        Err(e) => {
            warn!("can not post start message: {}", e);
            None
        }
    }
}

async fn delete_thread_replies(
    api: &dyn ChatApi,
    channel_id: &str,
    root: &Message,
    dry_run: bool,
    stats: &mut RetentionStats,
) {
    let replies = match api.replies(channel_id, &root.ts).await {
        Ok(replies) => replies,
        Err(e) => {
            warn!("can not get replies {}:{}: {}", channel_id, root.ts, e);
            return;
        }
    };
    for reply in replies.iter().filter(|r| r.ts != root.ts) {
        delete_message(api, channel_id, &reply.ts, dry_run, stats).await;
    }
}

async fn delete_message(
    api: &dyn ChatApi,
    channel_id: &str,
    ts: &str,
    dry_run: bool,
    stats: &mut RetentionStats,
) {
    if dry_run {
        info!("would delete message {}:{}", channel_id, ts);
        stats.messages_deleted += 1;
        return;
    }
    match api.delete_message(channel_id, ts).await {
        Ok(()) => stats.messages_deleted += 1,
        Err(e) if e.api_code() == Some("message_not_found") => {
            debug!("message {}:{} already gone", channel_id, ts);
        }
        Err(e) => {
            warn!("can not delete message {}:{}: {}", channel_id, ts, e);
            stats.messages_failed += 1;
        }
    }
}

async fn delete_files(api: &dyn ChatApi, cutoff: i64, dry_run: bool, stats: &mut RetentionStats) {
    let files = match api.files_before(cutoff).await {
        Ok(files) => files,
        Err(e) => {
            warn!("can not get files: {}", e);
            return;
        }
    };
    for file in &files {
        if dry_run {
            info!("would delete file {} ({})", file.id, file.name);
            stats.files_deleted += 1;
            continue;
        }
        match api.delete_file(&file.id).await {
            Ok(()) => stats.files_deleted += 1,
            Err(e) => {
                warn!("can not delete file {}: {}", file.id, e);
                stats.files_failed += 1;
            }
        }
    }
}
