//! Plain-text report generation for chat messages.

use crate::aggregations::DailyActivity;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Counters collected by a retention run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionStats {
    /// Messages deleted, including thread replies.
    pub messages_deleted: u32,
    /// Deletions that failed with an error other than `message_not_found`.
    pub messages_failed: u32,
    /// Messages left in place because they carry reactions.
    pub messages_kept: u32,
    pub files_deleted: u32,
    pub files_failed: u32,
}

/// Freshness of a tracked thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadFreshness {
    /// A reply arrived recently.
    Updated,
    /// No recent reply, but not stale yet.
    Quiet,
    /// The latest reply is too old.
    Stale,
}

/// One tracked thread after checking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadStatus {
    pub label: String,
    pub channel_id: String,
    pub thread_ts: String,
    pub latest: Option<chrono::DateTime<chrono::Utc>>,
    pub freshness: ThreadFreshness,
}

/// Report generator for chat message bodies.
pub struct ReportGenerator;

impl ReportGenerator {
    /// Daily activity report: date, weekday, total, then per-channel posters.
    pub fn daily_report(day: NaiveDate, activity: &DailyActivity) -> String {
        let mut report = format!(
            "{}\n{}\n{}\n",
            day.format("%Y-%m-%d"),
            day.format("%A"),
            activity.total_messages()
        );

        for channel in activity.channels() {
            if channel.posters.is_empty() {
                continue;
            }
            report.push_str(&format!("\n<#{}>\n", channel.id));
            for (name, count) in channel.ranked_posters() {
                report.push_str(&format!("{} : {}\n", name, count));
            }
        }

        report
    }

    /// Opening banner of a retention run.
    pub fn retention_started(message: &str, days: u32, dry_run: bool) -> String {
        let mut banner = format!("{}\nretention: {} days", message, days);
        if dry_run {
            banner.push_str(" (dry run)");
        }
        banner
    }

    /// Closing message of a retention run.
    pub fn retention_finished(stats: &RetentionStats, elapsed: Duration) -> String {
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            stats.messages_deleted as f64 / secs
        } else {
            0.0
        };

        let mut report = String::from("Retention run finished\n");
        report.push_str(&format!("{}\n", format_elapsed(elapsed)));
        report.push_str(&format!("message count: {}\n", stats.messages_deleted));
        report.push_str(&format!("avg: {:.3}/s\n", rate));
        if stats.messages_failed > 0 {
            report.push_str(&format!("failed: {}\n", stats.messages_failed));
        }
        if stats.messages_kept > 0 {
            report.push_str(&format!("kept (reacted): {}\n", stats.messages_kept));
        }
        report.push_str(&format!("file count: {}", stats.files_deleted));
        if stats.files_failed > 0 {
            report.push_str(&format!("\nfile failures: {}", stats.files_failed));
        }
        report
    }

    /// List of stale tracked threads.
    pub fn tracker_report(statuses: &[ThreadStatus]) -> String {
        let stale: Vec<_> = statuses
            .iter()
            .filter(|s| s.freshness == ThreadFreshness::Stale)
            .collect();

        if stale.is_empty() {
            return format!("All {} tracked threads are fresh", statuses.len());
        }

        let mut report = format!("{} of {} tracked threads are stale\n", stale.len(), statuses.len());
        for status in stale {
            let latest = status
                .latest
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            report.push_str(&format!("- {} (latest {})\n", status.label, latest));
        }
        report
    }
}

/// Format a duration as `"1h 2m 3.456s"`, omitting leading zero units.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = (total % 60) as f64 + f64::from(elapsed.subsec_millis()) / 1000.0;

    if hours > 0 {
        format!("{}h {}m {:.3}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:.3}s", minutes, seconds)
    } else {
        format!("{:.3}s", seconds)
    }
}
