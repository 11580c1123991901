//! Daily channel summary.
//!
//! Counts yesterday's messages per channel and poster, pushes per-host link
//! counters and posts the ranked report to the report channel.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone};
use slack_analytics::{DailyActivity, ReportGenerator};
use slack_core::types::HistoryWindow;
use slack_core::{ChatApi, Pushgateway};
use tracing::{debug, info, warn};

/// Label attached to pushed host counters.
pub const PUSHER: &str = "slack-daily";

/// The calendar day being summarized and its bounds as Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub day: NaiveDate,
    pub oldest: i64,
    pub latest: i64,
}

impl DayWindow {
    /// Yesterday in `now`'s time zone: from its midnight up to today's midnight.
    pub fn yesterday<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let tz = now.timezone();
        let today = now.date_naive();
        let day = today.pred_opt().unwrap_or(today);
        Self {
            day,
            oldest: local_midnight(&tz, day),
            latest: local_midnight(&tz, today),
        }
    }

    pub fn history_window(&self) -> HistoryWindow {
        HistoryWindow::between(self.oldest, self.latest)
    }
}

/// Unix seconds of `day` 00:00 in `tz`.
fn local_midnight<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> i64 {
    let naive = day.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        // Midnight skipped by a DST jump: take the first valid hour.
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|t| t.timestamp())
        .unwrap_or_else(|| naive.and_utc().timestamp())
}

/// What a summary run produced.
#[derive(Debug)]
pub struct SummaryOutcome {
    pub window: DayWindow,
    pub activity: DailyActivity,
    pub report: String,
    pub posted: bool,
}

/// Run the daily summary.
pub async fn run<Tz: TimeZone>(
    user: &dyn ChatApi,
    bot: &dyn ChatApi,
    report_channel: Option<&str>,
    metrics: Option<&Pushgateway>,
    now: DateTime<Tz>,
) -> SummaryOutcome {
    let window = DayWindow::yesterday(&now);
    info!(
        "summarizing {} ({} .. {})",
        window.day, window.oldest, window.latest
    );

    let channels = match user.conversations_for_user().await {
        Ok(channels) => channels,
        Err(e) => {
            warn!("can not get channels: {}", e);
            Vec::new()
        }
    };

    let mut activity = DailyActivity::new();
    for channel in &channels {
        match user.history(&channel.id, window.history_window()).await {
            Ok(messages) => {
                debug!("{} ({}): {} messages", channel.name, channel.id, messages.len());
                activity.record_channel(channel, &messages);
            }
            Err(e) => {
                warn!("can not get history channelID: {}, {}", channel.id, e);
            }
        }
    }

    if let Some(metrics) = metrics {
        for (host, count) in activity.host_counts() {
            metrics
                .push_counter_logged(host, &format!("{} messages count", host), u64::from(*count))
                .await;
        }
    }

    let report = ReportGenerator::daily_report(window.day, &activity);
    let posted = match report_channel {
        Some(channel) => match bot.post_message(channel, &report, None).await {
            Ok(_) => true,
            Err(e) => {
                warn!("can not post: {}", e);
                false
            }
        },
        None => {
            warn!("no report channel configured, printing report instead");
            info!("\n{}", report);
            false
        }
    };

    info!(
        "summary done: {} messages in {} channels",
        activity.total_messages(),
        activity.channels().len()
    );

    SummaryOutcome {
        window,
        activity,
        report,
        posted,
    }
}
