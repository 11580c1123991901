//! Tracked thread freshness.
//!
//! Reads a list of threads from a JSON file and reports which of them have
//! not received a reply for too long.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use slack_analytics::{ReportGenerator, ThreadFreshness, ThreadStatus};
use slack_core::config::TrackerConfig;
use slack_core::error::{Result, SlackError};
use slack_core::types::PostedMessage;
use slack_core::ChatApi;
use tracing::{debug, info, warn};
use url::Url;

/// Contents of the tracked-thread file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedThreads {
    #[serde(default)]
    pub threads: Vec<TrackedThread>,
}

/// One tracked thread, given as a permalink or as explicit ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackedThread {
    pub url: String,
    pub channel_id: String,
    pub thread_ts: String,
}

impl TrackedThread {
    fn is_empty(&self) -> bool {
        self.url.is_empty() && self.channel_id.is_empty() && self.thread_ts.is_empty()
    }

    /// Channel and thread ts to query. A parsable permalink wins over the
    /// explicit fields.
    fn target(&self) -> Option<(String, String)> {
        let (channel, ts) = if self.url.is_empty() {
            (self.channel_id.clone(), self.thread_ts.clone())
        } else {
            match parse_permalink(&self.url) {
                Ok(target) => target,
                Err(e) => {
                    warn!("{}", e);
                    (self.channel_id.clone(), self.thread_ts.clone())
                }
            }
        };
        if channel.is_empty() || ts.is_empty() {
            return None;
        }
        Some((channel, ts))
    }

    fn label(&self, channel: &str, ts: &str) -> String {
        if self.url.is_empty() {
            format!("{}/{}", channel, ts)
        } else {
            self.url.clone()
        }
    }
}

/// Load the tracked-thread file.
pub fn load_threads(path: &Path) -> Result<TrackedThreads> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SlackError::Config(format!(
                "{} does not exist",
                path.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };
    if metadata.is_dir() {
        return Err(SlackError::Config(format!(
            "{} is not a file",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Extract `(channel, thread ts)` from a message permalink such as
/// `https://team.slack.com/archives/C0123/p1503435956000247`.
///
/// Reply links carry the thread root in a `thread_ts` query parameter, which
/// takes precedence over the message id in the path.
pub fn parse_permalink(permalink: &str) -> Result<(String, String)> {
    let invalid = || SlackError::InvalidPermalink(permalink.to_string());

    let url = Url::parse(permalink).map_err(|_| invalid())?;
    let mut segments = url.path_segments().ok_or_else(invalid)?;
    segments.find(|s| *s == "archives").ok_or_else(invalid)?;
    let channel = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    let digits = segments
        .next()
        .and_then(|s| s.strip_prefix('p'))
        .filter(|d| d.len() > 6 && d.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(invalid)?;

    let (secs, micros) = digits.split_at(digits.len() - 6);
    let ts = url
        .query_pairs()
        .find(|(k, v)| k == "thread_ts" && !v.is_empty())
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| format!("{}.{}", secs, micros));

    Ok((channel.to_string(), ts))
}

/// Freshness of a thread whose newest reply is `latest`.
pub fn classify(
    latest: DateTime<Utc>,
    now: DateTime<Utc>,
    updated_within_hours: i64,
    stale_after_hours: i64,
) -> ThreadFreshness {
    if latest > now - Duration::hours(updated_within_hours) {
        ThreadFreshness::Updated
    } else if latest < now - Duration::hours(stale_after_hours) {
        ThreadFreshness::Stale
    } else {
        ThreadFreshness::Quiet
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerOptions {
    pub updated_within_hours: i64,
    pub stale_after_hours: i64,
}

impl From<&TrackerConfig> for TrackerOptions {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            updated_within_hours: config.updated_within_hours,
            stale_after_hours: config.stale_after_hours,
        }
    }
}

/// Check every tracked thread. Threads that can not be resolved or fetched
/// are logged and left out of the result.
pub async fn run(
    api: &dyn ChatApi,
    threads: &[TrackedThread],
    options: &TrackerOptions,
    now: DateTime<Utc>,
) -> Vec<ThreadStatus> {
    let mut statuses = Vec::new();

    for thread in threads {
        if thread.is_empty() {
            warn!("url, channel_id and thread_ts are all empty");
            continue;
        }
        let Some((channel_id, thread_ts)) = thread.target() else {
            warn!("channel_id or thread_ts is empty: {:?}", thread);
            continue;
        };
        let label = thread.label(&channel_id, &thread_ts);

        let replies = match api.replies(&channel_id, &thread_ts).await {
            Ok(replies) => replies,
            Err(e) => {
                warn!("can not get messages {}: {}", label, e);
                continue;
            }
        };
        if replies.is_empty() {
            warn!("no replies found {}", label);
            continue;
        }

        let latest = replies.iter().filter_map(|m| m.timestamp()).max();
        let freshness = match latest {
            Some(latest) => classify(
                latest,
                now,
                options.updated_within_hours,
                options.stale_after_hours,
            ),
            None => ThreadFreshness::Stale,
        };

        match freshness {
            ThreadFreshness::Updated => info!("updated {}", label),
            ThreadFreshness::Quiet => debug!("quiet {}", label),
            ThreadFreshness::Stale => info!(
                "too old {} latest {}",
                label,
                latest.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into())
            ),
        }

        statuses.push(ThreadStatus {
            label,
            channel_id,
            thread_ts,
            latest,
            freshness,
        });
    }

    statuses
}

/// Post the tracker report to `channel`.
pub async fn notify(
    bot: &dyn ChatApi,
    channel: &str,
    statuses: &[ThreadStatus],
) -> Result<PostedMessage> {
    let report = ReportGenerator::tracker_report(statuses);
    bot.post_message(channel, &report, None).await
}
