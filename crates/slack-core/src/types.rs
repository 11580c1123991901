//! Web API data types.
//!
//! Only the fields the jobs read are modelled; everything else in the
//! payloads is ignored during deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A channel (conversation) visible to the user token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl Channel {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Profile attached to messages posted by apps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotProfile {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub name: String,
}

/// A message from channel history or a thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub user: Option<String>,
    pub username: Option<String>,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub reply_count: u32,
    pub reactions: Vec<Reaction>,
    pub bot_profile: Option<BotProfile>,
}

impl Message {
    /// Poster name carried on the message itself: `username`, then the bot
    /// profile name.
    pub fn display_name(&self) -> Option<&str> {
        if let Some(name) = self.username.as_deref().filter(|n| !n.is_empty()) {
            return Some(name);
        }
        self.bot_profile
            .as_ref()
            .map(|p| p.name.as_str())
            .filter(|n| !n.is_empty())
    }

    /// Host of the link the message starts with, e.g. `<https://example.com/a|title>`.
    pub fn link_host(&self) -> Option<String> {
        if !self.text.starts_with("<http") {
            return None;
        }
        let inner = &self.text[1..];
        let end = inner.find(|c: char| c == '|' || c == '>').unwrap_or(inner.len());
        let parsed = Url::parse(&inner[..end]).ok()?;
        parsed.host_str().map(|h| h.to_string())
    }

    pub fn has_reactions(&self) -> bool {
        !self.reactions.is_empty()
    }

    pub fn has_replies(&self) -> bool {
        self.reply_count > 0
    }

    /// Parsed `ts`.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_ts(&self.ts)
    }
}

/// A file uploaded to the workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Creation time as Unix seconds.
    #[serde(default)]
    pub created: i64,
}

/// Result of `chat.postMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

/// Where a posted message goes inside a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadTarget {
    pub thread_ts: String,
    /// Also show the reply in the channel.
    pub broadcast: bool,
}

/// Time bounds for `conversations.history`, as Unix seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryWindow {
    pub oldest: Option<i64>,
    pub latest: Option<i64>,
}

impl HistoryWindow {
    pub fn between(oldest: i64, latest: i64) -> Self {
        Self {
            oldest: Some(oldest),
            latest: Some(latest),
        }
    }

    pub fn before(latest: i64) -> Self {
        Self {
            oldest: None,
            latest: Some(latest),
        }
    }
}

/// Parse a `"<seconds>.<micros>"` timestamp.
pub fn parse_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = match ts.split_once('.') {
        Some((s, f)) => (s, f),
        None => (ts, ""),
    };
    let secs: i64 = secs.parse().ok()?;
    let nanos = if frac.is_empty() {
        0
    } else {
        if frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let padded = format!("{:0<9}", frac);
        padded.parse::<u32>().ok()?
    };
    DateTime::from_timestamp(secs, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_msg(text: &str) -> Message {
        Message {
            text: text.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_ts() {
        let t = parse_ts("1503435956.000247").unwrap();
        assert_eq!(t.timestamp(), 1503435956);
        assert_eq!(t.timestamp_subsec_micros(), 247);
        assert_eq!(parse_ts("1503435956").unwrap().timestamp(), 1503435956);
    }

    #[test]
    fn test_parse_ts_rejects_garbage() {
        assert!(parse_ts("").is_none());
        assert!(parse_ts("abc.def").is_none());
        assert!(parse_ts("12.3x").is_none());
    }

    #[test]
    fn test_link_host() {
        assert_eq!(
            text_msg("<https://example.com/path|Example>").link_host().as_deref(),
            Some("example.com")
        );
        assert_eq!(
            text_msg("<http://news.ycombinator.com/item?id=1>").link_host().as_deref(),
            Some("news.ycombinator.com")
        );
        assert!(text_msg("see <https://example.com>").link_host().is_none());
        assert!(text_msg("plain text").link_host().is_none());
        assert!(text_msg("<http:|broken>").link_host().is_none());
    }

    #[test]
    fn test_display_name_precedence() {
        let mut msg = Message {
            username: Some("rss".into()),
            bot_profile: Some(BotProfile { name: "bot".into() }),
            ..Default::default()
        };
        assert_eq!(msg.display_name(), Some("rss"));

        msg.username = None;
        assert_eq!(msg.display_name(), Some("bot"));

        msg.bot_profile = Some(BotProfile::default());
        assert_eq!(msg.display_name(), None);
    }

    #[test]
    fn test_message_deserializes_sparse_payload() {
        let msg: Message = serde_json::from_value(serde_json::json!({
            "type": "message",
            "subtype": "bot_message",
            "ts": "1.000001",
            "reactions": [{"name": "eyes", "count": 2, "users": ["U1"]}],
            "reply_count": 3
        }))
        .unwrap();
        assert!(msg.has_reactions());
        assert!(msg.has_replies());
        assert!(msg.user.is_none());
        assert_eq!(msg.text, "");
    }
}
