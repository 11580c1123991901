//! Channel activity aggregation.
//!
//! Tallies a day's messages per channel, per poster and per linked host.

use serde::{Deserialize, Serialize};
use slack_core::types::{Channel, Message};
use std::collections::HashMap;

/// Name used when no poster can be determined.
pub const UNKNOWN_POSTER: &str = "unknown";

/// Activity of a single channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelActivity {
    pub id: String,
    pub name: String,
    /// Messages recorded for this channel.
    pub message_count: u32,
    /// Messages per poster name.
    pub posters: HashMap<String, u32>,
}

impl ChannelActivity {
    pub fn new(channel: &Channel) -> Self {
        Self {
            id: channel.id.clone(),
            name: channel.name.clone(),
            message_count: 0,
            posters: HashMap::new(),
        }
    }

    /// Posters sorted by count descending, then name.
    pub fn ranked_posters(&self) -> Vec<(String, u32)> {
        rank(&self.posters)
    }
}

/// Aggregate of one summary run.
#[derive(Debug, Default, Clone)]
pub struct DailyActivity {
    channels: HashMap<String, ChannelActivity>,
    host_counts: HashMap<String, u32>,
    total_messages: u32,
}

impl DailyActivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a channel's history. Calling it twice for the same channel adds up.
    pub fn record_channel(&mut self, channel: &Channel, messages: &[Message]) {
        let activity = self
            .channels
            .entry(channel.id.clone())
            .or_insert_with(|| ChannelActivity::new(channel));

        for message in messages {
            activity.message_count += 1;
            self.total_messages += 1;

            let poster = poster_name(message, messages);
            *activity.posters.entry(poster).or_insert(0) += 1;

            if let Some(host) = message.link_host() {
                *self.host_counts.entry(host).or_insert(0) += 1;
            }
        }
    }

    /// Channel activities sorted by channel name, then id.
    pub fn channels(&self) -> Vec<&ChannelActivity> {
        let mut channels: Vec<_> = self.channels.values().collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        channels
    }

    pub fn channel(&self, id: &str) -> Option<&ChannelActivity> {
        self.channels.get(id)
    }

    /// Messages recorded for a channel (0 when unknown).
    pub fn message_count(&self, channel_id: &str) -> u32 {
        self.channels
            .get(channel_id)
            .map(|c| c.message_count)
            .unwrap_or(0)
    }

    pub fn total_messages(&self) -> u32 {
        self.total_messages
    }

    pub fn host_counts(&self) -> &HashMap<String, u32> {
        &self.host_counts
    }

    /// Most linked hosts.
    pub fn top_hosts(&self, limit: usize) -> Vec<(String, u32)> {
        let mut hosts = rank(&self.host_counts);
        hosts.truncate(limit);
        hosts
    }
}

/// Resolve who posted `message`, looking at the rest of its thread when the
/// message itself carries no name.
fn poster_name(message: &Message, history: &[Message]) -> String {
    if let Some(name) = message.display_name() {
        return name.to_string();
    }

    if let Some(thread_ts) = message.thread_ts.as_deref().filter(|t| !t.is_empty()) {
        let sibling = history
            .iter()
            .filter(|m| m.thread_ts.as_deref() == Some(thread_ts))
            .find_map(Message::display_name);
        if let Some(name) = sibling {
            return name.to_string();
        }
    }

    message
        .user
        .clone()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| UNKNOWN_POSTER.to_string())
}

fn rank(counts: &HashMap<String, u32>) -> Vec<(String, u32)> {
    let mut sorted: Vec<(String, u32)> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted
}
