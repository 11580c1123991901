//! In-memory [`ChatApi`] used by the job tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use slack_core::error::{Result, SlackError};
use slack_core::types::{Channel, File, HistoryWindow, Message, PostedMessage, ThreadTarget};
use slack_core::ChatApi;

fn api_error(method: &str, code: &str) -> SlackError {
    SlackError::Api {
        method: method.to_string(),
        code: code.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posted {
    pub channel: String,
    pub text: String,
    pub thread: Option<ThreadTarget>,
}

#[derive(Default)]
pub struct FakeChat {
    /// `None` makes `users.conversations` fail.
    pub channels: Option<Vec<Channel>>,
    /// Channels without an entry fail with `channel_not_found`.
    pub history: HashMap<String, Vec<Message>>,
    /// Keyed by (channel, thread ts). Missing threads fail with `thread_not_found`.
    pub replies: HashMap<(String, String), Vec<Message>>,
    /// `None` makes `files.list` fail.
    pub files: Option<Vec<File>>,
    /// Error code returned by `chat.delete` for a given ts.
    pub delete_errors: HashMap<String, String>,
    pub failing_files: HashSet<String>,
    pub fail_posts: bool,
    /// Fail only the first N `chat.postMessage` calls.
    pub fail_first_posts: usize,
    pub post_attempts: Mutex<usize>,

    pub posted: Mutex<Vec<Posted>>,
    pub deleted: Mutex<Vec<(String, String)>>,
    pub deleted_files: Mutex<Vec<String>>,
    pub windows: Mutex<Vec<(String, HistoryWindow)>>,
}

impl FakeChat {
    pub fn with_channels(channels: Vec<Channel>) -> Self {
        Self {
            channels: Some(channels),
            files: Some(Vec::new()),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, channel_id: &str, messages: Vec<Message>) -> Self {
        self.history.insert(channel_id.to_string(), messages);
        self
    }

    pub fn with_thread(mut self, channel_id: &str, thread_ts: &str, messages: Vec<Message>) -> Self {
        self.replies
            .insert((channel_id.to_string(), thread_ts.to_string()), messages);
        self
    }

    pub fn posted(&self) -> Vec<Posted> {
        self.posted.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<(String, String)> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn deleted_files(&self) -> Vec<String> {
        self.deleted_files.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatApi for FakeChat {
    async fn conversations_for_user(&self) -> Result<Vec<Channel>> {
        self.channels
            .clone()
            .ok_or_else(|| api_error("users.conversations", "invalid_auth"))
    }

    async fn history(&self, channel_id: &str, window: HistoryWindow) -> Result<Vec<Message>> {
        self.windows
            .lock()
            .unwrap()
            .push((channel_id.to_string(), window));
        self.history
            .get(channel_id)
            .cloned()
            .ok_or_else(|| api_error("conversations.history", "channel_not_found"))
    }

    async fn replies(&self, channel_id: &str, thread_ts: &str) -> Result<Vec<Message>> {
        self.replies
            .get(&(channel_id.to_string(), thread_ts.to_string()))
            .cloned()
            .ok_or_else(|| api_error("conversations.replies", "thread_not_found"))
    }

    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        thread: Option<&ThreadTarget>,
    ) -> Result<PostedMessage> {
        let attempt = {
            let mut attempts = self.post_attempts.lock().unwrap();
            *attempts += 1;
            *attempts
        };
        if self.fail_posts || attempt <= self.fail_first_posts {
            return Err(api_error("chat.postMessage", "not_in_channel"));
        }
        let mut posted = self.posted.lock().unwrap();
        posted.push(Posted {
            channel: channel_id.to_string(),
            text: text.to_string(),
            thread: thread.cloned(),
        });
        Ok(PostedMessage {
            channel: channel_id.to_string(),
            ts: format!("9000000000.{:06}", posted.len()),
        })
    }

    async fn delete_message(&self, channel_id: &str, ts: &str) -> Result<()> {
        if let Some(code) = self.delete_errors.get(ts) {
            return Err(api_error("chat.delete", code));
        }
        self.deleted
            .lock()
            .unwrap()
            .push((channel_id.to_string(), ts.to_string()));
        Ok(())
    }

    async fn files_before(&self, ts_to: i64) -> Result<Vec<File>> {
        let files = self
            .files
            .clone()
            .ok_or_else(|| api_error("files.list", "invalid_auth"))?;
        Ok(files.into_iter().filter(|f| f.created <= ts_to).collect())
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        if self.failing_files.contains(file_id) {
            return Err(api_error("files.delete", "file_deleted"));
        }
        self.deleted_files.lock().unwrap().push(file_id.to_string());
        Ok(())
    }
}
