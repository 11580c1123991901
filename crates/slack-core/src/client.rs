//! Slack Web API client.
//!
//! [`ChatApi`] is the seam the jobs are written against; [`SlackClient`] is
//! the HTTP implementation bound to a single token.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SlackApiConfig;
use crate::error::{Result, SlackError};
use crate::types::{Channel, File, HistoryWindow, Message, PostedMessage, ThreadTarget};

/// The Web API operations the jobs need.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Every conversation the token's user is a member of.
    async fn conversations_for_user(&self) -> Result<Vec<Channel>>;

    /// Channel history inside `window`, newest first as returned by the API.
    async fn history(&self, channel_id: &str, window: HistoryWindow) -> Result<Vec<Message>>;

    /// A thread, root message first.
    async fn replies(&self, channel_id: &str, thread_ts: &str) -> Result<Vec<Message>>;

    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        thread: Option<&ThreadTarget>,
    ) -> Result<PostedMessage>;

    async fn delete_message(&self, channel_id: &str, ts: &str) -> Result<()>;

    /// Files created at or before `ts_to` (Unix seconds).
    async fn files_before(&self, ts_to: i64) -> Result<Vec<File>>;

    async fn delete_file(&self, file_id: &str) -> Result<()>;
}

type Params = Vec<(&'static str, String)>;

#[derive(Debug, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

/// A cursor-paginated response body.
trait CursorPage: DeserializeOwned {
    type Item;
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

#[derive(Debug, Deserialize)]
struct ChannelsPage {
    #[serde(default)]
    channels: Vec<Channel>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

impl CursorPage for ChannelsPage {
    type Item = Channel;
    fn into_parts(self) -> (Vec<Channel>, Option<String>) {
        (self.channels, self.response_metadata.map(|m| m.next_cursor))
    }
}

#[derive(Debug, Deserialize)]
struct MessagesPage {
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

impl CursorPage for MessagesPage {
    type Item = Message;
    fn into_parts(self) -> (Vec<Message>, Option<String>) {
        (self.messages, self.response_metadata.map(|m| m.next_cursor))
    }
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    channel: Option<String>,
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    pages: u32,
}

#[derive(Debug, Deserialize)]
struct FilesPage {
    #[serde(default)]
    files: Vec<File>,
    paging: Option<Paging>,
}

/// HTTP client for one token.
#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    conversation_types: String,
    page_size: u32,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl SlackClient {
    pub fn new(token: impl Into<String>, config: &SlackApiConfig) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(SlackError::Config("token is empty".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent("manage-slack/0.1")
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
            conversation_types: config.conversation_types.clone(),
            page_size: config.page_size.max(1),
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms,
        })
    }

    /// Call a Web API method and decode its body, mapping `ok: false` to
    /// [`SlackError::Api`].
    async fn call<T: DeserializeOwned>(&self, method: &str, params: &[(&'static str, String)]) -> Result<T> {
        let url = format!("{}/{}", self.api_base, method);
        let mut attempt = 0_usize;
        let response = loop {
            attempt += 1;
            let sent = self
                .http
                .post(&url)
                .bearer_auth(&self.token)
                .form(params)
                .send()
                .await;
            match sent {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        break response;
                    }
                    if attempt < self.retry_max_attempts && is_retryable_status(status.as_u16()) {
                        let delay = retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            parse_retry_after(response.headers()),
                        );
                        warn!("{} returned {}, retrying in {:?}", method, status, delay);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(SlackError::Api {
                        method: method.to_string(),
                        code: format!("http_{}", status.as_u16()),
                    });
                }
                Err(e) => {
                    if attempt < self.retry_max_attempts && (e.is_timeout() || e.is_connect()) {
                        let delay = retry_delay(self.retry_base_delay_ms, attempt, None);
                        warn!("{} request failed: {}, retrying in {:?}", method, e, delay);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(SlackError::Http(e));
                }
            }
        };

        let body: Value = response.json().await?;
        if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            let code = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            return Err(SlackError::Api {
                method: method.to_string(),
                code: code.to_string(),
            });
        }
        Ok(serde_json::from_value(body)?)
    }

    /// Follow `response_metadata.next_cursor` until it is empty.
    async fn paginate<P: CursorPage>(&self, method: &str, params: Params) -> Result<Vec<P::Item>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut page_params = params.clone();
            if let Some(c) = &cursor {
                page_params.push(("cursor", c.clone()));
            }
            let page: P = self.call(method, &page_params).await?;
            let (mut batch, next) = page.into_parts();
            debug!("{}: fetched {} items", method, batch.len());
            items.append(&mut batch);

            match next.filter(|c| !c.is_empty()) {
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    warn!("{}: cursor did not advance, stopping", method);
                    break;
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl ChatApi for SlackClient {
    async fn conversations_for_user(&self) -> Result<Vec<Channel>> {
        let params = vec![
            ("types", self.conversation_types.clone()),
            ("exclude_archived", "true".to_string()),
            ("limit", self.page_size.min(1000).to_string()),
        ];
        self.paginate::<ChannelsPage>("users.conversations", params).await
    }

    async fn history(&self, channel_id: &str, window: HistoryWindow) -> Result<Vec<Message>> {
        let mut params = vec![
            ("channel", channel_id.to_string()),
            ("limit", self.page_size.to_string()),
        ];
        if let Some(oldest) = window.oldest {
            params.push(("oldest", oldest.to_string()));
        }
        if let Some(latest) = window.latest {
            params.push(("latest", latest.to_string()));
        }
        self.paginate::<MessagesPage>("conversations.history", params).await
    }

    async fn replies(&self, channel_id: &str, thread_ts: &str) -> Result<Vec<Message>> {
        let params = vec![
            ("channel", channel_id.to_string()),
            ("ts", thread_ts.to_string()),
            ("limit", self.page_size.to_string()),
        ];
        self.paginate::<MessagesPage>("conversations.replies", params).await
    }

    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        thread: Option<&ThreadTarget>,
    ) -> Result<PostedMessage> {
        let mut params = vec![
            ("channel", channel_id.to_string()),
            ("text", text.to_string()),
        ];
        if let Some(thread) = thread {
            params.push(("thread_ts", thread.thread_ts.clone()));
            if thread.broadcast {
                params.push(("reply_broadcast", "true".to_string()));
            }
        }
        let response: PostMessageResponse = self.call("chat.postMessage", &params).await?;
        Ok(PostedMessage {
            channel: response.channel.unwrap_or_else(|| channel_id.to_string()),
            ts: response.ts.unwrap_or_default(),
        })
    }

    async fn delete_message(&self, channel_id: &str, ts: &str) -> Result<()> {
        let params = vec![("channel", channel_id.to_string()), ("ts", ts.to_string())];
        let _: Value = self.call("chat.delete", &params).await?;
        Ok(())
    }

    async fn files_before(&self, ts_to: i64) -> Result<Vec<File>> {
        let mut files = Vec::new();
        let mut page = 1_u32;
        loop {
            let params = vec![
                ("ts_to", ts_to.to_string()),
                ("count", self.page_size.min(1000).to_string()),
                ("page", page.to_string()),
            ];
            let response: FilesPage = self.call("files.list", &params).await?;
            files.extend(response.files);
            match response.paging {
                Some(paging) if page < paging.pages => page += 1,
                _ => break,
            }
        }
        Ok(files)
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        let params = vec![("file", file_id.to_string())];
        let _: Value = self.call("files.delete", &params).await?;
        Ok(())
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn retry_delay(base_delay_ms: u64, attempt: usize, retry_after_secs: Option<u64>) -> Duration {
    if let Some(secs) = retry_after_secs {
        return Duration::from_secs(secs);
    }
    let exponent = attempt.saturating_sub(1).min(6) as u32;
    Duration::from_millis(base_delay_ms.saturating_mul(2_u64.pow(exponent)))
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}
