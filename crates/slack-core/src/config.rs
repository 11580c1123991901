use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Retention window used when `DAYS` is missing or unparsable.
pub const DEFAULT_RETENTION_DAYS: u32 = 3;

/// Top-level application configuration, loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub slack: SlackApiConfig,
    pub retention: RetentionConfig,
    pub tracker: TrackerConfig,
    pub metrics: MetricsConfig,
}

impl AppConfig {
    /// Load configuration from default path (~/.config/manage-slack/config.toml),
    /// falling back to defaults if the file doesn't exist.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Write current configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("manage-slack")
            .join("config.toml")
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("SLACK_USER_TOKEN") {
            self.slack.user_token = Some(token);
        }
        if let Some(token) = get("SLACK_BOT_TOKEN") {
            self.slack.bot_token = Some(token);
        }
        if let Some(channel) = get("SLACK_CHANNEL_ID") {
            self.slack.report_channel = Some(channel);
        }
        if let Some(base) = get("SLACK_API_BASE") {
            self.slack.api_base = base;
        }
        if let Some(endpoint) = get("OTEL_EXPORTER_OTLP_METRICS_ENDPOINT") {
            self.metrics.endpoint = Some(endpoint);
        }
        if let Some(days) = lookup("DAYS") {
            self.retention.days = parse_days(&days);
        }
    }

    /// Masked copy suitable for printing.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        let mask = |t: &mut Option<String>| {
            if t.is_some() {
                *t = Some("********".into());
            }
        };
        mask(&mut copy.slack.user_token);
        mask(&mut copy.slack.bot_token);
        copy
    }
}

/// Parse a retention window in days, falling back to the default on bad input.
pub fn parse_days(raw: &str) -> u32 {
    match raw.trim().parse::<u32>() {
        Ok(days) => days,
        Err(e) => {
            warn!(
                "env DAYS is invalid ({:?}): {}, using {}",
                raw, e, DEFAULT_RETENTION_DAYS
            );
            DEFAULT_RETENTION_DAYS
        }
    }
}

/// Web API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackApiConfig {
    /// Base URL of the Web API.
    pub api_base: String,
    /// Token used to read channels and history.
    pub user_token: Option<String>,
    /// Token used to post reports and delete files.
    pub bot_token: Option<String>,
    /// Channel that receives reports.
    pub report_channel: Option<String>,
    /// Conversation types passed to `users.conversations`.
    pub conversation_types: String,
    /// Page size for cursor-paginated calls.
    pub page_size: u32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Attempts per request, including the first.
    pub retry_max_attempts: usize,
    /// Base delay for exponential backoff.
    pub retry_base_delay_ms: u64,
}

impl Default for SlackApiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://slack.com/api".into(),
            user_token: None,
            bot_token: None,
            report_channel: None,
            conversation_types: "public_channel".into(),
            page_size: 1000,
            timeout_secs: 30,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

/// Message and file retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Messages and files older than this many days are deleted.
    pub days: u32,
    /// Text of the banner posted when a run starts.
    pub start_message: String,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: DEFAULT_RETENTION_DAYS,
            start_message: "Starting retention run".into(),
        }
    }
}

/// Thread tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// JSON file listing the tracked threads.
    pub data_file: PathBuf,
    /// A thread with a reply newer than this is reported as updated.
    pub updated_within_hours: i64,
    /// A thread whose latest reply is older than this is reported as stale.
    pub stale_after_hours: i64,
    /// Post the tracker report to the report channel.
    pub notify: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("data.json"),
            updated_within_hours: 24,
            stale_after_hours: 48,
            notify: false,
        }
    }
}

/// Metrics push settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Pushgateway base URL. Pushing is disabled when unset.
    pub endpoint: Option<String>,
    /// Per-push timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("https://slack.com/api"));
        assert!(toml_str.contains("public_channel"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.retention.days, config.retention.days);
        assert_eq!(parsed.slack.page_size, config.slack.page_size);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: AppConfig = toml::from_str("[retention]\ndays = 7\n").unwrap();
        assert_eq!(parsed.retention.days, 7);
        assert_eq!(parsed.tracker.stale_after_hours, 48);
        assert_eq!(parsed.slack.retry_max_attempts, 3);
    }

    #[test]
    fn test_load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = AppConfig::default();
        config.slack.report_channel = Some("C0REPORT".into());
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.slack.report_channel.as_deref(), Some("C0REPORT"));
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("SLACK_USER_TOKEN", "xoxp-user"),
            ("SLACK_BOT_TOKEN", "xoxb-bot"),
            ("SLACK_CHANNEL_ID", "C123"),
            ("DAYS", "10"),
            ("OTEL_EXPORTER_OTLP_METRICS_ENDPOINT", "http://push:9091"),
        ]);
        let mut config = AppConfig::default();
        config.apply_env_with(|k| vars.get(k).cloned());

        assert_eq!(config.slack.user_token.as_deref(), Some("xoxp-user"));
        assert_eq!(config.slack.bot_token.as_deref(), Some("xoxb-bot"));
        assert_eq!(config.slack.report_channel.as_deref(), Some("C123"));
        assert_eq!(config.retention.days, 10);
        assert_eq!(config.metrics.endpoint.as_deref(), Some("http://push:9091"));
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let vars = env(&[("SLACK_CHANNEL_ID", ""), ("OTEL_EXPORTER_OTLP_METRICS_ENDPOINT", " ")]);
        let mut config = AppConfig::default();
        config.slack.report_channel = Some("CFILE".into());
        config.apply_env_with(|k| vars.get(k).cloned());

        assert_eq!(config.slack.report_channel.as_deref(), Some("CFILE"));
        assert!(config.metrics.endpoint.is_none());
    }

    #[test]
    fn test_invalid_days_falls_back() {
        assert_eq!(parse_days("abc"), DEFAULT_RETENTION_DAYS);
        assert_eq!(parse_days(""), DEFAULT_RETENTION_DAYS);
        assert_eq!(parse_days(" 5 "), 5);
    }

    #[test]
    fn test_redacted_masks_tokens() {
        let mut config = AppConfig::default();
        config.slack.bot_token = Some("xoxb-secret".into());
        let shown = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!shown.contains("xoxb-secret"));
        assert!(shown.contains("********"));
    }
}
