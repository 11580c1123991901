//! Push-based metrics export.
//!
//! Every push builds a throwaway Prometheus recorder labelled with the job's
//! `pusher`, records one metric into it and PUTs the rendered exposition to a
//! Pushgateway at `{endpoint}/metrics/job/{job}`. Each metric is pushed under
//! its own job so that runs only replace their own series.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{debug, warn};

use crate::config::MetricsConfig;
use crate::error::{Result, SlackError};

const NAMESPACE: &str = "slack";

/// Prometheus client default buckets, in seconds.
const DEFAULT_BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Sanitize an arbitrary key (e.g. a host name) into a metric name suffix.
pub fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Fully qualified metric name for a key.
pub fn metric_name(key: &str) -> String {
    format!("{}_{}", NAMESPACE, sanitize(key))
}

/// Client for a Pushgateway-compatible collector.
#[derive(Clone)]
pub struct Pushgateway {
    http: reqwest::Client,
    endpoint: String,
    pusher: String,
}

impl Pushgateway {
    /// Build a pusher when an endpoint is configured; `None` disables pushing.
    pub fn from_config(config: &MetricsConfig, pusher: &str) -> Result<Option<Self>> {
        match config.endpoint.as_deref().map(str::trim) {
            Some(endpoint) if !endpoint.is_empty() => {
                let http = reqwest::Client::builder()
                    .timeout(Duration::from_secs(config.timeout_secs.max(1)))
                    .build()?;
                Ok(Some(Self {
                    http,
                    endpoint: endpoint.trim_end_matches('/').to_string(),
                    pusher: pusher.to_string(),
                }))
            }
            _ => Ok(None),
        }
    }

    /// Push a single counter sample.
    pub async fn push_counter(&self, key: &str, help: &str, value: u64) -> Result<()> {
        let name = metric_name(key);
        let help = help.to_string();
        let body = self.render(move || {
            describe_counter!(name.clone(), help);
            counter!(name).absolute(value);
        })?;
        self.push(&sanitize(key), body).await
    }

    /// Push a histogram holding one observation.
    pub async fn push_histogram(&self, key: &str, help: &str, observed: f64) -> Result<()> {
        let name = metric_name(key);
        let help = help.to_string();
        let body = self.render(move || {
            describe_histogram!(name.clone(), help);
            histogram!(name).record(observed);
        })?;
        self.push(&sanitize(key), body).await
    }

    /// Push a counter and log instead of failing.
    pub async fn push_counter_logged(&self, key: &str, help: &str, value: u64) {
        if let Err(e) = self.push_counter(key, help, value).await {
            warn!("can not push {}: {}", key, e);
        }
    }

    /// Run `record` against a fresh recorder and render what it captured.
    fn render(&self, record: impl FnOnce()) -> Result<String> {
        let recorder = PrometheusBuilder::new()
            .add_global_label("pusher", self.pusher.as_str())
            .set_buckets(&DEFAULT_BUCKETS)
            .map_err(|e| SlackError::Metrics(e.to_string()))?
            .build_recorder();
        metrics::with_local_recorder(&recorder, record);
        Ok(recorder.handle().render())
    }

    async fn push(&self, job: &str, body: String) -> Result<()> {
        let url = format!("{}/metrics/job/{}", self.endpoint, job);
        debug!("pushing metrics to {}", url);
        let response = self
            .http
            .put(&url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )
            .body(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SlackError::Metrics(format!(
                "push to {} returned {}",
                url, status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(endpoint: &str) -> Pushgateway {
        let config = MetricsConfig {
            endpoint: Some(endpoint.to_string()),
            timeout_secs: 5,
        };
        Pushgateway::from_config(&config, "slack-daily").unwrap().unwrap()
    }

    #[test]
    fn test_metric_name_sanitizes_hosts() {
        assert_eq!(metric_name("news.ycombinator.com"), "slack_news_ycombinator_com");
        assert_eq!(metric_name("my-site.example"), "slack_my_site_example");
        assert_eq!(metric_name("deleted_messages"), "slack_deleted_messages");
    }

    #[test]
    fn test_disabled_without_endpoint() {
        let config = MetricsConfig::default();
        assert!(Pushgateway::from_config(&config, "x").unwrap().is_none());

        let blank = MetricsConfig {
            endpoint: Some("  ".into()),
            ..Default::default()
        };
        assert!(Pushgateway::from_config(&blank, "x").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_push_counter() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/metrics/job/example_com"))
            .and(body_string_contains("# TYPE slack_example_com counter"))
            .and(body_string_contains("# HELP slack_example_com example.com messages count"))
            .and(body_string_contains("slack_example_com{pusher=\"slack-daily\"} 3"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        gateway(&server.uri())
            .push_counter("example.com", "example.com messages count", 3)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_push_histogram() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/metrics/job/remover_duration_seconds"))
            .and(body_string_contains("# TYPE slack_remover_duration_seconds histogram"))
            .and(body_string_contains("le=\"+Inf\"} 1"))
            .and(body_string_contains("slack_remover_duration_seconds_sum{pusher=\"slack-daily\"} 0.75"))
            .and(body_string_contains("slack_remover_duration_seconds_count{pusher=\"slack-daily\"} 1"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        gateway(&server.uri())
            .push_histogram("remover_duration_seconds", "run duration", 0.75)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_push_failure_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = gateway(&server.uri()).push_counter("x", "x", 1).await;
        assert!(result.is_err());
    }
}
