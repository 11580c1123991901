use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlackError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The Web API answered with `ok: false`.
    #[error("{method} failed: {code}")]
    Api { method: String, code: String },

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Invalid permalink: {0}")]
    InvalidPermalink(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl SlackError {
    /// The Slack error code (e.g. `message_not_found`) when this is an API error.
    pub fn api_code(&self) -> Option<&str> {
        match self {
            SlackError::Api { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SlackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = SlackError::Api {
            method: "chat.delete".into(),
            code: "message_not_found".into(),
        };
        assert_eq!(err.to_string(), "chat.delete failed: message_not_found");
        assert_eq!(err.api_code(), Some("message_not_found"));
    }

    #[test]
    fn test_non_api_error_has_no_code() {
        let err = SlackError::Config("missing token".into());
        assert!(err.api_code().is_none());
    }
}
