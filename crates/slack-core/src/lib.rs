pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

pub use client::{ChatApi, SlackClient};
pub use config::AppConfig;
pub use error::SlackError;
pub use metrics::Pushgateway;
