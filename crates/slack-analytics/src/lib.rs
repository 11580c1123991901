//! Activity aggregation and report rendering for manage-slack.
//!
//! Turns fetched channel history into per-channel, per-poster and per-host
//! counts, and renders the plain-text messages the jobs post back.

pub mod aggregations;
pub mod reports;

pub use aggregations::{ChannelActivity, DailyActivity};
pub use reports::{ReportGenerator, RetentionStats, ThreadFreshness, ThreadStatus};
