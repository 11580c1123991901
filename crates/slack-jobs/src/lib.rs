//! Batch jobs for manage-slack.
//!
//! Each job talks to the Web API only through [`slack_core::ChatApi`], takes
//! the current time as an argument and logs per-item failures instead of
//! aborting.

pub mod retention;
pub mod summary;
pub mod tracker;

#[cfg(test)]
mod fake;
