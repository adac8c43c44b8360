//! # RepoWatch Channels
//!
//! Notification sinks. Each channel renders a batch of new events and
//! reports delivery success or failure back to the task runner.

pub mod dingtalk;
pub mod format;

pub use dingtalk::DingTalkSink;
pub use format::{MarkdownMessage, render_batch};
