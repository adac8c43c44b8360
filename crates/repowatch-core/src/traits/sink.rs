//! Notification sink trait: delivers a batch of new events.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Event, RepoIdentity};

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Sink name (e.g., "dingtalk").
    fn name(&self) -> &str;

    /// Deliver one batch. Events are ordered oldest → newest.
    async fn send(&self, monitor_id: &str, repo: &RepoIdentity, events: &[Event]) -> Result<()>;
}
