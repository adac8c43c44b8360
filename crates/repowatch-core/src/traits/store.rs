//! Event store trait: persistence used by the polling pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{Event, MonitorConfig, TaskExecution, Watermark};

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append events. Re-appending an existing `(monitor_id, event_id)` is a no-op.
    /// Returns the number of rows actually inserted.
    async fn append_events(&self, monitor_id: &str, events: &[Event]) -> Result<usize>;

    async fn get_watermark(&self, monitor_id: &str) -> Result<Option<Watermark>>;

    /// Advance the watermark. Never moves it backwards.
    async fn set_watermark(&self, monitor_id: &str, watermark: &Watermark) -> Result<()>;

    async fn record_execution(&self, execution: &TaskExecution) -> Result<()>;

    /// Monitors with status = running, in creation order.
    async fn list_running_monitors(&self) -> Result<Vec<MonitorConfig>>;

    /// Set `last_run` and bump the run counter.
    async fn mark_run(&self, monitor_id: &str, at: DateTime<Utc>) -> Result<()>;
}
