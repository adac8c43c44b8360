//! Task runner: executes one polling cycle for one monitor.
//!
//! fetch → dedup → persist → notify → advance watermark → mark run → record.
//! Every internal failure is folded into the returned `TaskExecution`; exactly
//! one execution record is written per invocation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use repowatch_core::error::RepoWatchError;
use repowatch_core::traits::{EventSource, EventStore, NotificationSink};
use repowatch_core::types::{Event, ExecutionOutcome, MonitorConfig, TaskExecution};

use crate::dedup;
use crate::rate_limit::RateLimitGuard;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a cycle stopped early.
enum CycleError {
    /// Fetch or persistence failed; nothing past the failing step happened.
    Failed(RepoWatchError),
    /// Events are stored but the batch was not delivered.
    Undelivered(RepoWatchError),
}

#[derive(Default)]
struct Tally {
    fetched: usize,
    new_events: usize,
}

pub struct TaskRunner {
    source: Arc<dyn EventSource>,
    store: Arc<dyn EventStore>,
    sink: Arc<dyn NotificationSink>,
    guard: Arc<RateLimitGuard>,
    fetch_timeout: Duration,
    notify_timeout: Duration,
}

impl TaskRunner {
    pub fn new(
        source: Arc<dyn EventSource>,
        store: Arc<dyn EventStore>,
        sink: Arc<dyn NotificationSink>,
        guard: Arc<RateLimitGuard>,
    ) -> Self {
        Self {
            source,
            store,
            sink,
            guard,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    /// Bound the two network suspension points.
    pub fn with_timeouts(mut self, fetch: Duration, notify: Duration) -> Self {
        self.fetch_timeout = fetch;
        self.notify_timeout = notify;
        self
    }

    pub fn guard(&self) -> &Arc<RateLimitGuard> {
        &self.guard
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Run one cycle. `fired_at` becomes the monitor's `last_run`.
    pub async fn run(&self, monitor: &MonitorConfig, fired_at: DateTime<Utc>) -> TaskExecution {
        let started_at = Utc::now();
        tracing::info!(
            "🔄 Cycle start: '{}' ({}) on {} via {}",
            monitor.name,
            monitor.id,
            monitor.repo,
            self.source.name()
        );

        let mut tally = Tally::default();
        let (mut outcome, mut error) = match self.cycle(monitor, &mut tally).await {
            Ok(()) => (ExecutionOutcome::Success, None),
            Err(CycleError::Undelivered(e)) => (ExecutionOutcome::Partial, Some(e.to_string())),
            Err(CycleError::Failed(e)) => (ExecutionOutcome::Error, Some(e.to_string())),
        };

        // Unconditional, so a failing monitor waits for its next fire time.
        if let Err(e) = self.store.mark_run(&monitor.id, fired_at).await {
            tracing::warn!("⚠️ Failed to update last run for {}: {e}", monitor.id);
            if outcome != ExecutionOutcome::Error {
                outcome = ExecutionOutcome::Error;
                error = Some(e.to_string());
            }
        }

        let execution = TaskExecution {
            monitor_id: monitor.id.clone(),
            started_at,
            finished_at: Utc::now(),
            fetched: tally.fetched,
            new_events: tally.new_events,
            outcome,
            error,
        };
        self.record(&execution).await;
        execution
    }

    /// Write an error execution for a cycle that never reached `run`'s
    /// bookkeeping (bad cron expression, panicked task).
    pub async fn record_failure(
        &self,
        monitor_id: &str,
        fired_at: Option<DateTime<Utc>>,
        detail: impl Into<String>,
    ) -> TaskExecution {
        let now = Utc::now();
        if let Some(at) = fired_at
            && let Err(e) = self.store.mark_run(monitor_id, at).await
        {
            tracing::warn!("⚠️ Failed to update last run for {monitor_id}: {e}");
        }
        let execution = TaskExecution {
            monitor_id: monitor_id.to_string(),
            started_at: now,
            finished_at: now,
            fetched: 0,
            new_events: 0,
            outcome: ExecutionOutcome::Error,
            error: Some(detail.into()),
        };
        self.record(&execution).await;
        execution
    }

    async fn record(&self, execution: &TaskExecution) {
        match &execution.error {
            None => tracing::info!(
                "✅ Cycle done: {} fetched={} new={}",
                execution.monitor_id,
                execution.fetched,
                execution.new_events
            ),
            Some(err) => tracing::warn!(
                "⚠️ Cycle {}: {} fetched={} new={}: {err}",
                execution.outcome.as_str(),
                execution.monitor_id,
                execution.fetched,
                execution.new_events
            ),
        }
        if let Err(e) = self.store.record_execution(execution).await {
            tracing::warn!(
                "⚠️ Failed to record execution for {}: {e}",
                execution.monitor_id
            );
        }
    }

    async fn cycle(&self, monitor: &MonitorConfig, tally: &mut Tally) -> Result<(), CycleError> {
        let watermark = self
            .store
            .get_watermark(&monitor.id)
            .await
            .map_err(CycleError::Failed)?;

        let fetch = self.source.fetch(
            &monitor.repo,
            &monitor.event_types,
            watermark.map(|w| w.at()),
        );
        let page = match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                if let Some(quota) = e.rate_limit() {
                    self.guard.record_quota(*quota);
                }
                return Err(CycleError::Failed(e.into()));
            }
            Err(_) => {
                return Err(CycleError::Failed(RepoWatchError::Timeout(format!(
                    "fetch exceeded {}s",
                    self.fetch_timeout.as_secs()
                ))));
            }
        };
        if let Some(quota) = page.rate_limit {
            self.guard.record_quota(quota);
        }

        tally.fetched = page.events.len();
        let fresh = dedup::filter(watermark.as_ref(), page.events);
        tally.new_events = fresh.len();
        if fresh.is_empty() {
            return Ok(());
        }

        let events: Vec<Event> = fresh
            .iter()
            .map(|raw| Event::from_raw(&monitor.id, &monitor.repo, raw))
            .collect();
        self.store
            .append_events(&monitor.id, &events)
            .await
            .map_err(CycleError::Failed)?;

        let send = self.sink.send(&monitor.id, &monitor.repo, &events);
        match tokio::time::timeout(self.notify_timeout, send).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(CycleError::Undelivered(e)),
            Err(_) => {
                return Err(CycleError::Undelivered(RepoWatchError::Timeout(format!(
                    "{} send exceeded {}s",
                    self.sink.name(),
                    self.notify_timeout.as_secs()
                ))));
            }
        }

        // Delivered: only now may the watermark move.
        if let Some(next) = dedup::advance(watermark, &fresh) {
            self.store
                .set_watermark(&monitor.id, &next)
                .await
                .map_err(CycleError::Failed)?;
        }
        Ok(())
    }
}
