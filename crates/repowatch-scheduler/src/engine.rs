//! Scheduler engine: decides which monitors are due and dispatches them.
//! Uses tokio::interval for ticking; each due monitor runs on its own task so
//! a slow fetch never delays another monitor.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use repowatch_core::traits::EventStore;
use repowatch_core::types::{MonitorConfig, TaskExecution};

use crate::cron::CronSchedule;
use crate::rate_limit::RateLimitGuard;
use crate::runner::TaskRunner;

/// Monitor ids with a cycle in flight.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    /// Claim `id`, or `None` when a cycle for it is already running.
    pub fn try_acquire(&self, id: &str) -> Option<InFlightSlot> {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        ids.insert(id.to_string()).then(|| InFlightSlot {
            ids: self.ids.clone(),
            id: id.to_string(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Released on drop, whether the cycle finished, failed or panicked.
#[derive(Debug)]
pub struct InFlightSlot {
    ids: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

/// A cycle handed to the runtime.
#[derive(Debug)]
pub struct Dispatched {
    pub monitor_id: String,
    pub handle: JoinHandle<Option<TaskExecution>>,
}

/// What one tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Set when the tick was skipped for rate limiting.
    pub backoff: Option<Duration>,
    pub dispatched: Vec<Dispatched>,
    /// Due, but the previous cycle is still running.
    pub busy: Vec<String>,
    /// Cron expression could not be parsed.
    pub invalid: Vec<String>,
}

impl TickReport {
    /// Wait for every dispatched cycle.
    pub async fn join(self) -> Vec<TaskExecution> {
        let mut out = Vec::with_capacity(self.dispatched.len());
        for d in self.dispatched {
            if let Ok(Some(ex)) = d.handle.await {
                out.push(ex);
            }
        }
        out
    }
}

/// Parsed cron cache entry. Re-parsed only when the expression text changes.
struct CachedSchedule {
    expression: String,
    parsed: Result<CronSchedule, String>,
}

/// The scheduler: reads running monitors each tick and dispatches the due ones.
pub struct Scheduler {
    store: Arc<dyn EventStore>,
    runner: Arc<TaskRunner>,
    guard: Arc<RateLimitGuard>,
    in_flight: InFlight,
    schedules: Mutex<HashMap<String, CachedSchedule>>,
}

impl Scheduler {
    pub fn new(runner: Arc<TaskRunner>) -> Self {
        Self {
            store: runner.store().clone(),
            guard: runner.guard().clone(),
            runner,
            in_flight: InFlight::default(),
            schedules: Mutex::new(HashMap::new()),
        }
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    pub fn runner(&self) -> &Arc<TaskRunner> {
        &self.runner
    }

    /// Tick: check every running monitor and dispatch the due ones.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        if let Some(wait) = self.guard.should_backoff(now) {
            tracing::info!("⏸️ Rate limited, skipping tick ({}s until reset)", wait.as_secs());
            return TickReport {
                backoff: Some(wait),
                ..Default::default()
            };
        }

        let monitors = match self.store.list_running_monitors().await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("⚠️ Failed to load monitors: {e}");
                return TickReport::default();
            }
        };
        self.forget_removed(&monitors);

        let mut report = TickReport::default();
        for monitor in monitors {
            let schedule = match self.schedule_for(&monitor).await {
                Some(s) => s,
                None => {
                    report.invalid.push(monitor.id);
                    continue;
                }
            };
            if !is_due(&schedule, &monitor, now) {
                continue;
            }
            let Some(slot) = self.in_flight.try_acquire(&monitor.id) else {
                tracing::debug!("Monitor {} still in flight, not dispatching", monitor.id);
                report.busy.push(monitor.id);
                continue;
            };

            tracing::info!("🔔 Monitor due: '{}' ({})", monitor.name, monitor.id);
            let monitor_id = monitor.id.clone();
            let handle = tokio::spawn(supervise(self.runner.clone(), monitor, now, slot));
            report.dispatched.push(Dispatched { monitor_id, handle });
        }

        if report.dispatched.is_empty() {
            tracing::debug!("Tick at {}: nothing due", now.to_rfc3339());
        }
        report
    }

    /// Cached parse for the monitor's current expression. A parse failure is
    /// recorded as an error execution the first time it is seen.
    async fn schedule_for(&self, monitor: &MonitorConfig) -> Option<CronSchedule> {
        let first_failure = {
            let mut cache = self.schedules.lock().unwrap_or_else(|e| e.into_inner());
            match cache.get(&monitor.id) {
                Some(entry) if entry.expression == monitor.cron => {
                    return entry.parsed.as_ref().ok().cloned();
                }
                _ => {
                    let parsed = CronSchedule::parse(&monitor.cron).map_err(|e| e.to_string());
                    let result = parsed.clone();
                    cache.insert(
                        monitor.id.clone(),
                        CachedSchedule {
                            expression: monitor.cron.clone(),
                            parsed,
                        },
                    );
                    match result {
                        Ok(schedule) => return Some(schedule),
                        Err(e) => e,
                    }
                }
            }
        };
        self.runner.record_failure(&monitor.id, None, first_failure).await;
        None
    }

    fn forget_removed(&self, running: &[MonitorConfig]) {
        let live: HashSet<&str> = running.iter().map(|m| m.id.as_str()).collect();
        self.schedules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|id, _| live.contains(id.as_str()));
    }
}

/// Run one cycle on its own task so a panic is contained and still recorded.
async fn supervise(
    runner: Arc<TaskRunner>,
    monitor: MonitorConfig,
    fired_at: DateTime<Utc>,
    _slot: InFlightSlot,
) -> Option<TaskExecution> {
    let cycle = {
        let runner = runner.clone();
        let monitor = monitor.clone();
        tokio::spawn(async move { runner.run(&monitor, fired_at).await })
    };
    match cycle.await {
        Ok(execution) => Some(execution),
        Err(e) => {
            tracing::warn!("⚠️ Cycle for {} aborted: {e}", monitor.id);
            Some(
                runner
                    .record_failure(&monitor.id, Some(fired_at), format!("cycle aborted: {e}"))
                    .await,
            )
        }
    }
}

/// Due when the first fire time after the last run (or creation) is not in the future.
pub fn is_due(schedule: &CronSchedule, monitor: &MonitorConfig, now: DateTime<Utc>) -> bool {
    let reference = monitor.last_run.unwrap_or(monitor.created_at);
    schedule
        .next_fire_after(reference)
        .is_some_and(|fire| fire <= now)
}

/// Spawn the scheduler loop. Runs until `shutdown` flips, then waits for
/// in-flight cycles to finish.
pub async fn spawn_scheduler(
    scheduler: Arc<Scheduler>,
    check_interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(
        "⏰ Scheduler started (check every {}s)",
        check_interval_secs
    );

    let mut interval =
        tokio::time::interval(Duration::from_secs(check_interval_secs.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut running: Vec<JoinHandle<Option<TaskExecution>>> = Vec::new();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = scheduler.tick(Utc::now()).await;
                running.retain(|h| !h.is_finished());
                running.extend(report.dispatched.into_iter().map(|d| d.handle));
            }
            _ = shutdown.changed() => break,
        }
    }

    tracing::info!("⏹️ Scheduler stopping, waiting for {} cycle(s)", running.len());
    for handle in running {
        let _ = handle.await;
    }
}
