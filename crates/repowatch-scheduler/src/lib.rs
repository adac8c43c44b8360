//! # RepoWatch Scheduler
//!
//! Polls repository activity on per-monitor cron schedules and forwards each
//! new event exactly once per successful notification.
//!
//! ## Architecture
//! ```text
//! Scheduler (tokio interval)
//!   ├── RateLimitGuard: skip the tick while quota is exhausted
//!   ├── running monitors whose cron fired since last_run
//!   └── one task per due monitor (never two for the same id)
//!         └── TaskRunner
//!               fetch → dedup → persist → notify → watermark → record
//! ```
//!
//! Persistence is SQLite (WAL), which survives restarts.

pub mod cron;
pub mod dedup;
pub mod engine;
pub mod monitors;
pub mod persistence;
pub mod rate_limit;
pub mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use cron::CronSchedule;
pub use engine::{InFlight, Scheduler, TickReport, spawn_scheduler};
pub use monitors::{MonitorPatch, MonitorService, NewMonitor, Page};
pub use persistence::{MonitorFilter, SchedulerDb};
pub use rate_limit::RateLimitGuard;
pub use runner::TaskRunner;
