//! Monitor management: create, list, update, stop, resume and delete.
//!
//! Every batch operation validates all ids before touching any of them, so a
//! rejected call leaves the registry unchanged. The scheduler picks changes up
//! on its next tick.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use repowatch_core::error::{RepoWatchError, Result};
use repowatch_core::types::{
    Event, MonitorConfig, MonitorStatus, RepoIdentity, TaskExecution,
};

use crate::cron::{CronSchedule, next_run_from_cron};
use crate::persistence::{MonitorFilter, SchedulerDb};

/// Input for `create_monitor`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMonitor {
    pub name: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub cron: String,
    #[serde(default)]
    pub event_types: Option<Vec<String>>,
}

/// Partial update. Absent or empty fields are left as they are.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitorPatch {
    pub name: Option<String>,
    pub repo_owner: Option<String>,
    pub repo_name: Option<String>,
    pub cron: Option<String>,
    pub event_types: Option<Vec<String>>,
}

/// One page of results plus the unpaged total.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub size: usize,
}

pub struct MonitorService {
    db: Arc<SchedulerDb>,
    default_event_types: Vec<String>,
}

impl MonitorService {
    pub fn new(db: Arc<SchedulerDb>, default_event_types: Vec<String>) -> Self {
        Self {
            db,
            default_event_types,
        }
    }

    pub fn db(&self) -> &Arc<SchedulerDb> {
        &self.db
    }

    pub fn create_monitor(&self, input: NewMonitor) -> Result<MonitorConfig> {
        let owner = input.repo_owner.trim();
        let repo = input.repo_name.trim();
        if owner.is_empty() || repo.is_empty() {
            return Err(RepoWatchError::validation(
                "repository owner and name must not be empty",
            ));
        }
        CronSchedule::parse(&input.cron)?;

        let event_types = match input.event_types {
            Some(types) if !types.is_empty() => types,
            _ => self.default_event_types.clone(),
        };
        let name = match input.name.trim() {
            "" => format!("{owner}/{repo}"),
            n => n.to_string(),
        };
        let now = Utc::now();
        let monitor = MonitorConfig {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            repo: RepoIdentity::new(owner, repo),
            cron: input.cron.trim().to_string(),
            event_types,
            status: MonitorStatus::Running,
            created_at: now,
            updated_at: now,
            last_run: None,
            watermark: None,
            run_count: 0,
        };
        self.db.insert_monitor(&monitor)?;
        tracing::info!(
            "📅 Monitor added: '{}' ({}) on {} [{}]",
            monitor.name,
            monitor.id,
            monitor.repo,
            monitor.cron
        );
        Ok(monitor)
    }

    pub fn get_monitor(&self, id: &str) -> Result<MonitorConfig> {
        self.db
            .get_monitor(id)?
            .ok_or_else(|| RepoWatchError::NotFound(id.to_string()))
    }

    pub fn list_monitors(
        &self,
        filter: &MonitorFilter,
        page: usize,
        size: usize,
    ) -> Result<Page<MonitorConfig>> {
        let page = page.max(1);
        let size = size.clamp(1, 100);
        let (items, total) = self.db.list_monitors(filter, page, size)?;
        Ok(Page {
            items,
            total,
            page,
            size,
        })
    }

    pub fn update_monitor(&self, id: &str, patch: MonitorPatch) -> Result<MonitorConfig> {
        let mut monitor = self.get_monitor(id)?;

        if let Some(name) = non_empty(patch.name) {
            monitor.name = name;
        }
        if let Some(owner) = non_empty(patch.repo_owner) {
            monitor.repo.owner = owner;
        }
        if let Some(repo) = non_empty(patch.repo_name) {
            monitor.repo.name = repo;
        }
        if let Some(types) = patch.event_types.filter(|t| !t.is_empty()) {
            monitor.event_types = types;
        }
        if let Some(cron) = non_empty(patch.cron) {
            CronSchedule::parse(&cron)?;
            monitor.cron = cron;
        }
        monitor.updated_at = Utc::now();

        if !self.db.update_monitor(&monitor)? {
            return Err(RepoWatchError::NotFound(id.to_string()));
        }
        Ok(monitor)
    }

    /// Stop running monitors. Every id must exist and be running.
    pub fn stop_monitors(&self, ids: &[String]) -> Result<Vec<String>> {
        self.transition(ids, MonitorStatus::Running, MonitorStatus::Stopped)
    }

    /// Resume stopped monitors. Every id must exist and be stopped.
    pub fn resume_monitors(&self, ids: &[String]) -> Result<Vec<String>> {
        self.transition(ids, MonitorStatus::Stopped, MonitorStatus::Running)
    }

    /// Delete monitors with their events and execution history.
    pub fn delete_monitors(&self, ids: &[String]) -> Result<Vec<String>> {
        let ids = unique(ids);
        for id in &ids {
            self.get_monitor(id)?;
        }
        for id in &ids {
            self.db.delete_monitor(id)?;
            tracing::info!("🗑️ Monitor deleted: {id}");
        }
        Ok(ids)
    }

    pub fn list_executions(&self, id: &str, limit: usize) -> Result<Vec<TaskExecution>> {
        self.get_monitor(id)?;
        self.db.list_executions(id, limit.clamp(1, 500))
    }

    pub fn list_events(&self, id: &str, page: usize, size: usize) -> Result<Page<Event>> {
        self.get_monitor(id)?;
        let page = page.max(1);
        let size = size.clamp(1, 100);
        let (items, total) = self.db.list_events(id, page, size)?;
        Ok(Page {
            items,
            total,
            page,
            size,
        })
    }

    /// Next time the monitor's schedule fires after `after`.
    pub fn next_run(monitor: &MonitorConfig, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        next_run_from_cron(&monitor.cron, after)
    }

    fn transition(
        &self,
        ids: &[String],
        from: MonitorStatus,
        to: MonitorStatus,
    ) -> Result<Vec<String>> {
        let ids = unique(ids);
        for id in &ids {
            let monitor = self.get_monitor(id)?;
            if monitor.status != from {
                return Err(RepoWatchError::InvalidState(format!(
                    "monitor {id} is {}, expected {from}",
                    monitor.status
                )));
            }
        }
        let now = Utc::now();
        for id in &ids {
            self.db.set_status(id, to, now)?;
            tracing::info!("Monitor {id}: {from} → {to}");
        }
        Ok(ids)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Drop repeated ids, keeping first-seen order.
fn unique(ids: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(id.clone());
        }
    }
    out
}
