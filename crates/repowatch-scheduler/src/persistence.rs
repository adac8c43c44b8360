//! SQLite-backed persistence for monitors, events and execution history.
//! Survives restarts; one connection behind a mutex, WAL journal.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde::Deserialize;

use repowatch_core::error::{RepoWatchError, Result};
use repowatch_core::traits::EventStore;
use repowatch_core::types::{
    Event, ExecutionOutcome, MonitorConfig, MonitorStatus, RepoIdentity, TaskExecution, Watermark,
};

/// Filter for monitor listings. Empty fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitorFilter {
    /// Substring match on the display name.
    pub name: Option<String>,
    pub repo_owner: Option<String>,
    pub repo_name: Option<String>,
    pub status: Option<MonitorStatus>,
}

/// SQLite-backed store for all scheduler data.
pub struct SchedulerDb {
    conn: Mutex<Connection>,
}

const MONITOR_COLUMNS: &str = "id, name, repo_owner, repo_name, cron, event_types, status, \
     created_at, updated_at, last_run, watermark_ms, run_count";

const EVENT_COLUMNS: &str =
    "monitor_id, event_id, event_type, actor, created_at, payload, summary, url";

impl SchedulerDb {
    /// Open or create the scheduler database. `:memory:` is accepted.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| db_err("DB open", e))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepoWatchError::persistence(format!("DB lock poisoned: {e}")))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            PRAGMA foreign_keys = ON;

            -- Monitor configurations
            CREATE TABLE IF NOT EXISTS monitors (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                repo_owner TEXT NOT NULL,
                repo_name TEXT NOT NULL,
                cron TEXT NOT NULL,
                event_types TEXT NOT NULL,       -- JSON array
                status TEXT NOT NULL DEFAULT 'running',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_run TEXT,
                watermark_ms INTEGER,            -- unix millis of newest delivered event
                run_count INTEGER NOT NULL DEFAULT 0
            );

            -- Persisted events, unique per monitor
            CREATE TABLE IF NOT EXISTS events (
                monitor_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                actor TEXT NOT NULL,
                created_at TEXT NOT NULL,
                payload TEXT NOT NULL,
                summary TEXT NOT NULL,
                url TEXT NOT NULL,
                saved_at TEXT NOT NULL,
                PRIMARY KEY (monitor_id, event_id),
                FOREIGN KEY (monitor_id) REFERENCES monitors(id) ON DELETE CASCADE
            );

            -- One row per completed cycle
            CREATE TABLE IF NOT EXISTS executions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                monitor_id TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                fetched INTEGER NOT NULL,
                new_events INTEGER NOT NULL,
                outcome TEXT NOT NULL,           -- success, partial, error
                error TEXT,
                FOREIGN KEY (monitor_id) REFERENCES monitors(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_executions_monitor ON executions(monitor_id, id);
            CREATE INDEX IF NOT EXISTS idx_events_created ON events(monitor_id, created_at);
         ",
            )
            .map_err(|e| db_err("Migration", e))?;
        Ok(())
    }

    // ─── Monitors ──────────────────────────────────────

    pub fn insert_monitor(&self, m: &MonitorConfig) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO monitors
                 (id, name, repo_owner, repo_name, cron, event_types, status,
                  created_at, updated_at, last_run, watermark_ms, run_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    m.id,
                    m.name,
                    m.repo.owner,
                    m.repo.name,
                    m.cron,
                    serde_json::to_string(&m.event_types)?,
                    m.status.as_str(),
                    m.created_at.to_rfc3339(),
                    m.updated_at.to_rfc3339(),
                    m.last_run.map(|t| t.to_rfc3339()),
                    m.watermark.map(|w| w.to_millis()),
                    m.run_count,
                ],
            )
            .map_err(|e| db_err("Insert monitor", e))?;
        Ok(())
    }

    /// Persist the user-editable fields of a monitor.
    /// `last_run`, `watermark_ms` and `run_count` belong to the pipeline and are left alone.
    pub fn update_monitor(&self, m: &MonitorConfig) -> Result<bool> {
        let n = self
            .conn()?
            .execute(
                "UPDATE monitors SET name = ?2, repo_owner = ?3, repo_name = ?4, cron = ?5,
                 event_types = ?6, status = ?7, updated_at = ?8 WHERE id = ?1",
                params![
                    m.id,
                    m.name,
                    m.repo.owner,
                    m.repo.name,
                    m.cron,
                    serde_json::to_string(&m.event_types)?,
                    m.status.as_str(),
                    m.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| db_err("Update monitor", e))?;
        Ok(n > 0)
    }

    pub fn get_monitor(&self, id: &str) -> Result<Option<MonitorConfig>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?1"),
            [id],
            monitor_from_row,
        )
        .optional()
        .map_err(|e| db_err("Get monitor", e))
    }

    /// Page through monitors in creation order. `page` is 1-based.
    /// Returns the page and the total number of matches.
    pub fn list_monitors(
        &self,
        filter: &MonitorFilter,
        page: usize,
        size: usize,
    ) -> Result<(Vec<MonitorConfig>, usize)> {
        let mut clauses = Vec::new();
        let mut args: Vec<String> = Vec::new();
        if let Some(name) = filter.name.as_deref().filter(|s| !s.is_empty()) {
            clauses.push("name LIKE '%' || ? || '%'");
            args.push(name.to_string());
        }
        if let Some(owner) = filter.repo_owner.as_deref().filter(|s| !s.is_empty()) {
            clauses.push("repo_owner = ?");
            args.push(owner.to_string());
        }
        if let Some(repo) = filter.repo_name.as_deref().filter(|s| !s.is_empty()) {
            clauses.push("repo_name = ?");
            args.push(repo.to_string());
        }
        if let Some(status) = filter.status {
            clauses.push("status = ?");
            args.push(status.as_str().to_string());
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let conn = self.conn()?;
        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM monitors{where_sql}"),
                params_from_iter(args.iter()),
                |r| r.get(0),
            )
            .map_err(|e| db_err("Count monitors", e))?;

        let size = size.max(1);
        let Some(offset) = page_offset(page, size) else {
            return Ok((Vec::new(), total as usize));
        };
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MONITOR_COLUMNS} FROM monitors{where_sql}
                 ORDER BY created_at, id LIMIT {size} OFFSET {offset}"
            ))
            .map_err(|e| db_err("List monitors", e))?;
        let items = stmt
            .query_map(params_from_iter(args.iter()), monitor_from_row)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| db_err("List monitors", e))?;
        Ok((items, total as usize))
    }

    pub fn set_status(&self, id: &str, status: MonitorStatus, now: DateTime<Utc>) -> Result<bool> {
        let n = self
            .conn()?
            .execute(
                "UPDATE monitors SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.as_str(), now.to_rfc3339()],
            )
            .map_err(|e| db_err("Set status", e))?;
        Ok(n > 0)
    }

    /// Delete a monitor; its events and executions go with it.
    pub fn delete_monitor(&self, id: &str) -> Result<bool> {
        let n = self
            .conn()?
            .execute("DELETE FROM monitors WHERE id = ?1", [id])
            .map_err(|e| db_err("Delete monitor", e))?;
        Ok(n > 0)
    }

    // ─── Events ──────────────────────────────────────

    /// Idempotent append. Returns rows actually inserted.
    pub fn insert_events(&self, monitor_id: &str, events: &[Event]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(|e| db_err("Begin", e))?;
        let saved_at = Utc::now().to_rfc3339();
        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT OR IGNORE INTO events ({EVENT_COLUMNS}, saved_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ))
                .map_err(|e| db_err("Insert events", e))?;
            for ev in events {
                inserted += stmt
                    .execute(params![
                        monitor_id,
                        ev.event_id,
                        ev.event_type,
                        ev.actor,
                        ev.created_at.to_rfc3339(),
                        ev.payload.to_string(),
                        ev.summary,
                        ev.url,
                        saved_at,
                    ])
                    .map_err(|e| db_err("Insert events", e))?;
            }
        }
        tx.commit().map_err(|e| db_err("Commit", e))?;
        Ok(inserted)
    }

    /// Newest first. `page` is 1-based.
    pub fn list_events(
        &self,
        monitor_id: &str,
        page: usize,
        size: usize,
    ) -> Result<(Vec<Event>, usize)> {
        let conn = self.conn()?;
        let total: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM events WHERE monitor_id = ?1",
                [monitor_id],
                |r| r.get(0),
            )
            .map_err(|e| db_err("Count events", e))?;
        let size = size.max(1);
        let Some(offset) = page_offset(page, size) else {
            return Ok((Vec::new(), total as usize));
        };
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE monitor_id = ?1
                 ORDER BY created_at DESC, event_id DESC LIMIT {size} OFFSET {offset}"
            ))
            .map_err(|e| db_err("List events", e))?;
        let items = stmt
            .query_map([monitor_id], event_from_row)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| db_err("List events", e))?;
        Ok((items, total as usize))
    }

    pub fn count_events(&self, monitor_id: &str) -> Result<usize> {
        let n: i64 = self
            .conn()?
            .query_row(
                "SELECT COUNT(*) FROM events WHERE monitor_id = ?1",
                [monitor_id],
                |r| r.get(0),
            )
            .map_err(|e| db_err("Count events", e))?;
        Ok(n as usize)
    }

    // ─── Watermark & run bookkeeping ──────────────────────────────────────

    pub fn watermark(&self, monitor_id: &str) -> Result<Option<Watermark>> {
        let row: Option<Option<i64>> = self
            .conn()?
            .query_row(
                "SELECT watermark_ms FROM monitors WHERE id = ?1",
                [monitor_id],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| db_err("Get watermark", e))?;
        match row {
            Some(ms) => Ok(ms.and_then(Watermark::from_millis)),
            None => Err(RepoWatchError::NotFound(monitor_id.to_string())),
        }
    }

    /// Monotonic: only moves the watermark forward.
    pub fn advance_watermark(&self, monitor_id: &str, watermark: &Watermark) -> Result<bool> {
        let n = self
            .conn()?
            .execute(
                "UPDATE monitors SET watermark_ms = ?2
                 WHERE id = ?1 AND (watermark_ms IS NULL OR watermark_ms < ?2)",
                params![monitor_id, watermark.to_millis()],
            )
            .map_err(|e| db_err("Set watermark", e))?;
        Ok(n > 0)
    }

    pub fn touch_last_run(&self, monitor_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE monitors SET last_run = ?2, run_count = run_count + 1 WHERE id = ?1",
                params![monitor_id, at.to_rfc3339()],
            )
            .map_err(|e| db_err("Mark run", e))?;
        Ok(())
    }

    // ─── Executions ──────────────────────────────────────

    pub fn insert_execution(&self, ex: &TaskExecution) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO executions
             (monitor_id, started_at, finished_at, fetched, new_events, outcome, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                ex.monitor_id,
                ex.started_at.to_rfc3339(),
                ex.finished_at.to_rfc3339(),
                ex.fetched as i64,
                ex.new_events as i64,
                ex.outcome.as_str(),
                ex.error,
            ],
        )
        .map_err(|e| db_err("Record execution", e))?;
        Ok(conn.last_insert_rowid())
    }

    /// Newest first.
    pub fn list_executions(&self, monitor_id: &str, limit: usize) -> Result<Vec<TaskExecution>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT monitor_id, started_at, finished_at, fetched, new_events, outcome, error
                 FROM executions WHERE monitor_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(|e| db_err("List executions", e))?;
        stmt.query_map(params![monitor_id, limit as i64], execution_from_row)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| db_err("List executions", e))
    }
}

#[async_trait]
impl EventStore for SchedulerDb {
    async fn append_events(&self, monitor_id: &str, events: &[Event]) -> Result<usize> {
        let inserted = self.insert_events(monitor_id, events)?;
        tracing::debug!(
            "Stored {inserted}/{} events for monitor {monitor_id}",
            events.len()
        );
        Ok(inserted)
    }

    async fn get_watermark(&self, monitor_id: &str) -> Result<Option<Watermark>> {
        self.watermark(monitor_id)
    }

    async fn set_watermark(&self, monitor_id: &str, watermark: &Watermark) -> Result<()> {
        if !self.advance_watermark(monitor_id, watermark)? {
            tracing::debug!("Watermark for {monitor_id} not advanced (already at or past target)");
        }
        Ok(())
    }

    async fn record_execution(&self, execution: &TaskExecution) -> Result<()> {
        self.insert_execution(execution).map(|_| ())
    }

    async fn list_running_monitors(&self) -> Result<Vec<MonitorConfig>> {
        let filter = MonitorFilter {
            status: Some(MonitorStatus::Running),
            ..Default::default()
        };
        let (items, _) = self.list_monitors(&filter, 1, i64::MAX as usize)?;
        Ok(items)
    }

    async fn mark_run(&self, monitor_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.touch_last_run(monitor_id, at)
    }
}

// ─── Row mapping ──────────────────────────────────────

fn db_err(ctx: &str, e: rusqlite::Error) -> RepoWatchError {
    RepoWatchError::persistence(format!("{ctx}: {e}"))
}

fn conversion_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| conversion_err(idx, e))
    })
    .transpose()
}

fn monitor_from_row(row: &Row<'_>) -> rusqlite::Result<MonitorConfig> {
    let event_types: String = row.get(5)?;
    let status: String = row.get(6)?;
    let watermark_ms: Option<i64> = row.get(10)?;
    Ok(MonitorConfig {
        id: row.get(0)?,
        name: row.get(1)?,
        repo: RepoIdentity::new(row.get::<_, String>(2)?, row.get::<_, String>(3)?),
        cron: row.get(4)?,
        event_types: serde_json::from_str(&event_types).map_err(|e| conversion_err(5, e))?,
        status: MonitorStatus::parse(&status).unwrap_or(MonitorStatus::Stopped),
        created_at: ts(row, 7)?,
        updated_at: ts(row, 8)?,
        last_run: opt_ts(row, 9)?,
        watermark: watermark_ms.and_then(Watermark::from_millis),
        run_count: row.get(11)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let payload: String = row.get(5)?;
    Ok(Event {
        monitor_id: row.get(0)?,
        event_id: row.get(1)?,
        event_type: row.get(2)?,
        actor: row.get(3)?,
        created_at: ts(row, 4)?,
        payload: serde_json::from_str(&payload).map_err(|e| conversion_err(5, e))?,
        summary: row.get(6)?,
        url: row.get(7)?,
    })
}

fn execution_from_row(row: &Row<'_>) -> rusqlite::Result<TaskExecution> {
    let fetched: i64 = row.get(3)?;
    let new_events: i64 = row.get(4)?;
    let outcome: String = row.get(5)?;
    Ok(TaskExecution {
        monitor_id: row.get(0)?,
        started_at: ts(row, 1)?,
        finished_at: ts(row, 2)?,
        fetched: fetched as usize,
        new_events: new_events as usize,
        outcome: ExecutionOutcome::parse(&outcome).unwrap_or(ExecutionOutcome::Error),
        error: row.get(6)?,
    })
}

/// Row offset of a 1-based page, or `None` when it lies past anything SQLite can address.
fn page_offset(page: usize, size: usize) -> Option<i64> {
    page.saturating_sub(1)
        .checked_mul(size)
        .and_then(|offset| i64::try_from(offset).ok())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn sample_monitor(id: &str, cron: &str) -> MonitorConfig {
        let created = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        MonitorConfig {
            id: id.to_string(),
            name: format!("watch {id}"),
            repo: RepoIdentity::new("octocat", "Hello-World"),
            cron: cron.to_string(),
            event_types: vec!["PushEvent".into(), "IssuesEvent".into()],
            status: MonitorStatus::Running,
            created_at: created,
            updated_at: created,
            last_run: None,
            watermark: None,
            run_count: 0,
        }
    }

    fn event(monitor_id: &str, id: &str, min: u32) -> Event {
        Event {
            monitor_id: monitor_id.into(),
            event_id: id.into(),
            event_type: "PushEvent".into(),
            actor: "octocat".into(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, min, 0).unwrap(),
            payload: serde_json::json!({"ref": "refs/heads/main"}),
            summary: "octocat pushed 1 commit(s) to main".into(),
            url: "https://github.com/octocat/Hello-World/tree/main".into(),
        }
    }

    #[test]
    fn test_open_and_migrate() {
        let db = SchedulerDb::open_in_memory().unwrap();
        let (items, total) = db.list_monitors(&MonitorFilter::default(), 1, 10).unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn test_save_and_load_monitor() {
        let db = SchedulerDb::open_in_memory().unwrap();
        let m = sample_monitor("m1", "0 * * * *");
        db.insert_monitor(&m).unwrap();
        let loaded = db.get_monitor("m1").unwrap().unwrap();
        assert_eq!(loaded.name, "watch m1");
        assert_eq!(loaded.repo, m.repo);
        assert_eq!(loaded.event_types, m.event_types);
        assert_eq!(loaded.created_at, m.created_at);
        assert!(loaded.last_run.is_none());
        assert!(db.get_monitor("nope").unwrap().is_none());
    }

    #[test]
    fn test_append_is_idempotent() {
        let db = SchedulerDb::open_in_memory().unwrap();
        db.insert_monitor(&sample_monitor("m1", "0 * * * *")).unwrap();
        let batch = vec![event("m1", "1", 1), event("m1", "2", 2)];
        assert_eq!(db.insert_events("m1", &batch).unwrap(), 2);
        assert_eq!(db.insert_events("m1", &batch).unwrap(), 0);
        assert_eq!(db.count_events("m1").unwrap(), 2);
    }

    #[test]
    fn test_watermark_never_regresses() {
        let db = SchedulerDb::open_in_memory().unwrap();
        db.insert_monitor(&sample_monitor("m1", "0 * * * *")).unwrap();
        assert_eq!(db.watermark("m1").unwrap(), None);

        let later = Watermark(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());
        let earlier = Watermark(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap());
        assert!(db.advance_watermark("m1", &later).unwrap());
        assert!(!db.advance_watermark("m1", &earlier).unwrap());
        assert_eq!(db.watermark("m1").unwrap(), Some(later));
        assert!(matches!(
            db.watermark("missing"),
            Err(RepoWatchError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_filter_and_pages() {
        let db = SchedulerDb::open_in_memory().unwrap();
        for i in 0..5 {
            let mut m = sample_monitor(&format!("m{i}"), "0 * * * *");
            m.created_at += chrono::Duration::minutes(i);
            if i == 4 {
                m.repo = RepoIdentity::new("rust-lang", "rust");
                m.status = MonitorStatus::Stopped;
            }
            db.insert_monitor(&m).unwrap();
        }

        let (page2, total) = db.list_monitors(&MonitorFilter::default(), 2, 2).unwrap();
        assert_eq!(total, 5);
        assert_eq!(page2.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), ["m2", "m3"]);

        let by_owner = MonitorFilter {
            repo_owner: Some("rust-lang".into()),
            ..Default::default()
        };
        let (items, total) = db.list_monitors(&by_owner, 1, 10).unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].id, "m4");

        let by_name = MonitorFilter {
            name: Some("m1".into()),
            ..Default::default()
        };
        assert_eq!(db.list_monitors(&by_name, 1, 10).unwrap().1, 1);
    }

    #[test]
    fn test_page_past_the_end_is_empty() {
        let db = SchedulerDb::open_in_memory().unwrap();
        db.insert_monitor(&sample_monitor("m1", "0 * * * *")).unwrap();
        db.insert_events("m1", &[event("m1", "1", 1)]).unwrap();

        let (items, total) = db
            .list_monitors(&MonitorFilter::default(), usize::MAX / 50, 100)
            .unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 1);

        let (items, total) = db.list_monitors(&MonitorFilter::default(), usize::MAX, 100).unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 1);

        let (events, total) = db.list_events("m1", usize::MAX, 100).unwrap();
        assert!(events.is_empty());
        assert_eq!(total, 1);

        assert_eq!(page_offset(1, 100), Some(0));
        assert_eq!(page_offset(3, 20), Some(40));
        assert_eq!(page_offset(usize::MAX, 2), None);
    }

    #[test]
    fn test_delete_cascades() {
        let db = SchedulerDb::open_in_memory().unwrap();
        db.insert_monitor(&sample_monitor("m1", "0 * * * *")).unwrap();
        db.insert_events("m1", &[event("m1", "1", 1)]).unwrap();
        let now = Utc::now();
        db.insert_execution(&TaskExecution {
            monitor_id: "m1".into(),
            started_at: now,
            finished_at: now,
            fetched: 1,
            new_events: 1,
            outcome: ExecutionOutcome::Success,
            error: None,
        })
        .unwrap();

        assert!(db.delete_monitor("m1").unwrap());
        assert_eq!(db.count_events("m1").unwrap(), 0);
        assert!(db.list_executions("m1", 10).unwrap().is_empty());
        assert!(!db.delete_monitor("m1").unwrap());
    }

    #[tokio::test]
    async fn test_running_monitors_and_mark_run() {
        let db = SchedulerDb::open_in_memory().unwrap();
        db.insert_monitor(&sample_monitor("a", "0 * * * *")).unwrap();
        let mut stopped = sample_monitor("b", "0 * * * *");
        stopped.status = MonitorStatus::Stopped;
        db.insert_monitor(&stopped).unwrap();

        let running = db.list_running_monitors().await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, "a");

        let at = Utc.with_ymd_and_hms(2024, 1, 15, 11, 0, 0).unwrap();
        db.mark_run("a", at).await.unwrap();
        let a = db.get_monitor("a").unwrap().unwrap();
        assert_eq!(a.last_run, Some(at));
        assert_eq!(a.run_count, 1);
    }

    #[test]
    fn test_executions_newest_first() {
        let db = SchedulerDb::open_in_memory().unwrap();
        db.insert_monitor(&sample_monitor("m1", "0 * * * *")).unwrap();
        let now = Utc::now();
        for (i, outcome) in [ExecutionOutcome::Error, ExecutionOutcome::Success]
            .into_iter()
            .enumerate()
        {
            db.insert_execution(&TaskExecution {
                monitor_id: "m1".into(),
                started_at: now,
                finished_at: now,
                fetched: i,
                new_events: 0,
                outcome,
                error: None,
            })
            .unwrap();
        }
        let list = db.list_executions("m1", 10).unwrap();
        assert_eq!(list[0].outcome, ExecutionOutcome::Success);
        assert_eq!(list[1].outcome, ExecutionOutcome::Error);
    }
}
