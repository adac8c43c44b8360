//! Domain types shared by the scheduler, sources, sinks and the gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event types monitored when a monitor is created without an explicit list.
pub const DEFAULT_EVENT_TYPES: &[&str] = &["PushEvent", "IssuesEvent", "PullRequestEvent"];

/// Owner/name pair identifying a source repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoIdentity {
    pub owner: String,
    pub name: String,
}

impl RepoIdentity {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn html_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Monitor lifecycle status. Stopping is a status flip, never a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Running,
    Stopped,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Running => "running",
            MonitorStatus::Stopped => "stopped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(MonitorStatus::Running),
            "stopped" => Some(MonitorStatus::Stopped),
            _ => None,
        }
    }
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dedup boundary for a monitor: the newest event timestamp already delivered.
///
/// Any raw event created at or before the watermark is treated as seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(pub DateTime<Utc>);

impl Watermark {
    pub fn at(&self) -> DateTime<Utc> {
        self.0
    }

    /// Whether an event created at `ts` is already covered.
    pub fn covers(&self, ts: DateTime<Utc>) -> bool {
        ts <= self.0
    }

    pub fn to_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    pub fn from_millis(ms: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(ms).map(Watermark)
    }
}

/// A configured (repository, schedule, event-type filter) tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub id: String,
    pub name: String,
    pub repo: RepoIdentity,
    /// 5-field cron expression.
    pub cron: String,
    pub event_types: Vec<String>,
    pub status: MonitorStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub watermark: Option<Watermark>,
    pub run_count: u32,
}

impl MonitorConfig {
    pub fn is_running(&self) -> bool {
        self.status == MonitorStatus::Running
    }
}

/// Quota signal surfaced by the event source on every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// A provider event as fetched, before dedup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: String,
    pub event_type: String,
    pub actor: String,
    pub created_at: DateTime<Utc>,
    /// Type-specific payload, kept opaque.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// One response from an event source.
#[derive(Debug, Clone, Default)]
pub struct FetchPage {
    pub events: Vec<RawEvent>,
    pub rate_limit: Option<RateLimit>,
}

/// A persisted activity item. Identity is `(monitor_id, event_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub monitor_id: String,
    pub event_id: String,
    pub event_type: String,
    pub actor: String,
    pub created_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub summary: String,
    pub url: String,
}

impl Event {
    /// Build a persisted event from a raw one, deriving the display fields.
    pub fn from_raw(monitor_id: &str, repo: &RepoIdentity, raw: &RawEvent) -> Self {
        Self {
            monitor_id: monitor_id.to_string(),
            event_id: raw.id.clone(),
            event_type: raw.event_type.clone(),
            actor: raw.actor.clone(),
            created_at: raw.created_at,
            payload: raw.payload.clone(),
            summary: summarize(raw),
            url: event_url(repo, raw),
        }
    }

    /// First commit message of a push, if any.
    pub fn first_commit_message(&self) -> Option<&str> {
        self.payload["commits"]
            .as_array()
            .and_then(|c| c.first())
            .and_then(|c| c["message"].as_str())
    }
}

fn str_field<'a>(v: &'a serde_json::Value, key: &str) -> &'a str {
    v[key].as_str().unwrap_or("")
}

fn branch_of(raw: &RawEvent) -> &str {
    str_field(&raw.payload, "ref")
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown")
}

fn summarize(raw: &RawEvent) -> String {
    let p = &raw.payload;
    let actor = &raw.actor;
    match raw.event_type.as_str() {
        "PushEvent" => {
            let size = p["size"]
                .as_u64()
                .or_else(|| p["commits"].as_array().map(|c| c.len() as u64))
                .unwrap_or(0);
            format!("{actor} pushed {size} commit(s) to {}", branch_of(raw))
        }
        "IssuesEvent" => {
            let title = p["issue"]["title"].as_str().unwrap_or("Unknown issue");
            format!("{actor} {} issue: {title}", str_field(p, "action"))
        }
        "PullRequestEvent" => {
            let title = p["pull_request"]["title"].as_str().unwrap_or("Unknown PR");
            format!("{actor} {} pull request: {title}", str_field(p, "action"))
        }
        "CreateEvent" => format!(
            "{actor} created {}: {}",
            str_field(p, "ref_type"),
            str_field(p, "ref")
        ),
        "DeleteEvent" => format!(
            "{actor} deleted {}: {}",
            str_field(p, "ref_type"),
            str_field(p, "ref")
        ),
        "ReleaseEvent" => {
            let release = &p["release"];
            let name = release["name"]
                .as_str()
                .filter(|s| !s.is_empty())
                .or_else(|| release["tag_name"].as_str())
                .unwrap_or("Unknown");
            format!("{actor} {} release: {name}", str_field(p, "action"))
        }
        other => format!("{actor} triggered {other}"),
    }
}

fn event_url(repo: &RepoIdentity, raw: &RawEvent) -> String {
    let p = &raw.payload;
    let html = match raw.event_type.as_str() {
        "IssuesEvent" => p["issue"]["html_url"].as_str(),
        "PullRequestEvent" => p["pull_request"]["html_url"].as_str(),
        "ReleaseEvent" => p["release"]["html_url"].as_str(),
        "PushEvent" => return format!("{}/tree/{}", repo.html_url(), branch_of(raw)),
        _ => None,
    };
    html.map(String::from).unwrap_or_else(|| repo.html_url())
}

/// Outcome of one polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionOutcome {
    /// Fetch, persist and (if needed) notify all succeeded.
    Success,
    /// Fetched and persisted, but notification failed.
    Partial,
    /// Fetch or persistence failed.
    Error,
}

impl ExecutionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionOutcome::Success => "success",
            ExecutionOutcome::Partial => "partial",
            ExecutionOutcome::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(ExecutionOutcome::Success),
            "partial" => Some(ExecutionOutcome::Partial),
            "error" => Some(ExecutionOutcome::Error),
            _ => None,
        }
    }
}

/// Audit record written once per completed cycle. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecution {
    pub monitor_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetched: usize,
    pub new_events: usize,
    pub outcome: ExecutionOutcome,
    pub error: Option<String>,
}
