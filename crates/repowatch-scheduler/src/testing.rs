//! In-process fakes for the collaborator traits, shared by the runner and engine tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Notify;

use repowatch_core::error::{FetchError, RepoWatchError, Result};
use repowatch_core::traits::{EventSource, NotificationSink};
use repowatch_core::types::{Event, FetchPage, RawEvent, RepoIdentity};

pub fn t(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, h, m, s).unwrap()
}

pub fn raw(id: &str, created_at: DateTime<Utc>) -> RawEvent {
    RawEvent {
        id: id.into(),
        event_type: "PushEvent".into(),
        actor: "octocat".into(),
        created_at,
        payload: serde_json::json!({"ref": "refs/heads/main", "size": 1,
            "commits": [{"message": format!("commit {id}")}]}),
    }
}

/// Replays scripted responses, then returns empty pages.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<std::result::Result<FetchPage, FetchError>>>,
    pub calls: AtomicUsize,
    /// When set, every fetch waits for a permit first.
    pub gate: Option<Arc<Notify>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<std::result::Result<FetchPage, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn push(&self, response: std::result::Result<FetchPage, FetchError>) {
        self.script.lock().unwrap().push_back(response);
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(
        &self,
        _repo: &RepoIdentity,
        _event_types: &[String],
        _since: Option<DateTime<Utc>>,
    ) -> std::result::Result<FetchPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(FetchPage::default()))
    }
}

/// Records every delivered batch as a list of event ids.
#[derive(Default)]
pub struct RecordingSink {
    pub batches: Mutex<Vec<Vec<String>>>,
    pub attempts: AtomicUsize,
    pub fail: AtomicBool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail.store(true, Ordering::SeqCst);
        sink
    }

    pub fn delivered(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, _monitor_id: &str, _repo: &RepoIdentity, events: &[Event]) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepoWatchError::notify("webhook returned errcode 310000"));
        }
        self.batches
            .lock()
            .unwrap()
            .push(events.iter().map(|e| e.event_id.clone()).collect());
        Ok(())
    }
}
