//! GitHub repository events API client.
//! `GET {api_base}/repos/{owner}/{repo}/events`, newest first, paginated.
//! The feed holds at most 300 events; a page past the end is empty or 422.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, RETRY_AFTER};
use serde_json::Value;

use repowatch_core::config::GithubConfig;
use repowatch_core::error::{FetchError, RepoWatchError, Result};
use repowatch_core::traits::EventSource;
use repowatch_core::types::{FetchPage, RateLimit, RawEvent, RepoIdentity};

const RATE_REMAINING: &str = "x-ratelimit-remaining";
const RATE_RESET: &str = "x-ratelimit-reset";
/// Events the API serves for a repository feed.
const FEED_LIMIT: u32 = 300;
const MAX_PER_PAGE: u32 = 100;

/// GitHub events source.
pub struct GithubEventSource {
    client: reqwest::Client,
    config: GithubConfig,
}

impl GithubEventSource {
    pub fn new(config: GithubConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RepoWatchError::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn per_page(&self) -> u32 {
        self.config.per_page.clamp(1, MAX_PER_PAGE)
    }

    /// Requests needed to walk the whole feed.
    pub fn max_requests(&self) -> u32 {
        FEED_LIMIT.div_ceil(self.per_page())
    }

    fn events_url(&self, repo: &RepoIdentity) -> String {
        format!(
            "{}/repos/{}/{}/events",
            self.config.api_base.trim_end_matches('/'),
            repo.owner,
            repo.name
        )
    }

    /// One page of raw events plus the quota reported with it.
    async fn fetch_page(
        &self,
        repo: &RepoIdentity,
        page: u32,
    ) -> std::result::Result<(Vec<RawEvent>, Option<RateLimit>), FetchError> {
        let resp = self
            .client
            .get(self.events_url(repo))
            .query(&[("per_page", self.per_page()), ("page", page)])
            .header(AUTHORIZATION, format!("Bearer {}", self.config.token))
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await
            .map_err(|e| FetchError::transient(format!("GitHub request failed: {e}")))?;

        let status = resp.status();
        let quota = rate_limit_from_headers(resp.headers());
        // A later page that is gone ends the walk instead of failing it.
        if page > 1
            && matches!(status, StatusCode::UNPROCESSABLE_ENTITY | StatusCode::NOT_FOUND)
        {
            tracing::debug!("Reached the end of the {repo} feed at page {page}");
            return Ok((Vec::new(), quota));
        }
        if !status.is_success() {
            let quota = quota.or_else(|| retry_after(resp.headers(), Utc::now()));
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, quota));
        }

        let items: Vec<Value> = resp
            .json()
            .await
            .map_err(|e| FetchError::transient(format!("Invalid GitHub response: {e}")))?;
        let events = items
            .iter()
            .filter_map(|item| {
                let parsed = parse_event(item);
                if parsed.is_none() {
                    tracing::debug!("Skipping malformed event in {repo}: {item}");
                }
                parsed
            })
            .collect();
        Ok((events, quota))
    }
}

#[async_trait]
impl EventSource for GithubEventSource {
    fn name(&self) -> &str {
        "github"
    }

    async fn fetch(
        &self,
        repo: &RepoIdentity,
        event_types: &[String],
        since: Option<DateTime<Utc>>,
    ) -> std::result::Result<FetchPage, FetchError> {
        if self.config.token.is_empty() {
            return Err(FetchError::permanent("GitHub token is not configured"));
        }

        // Walk back until `since` (or the end of the feed) so the oldest new
        // events are known, then hand over at most `max_pages` pages of them.
        let per_page = self.per_page();
        let mut out = FetchPage::default();
        let mut matched = Vec::new();
        for page in 1..=self.max_requests() {
            let (events, quota) = self.fetch_page(repo, page).await?;
            if quota.is_some() {
                out.rate_limit = quota;
            }
            let count = events.len();
            let reached_since = since.is_some_and(|s| events.iter().any(|e| e.created_at <= s));
            matched.extend(events.into_iter().filter(|e| wanted(e, event_types, since)));

            if count < per_page as usize || reached_since {
                break;
            }
        }

        let keep = self.config.max_pages.max(1) as usize * per_page as usize;
        let (events, deferred) = oldest_first_window(matched, keep);
        if deferred > 0 {
            tracing::info!("{deferred} newer event(s) in {repo} left for the next cycle");
        }
        out.events = events;

        tracing::debug!(
            "Fetched {} matching event(s) for {repo} (since {:?})",
            out.events.len(),
            since.map(|s| s.to_rfc3339())
        );
        Ok(out)
    }
}

/// Event type is monitored (an empty list means all) and newer than `since`.
fn wanted(event: &RawEvent, event_types: &[String], since: Option<DateTime<Utc>>) -> bool {
    let type_ok = event_types.is_empty() || event_types.iter().any(|t| *t == event.event_type);
    type_ok && since.is_none_or(|s| event.created_at > s)
}

/// Keep the oldest `keep` events of a newest-first list and report how many
/// newer ones were held back. Events sharing a timestamp with a held-back one
/// are held back too, so a watermark at the newest kept event covers nothing
/// that was not returned. If that leaves nothing, everything is returned.
fn oldest_first_window(events: Vec<RawEvent>, keep: usize) -> (Vec<RawEvent>, usize) {
    if events.len() <= keep {
        return (events, 0);
    }
    let cut = events.len() - keep;
    let Some(boundary) = events[..cut].iter().map(|e| e.created_at).min() else {
        return (events, 0);
    };
    let kept = events[cut..].iter().filter(|e| e.created_at < boundary).count();
    if kept == 0 {
        return (events, 0);
    }
    let total = events.len();
    let window = events
        .into_iter()
        .skip(cut)
        .filter(|e| e.created_at < boundary)
        .collect();
    (window, total - kept)
}

/// Map a GitHub API event object onto a `RawEvent`.
pub fn parse_event(item: &Value) -> Option<RawEvent> {
    let id = match &item["id"] {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let created_at = DateTime::parse_from_rfc3339(item["created_at"].as_str()?)
        .ok()?
        .with_timezone(&Utc);
    Some(RawEvent {
        id,
        event_type: item["type"].as_str()?.to_string(),
        actor: item["actor"]["login"]
            .as_str()
            .unwrap_or("Unknown")
            .to_string(),
        created_at,
        payload: item.get("payload").cloned().unwrap_or(Value::Null),
    })
}

/// Quota headers, when both are present and well-formed.
pub fn rate_limit_from_headers(headers: &HeaderMap) -> Option<RateLimit> {
    let header = |name: &str| headers.get(name)?.to_str().ok()?.trim().parse::<i64>().ok();
    let remaining = header(RATE_REMAINING)?;
    let reset = header(RATE_RESET)?;
    Some(RateLimit {
        remaining: remaining.clamp(0, u32::MAX as i64) as u32,
        reset_at: DateTime::from_timestamp(reset, 0)?,
    })
}

/// Secondary rate limits answer with `retry-after` (seconds) instead of quota headers.
pub fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<RateLimit> {
    let secs: i64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    Some(RateLimit {
        remaining: 0,
        reset_at: now + chrono::Duration::seconds(secs.max(0)),
    })
}

/// Error kind for a non-2xx response.
pub fn classify_status(status: StatusCode, body: &str, quota: Option<RateLimit>) -> FetchError {
    let message = format!("GitHub API {status}: {}", truncate(body, 200));
    match status.as_u16() {
        401 | 404 | 410 | 422 => FetchError::Permanent(message),
        // Quota (if any) comes from the rate-limit or retry-after headers.
        403 | 429 => FetchError::Transient {
            message,
            rate_limit: quota,
        },
        _ => FetchError::transient(message),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
