//! API route handlers for the gateway.
//! Every handler answers with a `{"ok": bool, ...}` JSON envelope.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use repowatch_core::error::RepoWatchError;
use repowatch_core::types::{MonitorConfig, MonitorStatus};
use repowatch_scheduler::{MonitorFilter, MonitorPatch, MonitorService, NewMonitor};

use super::server::AppState;

const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub name: Option<String>,
    pub repo_owner: Option<String>,
    pub repo_name: Option<String>,
    pub status: Option<String>,
    pub page: Option<usize>,
    pub size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub size: Option<usize>,
    pub limit: Option<usize>,
}

fn error_json(e: &RepoWatchError) -> Json<Value> {
    let kind = match e {
        RepoWatchError::Validation(_) | RepoWatchError::Cron(_) => "validation",
        RepoWatchError::NotFound(_) => "not_found",
        RepoWatchError::InvalidState(_) => "invalid_state",
        _ => "internal",
    };
    if kind == "internal" {
        tracing::warn!("⚠️ API error: {e}");
    }
    Json(json!({"ok": false, "error": e.to_string(), "kind": kind}))
}

fn monitor_json(m: &MonitorConfig) -> Value {
    let mut v = serde_json::to_value(m).unwrap_or_default();
    v["next_run"] = json!(MonitorService::next_run(m, chrono::Utc::now()).map(|t| t.to_rfc3339()));
    v
}

/// `{"ids": [...]}` body shared by the batch endpoints.
fn parse_ids(body: &Value) -> Result<Vec<String>, RepoWatchError> {
    let ids = body["ids"]
        .as_array()
        .ok_or_else(|| RepoWatchError::validation("'ids' must be an array of monitor ids"))?;
    ids.iter()
        .map(|v| {
            v.as_str()
                .map(String::from)
                .ok_or_else(|| RepoWatchError::validation("monitor ids must be strings"))
        })
        .collect()
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "repowatch-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

// ---- Monitors ----

/// List monitors with optional filters and paging.
pub async fn list_monitors(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> Json<Value> {
    let status = match q.status.as_deref().filter(|s| !s.is_empty()) {
        None => None,
        Some(s) => match MonitorStatus::parse(s) {
            Some(status) => Some(status),
            None => {
                return error_json(&RepoWatchError::validation(format!(
                    "unknown status '{s}', expected running or stopped"
                )));
            }
        },
    };
    let filter = MonitorFilter {
        name: q.name,
        repo_owner: q.repo_owner,
        repo_name: q.repo_name,
        status,
    };
    match state.monitors.list_monitors(
        &filter,
        q.page.unwrap_or(1),
        q.size.unwrap_or(DEFAULT_PAGE_SIZE),
    ) {
        Ok(page) => Json(json!({
            "ok": true,
            "items": page.items.iter().map(monitor_json).collect::<Vec<_>>(),
            "total": page.total,
            "page": page.page,
            "size": page.size,
        })),
        Err(e) => error_json(&e),
    }
}

/// Get one monitor.
pub async fn get_monitor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<Value> {
    match state.monitors.get_monitor(&id) {
        Ok(m) => Json(json!({"ok": true, "monitor": monitor_json(&m)})),
        Err(e) => error_json(&e),
    }
}

/// Create a monitor.
pub async fn create_monitor(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let input: NewMonitor = match serde_json::from_value(body) {
        Ok(v) => v,
        Err(e) => return error_json(&RepoWatchError::validation(e.to_string())),
    };
    match state.monitors.create_monitor(input) {
        Ok(m) => Json(json!({"ok": true, "id": m.id, "monitor": monitor_json(&m)})),
        Err(e) => error_json(&e),
    }
}

/// Update a monitor's name, repository, schedule or event types.
pub async fn update_monitor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let patch: MonitorPatch = match serde_json::from_value(body) {
        Ok(v) => v,
        Err(e) => return error_json(&RepoWatchError::validation(e.to_string())),
    };
    match state.monitors.update_monitor(&id, patch) {
        Ok(m) => Json(json!({"ok": true, "monitor": monitor_json(&m)})),
        Err(e) => error_json(&e),
    }
}

/// Stop monitors. All-or-nothing.
pub async fn stop_monitors(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    batch(&body, |ids| state.monitors.stop_monitors(ids))
}

/// Resume stopped monitors. All-or-nothing.
pub async fn resume_monitors(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    batch(&body, |ids| state.monitors.resume_monitors(ids))
}

/// Delete monitors with their stored events and history.
pub async fn delete_monitors(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    batch(&body, |ids| state.monitors.delete_monitors(ids))
}

fn batch(
    body: &Value,
    op: impl FnOnce(&[String]) -> Result<Vec<String>, RepoWatchError>,
) -> Json<Value> {
    match parse_ids(body).and_then(|ids| op(&ids)) {
        Ok(ids) => Json(json!({"ok": true, "ids": ids})),
        Err(e) => error_json(&e),
    }
}

// ---- History ----

/// Execution history, newest first.
pub async fn list_executions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(q): Query<PageQuery>,
) -> Json<Value> {
    match state.monitors.list_executions(&id, q.limit.unwrap_or(50)) {
        Ok(items) => Json(json!({"ok": true, "items": items, "count": items.len()})),
        Err(e) => error_json(&e),
    }
}

/// Stored events, newest first.
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(q): Query<PageQuery>,
) -> Json<Value> {
    match state.monitors.list_events(
        &id,
        q.page.unwrap_or(1),
        q.size.unwrap_or(DEFAULT_PAGE_SIZE),
    ) {
        Ok(page) => Json(json!({
            "ok": true,
            "items": page.items,
            "total": page.total,
            "page": page.page,
            "size": page.size,
        })),
        Err(e) => error_json(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repowatch_core::config::GatewayConfig;
    use repowatch_core::types::DEFAULT_EVENT_TYPES;
    use repowatch_scheduler::SchedulerDb;

    fn test_state() -> State<Arc<AppState>> {
        let db = Arc::new(SchedulerDb::open_in_memory().unwrap());
        let service = MonitorService::new(
            db,
            DEFAULT_EVENT_TYPES.iter().map(|s| s.to_string()).collect(),
        );
        State(Arc::new(AppState::new(
            GatewayConfig::default(),
            Arc::new(service),
        )))
    }

    async fn create(state: &State<Arc<AppState>>, repo: &str) -> String {
        let body = json!({
            "name": format!("watch {repo}"),
            "repo_owner": "octocat",
            "repo_name": repo,
            "cron": "0 * * * *"
        });
        let res = create_monitor(state.clone(), Json(body)).await.0;
        assert_eq!(res["ok"], true, "{res}");
        res["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_check() {
        let json = health_check(test_state()).await.0;
        assert_eq!(json["status"], "ok");
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let state = test_state();
        let id = create(&state, "Hello-World").await;
        create(&state, "Spoon-Knife").await;

        let json = list_monitors(state.clone(), Query(ListQuery::default())).await.0;
        assert_eq!(json["ok"], true);
        assert_eq!(json["total"], 2);
        let items = json["items"].as_array().unwrap();
        let item = items.iter().find(|m| m["id"] == id.as_str()).unwrap();
        assert_eq!(item["status"], "running");
        assert!(item["next_run"].is_string());
        assert_eq!(item["event_types"].as_array().unwrap().len(), 3);

        let q = ListQuery {
            repo_name: Some("Spoon-Knife".into()),
            ..Default::default()
        };
        let json = list_monitors(state, Query(q)).await.0;
        assert_eq!(json["total"], 1);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_cron() {
        let body = json!({"name": "x", "repo_owner": "o", "repo_name": "r", "cron": "61 * * * *"});
        let json = create_monitor(test_state(), Json(body)).await.0;
        assert_eq!(json["ok"], false);
        assert_eq!(json["kind"], "validation");
    }

    #[tokio::test]
    async fn test_create_missing_fields() {
        let json = create_monitor(test_state(), Json(json!({"name": "x"}))).await.0;
        assert_eq!(json["ok"], false);
    }

    #[tokio::test]
    async fn test_update_monitor() {
        let state = test_state();
        let id = create(&state, "r").await;
        let json = update_monitor(
            state.clone(),
            Path(id.clone()),
            Json(json!({"cron": "*/10 * * * *"})),
        )
        .await
        .0;
        assert_eq!(json["ok"], true);
        assert_eq!(json["monitor"]["cron"], "*/10 * * * *");

        let json = update_monitor(state, Path("missing".into()), Json(json!({}))).await.0;
        assert_eq!(json["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_stop_and_resume() {
        let state = test_state();
        let id = create(&state, "r").await;

        let json = stop_monitors(state.clone(), Json(json!({"ids": [id]}))).await.0;
        assert_eq!(json["ok"], true);
        let json = stop_monitors(state.clone(), Json(json!({"ids": [id]}))).await.0;
        assert_eq!(json["kind"], "invalid_state");

        let json = resume_monitors(state.clone(), Json(json!({"ids": [id]}))).await.0;
        assert_eq!(json["ok"], true);
        let json = get_monitor(state, Path(id)).await.0;
        assert_eq!(json["monitor"]["status"], "running");
    }

    #[tokio::test]
    async fn test_delete_and_history() {
        let state = test_state();
        let id = create(&state, "r").await;

        let json = list_executions(state.clone(), Path(id.clone()), Query(PageQuery::default()))
            .await
            .0;
        assert_eq!(json["count"], 0);
        let json = list_events(state.clone(), Path(id.clone()), Query(PageQuery::default()))
            .await
            .0;
        assert_eq!(json["total"], 0);

        let json = delete_monitors(state.clone(), Json(json!({"ids": [id, "ghost"]}))).await.0;
        assert_eq!(json["kind"], "not_found");
        let json = delete_monitors(state.clone(), Json(json!({"ids": [id]}))).await.0;
        assert_eq!(json["ok"], true);
        let json = get_monitor(state, Path(id)).await.0;
        assert_eq!(json["ok"], false);
    }

    #[tokio::test]
    async fn test_batch_requires_ids() {
        let json = stop_monitors(test_state(), Json(json!({"id": "x"}))).await.0;
        assert_eq!(json["ok"], false);
        assert_eq!(json["kind"], "validation");
    }

    #[tokio::test]
    async fn test_router_serves_api() {
        use axum::body::{Body, to_bytes};
        use axum::http::{Request, StatusCode};
        use tower::ServiceExt;

        let State(state) = test_state();
        let id = create(&State(state.clone()), "Hello-World").await;
        let router = crate::server::build_router((*state).clone());

        let res = router
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = router
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/monitors/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["monitor"]["id"], id.as_str());
    }
}
