//! Route handlers for the control plane.
//!
//! Thin translation between HTTP and the core primitives; every state
//! mutation goes through the queue, the registry, the pause gate or the
//! logging reload handle. Handlers never hold locks across await points.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{TaskConfig, TaskId};
use crate::logging;

use super::{json_error, method_not_allowed, write_bytes_compressed, AppState};

pub(super) async fn root() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/web/")]).into_response()
}

pub(super) async fn web_redirect() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/web/")]).into_response()
}

pub(super) async fn metrics(State(state): State<AppState>) -> Response {
    let (content_type, body) = state.metrics.encode();
    (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response()
}

// ---- /tasks ----

pub(super) async fn get_tasks(State(state): State<AppState>) -> Response {
    let queue: Vec<TaskId> = state
        .queue
        .get()
        .map(|q| q.all_ids())
        .unwrap_or_default();
    Json(serde_json::json!({
        "current": state.registry.current_id(),
        "queue": queue,
    }))
    .into_response()
}

pub(super) async fn post_task(State(state): State<AppState>, body: Bytes) -> Response {
    // Task submissions must never be replayed from a cache.
    let no_store = |mut response: Response| {
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    };

    // The queue exists only when the supervisor runs in server mode.
    let Some(queue) = state.queue.get() else {
        return no_store(json_error(
            StatusCode::NOT_IMPLEMENTED,
            "server-mode not enabled",
            None,
        ));
    };
    debug!(length = body.len(), "received task config");

    let mut cfg = match TaskConfig::from_global_and_toml(&state.global, &body) {
        Ok(cfg) => cfg,
        Err(e) => {
            return no_store(json_error(
                StatusCode::BAD_REQUEST,
                "invalid task configuration",
                Some(e.to_string()),
            ))
        }
    };
    if let Err(e) = cfg.adjust() {
        return no_store(json_error(
            StatusCode::BAD_REQUEST,
            "invalid task configuration",
            Some(e.to_string()),
        ));
    }

    let id = queue.push(cfg);
    state.metrics.queue_length.set(queue.len() as i64);
    no_store(Json(serde_json::json!({ "id": id })).into_response())
}

pub(super) async fn tasks_collection_405() -> Response {
    method_not_allowed("GET, POST", "only GET and POST are allowed")
}

// ---- /tasks/{id} ----

fn parse_task_id(raw: &str) -> Result<TaskId, Response> {
    raw.parse::<TaskId>().map_err(|e| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid task ID",
            Some(e.to_string()),
        )
    })
}

pub(super) async fn get_one_task(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let id = match parse_task_id(&raw_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let task = state
        .registry
        .current_config(id)
        .or_else(|| state.queue.get().and_then(|q| q.get(id)));
    let Some(task) = task else {
        return json_error(StatusCode::NOT_FOUND, "task ID not found", None);
    };

    match serde_json::to_vec(&*task) {
        Ok(body) => write_bytes_compressed(&headers, "application/json", body),
        Err(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "unable to serialize task",
            Some(e.to_string()),
        ),
    }
}

pub(super) async fn delete_one_task(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Response {
    let id = match parse_task_id(&raw_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    // In-flight first: removing the running task means canceling it.
    let success = state.registry.cancel_if(id)
        || state
            .queue
            .get()
            .map(|queue| {
                let removed = queue.remove(id);
                state.metrics.queue_length.set(queue.len() as i64);
                removed
            })
            .unwrap_or(false);

    info!(task_id = id, success, "canceled task");
    if success {
        Json(serde_json::json!({})).into_response()
    } else {
        json_error(StatusCode::NOT_FOUND, "task ID not found", None)
    }
}

pub(super) async fn task_entry_405() -> Response {
    method_not_allowed("GET, DELETE", "only GET and DELETE are allowed")
}

// ---- /tasks/{id}/{verb} ----

pub(super) async fn patch_one_task(
    State(state): State<AppState>,
    Path((raw_id, verb)): Path<(String, String)>,
) -> Response {
    let Some(queue) = state.queue.get() else {
        return json_error(StatusCode::NOT_IMPLEMENTED, "server-mode not enabled", None);
    };
    let id = match parse_task_id(&raw_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let moved = match verb.as_str() {
        "front" => queue.move_to_front(id),
        "back" => queue.move_to_back(id),
        _ => return json_error(StatusCode::BAD_REQUEST, "unknown patch action", None),
    };

    if moved {
        Json(serde_json::json!({})).into_response()
    } else {
        json_error(StatusCode::NOT_FOUND, "task ID not found", None)
    }
}

pub(super) async fn task_verb_405() -> Response {
    method_not_allowed("PATCH", "only PATCH is allowed")
}

// ---- /progress ----

pub(super) async fn progress_task(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let body = state.progress.marshal_task_progress().await;
    write_bytes_compressed(&headers, "application/json", body)
}

pub(super) async fn progress_table(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let Some(name) = params.get("t") else {
        return json_error(StatusCode::BAD_REQUEST, "missing table name", None);
    };
    match state.progress.marshal_table_checkpoints(name).await {
        Some(body) => write_bytes_compressed(&headers, "application/json", body),
        None => json_error(StatusCode::NOT_FOUND, "table not found", None),
    }
}

// ---- /pause and /resume ----

pub(super) async fn get_pause(State(state): State<AppState>) -> Response {
    Json(serde_json::json!({ "paused": state.pause.is_paused() })).into_response()
}

pub(super) async fn put_pause(State(state): State<AppState>) -> Response {
    state.pause.pause();
    info!("progress paused");
    Json(serde_json::json!({})).into_response()
}

pub(super) async fn pause_405() -> Response {
    method_not_allowed("GET, PUT", "only GET and PUT are allowed")
}

pub(super) async fn put_resume(State(state): State<AppState>) -> Response {
    state.pause.resume();
    info!("progress resumed");
    Json(serde_json::json!({})).into_response()
}

pub(super) async fn resume_405() -> Response {
    method_not_allowed("PUT", "only PUT is allowed")
}

// ---- /loglevel ----

#[derive(Deserialize)]
struct LogLevelBody {
    level: String,
}

pub(super) async fn get_log_level() -> Response {
    Json(serde_json::json!({ "level": logging::level() })).into_response()
}

pub(super) async fn set_log_level(body: Bytes) -> Response {
    let parsed: LogLevelBody = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(e) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                "invalid log level",
                Some(e.to_string()),
            )
        }
    };
    if !logging::is_valid_level(&parsed.level) {
        return json_error(
            StatusCode::BAD_REQUEST,
            "invalid log level",
            Some(format!("'{}'", parsed.level)),
        );
    }

    let old = logging::level();
    match logging::set_level(&parsed.level) {
        Ok(()) => {
            info!(old, new = parsed.level, "changed log level");
            Json(serde_json::json!({})).into_response()
        }
        Err(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "cannot change log level",
            Some(e.to_string()),
        ),
    }
}

pub(super) async fn loglevel_405() -> Response {
    method_not_allowed("GET, PUT, POST", "only GET, PUT and POST are allowed")
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, OnceLock};

    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use tokio_util::sync::CancellationToken;
    use tower::util::ServiceExt;

    use crate::config::GlobalConfig;
    use crate::core::{CancelRegistry, PauseGate, TaskQueue};
    use crate::http::{router, AppState};
    use crate::metrics::Metrics;
    use crate::progress::ProgressTracker;

    fn state(server_mode: bool) -> AppState {
        let queue = Arc::new(OnceLock::new());
        if server_mode {
            queue.set(Arc::new(TaskQueue::new())).ok();
        }
        AppState {
            global: Arc::new(GlobalConfig::default()),
            queue,
            registry: Arc::new(CancelRegistry::new()),
            pause: Arc::new(PauseGate::new()),
            progress: Arc::new(ProgressTracker::new()),
            metrics: Arc::new(Metrics::new().unwrap()),
        }
    }

    async fn call(
        state: &AppState,
        method: Method,
        uri: &str,
        body: &str,
    ) -> (StatusCode, axum::http::HeaderMap, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, headers, json)
    }

    fn push_task(state: &AppState, id: i64) {
        let mut cfg = crate::config::TaskConfig::default();
        cfg.task_id = id;
        state.queue.get().unwrap().push(cfg);
    }

    #[tokio::test]
    async fn get_tasks_reflects_queue_and_current() {
        let state = state(true);
        let (status, _, body) = call(&state, Method::GET, "/tasks", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current"], serde_json::Value::Null);
        assert_eq!(body["queue"].as_array().unwrap().len(), 0);

        push_task(&state, 11);
        state
            .registry
            .set(CancellationToken::new(), Arc::new({
                let mut cfg = crate::config::TaskConfig::default();
                cfg.task_id = 10;
                cfg
            }));
        let (_, _, body) = call(&state, Method::GET, "/tasks", "").await;
        assert_eq!(body["current"], 10);
        assert_eq!(body["queue"], serde_json::json!([11]));
    }

    #[tokio::test]
    async fn post_outside_server_mode_is_501_and_mutates_nothing() {
        let state = state(false);
        let (status, _, body) = call(
            &state,
            Method::POST,
            "/tasks",
            "[mydumper]\nsource-dir = \"/tmp/dump\"\n",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert!(body["error"].as_str().unwrap().contains("server-mode"));
        assert!(state.queue.get().is_none());
    }

    #[tokio::test]
    async fn post_enqueues_valid_toml() {
        let state = state(true);
        let (status, headers, body) = call(
            &state,
            Method::POST,
            "/tasks",
            "[mydumper]\nsource-dir = \"/tmp/dump\"\n",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
        let id = body["id"].as_i64().unwrap();
        assert!(id > 0);

        let (_, _, body) = call(&state, Method::GET, "/tasks", "").await;
        assert_eq!(body["queue"], serde_json::json!([id]));
    }

    #[tokio::test]
    async fn post_malformed_toml_is_400() {
        let state = state(true);
        let (status, _, body) = call(&state, Method::POST, "/tasks", "not = = toml").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid task configuration"));
        assert!(state.queue.get().unwrap().is_empty());
    }

    #[tokio::test]
    async fn post_invalid_config_is_400() {
        // Parses fine but fails adjust: no source-dir anywhere.
        let state = state(true);
        let (status, _, _) = call(&state, Method::POST, "/tasks", "[app]\n").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_one_task_serves_queued_config() {
        let state = state(true);
        push_task(&state, 5);
        let (status, _, body) = call(&state, Method::GET, "/tasks/5", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["task-id"], 5);
        assert!(body["tidb"].get("password").is_none());
    }

    #[tokio::test]
    async fn get_one_task_handles_bad_and_missing_ids() {
        let state = state(true);
        let (status, _, body) = call(&state, Method::GET, "/tasks/abc", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("invalid task ID"));

        let (status, _, _) = call(&state, Method::GET, "/tasks/99", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_removes_queued_then_404s() {
        let state = state(true);
        push_task(&state, 7);
        let (status, _, _) = call(&state, Method::DELETE, "/tasks/7", "").await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, _) = call(&state, Method::DELETE, "/tasks/7", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_cancels_the_in_flight_task() {
        let state = state(true);
        let token = CancellationToken::new();
        state.registry.set(token.clone(), Arc::new({
            let mut cfg = crate::config::TaskConfig::default();
            cfg.task_id = 3;
            cfg
        }));

        let (status, _, _) = call(&state, Method::DELETE, "/tasks/3", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(token.is_cancelled());
        // The queue was never touched.
        assert!(state.queue.get().unwrap().is_empty());
    }

    #[tokio::test]
    async fn patch_reorders_the_queue() {
        let state = state(true);
        push_task(&state, 1);
        push_task(&state, 2);
        push_task(&state, 3);

        let (status, _, _) = call(&state, Method::PATCH, "/tasks/3/front", "").await;
        assert_eq!(status, StatusCode::OK);
        let (_, _, body) = call(&state, Method::GET, "/tasks", "").await;
        assert_eq!(body["queue"], serde_json::json!([3, 1, 2]));

        let (status, _, _) = call(&state, Method::PATCH, "/tasks/3/back", "").await;
        assert_eq!(status, StatusCode::OK);
        let (_, _, body) = call(&state, Method::GET, "/tasks", "").await;
        assert_eq!(body["queue"], serde_json::json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn patch_rejects_unknown_verbs_and_missing_ids() {
        let state = state(true);
        push_task(&state, 1);
        let (status, _, _) = call(&state, Method::PATCH, "/tasks/1/sideways", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _, _) = call(&state, Method::PATCH, "/tasks/9/front", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = call(&state, Method::PATCH, "/tasks/x/front", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn patch_outside_server_mode_is_501() {
        let state = state(false);
        let (status, _, _) = call(&state, Method::PATCH, "/tasks/1/front", "").await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn method_mismatches_carry_exact_allow_headers() {
        let state = state(true);
        for (method, uri, allow) in [
            (Method::DELETE, "/tasks", "GET, POST"),
            (Method::POST, "/tasks/1", "GET, DELETE"),
            (Method::GET, "/tasks/1/front", "PATCH"),
            (Method::POST, "/pause", "GET, PUT"),
            (Method::GET, "/resume", "PUT"),
            (Method::DELETE, "/loglevel", "GET, PUT, POST"),
        ] {
            let (status, headers, _) = call(&state, method.clone(), uri, "").await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method} {uri}");
            assert_eq!(
                headers.get(header::ALLOW).unwrap().to_str().unwrap(),
                allow,
                "{method} {uri}"
            );
        }
    }

    #[tokio::test]
    async fn pause_and_resume_toggle_the_gate() {
        let state = state(true);
        let (_, _, body) = call(&state, Method::GET, "/pause", "").await;
        assert_eq!(body["paused"], false);

        let (status, _, _) = call(&state, Method::PUT, "/pause", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.pause.is_paused());

        let (status, _, _) = call(&state, Method::PUT, "/resume", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!state.pause.is_paused());
    }

    #[tokio::test]
    async fn loglevel_round_trip() {
        let _guard = crate::logging::init(&crate::config::LogConfig::default()).unwrap();
        let state = state(true);

        let (status, _, body) = call(&state, Method::GET, "/loglevel", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["level"].is_string());

        let (status, _, _) =
            call(&state, Method::PUT, "/loglevel", r#"{"level":"debug"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(crate::logging::level(), "debug");

        let (status, _, _) =
            call(&state, Method::POST, "/loglevel", r#"{"level":"loud"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = call(&state, Method::PUT, "/loglevel", "not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn root_redirects_to_web() {
        let state = state(false);
        let (status, headers, _) = call(&state, Method::GET, "/", "").await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers.get(header::LOCATION).unwrap(), "/web/");
    }

    #[tokio::test]
    async fn metrics_exposition_is_text() {
        let state = state(false);
        let request = Request::builder()
            .method(Method::GET)
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let response = router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn progress_endpoints_answer() {
        let state = state(false);
        let (status, _, body) = call(&state, Method::GET, "/progress/task", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "idle");

        let (status, _, _) = call(&state, Method::GET, "/progress/table?t=missing", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = call(&state, Method::GET, "/progress/table", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
