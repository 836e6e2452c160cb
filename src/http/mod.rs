//! # HTTP control plane.
//!
//! A single router carrying the whole REST surface over the queue, the
//! cancellation registry, the pause gate, the log level, the progress
//! tracker and the metrics registry:
//!
//! | Path | Methods | Behavior |
//! |---|---|---|
//! | `/` | GET | 302 → `/web/` |
//! | `/web/...` | GET | Embedded console assets |
//! | `/metrics` | GET | Prometheus exposition |
//! | `/debug/pprof/...` | GET | Profiling endpoints (seam) |
//! | `/tasks` | GET, POST | Queue snapshot / enqueue TOML task |
//! | `/tasks/{id}` | GET, DELETE | Task config / cancel-or-remove |
//! | `/tasks/{id}/front`, `/tasks/{id}/back` | PATCH | Reorder |
//! | `/progress/task`, `/progress/table?t=` | GET | Progress snapshots |
//! | `/pause`, `/resume` | GET, PUT / PUT | Pause gate |
//! | `/loglevel` | GET, PUT, POST | Runtime log level |
//!
//! ## Shared rules
//! - `Content-Type: application/json` everywhere except static assets and
//!   the metrics exposition.
//! - Errors are `{"error": "<prefix>: <detail>"}`.
//! - Method mismatches answer 405 with an exact `Allow` header.
//! - Bodies of at least [`GZIP_MIN_LENGTH`] bytes are gzip-compressed at
//!   fastest-speed level when the client accepts gzip.

mod debug;
mod handlers;
mod server;
mod web;

use std::io::Write as _;
use std::sync::{Arc, OnceLock};

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, put};
use axum::{Json, Router};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::config::GlobalConfig;
use crate::core::{CancelRegistry, PauseGate, TaskQueue};
use crate::metrics::Metrics;
use crate::progress::ProgressTracker;

pub use server::StatusServer;

/// Bodies below this size are never compressed; one MTU of JSON is cheaper
/// to send than to deflate.
pub(crate) const GZIP_MIN_LENGTH: usize = 1400;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub global: Arc<GlobalConfig>,
    /// Installed by `run_server`; `None` until then, which is how the POST
    /// handler knows the process is not in server mode.
    pub queue: Arc<OnceLock<Arc<TaskQueue>>>,
    pub registry: Arc<CancelRegistry>,
    pub pause: Arc<PauseGate>,
    pub progress: Arc<ProgressTracker>,
    pub metrics: Arc<Metrics>,
}

/// Builds the control-plane router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/web", get(handlers::web_redirect))
        .route("/web/", get(web::index))
        .route("/web/{*path}", get(web::asset))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/tasks",
            get(handlers::get_tasks)
                .post(handlers::post_task)
                .fallback(handlers::tasks_collection_405),
        )
        // An empty id addresses the collection.
        .route(
            "/tasks/",
            get(handlers::get_tasks)
                .post(handlers::post_task)
                .fallback(handlers::tasks_collection_405),
        )
        .route(
            "/tasks/{id}",
            get(handlers::get_one_task)
                .delete(handlers::delete_one_task)
                .fallback(handlers::task_entry_405),
        )
        .route(
            "/tasks/{id}/{verb}",
            patch(handlers::patch_one_task).fallback(handlers::task_verb_405),
        )
        .route("/progress/task", get(handlers::progress_task))
        .route("/progress/table", get(handlers::progress_table))
        .route(
            "/pause",
            get(handlers::get_pause)
                .put(handlers::put_pause)
                .fallback(handlers::pause_405),
        )
        .route(
            "/resume",
            put(handlers::put_resume).fallback(handlers::resume_405),
        )
        .route(
            "/loglevel",
            get(handlers::get_log_level)
                .put(handlers::set_log_level)
                .post(handlers::set_log_level)
                .fallback(handlers::loglevel_405),
        )
        .merge(debug::router())
        .with_state(state)
}

/// `{"error": "<prefix>: <detail>"}` with the given status.
pub(crate) fn json_error(code: StatusCode, prefix: &str, detail: Option<String>) -> Response {
    let message = match detail {
        Some(detail) => format!("{prefix}: {detail}"),
        None => prefix.to_string(),
    };
    (code, Json(serde_json::json!({ "error": message }))).into_response()
}

/// 405 with the exact `Allow` header for the route.
pub(crate) fn method_not_allowed(allow: &'static str, hint: &'static str) -> Response {
    let mut response = json_error(StatusCode::METHOD_NOT_ALLOWED, hint, None);
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(allow));
    response
}

/// Writes a body, gzip-compressed at fastest level when the client accepts
/// gzip and the body crosses the size threshold.
pub(crate) fn write_bytes_compressed(
    request_headers: &HeaderMap,
    content_type: &'static str,
    body: Vec<u8>,
) -> Response {
    let accepts_gzip = request_headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("gzip"))
        .unwrap_or(false);

    if accepts_gzip && body.len() >= GZIP_MIN_LENGTH {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        let compressed = encoder
            .write_all(&body)
            .and_then(|()| encoder.finish())
            .ok();
        if let Some(compressed) = compressed {
            return (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CONTENT_ENCODING, "gzip"),
                ],
                compressed,
            )
                .into_response();
        }
    }
    (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(accept_encoding: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(v) = accept_encoding {
            map.insert(header::ACCEPT_ENCODING, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn large_bodies_gzip_when_accepted() {
        let body = vec![b'a'; GZIP_MIN_LENGTH * 2];
        let response =
            write_bytes_compressed(&headers(Some("gzip, deflate")), "application/json", body);
        assert_eq!(
            response.headers().get(header::CONTENT_ENCODING).unwrap(),
            "gzip"
        );
    }

    #[test]
    fn small_or_unaccepted_bodies_stay_plain() {
        let small = vec![b'a'; 16];
        let response = write_bytes_compressed(&headers(Some("gzip")), "application/json", small);
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());

        let large = vec![b'a'; GZIP_MIN_LENGTH * 2];
        let response = write_bytes_compressed(&headers(None), "application/json", large);
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[test]
    fn method_not_allowed_sets_allow_header() {
        let response = method_not_allowed("GET, PUT", "only GET and PUT are allowed");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "GET, PUT");
    }
}
