//! Profiling endpoints.
//!
//! The route shape follows the conventional `/debug/pprof/` layout so
//! operator tooling finds it; capture itself is an integration seam. The
//! index enumerates the profile names, and requesting a profile reports
//! 501 until a profiler backend is linked into the build.

use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use super::{json_error, AppState};

const PROFILES: &[&str] = &["profile", "heap", "trace", "cmdline", "symbol"];

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/debug/pprof/", get(index))
        .route("/debug/pprof/{profile}", get(profile))
}

async fn index() -> Response {
    let mut body = String::from("/debug/pprof/\n\nprofiles:\n");
    for name in PROFILES {
        body.push_str(name);
        body.push('\n');
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

async fn profile(Path(profile): Path<String>) -> Response {
    if PROFILES.contains(&profile.as_str()) {
        json_error(
            StatusCode::NOT_IMPLEMENTED,
            "profiling backend not linked into this build",
            Some(profile),
        )
    } else {
        json_error(StatusCode::NOT_FOUND, "unknown profile", Some(profile))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, OnceLock};

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use tower::util::ServiceExt;

    use crate::config::GlobalConfig;
    use crate::core::{CancelRegistry, PauseGate};
    use crate::http::{router, AppState};
    use crate::metrics::Metrics;
    use crate::progress::ProgressTracker;

    #[tokio::test]
    async fn index_lists_profiles_and_capture_is_501() {
        let app = router(AppState {
            global: Arc::new(GlobalConfig::default()),
            queue: Arc::new(OnceLock::new()),
            registry: Arc::new(CancelRegistry::new()),
            pause: Arc::new(PauseGate::new()),
            progress: Arc::new(ProgressTracker::new()),
            metrics: Arc::new(Metrics::new().unwrap()),
        });

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/debug/pprof/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/debug/pprof/profile")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }
}
