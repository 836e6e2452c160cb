//! Embedded web console.
//!
//! The console is a single self-contained page compiled into the binary;
//! it polls `/tasks` and `/progress/task`. Asset resolution mirrors the
//! queue surface's tolerance: an extension-less unknown path redirects to
//! the console root (client-side routes), anything that looks like a file
//! and is missing is a plain 404.

use axum::extract::Path;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use super::write_bytes_compressed;

const INDEX_HTML: &str = include_str!("webui/index.html");

pub(super) async fn index(headers: HeaderMap) -> Response {
    write_bytes_compressed(&headers, "text/html; charset=utf-8", INDEX_HTML.as_bytes().to_vec())
}

pub(super) async fn asset(Path(path): Path<String>, headers: HeaderMap) -> Response {
    match path.as_str() {
        "index.html" => index(headers).await,
        _ if !path.contains('.') => {
            (StatusCode::FOUND, [(header::LOCATION, "/web/")]).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, OnceLock};

    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use tower::util::ServiceExt;

    use crate::config::GlobalConfig;
    use crate::core::{CancelRegistry, PauseGate};
    use crate::http::{router, AppState};
    use crate::metrics::Metrics;
    use crate::progress::ProgressTracker;

    fn app() -> axum::Router {
        router(AppState {
            global: Arc::new(GlobalConfig::default()),
            queue: Arc::new(OnceLock::new()),
            registry: Arc::new(CancelRegistry::new()),
            pause: Arc::new(PauseGate::new()),
            progress: Arc::new(ProgressTracker::new()),
            metrics: Arc::new(Metrics::new().unwrap()),
        })
    }

    async fn get(uri: &str) -> (StatusCode, axum::http::HeaderMap) {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        (response.status(), response.headers().clone())
    }

    #[tokio::test]
    async fn console_index_is_html() {
        let (status, headers) = get("/web/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/html"));
    }

    #[tokio::test]
    async fn extensionless_paths_redirect_to_console() {
        let (status, headers) = get("/web/some/client/route").await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers.get(header::LOCATION).unwrap(), "/web/");
    }

    #[tokio::test]
    async fn missing_assets_are_404() {
        let (status, _) = get("/web/missing.js").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
