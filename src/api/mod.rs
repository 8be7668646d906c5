pub mod handlers;
pub mod models;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::config::ServerConfig;
use crate::AppState;

pub fn create_router(state: Arc<AppState>, server: &ServerConfig) -> Router {
    let router = Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route(
            &controller_route(&server.route),
            get(handlers::controller).post(handlers::controller),
        )
        .layer(DefaultBodyLimit::max(server.max_body_bytes));

    let router = if server.cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };

    router.with_state(state)
}

fn controller_route(route: &str) -> String {
    let route = route.trim();
    if route.starts_with('/') {
        route.to_string()
    } else {
        format!("/{}", route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catcher::{FetchError, RemoteFetcher, RemoteImage};
    use crate::config::ConfigManager;
    use crate::dispatch::{ActionTable, Dispatcher};
    use crate::metrics::Metrics;
    use crate::state::{BasicState, StateCode};
    use crate::storage::{local::LocalStorage, Storage};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use reqwest::Url;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct OfflineFetcher;

    #[async_trait]
    impl RemoteFetcher for OfflineFetcher {
        async fn fetch(
            &self,
            _url: &Url,
            _max_size: u64,
            _blocked_hosts: &[String],
        ) -> Result<RemoteImage, FetchError> {
            Err(FetchError::Transport("offline".to_string()))
        }
    }

    const EDITOR_CONFIG: &str = r#"{
        "imageActionName": "uploadimage",
        "imageAllowFiles": [".png"],
        "imagePathFormat": "/upload/image/{filename}",
        "scrawlPathFormat": "/upload/scrawl/{filename}"
    }"#;

    fn server_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            route: "editor".to_string(),
            max_body_bytes: 1024,
            cors: true,
        }
    }

    async fn app(temp_dir: &TempDir) -> Router {
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(temp_dir.path()).await.unwrap());
        let editor_config = Arc::new(ConfigManager::from_json_str(EDITOR_CONFIG).unwrap());
        let metrics = Arc::new(Metrics::new().unwrap());

        let dispatcher = Dispatcher::new(
            ActionTable::new(),
            editor_config.clone(),
            storage.clone(),
            Arc::new(OfflineFetcher),
            metrics.clone(),
        );

        let state = Arc::new(AppState {
            dispatcher,
            editor_config,
            storage,
            metrics,
        });

        create_router(state, &server_config())
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, String, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let temp_dir = TempDir::new().unwrap();
        let (status, _, body) = send(app(&temp_dir).await, get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        let health: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["editor_config"], true);
    }

    #[tokio::test]
    async fn test_config_with_callback() {
        let temp_dir = TempDir::new().unwrap();
        let (status, content_type, body) =
            send(app(&temp_dir).await, get("/editor?action=config&callback=cb")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "application/javascript; charset=utf-8");
        assert!(body.starts_with("cb({"));
        assert!(body.ends_with("});"));
        assert!(body.contains("\"imageActionName\":\"uploadimage\""));
    }

    #[tokio::test]
    async fn test_failures_still_answer_ok() {
        let temp_dir = TempDir::new().unwrap();

        let (status, content_type, body) =
            send(app(&temp_dir).await, get("/editor?action=nope")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "application/json; charset=utf-8");
        assert_eq!(body, BasicState::failure(StateCode::InvalidAction).serialize());

        let (_, _, body) = send(
            app(&temp_dir).await,
            get("/editor?action=config&callback=x%3Dalert(1)"),
        )
        .await;
        assert_eq!(body, BasicState::failure(StateCode::Illegal).serialize());
    }

    #[tokio::test]
    async fn test_multipart_upload() {
        let temp_dir = TempDir::new().unwrap();
        let body = concat!(
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"upfile\"; filename=\"logo.png\"\r\n",
            "Content-Type: image/png\r\n",
            "\r\n",
            "png!\r\n",
            "--XBOUNDARY--\r\n",
        );
        let request = Request::builder()
            .method("POST")
            .uri("/editor?action=uploadimage")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap();

        let (status, _, body) = send(app(&temp_dir).await, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            r#"{"state": "SUCCESS","size": 4,"title": "logo.png","url": "/upload/image/logo.png","type": ".png","original": "logo.png"}"#
        );
        let stored = std::fs::read(temp_dir.path().join("upload/image/logo.png")).unwrap();
        assert_eq!(stored, b"png!");
    }

    #[tokio::test]
    async fn test_upload_without_multipart_body() {
        let temp_dir = TempDir::new().unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/editor?action=uploadimage")
            .body(Body::from("raw"))
            .unwrap();

        let (_, _, body) = send(app(&temp_dir).await, request).await;
        assert_eq!(body, BasicState::failure(StateCode::NotMultipartContent).serialize());
    }

    #[tokio::test]
    async fn test_scrawl_from_form_body() {
        let temp_dir = TempDir::new().unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/editor?action=uploadscrawl")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("upfile=YWJj"))
            .unwrap();

        let (_, _, body) = send(app(&temp_dir).await, request).await;
        assert_eq!(
            body,
            r#"{"state": "SUCCESS","size": 3,"title": "scrawl.jpg","url": "/upload/scrawl/scrawl.jpg","type": ".jpg","original": ""}"#
        );
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let temp_dir = TempDir::new().unwrap();
        let app = app(&temp_dir).await;

        send(app.clone(), get("/editor?action=listimage")).await;
        let (status, _, body) = send(app, get("/metrics")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("editor_actions_total{action=\"listimage\",outcome=\"failure\"} 1"));
    }
}
