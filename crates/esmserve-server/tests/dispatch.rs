//! Integration test: HTTP behavior of the built-in routes, driven through
//! the axum app without a socket.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use esmserve_core::{Config, DevContext, LinkStrategy, ManualWatcher};
use esmserve_server::{build_app, AppState};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn app(config: Config) -> Router {
    let ctx = DevContext::new(config, Arc::new(ManualWatcher::new()));
    build_app(Arc::new(AppState::new(ctx).unwrap()))
}

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "index.html", "<script type=\"module\" src=\"/src/main.js\"></script>");
    write(root, "src/main.js", "import { x } from 'pkg';\nconsole.log(x);\n");
    write(root, "docs/index.html", "<h1>docs</h1>");
    write(root, "node_modules/pkg/package.json", r#"{"name":"pkg","module":"index.js"}"#);
    write(root, "node_modules/pkg/index.js", "export const x = 1;\n");
    dir
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_index_and_module() {
    let dir = project();
    let app = app(Config::new(dir.path().to_path_buf()).with_link_strategy(LinkStrategy::Preload));

    let response = app.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/html; charset=utf-8");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");

    let response = app.clone().oneshot(get("/src/main.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["link"],
        "</@modules/pkg/index.js>; rel=modulepreload"
    );
    let body = body_string(response).await;
    assert!(body.contains("from '/@modules/pkg/index.js'"));

    let response = app.oneshot(get("/@modules/pkg/index.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["cache-control"],
        "public, max-age=31536000, immutable"
    );
}

#[tokio::test]
async fn test_conditional_get_answers_not_modified() {
    let dir = project();
    let app = app(Config::new(dir.path().to_path_buf()));

    let response = app.clone().oneshot(get("/src/main.js")).await.unwrap();
    let etag = response.headers()[header::ETAG].to_str().unwrap().to_string();

    let request = Request::builder()
        .uri("/src/main.js")
        .header(header::IF_NONE_MATCH, &etag)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(response.headers()[header::ETAG], etag.as_str());
    assert!(body_string(response).await.is_empty());
}

#[tokio::test]
async fn test_head_falls_back_to_get() {
    let dir = project();
    let app = app(Config::new(dir.path().to_path_buf()));

    let request = Request::builder()
        .method("HEAD")
        .uri("/src/main.js")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("content-length"));
    assert!(body_string(response).await.is_empty());
}

#[tokio::test]
async fn test_errors_map_to_status() {
    let dir = project();
    write(dir.path(), "src/broken.js", "import 'missing-pkg';\n");
    let app = app(Config::new(dir.path().to_path_buf()));

    let response = app.clone().oneshot(get("/nope.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.clone().oneshot(get("/docs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/docs/index.html");

    let response = app.clone().oneshot(get("/src/broken.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_string(response).await.contains("missing-pkg"));

    let request = Request::builder()
        .method("POST")
        .uri("/src/main.js")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!response.headers().contains_key("x-content-type-options"));
}

#[tokio::test]
async fn test_icon_redirect_and_builtin_icon() {
    let dir = project();
    let app = app(Config::new(dir.path().to_path_buf()));

    let response = app.clone().oneshot(get("/favicon.ico")).await.unwrap();
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
    assert_eq!(location, "/@esmserve/favicon.svg");

    let response = app.oneshot(get(&location)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/svg+xml");
    assert!(body_string(response).await.starts_with("<svg"));
}

#[tokio::test]
async fn test_project_icon_wins_over_redirect() {
    let dir = project();
    write(dir.path(), "favicon.ico", "ico");
    let app = app(Config::new(dir.path().to_path_buf()));

    let response = app.oneshot(get("/favicon.ico")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ico");
}
