//! Development server routes, exercised through the router without binding.

mod helpers;

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use helpers::*;
use kiln_cli::CliError;
use kiln_cli::dev::{self, DevBuilder, DevServerState, SharedState};
use kiln_config::{BuildMode, ConfigLoader, DevServerConfig};
use tempfile::TempDir;
use tower::ServiceExt;

async fn start(dir: &TempDir) -> (DevBuilder, SharedState) {
    let config = ConfigLoader::new(dir.path())
        .without_env()
        .load_effective(BuildMode::Development)
        .unwrap();
    let state = Arc::new(DevServerState::new(
        DevServerConfig::from_effective(&config),
        config.public_dir.clone(),
        config.public_path.clone(),
    ));
    let builder = DevBuilder::new(config);
    assert!(builder.rebuild(&state).await);
    (builder, state)
}

async fn get(state: &SharedState, uri: &str) -> (StatusCode, String) {
    send(state, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn send(state: &SharedState, request: Request<Body>) -> (StatusCode, String) {
    let response = dev::build_router(Arc::clone(state))
        .oneshot(request)
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&body).into_owned())
}

#[tokio::test]
async fn test_unknown_route_gets_the_shell() {
    let dir = project();
    let (_builder, state) = start(&dir).await;

    let (status, body) = get(&state, "/dashboard/settings").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<div id=\"app\"></div>"));
    assert!(body.contains("<script src=\"/__kiln_hmr.js\"></script>"));

    let (_, root) = get(&state, "/").await;
    assert_eq!(root, body);
}

#[tokio::test]
async fn test_built_assets_are_served_unmodified() {
    let dir = project();
    let (_builder, state) = start(&dir).await;
    let output = state.output().unwrap();
    let script = output.file("static/js/main.js").unwrap();

    let (status, body) = get(&state, "/static/js/main.js").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_bytes(), script.contents.as_slice());
    assert!(!dir.path().join("dist").exists());
}

#[tokio::test]
async fn test_public_files_are_served_from_disk() {
    let dir = project();
    let (_builder, state) = start(&dir).await;

    let (status, body) = get(&state, "/robots.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "User-agent: *\n");
}

#[tokio::test]
async fn test_missing_asset_is_not_found() {
    let dir = project();
    let (_builder, state) = start(&dir).await;

    let (status, _) = get(&state, "/static/js/missing.js").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&state, "/../kiln.toml").await;
    assert_ne!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_navigation_to_dotted_path_gets_the_shell() {
    let dir = project();
    let (_builder, state) = start(&dir).await;

    let request = Request::get("/users/jane.doe")
        .header(header::ACCEPT, "text/html,application/xhtml+xml")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&state, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<div id=\"app\"></div>"));
}

#[tokio::test]
async fn test_non_get_requests_are_rejected() {
    let dir = project();
    let (_builder, state) = start(&dir).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/dashboard")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&state, request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_hmr_client_and_module_factories() {
    let dir = project();
    let (_builder, state) = start(&dir).await;

    let (status, client) = get(&state, "/__kiln_hmr.js").await;
    assert_eq!(status, StatusCode::OK);
    assert!(client.contains("new EventSource(\"/__kiln_hmr\")"));

    let (status, factory) = get(&state, "/__kiln_hmr/update/src%2Futil.js").await;
    assert_eq!(status, StatusCode::OK);
    assert!(factory.contains("__kiln_define("));
    assert!(factory.contains("hello "));

    let (status, _) = get(&state, "/__kiln_hmr/update/src%2Fnope.js").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_hot_accepting_change_is_pushed_as_update() {
    let dir = project();
    let (builder, state) = start(&dir).await;
    let (_id, mut events) = state.register_client();
    assert_eq!(events.recv().await.unwrap(), r#"{"type":"connected"}"#);

    write(
        dir.path(),
        "src/util.js",
        "export function greet(name) {\n  return \"hi \" + name;\n}\n\nif (module.hot) {\n  module.hot.accept();\n}\n",
    );
    assert!(builder.rebuild(&state).await);
    assert_eq!(
        events.recv().await.unwrap(),
        r#"{"type":"update","modules":["src/util.js"]}"#
    );

    write(
        dir.path(),
        "src/main.js",
        "import { greet } from \"./util.js\";\nimport \"./main.css\";\n\nconsole.info(greet(\"again\"));\n",
    );
    assert!(builder.rebuild(&state).await);
    assert_eq!(events.recv().await.unwrap(), r#"{"type":"reload"}"#);
}

#[tokio::test]
async fn test_failed_rebuild_shows_overlay_and_keeps_assets() {
    let dir = project();
    let (builder, state) = start(&dir).await;
    let (_id, mut events) = state.register_client();
    events.recv().await.unwrap();

    write(dir.path(), "src/util.js", "export function greet( {\n");
    assert!(!builder.rebuild(&state).await);

    let event = events.recv().await.unwrap();
    assert!(event.starts_with(r#"{"type":"build-failed","error":"#));

    let (status, body) = get(&state, "/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Build failed"));

    let (status, _) = get(&state, "/static/js/main.js").await;
    assert_eq!(status, StatusCode::OK);

    write(
        dir.path(),
        "src/util.js",
        "export function greet(name) {\n  return name;\n}\n",
    );
    assert!(builder.rebuild(&state).await);
    assert_eq!(events.recv().await.unwrap(), r#"{"type":"reload"}"#);
}

#[tokio::test]
async fn test_port_in_use_fails_to_bind() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let config = DevServerConfig {
        host: "127.0.0.1".to_string(),
        port,
        open: false,
        hot_reload: true,
        history_fallback: true,
        debounce_ms: 50,
    };

    let err = dev::bind(&config).await.unwrap_err();
    assert!(matches!(err, CliError::Bind { .. }));
    assert!(err.to_string().contains(&format!("127.0.0.1:{port}")));
}
