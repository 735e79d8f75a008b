//! HTTP side of the development server.
//!
//! Serves the current in-memory build, then files from the public
//! directory, then (for navigations) the HTML shell so client-side routes
//! survive a reload. Hot updates go out over Server-Sent Events.

use std::convert::Infallible;
use std::path::{Component, Path};
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    extract::{Path as UrlPath, State},
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{
        IntoResponse, Response, Sse,
        sse::{Event, KeepAlive},
    },
    routing::get,
};
use kiln_bundler::{AssetId, OutputKind};
use kiln_config::DevServerConfig;
use tokio::net::TcpListener;
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tower_http::cors::{Any, CorsLayer};

use crate::dev::{SharedState, error_overlay};
use crate::error::{CliError, Result};

/// Server-Sent Events stream of [`DevEvent`](crate::dev::DevEvent)s.
pub const HMR_EVENTS_PATH: &str = "/__kiln_hmr";
/// The browser half of hot module replacement.
pub const HMR_CLIENT_PATH: &str = "/__kiln_hmr.js";

const HMR_CLIENT: &str = include_str!("../../assets/dev/hmr-client.js");

/// Bind the listener. Nothing else is started when this fails.
pub async fn bind(config: &DevServerConfig) -> Result<TcpListener> {
    let address = config.address();
    TcpListener::bind(&address)
        .await
        .map_err(|source| CliError::Bind { address, source })
}

/// Serve until the listener closes.
pub async fn serve(listener: TcpListener, state: SharedState) -> Result<()> {
    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| CliError::Server(e.to_string()))
}

/// Build the axum router with all routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route(HMR_EVENTS_PATH, get(handle_sse))
        .route(HMR_CLIENT_PATH, get(handle_client_script))
        .route("/__kiln_hmr/update/{*id}", get(handle_module_update))
        .fallback(handle_request)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn handle_sse(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let (id, rx) = state.register_client();
    tracing::debug!(client = id, "hmr client connected");

    let stream = ReceiverStream::new(rx).map(|data| Ok(Event::default().data(data)));
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

async fn handle_client_script() -> Response {
    with_type("application/javascript; charset=utf-8", HMR_CLIENT)
}

/// The `__kiln_define(...)` statement for one module.
async fn handle_module_update(
    State(state): State<SharedState>,
    UrlPath(id): UrlPath<String>,
) -> Response {
    let factory = state
        .output()
        .and_then(|output| output.modules.get(&AssetId::new(id.as_str()))?.factory.clone());
    match factory {
        Some(code) => with_type("application/javascript; charset=utf-8", code),
        None => not_found(&id),
    }
}

async fn handle_request(
    State(state): State<SharedState>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    let path = uri.path();

    if let Some(file) = state.lookup(path) {
        if file.kind == OutputKind::Html {
            return shell(&state);
        }
        return with_type(content_type(&file.path), file.contents);
    }

    match state.output_path(path) {
        Some("") => return shell(&state),
        Some(relative) => {
            if relative == "index.html" {
                return shell(&state);
            }
            if let Some(bytes) = read_public(state.public_dir(), relative).await {
                return with_type(content_type(relative), bytes);
            }
        }
        None => {}
    }

    if state.config().history_fallback && wants_html(path, &headers) {
        tracing::debug!(path, "history fallback");
        return shell(&state);
    }
    not_found(path)
}

/// The HTML shell with the HMR client, or the overlay after a failed build.
fn shell(state: &SharedState) -> Response {
    if let Some(error) = state.get_status().error() {
        return html(error_overlay::generate_error_overlay(error));
    }
    let page = state
        .output()
        .and_then(|output| output.html().map(|f| String::from_utf8_lossy(&f.contents).into_owned()));
    match page {
        Some(page) => html(inject_client(&page)),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::RETRY_AFTER, "1")],
            "initial build in progress",
        )
            .into_response(),
    }
}

/// Whether an unmatched request should get the HTML shell.
///
/// Navigations either have no extension in their last segment
/// (`/dashboard/settings`) or explicitly accept HTML.
pub fn wants_html(path: &str, headers: &HeaderMap) -> bool {
    let last = path.rsplit('/').next().unwrap_or_default();
    if !last.contains('.') {
        return true;
    }
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

async fn read_public(public_dir: &Path, relative: &str) -> Option<Vec<u8>> {
    let relative = Path::new(relative);
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return None;
    }
    let path = public_dir.join(relative);
    if !path.is_file() {
        return None;
    }
    match tokio::fs::read(&path).await {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read public file");
            None
        }
    }
}

/// Add the HMR client script before `</body>`, or at the end.
pub fn inject_client(html: &str) -> String {
    let script_tag = format!(r#"<script src="{HMR_CLIENT_PATH}"></script>"#);

    if let Some(pos) = html.rfind("</body>") {
        let mut result = String::with_capacity(html.len() + script_tag.len() + 4);
        result.push_str(&html[..pos]);
        result.push_str("  ");
        result.push_str(&script_tag);
        result.push('\n');
        result.push_str(&html[pos..]);
        return result;
    }

    let mut result = html.to_string();
    result.push('\n');
    result.push_str(&script_tag);
    result
}

fn with_type(content_type: &'static str, body: impl Into<Body>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body.into(),
    )
        .into_response()
}

fn html(page: String) -> Response {
    with_type("text/html; charset=utf-8", page)
}

fn not_found(path: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("File not found: {path}"),
    )
        .into_response()
}

/// Determine content type from file extension.
fn content_type(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    match extension.to_ascii_lowercase().as_str() {
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "html" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "svg" => "image/svg+xml",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}
