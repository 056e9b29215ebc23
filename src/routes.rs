use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::range::RangeHeader;
use crate::server::RangeServer;

/// Maps the identifier in a request URL to a file on disk.
///
/// This is where access checks belong: returning `None` answers 404 without
/// touching the filesystem.
pub trait VideoResolver: Send + Sync + 'static {
    fn resolve(&self, id: &str) -> Option<PathBuf>;
}

/// Resolves identifiers as relative paths below a media directory.
#[derive(Debug, Clone)]
pub struct MediaRoot {
    root: PathBuf,
}

impl MediaRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        MediaRoot { root: root.into() }
    }
}

impl VideoResolver for MediaRoot {
    fn resolve(&self, id: &str) -> Option<PathBuf> {
        let relative = Path::new(id);
        // only plain names: no `..`, no root, no `.`, no prefixes
        let plain = relative.components().all(|c| matches!(c, Component::Normal(_)));
        (!id.is_empty() && plain).then(|| self.root.join(relative))
    }
}

#[derive(Clone)]
struct AppState {
    server: RangeServer,
    resolver: Arc<dyn VideoResolver>,
}

/// `GET /media/{*path}` (and `HEAD`) streaming whatever `resolver` maps the
/// path to.
pub fn router(server: RangeServer, resolver: impl VideoResolver) -> Router {
    let state = AppState { server, resolver: Arc::new(resolver) };
    Router::new()
        .route("/media/{*path}", get(stream_media))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn stream_media(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    let Some(path) = state.resolver.resolve(&id) else {
        tracing::debug!(id = %id, "unresolvable media identifier");
        return StatusCode::NOT_FOUND.into_response();
    };
    let range = RangeHeader::from_header(headers.get(header::RANGE));
    state.server.serve_range(&path, range).await.into_response()
}
