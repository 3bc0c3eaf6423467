//! axum integration.
//!
//! The host application owns its router and rendering; this module supplies
//! the outermost [`page_cache_layer`] middleware plus a small [`router`] that
//! mounts the reconciliation endpoint and the embedded client script.

mod reconcile;

pub use reconcile::{ReconciledFragment, reconcile};

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use metrics::counter;
use tracing::{debug, instrument, warn};

use crate::assets;
use crate::cache::{
    CacheContext, CacheKey, CachePolicy, DeferredRegistry, NoCacheFlag, ResponseSnapshot,
    ServeDecision, SnapshotHeaders, SnapshotStore, build_response, lookup, rewrite, should_cache,
};
use crate::config::CacheSettings;
use crate::engine::FragmentEngine;

/// Conventional XHR indicator header used by reconciliation sub-requests.
pub const XHR_HEADER: &str = "x-requested-with";
const XHR_VALUE: &str = "xmlhttprequest";

/// Route of the batched fragment reconciliation endpoint.
pub const RECONCILE_PATH: &str = "/ajax-load-insertions";

/// Route the embedded client reconciler script is served from.
pub const CLIENT_SCRIPT_PATH: &str = "/static/cache/ajax_load.js";
const CLIENT_ASSET_PREFIX: &str = "/static/cache/";

/// Shared state for the cache middleware and routes.
#[derive(Clone)]
pub struct CacheState {
    pub settings: CacheSettings,
    pub store: Arc<SnapshotStore>,
    pub engine: Arc<dyn FragmentEngine>,
}

/// Routes owned by the cache: reconciliation and the client script.
pub fn router(state: CacheState) -> Router {
    Router::new()
        .route(RECONCILE_PATH, post(reconcile))
        .route("/static/cache/{*path}", get(assets::serve))
        .with_state(state)
}

/// Full-page cache middleware. Mount outermost, around the host router.
///
/// Hits are answered straight from the store and terminate the request
/// before routing. Misses run the handler with a fresh [`DeferredRegistry`]
/// in the request extensions; once the response is complete the write gate
/// decides whether a rewritten snapshot is persisted. Persistence is
/// best-effort: store failures are logged and the response is delivered
/// un-cached.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn page_cache_layer(
    State(cache): State<CacheState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.settings.enabled {
        return next.run(request).await;
    }

    if request.method() != Method::GET {
        return next.run(request).await;
    }

    // Reconciliation and other XHR sub-requests are never served from the
    // cache; they must reach their handlers.
    if is_xhr(request.headers()) {
        return next.run(request).await;
    }

    // The cache's own embedded assets are served from memory; snapshotting
    // them would only duplicate immutable bytes.
    if request.uri().path().starts_with(CLIENT_ASSET_PREFIX) {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    if let ServeDecision::Serve(snapshot) = lookup(&cache.store, &path).await {
        return build_response(snapshot);
    }

    let registry = Arc::new(DeferredRegistry::new());
    request.extensions_mut().insert(Arc::clone(&registry));

    let response = next.run(request).await;

    let ctx = CacheContext {
        handler_allows: response
            .extensions()
            .get::<CachePolicy>()
            .map(|policy| *policy == CachePolicy::Allow),
        no_cache: response.extensions().get::<NoCacheFlag>().is_some(),
        is_xhr: false,
        is_cli: false,
        in_admin: in_admin(&cache.settings, &path),
    };
    if !should_cache(response.status(), &ctx) {
        return response;
    }

    persist_snapshot(&cache, &path, response, &registry).await
}

/// Buffer the response, persist a rewritten snapshot, and rebuild the
/// original response for delivery.
async fn persist_snapshot(
    cache: &CacheState,
    path: &str,
    response: Response,
    registry: &DeferredRegistry,
) -> Response {
    let (parts, body) = response.into_parts();
    let bytes: Bytes = match BodyExt::collect(body).await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!(cache = "page", error = %err, "failed to buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let Ok(live_body) = std::str::from_utf8(&bytes) else {
        debug!(cache = "page", "non-utf8 body, skipping snapshot");
        return Response::from_parts(parts, Body::from(bytes));
    };

    let mut stored_body = rewrite(live_body, registry);
    if !registry.is_empty() {
        stored_body = inject_reconciler_script(&stored_body);
    }

    let snapshot = ResponseSnapshot {
        headers: snapshot_headers(&parts.headers),
        body: stored_body,
        status_code: parts.status.as_u16(),
        status: status_line(parts.status),
    };

    let key = CacheKey::for_path(path);
    match cache.store.write(&key, &snapshot).await {
        Ok(()) => {
            counter!("snapcache_write_total").increment(1);
            debug!(cache = "page", %key, deferred = registry.entries().len(), "snapshot stored");
        }
        Err(err) => {
            counter!("snapcache_write_error_total").increment(1);
            warn!(cache = "page", %key, error = %err, "snapshot write failed, response delivered un-cached");
        }
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn is_xhr(headers: &HeaderMap) -> bool {
    headers
        .get(XHR_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case(XHR_VALUE))
}

fn in_admin(settings: &CacheSettings, path: &str) -> bool {
    settings
        .admin_prefix
        .as_deref()
        .is_some_and(|prefix| path.starts_with(prefix))
}

/// Headers persisted with a snapshot, in response order.
///
/// Body framing headers are dropped: the stored body is rewritten, so the
/// original length no longer holds and the transport recomputes framing on
/// replay.
fn snapshot_headers(headers: &HeaderMap) -> SnapshotHeaders {
    let mut stored = SnapshotHeaders::new();
    for (name, value) in headers {
        if name == axum::http::header::CONTENT_LENGTH
            || name == axum::http::header::TRANSFER_ENCODING
        {
            continue;
        }
        if let Ok(value) = value.to_str() {
            stored.push(name.as_str(), value);
        }
    }
    stored
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}

/// Add the client reconciler to the stored page so placeholders resolve on
/// every later view.
fn inject_reconciler_script(body: &str) -> String {
    let tag = format!(r#"<script src="{CLIENT_SCRIPT_PATH}" defer></script>"#);
    match body.find("</head>") {
        Some(idx) => {
            let mut out = String::with_capacity(body.len() + tag.len());
            out.push_str(&body[..idx]);
            out.push_str(&tag);
            out.push_str(&body[idx..]);
            out
        }
        None => format!("{tag}{body}"),
    }
}
