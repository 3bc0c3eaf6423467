//! The fast serving path.
//!
//! Runs before anything else touches a request: one store lookup, and either
//! a complete stored response or an explicit instruction to continue with
//! normal processing. Nothing here depends on routing, handlers, or the
//! rendering engine.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use metrics::counter;
use tracing::{debug, warn};

use super::keys::CacheKey;
use super::store::{ResponseSnapshot, SnapshotStore};

/// Outcome of the pre-route cache check.
#[derive(Debug)]
pub enum ServeDecision {
    /// A complete snapshot exists; write it to the transport and stop.
    Serve(ResponseSnapshot),
    /// No usable snapshot; hand the request to normal processing.
    Continue,
}

/// Look the request path up in the store.
///
/// Read failures and malformed records degrade to [`ServeDecision::Continue`];
/// a record that fails to decode is purged so it is not re-read on every hit
/// attempt. The snapshot is fully decoded before anything is emitted, so a
/// partially usable record can never corrupt an in-flight response.
pub async fn lookup(store: &SnapshotStore, path: &str) -> ServeDecision {
    let key = CacheKey::for_path(path);
    match store.read(&key).await {
        Ok(Some(snapshot)) => {
            counter!("snapcache_hit_total").increment(1);
            debug!(cache = "page", outcome = "hit", %key, "serving stored snapshot");
            ServeDecision::Serve(snapshot)
        }
        Ok(None) => {
            counter!("snapcache_miss_total").increment(1);
            debug!(cache = "page", outcome = "miss", %key, "no snapshot, continuing");
            ServeDecision::Continue
        }
        Err(err) => {
            warn!(cache = "page", %key, error = %err, "snapshot unreadable, treating as miss");
            if let Err(err) = store.delete(&key).await {
                warn!(cache = "page", %key, error = %err, "failed to purge unreadable snapshot");
            }
            ServeDecision::Continue
        }
    }
}

/// Assemble the transport response for a stored snapshot.
///
/// Stored headers are applied in their original order; names or values that
/// no longer parse are skipped rather than failing the whole response.
pub fn build_response(snapshot: ResponseSnapshot) -> Response {
    let status = StatusCode::from_u16(snapshot.status_code).unwrap_or(StatusCode::OK);
    let mut response = Response::new(Body::from(snapshot.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in snapshot.headers.iter_pairs() {
        match (
            HeaderName::try_from(name),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => {
                warn!(cache = "page", header = name, "skipping unparsable stored header");
            }
        }
    }
    response
}
