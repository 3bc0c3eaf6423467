//! snapcache: a full-page response cache with deferred-fragment
//! reconciliation.
//!
//! Rendered responses are persisted as snapshots keyed by request path and
//! replayed from storage before the host application's routing runs. Page
//! fragments marked with the [`cache::DEFERRED_MODIFIER`] token are excluded
//! from the snapshot; the delivered page carries placeholder markers that the
//! embedded client script resolves through one batched call to the
//! reconciliation endpoint.
//!
//! Host integration:
//!
//! ```ignore
//! let store = Arc::new(SnapshotStore::open(settings.cache.directory.clone())?);
//! let state = http::CacheState { settings: settings.cache.clone(), store, engine };
//! let app = app_router
//!     .merge(http::router(state.clone()))
//!     .layer(middleware::from_fn_with_state(state, http::page_cache_layer));
//! ```

pub mod assets;
pub mod cache;
pub mod config;
pub mod engine;
pub mod http;
pub mod telemetry;
