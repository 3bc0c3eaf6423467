//! Full-page response cache.
//!
//! A rendered response is persisted as a snapshot keyed by its request path;
//! later identical requests are answered from the store before routing or
//! rendering run at all. Page fragments marked for deferred loading are
//! excluded from the snapshot and re-rendered per view through the
//! reconciliation endpoint.
//!
//! ## Configuration
//!
//! Controlled via `snapcache.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! directory = "cache/pages"
//! admin_prefix = "/admin"
//! ```

mod fragments;
mod gate;
mod keys;
mod rewrite;
mod serving;
mod store;

pub use fragments::{
    DEFERRED_MODIFIER, DeferredRegistry, MARKER_ATTRIBUTE, MARKER_CLASS, deferred_expression,
    escape_attribute, placeholder_block,
};
pub use gate::{CacheContext, CachePolicy, NoCacheFlag, should_cache};
pub use keys::CacheKey;
pub use rewrite::rewrite;
pub use serving::{ServeDecision, build_response, lookup};
pub use store::{ResponseSnapshot, SnapshotError, SnapshotHeaders, SnapshotStore};
