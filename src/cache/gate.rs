//! Cache-write eligibility.
//!
//! A pure predicate over the response status and an explicit request-scoped
//! context, so eligibility is testable without any process or transport
//! setup.

use axum::http::StatusCode;

/// Per-handler caching policy, attached to a response as an extension.
///
/// Absent policy means caching is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Allow,
    Disallow,
}

/// Response extension that sets the request-wide no-cache flag.
#[derive(Debug, Clone, Copy)]
pub struct NoCacheFlag;

/// Everything the write gate consults about the request being finished.
#[derive(Debug, Clone, Default)]
pub struct CacheContext {
    /// The responsible handler's own policy; `None` means allowed.
    pub handler_allows: Option<bool>,
    /// Request-wide no-cache flag.
    pub no_cache: bool,
    /// Asynchronous/reconciliation sub-request (XHR indicator present).
    pub is_xhr: bool,
    /// Command-line (non-HTTP) invocation.
    pub is_cli: bool,
    /// Administrative context.
    pub in_admin: bool,
}

/// Whether the finished response may be written to the snapshot store.
///
/// True iff the status is 200 and nothing in the context disallows caching.
pub fn should_cache(status: StatusCode, ctx: &CacheContext) -> bool {
    status == StatusCode::OK
        && ctx.handler_allows.unwrap_or(true)
        && !ctx.no_cache
        && !ctx.is_xhr
        && !ctx.is_cli
        && !ctx.in_admin
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_200_with_permissive_context_is_cacheable() {
        assert!(should_cache(StatusCode::OK, &CacheContext::default()));
    }

    #[test]
    fn non_200_is_never_cacheable() {
        let ctx = CacheContext::default();
        assert!(!should_cache(StatusCode::NOT_FOUND, &ctx));
        assert!(!should_cache(StatusCode::MOVED_PERMANENTLY, &ctx));
        assert!(!should_cache(StatusCode::INTERNAL_SERVER_ERROR, &ctx));
    }

    #[test]
    fn xhr_sub_request_is_not_cacheable_even_on_200() {
        let ctx = CacheContext {
            is_xhr: true,
            ..Default::default()
        };
        assert!(!should_cache(StatusCode::OK, &ctx));
    }

    #[test]
    fn handler_opt_out_blocks_caching() {
        let ctx = CacheContext {
            handler_allows: Some(false),
            ..Default::default()
        };
        assert!(!should_cache(StatusCode::OK, &ctx));
    }

    #[test]
    fn absent_handler_policy_is_permissive() {
        let explicit = CacheContext {
            handler_allows: Some(true),
            ..Default::default()
        };
        assert!(should_cache(StatusCode::OK, &explicit));
        assert!(should_cache(StatusCode::OK, &CacheContext::default()));
    }

    #[test]
    fn process_flags_block_caching() {
        for ctx in [
            CacheContext {
                no_cache: true,
                ..Default::default()
            },
            CacheContext {
                is_cli: true,
                ..Default::default()
            },
            CacheContext {
                in_admin: true,
                ..Default::default()
            },
        ] {
            assert!(!should_cache(StatusCode::OK, &ctx));
        }
    }
}
