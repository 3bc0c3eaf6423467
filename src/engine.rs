//! Interfaces to the external rendering engine.
//!
//! The cache never renders anything itself. The host application supplies a
//! [`FragmentEngine`] that turns a fragment expression into content, and the
//! engine's insertion hook reports deferred fragments to the per-request
//! [`DeferredSink`] it is handed during a render pass.

use std::error::Error as StdError;

use async_trait::async_trait;
use thiserror::Error;

/// Failure of the external rendering engine.
///
/// The only error class allowed to surface from the cache paths; everything
/// else degrades to a cache miss.
#[derive(Debug, Error)]
#[error("fragment render failed: {message}")]
pub struct FragmentError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl FragmentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Renders a fragment expression to content.
///
/// Assumed synchronous in spirit: the returned future runs to completion
/// per fragment, and any caching the engine does is its own business.
/// Distinct fragments are independent and may be rendered concurrently.
#[async_trait]
pub trait FragmentEngine: Send + Sync {
    async fn render(&self, expression: &str) -> Result<String, FragmentError>;
}

/// Capability handed to the rendering engine for the duration of one render
/// pass: receives `(expression, content)` for every fragment whose insertion
/// carried the deferred-load modifier.
pub trait DeferredSink: Send + Sync {
    fn mark(&self, expression: &str, content: &str);
}
