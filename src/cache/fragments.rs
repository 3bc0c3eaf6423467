//! Deferred-fragment tracking for a single render pass.
//!
//! A fragment expression carrying the `:AJAX_LOAD` modifier is rendered as
//! usual but also registered here, keyed by the expression with the modifier
//! stripped. The rewriter later swaps each registered rendering for an inert
//! placeholder marker that the client reconciles after delivery.

use std::sync::{Mutex, PoisonError};

use crate::engine::DeferredSink;

/// Modifier token that flags a fragment expression for deferred loading.
pub const DEFERRED_MODIFIER: &str = ":AJAX_LOAD";

/// Class attribute that identifies a placeholder marker in delivered HTML.
pub const MARKER_CLASS: &str = "ajax-load-insertions";

/// Data attribute on a marker carrying the fragment expression.
pub const MARKER_ATTRIBUTE: &str = "data-insertion-str";

/// If `raw` carries the deferred-load modifier, return the expression with
/// every occurrence of the token removed and whitespace trimmed.
///
/// The returned string is the registry key, the marker payload, and the
/// exact expression re-rendered at reconciliation time. Detection is
/// case-insensitive.
pub fn deferred_expression(raw: &str) -> Option<String> {
    let lower = raw.to_ascii_lowercase();
    let token = DEFERRED_MODIFIER.to_ascii_lowercase();
    if !lower.contains(&token) {
        return None;
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    let mut rest_lower = lower.as_str();
    while let Some(idx) = rest_lower.find(&token) {
        out.push_str(&rest[..idx]);
        rest = &rest[idx + token.len()..];
        rest_lower = &rest_lower[idx + token.len()..];
    }
    out.push_str(rest);
    Some(out.trim().to_string())
}

/// Build the placeholder marker for a deferred fragment expression.
///
/// The expression is attribute-escaped; the browser's attribute parsing
/// unescapes it identically, so the client-side lookup key matches the
/// registry key byte for byte.
pub fn placeholder_block(expression: &str) -> String {
    format!(
        r#"<div class="{MARKER_CLASS}" {MARKER_ATTRIBUTE}="{}"></div>"#,
        escape_attribute(expression)
    )
}

/// Escape a string for embedding in a double-quoted HTML attribute.
pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Registry of deferred fragments marked during one render pass.
///
/// One entry per unique normalized expression, no matter how often it occurs
/// in the page; re-marking an expression overwrites its content. A fresh
/// registry is created per request and shared with the rendering engine as
/// its [`DeferredSink`].
#[derive(Debug, Default)]
pub struct DeferredRegistry {
    entries: Mutex<Vec<(String, String)>>,
}

impl DeferredRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register rendered content for a normalized expression.
    pub fn mark(&self, expression: &str, content: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, existing)) = entries.iter_mut().find(|(e, _)| e == expression) {
            *existing = content.to_string();
        } else {
            entries.push((expression.to_string(), content.to_string()));
        }
    }

    /// Entries in first-marked order.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl DeferredSink for DeferredRegistry {
    fn mark(&self, expression: &str, content: &str) {
        DeferredRegistry::mark(self, expression, content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_is_stripped_and_trimmed() {
        assert_eq!(
            deferred_expression("menu('main'):AJAX_LOAD").as_deref(),
            Some("menu('main')")
        );
        assert_eq!(
            deferred_expression("  widget:AJAX_LOAD  ").as_deref(),
            Some("widget")
        );
    }

    #[test]
    fn modifier_detection_is_case_insensitive() {
        assert_eq!(
            deferred_expression("widget:ajax_load").as_deref(),
            Some("widget")
        );
        assert_eq!(
            deferred_expression("widget:Ajax_Load").as_deref(),
            Some("widget")
        );
    }

    #[test]
    fn plain_expression_is_not_deferred() {
        assert!(deferred_expression("menu('main')").is_none());
    }

    #[test]
    fn marker_carries_escaped_expression() {
        let marker = placeholder_block(r#"teaser("a" & <b>)"#);
        assert!(marker.contains(r#"class="ajax-load-insertions""#));
        assert!(marker.contains(r#"data-insertion-str="teaser(&quot;a&quot; &amp; &lt;b&gt;)""#));
    }

    #[test]
    fn registry_deduplicates_by_expression() {
        let registry = DeferredRegistry::new();
        registry.mark("menu", "first");
        registry.mark("menu", "second");
        registry.mark("widget", "w");

        let entries = registry.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], ("menu".to_string(), "second".to_string()));
        assert_eq!(entries[1], ("widget".to_string(), "w".to_string()));
    }

    #[test]
    fn registry_starts_empty() {
        let registry = DeferredRegistry::new();
        assert!(registry.is_empty());
        registry.mark("x", "y");
        assert!(!registry.is_empty());
    }
}
