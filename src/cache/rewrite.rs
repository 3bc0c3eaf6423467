//! Response body rewriting before a snapshot is persisted.
//!
//! Every deferred fragment's rendered output is swapped for its placeholder
//! marker, then the body goes through generic whitespace cleanup. The
//! substitution is content-based: each literal occurrence of the rendered
//! string is replaced, wherever it appears.

use super::fragments::{DeferredRegistry, placeholder_block};

/// Replace deferred fragment renderings with placeholder markers and tidy
/// the result for storage.
pub fn rewrite(body: &str, registry: &DeferredRegistry) -> String {
    let mut body = body.to_string();
    for (expression, content) in registry.entries() {
        if content.is_empty() {
            continue;
        }
        body = body.replace(&content, &placeholder_block(&expression));
    }
    tidy(&body)
}

/// Strip carriage returns, tabs, and runs of three or more spaces, then trim.
///
/// Applied after placeholder substitution so markers are never corrupted.
fn tidy(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut pending_spaces = 0usize;
    for c in body.chars() {
        match c {
            '\r' | '\t' => {}
            ' ' => pending_spaces += 1,
            _ => {
                flush_spaces(&mut out, &mut pending_spaces);
                out.push(c);
            }
        }
    }
    flush_spaces(&mut out, &mut pending_spaces);
    out.trim().to_string()
}

fn flush_spaces(out: &mut String, pending: &mut usize) {
    if *pending > 0 && *pending < 3 {
        for _ in 0..*pending {
            out.push(' ');
        }
    }
    *pending = 0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fragments::MARKER_CLASS;

    #[test]
    fn every_occurrence_is_replaced_with_a_marker() {
        let registry = DeferredRegistry::new();
        registry.mark("E1", "C1");

        let body = "<p>C1</p><div>filler</div><p>C1</p>";
        let rewritten = rewrite(body, &registry);

        assert!(!rewritten.contains("C1"));
        assert_eq!(rewritten.matches(MARKER_CLASS).count(), 2);
        assert_eq!(rewritten.matches(r#"data-insertion-str="E1""#).count(), 2);
    }

    #[test]
    fn unrelated_content_survives() {
        let registry = DeferredRegistry::new();
        registry.mark("menu", "<nav>menu</nav>");

        let rewritten = rewrite("<nav>menu</nav><p>article text</p>", &registry);
        assert!(rewritten.contains("<p>article text</p>"));
        assert!(rewritten.contains(MARKER_CLASS));
    }

    #[test]
    fn empty_registry_only_tidies() {
        let registry = DeferredRegistry::new();
        let rewritten = rewrite("  <p>a\tb\r\n</p>   trailing   ", &registry);
        assert_eq!(rewritten, "<p>ab\n</p>trailing");
    }

    #[test]
    fn short_space_runs_are_kept() {
        let registry = DeferredRegistry::new();
        assert_eq!(rewrite("a b  c   d", &registry), "a b  cd");
    }

    #[test]
    fn cleanup_runs_after_substitution() {
        let registry = DeferredRegistry::new();
        registry.mark("w", "<b>w</b>");

        // The marker contains double spaces nowhere and must come through
        // intact even though the surrounding body is scrubbed.
        let rewritten = rewrite("\t<b>w</b>   \r", &registry);
        assert_eq!(rewritten, placeholder_block("w"));
    }
}
