//! Pre- and post-render passes around the Markdown renderer.
//!
//! Each pass is a function `&str -> String` (or a span finder used by the
//! pass and by the prose mask).

use std::ops::Range;
use std::sync::LazyLock;

use pulldown_cmark::{Options, Parser, html};
use regex::Regex;

static FRONTMATTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A---[ \t]*\r?\n[\s\S]*?\r?\n---[ \t]*(?:\r?\n|\z)").expect("valid regex")
});

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^import\s+.*?from\s+['"].*?['"];?[ \t]*(?:\r?\n|\z)"#).expect("valid regex")
});

/// Span of a leading YAML frontmatter block, if any.
pub(crate) fn frontmatter_span(src: &str) -> Option<Range<usize>> {
    FRONTMATTER_RE.find(src).map(|m| m.range())
}

/// Spans of ES-module import lines.
pub(crate) fn import_spans(src: &str) -> Vec<Range<usize>> {
    IMPORT_RE.find_iter(src).map(|m| m.range()).collect()
}

/// Remove the given non-overlapping, ordered spans from `src`.
pub(crate) fn remove_spans(src: &str, spans: &[Range<usize>]) -> String {
    let mut out = String::with_capacity(src.len());
    let mut last = 0;
    for span in spans {
        out.push_str(&src[last..span.start]);
        last = span.end;
    }
    out.push_str(&src[last..]);
    out
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render lightweight markup to HTML.
pub(crate) fn render_markdown(md: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(md, options);
    let mut out = String::with_capacity(md.len() + md.len() / 4);
    html::push_html(&mut out, parser);
    out
}

/// Remove whitespace-only lines so a fragment stays inside one HTML block.
pub(crate) fn drop_blank_lines(html: &str) -> String {
    html.lines()
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Post-render passes
// ---------------------------------------------------------------------------

/// Run the post-render cleanup pipeline.
pub(crate) fn run_pipeline(html: &str) -> String {
    let mut result = html.to_string();

    result = collapse_blank_lines(&result);
    result = remove_empty_paragraphs(&result);

    result.trim().to_string()
}

/// Collapse runs of 3+ newlines into one blank line.
fn collapse_blank_lines(html: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(html, "\n\n").to_string()
}

/// Drop `<p></p>` artifacts left where components or CTAs were removed.
fn remove_empty_paragraphs(html: &str) -> String {
    static EMPTY_P_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?:<p>\s*</p>\s*)+").expect("valid regex"));

    EMPTY_P_RE.replace_all(html, "").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontmatter_only_at_start() {
        let src = "---\ntitle: x\n---\nBody\n";
        assert_eq!(frontmatter_span(src), Some(0..17));
        assert_eq!(frontmatter_span("Body\n---\na: b\n---\n"), None);
    }

    #[test]
    fn import_lines() {
        let src = "import VocabCard from '../components/VocabCard.astro';\nText\nimport { a } from \"b\"\n";
        let spans = import_spans(src);
        assert_eq!(spans.len(), 2);
        assert_eq!(remove_spans(src, &spans), "Text\n");
    }

    #[test]
    fn prose_mentioning_import_is_kept() {
        let src = "Important: import duties apply.\n";
        assert!(import_spans(src).is_empty());
    }

    #[test]
    fn markdown_rendering() {
        let html = render_markdown("## Hello\n\nSome *text*.");
        assert!(html.contains("<h2>Hello</h2>"));
        assert!(html.contains("<em>text</em>"));
    }

    #[test]
    fn pipeline_collapses_and_removes_empty_paragraphs() {
        let html = "<p>a</p>\n\n\n\n<p> </p>\n<p></p>\n<p>b</p>\n";
        assert_eq!(run_pipeline(html), "<p>a</p>\n\n<p>b</p>");
    }
}
