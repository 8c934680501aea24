//! Structural defects in prose: truncated endings and empty sections.
//!
//! Both checks work on a [`ProseMask`], so offsets they return are valid
//! offsets into the original content.

use std::ops::Range;
use std::sync::LazyLock;

use articlefix_markup::ProseMask;
use articlefix_shared::Severity;
use regex::Regex;

/// Characters that end a complete article.
const TERMINAL: &[char] = &['.', '!', '?', ':', ')', ']', '"', '\'', '»', '”', '。', '！', '？', '*'];

/// Articles with less prose than this are stubs and never judged.
const MIN_PROSE_CHARS: usize = 100;

/// Trailing characters of prose that make up the inspected ending.
const TAIL_CHARS: usize = 50;

/// An ending shorter than this is a fragment, not a cut-off sentence.
const MIN_TAIL_CHARS: usize = 10;

/// Trailing characters searched for an unfinished link or bold run.
const FORMATTING_WINDOW: usize = 100;

static LINK_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\]\([^)]*\)?$").expect("valid regex"));

static BOLD_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*[^*]+$").expect("valid regex"));

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}(#{1,6})\s+\S").expect("valid regex"));

/// A prose ending that stops mid-sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncatedEnding {
    /// Span of the final prose line, up to the last non-blank character.
    pub span: Range<usize>,
    pub severity: Severity,
}

fn last_chars(s: &str, n: usize) -> &str {
    let start = s
        .char_indices()
        .rev()
        .nth(n.saturating_sub(1))
        .map_or(0, |(i, _)| i);
    &s[start..]
}

/// Check whether the article's prose ends mid-sentence.
pub fn truncated_ending(mask: &ProseMask) -> Option<TruncatedEnding> {
    let masked = mask.masked.as_str();
    let end = masked.trim_end().len();
    if end == 0 {
        return None;
    }
    let prose = &masked[..end];
    if prose.split_whitespace().map(|w| w.chars().count() + 1).sum::<usize>() <= MIN_PROSE_CHARS {
        return None;
    }
    if last_chars(prose, TAIL_CHARS).trim_start().chars().count() <= MIN_TAIL_CHARS {
        return None;
    }
    let last = prose.chars().next_back()?;

    if TERMINAL.contains(&last) {
        return None;
    }

    let severity = if last == ',' || last == ';' {
        Severity::High
    } else if last.is_alphanumeric() {
        let tail = last_chars(prose, FORMATTING_WINDOW);
        if LINK_TAIL.is_match(tail) || BOLD_TAIL.is_match(tail) {
            return None;
        }
        Severity::Medium
    } else {
        return None;
    };

    let mut start = prose.rfind('\n').map_or(0, |i| i + 1);
    for component in &mask.components {
        if component.end > start && component.end <= end {
            start = component.end;
        }
    }
    start += prose[start..].len() - prose[start..].trim_start().len();

    Some(TruncatedEnding {
        span: start..end,
        severity,
    })
}

/// Spans of headings (level 2 and below) that have no content before the
/// next heading or the end of the document.
pub fn empty_sections(mask: &ProseMask) -> Vec<Range<usize>> {
    struct Line {
        span: Range<usize>,
        heading_level: Option<usize>,
        has_content: bool,
    }

    let masked = mask.masked.as_str();
    let mut lines = Vec::new();
    let mut offset = 0;
    for raw in masked.split('\n') {
        let span = offset..offset + raw.trim_end().len();
        let heading_level = HEADING
            .captures(raw)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().len());
        let has_component = mask
            .components
            .iter()
            .any(|c| c.start >= offset && c.start <= offset + raw.len());
        lines.push(Line {
            span,
            heading_level,
            has_content: !raw.trim().is_empty() || has_component,
        });
        offset += raw.len() + 1;
    }

    let mut out = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        match line.heading_level {
            Some(level) if level >= 2 => {}
            _ => continue,
        }
        let next = lines[i + 1..].iter().find(|l| l.has_content);
        let empty = match next {
            None => true,
            Some(l) => l.heading_level.is_some(),
        };
        if empty {
            let raw = &masked[line.span.clone()];
            let lead = raw.len() - raw.trim_start().len();
            out.push(line.span.start + lead..line.span.end);
        }
    }
    out
}
