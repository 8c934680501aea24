//! Tag normalizer: pseudo-component markup to canonical HTML.
//!
//! Articles embed teaching widgets as pseudo-tags (`<VocabCard ... />`,
//! `<PhraseOfDay>...</PhraseOfDay>`, ...) written in several dialects. This
//! crate scans those tags, renders every dialect of a component to one
//! canonical HTML form, and runs the remaining prose through a Markdown
//! renderer.
//!
//! Normalization never fails: if the rendered output cannot be reassembled,
//! the pre-render text is returned instead and [`NormalizeStats::fell_back`]
//! is set.

pub mod attrs;
mod cleanup;
mod components;
pub mod tags;

use std::collections::BTreeMap;
use std::ops::Range;

use tracing::{debug, warn};

pub use attrs::{
    ConjugationRow, escape_html, escape_text, first_alias, parse_conjugations, unescape_text,
};
pub use tags::{Attr, Child, Component, Field, FieldSource, FieldValue, Scan, Tag, ValueKind, parse_tag_at, scan};

use components::RenderContext;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Counters describing one normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub had_frontmatter: bool,
    pub imports_removed: usize,
    pub vocab_cards: usize,
    pub phrase_of_day: usize,
    pub culture_tips: usize,
    pub conjugation_tables: usize,
    pub cta_removed: usize,
    /// Opening tags left unconverted because they never closed.
    pub unconverted: usize,
    /// Rendering could not be reassembled; the pre-render text was returned.
    pub fell_back: bool,
}

/// Output of [`normalize`].
#[derive(Debug, Clone)]
pub struct NormalizeResult {
    pub html: String,
    pub stats: NormalizeStats,
}

/// Per-component occurrence counts.
pub type ComponentCounts = BTreeMap<Component, usize>;

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

const TOKEN_PREFIX: &str = "AFXCOMPONENT";

fn token(i: usize) -> String {
    format!("{TOKEN_PREFIX}{i}X")
}

/// Convert raw article markup to canonical HTML.
///
/// `native` selects the label language; `target` selects the default flag
/// glyph for cultural tips.
pub fn normalize(raw: &str, native: &str, target: Option<&str>) -> NormalizeResult {
    let mut stats = NormalizeStats::default();

    // Step 1: strip frontmatter and import lines
    let mut removed = Vec::new();
    if let Some(span) = cleanup::frontmatter_span(raw) {
        stats.had_frontmatter = true;
        removed.push(span);
    }
    let after_fm = removed.last().map_or(0, |s| s.end);
    let imports: Vec<_> = cleanup::import_spans(raw)
        .into_iter()
        .filter(|s| s.start >= after_fm)
        .collect();
    stats.imports_removed = imports.len();
    removed.extend(imports);
    let body = cleanup::remove_spans(raw, &removed);

    // Step 2: convert components behind tokens, render prose, restore
    let ctx = RenderContext { native, target };
    let html = render_fragment(&body, ctx, &mut stats);
    let html = if stats.fell_back {
        html.trim().to_string()
    } else {
        cleanup::run_pipeline(&html)
    };

    NormalizeResult { html, stats }
}

/// Render one fragment of markup: stage every component behind a token on its
/// own line, run the prose through the Markdown renderer, then swap the
/// component HTML back in.
///
/// Cultural tips call back into this for their body, so components nested
/// inside a tip are converted too.
pub(crate) fn render_fragment(
    text: &str,
    ctx: RenderContext<'_>,
    stats: &mut NormalizeStats,
) -> String {
    let scan = tags::scan(text);
    stats.unconverted += scan.orphans.len();
    if !scan.orphans.is_empty() {
        debug!(count = scan.orphans.len(), "leaving unterminated component tags unconverted");
    }

    let mut blocks = Vec::with_capacity(scan.tags.len());
    let mut staged = String::with_capacity(text.len());
    let mut last = 0;

    for tag in &scan.tags {
        staged.push_str(&text[last..tag.span.start]);
        last = tag.span.end;

        match tag.component {
            Component::Vocab => stats.vocab_cards += 1,
            Component::PhraseOfDay => stats.phrase_of_day += 1,
            Component::CultureTip => stats.culture_tips += 1,
            Component::ConjugationTable => stats.conjugation_tables += 1,
            Component::Cta => {
                stats.cta_removed += 1;
                continue;
            }
        }

        let block = components::render(tag, text, ctx, stats);
        staged.push_str(&format!("\n\n{}\n\n", token(blocks.len())));
        blocks.push(block);
    }
    staged.push_str(&text[last..]);

    let rendered = cleanup::render_markdown(&staged);
    match restore_blocks(&rendered, &blocks) {
        Some(html) => html,
        None => {
            warn!("component placeholder lost during rendering, returning pre-render text");
            stats.fell_back = true;
            restore_blocks(&staged, &blocks).unwrap_or(staged)
        }
    }
}

/// Replace each token with its block. `None` if any token is missing.
fn restore_blocks(text: &str, blocks: &[String]) -> Option<String> {
    let mut out = text.to_string();
    for (i, block) in blocks.iter().enumerate().rev() {
        let tok = token(i);
        let wrapped = format!("<p>{tok}</p>");
        if out.contains(&wrapped) {
            out = out.replacen(&wrapped, block, 1);
        } else if out.contains(&tok) {
            out = out.replacen(&tok, block, 1);
        } else {
            return None;
        }
    }
    Some(out)
}

// ---------------------------------------------------------------------------
// Analysis helpers
// ---------------------------------------------------------------------------

/// Count well-formed occurrences of each tracked component.
pub fn count_components(content: &str) -> ComponentCounts {
    let mut counts: ComponentCounts = Component::TRACKED.iter().map(|c| (*c, 0)).collect();
    tally(content, &mut counts);
    counts
}

fn tally(content: &str, counts: &mut ComponentCounts) {
    for tag in tags::scan(content).tags {
        if let Some(n) = counts.get_mut(&tag.component) {
            *n += 1;
        }
        if tag.component == Component::CultureTip {
            if let Some(body) = tag.body_text(content) {
                tally(body, counts);
            }
        }
    }
}

/// Article text with markup blanked out, byte-aligned with the original.
///
/// Frontmatter, import lines, and component tags are replaced byte-for-byte
/// with spaces (newlines kept), so offsets into `masked` are valid offsets into
/// the original content.
#[derive(Debug, Clone)]
pub struct ProseMask {
    pub masked: String,
    /// Spans of the component tags that were blanked out.
    pub components: Vec<Range<usize>>,
}

/// Blank out everything that is not prose.
pub fn prose_mask(content: &str) -> ProseMask {
    let mut spans: Vec<Range<usize>> = Vec::new();
    spans.extend(cleanup::frontmatter_span(content));
    spans.extend(cleanup::import_spans(content));
    let components: Vec<_> = tags::scan(content).tags.into_iter().map(|t| t.span).collect();
    spans.extend(components.iter().cloned());

    let mut bytes = content.as_bytes().to_vec();
    for span in &spans {
        for b in &mut bytes[span.clone()] {
            if *b != b'\n' {
                *b = b' ';
            }
        }
    }
    // Whole spans are blanked, so every multi-byte sequence is either intact or gone.
    let masked = String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());

    ProseMask { masked, components }
}
