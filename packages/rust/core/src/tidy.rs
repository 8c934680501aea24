//! Mechanical clean-ups that need no model.
//!
//! Two passes over vocabulary components: legacy attribute names are renamed
//! to their canonical form, and repeated cards (same word and translation)
//! are dropped after their first occurrence.

use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::LazyLock;

use articlefix_markup::{Component, ComponentCounts, Field, count_components, scan};
use regex::Regex;

static EXTRA_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Legacy attribute names and the canonical name each one becomes.
const LEGACY_ATTRS: [(&str, &str); 2] = [("polish", "word"), ("english", "translation")];

/// Outcome of tidying one article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tidied {
    pub content: String,
    /// Attributes renamed to their canonical name.
    pub renamed: usize,
    /// Duplicate vocabulary cards removed.
    pub removed: usize,
}

impl Tidied {
    pub fn changed(&self) -> bool {
        self.renamed > 0 || self.removed > 0
    }

    /// Whether component counts moved only by the cards this pass removed.
    pub fn preserves_components(&self, before: &ComponentCounts) -> bool {
        let after = count_components(&self.content);
        before.iter().all(|(component, n)| {
            let expected = match component {
                Component::Vocab => n.saturating_sub(self.removed),
                _ => *n,
            };
            after.get(component).copied().unwrap_or(0) == expected
        })
    }
}

/// Rename legacy attributes on vocabulary and phrase components.
///
/// An attribute is renamed only when its canonical name is not already
/// present on the tag.
pub fn rename_legacy_attrs(content: &str) -> (String, usize) {
    let mut edits: Vec<(Range<usize>, &str)> = Vec::new();
    for tag in scan(content).tags {
        if !matches!(tag.component, Component::Vocab | Component::PhraseOfDay) {
            continue;
        }
        for (legacy, canonical) in LEGACY_ATTRS {
            if tag.attr(canonical).is_some() {
                continue;
            }
            if let Some(attr) = tag.attr(legacy) {
                edits.push((attr.name_span.clone(), canonical));
            }
        }
    }

    let renamed = edits.len();
    let mut out = content.to_string();
    edits.sort_by(|a, b| b.0.start.cmp(&a.0.start));
    for (span, name) in edits {
        out.replace_range(span, name);
    }
    (out, renamed)
}

/// Drop vocabulary cards repeating an earlier card's word and translation.
///
/// Cards with neither a word nor a translation are always kept.
pub fn dedupe_vocab_cards(content: &str) -> (String, usize) {
    let mut seen = BTreeSet::new();
    let mut drop: Vec<Range<usize>> = Vec::new();
    for tag in scan(content).tags {
        if tag.component != Component::Vocab {
            continue;
        }
        let word = tag.field_text(Field::Word).to_lowercase();
        let translation = tag.field_text(Field::Translation).to_lowercase();
        if word.is_empty() && translation.is_empty() {
            continue;
        }
        if !seen.insert((word, translation)) {
            drop.push(tag.span);
        }
    }
    if drop.is_empty() {
        return (content.to_string(), 0);
    }

    let removed = drop.len();
    let mut out = content.to_string();
    for span in drop.into_iter().rev() {
        out.replace_range(span, "");
    }
    (EXTRA_BLANK_LINES.replace_all(&out, "\n\n").into_owned(), removed)
}

/// Run both passes: renames first, so legacy cards deduplicate by their
/// canonical fields.
pub fn tidy(content: &str) -> Tidied {
    let (renamed_content, renamed) = rename_legacy_attrs(content);
    let (content, removed) = dedupe_vocab_cards(&renamed_content);
    Tidied {
        content,
        renamed,
        removed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_names_become_canonical() {
        let content = r#"<VocabCard polish="kot" english="cat" /> <PhraseOfDay polish="Cześć" english="Hi" />"#;
        let (out, renamed) = rename_legacy_attrs(content);
        assert_eq!(renamed, 4);
        assert_eq!(
            out,
            r#"<VocabCard word="kot" translation="cat" /> <PhraseOfDay word="Cześć" translation="Hi" />"#
        );
    }

    #[test]
    fn canonical_attribute_blocks_rename() {
        let content = r#"<VocabCard word="kot" polish="kot" english="cat" />"#;
        let (out, renamed) = rename_legacy_attrs(content);
        assert_eq!(renamed, 1);
        assert_eq!(out, r#"<VocabCard word="kot" polish="kot" translation="cat" />"#);
    }

    #[test]
    fn other_components_keep_their_attributes() {
        let content = r#"<CultureTip title="english" content="polish" />"#;
        assert_eq!(rename_legacy_attrs(content), (content.to_string(), 0));
    }

    #[test]
    fn repeated_cards_keep_first() {
        let content = concat!(
            "Intro.\n\n",
            r#"<VocabCard word="kot" translation="cat" pronunciation="KOHT" />"#,
            "\n\n",
            r#"<VocabCard word="pies" translation="dog" />"#,
            "\n\n",
            r#"<VocabCard word="Kot" translation="Cat" pronunciation="kot" />"#,
            "\n\nOutro.",
        );
        let (out, removed) = dedupe_vocab_cards(content);
        assert_eq!(removed, 1);
        assert_eq!(
            out,
            concat!(
                "Intro.\n\n",
                r#"<VocabCard word="kot" translation="cat" pronunciation="KOHT" />"#,
                "\n\n",
                r#"<VocabCard word="pies" translation="dog" />"#,
                "\n\nOutro.",
            )
        );
    }

    #[test]
    fn blank_cards_are_never_duplicates() {
        let content = "<VocabCard />\n<VocabCard />";
        assert_eq!(dedupe_vocab_cards(content).1, 0);
    }

    #[test]
    fn legacy_card_deduplicates_against_canonical() {
        let content = concat!(
            r#"<VocabCard word="dom" translation="house" />"#,
            "\n\n",
            r#"<VocabCard polish="dom" english="house" />"#,
        );
        let before = count_components(content);
        let tidied = tidy(content);
        assert_eq!(tidied.renamed, 2);
        assert_eq!(tidied.removed, 1);
        assert!(tidied.changed());
        assert!(tidied.preserves_components(&before));
        assert_eq!(tidied.content, r#"<VocabCard word="dom" translation="house" />"#.to_string() + "\n\n");
    }

    #[test]
    fn clean_content_is_unchanged() {
        let content = r#"<VocabCard word="dom" translation="house" />"#;
        let tidied = tidy(content);
        assert!(!tidied.changed());
        assert_eq!(tidied.content, content);
    }
}
