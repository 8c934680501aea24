//! Fix applicator: stitches model-proposed values back into article content.
//!
//! Fixes land strictly at the anchor captured during detection. A target whose
//! anchor no longer holds is skipped, never re-searched.

use std::collections::BTreeMap;
use std::ops::Range;

use articlefix_markup::{Field, FieldSource, ValueKind, escape_text, parse_tag_at};
use articlefix_shared::{Anchor, Issue};
use tracing::debug;

/// Response key carrying replacement prose for passage targets.
pub const TEXT_KEY: &str = "text";

/// One location the model is asked to fix, with every issue found there.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    /// 1-based, stable within one record.
    pub index: usize,
    pub anchor: Anchor,
    pub issues: Vec<Issue>,
}

impl Target {
    /// Whether this target edits component fields rather than a passage.
    pub fn is_component(&self) -> bool {
        self.issues.iter().any(|i| i.field.is_some())
    }

    /// Response keys the model must fill for this target, deduplicated.
    pub fn fields(&self) -> Vec<&str> {
        if !self.is_component() {
            return vec![TEXT_KEY];
        }
        let mut fields: Vec<&str> = Vec::new();
        for f in self.issues.iter().filter_map(|i| i.field.as_deref()) {
            if !fields.contains(&f) {
                fields.push(f);
            }
        }
        fields
    }
}

/// Group issues sharing an anchor into numbered targets, in document order.
pub fn group_targets(issues: Vec<Issue>) -> Vec<Target> {
    let mut by_anchor: BTreeMap<(usize, usize), Vec<Issue>> = BTreeMap::new();
    for issue in issues {
        by_anchor
            .entry((issue.anchor.start, issue.anchor.end))
            .or_default()
            .push(issue);
    }
    by_anchor
        .into_values()
        .enumerate()
        .map(|(i, issues)| Target {
            index: i + 1,
            anchor: issues[0].anchor.clone(),
            issues,
        })
        .collect()
}

/// Proposed values for one target, keyed by field name (or [`TEXT_KEY`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fix {
    pub index: usize,
    pub values: BTreeMap<String, String>,
}

/// Result of applying fixes to one record.
#[derive(Debug, Clone)]
pub struct Applied {
    pub content: String,
    /// Field names (or [`TEXT_KEY`]) written, one entry per write.
    pub fields: Vec<String>,
    /// Why individual targets were passed over.
    pub skipped: Vec<String>,
}

impl Applied {
    pub fn fields_fixed(&self) -> usize {
        self.fields.len()
    }
}

/// Field values may not carry double quotes into a double-quoted attribute.
fn sanitize(value: &str) -> String {
    value.trim().replace('"', "'")
}

/// Apply `fixes` to `content` at each target's captured anchor.
///
/// `compose` turns a passage target and the model's text into the
/// replacement for the anchored passage.
pub fn apply_fixes(
    content: &str,
    targets: &[Target],
    fixes: &[Fix],
    compose: impl Fn(&Target, &str) -> String,
) -> Applied {
    let by_index: BTreeMap<usize, &Fix> = fixes.iter().map(|f| (f.index, f)).collect();
    let mut out = content.to_string();
    let mut fields = Vec::new();
    let mut skipped = Vec::new();
    // Start of the last edited target; anything reaching past it overlaps.
    let mut floor = usize::MAX;

    let mut ordered: Vec<&Target> = targets.iter().collect();
    ordered.sort_by(|a, b| b.anchor.start.cmp(&a.anchor.start));

    for target in ordered {
        let Some(fix) = by_index.get(&target.index) else {
            skipped.push(format!("target {}: no fix proposed", target.index));
            continue;
        };
        if target.anchor.end > floor {
            skipped.push(format!("target {}: overlaps an edited target", target.index));
            continue;
        }
        if !target.anchor.holds_in(&out) {
            debug!(index = target.index, "anchor no longer holds, skipping");
            skipped.push(format!("target {}: anchor no longer matches", target.index));
            continue;
        }

        let written = if target.is_component() {
            edit_component(&mut out, target, fix)
        } else {
            edit_passage(&mut out, target, fix, &compose)
        };
        if written.is_empty() {
            skipped.push(format!("target {}: no usable values", target.index));
        } else {
            floor = target.anchor.start;
            fields.extend(written);
        }
    }

    Applied {
        content: out,
        fields,
        skipped,
    }
}

fn edit_passage(
    out: &mut String,
    target: &Target,
    fix: &Fix,
    compose: &impl Fn(&Target, &str) -> String,
) -> Vec<String> {
    let Some(text) = fix.values.get(TEXT_KEY).map(|t| t.trim()).filter(|t| !t.is_empty()) else {
        return Vec::new();
    };
    let replacement = compose(target, text);
    out.replace_range(target.anchor.start..target.anchor.end, &replacement);
    vec![TEXT_KEY.to_string()]
}

fn edit_component(out: &mut String, target: &Target, fix: &Fix) -> Vec<String> {
    let Some(tag) = parse_tag_at(out, target.anchor.start) else {
        return Vec::new();
    };
    if tag.span.end != target.anchor.end {
        return Vec::new();
    }

    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    let mut written = Vec::new();

    for name in target.fields() {
        let Some(field) = Field::parse(name) else {
            continue;
        };
        let Some(proposed) = fix.values.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
        else {
            continue;
        };

        match tag.field(field) {
            Some(found) if found.source == FieldSource::Child => {
                edits.push((found.span, escape_text(proposed)));
            }
            Some(found) => {
                let value = sanitize(proposed);
                let kind = tag
                    .attr(found.name)
                    .map_or(ValueKind::DoubleQuoted, |a| a.kind);
                let span = found.span;
                match kind {
                    ValueKind::Flag => edits.push((span.start..span.end, format!("=\"{value}\""))),
                    _ => edits.push((span.start - 1..span.end + 1, format!("\"{value}\""))),
                }
            }
            None => {
                let Some(canonical) = field.attr_aliases(tag.component).first() else {
                    continue;
                };
                let value = sanitize(proposed);
                let at = tag.open_end;
                let attr = if out[..at].ends_with(char::is_whitespace) {
                    format!("{canonical}=\"{value}\" ")
                } else {
                    format!(" {canonical}=\"{value}\"")
                };
                edits.push((at..at, attr));
            }
        }
        written.push(name.to_string());
    }

    edits.sort_by(|a, b| b.0.start.cmp(&a.0.start));
    for (range, replacement) in edits {
        out.replace_range(range, &replacement);
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use articlefix_shared::{IssueCategory, Severity};

    fn field_issue(content: &str, start: usize, end: usize, field: &str) -> Issue {
        Issue {
            category: IssueCategory::EmptyTranslation,
            anchor: Anchor::new(start, &content[start..end]),
            field: Some(field.into()),
            value: None,
            severity: Severity::High,
            detail: String::new(),
        }
    }

    fn fix(index: usize, pairs: &[(&str, &str)]) -> Fix {
        Fix {
            index,
            values: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn no_compose(_: &Target, text: &str) -> String {
        text.to_string()
    }

    #[test]
    fn issues_on_one_tag_share_a_target() {
        let content = r#"<VocabCard word="casa" translation="" pronunciation="[...]" />"#;
        let targets = group_targets(vec![
            field_issue(content, 0, content.len(), "translation"),
            field_issue(content, 0, content.len(), "pronunciation"),
        ]);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].index, 1);
        assert_eq!(targets[0].fields(), ["translation", "pronunciation"]);
    }

    #[test]
    fn rewrites_fields_in_place() {
        let content = r#"<VocabCard word="casa" translation="" pronunciation="[...]" />"#;
        let targets = group_targets(vec![
            field_issue(content, 0, content.len(), "translation"),
            field_issue(content, 0, content.len(), "pronunciation"),
        ]);
        let applied = apply_fixes(
            content,
            &targets,
            &[fix(1, &[("translation", "house"), ("pronunciation", "KAH-sah")])],
            no_compose,
        );
        assert_eq!(applied.fields_fixed(), 2);
        assert_eq!(
            applied.content,
            r#"<VocabCard word="casa" translation="house" pronunciation="KAH-sah" />"#
        );
    }

    #[test]
    fn only_the_anchored_duplicate_changes() {
        let tag = r#"<VocabCard word="a" translation="" />"#;
        let content = format!("{tag}\n{tag}");
        let targets = group_targets(vec![field_issue(&content, 0, tag.len(), "translation")]);
        let applied = apply_fixes(&content, &targets, &[fix(1, &[("translation", "first")])], no_compose);
        assert_eq!(
            applied.content,
            format!("<VocabCard word=\"a\" translation=\"first\" />\n{tag}")
        );
    }

    #[test]
    fn stale_anchor_is_skipped() {
        let content = r#"<VocabCard word="a" translation="" />"#;
        let targets = group_targets(vec![field_issue(content, 0, content.len(), "translation")]);
        let shifted = format!("x{content}");
        let applied = apply_fixes(&shifted, &targets, &[fix(1, &[("translation", "b")])], no_compose);
        assert_eq!(applied.fields_fixed(), 0);
        assert_eq!(applied.content, shifted);
        assert!(applied.skipped[0].contains("anchor"));
    }

    #[test]
    fn quotes_are_neutralized_and_alias_edited_in_place() {
        let content = r#"<VocabCard polish="kot" english='' />"#;
        let targets = group_targets(vec![field_issue(content, 0, content.len(), "translation")]);
        let applied = apply_fixes(content, &targets, &[fix(1, &[("translation", r#"the "cat""#)])], no_compose);
        assert_eq!(applied.content, r#"<VocabCard polish="kot" english="the 'cat'" />"#);
    }

    #[test]
    fn missing_attribute_is_inserted() {
        let content = r#"<VocabCard word="kot" />"#;
        let targets = group_targets(vec![field_issue(content, 0, content.len(), "pronunciation")]);
        let applied = apply_fixes(content, &targets, &[fix(1, &[("pronunciation", "KOT")])], no_compose);
        assert_eq!(applied.content, r#"<VocabCard word="kot" pronunciation="KOT" />"#);
    }

    #[test]
    fn child_form_edits_inner_text() {
        let content = "<VocabCard>\n<Word>kot</Word>\n<Translation> </Translation>\n</VocabCard>";
        let targets = group_targets(vec![field_issue(content, 0, content.len(), "translation")]);
        let applied = apply_fixes(content, &targets, &[fix(1, &[("translation", "cat")])], no_compose);
        assert!(applied.content.contains("<Translation>cat</Translation>"));
        assert!(applied.content.contains("<Word>kot</Word>"));
    }

    #[test]
    fn child_text_cannot_close_its_element() {
        let content = "<VocabCard>\n<Word>kot</Word>\n<Translation></Translation>\n</VocabCard>";
        let targets = group_targets(vec![field_issue(content, 0, content.len(), "translation")]);
        let applied = apply_fixes(
            content,
            &targets,
            &[fix(1, &[("translation", "cat</Translation><Word>x</Word>")])],
            no_compose,
        );
        assert_eq!(applied.fields_fixed(), 1);

        let tag = parse_tag_at(&applied.content, 0).expect("still one tag");
        assert_eq!(tag.span.end, applied.content.len());
        assert_eq!(tag.field_text(Field::Word), "kot");
        assert_eq!(tag.field_text(Field::Translation), "cat</Translation><Word>x</Word>");
    }

    #[test]
    fn passage_replacement_uses_compose() {
        let content = "## Empty\n\n## Next\nBody.";
        let issue = Issue {
            category: IssueCategory::EmptySection,
            anchor: Anchor::new(0, "## Empty"),
            field: None,
            value: None,
            severity: Severity::Low,
            detail: String::new(),
        };
        let targets = group_targets(vec![issue]);
        let applied = apply_fixes(
            content,
            &targets,
            &[fix(1, &[("text", "Now it has a body.")])],
            |t: &Target, text: &str| format!("{}\n\n{text}", t.anchor.text),
        );
        assert_eq!(applied.content, "## Empty\n\nNow it has a body.\n\n## Next\nBody.");
        assert_eq!(applied.fields, ["text"]);
    }

    #[test]
    fn blank_values_and_unknown_indexes_write_nothing() {
        let content = r#"<VocabCard word="a" translation="" />"#;
        let targets = group_targets(vec![field_issue(content, 0, content.len(), "translation")]);
        let applied = apply_fixes(
            content,
            &targets,
            &[fix(1, &[("translation", "  ")]), fix(7, &[("translation", "x")])],
            no_compose,
        );
        assert_eq!(applied.fields_fixed(), 0);
        assert_eq!(applied.content, content);
    }
}
