//! Defect detector: side-effect-free predicates over article content.
//!
//! Every [`Issue`] carries an [`Anchor`] captured at scan time. Component
//! issues anchor the whole tag; prose issues anchor the offending line,
//! paragraph, or heading.

pub mod leakage;
pub mod placeholder;
pub mod script;
pub mod structure;

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use articlefix_markup::{Component, Field, ProseMask, Tag, prose_mask, scan};
use articlefix_shared::{Anchor, Article, Issue, IssueCategory, Script, Severity, lang};
use tracing::debug;

/// Run one category's predicates over an article.
pub fn detect(category: IssueCategory, article: &Article) -> Vec<Issue> {
    let content = article.content.as_str();
    let ctx = LangContext::of(article);
    let tags = scan(content).tags;
    let mut issues = Vec::new();

    match category {
        IssueCategory::EmptyTranslation => {
            for tag in &tags {
                empty_fields(content, tag, &mut issues);
            }
        }
        IssueCategory::PlaceholderPronunciation => {
            for tag in &tags {
                placeholder_pronunciation(content, tag, &mut issues);
            }
        }
        IssueCategory::IpaPronunciation => {
            for tag in &tags {
                ipa_pronunciation(content, tag, &mut issues);
            }
        }
        IssueCategory::CopiedPronunciation => copied_pronunciations(content, &tags, &mut issues),
        IssueCategory::PlaceholderText => {
            for tag in &tags {
                template_stubs(content, tag, &mut issues);
            }
            prose_placeholders(content, &prose_mask(content), &mut issues);
        }
        IssueCategory::WrongScript => {
            for tag in &tags {
                wrong_script_fields(content, tag, &ctx, &mut issues);
            }
            wrong_script_prose(content, &prose_mask(content), &ctx, &mut issues);
        }
        IssueCategory::SourceLeakage => {
            for tag in &tags {
                leaked_fields(content, tag, &ctx, &mut issues);
            }
            leaked_prose(content, &prose_mask(content), &ctx, &mut issues);
        }
        IssueCategory::TruncatedEnding => {
            if let Some(t) = structure::truncated_ending(&prose_mask(content)) {
                issues.push(Issue {
                    category,
                    anchor: Anchor::new(t.span.start, &content[t.span.clone()]),
                    field: None,
                    value: Some(content[t.span].to_string()),
                    severity: t.severity,
                    detail: "article ends mid-sentence".to_string(),
                });
            }
        }
        IssueCategory::EmptySection => {
            for span in structure::empty_sections(&prose_mask(content)) {
                let heading = &content[span.clone()];
                issues.push(Issue {
                    category,
                    anchor: Anchor::new(span.start, heading),
                    field: None,
                    value: Some(heading.to_string()),
                    severity: Severity::Low,
                    detail: "heading has no content before the next heading".to_string(),
                });
            }
        }
    }

    if !issues.is_empty() {
        debug!(id = %article.id, %category, count = issues.len(), "issues detected");
    }
    issues
}

/// Run every category, in [`IssueCategory::ALL`] order.
pub fn detect_all(article: &Article) -> Vec<Issue> {
    IssueCategory::ALL
        .into_iter()
        .flat_map(|category| detect(category, article))
        .collect()
}

// ---------------------------------------------------------------------------
// Language context
// ---------------------------------------------------------------------------

struct LangContext {
    native_script: Script,
    target_script: Script,
    native_is_english: bool,
    target_is_english: bool,
}

impl LangContext {
    fn of(article: &Article) -> Self {
        Self {
            native_script: lang::script_of(&article.native_lang),
            target_script: lang::script_of(&article.target_lang),
            native_is_english: article.native_lang.eq_ignore_ascii_case("en"),
            target_is_english: article.target_lang.eq_ignore_ascii_case("en"),
        }
    }
}

// ---------------------------------------------------------------------------
// Component fields
// ---------------------------------------------------------------------------

/// Fields a repair can target inside word-level components.
const WORD_FIELDS: [Field; 5] = [
    Field::Word,
    Field::Translation,
    Field::Pronunciation,
    Field::Example,
    Field::Context,
];

fn is_word_component(tag: &Tag) -> bool {
    matches!(tag.component, Component::Vocab | Component::PhraseOfDay)
}

fn field_issue(
    content: &str,
    tag: &Tag,
    category: IssueCategory,
    field: Field,
    value: &str,
    severity: Severity,
    detail: String,
) -> Issue {
    Issue {
        category,
        anchor: Anchor::new(tag.span.start, tag.text(content)),
        field: Some(field.as_str().to_string()),
        value: Some(value.to_string()),
        severity,
        detail,
    }
}

fn empty_fields(content: &str, tag: &Tag, out: &mut Vec<Issue>) {
    if !is_word_component(tag) {
        return;
    }
    for field in [Field::Word, Field::Translation] {
        if let Some(v) = tag.field(field) {
            if v.value.trim().is_empty() {
                out.push(field_issue(
                    content,
                    tag,
                    IssueCategory::EmptyTranslation,
                    field,
                    v.value,
                    Severity::High,
                    format!("{} is empty", field.as_str()),
                ));
            }
        }
    }
}

fn placeholder_pronunciation(content: &str, tag: &Tag, out: &mut Vec<Issue>) {
    if !is_word_component(tag) {
        return;
    }
    let Some(pron) = tag.field(Field::Pronunciation) else {
        return;
    };
    let headword = tag.field_text(Field::Word);
    if let Some(problem) = placeholder::pronunciation_problem(pron.value, &headword) {
        out.push(field_issue(
            content,
            tag,
            IssueCategory::PlaceholderPronunciation,
            Field::Pronunciation,
            pron.value,
            Severity::Medium,
            problem.to_string(),
        ));
    }
}

fn ipa_pronunciation(content: &str, tag: &Tag, out: &mut Vec<Issue>) {
    if !is_word_component(tag) {
        return;
    }
    let Some(pron) = tag.field(Field::Pronunciation) else {
        return;
    };
    if placeholder::has_ipa(pron.value) {
        out.push(field_issue(
            content,
            tag,
            IssueCategory::IpaPronunciation,
            Field::Pronunciation,
            pron.value,
            Severity::Medium,
            "pronunciation uses IPA symbols".to_string(),
        ));
    }
}

/// Fewest distinct words sharing one pronunciation before it counts as copied.
const COPIED_PRONUNCIATION_WORDS: usize = 3;

/// Vocabulary cards whose pronunciation guide is shared by several different words.
fn copied_pronunciations(content: &str, tags: &[Tag], out: &mut Vec<Issue>) {
    let mut groups: BTreeMap<String, Vec<&Tag>> = BTreeMap::new();
    for tag in tags.iter().filter(|t| t.component == Component::Vocab) {
        let Some(pron) = tag.field(Field::Pronunciation) else {
            continue;
        };
        let key = pron.value.trim().to_lowercase();
        if key.chars().count() < 3 {
            continue;
        }
        groups.entry(key).or_default().push(tag);
    }

    let mut flagged: Vec<&Tag> = Vec::new();
    for (pron, cards) in &groups {
        let words: BTreeSet<String> = cards
            .iter()
            .map(|t| t.field_text(Field::Word).trim().to_lowercase())
            .collect();
        if words.len() < COPIED_PRONUNCIATION_WORDS {
            continue;
        }
        debug!(pronunciation = %pron, words = words.len(), "pronunciation shared across cards");
        flagged.extend(cards.iter().copied());
    }
    flagged.sort_by_key(|t| t.span.start);

    for tag in flagged {
        let Some(pron) = tag.field(Field::Pronunciation) else {
            continue;
        };
        out.push(field_issue(
            content,
            tag,
            IssueCategory::CopiedPronunciation,
            Field::Pronunciation,
            pron.value,
            Severity::High,
            format!("pronunciation {:?} is shared with other words", pron.value.trim()),
        ));
    }
}

fn template_stubs(content: &str, tag: &Tag, out: &mut Vec<Issue>) {
    if !is_word_component(tag) {
        return;
    }
    for field in WORD_FIELDS {
        if let Some(v) = tag.field(field) {
            if placeholder::is_template_stub(v.value) {
                out.push(field_issue(
                    content,
                    tag,
                    IssueCategory::PlaceholderText,
                    field,
                    v.value,
                    Severity::Medium,
                    format!("{} is a template stub", field.as_str()),
                ));
            }
        }
    }
}

fn wrong_script_fields(content: &str, tag: &Tag, ctx: &LangContext, out: &mut Vec<Issue>) {
    if !is_word_component(tag) {
        return;
    }
    for field in WORD_FIELDS {
        let allowed = match field {
            Field::Word => [ctx.target_script; 2],
            Field::Translation | Field::Pronunciation => [ctx.native_script; 2],
            _ => [ctx.target_script, ctx.native_script],
        };
        let Some(v) = tag.field(field) else { continue };
        if let Some(found) = script::foreign_script(v.value, &allowed) {
            out.push(field_issue(
                content,
                tag,
                IssueCategory::WrongScript,
                field,
                v.value,
                Severity::Medium,
                format!(
                    "{} is written in {} script, expected {}",
                    field.as_str(),
                    found.as_str(),
                    allowed[0].as_str()
                ),
            ));
        }
    }
}

fn leaked_fields(content: &str, tag: &Tag, ctx: &LangContext, out: &mut Vec<Issue>) {
    if !is_word_component(tag) {
        return;
    }
    for field in WORD_FIELDS {
        let judged = match field {
            Field::Translation | Field::Context => !ctx.native_is_english,
            Field::Word | Field::Example => !ctx.target_is_english,
            _ => false,
        };
        if !judged {
            continue;
        }
        let Some(v) = tag.field(field) else { continue };
        if leakage::looks_english(v.value, leakage::MIN_FIELD_WORDS) {
            out.push(field_issue(
                content,
                tag,
                IssueCategory::SourceLeakage,
                field,
                v.value,
                Severity::Medium,
                format!("{} is untranslated English", field.as_str()),
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Prose
// ---------------------------------------------------------------------------

fn prose_issue(content: &str, category: IssueCategory, span: Range<usize>, detail: String) -> Issue {
    let text = &content[span.clone()];
    Issue {
        category,
        anchor: Anchor::new(span.start, text),
        field: None,
        value: Some(text.to_string()),
        severity: Severity::Medium,
        detail,
    }
}

/// Maximal runs of non-blank lines in `masked`, trimmed.
fn paragraphs(masked: &str) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut current: Option<Range<usize>> = None;
    let mut offset = 0;
    for line in masked.split('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            out.extend(current.take());
        } else {
            let lead = line.len() - line.trim_start().len();
            let start = offset + lead;
            let end = start + trimmed.len();
            current = Some(match current.take() {
                Some(p) => p.start..end,
                None => start..end,
            });
        }
        offset += line.len() + 1;
    }
    out.extend(current);
    out
}

/// The trimmed line of `masked` containing `at`.
fn line_around(masked: &str, at: Range<usize>) -> Range<usize> {
    let start = masked[..at.start].rfind('\n').map_or(0, |i| i + 1);
    let end = masked[at.end..].find('\n').map_or(masked.len(), |i| at.end + i);
    let line = &masked[start..end];
    let lead = line.len() - line.trim_start().len();
    start + lead..start + line.trim_end().len()
}

fn prose_placeholders(content: &str, mask: &ProseMask, out: &mut Vec<Issue>) {
    let mut seen: Vec<Range<usize>> = Vec::new();
    for hit in placeholder::prose_placeholders(&mask.masked) {
        let line = line_around(&mask.masked, hit.clone());
        if seen.contains(&line) {
            continue;
        }
        let marker = mask.masked[hit].to_string();
        out.push(prose_issue(
            content,
            IssueCategory::PlaceholderText,
            line.clone(),
            format!("placeholder {marker:?} left in prose"),
        ));
        seen.push(line);
    }
}

fn wrong_script_prose(content: &str, mask: &ProseMask, ctx: &LangContext, out: &mut Vec<Issue>) {
    let allowed = [ctx.native_script, ctx.target_script];
    for para in paragraphs(&mask.masked) {
        if let Some(found) = script::foreign_script(&mask.masked[para.clone()], &allowed) {
            out.push(prose_issue(
                content,
                IssueCategory::WrongScript,
                para,
                format!("paragraph is written in {} script", found.as_str()),
            ));
        }
    }
}

fn leaked_prose(content: &str, mask: &ProseMask, ctx: &LangContext, out: &mut Vec<Issue>) {
    if ctx.native_is_english || ctx.target_is_english {
        return;
    }
    for para in paragraphs(&mask.masked) {
        if leakage::looks_english(&mask.masked[para.clone()], leakage::MIN_PARAGRAPH_WORDS) {
            out.push(prose_issue(
                content,
                IssueCategory::SourceLeakage,
                para,
                "paragraph is untranslated English".to_string(),
            ));
        }
    }
}
