//! Pseudo-component tag scanner.
//!
//! Finds component tags in source markup and records byte-exact spans for the
//! tag, each attribute value, and each child element, so that callers can both
//! render a tag and edit one of its fields in place.
//!
//! Every call builds its own cursor; nothing is cached between calls.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::attrs::{first_alias, unescape_text};

// ---------------------------------------------------------------------------
// Component and field vocabulary
// ---------------------------------------------------------------------------

/// Logical component a tag dialect renders as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    Vocab,
    PhraseOfDay,
    CultureTip,
    ConjugationTable,
    Cta,
}

impl Component {
    /// Components whose occurrence counts are tracked by validation.
    pub const TRACKED: [Component; 4] = [
        Self::Vocab,
        Self::PhraseOfDay,
        Self::CultureTip,
        Self::ConjugationTable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vocab => "vocab",
            Self::PhraseOfDay => "phrase-of-day",
            Self::CultureTip => "culture-tip",
            Self::ConjugationTable => "conjugation-table",
            Self::Cta => "cta",
        }
    }
}

/// Tag names, longest first where one name is a prefix of another.
const TAG_NAMES: [(&str, Component); 10] = [
    ("PhraseOfDay", Component::PhraseOfDay),
    ("PhrasePair", Component::Vocab),
    ("PhraseCard", Component::Vocab),
    ("Phrase", Component::Vocab),
    ("KVocabCard", Component::Vocab),
    ("VocabCard", Component::Vocab),
    ("VocabCell", Component::Vocab),
    ("CultureTip", Component::CultureTip),
    ("ConjugationTable", Component::ConjugationTable),
    ("CTA", Component::Cta),
];

/// A logical field of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Word,
    Translation,
    Pronunciation,
    Example,
    Context,
    Title,
    Flag,
    Content,
    Verb,
    Meaning,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Word => "word",
            Self::Translation => "translation",
            Self::Pronunciation => "pronunciation",
            Self::Example => "example",
            Self::Context => "context",
            Self::Title => "title",
            Self::Flag => "flag",
            Self::Content => "content",
            Self::Verb => "verb",
            Self::Meaning => "meaning",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        [
            Self::Word,
            Self::Translation,
            Self::Pronunciation,
            Self::Example,
            Self::Context,
            Self::Title,
            Self::Flag,
            Self::Content,
            Self::Verb,
            Self::Meaning,
        ]
        .into_iter()
        .find(|f| f.as_str() == name)
    }

    /// Attribute names for this field, in priority order. The first is canonical.
    pub fn attr_aliases(&self, component: Component) -> &'static [&'static str] {
        use Component::*;
        match (component, self) {
            (Vocab, Self::Word) => &["word", "polish", "original", "phrase"],
            (Vocab, Self::Translation) => &["translation", "english", "meaning"],
            (Vocab, Self::Pronunciation) => &["pronunciation", "transliteration", "pron"],
            (Vocab, Self::Example) => &["example", "sentence"],
            (PhraseOfDay, Self::Word) => &["word", "phrase", "polish"],
            (PhraseOfDay, Self::Translation) => &["translation", "english"],
            (PhraseOfDay, Self::Pronunciation) => &["pronunciation"],
            (PhraseOfDay, Self::Context) => &["context"],
            (CultureTip, Self::Title) => &["title"],
            (CultureTip, Self::Flag) => &["flag"],
            (CultureTip, Self::Content) => &["content"],
            (ConjugationTable, Self::Verb) => &["verb"],
            (ConjugationTable, Self::Meaning) => &["meaning"],
            _ => &[],
        }
    }

    /// Child element names for this field, in priority order. The first is canonical.
    pub fn child_aliases(&self, component: Component) -> &'static [&'static str] {
        use Component::*;
        match (component, self) {
            (Vocab | PhraseOfDay, Self::Word) => &["Word", "Original", "Phrase"],
            (Vocab | PhraseOfDay, Self::Translation) => &["Translation"],
            (Vocab | PhraseOfDay, Self::Pronunciation) => &["Pronunciation", "Transliteration"],
            (Vocab, Self::Example) => &["Example", "Note"],
            (PhraseOfDay, Self::Context) => &["Context", "Note"],
            _ => &[],
        }
    }
}

// ---------------------------------------------------------------------------
// Scanned tags
// ---------------------------------------------------------------------------

/// How an attribute value was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    DoubleQuoted,
    SingleQuoted,
    /// `{...}`; the span excludes the braces.
    Expression,
    /// Bare attribute with no value.
    Flag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: String,
    /// Absolute span of the attribute name.
    pub name_span: Range<usize>,
    pub value: String,
    /// Absolute span of the value text, excluding quotes or braces.
    pub value_span: Range<usize>,
    pub kind: ValueKind,
}

impl Attr {
    fn as_field(&self) -> FieldValue<'_> {
        FieldValue {
            name: &self.name,
            value: &self.value,
            span: self.value_span.clone(),
            source: FieldSource::Attr,
        }
    }
}

/// A child element inside a paired component, e.g. `<Translation>..</Translation>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Child {
    pub name: String,
    /// Trimmed inner text, entities decoded.
    pub value: String,
    /// Absolute span of the untrimmed inner text.
    pub value_span: Range<usize>,
}

impl Child {
    fn as_field(&self) -> FieldValue<'_> {
        FieldValue {
            name: &self.name,
            value: &self.value,
            span: self.value_span.clone(),
            source: FieldSource::Child,
        }
    }
}

/// Where a resolved field value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    Attr,
    Child,
}

/// A field resolved through its aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue<'t> {
    pub name: &'t str,
    pub value: &'t str,
    pub span: Range<usize>,
    pub source: FieldSource,
}

/// One well-formed component tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Tag name as written, e.g. `KVocabCard`.
    pub name: String,
    pub component: Component,
    /// Absolute span of the whole tag, including any body and closing tag.
    pub span: Range<usize>,
    /// Absolute offset of the `/>` or `>` that ends the opening tag.
    pub open_end: usize,
    /// Absolute span of the body for paired tags.
    pub body: Option<Range<usize>>,
    pub attrs: Vec<Attr>,
    pub children: Vec<Child>,
}

impl Tag {
    pub fn is_self_closing(&self) -> bool {
        self.body.is_none()
    }

    pub fn attr(&self, name: &str) -> Option<&Attr> {
        self.attrs.iter().find(|a| a.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&Child> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Resolve a field through its aliases.
    ///
    /// The first alias with a non-blank value wins; if every present alias is
    /// blank, the first present one is returned so the field can still be located.
    pub fn field(&self, field: Field) -> Option<FieldValue<'_>> {
        let attr_aliases = field.attr_aliases(self.component);
        let child_aliases = field.child_aliases(self.component);

        first_alias(attr_aliases, |k| {
            self.attr(k).filter(|a| !a.value.trim().is_empty()).map(Attr::as_field)
        })
        .or_else(|| {
            first_alias(child_aliases, |k| {
                self.child(k).filter(|c| !c.value.is_empty()).map(Child::as_field)
            })
        })
        .or_else(|| first_alias(attr_aliases, |k| self.attr(k).map(Attr::as_field)))
        .or_else(|| first_alias(child_aliases, |k| self.child(k).map(Child::as_field)))
    }

    /// Field value as an owned string, empty when absent.
    pub fn field_text(&self, field: Field) -> String {
        self.field(field)
            .map(|f| f.value.trim().to_string())
            .unwrap_or_default()
    }

    pub fn text<'s>(&self, src: &'s str) -> &'s str {
        &src[self.span.clone()]
    }

    pub fn body_text<'s>(&self, src: &'s str) -> Option<&'s str> {
        self.body.clone().map(|b| &src[b])
    }
}

/// Result of scanning a document for component tags.
#[derive(Debug, Clone, Default)]
pub struct Scan {
    /// Well-formed tags in document order, non-overlapping.
    pub tags: Vec<Tag>,
    /// Offsets of opening tags that could not be completed. Left unconverted.
    pub orphans: Vec<usize>,
}

static OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    let names: Vec<&str> = TAG_NAMES.iter().map(|(n, _)| *n).collect();
    Regex::new(&format!(r"<({})\b", names.join("|"))).expect("valid regex")
});

static CHILD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"<(Word|Original|Phrase|Translation|Pronunciation|Transliteration|Example|Note|Context)\s*>",
    )
    .expect("valid regex")
});

/// Scan a document for component tags, left to right.
///
/// A paired tag's body is consumed with it, so child elements such as
/// `<Phrase>` inside a `<VocabCard>` are never mistaken for components.
pub fn scan(src: &str) -> Scan {
    let mut out = Scan::default();
    let mut pos = 0;

    while let Some(m) = OPEN_RE.find_at(src, pos) {
        match parse_tag_at(src, m.start()) {
            Some(tag) => {
                pos = tag.span.end;
                out.tags.push(tag);
            }
            None => {
                out.orphans.push(m.start());
                pos = m.end();
            }
        }
    }
    out
}

/// Parse exactly one component tag starting at byte offset `start`.
pub fn parse_tag_at(src: &str, start: usize) -> Option<Tag> {
    let caps = OPEN_RE.captures_at(src, start)?;
    let whole = caps.get(0)?;
    if whole.start() != start {
        return None;
    }
    let name = caps.get(1)?.as_str();
    let component = TAG_NAMES.iter().find(|(n, _)| *n == name)?.1;

    let opening = parse_opening(src, whole.end())?;

    let (span_end, body) = if opening.self_closing {
        (opening.end, None)
    } else {
        let (close_start, close_end) = find_closing(src, name, opening.end)?;
        (close_end, Some(opening.end..close_start))
    };

    let children = match (&body, component) {
        (Some(b), Component::Vocab | Component::PhraseOfDay) => parse_children(src, b.clone()),
        _ => Vec::new(),
    };

    Some(Tag {
        name: name.to_string(),
        component,
        span: start..span_end,
        open_end: opening.open_end,
        body,
        attrs: opening.attrs,
        children,
    })
}

// ---------------------------------------------------------------------------
// Cursor-based parsing
// ---------------------------------------------------------------------------

struct Opening {
    attrs: Vec<Attr>,
    open_end: usize,
    end: usize,
    self_closing: bool,
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn parse_opening(src: &str, mut i: usize) -> Option<Opening> {
    let bytes = src.as_bytes();
    let mut attrs = Vec::new();

    loop {
        i = skip_ws(bytes, i);
        match bytes.get(i).copied()? {
            b'/' if bytes.get(i + 1) == Some(&b'>') => {
                return Some(Opening {
                    attrs,
                    open_end: i,
                    end: i + 2,
                    self_closing: true,
                });
            }
            b'>' => {
                return Some(Opening {
                    attrs,
                    open_end: i,
                    end: i + 1,
                    self_closing: false,
                });
            }
            _ => {}
        }

        let name_start = i;
        while i < bytes.len()
            && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'_' | b'-' | b':'))
        {
            i += 1;
        }
        if i == name_start {
            return None;
        }
        let name_end = i;
        let name = src[name_start..name_end].to_string();

        let after_name = skip_ws(bytes, i);
        if bytes.get(after_name) != Some(&b'=') {
            attrs.push(Attr {
                name,
                name_span: name_start..i,
                value: String::new(),
                value_span: i..i,
                kind: ValueKind::Flag,
            });
            continue;
        }
        i = skip_ws(bytes, after_name + 1);

        let (value_span, kind, next) = match bytes.get(i).copied()? {
            q @ (b'"' | b'\'') => {
                let close = src[i + 1..].find(q as char)? + i + 1;
                let kind = if q == b'"' {
                    ValueKind::DoubleQuoted
                } else {
                    ValueKind::SingleQuoted
                };
                (i + 1..close, kind, close + 1)
            }
            b'{' => {
                let close = matching_brace(bytes, i)?;
                (i + 1..close, ValueKind::Expression, close + 1)
            }
            _ => return None,
        };

        attrs.push(Attr {
            name,
            name_span: name_start..name_end,
            value: src[value_span.clone()].to_string(),
            value_span,
            kind,
        });
        i = next;
    }
}

/// Offset of the `}` matching the `{` at `open`, skipping quoted strings.
fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' | b'`' => quote = Some(b),
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Find `</name>` at or after `from`, returning its start and end offsets.
fn find_closing(src: &str, name: &str, from: usize) -> Option<(usize, usize)> {
    let needle = format!("</{name}");
    let bytes = src.as_bytes();
    let mut search = from;

    while let Some(rel) = src[search..].find(&needle) {
        let start = search + rel;
        let after = skip_ws(bytes, start + needle.len());
        if bytes.get(after) == Some(&b'>') {
            return Some((start, after + 1));
        }
        search = start + needle.len();
    }
    None
}

fn parse_children(src: &str, body: Range<usize>) -> Vec<Child> {
    let mut children = Vec::new();
    let mut pos = body.start;

    while pos < body.end {
        let Some(caps) = CHILD_RE.captures_at(&src[..body.end], pos) else {
            break;
        };
        let (Some(open), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let Some((close_start, close_end)) = find_closing(&src[..body.end], name.as_str(), open.end())
        else {
            pos = open.end();
            continue;
        };
        let raw = &src[open.end()..close_start];
        children.push(Child {
            name: name.as_str().to_string(),
            value: unescape_text(raw.trim()),
            value_span: open.end()..close_start,
        });
        pos = close_end;
    }
    children
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_closing_with_multiline_values() {
        let src = "Intro\n<VocabCard word=\"dom\"\n  translation=\"house,\nhome\" pronunciation='dohm' />\nOutro";
        let scan = scan(src);
        assert_eq!(scan.tags.len(), 1);
        let tag = &scan.tags[0];
        assert!(tag.is_self_closing());
        assert_eq!(tag.component, Component::Vocab);
        assert_eq!(tag.field_text(Field::Translation), "house,\nhome");
        assert_eq!(tag.field_text(Field::Pronunciation), "dohm");
        assert!(tag.text(src).starts_with("<VocabCard"));
        assert!(tag.text(src).ends_with("/>"));
    }

    #[test]
    fn longer_names_win_over_prefixes() {
        let src = r#"<PhraseOfDay phrase="Cześć" /><PhrasePair word="a" /><Phrase word="b" />"#;
        let scan = scan(src);
        let names: Vec<_> = scan.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["PhraseOfDay", "PhrasePair", "Phrase"]);
        assert_eq!(scan.tags[0].component, Component::PhraseOfDay);
        assert_eq!(scan.tags[1].component, Component::Vocab);
    }

    #[test]
    fn unrelated_tags_sharing_a_prefix_are_ignored() {
        let scan = scan(r#"<PhraseBook x="1" /> <CTAButton /> <VocabCards />"#);
        assert!(scan.tags.is_empty());
        assert!(scan.orphans.is_empty());
    }

    #[test]
    fn child_form_consumes_inner_phrase_element() {
        let src = "<VocabCard>\n  <Phrase>dziękuję</Phrase>\n  <Translation>thank you</Translation>\n</VocabCard>";
        let scan = scan(src);
        assert_eq!(scan.tags.len(), 1);
        let tag = &scan.tags[0];
        assert_eq!(tag.field_text(Field::Word), "dziękuję");
        assert_eq!(tag.field_text(Field::Translation), "thank you");
        let word = tag.field(Field::Word).expect("word");
        assert_eq!(word.source, FieldSource::Child);
        assert_eq!(&src[word.span], "dziękuję");
    }

    #[test]
    fn legacy_alias_resolves_when_canonical_missing_or_blank() {
        let src = r#"<VocabCard polish="kot" translation="" english="cat" />"#;
        let tag = &scan(src).tags[0];
        assert_eq!(tag.field_text(Field::Word), "kot");
        assert_eq!(tag.field_text(Field::Translation), "cat");
        assert_eq!(tag.field(Field::Translation).map(|f| f.name), Some("english"));
    }

    #[test]
    fn blank_field_is_still_located() {
        let src = r#"<VocabCard word="kot" translation="" />"#;
        let tag = &scan(src).tags[0];
        let f = tag.field(Field::Translation).expect("located");
        assert_eq!(f.value, "");
        assert_eq!(f.span.start, f.span.end);
        assert_eq!(&src[f.span.start - 1..f.span.start], "\"");
    }

    #[test]
    fn expression_attributes_with_nested_braces() {
        let src = r#"<ConjugationTable verb="być" conjugations={[{person: "ja", word: "jestem"}, {person: 'ty', word: '}'}]} />"#;
        let tag = &scan(src).tags[0];
        let conj = tag.attr("conjugations").expect("attr");
        assert_eq!(conj.kind, ValueKind::Expression);
        assert!(conj.value.starts_with('['));
        assert!(conj.value.ends_with(']'));
        assert!(tag.is_self_closing());
    }

    #[test]
    fn unterminated_tags_are_orphans() {
        let src = "<CultureTip title=\"Tea\">\nNo closing tag here.\n\n<VocabCard word=\"x\"";
        let scan = scan(src);
        assert!(scan.tags.is_empty());
        assert_eq!(scan.orphans.len(), 2);
    }

    #[test]
    fn paired_tag_body_span() {
        let src = "<CultureTip title=\"Tea\">\nDrink it hot.\n</CultureTip >";
        let tag = &scan(src).tags[0];
        assert_eq!(tag.body_text(src).map(str::trim), Some("Drink it hot."));
        assert_eq!(tag.span.end, src.len());
    }

    #[test]
    fn parse_tag_at_requires_exact_start() {
        let src = r#"x <VocabCard word="a" />"#;
        assert!(parse_tag_at(src, 0).is_none());
        assert!(parse_tag_at(src, 2).is_some());
    }
}
