//! Template stubs and placeholder values.

use std::ops::Range;
use std::sync::LazyLock;

use regex::{Regex, RegexSet};

/// Pronunciation values that stand in for a real guide.
static PRONUNCIATION_PLACEHOLDERS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)^\[\s*pron(?:unciation)?\s*\]$",
        r"^(?:\.{2,}|…)$",
        r"^\?+$",
        r"(?i)^tbd$",
        r"^/\s*(?:\.{2,}|…)?\s*/$",
        r"^\[\s*(?:\.{2,}|…)\s*\]$",
        r"(?i)pro-NUN-cia",
    ])
    .expect("valid regex set")
});

/// IPA symbols a casual learner cannot read.
static IPA_SYMBOLS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("[ʒʃθðŋɲɛɔəæɑɪʊɐɒʌɜɹɾɻʂʐɕʑɡɫɬɮʔçʁħʕβɸɣχˈˌː]").expect("valid regex")
});

/// Numbered stand-ins left behind by content templates ("Beispiel 3", "Word 2").
static NUMBERED_STUBS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:frase esempio|traduzione|situazione|esempio|parola|példa|fordítás|voorbeeld|vertaling|příklad|překlad|exemplo|tradução|beispiel|übersetzung|exemple|traduction|ejemplo|traducción|eksempel|exempel|översättning|tłumaczenie|przykład|exemplu|traducere|örnek|çeviri|example|translation|sentence)\s*#?\d+\b",
    )
    .expect("valid regex")
});

/// English stubs are case-sensitive to avoid hits on ordinary prose.
static ENGLISH_STUBS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:Word|Phrase|Sentence) \d+\b").expect("valid regex"));

/// `[Greeting 2 in Polish]`-style bracket stubs.
static BRACKET_STUB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\[\]\n]+? \d+ (?:in|en|auf|em|w) [^\[\]\n]+\]").expect("valid regex"));

/// Generic placeholders in prose.
static PROSE_PLACEHOLDERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\[(?:todo|placeholder|fill[ \t]+in|insert[ \t]+[^\]\n]*|\.\.\.|…)\]|\blorem ipsum\b|\bcontent goes here\b|\bcoming soon\b|\b(?-i:FIXME|TBD|XXX)\b",
    )
    .expect("valid regex")
});

/// Lowercase and strip surrounding whitespace, slashes, and brackets.
pub(crate) fn normalize_for_compare(s: &str) -> String {
    s.trim()
        .trim_matches(|c: char| c == '/' || c == '[' || c == ']' || c.is_whitespace())
        .to_lowercase()
}

/// Why a pronunciation value is unusable, if it is.
pub fn pronunciation_problem(value: &str, headword: &str) -> Option<&'static str> {
    let value = value.trim();
    if value.is_empty() {
        return Some("pronunciation is empty");
    }
    if PRONUNCIATION_PLACEHOLDERS.is_match(value) {
        return Some("pronunciation is a placeholder");
    }
    let head = normalize_for_compare(headword);
    if head.chars().count() > 3 && normalize_for_compare(value) == head {
        return Some("pronunciation repeats the headword");
    }
    None
}

/// Whether a pronunciation guide is written with IPA symbols.
pub fn has_ipa(value: &str) -> bool {
    IPA_SYMBOLS.is_match(value)
}

/// Whether a component field value is an unfilled template stub.
pub fn is_template_stub(value: &str) -> bool {
    NUMBERED_STUBS.is_match(value) || ENGLISH_STUBS.is_match(value) || BRACKET_STUB.is_match(value)
}

/// Byte ranges of placeholder markers in prose.
pub fn prose_placeholders(text: &str) -> Vec<Range<usize>> {
    PROSE_PLACEHOLDERS
        .find_iter(text)
        .chain(BRACKET_STUB.find_iter(text))
        .map(|m| m.range())
        .collect()
}
