//! Core domain types: articles, detected issues, anchors, and repair outcomes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ArticleFixError;

// ---------------------------------------------------------------------------
// Article
// ---------------------------------------------------------------------------

/// One localized article: source markup plus its derived HTML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Stable record identifier.
    pub id: String,
    /// Reader's language code (labels, translations, pronunciation guides).
    pub native_lang: String,
    /// Language being taught (headwords, flag glyph).
    pub target_lang: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Source markup. Authoritative.
    pub content: String,
    /// Derived HTML, re-derivable from `content` and the language codes.
    #[serde(default)]
    pub content_html: String,
}

impl Article {
    /// `native-target` pair key, e.g. `es-en`.
    pub fn pair(&self) -> String {
        format!("{}-{}", self.native_lang, self.target_lang)
    }
}

/// Partial update written back through the persistence adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleUpdate {
    pub content: Option<String>,
    pub content_html: Option<String>,
}

impl ArticleUpdate {
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.content_html.is_none()
    }
}

/// Selection of articles to read.
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    /// Restrict to these ids (empty = all).
    pub ids: Vec<String>,
    pub native_lang: Option<String>,
    pub target_lang: Option<String>,
    pub limit: Option<usize>,
}

impl ArticleFilter {
    /// Parse a `native-target` pair such as `es-en` into a filter.
    pub fn for_pair(pair: &str) -> crate::Result<Self> {
        let (native, target) = pair.split_once('-').ok_or_else(|| {
            ArticleFixError::config(format!("invalid language pair '{pair}': expected xx-yy"))
        })?;
        if native.is_empty() || target.is_empty() {
            return Err(ArticleFixError::config(format!(
                "invalid language pair '{pair}': expected xx-yy"
            )));
        }
        Ok(Self {
            native_lang: Some(native.to_string()),
            target_lang: Some(target.to_string()),
            ..Self::default()
        })
    }

    /// Whether an in-memory article passes the filter (ignores `limit`).
    pub fn matches(&self, article: &Article) -> bool {
        if !self.ids.is_empty() && !self.ids.iter().any(|id| id == &article.id) {
            return false;
        }
        if self
            .native_lang
            .as_ref()
            .is_some_and(|lang| lang != &article.native_lang)
        {
            return false;
        }
        if self
            .target_lang
            .as_ref()
            .is_some_and(|lang| lang != &article.target_lang)
        {
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// Category of content defect. Each category has one repair strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueCategory {
    EmptyTranslation,
    WrongScript,
    PlaceholderPronunciation,
    IpaPronunciation,
    CopiedPronunciation,
    PlaceholderText,
    SourceLeakage,
    TruncatedEnding,
    EmptySection,
}

impl IssueCategory {
    /// Every category, in the order `--category all` runs them.
    pub const ALL: [IssueCategory; 9] = [
        Self::EmptyTranslation,
        Self::PlaceholderPronunciation,
        Self::IpaPronunciation,
        Self::CopiedPronunciation,
        Self::PlaceholderText,
        Self::WrongScript,
        Self::SourceLeakage,
        Self::TruncatedEnding,
        Self::EmptySection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyTranslation => "empty-translation",
            Self::WrongScript => "wrong-script",
            Self::PlaceholderPronunciation => "placeholder-pronunciation",
            Self::IpaPronunciation => "ipa-pronunciation",
            Self::CopiedPronunciation => "copied-pronunciation",
            Self::PlaceholderText => "placeholder-text",
            Self::SourceLeakage => "source-leakage",
            Self::TruncatedEnding => "truncated-ending",
            Self::EmptySection => "empty-section",
        }
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueCategory {
    type Err = ArticleFixError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ArticleFixError::config(format!("unknown issue category '{s}'")))
    }
}

/// How urgently an issue should be repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// Exact location of a defect, captured once at detection time.
///
/// `start..end` is a byte range into the article content and `text` is the
/// content of that range when it was captured. Fixes are applied only if the
/// content at the range still equals `text`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Anchor {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Anchor {
    pub fn new(start: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            start,
            end: start + text.len(),
            text,
        }
    }

    /// Whether `content` still holds the captured text at the captured range.
    pub fn holds_in(&self, content: &str) -> bool {
        content.get(self.start..self.end) == Some(self.text.as_str())
    }
}

/// A single detected defect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub category: IssueCategory,
    pub anchor: Anchor,
    /// Offending field name for component defects (`translation`, `pronunciation`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Offending value as found in the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub severity: Severity,
    /// Human-readable explanation, used in reports and prompts.
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Final result of processing one record in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Outcome {
    Applied { fields_fixed: usize },
    Failed { reason: String },
    Skipped { reason: String },
}

impl Outcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_and_display() {
        for category in IssueCategory::ALL {
            let parsed: IssueCategory = category.as_str().parse().expect("parse");
            assert_eq!(parsed, category);
        }
        assert!("bogus".parse::<IssueCategory>().is_err());
    }

    #[test]
    fn category_serializes_kebab_case() {
        let json = serde_json::to_string(&IssueCategory::PlaceholderPronunciation).unwrap();
        assert_eq!(json, "\"placeholder-pronunciation\"");
    }

    #[test]
    fn anchor_holds_only_at_captured_range() {
        let content = "abc <X/> def <X/>";
        let anchor = Anchor::new(4, "<X/>");
        assert!(anchor.holds_in(content));
        let shifted = format!("z{content}");
        assert!(!anchor.holds_in(&shifted));
    }

    #[test]
    fn filter_for_pair() {
        let filter = ArticleFilter::for_pair("es-en").expect("pair");
        assert_eq!(filter.native_lang.as_deref(), Some("es"));
        assert_eq!(filter.target_lang.as_deref(), Some("en"));
        assert!(ArticleFilter::for_pair("esen").is_err());
        assert!(ArticleFilter::for_pair("-en").is_err());
    }

    #[test]
    fn filter_matches_ids_and_languages() {
        let article = Article {
            id: "a1".into(),
            native_lang: "es".into(),
            target_lang: "en".into(),
            title: String::new(),
            category: None,
            content: String::new(),
            content_html: String::new(),
        };
        assert!(ArticleFilter::default().matches(&article));
        assert!(ArticleFilter::for_pair("es-en").unwrap().matches(&article));
        assert!(!ArticleFilter::for_pair("fr-en").unwrap().matches(&article));
        let by_id = ArticleFilter {
            ids: vec!["a2".into()],
            ..ArticleFilter::default()
        };
        assert!(!by_id.matches(&article));
    }

    #[test]
    fn outcome_serializes_tagged() {
        let json = serde_json::to_value(Outcome::failed("no fixes applied")).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["reason"], "no fixes applied");
    }
}
