//! Per-category repair strategies.
//!
//! The orchestrator's retry, validation and persistence scaffolding is shared;
//! a [`RepairStrategy`] supplies only what differs between categories: which
//! issues to detect, how to word the prompt, and how a proposed value lands in
//! the content.

use std::sync::Arc;

use articlefix_shared::{Article, Issue, IssueCategory};

use crate::apply::{Applied, Fix, Target, apply_fixes};
use crate::prompt::{PromptRecord, PromptSpec, build_prompt};

/// Category-specific behaviour plugged into the orchestrator.
pub trait RepairStrategy: Send + Sync {
    fn category(&self) -> IssueCategory;

    fn detect(&self, article: &Article) -> Vec<Issue> {
        articlefix_detect::detect(self.category(), article)
    }

    /// Task description and extra rules for the prompt.
    fn prompt_spec(&self) -> PromptSpec;

    fn build_prompt(&self, records: &[PromptRecord<'_>]) -> String {
        build_prompt(&self.prompt_spec(), records)
    }

    /// Replacement for an anchored passage given the model's text.
    fn compose_passage(&self, _target: &Target, text: &str) -> String {
        text.to_string()
    }

    fn apply(&self, content: &str, targets: &[Target], fixes: &[Fix]) -> Applied {
        apply_fixes(content, targets, fixes, |target, text| {
            self.compose_passage(target, text)
        })
    }

    /// Preferred minimum length ratio; `None` defers to configuration.
    fn min_length_ratio(&self) -> Option<f64> {
        None
    }
}

// ---------------------------------------------------------------------------
// Component fields
// ---------------------------------------------------------------------------

/// Field-level fixes inside teaching components.
#[derive(Debug, Clone, Copy)]
pub struct ComponentFieldStrategy {
    category: IssueCategory,
}

impl ComponentFieldStrategy {
    pub fn new(category: IssueCategory) -> Self {
        Self { category }
    }
}

impl RepairStrategy for ComponentFieldStrategy {
    fn category(&self) -> IssueCategory {
        self.category
    }

    fn prompt_spec(&self) -> PromptSpec {
        let keep = "Only return the keys listed for each target; other fields stay as they are.";
        match self.category {
            IssueCategory::EmptyTranslation => PromptSpec {
                task: "Some vocabulary components have an empty word or translation. Supply the missing values.".into(),
                rules: vec![
                    keep.into(),
                    "A translation is the natural equivalent a native speaker would use, not a literal gloss.".into(),
                ],
            },
            IssueCategory::PlaceholderPronunciation => PromptSpec {
                task: "Some pronunciation guides are missing, placeholders, or a copy of the word itself. Write a real guide for each.".into(),
                rules: vec![
                    keep.into(),
                    "A pronunciation guide must never repeat the word unchanged.".into(),
                ],
            },
            IssueCategory::IpaPronunciation => PromptSpec {
                task: "Some pronunciation guides use IPA symbols that learners cannot read. Rewrite each as a simple respelling.".into(),
                rules: vec![
                    keep.into(),
                    "Use no IPA symbols at all, including stress marks and length marks.".into(),
                ],
            },
            IssueCategory::CopiedPronunciation => PromptSpec {
                task: "Several different words were given the same pronunciation guide. Write the correct guide for each word.".into(),
                rules: vec![
                    keep.into(),
                    "Each guide must describe its own word; different words get different guides.".into(),
                ],
            },
            IssueCategory::PlaceholderText => PromptSpec {
                task: "Some fields and passages still contain template placeholders. Replace each with real content that fits its surroundings.".into(),
                rules: vec![
                    keep.into(),
                    "Never output bracketed stand-ins such as [TODO] or numbered stubs such as \"Example 1\".".into(),
                ],
            },
            IssueCategory::WrongScript => PromptSpec {
                task: "Some fields and passages are written in the wrong writing system. Rewrite each in the language and script its key requires.".into(),
                rules: vec![
                    keep.into(),
                    "Keep the meaning; change only the language or script.".into(),
                ],
            },
            IssueCategory::SourceLeakage => PromptSpec {
                task: "Some fields and passages were left in English instead of the language they should be in. Translate each.".into(),
                rules: vec![
                    keep.into(),
                    "Keep Markdown formatting, links and proper nouns intact.".into(),
                ],
            },
            IssueCategory::TruncatedEnding | IssueCategory::EmptySection => PromptSpec::default(),
        }
    }

    fn min_length_ratio(&self) -> Option<f64> {
        match self.category {
            IssueCategory::EmptyTranslation
            | IssueCategory::PlaceholderPronunciation
            | IssueCategory::IpaPronunciation
            | IssueCategory::CopiedPronunciation => Some(0.95),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Prose structure
// ---------------------------------------------------------------------------

/// Passage-level fixes: completing a cut-off ending, filling an empty section.
#[derive(Debug, Clone, Copy)]
pub struct ProseStrategy {
    category: IssueCategory,
}

impl ProseStrategy {
    pub fn new(category: IssueCategory) -> Self {
        Self { category }
    }
}

impl RepairStrategy for ProseStrategy {
    fn category(&self) -> IssueCategory {
        self.category
    }

    fn prompt_spec(&self) -> PromptSpec {
        match self.category {
            IssueCategory::EmptySection => PromptSpec {
                task: "Some sections have a heading but no body. Write the missing body for each heading.".into(),
                rules: vec![
                    "`text` is the section body only; do not repeat the heading.".into(),
                    "Write two to four sentences that fit the article and the heading.".into(),
                ],
            },
            _ => PromptSpec {
                task: "Each article was cut off mid-sentence. Rewrite the final passage so it ends cleanly.".into(),
                rules: vec![
                    "`text` replaces the passage shown; start from its first word and keep what it already says.".into(),
                    "Finish the thought in one or two sentences ending with terminal punctuation.".into(),
                ],
            },
        }
    }

    fn compose_passage(&self, target: &Target, text: &str) -> String {
        match self.category {
            IssueCategory::EmptySection => format!("{}\n\n{text}", target.anchor.text.trim_end()),
            _ => text.to_string(),
        }
    }
}

/// The strategy that repairs `category`.
pub fn strategy_for(category: IssueCategory) -> Arc<dyn RepairStrategy> {
    match category {
        IssueCategory::TruncatedEnding | IssueCategory::EmptySection => {
            Arc::new(ProseStrategy::new(category))
        }
        _ => Arc::new(ComponentFieldStrategy::new(category)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::group_targets;

    fn article(content: &str) -> Article {
        Article {
            id: "a1".into(),
            native_lang: "en".into(),
            target_lang: "pl".into(),
            title: String::new(),
            category: None,
            content: content.into(),
            content_html: String::new(),
        }
    }

    #[test]
    fn every_category_has_a_strategy() {
        for category in IssueCategory::ALL {
            let strategy = strategy_for(category);
            assert_eq!(strategy.category(), category);
            assert!(!strategy.prompt_spec().task.is_empty(), "{category}");
        }
    }

    #[test]
    fn narrow_fixes_demand_near_full_length() {
        assert_eq!(
            strategy_for(IssueCategory::EmptyTranslation).min_length_ratio(),
            Some(0.95)
        );
        assert_eq!(strategy_for(IssueCategory::SourceLeakage).min_length_ratio(), None);
        assert_eq!(strategy_for(IssueCategory::EmptySection).min_length_ratio(), None);
    }

    #[test]
    fn ipa_guide_is_rewritten_in_place() {
        let content = r#"<VocabCard word="kot" translation="cat" pronunciation="/kɔt/" />"#;
        let strategy = strategy_for(IssueCategory::IpaPronunciation);
        let targets = group_targets(strategy.detect(&article(content)));
        assert_eq!(targets.len(), 1);
        assert_eq!(strategy.min_length_ratio(), Some(0.95));

        let fix = Fix {
            index: 1,
            values: [("pronunciation".to_string(), "KOHT".to_string())].into(),
        };
        let applied = strategy.apply(content, &targets, &[fix]);
        assert_eq!(
            applied.content,
            r#"<VocabCard word="kot" translation="cat" pronunciation="KOHT" />"#
        );
    }

    #[test]
    fn empty_section_body_lands_under_its_heading() {
        let content = "Intro.\n\n## Food\n\n## Drinks\n\nWater is woda.";
        let strategy = strategy_for(IssueCategory::EmptySection);
        let targets = group_targets(strategy.detect(&article(content)));
        assert_eq!(targets.len(), 1);

        let fix = Fix {
            index: 1,
            values: [("text".to_string(), "Bread is chleb.".to_string())].into(),
        };
        let applied = strategy.apply(content, &targets, &[fix]);
        assert_eq!(
            applied.content,
            "Intro.\n\n## Food\n\nBread is chleb.\n\n## Drinks\n\nWater is woda."
        );
    }

    #[test]
    fn truncated_tail_is_replaced() {
        let intro = "Saturday mornings are for the market, where the stalls sell bread, cheese, fruit and flowers.";
        let content = format!("{intro}\n\nWe went to the market and then,");
        let content = content.as_str();
        let strategy = strategy_for(IssueCategory::TruncatedEnding);
        let targets = group_targets(strategy.detect(&article(content)));
        assert_eq!(targets.len(), 1);

        let fix = Fix {
            index: 1,
            values: [(
                "text".to_string(),
                "We went to the market and then went home.".to_string(),
            )]
            .into(),
        };
        let applied = strategy.apply(content, &targets, &[fix]);
        assert_eq!(
            applied.content,
            format!("{intro}\n\nWe went to the market and then went home.")
        );
    }
}
