//! Prompt builder: one instruction text per batch of same-pair records.
//!
//! Targets are numbered per record and records are keyed by id, so a batched
//! reply can never be attributed by array position.

use articlefix_shared::{Article, Script, lang};

use crate::apply::Target;

/// Bytes of preceding prose shown with a passage target.
const CONTEXT_BYTES: usize = 600;

/// One record's share of a prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptRecord<'a> {
    pub article: &'a Article,
    pub targets: &'a [Target],
}

/// Category-specific wording supplied by a repair strategy.
#[derive(Debug, Clone, Default)]
pub struct PromptSpec {
    /// What the model is asked to do, one or two sentences.
    pub task: String,
    /// Extra rules appended after the language rules.
    pub rules: Vec<String>,
}

/// How pronunciation guidance must be written for readers of `native`.
pub fn pronunciation_note(native: &str) -> String {
    match lang::script_of(native) {
        Script::Cyrillic => format!(
            "write it in Cyrillic letters (the reader is {}).",
            lang::display_name(native)
        ),
        Script::Greek => "write it in Greek letters (the reader is Greek).".to_string(),
        Script::Latin => {
            "write it in Latin letters with the stressed syllable in capitals (e.g. \"bohn-ZHOOR\", \"GRAH-tsee-eh\").".to_string()
        }
    }
}

/// Render the prompt for a batch. All records must share one language pair.
pub fn build_prompt(spec: &PromptSpec, records: &[PromptRecord<'_>]) -> String {
    let Some(first) = records.first() else {
        return String::new();
    };
    let native = first.article.native_lang.as_str();
    let target = first.article.target_lang.as_str();
    let native_name = lang::display_name(native);
    let target_name = lang::display_name(target);

    let mut p = String::new();
    push_line(
        &mut p,
        &format!("You are repairing blog articles that teach {target_name} to {native_name} speakers."),
    );
    push_line(&mut p, &spec.task);
    p.push('\n');
    push_line(&mut p, "Rules:");
    push_line(&mut p, &format!("- `word` and `example` must be in {target_name}."));
    push_line(&mut p, &format!("- `translation` and `context` must be in {native_name}."));
    push_line(
        &mut p,
        &format!(
            "- `pronunciation`: {} Never use IPA or any other phonetic-alphabet symbols.",
            pronunciation_note(native)
        ),
    );
    push_line(
        &mut p,
        &format!("- `text`: prose in {native_name}, in the article's own Markdown style."),
    );
    for rule in &spec.rules {
        push_line(&mut p, &format!("- {rule}"));
    }
    p.push('\n');

    for record in records {
        write_record(&mut p, record);
    }

    push_line(&mut p, "Respond with ONLY a JSON array, no other text:");
    push_line(
        &mut p,
        r#"[{"id":"<article id>","fixes":[{"index":1,"<key>":"<corrected value>"}]}]"#,
    );
    push_line(
        &mut p,
        "Each fix object must have \"index\" (the target number above) plus only the keys listed for that target.",
    );
    p
}

fn push_line(p: &mut String, line: &str) {
    p.push_str(line);
    p.push('\n');
}

fn write_record(p: &mut String, record: &PromptRecord<'_>) {
    let article = record.article;
    push_line(p, "--- ARTICLE ---");
    push_line(p, &format!("id: \"{}\"", article.id));
    push_line(p, &format!("title: \"{}\"", article.title));
    push_line(p, "Targets:");

    for target in record.targets {
        let keys = target.fields().join(", ");
        if target.is_component() {
            push_line(p, &format!("  [{}] component, keys: {keys}", target.index));
            push_line(p, &format!("      {}", target.anchor.text));
        } else {
            push_line(p, &format!("  [{}] passage, keys: {keys}", target.index));
            let context = preceding_context(&article.content, target.anchor.start);
            if !context.is_empty() {
                push_line(p, &format!("      preceding text: \"{context}\""));
            }
            push_line(p, &format!("      passage: \"{}\"", target.anchor.text));
        }
        for issue in &target.issues {
            let line = match (&issue.field, &issue.value) {
                (Some(field), Some(value)) => format!(
                    "      - {field} ({}): {}; current value \"{value}\"",
                    issue.category, issue.detail
                ),
                _ => format!("      - {}: {}", issue.category, issue.detail),
            };
            push_line(p, &line);
        }
    }
    p.push('\n');
}

/// Up to [`CONTEXT_BYTES`] of content before `at`, on a char boundary.
fn preceding_context(content: &str, at: usize) -> &str {
    let mut start = at.saturating_sub(CONTEXT_BYTES);
    while !content.is_char_boundary(start) {
        start += 1;
    }
    content[start..at].trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::group_targets;
    use articlefix_shared::{Anchor, Issue, IssueCategory, Severity};

    fn article(id: &str, native: &str, target: &str, content: &str) -> Article {
        Article {
            id: id.into(),
            native_lang: native.into(),
            target_lang: target.into(),
            title: "Greetings".into(),
            category: None,
            content: content.into(),
            content_html: String::new(),
        }
    }

    fn card_targets(content: &str) -> Vec<Target> {
        group_targets(vec![
            Issue {
                category: IssueCategory::EmptyTranslation,
                anchor: Anchor::new(0, content),
                field: Some("translation".into()),
                value: Some(String::new()),
                severity: Severity::High,
                detail: "translation is empty".into(),
            },
            Issue {
                category: IssueCategory::PlaceholderPronunciation,
                anchor: Anchor::new(0, content),
                field: Some("pronunciation".into()),
                value: Some("[...]".into()),
                severity: Severity::Medium,
                detail: "pronunciation is a placeholder".into(),
            },
        ])
    }

    #[test]
    fn names_languages_fields_and_values() {
        let content = r#"<VocabCard word="casa" translation="" pronunciation="[...]" />"#;
        let a = article("rec-1", "es", "en", content);
        let targets = card_targets(content);
        let spec = PromptSpec {
            task: "Fill in the broken fields.".into(),
            rules: vec!["Keep the headword unchanged.".into()],
        };
        let prompt = build_prompt(&spec, &[PromptRecord { article: &a, targets: &targets }]);

        assert!(prompt.contains("teach English to Spanish speakers"));
        assert!(prompt.contains("id: \"rec-1\""));
        assert!(prompt.contains("[1] component, keys: translation, pronunciation"));
        assert!(prompt.contains("current value \"[...]\""));
        assert!(prompt.contains("Keep the headword unchanged."));
        assert!(prompt.contains("\"index\""));
        assert!(prompt.contains("Latin letters"));
        assert!(prompt.contains("Never use IPA"));
    }

    #[test]
    fn every_section_ends_its_line() {
        let content = r#"<VocabCard word="casa" translation="" pronunciation="[...]" />"#;
        let a = article("rec-1", "es", "en", content);
        let targets = card_targets(content);
        let spec = PromptSpec {
            task: "Fill in the broken fields.".into(),
            rules: Vec::new(),
        };
        let prompt = build_prompt(&spec, &[PromptRecord { article: &a, targets: &targets }]);

        assert!(prompt.starts_with(
            "You are repairing blog articles that teach English to Spanish speakers.\nFill in the broken fields.\n\nRules:\n"
        ));
        assert!(prompt.contains("\n--- ARTICLE ---\nid: \"rec-1\"\ntitle: \"Greetings\"\nTargets:\n"));
        assert!(prompt.contains(
            "\nRespond with ONLY a JSON array, no other text:\n[{\"id\":\"<article id>\",\"fixes\":[{\"index\":1,\"<key>\":\"<corrected value>\"}]}]\n"
        ));
        assert!(prompt.ends_with("listed for that target.\n"));
    }

    #[test]
    fn batched_records_are_keyed_by_id() {
        let content = r#"<VocabCard word="casa" translation="" pronunciation="[...]" />"#;
        let a = article("rec-a", "es", "en", content);
        let b = article("rec-b", "es", "en", content);
        let targets = card_targets(content);
        let prompt = build_prompt(
            &PromptSpec::default(),
            &[
                PromptRecord { article: &a, targets: &targets },
                PromptRecord { article: &b, targets: &targets },
            ],
        );
        assert!(prompt.contains("id: \"rec-a\""));
        assert!(prompt.contains("id: \"rec-b\""));
        assert_eq!(prompt.matches("[1] component").count(), 2);
    }

    #[test]
    fn pronunciation_script_follows_reader() {
        assert!(pronunciation_note("ru").contains("Cyrillic"));
        assert!(pronunciation_note("uk").contains("Cyrillic"));
        assert!(pronunciation_note("el").contains("Greek"));
        assert!(pronunciation_note("pl").contains("capitals"));
    }

    #[test]
    fn passage_targets_show_preceding_text() {
        let content = "Ola. ¿Qué tal? Vamos al mercado y luego,";
        let start = content.find("Vamos").unwrap();
        let a = article("r", "es", "en", content);
        let targets = group_targets(vec![Issue {
            category: IssueCategory::TruncatedEnding,
            anchor: Anchor::new(start, &content[start..]),
            field: None,
            value: None,
            severity: Severity::High,
            detail: "article ends mid-sentence".into(),
        }]);
        let prompt = build_prompt(&PromptSpec::default(), &[PromptRecord { article: &a, targets: &targets }]);
        assert!(prompt.contains("[1] passage, keys: text"));
        assert!(prompt.contains("preceding text: \"Ola. ¿Qué tal?\""));
        assert!(prompt.contains("- truncated-ending: article ends mid-sentence"));
    }

    #[test]
    fn context_respects_char_boundaries() {
        let content = format!("{}tail", "ż".repeat(400));
        let at = content.len() - 4;
        let ctx = preceding_context(&content, at);
        assert!(ctx.len() <= CONTEXT_BYTES);
        assert!(ctx.starts_with('ż'));
    }
}
