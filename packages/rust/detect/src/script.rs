//! Writing-system detection by codepoint ratio.

use articlefix_shared::Script;

/// Share of letters a script must exceed to count as dominant.
const DOMINANCE_THRESHOLD: f64 = 0.5;

fn classify(c: char) -> Option<Script> {
    match c {
        '\u{0400}'..='\u{04FF}' => Some(Script::Cyrillic),
        '\u{0370}'..='\u{03FF}' | '\u{1F00}'..='\u{1FFF}' => Some(Script::Greek),
        'A'..='Z' | 'a'..='z' | '\u{00C0}'..='\u{024F}' | '\u{1E00}'..='\u{1EFF}' => {
            Some(Script::Latin)
        }
        _ => None,
    }
}

/// Fraction of alphabetic codepoints in `text` that belong to `script`.
pub fn script_ratio(text: &str, script: Script) -> f64 {
    let mut letters = 0usize;
    let mut hits = 0usize;
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        letters += 1;
        if classify(c) == Some(script) {
            hits += 1;
        }
    }
    if letters == 0 {
        0.0
    } else {
        hits as f64 / letters as f64
    }
}

/// The script holding a strict majority of letters, if any.
pub fn dominant_script(text: &str) -> Option<Script> {
    [Script::Latin, Script::Cyrillic, Script::Greek]
        .into_iter()
        .find(|s| script_ratio(text, *s) > DOMINANCE_THRESHOLD)
}

/// The foreign script `text` is written in, when it is dominated by a script
/// outside `allowed`.
pub fn foreign_script(text: &str, allowed: &[Script]) -> Option<Script> {
    dominant_script(text).filter(|s| !allowed.contains(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratios() {
        assert_eq!(script_ratio("привет", Script::Cyrillic), 1.0);
        assert_eq!(script_ratio("123 !!", Script::Latin), 0.0);
        assert!(script_ratio("Москва is big", Script::Latin) > 0.4);
    }

    #[test]
    fn dominant_needs_a_strict_majority() {
        assert_eq!(dominant_script("καλημέρα"), Some(Script::Greek));
        assert_eq!(dominant_script("ἀγάπη"), Some(Script::Greek));
        assert_eq!(dominant_script("żółć"), Some(Script::Latin));
        assert_eq!(dominant_script("abcабв"), None);
        assert_eq!(dominant_script(""), None);
    }

    #[test]
    fn same_word_judged_against_expected_script() {
        let word = "спасибо";
        assert_eq!(foreign_script(word, &[Script::Cyrillic]), None);
        assert_eq!(foreign_script(word, &[Script::Latin]), Some(Script::Cyrillic));
    }

    mod prop {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn ratios_are_fractions(s in "\\PC*") {
                for script in [Script::Latin, Script::Cyrillic, Script::Greek] {
                    let r = script_ratio(&s, script);
                    prop_assert!((0.0..=1.0).contains(&r));
                }
            }

            #[test]
            fn allowed_dominant_script_is_never_foreign(s in "[а-я]{1,12}") {
                prop_assert_eq!(foreign_script(&s, &[Script::Cyrillic]), None);
            }
        }
    }
}
