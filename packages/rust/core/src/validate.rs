//! Invariant checks gating persistence of a candidate replacement.

use std::fmt;

use articlefix_markup::{Component, count_components, normalize};

/// The first invariant a candidate violated.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    Empty,
    ComponentDropped {
        component: Component,
        before: usize,
        after: usize,
    },
    TooShort {
        ratio: f64,
        required: f64,
    },
    EmptyHtml,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("candidate is empty"),
            Self::ComponentDropped {
                component,
                before,
                after,
            } => write!(
                f,
                "{} count dropped from {before} to {after}",
                component.as_str()
            ),
            Self::TooShort { ratio, required } => write!(
                f,
                "candidate is {:.0}% of original length, {:.0}% required",
                ratio * 100.0,
                required * 100.0
            ),
            Self::EmptyHtml => f.write_str("derived HTML is empty"),
        }
    }
}

/// A candidate that passed every check, with its derived HTML.
#[derive(Debug, Clone)]
pub struct Validated {
    pub html: String,
    /// The normalizer fell back to pre-render text.
    pub fell_back: bool,
}

/// Check a candidate against its original.
///
/// `min_length_ratio` of `0.0` waives the length check.
pub fn validate(
    original: &str,
    candidate: &str,
    min_length_ratio: f64,
    native: &str,
    target: &str,
) -> Result<Validated, Violation> {
    if candidate.trim().is_empty() {
        return Err(Violation::Empty);
    }

    let before = count_components(original);
    let after = count_components(candidate);
    for (component, &n) in &before {
        let m = after.get(component).copied().unwrap_or(0);
        if m < n {
            return Err(Violation::ComponentDropped {
                component: *component,
                before: n,
                after: m,
            });
        }
    }

    let original_len = original.chars().count();
    if original_len > 0 && min_length_ratio > 0.0 {
        let ratio = candidate.chars().count() as f64 / original_len as f64;
        if ratio < min_length_ratio {
            return Err(Violation::TooShort {
                ratio,
                required: min_length_ratio,
            });
        }
    }

    let result = normalize(candidate, native, Some(target));
    if result.html.trim().is_empty() {
        return Err(Violation::EmptyHtml);
    }
    Ok(Validated {
        html: result.html,
        fell_back: result.stats.fell_back,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARD: &str = r#"<VocabCard word="kot" translation="cat" />"#;

    #[test]
    fn passes_and_returns_html() {
        let original = format!("Intro.\n\n{CARD}");
        let candidate = format!("Intro text.\n\n{CARD}");
        let ok = validate(&original, &candidate, 0.8, "en", "pl").expect("valid");
        assert!(ok.html.contains("cat"));
        assert!(!ok.fell_back);
    }

    #[test]
    fn empty_candidate() {
        assert_eq!(validate("x", "  \n", 0.8, "en", "pl").unwrap_err(), Violation::Empty);
    }

    #[test]
    fn any_component_decrease_fails() {
        let original = format!("{CARD}\n{CARD}");
        let err = validate(&original, CARD, 0.0, "en", "pl").unwrap_err();
        assert_eq!(
            err,
            Violation::ComponentDropped {
                component: Component::Vocab,
                before: 2,
                after: 1
            }
        );
        assert_eq!(err.to_string(), "vocab count dropped from 2 to 1");
    }

    #[test]
    fn equal_or_more_components_pass_that_check() {
        let more = format!("{CARD}\n{CARD}");
        assert!(validate(CARD, &more, 0.8, "en", "pl").is_ok());
        assert!(validate(CARD, CARD, 0.8, "en", "pl").is_ok());
    }

    #[test]
    fn length_ratio_is_enforced_and_waivable() {
        let original = "a".repeat(100);
        let candidate = "a".repeat(79);
        match validate(&original, &candidate, 0.8, "en", "pl").unwrap_err() {
            Violation::TooShort { ratio, required } => {
                assert!((ratio - 0.79).abs() < 1e-9);
                assert_eq!(required, 0.8);
            }
            other => panic!("unexpected violation: {other:?}"),
        }
        assert!(validate(&original, &candidate, 0.0, "en", "pl").is_ok());
        assert!(validate(&original, &"a".repeat(80), 0.8, "en", "pl").is_ok());
    }

    #[test]
    fn markup_that_renders_to_nothing_fails() {
        let err = validate("<CTA />", "<CTA />", 0.8, "en", "pl").unwrap_err();
        assert_eq!(err, Violation::EmptyHtml);
    }
}
