//! Attribute-level helpers: alias resolution, HTML escaping, and the
//! JS-object-literal reader used by conjugation tables.

use serde_json::{Map, Value};

/// Return the first candidate key for which `lookup` yields a value.
///
/// Candidates are tried in the given order and the first hit wins.
pub fn first_alias<T>(aliases: &[&str], mut lookup: impl FnMut(&str) -> Option<T>) -> Option<T> {
    aliases.iter().find_map(|alias| lookup(alias))
}

/// Escape the characters that could break out of an HTML text or attribute context.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape text placed between a child element's tags, so it cannot open or
/// close an element. [`unescape_text`] reverses it.
pub fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Decode the entities [`escape_text`] writes.
pub fn unescape_text(s: &str) -> String {
    s.replace("&lt;", "<").replace("&gt;", ">").replace("&amp;", "&")
}

// ---------------------------------------------------------------------------
// Conjugation rows
// ---------------------------------------------------------------------------

/// One row of a conjugation table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConjugationRow {
    pub person: String,
    pub word: String,
    pub translation: String,
}

/// Parse the `[...]` expression of a `conjugations={[...]}` attribute.
///
/// Keys may be unquoted, strings single- or double-quoted, and trailing commas
/// are tolerated. Anything unparseable yields no rows.
pub fn parse_conjugations(expr: &str) -> Vec<ConjugationRow> {
    let json = js_literal_to_json(expr.trim());
    let Ok(rows) = serde_json::from_str::<Vec<Map<String, Value>>>(&json) else {
        tracing::debug!(len = expr.len(), "unparseable conjugations expression");
        return Vec::new();
    };

    rows.iter()
        .map(|row| {
            let get = |aliases: &[&str]| {
                first_alias(aliases, |k| row.get(k).and_then(Value::as_str))
                    .unwrap_or_default()
                    .to_string()
            };
            ConjugationRow {
                person: get(&["person"]),
                word: get(&["word", "polish"]),
                translation: get(&["translation", "english"]),
            }
        })
        .collect()
}

/// Rewrite a JS object/array literal into JSON.
fn js_literal_to_json(src: &str) -> String {
    let chars: Vec<char> = src.chars().collect();
    let mut out = String::with_capacity(src.len() + 16);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                out.push('"');
                i += 1;
                while i < chars.len() && chars[i] != c {
                    match chars[i] {
                        '\\' if i + 1 < chars.len() => {
                            let next = chars[i + 1];
                            if next == '\'' {
                                out.push('\'');
                            } else {
                                out.push('\\');
                                out.push(next);
                            }
                            i += 2;
                            continue;
                        }
                        '"' => out.push_str("\\\""),
                        '\n' => out.push_str("\\n"),
                        other => out.push(other),
                    }
                    i += 1;
                }
                out.push('"');
                i += 1;
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(',');
                }
                i += 1;
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                let is_key = chars[i..].iter().find(|ch| !ch.is_whitespace()) == Some(&':');
                if is_key {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_text_escaping_reverses() {
        let raw = "a < b </Translation> & &lt;";
        let escaped = escape_text(raw);
        assert!(!escaped.contains('<'));
        assert_eq!(unescape_text(&escaped), raw);
    }

    #[test]
    fn first_alias_takes_first_hit_in_order() {
        let present = |k: &str| match k {
            "english" => Some("legacy"),
            "translation" => Some("current"),
            _ => None,
        };
        assert_eq!(first_alias(&["translation", "english"], present), Some("current"));
        assert_eq!(first_alias(&["english", "translation"], present), Some("legacy"));
        assert_eq!(first_alias(&["missing"], present), None);
        assert_eq!(first_alias::<&str>(&[], present), None);
    }

    #[test]
    fn escapes_all_four_characters() {
        assert_eq!(
            escape_html(r#"Tom & "Jerry" <b>"#),
            "Tom &amp; &quot;Jerry&quot; &lt;b&gt;"
        );
        assert_eq!(escape_html("żółw"), "żółw");
    }

    #[test]
    fn conjugations_with_unquoted_keys_and_trailing_commas() {
        let rows = parse_conjugations(
            r#"[
              { person: 'ja', word: 'jestem', translation: "I am", },
              { person: 'ty', polish: 'jesteś', english: 'you are' },
            ]"#,
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].word, "jestem");
        assert_eq!(rows[0].translation, "I am");
        assert_eq!(rows[1].word, "jesteś");
        assert_eq!(rows[1].translation, "you are");
    }

    #[test]
    fn conjugation_values_may_contain_colons_and_quotes() {
        let rows = parse_conjugations(r#"[{person: "on/ona", word: 'l\'homme', translation: "he: \"is\""}]"#);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].person, "on/ona");
        assert_eq!(rows[0].word, "l'homme");
        assert_eq!(rows[0].translation, "he: \"is\"");
    }

    #[test]
    fn unparseable_conjugations_yield_nothing() {
        assert!(parse_conjugations("[{person: ").is_empty());
        assert!(parse_conjugations("not an array").is_empty());
    }
}
