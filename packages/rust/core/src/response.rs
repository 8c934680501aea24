//! Tolerant parsing of model replies into per-record fixes.

use std::collections::BTreeMap;

use articlefix_shared::{ArticleFixError, Result};
use serde_json::Value;

use crate::apply::Fix;

/// Fixes keyed by record id.
pub type ParsedFixes = BTreeMap<String, Vec<Fix>>;

/// Parse a model reply.
///
/// Accepts an array of `{"id", "fixes"}` records, a single record, or (when
/// exactly one record was asked about) a bare fix object or array of them.
/// Code fences and prose around the outermost JSON value are ignored.
pub fn parse_response(text: &str, record_ids: &[&str]) -> Result<ParsedFixes> {
    let json = extract_json(text)
        .ok_or_else(|| ArticleFixError::ResponseFormat("no JSON value in reply".into()))?;
    let value: Value = serde_json::from_str(json)
        .map_err(|e| ArticleFixError::ResponseFormat(e.to_string()))?;

    let sole = match record_ids {
        [only] => Some(*only),
        _ => None,
    };

    let mut out = ParsedFixes::new();
    match value {
        Value::Array(items) if items.iter().any(is_record) => {
            for item in &items {
                parse_record(item, &mut out)?;
            }
        }
        Value::Array(items) => {
            let id = sole.ok_or_else(|| {
                ArticleFixError::ResponseFormat("bare fix list for a batched prompt".into())
            })?;
            let fixes = items.iter().filter_map(parse_fix).collect();
            out.insert(id.to_string(), fixes);
        }
        ref v @ Value::Object(_) if is_record(v) => parse_record(v, &mut out)?,
        ref v @ Value::Object(_) => {
            let id = sole.ok_or_else(|| {
                ArticleFixError::ResponseFormat("bare fix object for a batched prompt".into())
            })?;
            out.insert(id.to_string(), parse_fix(v).into_iter().collect());
        }
        other => {
            return Err(ArticleFixError::ResponseFormat(format!(
                "expected an array or object, got {other}"
            )));
        }
    }

    out.retain(|id, _| record_ids.contains(&id.as_str()));
    Ok(out)
}

fn is_record(v: &Value) -> bool {
    v.get("id").is_some() && v.get("fixes").is_some_and(Value::is_array)
}

fn parse_record(v: &Value, out: &mut ParsedFixes) -> Result<()> {
    let id = match v.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(ArticleFixError::ResponseFormat(
                "record without a usable id".into(),
            ));
        }
    };
    let fixes = v
        .get("fixes")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(parse_fix).collect::<Vec<_>>())
        .unwrap_or_default();
    out.entry(id).or_default().extend(fixes);
    Ok(())
}

/// A fix object: `index` plus string-valued keys. Objects without a usable
/// index are dropped.
fn parse_fix(v: &Value) -> Option<Fix> {
    let obj = v.as_object()?;
    let index = match obj.get("index")? {
        Value::Number(n) => usize::try_from(n.as_u64()?).ok()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    let values = obj
        .iter()
        .filter(|(k, _)| k.as_str() != "index")
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k.clone(), s.clone())),
            _ => None,
        })
        .collect();
    Some(Fix { index, values })
}

/// The outermost JSON array or object in `text`, skipping fences and prose.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let close = match text.as_bytes()[start] {
        b'[' => ']',
        _ => '}',
    };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_array() {
        let text = r#"[{"id":"a","fixes":[{"index":1,"translation":"house","pronunciation":"KAH-sah"}]},
                       {"id":"b","fixes":[]}]"#;
        let parsed = parse_response(text, &["a", "b"]).expect("parse");
        assert_eq!(parsed["a"].len(), 1);
        assert_eq!(parsed["a"][0].index, 1);
        assert_eq!(parsed["a"][0].values["translation"], "house");
        assert!(parsed["b"].is_empty());
    }

    #[test]
    fn fenced_reply_with_prose() {
        let text = "Here you go:\n```json\n[{\"id\":\"a\",\"fixes\":[{\"index\":\"2\",\"word\":\"kot\"}]}]\n```\nDone!";
        let parsed = parse_response(text, &["a"]).expect("parse");
        assert_eq!(parsed["a"][0].index, 2);
    }

    #[test]
    fn bare_fix_object_for_single_record() {
        let text = r#"{"index":1,"translation":"house","pronunciation":"KAH-sah"}"#;
        let parsed = parse_response(text, &["rec"]).expect("parse");
        assert_eq!(parsed["rec"][0].values.len(), 2);

        assert!(parse_response(text, &["a", "b"]).is_err());
    }

    #[test]
    fn bare_fix_array_for_single_record() {
        let text = r#"[{"index":1,"text":"Done."},{"index":2,"text":"Also."}]"#;
        let parsed = parse_response(text, &["rec"]).expect("parse");
        assert_eq!(parsed["rec"].len(), 2);
    }

    #[test]
    fn unknown_ids_and_bad_fixes_are_dropped() {
        let text = r#"[{"id":"zzz","fixes":[{"index":1,"word":"x"}]},
                       {"id":"a","fixes":[{"word":"no index"},{"index":-1,"word":"neg"},{"index":3,"word":"ok","note":null}]}]"#;
        let parsed = parse_response(text, &["a"]).expect("parse");
        assert!(!parsed.contains_key("zzz"));
        assert_eq!(parsed["a"].len(), 1);
        assert_eq!(parsed["a"][0].index, 3);
        assert_eq!(parsed["a"][0].values.len(), 1);
    }

    #[test]
    fn unparseable_replies_are_format_errors() {
        for text in ["", "sorry, I cannot help", "[{\"id\": \"a\", \"fixes\": [", "42"] {
            let err = parse_response(text, &["a"]).unwrap_err();
            assert!(matches!(err, ArticleFixError::ResponseFormat(_)), "{text:?}");
        }
    }
}
