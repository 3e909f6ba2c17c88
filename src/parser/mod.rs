//! Turns free-text model output into JSON values.
//!
//! Models asked for "pure JSON" still wrap it in markdown fences, prepend prose, emit
//! trailing commas or `True`/`None` literals, or get cut off mid-array. `parse_llm_json`
//! tries progressively more invasive fixes and returns the first value that parses.

pub mod text;

use crate::error::{EtlError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

pub use text::{clean_text, is_not_found_response, is_placeholder, normalize_haeyo, strip_citations};

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)```").expect("valid fence regex"));

/// Returns the body of the first fenced block, trimmed. Unfenced text comes back
/// trimmed; an opening fence without a closing one is dropped.
pub fn strip_code_fences(text: &str) -> String {
    if let Some(caps) = FENCED_BLOCK.captures(text) {
        return caps[1].trim().to_string();
    }
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let body = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
        return body.trim().to_string();
    }
    trimmed.to_string()
}

/// Extracts the first bracket-balanced JSON object or array from `text`.
///
/// Brackets inside double-quoted strings are ignored. When the value is truncated the
/// result is the prefix up to the last complete top-level member, closed with the
/// outer bracket.
pub fn extract_balanced_json(text: &str) -> Option<String> {
    let start = text.find(['{', '['])?;
    let body = &text[start..];
    let outer = if body.starts_with('{') { '}' } else { ']' };

    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut last_safe: Option<usize> = None;

    for (idx, ch) in body.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => stack.push(ch),
            '}' | ']' => {
                let opener = if ch == '}' { '{' } else { '[' };
                if stack.last() != Some(&opener) {
                    break;
                }
                stack.pop();
                match stack.len() {
                    0 => return Some(body[..=idx].to_string()),
                    1 => last_safe = Some(idx + 1),
                    _ => {}
                }
            }
            ',' if stack.len() == 1 => last_safe = Some(idx),
            _ => {}
        }
    }

    let cut = last_safe?;
    let mut repaired = body[..cut].trim_end().trim_end_matches(',').to_string();
    repaired.push(outer);
    debug!(original_len = body.len(), repaired_len = repaired.len(), "Closed truncated JSON");
    Some(repaired)
}

/// Fixes formatting errors models commonly make: trailing commas, single-quoted
/// strings and `True`/`False`/`None`. Double-quoted strings are copied verbatim.
pub fn repair_json(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '"' => {
                let end = scan_string(&chars, i, '"');
                out.extend(&chars[i..end]);
                i = end;
                continue;
            }
            '\'' => {
                let end = scan_string(&chars, i, '\'');
                let inner_end = if end > i + 1 && chars[end - 1] == '\'' { end - 1 } else { end };
                out.push('"');
                let mut k = i + 1;
                while k < inner_end {
                    let c = chars[k];
                    if c == '\\' && k + 1 < inner_end && chars[k + 1] == '\'' {
                        out.push('\'');
                        k += 2;
                        continue;
                    }
                    if c == '"' {
                        out.push_str("\\\"");
                    } else {
                        out.push(c);
                    }
                    k += 1;
                }
                out.push('"');
                i = end;
                continue;
            }
            ',' => {
                let next = chars[i + 1..].iter().copied().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}' | ']')) {
                    out.push(ch);
                }
            }
            c if c.is_ascii_alphabetic() => {
                let mut j = i;
                while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                let word: String = chars[i..j].iter().collect();
                match word.as_str() {
                    "True" => out.push_str("true"),
                    "False" => out.push_str("false"),
                    "None" => out.push_str("null"),
                    _ => out.push_str(&word),
                }
                i = j;
                continue;
            }
            _ => out.push(ch),
        }
        i += 1;
    }
    out
}

/// Index one past the closing quote, or the end of input for an unterminated string.
fn scan_string(chars: &[char], start: usize, quote: char) -> usize {
    let mut k = start + 1;
    while k < chars.len() {
        if chars[k] == '\\' {
            k += 2;
            continue;
        }
        if chars[k] == quote {
            return k + 1;
        }
        k += 1;
    }
    chars.len()
}

pub fn parse_llm_json(text: &str) -> Result<Value> {
    let stripped = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str::<Value>(&stripped) {
        return Ok(value);
    }

    if let Some(candidate) = extract_balanced_json(&stripped) {
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            return Ok(value);
        }
        if let Ok(value) = serde_json::from_str::<Value>(&repair_json(&candidate)) {
            return Ok(value);
        }
    }

    // Single-quoted strings may hide brackets from the balancer, so repair first.
    let repaired = repair_json(&stripped);
    if let Some(candidate) = extract_balanced_json(&repaired) {
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            return Ok(value);
        }
    }

    Err(EtlError::JsonExtraction)
}

/// String (or number) field, trimmed, with placeholders filtered out.
pub fn string_field(value: &Value, key: &str) -> Option<String> {
    let raw = match value.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!is_placeholder(&raw)).then_some(raw)
}

/// Array under `key`; a bare top-level array is accepted as well.
pub fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    match value {
        Value::Array(items) => items,
        other => other
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
    }
}

/// Names under `key`, each either a plain string or an object with `title`/`name`.
pub fn string_list(value: &Value, key: &str) -> Vec<String> {
    array_field(value, key)
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(_) => string_field(item, "title").or_else(|| string_field(item, "name")),
            _ => None,
        })
        .filter(|s| !is_placeholder(s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_well_formed_json_is_returned_unchanged() {
        let inner = "{\n  \"songs\": [\"Yellow\", \"Fix You\"]\n}";
        assert_eq!(strip_code_fences(&format!("```json\n{inner}\n```")), inner);
        assert_eq!(strip_code_fences(&format!("Here you go:\n```\n{inner}\n```\nThanks")), inner);
        assert_eq!(strip_code_fences(&format!("  {inner}  ")), inner);
    }

    #[test]
    fn open_fence_without_close_is_dropped() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn balanced_extraction_skips_prose_and_string_brackets() {
        let text = "Result: {\"title\": \"A [live] }\", \"n\": 2} trailing";
        assert_eq!(
            extract_balanced_json(text).unwrap(),
            "{\"title\": \"A [live] }\", \"n\": 2}"
        );
    }

    #[test]
    fn truncated_array_is_closed_at_last_complete_member() {
        let text = "[{\"title\": \"Yellow\"}, {\"title\": \"Fix You\"}, {\"title\": \"Vio";
        let extracted = extract_balanced_json(text).unwrap();
        assert_eq!(extracted, "[{\"title\": \"Yellow\"}, {\"title\": \"Fix You\"}]");
        let value: Value = serde_json::from_str(&extracted).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[test]
    fn truncated_object_keeps_complete_pairs() {
        let extracted = extract_balanced_json("{\"a\": 1, \"b\": \"tw").unwrap();
        assert_eq!(extracted, "{\"a\": 1}");
    }

    #[test]
    fn no_brackets_means_nothing_to_extract() {
        assert_eq!(extract_balanced_json("정보를 찾을 수 없습니다"), None);
    }

    #[test]
    fn repair_handles_common_model_mistakes() {
        let repaired = repair_json("{'name': 'Coldplay', 'active': True, 'label': None, 'tags': ['a', 'b',],}");
        let value: Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value, json!({"name": "Coldplay", "active": true, "label": null, "tags": ["a", "b"]}));
    }

    #[test]
    fn repair_leaves_double_quoted_content_alone() {
        let input = "{\"text\": \"it's None, True\"}";
        assert_eq!(repair_json(input), input);
    }

    #[test]
    fn parse_llm_json_walks_the_fallbacks() {
        assert_eq!(parse_llm_json("```json\n{\"a\": 1}\n```").unwrap(), json!({"a": 1}));
        assert_eq!(parse_llm_json("Sure! {\"a\": [1, 2,]} hope it helps").unwrap(), json!({"a": [1, 2]}));
        assert_eq!(parse_llm_json("{'a': '[x]'}").unwrap(), json!({"a": "[x]"}));
        assert!(matches!(parse_llm_json("no json here"), Err(EtlError::JsonExtraction)));
    }

    #[test]
    fn field_helpers_filter_placeholders() {
        let value = json!({
            "debut": 2009,
            "label": "정보 없음",
            "songs": ["Yellow", {"title": "Fix You"}, {"name": "Clocks"}, "N/A", 3]
        });
        assert_eq!(string_field(&value, "debut").as_deref(), Some("2009"));
        assert_eq!(string_field(&value, "label"), None);
        assert_eq!(string_list(&value, "songs"), vec!["Yellow", "Fix You", "Clocks"]);
        assert_eq!(string_list(&json!(["a", "b"]), "songs"), vec!["a", "b"]);
    }
}
