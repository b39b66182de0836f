//! JSON object extraction from free-form generated text
//!
//! Models often wrap the JSON they were asked for in explanations or
//! code fences. The extractor locates the first opening brace and its
//! depth-balanced closing brace in a single pass.

use crate::errors::{RagError, Result};
use serde::de::DeserializeOwned;

/// Locate the first complete JSON object in `text`
///
/// # Algorithm
///
/// ```text
/// depth ← 0, start ← None
/// for each char cᵢ outside string literals:
///   '{' → if depth = 0: start ← i;  depth ← depth + 1
///   '}' → if depth > 0: depth ← depth - 1
///         if depth = 0 and start ≠ None: return text[start..=i]
/// return None
/// ```
///
/// Braces inside string literals (with escapes) do not count. Stray
/// closing braces before the first opening brace are ignored.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if start.is_none() {
            if ch == '{' {
                start = Some(i);
                depth = 1;
            }
            continue;
        }

        if escape_next {
            escape_next = false;
            continue;
        }

        if in_string {
            match ch {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| &text[s..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extract the first JSON object from `text` and decode it into `T`
pub fn parse_embedded_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let json = extract_json_object(text).ok_or_else(|| {
        RagError::JsonParseError("no complete JSON object found in response".to_string())
    })?;

    serde_json::from_str(json)
        .map_err(|e| RagError::JsonParseError(format!("failed to decode embedded JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_extract_plain_object() {
        assert_eq!(extract_json_object(r#"{"a": 1}"#), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn test_extract_with_surrounding_text() {
        let text = "Here is the analysis:\n```json\n{\"sections\": [{\"id\": \"s1\"}]}\n```\nHope this helps.";
        assert_eq!(
            extract_json_object(text),
            Some("{\"sections\": [{\"id\": \"s1\"}]}")
        );
    }

    #[test]
    fn test_extract_nested_objects() {
        let text = r#"prefix {"outer": {"inner": {"x": 1}}, "y": 2} trailing {"z": 3}"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"outer": {"inner": {"x": 1}}, "y": 2}"#)
        );
    }

    #[test]
    fn test_braces_inside_strings_ignored() {
        let text = r#"{"text": "a } brace and \" quote {", "n": 1}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn test_incomplete_object() {
        assert_eq!(extract_json_object(r#"{"a": {"b": 1}"#), None);
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_stray_closing_brace_before_object() {
        assert_eq!(extract_json_object(r#"} oops {"a": 1}"#), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn test_parse_embedded_json() {
        #[derive(Debug, Deserialize)]
        struct Payload {
            confidence: f64,
        }

        let payload: Payload =
            parse_embedded_json("Sure! {\"confidence\": 0.8} That's it.").unwrap();
        assert_eq!(payload.confidence, 0.8);

        let err = parse_embedded_json::<Payload>("nothing").unwrap_err();
        assert!(matches!(err, RagError::JsonParseError(_)));
    }
}
