//! Lenient decoding of loosely-typed generated fields
//!
//! The same field can arrive as an array, an object, a quoted string or
//! null depending on the generating model. Each shape is an explicit
//! variant of a tagged union; anything that cannot be interpreted decodes
//! to an empty list rather than failing the whole payload.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Raw shapes a list-valued field may take
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LooseList {
    /// `[0, "1", 2]`
    Items(Vec<Value>),
    /// `{"0": true, "step_2": 2}`
    Keyed(Map<String, Value>),
    /// `"0, 2"` or `"[1]"` or `"none"`
    Text(String),
    /// `null` or any scalar that is not a string
    Other(Value),
}

impl LooseList {
    /// Interpret the value as step indices; unparsable parts are dropped
    pub fn into_indices(self) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            LooseList::Items(items) => items.iter().filter_map(value_as_index).collect(),
            LooseList::Keyed(map) => map
                .iter()
                .filter_map(|(key, value)| value_as_index(value).or_else(|| text_as_index(key)))
                .collect(),
            LooseList::Text(text) => split_text(&text).filter_map(text_as_index).collect(),
            LooseList::Other(value) => value_as_index(&value).into_iter().collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Interpret the value as a list of non-empty strings
    pub fn into_strings(self) -> Vec<String> {
        match self {
            LooseList::Items(items) => items.iter().filter_map(value_as_text).collect(),
            LooseList::Keyed(map) => map.values().filter_map(value_as_text).collect(),
            LooseList::Text(text) => split_text(&text).map(str::to_string).collect(),
            LooseList::Other(value) => value_as_text(&value).into_iter().collect(),
        }
    }
}

fn split_text(text: &str) -> impl Iterator<Item = &str> {
    text.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(|c| c == ',' || c == ';')
        .map(|part| part.trim().trim_matches('"').trim())
        .filter(|part| !part.is_empty())
}

fn value_as_index(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => text_as_index(s),
        _ => None,
    }
}

/// Accepts "2", "step 2", "step_2", "#2"
fn text_as_index(text: &str) -> Option<usize> {
    let digits: String = text
        .trim()
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `deserialize_with` adapter for index lists (null or missing → empty)
pub fn lenient_indices<'de, D>(deserializer: D) -> Result<Vec<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(LooseList::deserialize(deserializer)
        .map(LooseList::into_indices)
        .unwrap_or_default())
}

/// `deserialize_with` adapter for string lists (null or missing → empty)
pub fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(LooseList::deserialize(deserializer)
        .map(LooseList::into_strings)
        .unwrap_or_default())
}

/// `deserialize_with` adapter for optional text that may arrive as any scalar
pub fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer).unwrap_or(Value::Null);
    Ok(match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// `deserialize_with` adapter for yes/no flags that may arrive as text or numbers
pub fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer).unwrap_or(Value::Null);
    Ok(match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n > 0.0),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "yes" | "y" | "1" | "sufficient"
        ),
        _ => false,
    })
}
