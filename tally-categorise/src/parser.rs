//! Pull a JSON record list out of free-form model output.
//!
//! Models are asked for a JSON array but routinely return a bare object, a
//! numbered mapping, a list missing its opening bracket, or an array buried in
//! prose. Each strategy below handles one of those, tried in a fixed order so a
//! well-formed reply is always taken by the strict first parse.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::error::ParseError;

static ARRAY_OF_OBJECTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[\s*\{.*\}\s*\]").expect("valid array pattern"));

/// Extract an ordered list of records from raw completion text.
pub fn extract_structured_records(raw: &str) -> Result<Vec<Value>, ParseError> {
    let raw = raw.trim();

    if let Some(records) = parse_direct(raw) {
        return Ok(records);
    }

    // Bare object, or several objects separated by commas
    if raw.starts_with('{') && raw.ends_with('}') {
        if let Some(records) = parse_list(&format!("[{raw}]")) {
            return Ok(records);
        }
    }

    // Objects followed by a closing bracket with no opening one
    if raw.starts_with('{') && closes_with_stray_bracket(raw) {
        if let Some(records) = parse_list(&format!("[{raw}")) {
            return Ok(records);
        }
    }

    if let Some(m) = ARRAY_OF_OBJECTS.find(raw) {
        if let Some(records) = parse_list(m.as_str()) {
            return Ok(records);
        }
    }

    Err(ParseError("no structured record list found".to_string()))
}

fn parse_direct(raw: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(raw).ok()? {
        Value::Array(items) => Some(items),
        Value::Object(map) => {
            let mut keyed = Vec::with_capacity(map.len());
            for (key, value) in map {
                keyed.push((numeric_key(&key)?, value));
            }
            keyed.sort_by_key(|(k, _)| *k);
            Some(keyed.into_iter().map(|(_, v)| v).collect())
        }
        _ => None,
    }
}

fn numeric_key(key: &str) -> Option<u128> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

fn closes_with_stray_bracket(raw: &str) -> bool {
    raw.strip_suffix(']')
        .is_some_and(|rest| rest.trim_end().ends_with('}'))
}

fn parse_list(text: &str) -> Option<Vec<Value>> {
    serde_json::from_str::<Vec<Value>>(text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_well_formed_list_unchanged() {
        let raw = r#"[{"Index": 0, "Category": "Food"}, {"Index": 1, "Category": "Bills"}]"#;
        let records = extract_structured_records(raw).unwrap();
        assert_eq!(
            records,
            vec![json!({"Index": 0, "Category": "Food"}), json!({"Index": 1, "Category": "Bills"})]
        );
    }

    #[test]
    fn test_numbered_mapping_sorted_numerically() {
        let raw = r#"{"0": "A", "2": "C", "1": "B"}"#;
        assert_eq!(extract_structured_records(raw).unwrap(), vec![json!("A"), json!("B"), json!("C")]);

        let raw = r#"{"10": {"i": 10}, "2": {"i": 2}, "1": {"i": 1}}"#;
        let got = extract_structured_records(raw).unwrap();
        assert_eq!(got, vec![json!({"i": 1}), json!({"i": 2}), json!({"i": 10})]);
    }

    #[test]
    fn test_single_object_is_wrapped() {
        let raw = r#"{"index": 3, "category": "Transport"}"#;
        assert_eq!(
            extract_structured_records(raw).unwrap(),
            vec![json!({"index": 3, "category": "Transport"})]
        );
    }

    #[test]
    fn test_comma_separated_objects() {
        let raw = "{\"index\": 0, \"category\": \"Food\"},\n{\"index\": 1, \"category\": \"Bills\"}";
        assert_eq!(extract_structured_records(raw).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_opening_bracket() {
        let raw = "{\"index\":0,\"category\":\"Food\"}\n]";
        assert_eq!(
            extract_structured_records(raw).unwrap(),
            vec![json!({"index": 0, "category": "Food"})]
        );

        let raw = "{\n  \"index\": 0\n},\n{\n  \"index\": 1\n}\n]\n";
        assert_eq!(extract_structured_records(raw).unwrap().len(), 2);
    }

    #[test]
    fn test_array_inside_prose() {
        let raw = "Sure! Here are the categories:\n```json\n[\n  {\"Index\": 7, \"Category\": \"Food\"}\n]\n```\nLet me know.";
        assert_eq!(
            extract_structured_records(raw).unwrap(),
            vec![json!({"Index": 7, "Category": "Food"})]
        );
    }

    #[test]
    fn test_nothing_usable() {
        for raw in ["", "I cannot help with that.", "42", "{\"Index\": 0, \"Category\": ", "[1, 2"] {
            let err = extract_structured_records(raw).unwrap_err();
            assert_eq!(err.to_string(), "no structured record list found", "input {raw:?}");
        }
    }
}
