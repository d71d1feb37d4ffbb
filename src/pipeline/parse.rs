//! Oracle response parsing: cleanup, JSON decoding, and the batch contract.
//!
//! Reasoning models are told to answer with raw JSON, and usually do. The
//! cleanup rules below handle the times they don't:
//!
//! 1. Strip invisible Unicode (BOM, zero-width spaces)
//! 2. Strip outer markdown fences
//! 3. Keep only the outermost `{ … }` span (drops chatter around the object)
//! 4. Decode; if the result is itself a JSON string, decode that string
//!
//! Values are then normalised to strings and checked against the batch's
//! required keys under the configured [`MissingKeyPolicy`].

use crate::config::MissingKeyPolicy;
use crate::error::ExtractError;
use crate::events::ParameterValues;
use crate::partition::FeatureBatch;
use crate::schema::NA;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n?(.*?)\n?```\s*$").unwrap());

static RE_INVISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new("[\u{FEFF}\u{200B}\u{200C}\u{200D}\u{2060}]").unwrap());

/// Symbols the extraction prompt forbids; dropped from values if the oracle uses them anyway.
const DISALLOWED_SYMBOLS: [char; 3] = ['Ω', '⌀', 'Ø'];

/// Strip fences and surrounding text, returning the outermost JSON object span.
pub fn clean_response(raw: &str) -> String {
    let s = RE_INVISIBLE.replace_all(raw, "");
    let s = s.trim();
    let s = match RE_OUTER_FENCES.captures(s) {
        Some(caps) => caps[1].trim().to_string(),
        None => s.to_string(),
    };
    match (s.find('{'), s.rfind('}')) {
        (Some(start), Some(end)) if start < end => s[start..=end].to_string(),
        _ => s,
    }
}

/// Decode an oracle response into a JSON object.
pub fn parse_object(raw: &str, batch: &str) -> Result<Map<String, Value>, ExtractError> {
    let malformed = |detail: String| ExtractError::MalformedResponse {
        batch: batch.to_string(),
        detail,
    };

    let value: Value = serde_json::from_str(&clean_response(raw)).or_else(|e| {
        serde_json::from_str::<Value>(raw.trim())
            .map_err(|_| malformed(format!("not valid JSON: {e}")))
    })?;

    let value = match value {
        Value::String(inner) => serde_json::from_str(&clean_response(&inner))
            .map_err(|e| malformed(format!("string-wrapped JSON is invalid: {e}")))?,
        other => other,
    };

    match value {
        Value::Object(map) => Ok(map),
        other => Err(malformed(format!("expected a JSON object, got {}", type_name(&other)))),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Render one JSON value as a parameter string.
///
/// `null` and blank strings become "NA"; scalars are stringified; nested
/// values are kept as compact JSON.
pub fn value_to_string(v: &Value) -> String {
    let s = match v {
        Value::Null => return NA.to_string(),
        Value::String(s) => strip_disallowed(s),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    };
    if s.trim().is_empty() {
        NA.to_string()
    } else {
        s
    }
}

fn strip_disallowed(s: &str) -> String {
    let cleaned: String = s.chars().filter(|c| !DISALLOWED_SYMBOLS.contains(c)).collect();
    cleaned.trim().to_string()
}

/// One batch's validated result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchValues {
    /// Every key in the batch's schema order, then any extra keys the oracle returned.
    pub values: ParameterValues,
    /// Reasoning fields only.
    pub reasoning: ParameterValues,
    /// Required keys the response omitted.
    pub missing: Vec<String>,
}

/// Check `map` against `batch`'s required keys and normalise it.
///
/// Unknown keys are passed through after the declared ones. A required key
/// that is absent is either filled with "NA" (and logged) or rejected,
/// depending on `policy`.
pub fn apply_contract(
    map: Map<String, Value>,
    batch: &FeatureBatch,
    policy: MissingKeyPolicy,
    file: &str,
) -> Result<BatchValues, ExtractError> {
    let required = batch.required_keys();
    let missing: Vec<String> = required
        .iter()
        .filter(|k| !map.contains_key(k.as_str()))
        .cloned()
        .collect();

    if !missing.is_empty() {
        match policy {
            MissingKeyPolicy::Reject => {
                return Err(ExtractError::MalformedResponse {
                    batch: batch.label.clone(),
                    detail: format!("missing required keys: {}", missing.join(", ")),
                });
            }
            MissingKeyPolicy::FillNa => {
                warn!(
                    "{}/{}: response omitted {} required key(s), filling with {}: {}",
                    file,
                    batch.label,
                    missing.len(),
                    NA,
                    missing.join(", ")
                );
            }
        }
    }

    let mut out = BatchValues {
        missing,
        ..Default::default()
    };
    for key in &required {
        let value = map.get(key).map(value_to_string).unwrap_or_else(|| NA.to_string());
        if batch.is_reasoning_field(key) {
            out.reasoning.insert(key.clone(), value.clone());
        }
        out.values.insert(key.clone(), value);
    }
    for (key, value) in &map {
        if !out.values.contains_key(key) {
            out.values.insert(key.clone(), value_to_string(value));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{partition, BatchStrategy};
    use crate::schema::{ReasoningField, IMPORTANT_FEATURES};
    use serde_json::json;

    fn first_batch() -> FeatureBatch {
        let features: Vec<String> = IMPORTANT_FEATURES.iter().map(|s| s.to_string()).collect();
        partition(
            &features,
            &BatchStrategy::default(),
            &[ReasoningField::close_length()],
            false,
        )
        .remove(0)
    }

    #[test]
    fn strips_fences_and_chatter() {
        let raw = "```json\n{\"a\": \"1\"}\n```";
        assert_eq!(clean_response(raw), "{\"a\": \"1\"}");
        let raw = "Here you go: {\"a\": {\"b\": 2}} hope that helps";
        assert_eq!(clean_response(raw), "{\"a\": {\"b\": 2}}");
        assert_eq!(clean_response("\u{FEFF}{}"), "{}");
    }

    #[test]
    fn reparses_string_wrapped_json() {
        let raw = serde_json::to_string(&json!("{\"revision\": \"02\"}")).unwrap();
        let map = parse_object(&raw, "batch2").unwrap();
        assert_eq!(map["revision"], "02");
    }

    #[test]
    fn rejects_non_object() {
        let err = parse_object("[1, 2]", "batch1").unwrap_err();
        assert!(err.to_string().contains("expected a JSON object"));
        assert!(parse_object("no json here", "batch1").is_err());
    }

    #[test]
    fn values_are_normalised_to_strings() {
        assert_eq!(value_to_string(&json!(null)), "NA");
        assert_eq!(value_to_string(&json!("  ")), "NA");
        assert_eq!(value_to_string(&json!(250)), "250");
        assert_eq!(value_to_string(&json!(true)), "true");
        assert_eq!(value_to_string(&json!("⌀50 mm")), "50 mm");
        assert_eq!(value_to_string(&json!("10 Ω")), "10");
        assert_eq!(value_to_string(&json!("250 BAR")), "250 BAR");
    }

    #[test]
    fn missing_key_filled_with_na() {
        let batch = first_batch();
        let map = parse_object(
            r#"{"cylinder_action": "DOUBLE ACTING", "bore_diameter": "63", "extra": 1}"#,
            "batch1",
        )
        .unwrap();
        let out = apply_contract(map, &batch, MissingKeyPolicy::FillNa, "a.pdf").unwrap();
        assert_eq!(out.values.get("bore_diameter"), Some("63"));
        assert_eq!(out.values.get("rod_diameter"), Some("NA"));
        assert_eq!(out.values.get("close_length_reasoning"), Some("NA"));
        assert_eq!(out.values.get("extra"), Some("1"));
        assert!(out.missing.contains(&"close_length".to_string()));
        assert_eq!(out.missing.len(), 5);
        let keys: Vec<&str> = out.values.keys().collect();
        assert_eq!(keys[0], "cylinder_action");
        assert_eq!(*keys.last().unwrap(), "extra");
    }

    #[test]
    fn missing_key_rejected_under_strict_policy() {
        let batch = first_batch();
        let map = parse_object(r#"{"cylinder_action": "SINGLE ACTING"}"#, "batch1").unwrap();
        let err = apply_contract(map, &batch, MissingKeyPolicy::Reject, "a.pdf").unwrap_err();
        match err {
            ExtractError::MalformedResponse { batch, detail } => {
                assert_eq!(batch, "batch1");
                assert!(detail.contains("bore_diameter"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn reasoning_is_captured_separately() {
        let batch = first_batch();
        let mut body = serde_json::Map::new();
        for key in batch.required_keys() {
            body.insert(key, json!("x"));
        }
        body.insert("close_length_reasoning".into(), json!("read CLOSE: 420"));
        let out = apply_contract(body, &batch, MissingKeyPolicy::Reject, "a.pdf").unwrap();
        assert!(out.missing.is_empty());
        assert_eq!(out.reasoning.get("close_length_reasoning"), Some("read CLOSE: 420"));
        assert_eq!(out.values.get("close_length_reasoning"), Some("read CLOSE: 420"));
    }
}
