//! Schemas that parsed model output must satisfy.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ParseError;

/// A typed shape that untrusted JSON is validated into.
///
/// Implementations must reject anything that does not match exactly; no
/// coercion of wrong-typed fields.
pub trait ResponseSchema: Sized {
    fn validate(value: &Value) -> Result<Self, ParseError>;
}

/// Expected answer from an AI source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CauseOfDeathResponse {
    /// Cause of death, or None if the model does not know.
    pub cause_of_death: Option<String>,
    /// Model's self-reported confidence, 0.0-1.0.
    pub confidence: f64,
    /// Free-text circumstances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Citations the model claims to rely on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl ResponseSchema for CauseOfDeathResponse {
    fn validate(value: &Value) -> Result<Self, ParseError> {
        let obj = expect_object(value, "$")?;

        let cause_of_death = match obj.get("cause_of_death") {
            None => return Err(violation("cause_of_death", "required field is missing")),
            Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(other) => {
                return Err(violation(
                    "cause_of_death",
                    format!("expected string or null, got {}", type_name(other)),
                ))
            }
        };

        let confidence = match obj.get("confidence") {
            None => return Err(violation("confidence", "required field is missing")),
            Some(Value::Number(n)) => n
                .as_f64()
                .filter(|f| f.is_finite())
                .ok_or_else(|| violation("confidence", "not a finite number"))?,
            Some(other) => {
                return Err(violation(
                    "confidence",
                    format!("expected number, got {}", type_name(other)),
                ))
            }
        };
        if !(0.0..=1.0).contains(&confidence) {
            return Err(violation(
                "confidence",
                format!("must be between 0.0 and 1.0, got {}", confidence),
            ));
        }

        let details = optional_string(obj, "details")?;

        let sources = match obj.get("sources") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(violation(
                        &format!("sources[{}]", i),
                        format!("expected string, got {}", type_name(other)),
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(violation(
                    "sources",
                    format!("expected array, got {}", type_name(other)),
                ))
            }
        };

        Ok(Self {
            cause_of_death,
            confidence,
            details,
            sources,
        })
    }
}

fn expect_object<'a>(value: &'a Value, field: &str) -> Result<&'a Map<String, Value>, ParseError> {
    value
        .as_object()
        .ok_or_else(|| violation(field, format!("expected object, got {}", type_name(value))))
}

fn optional_string(obj: &Map<String, Value>, field: &str) -> Result<Option<String>, ParseError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(violation(
            field,
            format!("expected string, got {}", type_name(other)),
        )),
    }
}

fn violation(field: &str, reason: impl Into<String>) -> ParseError {
    ParseError::SchemaViolation {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_full() {
        let parsed = CauseOfDeathResponse::validate(&json!({
            "cause_of_death": " pancreatic cancer ",
            "confidence": 0.85,
            "details": "Died at home.",
            "sources": ["nytimes.com"]
        }))
        .unwrap();
        assert_eq!(parsed.cause_of_death.as_deref(), Some("pancreatic cancer"));
        assert_eq!(parsed.sources, vec!["nytimes.com"]);
    }

    #[test]
    fn test_null_cause_is_allowed() {
        let parsed =
            CauseOfDeathResponse::validate(&json!({"cause_of_death": null, "confidence": 0.0}))
                .unwrap();
        assert!(parsed.cause_of_death.is_none());
    }

    #[test]
    fn test_string_confidence_is_rejected() {
        let err = CauseOfDeathResponse::validate(&json!({
            "cause_of_death": "stroke",
            "confidence": "0.9"
        }))
        .unwrap_err();
        match err {
            ParseError::SchemaViolation { field, .. } => assert_eq!(field, "confidence"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_confidence() {
        let err = CauseOfDeathResponse::validate(&json!({
            "cause_of_death": "stroke",
            "confidence": 1.5
        }))
        .unwrap_err();
        assert!(err.to_string().contains("confidence"));
    }

    #[test]
    fn test_missing_cause_field() {
        let err = CauseOfDeathResponse::validate(&json!({"confidence": 0.5})).unwrap_err();
        assert!(err.to_string().contains("cause_of_death"));
    }

    #[test]
    fn test_bad_source_entry_names_index() {
        let err = CauseOfDeathResponse::validate(&json!({
            "cause_of_death": "stroke",
            "confidence": 0.5,
            "sources": ["ok", 3]
        }))
        .unwrap_err();
        match err {
            ParseError::SchemaViolation { field, .. } => assert_eq!(field, "sources[1]"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_array_root_rejected() {
        let err = CauseOfDeathResponse::validate(&json!([1, 2])).unwrap_err();
        match err {
            ParseError::SchemaViolation { field, reason } => {
                assert_eq!(field, "$");
                assert!(reason.contains("array"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
