//! Response parser for untrusted AI output.
//!
//! Model text goes through four steps before anything downstream trusts it:
//!
//! 1. strip a surrounding markdown code fence
//! 2. tolerant JSON repair (falls back to the unrepaired text)
//! 3. JSON parse, failing with [`ParseError::MalformedResponse`]
//! 4. schema validation, failing with [`ParseError::SchemaViolation`]
//!
//! [`parse`] fails loudly. [`safe_parse`] never fails and returns a
//! [`ParseOutcome`] for batch callers that tolerate individual failures.

mod fences;
mod repair;
mod schema;

pub use fences::strip_markdown_code_fences;
pub use repair::repair_json;
pub use schema::{CauseOfDeathResponse, ResponseSchema};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Longest excerpt of the offending text kept in error messages.
const EXCERPT_CHARS: usize = 200;

/// Errors from parsing model output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Schema violation at `{field}`: {reason}")]
    SchemaViolation { field: String, reason: String },
}

/// Non-failing parse result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseOutcome<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ParseOutcome<T> {
    pub fn into_result(self) -> Result<T, String> {
        match (self.value, self.error) {
            (Some(value), _) => Ok(value),
            (None, error) => Err(error.unwrap_or_else(|| "unknown parse error".to_string())),
        }
    }
}

impl<T> From<Result<T, ParseError>> for ParseOutcome<T> {
    fn from(result: Result<T, ParseError>) -> Self {
        match result {
            Ok(value) => Self {
                ok: true,
                value: Some(value),
                error: None,
            },
            Err(e) => Self {
                ok: false,
                value: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Parse model text into a cause-of-death answer.
pub fn parse(text: &str) -> Result<CauseOfDeathResponse, ParseError> {
    parse_as(text)
}

/// Parse model text without failing.
pub fn safe_parse(text: &str) -> ParseOutcome<CauseOfDeathResponse> {
    parse(text).into()
}

/// Parse model text into any [`ResponseSchema`].
pub fn parse_as<T: ResponseSchema>(text: &str) -> Result<T, ParseError> {
    let value = parse_json(text)?;
    T::validate(&value)
}

/// Steps 1-3: fences, repair, JSON parse.
pub fn parse_json(text: &str) -> Result<Value, ParseError> {
    let stripped = strip_markdown_code_fences(text);
    if stripped.is_empty() {
        return Err(ParseError::MalformedResponse("empty response".to_string()));
    }

    let repaired = repair_json(&stripped);
    if let Some(candidate) = &repaired {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            return Ok(value);
        }
    }

    serde_json::from_str::<Value>(&stripped)
        .map_err(|e| ParseError::MalformedResponse(format!("{} - text: {}", e, excerpt(text))))
}

fn excerpt(text: &str) -> String {
    let mut out: String = text.chars().take(EXCERPT_CHARS).collect();
    if text.chars().count() > EXCERPT_CHARS {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_response() {
        let text = "```json\n{\"cause_of_death\": \"heart attack\", \"confidence\": 0.8}\n```";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.cause_of_death.as_deref(), Some("heart attack"));
        assert_eq!(parsed.confidence, 0.8);
    }

    #[test]
    fn test_safe_parse_repairs_trailing_comma() {
        let outcome = safe_parse(r#"{"cause_of_death": "stroke", "confidence": 0.6,}"#);
        assert!(outcome.ok);
        let value = outcome.value.unwrap();
        assert_eq!(value.cause_of_death.as_deref(), Some("stroke"));
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_safe_parse_garbage_reports_error() {
        let outcome = safe_parse("I'm sorry, I cannot help with that.");
        assert!(!outcome.ok);
        assert!(outcome.value.is_none());
        let error = outcome.error.unwrap();
        assert!(error.starts_with("Malformed response"), "{}", error);
    }

    #[test]
    fn test_safe_parse_unbalanced_garbage_does_not_panic() {
        for text in ["{{{{", "]]]", "{\"a\": [}", "```", "{:}", "'", "{'"] {
            let outcome = safe_parse(text);
            assert!(!outcome.ok, "expected failure for {:?}", text);
        }
    }

    #[test]
    fn test_schema_violation_is_loud() {
        let err = parse(r#"{"cause_of_death": 42, "confidence": 0.5}"#).unwrap_err();
        assert!(matches!(err, ParseError::SchemaViolation { ref field, .. } if field == "cause_of_death"));
    }

    #[test]
    fn test_truncated_fenced_response() {
        let text = "```json\n{\"cause_of_death\": \"sepsis\", \"confidence\": 0.7, \"details\": \"after surg";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.cause_of_death.as_deref(), Some("sepsis"));
        assert_eq!(parsed.details.as_deref(), Some("after surg"));
    }

    #[test]
    fn test_outcome_into_result() {
        let outcome = safe_parse(r#"{"cause_of_death": null, "confidence": 0.1}"#);
        assert!(outcome.into_result().is_ok());
        let outcome = safe_parse("nope");
        assert!(outcome.into_result().is_err());
    }
}
