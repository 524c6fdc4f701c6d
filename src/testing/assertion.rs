//! Declarative response assertions.
//!
//! An [`Assertion`] is plain data (usually loaded from a suite file). The
//! kind stays a string until evaluation so that an unrecognized kind is
//! reported per assertion instead of rejecting the whole suite.

use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use thiserror::Error;

use crate::http::response::RequestResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum AssertionKind {
    StatusCode,
    ResponseTime,
    Contains,
    Equals,
    JsonPath,
    HeaderExists,
    HeaderEquals,
    Regex,
    NotNull,
    Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl Assertion {
    pub fn new(kind: AssertionKind) -> Self {
        Self {
            kind: kind.to_string(),
            expected: None,
            path: None,
            key: None,
            pattern: None,
        }
    }

    pub fn with_expected(mut self, expected: impl Into<Value>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn status_code(expected: u16) -> Self {
        Self::new(AssertionKind::StatusCode).with_expected(expected)
    }

    pub fn json_path(path: impl Into<String>, expected: impl Into<Value>) -> Self {
        Self::new(AssertionKind::JsonPath)
            .with_path(path)
            .with_expected(expected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssertionError {
    #[error("Unknown assertion type: {0}")]
    UnknownType(String),
    #[error("Invalid regex pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// What a single evaluation observed. `actual` is `None` when the value was
/// missing altogether.
#[derive(Debug, Clone, PartialEq)]
pub struct AssertionOutcome {
    pub passed: bool,
    pub actual: Option<Value>,
    pub message: String,
}

/// Per-assertion entry of a test result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionResult {
    #[serde(rename = "type")]
    pub kind: String,
    pub expected: Option<Value>,
    pub actual: Option<Value>,
    pub passed: bool,
    pub message: String,
}

/// Evaluates one assertion. Reads `result` only.
pub fn evaluate(assertion: &Assertion, result: &RequestResult) -> Result<AssertionOutcome, AssertionError> {
    let kind = AssertionKind::from_str(&assertion.kind)
        .map_err(|_| AssertionError::UnknownType(assertion.kind.clone()))?;
    let expected = assertion.expected.as_ref();
    let path = assertion.path.as_deref();

    let outcome = match kind {
        AssertionKind::StatusCode => status_code(expected, result.status),
        AssertionKind::ResponseTime => response_time(expected, result.response_time),
        AssertionKind::Contains => contains(expected, &result.data.to_text()),
        AssertionKind::Equals => equals(expected, path, &result.data.to_value()),
        AssertionKind::JsonPath => json_path(expected, path, &result.data.to_value()),
        AssertionKind::HeaderExists => header_exists(expected, result),
        AssertionKind::HeaderEquals => header_equals(assertion.key.as_deref(), expected, result),
        AssertionKind::Regex => regex(assertion.pattern.as_deref(), &result.data.to_text())?,
        AssertionKind::NotNull => not_null(path, &result.data.to_value()),
        AssertionKind::Type => type_of(expected, path, &result.data.to_value()),
    };

    Ok(outcome)
}

/// Evaluates every assertion. Evaluation errors become failed results
/// carrying the error message.
pub fn run_assertions(assertions: &[Assertion], result: &RequestResult) -> Vec<AssertionResult> {
    assertions
        .iter()
        .map(|assertion| match evaluate(assertion, result) {
            Ok(outcome) => AssertionResult {
                kind: assertion.kind.clone(),
                expected: assertion.expected.clone(),
                actual: outcome.actual,
                passed: outcome.passed,
                message: outcome.message,
            },
            Err(err) => AssertionResult {
                kind: assertion.kind.clone(),
                expected: assertion.expected.clone(),
                actual: None,
                passed: false,
                message: err.to_string(),
            },
        })
        .collect()
}

/// Dot-notation lookup. Numeric segments index arrays; no path returns the
/// whole value.
pub fn value_at_path(data: &Value, path: Option<&str>) -> Option<Value> {
    let Some(path) = path.filter(|p| !p.is_empty()) else {
        return Some(data.clone());
    };

    let mut current = data;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

/// Runtime type name; arrays are distinguished from objects.
pub fn type_name(value: Option<&Value>) -> &'static str {
    match value {
        None => "undefined",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    }
}

fn render(value: Option<&Value>) -> String {
    value.map_or_else(|| "undefined".to_string(), Value::to_string)
}

fn as_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        other => render(other),
    }
}

fn path_label(path: Option<&str>) -> &str {
    path.filter(|p| !p.is_empty()).unwrap_or("(root)")
}

fn status_code(expected: Option<&Value>, actual: u16) -> AssertionOutcome {
    let passed = expected.and_then(Value::as_u64) == Some(u64::from(actual));
    AssertionOutcome {
        passed,
        actual: Some(Value::from(actual)),
        message: if passed {
            format!("Status code is {actual}")
        } else {
            format!("Expected status {}, got {actual}", render(expected))
        },
    }
}

fn response_time(expected: Option<&Value>, actual: u64) -> AssertionOutcome {
    let passed = expected
        .and_then(Value::as_f64)
        .is_some_and(|budget| actual as f64 <= budget);
    let budget = render(expected);
    AssertionOutcome {
        passed,
        actual: Some(Value::from(actual)),
        message: if passed {
            format!("Response time {actual}ms is within {budget}ms")
        } else {
            format!("Response time {actual}ms exceeds {budget}ms")
        },
    }
}

fn contains(expected: Option<&Value>, body: &str) -> AssertionOutcome {
    let needle = as_text(expected);
    let passed = body.contains(&needle);
    AssertionOutcome {
        passed,
        actual: Some(Value::String(body.to_string())),
        message: if passed {
            format!("Response contains \"{needle}\"")
        } else {
            format!("Response does not contain \"{needle}\"")
        },
    }
}

fn equals(expected: Option<&Value>, path: Option<&str>, data: &Value) -> AssertionOutcome {
    let actual = value_at_path(data, path);
    let passed = actual.as_ref() == expected;
    AssertionOutcome {
        message: if passed {
            format!("Value at {} equals expected", path_label(path))
        } else {
            format!("Expected {}, got {}", render(expected), render(actual.as_ref()))
        },
        passed,
        actual,
    }
}

fn json_path(expected: Option<&Value>, path: Option<&str>, data: &Value) -> AssertionOutcome {
    let actual = value_at_path(data, path);
    let passed = actual.is_some() && actual.as_ref() == expected;
    let label = path_label(path);
    AssertionOutcome {
        message: if passed {
            format!("JSON path {label} matches expected value")
        } else {
            format!(
                "JSON path {label}: expected {}, got {}",
                render(expected),
                render(actual.as_ref())
            )
        },
        passed,
        actual,
    }
}

fn header_exists(expected: Option<&Value>, result: &RequestResult) -> AssertionOutcome {
    let name = as_text(expected);
    let passed = result.header(&name).is_some();
    let headers = result
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    AssertionOutcome {
        passed,
        actual: Some(Value::Object(headers)),
        message: if passed {
            format!("Header \"{name}\" exists")
        } else {
            format!("Header \"{name}\" does not exist")
        },
    }
}

fn header_equals(key: Option<&str>, expected: Option<&Value>, result: &RequestResult) -> AssertionOutcome {
    let name = key.unwrap_or_default();
    let actual = result.header(name).map(str::to_string);
    let passed = matches!((actual.as_deref(), expected), (Some(a), Some(Value::String(e))) if a == e);
    let shown = actual.clone().unwrap_or_else(|| "undefined".to_string());
    AssertionOutcome {
        passed,
        actual: actual.map(Value::String),
        message: if passed {
            format!("Header \"{name}\" equals expected value")
        } else {
            format!("Header \"{name}\": expected \"{}\", got \"{shown}\"", as_text(expected))
        },
    }
}

fn regex(pattern: Option<&str>, body: &str) -> Result<AssertionOutcome, AssertionError> {
    let pattern = pattern.unwrap_or_default();
    let re = Regex::new(pattern).map_err(|err| AssertionError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    })?;
    let passed = re.is_match(body);
    Ok(AssertionOutcome {
        passed,
        actual: Some(Value::String(body.to_string())),
        message: if passed {
            "Response matches regex pattern".to_string()
        } else {
            format!("Response does not match regex pattern: {pattern}")
        },
    })
}

fn not_null(path: Option<&str>, data: &Value) -> AssertionOutcome {
    let actual = value_at_path(data, path);
    let passed = actual.as_ref().is_some_and(|v| !v.is_null());
    let label = path_label(path);
    AssertionOutcome {
        passed,
        actual,
        message: if passed {
            format!("Value at {label} is not null")
        } else {
            format!("Value at {label} is null or undefined")
        },
    }
}

fn type_of(expected: Option<&Value>, path: Option<&str>, data: &Value) -> AssertionOutcome {
    let actual = value_at_path(data, path);
    let actual_type = type_name(actual.as_ref());
    let expected_type = as_text(expected);
    let passed = actual_type == expected_type;
    AssertionOutcome {
        passed,
        actual: Some(Value::String(actual_type.to_string())),
        message: if passed {
            format!("Value at {} is of type {actual_type}", path_label(path))
        } else {
            format!("Expected type {expected_type}, got {actual_type}")
        },
    }
}
