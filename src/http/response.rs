use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::request::RequestConfig;

/// Outcome of one completed attempt, after response interceptors ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResult {
    pub status: u16,
    pub status_text: String,
    /// Header names are lowercase.
    pub headers: BTreeMap<String, String>,
    pub data: ResponseData,
    pub response_time: u64,
    pub config: RequestConfig,
}

impl RequestResult {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Response body decoded according to the declared content type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum ResponseData {
    Json(Value),
    Text(String),
    Binary(Bytes),
}

impl ResponseData {
    /// The body as a string: text as-is, JSON compact-encoded and binary
    /// decoded as lossy UTF-8.
    pub fn to_text(&self) -> String {
        match self {
            ResponseData::Json(Value::String(text)) => text.clone(),
            ResponseData::Json(value) => value.to_string(),
            ResponseData::Text(text) => text.clone(),
            ResponseData::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    /// The body as a JSON value. Binary bodies become arrays of byte values.
    pub fn to_value(&self) -> Value {
        match self {
            ResponseData::Json(value) => value.clone(),
            ResponseData::Text(text) => Value::String(text.clone()),
            ResponseData::Binary(bytes) => {
                Value::Array(bytes.iter().map(|b| Value::from(*b)).collect())
            }
        }
    }
}

impl From<Value> for ResponseData {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => ResponseData::Text(text),
            other => ResponseData::Json(other),
        }
    }
}

impl Serialize for ResponseData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
