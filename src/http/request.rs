use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::auth::Auth;

use super::method::HttpMethod;

/// Header map keyed by name. Wire order is by name; names are kept unique
/// regardless of case by [`set_header`] and [`merge_headers`].
pub type Headers = BTreeMap<String, String>;

/// Inserts `name`, replacing any existing header that differs only in case.
pub fn set_header(headers: &mut Headers, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    headers.retain(|key, _| !key.eq_ignore_ascii_case(&name));
    headers.insert(name, value.into());
}

/// Overlays `overrides` on `headers` with [`set_header`].
pub fn merge_headers(headers: &mut Headers, overrides: &Headers) {
    for (name, value) in overrides {
        set_header(headers, name.clone(), value.clone());
    }
}

/// One outbound request as supplied by a caller.
///
/// `timeout`, `retries` and `retry_delay` fall back to the client defaults
/// when unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestConfig {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: RequestBody,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub auth: Option<Auth>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub retry_delay: Option<u64>,
}

impl RequestConfig {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        set_header(&mut self.headers, name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Option<&str>) -> Self {
        self.params.push(key, value.map(str::to_string));
        self
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_retry_delay(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay = Some(retry_delay_ms);
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Removes every header matching `name` regardless of case.
    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
    }
}

/// Request payload.
///
/// From JSON, a string becomes `Text`, `null` becomes `None` and any other
/// value becomes `Json`. Binary and multipart bodies are only built in code.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    None,
    Text(String),
    Binary(Bytes),
    Json(Value),
    Form(Vec<FormPart>),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        match self {
            RequestBody::None => true,
            RequestBody::Text(text) => text.is_empty(),
            RequestBody::Binary(bytes) => bytes.is_empty(),
            RequestBody::Json(value) => value.is_null(),
            RequestBody::Form(parts) => parts.is_empty(),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            RequestBody::None => Value::Null,
            RequestBody::Text(text) => Value::String(text.clone()),
            RequestBody::Binary(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
            RequestBody::Json(value) => value.clone(),
            RequestBody::Form(parts) => Value::Array(
                parts
                    .iter()
                    .map(|part| {
                        let mut entry = serde_json::Map::new();
                        entry.insert("name".into(), Value::String(part.name.clone()));
                        match &part.value {
                            FormValue::Text(text) => {
                                entry.insert("value".into(), Value::String(text.clone()));
                            }
                            FormValue::File { filename, .. } => {
                                entry.insert("filename".into(), Value::String(filename.clone()));
                            }
                        }
                        Value::Object(entry)
                    })
                    .collect(),
            ),
        }
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RequestBody::None,
            Value::String(text) => RequestBody::Text(text),
            other => RequestBody::Json(other),
        }
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Text(text.to_string())
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Binary(bytes)
    }
}

impl Serialize for RequestBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RequestBody {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Value::deserialize(deserializer)?.into())
    }
}

/// One part of a multipart form body.
#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    pub name: String,
    pub value: FormValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File {
        filename: String,
        content_type: Option<String>,
        data: Bytes,
    },
}

impl FormPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: FormValue::Text(value.into()),
        }
    }

    pub fn file(name: impl Into<String>, filename: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            value: FormValue::File {
                filename: filename.into(),
                content_type: None,
                data,
            },
        }
    }
}

/// Query parameters in declaration order. `None` values are kept so that
/// URL construction can skip them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<(String, Option<String>)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: Option<String>) {
        self.0.push((key.into(), value));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_deref()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for Params {
    fn from_iter<T: IntoIterator<Item = (K, Option<String>)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(key, value)| (key.into(), value)).collect())
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Params {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ParamsVisitor;

        impl<'de> Visitor<'de> for ParamsVisitor {
            type Value = Params;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of query parameters")
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Params, E> {
                Ok(Params::new())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Params, A::Error> {
                let mut params = Params::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    let value = match value {
                        Value::Null => None,
                        Value::String(text) => Some(text),
                        other => Some(other.to_string()),
                    };
                    params.push(key, value);
                }
                Ok(params)
            }
        }

        deserializer.deserialize_any(ParamsVisitor)
    }
}
