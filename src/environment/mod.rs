//! Named environments (development, staging, production, ...).
//!
//! An environment can override per-service connection settings and defines
//! variables that are substituted into `{{variable}}` placeholders of test
//! requests.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::auth::Auth;
use crate::http::request::{Headers, RequestBody, RequestConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub name: String,
    /// Keyed by service id.
    #[serde(default)]
    pub services: HashMap<String, ServiceOverride>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// Per-environment replacement of a service's connection settings. Unset
/// fields keep the service's own values; headers are merged on top.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOverride {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub auth: Option<Auth>,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Interpolate `{{variable}}` placeholders in the given text. Unknown
/// placeholders are left as they are.
pub fn interpolate(text: &str, variables: &BTreeMap<String, String>) -> String {
    let mut result = text.to_string();
    for (key, value) in variables {
        result = result.replace(&format!("{{{{{key}}}}}"), value);
    }
    result
}

/// Substitutes variables into the URL, header values, query parameters and
/// text body of `config`.
pub fn interpolate_request(config: &mut RequestConfig, variables: &BTreeMap<String, String>) {
    if variables.is_empty() {
        return;
    }

    config.url = interpolate(&config.url, variables);
    for value in config.headers.values_mut() {
        *value = interpolate(value, variables);
    }
    config.params = config
        .params
        .iter()
        .map(|(key, value)| (key.to_string(), value.map(|v| interpolate(v, variables))))
        .collect();
    if let RequestBody::Text(text) = &config.body {
        config.body = RequestBody::Text(interpolate(text, variables));
    }
}
