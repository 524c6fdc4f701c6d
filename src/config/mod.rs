//! Process-wide defaults, environments and suite files.
//!
//! [`GlobalConfig`] is usually the `config` section of a [`SuiteFile`];
//! every field has a default so an empty object is a valid configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::environment::EnvironmentConfig;
use crate::http::client::{
    ClientDefaults, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY_MS, DEFAULT_TIMEOUT_MS,
};
use crate::http::request::Headers;
use crate::services::Service;
use crate::testing::TestCase;

pub const DEFAULT_ENVIRONMENT: &str = "development";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse `{path}`: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    #[serde(default = "default_timeout")]
    pub default_timeout: u64,
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    #[serde(default = "default_headers")]
    pub default_headers: Headers,
    #[serde(default = "default_environments")]
    pub environments: BTreeMap<String, EnvironmentConfig>,
    #[serde(default = "default_environment")]
    pub current_environment: String,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_headers() -> Headers {
    let mut headers = Headers::new();
    headers.insert("Content-Type".into(), "application/json".into());
    headers
}

fn default_environments() -> BTreeMap<String, EnvironmentConfig> {
    [
        ("development", "Development"),
        ("staging", "Staging"),
        ("production", "Production"),
    ]
    .into_iter()
    .map(|(key, name)| {
        (
            key.to_string(),
            EnvironmentConfig {
                name: name.to_string(),
                ..Default::default()
            },
        )
    })
    .collect()
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_timeout(),
            max_retries: default_retries(),
            retry_delay: default_retry_delay(),
            default_headers: default_headers(),
            environments: default_environments(),
            current_environment: default_environment(),
        }
    }
}

impl GlobalConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        read_json(path)
    }

    pub fn client_defaults(&self) -> ClientDefaults {
        ClientDefaults {
            timeout_ms: self.default_timeout,
            retries: self.max_retries,
            retry_delay_ms: self.retry_delay,
        }
    }

    pub fn environment(&self, name: &str) -> Option<&EnvironmentConfig> {
        self.environments.get(name)
    }

    pub fn current(&self) -> Option<&EnvironmentConfig> {
        self.environment(&self.current_environment)
    }
}

/// A test suite definition: configuration, services and test cases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuiteFile {
    #[serde(default)]
    pub config: GlobalConfig,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

impl SuiteFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        read_json(path)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}
