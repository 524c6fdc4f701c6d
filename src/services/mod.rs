//! Registry of the API services under test.
//!
//! A service is a base URL plus default headers, auth and timeout. The
//! current environment may override any of them, see
//! [`ServiceRegistry::service_config`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::Auth;
use crate::config::GlobalConfig;
use crate::history::HistoryEntry;
use crate::http::client::HttpClient;
use crate::http::error::{RequestError, TransportError};
use crate::http::method::HttpMethod;
use crate::http::request::{Headers, RequestConfig, merge_headers, set_header};

/// Paths probed, in order, to find a service's health endpoint.
pub const HEALTH_ENDPOINTS: [&str; 4] = ["/health", "/ping", "/status", "/api/health"];

const PROBE_TIMEOUT_MS: u64 = 3_000;
const HEALTH_TIMEOUT_MS: u64 = 5_000;
const HEALTH_RETRIES: u32 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Service not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ServiceStatus {
    #[default]
    Unknown,
    Checking,
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub auth: Option<Auth>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub status: ServiceStatus,
    #[serde(default)]
    pub last_health_check: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Service {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            base_url: base_url.into(),
            headers: Headers::new(),
            auth: None,
            timeout: None,
            status: ServiceStatus::Unknown,
            last_health_check: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        set_header(&mut self.headers, name, value);
        self
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }
}

/// Effective connection settings of a service in the current environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub base_url: String,
    pub headers: Headers,
    pub auth: Option<Auth>,
    pub timeout: u64,
}

impl ServiceConfig {
    /// A GET against `endpoint` carrying this service's headers and auth.
    fn get(&self, endpoint: &str) -> RequestConfig {
        let mut config = RequestConfig::new(HttpMethod::Get, build_endpoint_url(&self.base_url, endpoint));
        config.headers = self.headers.clone();
        config.auth = self.auth.clone();
        config
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percent, rounded to one decimal.
    pub success_rate: f64,
    /// Milliseconds, rounded.
    pub avg_response_time: u64,
}

pub struct ServiceRegistry {
    services: Vec<Service>,
    config: GlobalConfig,
}

impl ServiceRegistry {
    pub fn new(config: GlobalConfig) -> Self {
        Self {
            services: Vec::new(),
            config,
        }
    }

    pub fn with_services(mut self, services: impl IntoIterator<Item = Service>) -> Self {
        for service in services {
            self.add(service);
        }
        self
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    pub fn current_environment(&self) -> &str {
        &self.config.current_environment
    }

    pub fn set_environment(&mut self, name: impl Into<String>) {
        self.config.current_environment = name.into();
    }

    /// Variables of the current environment.
    pub fn variables(&self) -> BTreeMap<String, String> {
        self.config
            .current()
            .map(|env| env.variables.clone())
            .unwrap_or_default()
    }

    /// Registers `service`, replacing any service with the same id. A blank
    /// id is replaced with a fresh one.
    pub fn add(&mut self, mut service: Service) -> &Service {
        if service.id.is_empty() {
            service.id = Uuid::new_v4().to_string();
        }
        self.services.retain(|existing| existing.id != service.id);
        self.services.push(service);
        let last = self.services.len() - 1;
        &self.services[last]
    }

    pub fn update(
        &mut self,
        id: &str,
        apply: impl FnOnce(&mut Service),
    ) -> Result<&Service, ServiceError> {
        let service = self
            .services
            .iter_mut()
            .find(|service| service.id == id)
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;
        apply(service);
        service.id = id.to_string();
        service.updated_at = Utc::now();
        Ok(service)
    }

    pub fn remove(&mut self, id: &str) -> Result<Service, ServiceError> {
        let index = self
            .services
            .iter()
            .position(|service| service.id == id)
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;
        Ok(self.services.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&Service> {
        self.services.iter().find(|service| service.id == id)
    }

    pub fn list(&self) -> &[Service] {
        &self.services
    }

    pub fn service_config(&self, service: &Service) -> ServiceConfig {
        let overrides = self
            .config
            .current()
            .and_then(|env| env.services.get(&service.id));

        let mut headers = service.headers.clone();
        let mut base_url = service.base_url.clone();
        let mut auth = service.auth.clone();
        let mut timeout = service.timeout;

        if let Some(overrides) = overrides {
            merge_headers(&mut headers, &overrides.headers);
            if let Some(url) = overrides.base_url.as_ref().filter(|url| !url.is_empty()) {
                base_url = url.clone();
            }
            if overrides.auth.is_some() {
                auth = overrides.auth.clone();
            }
            timeout = overrides.timeout.or(timeout);
        }

        ServiceConfig {
            base_url,
            headers,
            auth,
            timeout: timeout.unwrap_or(self.config.default_timeout),
        }
    }

    /// Probes the service's health endpoints and records the resulting
    /// status.
    pub async fn check_health(
        &mut self,
        id: &str,
        client: &HttpClient,
    ) -> Result<ServiceStatus, ServiceError> {
        let service = self.get(id).ok_or_else(|| ServiceError::NotFound(id.to_string()))?;
        let config = self.service_config(service);
        self.set_status(id, ServiceStatus::Checking);

        let status = match find_health_endpoint(&config, client).await {
            Some(endpoint) => {
                let request = config
                    .get(endpoint)
                    .with_timeout(HEALTH_TIMEOUT_MS)
                    .with_retries(HEALTH_RETRIES);
                match client.request(request).await {
                    Ok(result) if result.status == 200 => ServiceStatus::Active,
                    Ok(_) | Err(_) => ServiceStatus::Inactive,
                }
            }
            None => ServiceStatus::Unknown,
        };

        tracing::info!(service = %id, %status, "health check finished");
        self.set_status(id, status);
        if let Some(service) = self.services.iter_mut().find(|service| service.id == id) {
            service.last_health_check = Some(Utc::now());
        }
        Ok(status)
    }

    /// Aggregates the history entries whose URL starts with the service's
    /// effective base URL.
    pub fn service_stats(
        &self,
        id: &str,
        history: &[HistoryEntry],
    ) -> Result<ServiceStats, ServiceError> {
        let service = self.get(id).ok_or_else(|| ServiceError::NotFound(id.to_string()))?;
        let base_url = self.service_config(service).base_url;

        let matching: Vec<&HistoryEntry> = history
            .iter()
            .filter(|entry| entry.url.starts_with(&base_url))
            .collect();

        let total = matching.len();
        let successful = matching
            .iter()
            .filter(|entry| entry.status.code().is_some_and(|code| (200..400).contains(&code)))
            .count();
        let (success_rate, avg_response_time) = if total == 0 {
            (0.0, 0)
        } else {
            let rate = successful as f64 / total as f64 * 100.0;
            let time_sum: u64 = matching.iter().map(|entry| entry.response_time).sum();
            (
                (rate * 10.0).round() / 10.0,
                (time_sum as f64 / total as f64).round() as u64,
            )
        };

        Ok(ServiceStats {
            total,
            successful,
            failed: total - successful,
            success_rate,
            avg_response_time,
        })
    }

    fn set_status(&mut self, id: &str, status: ServiceStatus) {
        if let Some(service) = self.services.iter_mut().find(|service| service.id == id) {
            service.status = status;
        }
    }
}

async fn find_health_endpoint(config: &ServiceConfig, client: &HttpClient) -> Option<&'static str> {
    for endpoint in HEALTH_ENDPOINTS {
        let probe = config
            .get(endpoint)
            .with_timeout(PROBE_TIMEOUT_MS)
            .with_retries(0);
        // A server error still means something answered on this path.
        match client.request(probe).await {
            Ok(_) | Err(RequestError::Transport(TransportError::Status { .. })) => return Some(endpoint),
            Err(err) => tracing::debug!(%endpoint, error = %err, "health probe failed"),
        }
    }
    None
}

/// Joins `base` and `endpoint` with exactly one `/`. Absolute endpoints are
/// returned unchanged.
pub fn build_endpoint_url(base: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }

    let base = base.strip_suffix('/').unwrap_or(base);
    if endpoint.starts_with('/') {
        format!("{base}{endpoint}")
    } else {
        format!("{base}/{endpoint}")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::environment::{EnvironmentConfig, ServiceOverride};
    use crate::http::transport::{Transport, TransportRequest, TransportResponse};

    /// Answers by path; unknown paths fail with a network error.
    struct RoutedTransport {
        routes: HashMap<&'static str, u16>,
        seen: Mutex<Vec<String>>,
    }

    impl RoutedTransport {
        fn new(routes: &[(&'static str, u16)]) -> Arc<Self> {
            Arc::new(Self {
                routes: routes.iter().copied().collect(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for RoutedTransport {
        async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
            self.seen.lock().unwrap().push(request.url.path().to_string());
            match self.routes.get(request.url.path()) {
                Some(status) => Ok(TransportResponse {
                    status: *status,
                    status_text: String::new(),
                    headers: Vec::new(),
                    body: Bytes::new(),
                }),
                None => Err(TransportError::Network("connection refused".into())),
            }
        }
    }

    fn registry_with(service: Service) -> ServiceRegistry {
        ServiceRegistry::new(GlobalConfig::default()).with_services([service])
    }

    #[test]
    fn endpoint_url_has_single_slash() {
        assert_eq!(build_endpoint_url("https://a.example/", "/users"), "https://a.example/users");
        assert_eq!(build_endpoint_url("https://a.example", "users"), "https://a.example/users");
        assert_eq!(build_endpoint_url("https://a.example/", "users"), "https://a.example/users");
        assert_eq!(
            build_endpoint_url("https://a.example", "https://b.example/x"),
            "https://b.example/x"
        );
    }

    #[test]
    fn service_config_applies_environment_override() {
        let service = Service::new("orders", "https://orders.dev")
            .with_id("orders")
            .with_header("X-Team", "core")
            .with_header("X-Env", "dev")
            .with_auth(Auth::bearer("dev-token"));

        let mut config = GlobalConfig::default();
        let mut staging = EnvironmentConfig {
            name: "Staging".into(),
            ..Default::default()
        };
        let mut override_headers = Headers::new();
        override_headers.insert("X-Env".into(), "staging".into());
        staging.services.insert(
            "orders".into(),
            ServiceOverride {
                base_url: Some("https://orders.staging".into()),
                auth: None,
                headers: override_headers,
                timeout: Some(1_500),
            },
        );
        config.environments.insert("staging".into(), staging);

        let mut registry = ServiceRegistry::new(config).with_services([service]);
        let dev = registry.service_config(registry.get("orders").unwrap());
        assert_eq!(dev.base_url, "https://orders.dev");
        assert_eq!(dev.timeout, 30_000);

        registry.set_environment("staging");
        let staged = registry.service_config(registry.get("orders").unwrap());
        assert_eq!(staged.base_url, "https://orders.staging");
        assert_eq!(staged.headers.get("X-Env").unwrap(), "staging");
        assert_eq!(staged.headers.get("X-Team").unwrap(), "core");
        assert_eq!(staged.auth, Some(Auth::bearer("dev-token")));
        assert_eq!(staged.timeout, 1_500);
    }

    #[test]
    fn update_and_remove_unknown_service_fail() {
        let mut registry = ServiceRegistry::new(GlobalConfig::default());
        assert_eq!(
            registry.update("missing", |_| {}).unwrap_err(),
            ServiceError::NotFound("missing".into())
        );
        assert!(registry.remove("missing").is_err());
    }

    #[test]
    fn add_replaces_same_id_and_fills_blank_ids() {
        let mut registry = ServiceRegistry::new(GlobalConfig::default());
        registry.add(Service::new("a", "https://a.example").with_id("svc"));
        registry.add(Service::new("b", "https://b.example").with_id("svc"));
        let generated = registry.add(Service::new("c", "https://c.example").with_id("")).id.clone();

        assert_eq!(registry.list().len(), 2);
        assert_eq!(registry.get("svc").unwrap().name, "b");
        assert!(!generated.is_empty());

        registry.update("svc", |service| service.name = "renamed".into()).unwrap();
        assert_eq!(registry.get("svc").unwrap().name, "renamed");
        assert_eq!(registry.remove("svc").unwrap().name, "renamed");
        assert!(registry.get("svc").is_none());
    }

    #[tokio::test]
    async fn health_check_marks_active_on_200() {
        let transport = RoutedTransport::new(&[("/ping", 200)]);
        let client = HttpClient::new(transport.clone());
        let mut registry = registry_with(Service::new("api", "https://api.example/").with_id("api"));

        let status = registry.check_health("api", &client).await.unwrap();
        assert_eq!(status, ServiceStatus::Active);

        let service = registry.get("api").unwrap();
        assert_eq!(service.status, ServiceStatus::Active);
        assert!(service.last_health_check.is_some());
        assert_eq!(*transport.seen.lock().unwrap(), ["/health", "/ping", "/ping"]);
    }

    #[tokio::test(start_paused = true)]
    async fn health_check_marks_inactive_on_other_status() {
        let transport = RoutedTransport::new(&[("/health", 503)]);
        let client = HttpClient::new(transport.clone());
        let mut registry = registry_with(Service::new("api", "https://api.example").with_id("api"));

        let status = registry.check_health("api", &client).await.unwrap();
        assert_eq!(status, ServiceStatus::Inactive);
        assert_eq!(*transport.seen.lock().unwrap(), ["/health", "/health", "/health"]);
    }

    #[tokio::test]
    async fn health_check_marks_inactive_on_client_error() {
        let transport = RoutedTransport::new(&[("/health", 404)]);
        let client = HttpClient::new(transport.clone());
        let mut registry = registry_with(Service::new("api", "https://api.example").with_id("api"));

        let status = registry.check_health("api", &client).await.unwrap();
        assert_eq!(status, ServiceStatus::Inactive);
        assert_eq!(*transport.seen.lock().unwrap(), ["/health", "/health"]);
    }

    #[tokio::test]
    async fn health_check_without_endpoint_is_unknown() {
        let transport = RoutedTransport::new(&[]);
        let client = HttpClient::new(transport.clone());
        let mut registry = registry_with(Service::new("api", "https://api.example").with_id("api"));

        let status = registry.check_health("api", &client).await.unwrap();
        assert_eq!(status, ServiceStatus::Unknown);
        assert_eq!(transport.seen.lock().unwrap().len(), HEALTH_ENDPOINTS.len());
    }

    #[tokio::test]
    async fn health_check_of_unknown_service_fails() {
        let client = HttpClient::new(RoutedTransport::new(&[]));
        let mut registry = ServiceRegistry::new(GlobalConfig::default());
        assert!(registry.check_health("nope", &client).await.is_err());
    }

    #[test]
    fn stats_count_entries_under_base_url() {
        let registry = registry_with(Service::new("api", "https://api.example").with_id("api"));
        let history = vec![
            HistoryEntry::completed(HttpMethod::Get, "https://api.example/a", 200, 10),
            HistoryEntry::completed(HttpMethod::Get, "https://api.example/b", 302, 20),
            HistoryEntry::completed(HttpMethod::Get, "https://api.example/c", 500, 31),
            HistoryEntry::failed(HttpMethod::Get, "https://api.example/d", "boom"),
            HistoryEntry::completed(HttpMethod::Get, "https://other.example/", 200, 999),
        ];

        let stats = registry.service_stats("api", &history).unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.success_rate, 50.0);
        assert_eq!(stats.avg_response_time, 15);
    }

    #[test]
    fn stats_with_no_history_are_zero() {
        let registry = registry_with(Service::new("api", "https://api.example").with_id("api"));
        let stats = registry.service_stats("api", &[]).unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.avg_response_time, 0);
    }
}
