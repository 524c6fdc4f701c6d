use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio::time::{Instant, sleep, timeout};
use url::Url;

use crate::history::{History, HistoryEntry};

use super::error::{RequestError, TransportError};
use super::interceptor::{LogRequests, LogResponses, RequestInterceptor, ResponseInterceptor};
use super::method::HttpMethod;
use super::request::{Headers, Params, RequestBody, RequestConfig};
use super::response::{RequestResult, ResponseData};
use super::transport::{OutgoingBody, ReqwestTransport, Transport, TransportRequest, TransportResponse};

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

const CONTENT_TYPE: &str = "Content-Type";

/// Values used when a [`RequestConfig`] leaves timeout or retry settings unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientDefaults {
    pub timeout_ms: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for ClientDefaults {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retries: DEFAULT_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

/// Executes requests through the interceptor chains with timeout, retry and
/// history tracking.
///
/// The client is `Send + Sync`; share it behind an `Arc` to run requests
/// concurrently. The history is the only state mutated by requests.
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    defaults: ClientDefaults,
    base_url: Option<Url>,
    request_interceptors: RwLock<Vec<Arc<dyn RequestInterceptor>>>,
    response_interceptors: RwLock<Vec<Arc<dyn ResponseInterceptor>>>,
    history: Mutex<History>,
}

impl HttpClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            defaults: ClientDefaults::default(),
            base_url: None,
            request_interceptors: RwLock::new(Vec::new()),
            response_interceptors: RwLock::new(Vec::new()),
            history: Mutex::new(History::new()),
        }
    }

    /// A client backed by [`ReqwestTransport`].
    pub fn with_reqwest() -> Result<Self, TransportError> {
        Ok(Self::new(Arc::new(ReqwestTransport::new()?)))
    }

    pub fn with_defaults(mut self, defaults: ClientDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Relative request URLs are resolved against `base_url`.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Registers the debug-level logging interceptors.
    pub fn with_logging(self) -> Self {
        self.add_request_interceptor(LogRequests);
        self.add_response_interceptor(LogResponses);
        self
    }

    pub fn defaults(&self) -> ClientDefaults {
        self.defaults
    }

    pub fn add_request_interceptor(&self, interceptor: impl RequestInterceptor + 'static) {
        self.request_interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(interceptor));
    }

    pub fn add_response_interceptor(&self, interceptor: impl ResponseInterceptor + 'static) {
        self.response_interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(interceptor));
    }

    /// Runs one logical request to completion and records it in the history.
    pub async fn request(&self, config: RequestConfig) -> Result<RequestResult, RequestError> {
        let mut target = (config.method, config.url.clone());
        let outcome = self.execute(config, &mut target).await;

        let (method, url) = target;
        let entry = match &outcome {
            Ok(result) => HistoryEntry::completed(method, url, result.status, result.response_time),
            Err(err) => {
                tracing::warn!(%method, %url, error = %err, "request failed");
                HistoryEntry::failed(method, url, err.to_string())
            }
        };
        self.lock_history().push(entry);

        outcome
    }

    pub async fn get(&self, url: impl Into<String>) -> Result<RequestResult, RequestError> {
        self.request(RequestConfig::new(HttpMethod::Get, url)).await
    }

    pub async fn post(
        &self,
        url: impl Into<String>,
        body: impl Into<RequestBody>,
    ) -> Result<RequestResult, RequestError> {
        self.request(RequestConfig::new(HttpMethod::Post, url).with_body(body))
            .await
    }

    pub async fn put(
        &self,
        url: impl Into<String>,
        body: impl Into<RequestBody>,
    ) -> Result<RequestResult, RequestError> {
        self.request(RequestConfig::new(HttpMethod::Put, url).with_body(body))
            .await
    }

    pub async fn patch(
        &self,
        url: impl Into<String>,
        body: impl Into<RequestBody>,
    ) -> Result<RequestResult, RequestError> {
        self.request(RequestConfig::new(HttpMethod::Patch, url).with_body(body))
            .await
    }

    pub async fn delete(&self, url: impl Into<String>) -> Result<RequestResult, RequestError> {
        self.request(RequestConfig::new(HttpMethod::Delete, url)).await
    }

    /// Copy of the history, most recent first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.lock_history().to_vec()
    }

    pub fn history_snapshot(&self) -> History {
        self.lock_history().clone()
    }

    /// Replaces the history, e.g. with entries loaded from storage.
    pub fn restore_history(&self, history: History) {
        *self.lock_history() = history;
    }

    pub fn clear_history(&self) {
        self.lock_history().clear();
    }

    async fn execute(
        &self,
        config: RequestConfig,
        target: &mut (HttpMethod, String),
    ) -> Result<RequestResult, RequestError> {
        let request_chain = self
            .request_interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut config = config;
        for interceptor in &request_chain {
            config = interceptor.on_request(config).await?;
        }

        let url = build_url(&self.resolve_base(&config.url)?, &config.params)?;
        config.url = url.to_string();
        *target = (config.method, config.url.clone());

        if let Some(auth) = config.auth.clone() {
            auth.apply(&mut config.headers);
        }

        let (headers, body) = resolve_body(&config)?;
        let request = TransportRequest {
            method: config.method,
            url,
            headers,
            body,
        };

        let mut result = self.send_with_retry(&config, request).await?;

        let response_chain = self
            .response_interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for interceptor in &response_chain {
            result = interceptor.on_response(result, &config).await?;
        }

        Ok(result)
    }

    fn resolve_base(&self, raw: &str) -> Result<String, RequestError> {
        match (Url::parse(raw), &self.base_url) {
            (Ok(url), _) => Ok(url.to_string()),
            (Err(url::ParseError::RelativeUrlWithoutBase), Some(base)) => base
                .join(raw)
                .map(|url| url.to_string())
                .map_err(|err| RequestError::InvalidUrl {
                    url: raw.to_string(),
                    reason: err.to_string(),
                }),
            (Err(err), _) => Err(RequestError::InvalidUrl {
                url: raw.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    async fn send_with_retry(
        &self,
        config: &RequestConfig,
        request: TransportRequest,
    ) -> Result<RequestResult, RequestError> {
        let timeout_ms = config.timeout.unwrap_or(self.defaults.timeout_ms);
        let max_retries = config.retries.unwrap_or(self.defaults.retries);
        let retry_delay =
            Duration::from_millis(config.retry_delay.unwrap_or(self.defaults.retry_delay_ms));

        let mut attempt = 0;
        loop {
            match self.attempt(config, request.clone(), timeout_ms).await {
                Ok(result) => return Ok(result),
                Err(err @ RequestError::Timeout { .. }) => return Err(err),
                Err(err) => {
                    if attempt >= max_retries || !err.is_retryable() {
                        return Err(err);
                    }
                    tracing::debug!(
                        attempt,
                        max_retries,
                        error = %err,
                        url = %config.url,
                        "request attempt failed, retrying"
                    );
                    sleep(retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(
        &self,
        config: &RequestConfig,
        request: TransportRequest,
        timeout_ms: u64,
    ) -> Result<RequestResult, RequestError> {
        let started = Instant::now();
        let response = match timeout(Duration::from_millis(timeout_ms), self.transport.send(request)).await {
            Ok(response) => response?,
            Err(_) => return Err(RequestError::Timeout { timeout_ms }),
        };
        let response_time = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if response.status >= 500 {
            return Err(TransportError::Status {
                status: response.status,
                message: response.status_text,
            }
            .into());
        }

        let data = decode_body(&response)?;
        let headers: BTreeMap<String, String> = response
            .headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();

        Ok(RequestResult {
            status: response.status,
            status_text: response.status_text,
            headers,
            data,
            response_time,
            config: config.clone(),
        })
    }

    fn lock_history(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Appends `params` to `base` as query parameters, skipping `None` and empty
/// values and keeping declaration order.
pub fn build_url(base: &str, params: &Params) -> Result<Url, RequestError> {
    let mut url = Url::parse(base).map_err(|err| RequestError::InvalidUrl {
        url: base.to_string(),
        reason: err.to_string(),
    })?;

    let pairs: Vec<(&str, &str)> = params
        .iter()
        .filter_map(|(key, value)| value.filter(|v| !v.is_empty()).map(|v| (key, v)))
        .collect();

    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }

    Ok(url)
}

/// Final headers and wire body for `config`.
fn resolve_body(config: &RequestConfig) -> Result<(Headers, OutgoingBody), RequestError> {
    if !config.method.allows_body() || config.body.is_empty() {
        return Ok((config.headers.clone(), OutgoingBody::Empty));
    }

    let mut resolved = config.clone();
    let body = match &config.body {
        RequestBody::None => OutgoingBody::Empty,
        RequestBody::Text(text) => OutgoingBody::Bytes(Bytes::from(text.clone())),
        RequestBody::Binary(bytes) => OutgoingBody::Bytes(bytes.clone()),
        RequestBody::Form(parts) => {
            resolved.remove_header(CONTENT_TYPE);
            OutgoingBody::Multipart(parts.clone())
        }
        RequestBody::Json(value) => {
            let raw = serde_json::to_vec(value)?;
            if !resolved.has_header(CONTENT_TYPE) {
                resolved
                    .headers
                    .insert(CONTENT_TYPE.into(), "application/json".into());
            }
            OutgoingBody::Bytes(Bytes::from(raw))
        }
    };

    Ok((resolved.headers, body))
}

fn decode_body(response: &TransportResponse) -> Result<ResponseData, RequestError> {
    let content_type = response.content_type();

    if content_type.contains("application/json") {
        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(ResponseData::Json(Value::Null));
        }
        let value = serde_json::from_slice(&response.body)
            .map_err(|err| RequestError::Decode(err.to_string()))?;
        Ok(ResponseData::Json(value))
    } else if content_type.contains("text/") {
        Ok(ResponseData::Text(String::from_utf8_lossy(&response.body).into_owned()))
    } else {
        Ok(ResponseData::Binary(response.body.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::auth::Auth;
    use crate::history::{HistoryStatus, MAX_HISTORY_ENTRIES};
    use crate::http::request::FormPart;

    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
        sent: Mutex<Vec<TransportRequest>>,
    }

    impl ScriptedTransport {
        fn with_script(script: Vec<Result<TransportResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn attempts(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        fn last_sent(&self) -> TransportRequest {
            self.sent.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
            self.sent.lock().unwrap().push(request);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json_response(200, json!({"ok": true}))))
        }
    }

    struct FailingTransport {
        error: TransportError,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Transport for FailingTransport {
        async fn send(&self, _request: TransportRequest) -> Result<TransportResponse, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(self.error.clone())
        }
    }

    struct HangingTransport {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Transport for HangingTransport {
        async fn send(&self, _request: TransportRequest) -> Result<TransportResponse, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    fn json_response(status: u16, body: Value) -> TransportResponse {
        TransportResponse {
            status,
            status_text: "OK".into(),
            headers: vec![("Content-Type".into(), "application/json; charset=utf-8".into())],
            body: Bytes::from(body.to_string()),
        }
    }

    fn typed_response(content_type: &str, body: &'static [u8]) -> TransportResponse {
        TransportResponse {
            status: 200,
            status_text: "OK".into(),
            headers: vec![("content-type".into(), content_type.into())],
            body: Bytes::from_static(body),
        }
    }

    fn network_error() -> TransportError {
        TransportError::Network("connection reset".into())
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_make_retries_plus_one_attempts() {
        for retries in 0..4u32 {
            let transport = Arc::new(FailingTransport {
                error: network_error(),
                attempts: AtomicUsize::new(0),
            });
            let client = HttpClient::new(transport.clone());

            let err = client
                .request(
                    RequestConfig::new(HttpMethod::Get, "https://api.example/x")
                        .with_retries(retries)
                        .with_retry_delay(10),
                )
                .await
                .unwrap_err();

            assert!(matches!(err, RequestError::Transport(TransportError::Network(_))));
            assert_eq!(transport.attempts.load(Ordering::SeqCst), retries as usize + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_terminal_after_one_attempt() {
        let transport = Arc::new(HangingTransport {
            attempts: AtomicUsize::new(0),
        });
        let client = HttpClient::new(transport.clone());

        let err = client
            .request(
                RequestConfig::new(HttpMethod::Get, "https://api.example/slow")
                    .with_timeout(50)
                    .with_retries(5),
            )
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Request timeout after 50ms");
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(client.history()[0].error.as_deref(), Some("Request timeout after 50ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_fail_immediately() {
        for error in [
            TransportError::Aborted,
            TransportError::InvalidRequest("bad header".into()),
            TransportError::Status {
                status: 404,
                message: "Not Found".into(),
            },
        ] {
            let transport = Arc::new(FailingTransport {
                error,
                attempts: AtomicUsize::new(0),
            });
            let client = HttpClient::new(transport.clone());
            let config = RequestConfig::new(HttpMethod::Get, "https://api.example/x").with_retries(3);

            assert!(client.request(config).await.is_err());
            assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn server_status_errors_are_retried() {
        let transport = Arc::new(FailingTransport {
            error: TransportError::Status {
                status: 503,
                message: "Service Unavailable".into(),
            },
            attempts: AtomicUsize::new(0),
        });
        let client = HttpClient::new(transport.clone());
        let config = RequestConfig::new(HttpMethod::Get, "https://api.example/x").with_retries(2);

        assert!(client.request(config).await.is_err());
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn post_succeeds_after_two_transient_failures() {
        let transport = ScriptedTransport::with_script(vec![
            Err(network_error()),
            Err(network_error()),
            Ok(json_response(200, json!({"id": 7}))),
        ]);
        let client = HttpClient::new(transport.clone());

        let result = client
            .request(
                RequestConfig::new(HttpMethod::Post, "https://api.example/x")
                    .with_body(RequestBody::Json(json!({"a": 1})))
                    .with_retries(2)
                    .with_retry_delay(10),
            )
            .await
            .unwrap();

        assert_eq!(result.status, 200);
        assert_eq!(result.data, ResponseData::Json(json!({"id": 7})));
        assert_eq!(transport.attempts(), 3);

        let sent = transport.last_sent();
        assert_eq!(sent.body, OutgoingBody::Bytes(Bytes::from_static(br#"{"a":1}"#)));
        assert_eq!(sent.headers.get("Content-Type").unwrap(), "application/json");

        let history = client.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, HistoryStatus::Code(200));
    }

    #[tokio::test]
    async fn history_keeps_latest_hundred() {
        let transport = ScriptedTransport::with_script(Vec::new());
        let client = HttpClient::new(transport);

        for i in 0..MAX_HISTORY_ENTRIES + 20 {
            client.get(format!("https://api.example/{i}")).await.unwrap();
        }

        let history = client.history();
        assert_eq!(history.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(history[0].url, format!("https://api.example/{}", MAX_HISTORY_ENTRIES + 19));
        assert!(history.iter().all(|e| e.url != "https://api.example/0"));
        assert!(history.iter().all(|e| e.url != "https://api.example/19"));
    }

    #[tokio::test]
    async fn request_interceptors_apply_in_registration_order() {
        let transport = ScriptedTransport::with_script(Vec::new());
        let client = HttpClient::new(transport.clone());

        client.add_request_interceptor(|config: RequestConfig| async move {
            Ok::<_, RequestError>(config.with_header("X-Trace", "a"))
        });
        client.add_request_interceptor(|mut config: RequestConfig| async move {
            let previous = config.headers.get("X-Trace").cloned().unwrap_or_default();
            config.headers.insert("X-Trace".into(), format!("{previous},b"));
            Ok::<_, RequestError>(config)
        });

        client.get("https://api.example/x").await.unwrap();
        assert_eq!(transport.last_sent().headers.get("X-Trace").unwrap(), "a,b");
    }

    #[tokio::test]
    async fn response_interceptors_apply_in_registration_order() {
        let transport = ScriptedTransport::with_script(Vec::new());
        let client = HttpClient::new(transport);

        client.add_response_interceptor(|mut result: RequestResult, _config: RequestConfig| async move {
            result.status_text.push_str("+a");
            Ok::<_, RequestError>(result)
        });
        client.add_response_interceptor(|mut result: RequestResult, config: RequestConfig| async move {
            result.status_text.push_str(&format!("+b@{}", config.url));
            Ok::<_, RequestError>(result)
        });

        let result = client.get("https://api.example/x").await.unwrap();
        assert_eq!(result.status_text, "OK+a+b@https://api.example/x");
    }

    #[tokio::test]
    async fn interceptor_failure_is_recorded_without_sending() {
        let transport = ScriptedTransport::with_script(Vec::new());
        let client = HttpClient::new(transport.clone());
        client.add_request_interceptor(|_config: RequestConfig| async move {
            Err::<RequestConfig, _>(RequestError::Interceptor("token refresh failed".into()))
        });

        let err = client.get("https://api.example/x").await.unwrap_err();
        assert!(matches!(err, RequestError::Interceptor(_)));
        assert_eq!(transport.attempts(), 0);

        let history = client.history();
        assert_eq!(history[0].status, HistoryStatus::Error);
        assert_eq!(history[0].response_time, 0);
    }

    #[test]
    fn build_url_skips_empty_and_missing_params() {
        let params: Params = [
            ("a", Some(String::new())),
            ("b", None),
            ("c", None),
            ("d", Some("x".to_string())),
        ]
        .into_iter()
        .collect();

        let url = build_url("https://api.example/items", &params).unwrap();
        assert_eq!(url.query(), Some("d=x"));
    }

    #[test]
    fn build_url_without_params_leaves_query_untouched() {
        let url = build_url("https://api.example/items", &Params::new()).unwrap();
        assert_eq!(url.as_str(), "https://api.example/items");
    }

    #[test]
    fn build_url_rejects_relative_urls() {
        let err = build_url("/items", &Params::new()).unwrap_err();
        assert!(matches!(err, RequestError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn params_are_merged_before_sending() {
        let transport = ScriptedTransport::with_script(Vec::new());
        let client = HttpClient::new(transport.clone());

        let config = RequestConfig::new(HttpMethod::Get, "https://api.example/search?q=1")
            .with_param("page", Some("2"))
            .with_param("empty", Some(""));
        let result = client.request(config).await.unwrap();

        assert_eq!(transport.last_sent().url.as_str(), "https://api.example/search?q=1&page=2");
        assert_eq!(result.config.url, "https://api.example/search?q=1&page=2");
        assert_eq!(client.history()[0].url, "https://api.example/search?q=1&page=2");
    }

    #[tokio::test]
    async fn relative_urls_resolve_against_base() {
        let transport = ScriptedTransport::with_script(Vec::new());
        let client = HttpClient::new(transport.clone())
            .with_base_url(Url::parse("https://api.example/v1/").unwrap());

        client.get("users").await.unwrap();
        assert_eq!(transport.last_sent().url.as_str(), "https://api.example/v1/users");
    }

    #[tokio::test]
    async fn auth_is_injected_into_headers() {
        let transport = ScriptedTransport::with_script(Vec::new());
        let client = HttpClient::new(transport.clone());

        let config = RequestConfig::new(HttpMethod::Get, "https://api.example/x")
            .with_auth(Auth::bearer("t0k3n"));
        let result = client.request(config).await.unwrap();

        assert_eq!(
            transport.last_sent().headers.get("Authorization").unwrap(),
            "Bearer t0k3n"
        );
        assert_eq!(result.config.header("authorization"), Some("Bearer t0k3n"));
    }

    #[tokio::test]
    async fn text_body_is_sent_verbatim() {
        let transport = ScriptedTransport::with_script(Vec::new());
        let client = HttpClient::new(transport.clone());

        client.put("https://api.example/x", "raw=1").await.unwrap();
        let sent = transport.last_sent();
        assert_eq!(sent.body, OutgoingBody::Bytes(Bytes::from_static(b"raw=1")));
        assert!(!sent.headers.contains_key("Content-Type"));
    }

    #[tokio::test]
    async fn caller_content_type_wins_for_json() {
        let transport = ScriptedTransport::with_script(Vec::new());
        let client = HttpClient::new(transport.clone());

        let config = RequestConfig::new(HttpMethod::Patch, "https://api.example/x")
            .with_header("content-type", "application/merge-patch+json")
            .with_body(RequestBody::Json(json!({"name": "x"})));
        client.request(config).await.unwrap();

        let sent = transport.last_sent();
        assert_eq!(sent.headers.len(), 1);
        assert_eq!(sent.headers.get("content-type").unwrap(), "application/merge-patch+json");
    }

    #[tokio::test]
    async fn multipart_body_drops_content_type() {
        let transport = ScriptedTransport::with_script(Vec::new());
        let client = HttpClient::new(transport.clone());

        let config = RequestConfig::new(HttpMethod::Post, "https://api.example/upload")
            .with_header("Content-Type", "application/json")
            .with_body(RequestBody::Form(vec![FormPart::text("field", "value")]));
        client.request(config).await.unwrap();

        let sent = transport.last_sent();
        assert!(sent.headers.is_empty());
        assert!(matches!(sent.body, OutgoingBody::Multipart(ref parts) if parts.len() == 1));
    }

    #[tokio::test]
    async fn get_never_sends_a_body() {
        let transport = ScriptedTransport::with_script(Vec::new());
        let client = HttpClient::new(transport.clone());

        let config = RequestConfig::new(HttpMethod::Get, "https://api.example/x")
            .with_body(RequestBody::Json(json!({"a": 1})));
        client.request(config).await.unwrap();
        assert_eq!(transport.last_sent().body, OutgoingBody::Empty);
    }

    #[tokio::test]
    async fn response_body_follows_content_type() {
        let transport = ScriptedTransport::with_script(vec![
            Ok(typed_response("text/html", b"<p>hi</p>")),
            Ok(typed_response("application/octet-stream", b"\x00\x01")),
            Ok(typed_response("application/json", b"")),
        ]);
        let client = HttpClient::new(transport);

        let text = client.get("https://api.example/a").await.unwrap();
        assert_eq!(text.data, ResponseData::Text("<p>hi</p>".into()));
        assert_eq!(text.header("Content-Type"), Some("text/html"));

        let binary = client.get("https://api.example/b").await.unwrap();
        assert_eq!(binary.data, ResponseData::Binary(Bytes::from_static(b"\x00\x01")));

        let empty = client.get("https://api.example/c").await.unwrap();
        assert_eq!(empty.data, ResponseData::Json(Value::Null));
    }

    #[tokio::test]
    async fn completed_client_errors_are_results() {
        let transport = ScriptedTransport::with_script(vec![Ok(json_response(404, json!({"error": "missing"})))]);
        let client = HttpClient::new(transport.clone());

        let result = client.get("https://api.example/missing").await.unwrap();
        assert_eq!(result.status, 404);
        assert_eq!(transport.attempts(), 1);
        assert_eq!(client.history()[0].status, HistoryStatus::Code(404));
    }

    #[tokio::test(start_paused = true)]
    async fn server_error_response_is_retried_until_success() {
        let transport = ScriptedTransport::with_script(vec![
            Ok(json_response(503, json!({"error": "busy"}))),
            Ok(json_response(200, json!({"ok": true}))),
        ]);
        let client = HttpClient::new(transport.clone());

        let result = client
            .request(RequestConfig::new(HttpMethod::Get, "https://api.example/x").with_retries(2))
            .await
            .unwrap();

        assert_eq!(result.status, 200);
        assert_eq!(transport.attempts(), 2);
        assert_eq!(client.history()[0].status, HistoryStatus::Code(200));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_server_errors_surface_the_last_status() {
        let transport = ScriptedTransport::with_script(vec![
            Ok(json_response(500, json!({}))),
            Ok(json_response(502, json!({}))),
        ]);
        let client = HttpClient::new(transport.clone());

        let err = client
            .request(RequestConfig::new(HttpMethod::Get, "https://api.example/x").with_retries(1))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RequestError::Transport(TransportError::Status { status: 502, .. })
        ));
        assert_eq!(transport.attempts(), 2);
        assert_eq!(client.history()[0].status, HistoryStatus::Error);
    }

    #[tokio::test]
    async fn auth_replaces_caller_header_of_any_case() {
        let transport = ScriptedTransport::with_script(Vec::new());
        let client = HttpClient::new(transport.clone());

        let config = RequestConfig::new(HttpMethod::Get, "https://api.example/x")
            .with_header("authorization", "Bearer stale")
            .with_auth(Auth::bearer("fresh"));
        client.request(config).await.unwrap();

        let sent = transport.last_sent();
        assert_eq!(sent.headers.len(), 1);
        assert_eq!(sent.headers.get("Authorization").unwrap(), "Bearer fresh");
    }

    #[tokio::test]
    async fn defaults_apply_when_config_is_silent() {
        let transport = Arc::new(FailingTransport {
            error: network_error(),
            attempts: AtomicUsize::new(0),
        });
        let client = HttpClient::new(transport.clone()).with_defaults(ClientDefaults {
            timeout_ms: 1_000,
            retries: 0,
            retry_delay_ms: 0,
        });

        assert!(client.get("https://api.example/x").await.is_err());
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
    }
}
