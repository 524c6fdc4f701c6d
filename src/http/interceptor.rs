//! Request and response interceptors.
//!
//! Interceptors run one after another in registration order. Each may await
//! (for example to refresh a credential) before the next one starts. Plain
//! async closures implement both traits.

use std::future::Future;

use async_trait::async_trait;

use super::error::RequestError;
use super::request::{Headers, RequestConfig};
use super::response::RequestResult;

#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn on_request(&self, config: RequestConfig) -> Result<RequestConfig, RequestError>;
}

#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    /// `config` is the configuration the request was sent with.
    async fn on_response(
        &self,
        result: RequestResult,
        config: &RequestConfig,
    ) -> Result<RequestResult, RequestError>;
}

#[async_trait]
impl<F, Fut> RequestInterceptor for F
where
    F: Fn(RequestConfig) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<RequestConfig, RequestError>> + Send + 'static,
{
    async fn on_request(&self, config: RequestConfig) -> Result<RequestConfig, RequestError> {
        (self)(config).await
    }
}

#[async_trait]
impl<F, Fut> ResponseInterceptor for F
where
    F: Fn(RequestResult, RequestConfig) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<RequestResult, RequestError>> + Send + 'static,
{
    async fn on_response(
        &self,
        result: RequestResult,
        config: &RequestConfig,
    ) -> Result<RequestResult, RequestError> {
        (self)(result, config.clone()).await
    }
}

/// Adds headers the request does not already carry, compared
/// case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct DefaultHeaders(pub Headers);

#[async_trait]
impl RequestInterceptor for DefaultHeaders {
    async fn on_request(&self, mut config: RequestConfig) -> Result<RequestConfig, RequestError> {
        for (name, value) in &self.0 {
            if !config.has_header(name) {
                config.headers.insert(name.clone(), value.clone());
            }
        }
        Ok(config)
    }
}

/// Logs every outgoing request at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRequests;

#[async_trait]
impl RequestInterceptor for LogRequests {
    async fn on_request(&self, config: RequestConfig) -> Result<RequestConfig, RequestError> {
        tracing::debug!(method = %config.method, url = %config.url, "making request");
        Ok(config)
    }
}

/// Logs every received response at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogResponses;

#[async_trait]
impl ResponseInterceptor for LogResponses {
    async fn on_response(
        &self,
        result: RequestResult,
        config: &RequestConfig,
    ) -> Result<RequestResult, RequestError> {
        tracing::debug!(
            status = result.status,
            url = %config.url,
            response_time_ms = result.response_time,
            "response received"
        );
        Ok(result)
    }
}
