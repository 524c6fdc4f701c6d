use thiserror::Error;

/// Failure reported by a [`Transport`](super::transport::Transport).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connection, DNS or I/O failure.
    #[error("network error: {0}")]
    Network(String),
    /// The request could not be built or sent as specified.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("request aborted")]
    Aborted,
    /// The exchange completed with a failure status. The client raises this for 5xx.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(_) => true,
            TransportError::InvalidRequest(_) | TransportError::Aborted => false,
            TransportError::Status { status, .. } => *status >= 500,
        }
    }
}

/// Terminal failure of [`HttpClient::request`](super::client::HttpClient::request).
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("Invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Invalid header `{0}`")]
    InvalidHeader(String),
    #[error("Failed to serialize request body: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Interceptor failed: {0}")]
    Interceptor(String),
    #[error("Request failed: {0}")]
    Transport(#[from] TransportError),
    #[error("Failed to decode response body: {0}")]
    Decode(String),
}

impl RequestError {
    /// Whether another attempt might succeed. Timeouts are handled separately
    /// by the client and are always terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            RequestError::Transport(err) => err.is_retryable(),
            RequestError::Decode(_) => true,
            RequestError::Timeout { .. }
            | RequestError::InvalidUrl { .. }
            | RequestError::InvalidHeader(_)
            | RequestError::Serialize(_)
            | RequestError::Interceptor(_) => false,
        }
    }
}
