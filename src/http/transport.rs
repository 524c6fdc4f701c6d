//! The network boundary of the request engine.
//!
//! [`HttpClient`](super::client::HttpClient) only talks to a [`Transport`],
//! so tests can substitute a scripted one. [`ReqwestTransport`] is the
//! production implementation.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use url::Url;

use super::error::TransportError;
use super::method::HttpMethod;
use super::request::{FormPart, FormValue, Headers};

/// Fully resolved request handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Headers,
    pub body: OutgoingBody,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum OutgoingBody {
    #[default]
    Empty,
    Bytes(Bytes),
    /// Sent as `multipart/form-data`; the transport chooses the boundary.
    Multipart(Vec<FormPart>),
}

/// A completed HTTP exchange with the body fully read.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn content_type(&self) -> &str {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
            .unwrap_or_default()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one network exchange. Any completed exchange is `Ok`,
    /// whatever its status code; the client decides which statuses to retry.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// Reqwest-backed transport.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|err| TransportError::InvalidRequest(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let headers = build_headers(&request.headers)?;
        let mut builder = self
            .client
            .request(request.method.into(), request.url)
            .headers(headers);

        builder = match request.body {
            OutgoingBody::Empty => builder,
            OutgoingBody::Bytes(bytes) => builder.body(bytes),
            OutgoingBody::Multipart(parts) => builder.multipart(build_form(parts)?),
        };

        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or("Unknown").to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::Network(format!("Failed to read response: {err}")))?;

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text,
            headers,
            body,
        })
    }
}

fn build_headers(input: &Headers) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();

    for (key, value) in input {
        if key.is_empty() {
            continue;
        }

        let header_name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|err| TransportError::InvalidRequest(format!("Invalid header name `{key}`: {err}")))?;
        let header_value = HeaderValue::from_str(value).map_err(|err| {
            TransportError::InvalidRequest(format!("Invalid header value for `{key}`: {err}"))
        })?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}

fn build_form(parts: Vec<FormPart>) -> Result<Form, TransportError> {
    let mut form = Form::new();
    for part in parts {
        form = match part.value {
            FormValue::Text(text) => form.text(part.name, text),
            FormValue::File {
                filename,
                content_type,
                data,
            } => {
                let mut file = Part::bytes(data.to_vec()).file_name(filename);
                if let Some(content_type) = content_type {
                    file = file.mime_str(&content_type).map_err(|err| {
                        TransportError::InvalidRequest(format!("Invalid part content type `{content_type}`: {err}"))
                    })?;
                }
                form.part(part.name, file)
            }
        };
    }
    Ok(form)
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}
