//! Raw transport primitive and its reqwest-backed implementation
//!
//! The client never talks to the network directly: it hands a `RawRequest`
//! to a `Transport` and gets back either a `RawResponse` or one of three
//! distinguishable `TransportFailure`s.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use thiserror::Error;

use portico_core::error::{PorticoError, SharedSource};
use crate::api::{FormValue, HttpMethod, RequestBody};
use crate::HttpResult;

/// A fully resolved request ready to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct RawRequest {
    pub method: HttpMethod,
    /// Absolute or host-relative URL with query string applied
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: RequestBody,
    /// Bound on this single attempt
    pub timeout: Duration,
}

/// Successful response as seen by the transport
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Declared content type, if any
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }
}

/// Transport-level failure categories
#[derive(Error, Debug, Clone)]
pub enum TransportFailure {
    /// The server answered with a non-success status
    #[error("server responded with {status} {status_text}")]
    Status {
        status: u16,
        status_text: String,
        headers: Vec<(String, String)>,
    },

    /// The attempt exceeded its timeout
    #[error("request timed out")]
    Timeout,

    /// Anything else: DNS, connection, TLS, body read
    #[error("{message}")]
    Network {
        message: String,
        #[source]
        source: Option<SharedSource>,
    },
}

impl TransportFailure {
    pub fn status(status: u16, status_text: impl Into<String>) -> Self {
        Self::Status {
            status,
            status_text: status_text.into(),
            headers: Vec::new(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }
}

/// The raw request primitive the client is layered over
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: RawRequest) -> Result<RawResponse, TransportFailure>;
}

/// `Transport` implementation backed by a pooled reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    /// Underlying HTTP client with connection pooling
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with connection pooling and compression
    pub fn new() -> HttpResult<Self> {
        let client = ClientBuilder::new()
            // Connection pooling configuration
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .gzip(true)
            .user_agent(concat!("portico/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PorticoError::transport(format!("Failed to create HTTP client: {}", e), e))?;

        Ok(Self { client })
    }

    /// Wrap an existing reqwest client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn build_form(parts: Vec<(String, FormValue)>) -> Result<reqwest::multipart::Form, TransportFailure> {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in parts {
            form = match value {
                FormValue::Text(text) => form.text(name, text),
                FormValue::File(file) => {
                    let mut part = reqwest::multipart::Part::bytes(file.bytes).file_name(file.file_name);
                    if let Some(content_type) = &file.content_type {
                        part = part.mime_str(content_type).map_err(|e| network_failure("Invalid file content type", e))?;
                    }
                    form.part(name, part)
                },
            };
        }
        Ok(form)
    }
}

fn network_failure(context: &str, error: reqwest::Error) -> TransportFailure {
    if error.is_timeout() {
        return TransportFailure::Timeout;
    }
    TransportFailure::Network {
        message: format!("{}: {}", context, error),
        source: Some(Arc::new(error)),
    }
}

fn collect_headers(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned())
        })
        .collect()
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: RawRequest) -> Result<RawResponse, TransportFailure> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        };

        let mut builder = self.client.request(method, &request.url).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Text(text) => builder.body(text),
            RequestBody::Multipart(parts) => builder.multipart(Self::build_form(parts)?),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| network_failure("Failed to send request", e))?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let headers = collect_headers(response.headers());

        if !status.is_success() {
            return Err(TransportFailure::Status {
                status: status.as_u16(),
                status_text,
                headers,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| network_failure("Failed to read response body", e))?
            .to_vec();

        Ok(RawResponse {
            status: status.as_u16(),
            status_text,
            headers,
            body,
        })
    }
}
