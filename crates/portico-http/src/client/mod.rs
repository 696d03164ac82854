//! Resilient HTTP client: caching, retry, auth injection and response
//! normalization layered over a `Transport`

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, error, warn};

use portico_core::error::PorticoError;
use crate::api::{HttpMethod, HttpResponse, RequestBody, RequestOptions, ResponseBody, UploadPayload};
use crate::cache::{cache_key, CacheStats, RequestCache};
use crate::config::{ClientConfig, ClientOverrides};
use crate::transport::{RawRequest, RawResponse, ReqwestTransport, Transport, TransportFailure};
use crate::HttpResult;

/// Details of a retry about to happen
#[derive(Debug)]
pub struct RetryEvent<'a> {
    /// 1 for the first retry
    pub attempt: u32,
    /// Configured retry budget
    pub limit: u32,
    pub method: HttpMethod,
    pub url: &'a str,
    pub failure: &'a TransportFailure,
    /// Backoff before the next attempt
    pub delay: Duration,
}

/// Observer notified before every retry
pub trait RetryObserver: Send + Sync {
    fn on_retry(&self, event: &RetryEvent<'_>);
}

impl<F> RetryObserver for F
where
    F: Fn(&RetryEvent<'_>) + Send + Sync,
{
    fn on_retry(&self, event: &RetryEvent<'_>) {
        self(event)
    }
}

/// HTTP client with response caching, retry and bearer auth
pub struct ResilientHttpClient {
    /// Fixed at construction
    config: ClientConfig,
    /// Current bearer token; the only mutable setting
    token: RwLock<Option<String>>,
    cache: RequestCache,
    transport: Arc<dyn Transport>,
    observer: Option<Arc<dyn RetryObserver>>,
}

impl ResilientHttpClient {
    /// Create a client backed by a pooled reqwest transport
    pub fn new(config: ClientConfig) -> HttpResult<Self> {
        config.validate()?;
        Ok(Self::with_transport(config, Arc::new(ReqwestTransport::new()?)))
    }

    /// Create a client over an explicit transport
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            token: RwLock::new(config.token.clone()),
            cache: RequestCache::new(config.cache_timeout),
            config,
            transport,
            observer: None,
        }
    }

    /// Attach a retry observer
    pub fn with_retry_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Issue a request through the cache, retry and normalization pipeline
    pub async fn request(&self, url: &str, options: RequestOptions) -> HttpResult<HttpResponse> {
        let method = options.effective_method();

        let cache_key = (options.use_cache && method.is_cacheable())
            .then(|| cache_key(method, url, &options.query, &options.body));
        if let Some(key) = &cache_key {
            if let Some(cached) = self.cache.get(key) {
                debug!(%method, url, "Serving response from cache");
                return Ok(cached);
            }
        }

        let request = RawRequest {
            method,
            url: resolve_url(self.config.base_url.as_deref(), url, &options.query),
            headers: self.build_headers(&options),
            timeout: options.timeout.unwrap_or(self.config.timeout),
            body: options.body,
        };
        let timeout = request.timeout;
        let resolved_url = request.url.clone();

        debug!(%method, url = %resolved_url, "HTTP request");
        let raw = match self.send_with_retry(request).await {
            Ok(raw) => raw,
            Err(failure) => {
                error!(%method, url = %resolved_url, error = %failure, "HTTP request failed");
                return Err(translate_failure(failure, method, &resolved_url, timeout));
            },
        };

        let response = normalize_response(raw)?;
        debug!(%method, url = %resolved_url, status = response.status, "HTTP response");

        if let Some(key) = cache_key {
            debug!(key = %key, "Caching response");
            self.cache.set(key, response.clone());
        }

        Ok(response)
    }

    /// Execute the transport call with exponential backoff retry logic
    async fn send_with_retry(&self, request: RawRequest) -> Result<RawResponse, TransportFailure> {
        let limit = self.config.retry;
        let mut delay = self.config.backoff.initial_delay;
        let mut attempt = 0;

        loop {
            match self.transport.send(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(failure) => {
                    if attempt >= limit || !self.config.retry_policy.should_retry(&failure) {
                        return Err(failure);
                    }
                    attempt += 1;

                    warn!(
                        attempt,
                        limit,
                        method = %request.method,
                        url = %request.url,
                        error = %failure,
                        "Retrying request"
                    );
                    if let Some(observer) = &self.observer {
                        observer.on_retry(&RetryEvent {
                            attempt,
                            limit,
                            method: request.method,
                            url: &request.url,
                            failure: &failure,
                            delay,
                        });
                    }

                    tokio::time::sleep(delay).await;
                    delay = self.config.backoff.next_delay(delay);
                },
            }
        }
    }

    /// Defaults, then bearer token, then per-call headers
    fn build_headers(&self, options: &RequestOptions) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        for (name, value) in &self.config.headers {
            set_header(&mut headers, name, value);
        }
        if let Some(token) = self.token.read().as_deref() {
            set_header(&mut headers, "Authorization", &format!("Bearer {}", token));
        }
        for (name, value) in &options.headers {
            set_header(&mut headers, name, value);
        }
        if matches!(options.body, RequestBody::Multipart(_)) {
            // The transport supplies the multipart boundary
            headers.retain(|name, _| !name.eq_ignore_ascii_case("content-type"));
        }
        headers
    }

    /// GET request
    pub async fn get(&self, url: &str, options: RequestOptions) -> HttpResult<HttpResponse> {
        self.request(url, options.method(HttpMethod::Get)).await
    }

    /// POST request
    pub async fn post(
        &self,
        url: &str,
        body: impl Into<RequestBody>,
        options: RequestOptions,
    ) -> HttpResult<HttpResponse> {
        self.request(url, options.method(HttpMethod::Post).body(body)).await
    }

    /// PUT request
    pub async fn put(
        &self,
        url: &str,
        body: impl Into<RequestBody>,
        options: RequestOptions,
    ) -> HttpResult<HttpResponse> {
        self.request(url, options.method(HttpMethod::Put).body(body)).await
    }

    /// PATCH request
    pub async fn patch(
        &self,
        url: &str,
        body: impl Into<RequestBody>,
        options: RequestOptions,
    ) -> HttpResult<HttpResponse> {
        self.request(url, options.method(HttpMethod::Patch).body(body)).await
    }

    /// DELETE request
    pub async fn delete(&self, url: &str, options: RequestOptions) -> HttpResult<HttpResponse> {
        self.request(url, options.method(HttpMethod::Delete)).await
    }

    /// HEAD request
    pub async fn head(&self, url: &str, options: RequestOptions) -> HttpResult<HttpResponse> {
        self.request(url, options.method(HttpMethod::Head)).await
    }

    /// Upload a file or a set of form fields as a multipart POST
    pub async fn upload(
        &self,
        url: &str,
        payload: UploadPayload,
        options: RequestOptions,
    ) -> HttpResult<HttpResponse> {
        let options = options
            .method(HttpMethod::Post)
            .body(RequestBody::Multipart(payload.into_parts()));
        self.request(url, options).await
    }

    pub fn set_auth_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    pub fn clear_auth_token(&self) {
        *self.token.write() = None;
    }

    /// Bearer token currently attached to requests
    pub fn auth_token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        debug!("HTTP client cache cleared");
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// New client with `overrides` merged over this client's config.
    ///
    /// The new client shares the transport and retry observer, starts with
    /// an empty cache and inherits the current auth token unless overridden.
    pub fn extend(&self, overrides: &ClientOverrides) -> Self {
        let mut config = self.config.merged(overrides);
        if overrides.token.is_none() {
            config.token = self.auth_token();
        }

        let mut client = Self::with_transport(config, Arc::clone(&self.transport));
        client.observer = self.observer.clone();
        client
    }
}

impl fmt::Debug for ResilientHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientHttpClient")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .field("retry", &self.config.retry)
            .field("cached_entries", &self.cache.len())
            .finish()
    }
}

/// Insert a header, replacing any existing one with the same name
/// regardless of case
fn set_header(headers: &mut BTreeMap<String, String>, name: &str, value: &str) {
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), value.to_string());
}

/// Apply the base URL to relative paths and append query parameters
fn resolve_url(base_url: Option<&str>, url: &str, query: &BTreeMap<String, String>) -> String {
    let mut resolved = match base_url {
        Some(base) if !base.is_empty() && url::Url::parse(url).is_err() => {
            if url.is_empty() {
                base.to_string()
            } else {
                format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
            }
        },
        _ => url.to_string(),
    };

    if !query.is_empty() {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(query.iter())
            .finish();
        resolved.push(if resolved.contains('?') { '&' } else { '?' });
        resolved.push_str(&encoded);
    }

    resolved
}

fn translate_failure(
    failure: TransportFailure,
    method: HttpMethod,
    url: &str,
    timeout: Duration,
) -> PorticoError {
    match failure {
        TransportFailure::Status { status, status_text, .. } => {
            PorticoError::http_status(status, status_text)
        },
        TransportFailure::Timeout => PorticoError::RequestTimeout {
            method: method.to_string(),
            url: url.to_string(),
            timeout,
        },
        TransportFailure::Network { message, source } => PorticoError::Transport {
            message: format!("{} {}: {}", method, url, message),
            source,
        },
    }
}

/// Decode the body by declared content type
fn normalize_response(raw: RawResponse) -> HttpResult<HttpResponse> {
    let content_type = raw.content_type().map(str::to_ascii_lowercase);

    let data = match content_type.as_deref() {
        Some(ct) if ct.contains("application/json") || ct.contains("+json") => {
            if raw.body.iter().all(u8::is_ascii_whitespace) {
                ResponseBody::Json(serde_json::Value::Null)
            } else {
                ResponseBody::Json(serde_json::from_slice(&raw.body).map_err(|e| PorticoError::Decode {
                    message: format!("Invalid JSON body: {}", e),
                })?)
            }
        },
        Some(ct) if ct.contains("text/") => {
            ResponseBody::Text(String::from_utf8_lossy(&raw.body).into_owned())
        },
        _ => ResponseBody::Bytes(raw.body),
    };

    let headers = raw
        .headers
        .into_iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect();

    Ok(HttpResponse {
        data,
        ok: (200..300).contains(&raw.status),
        status: raw.status,
        status_text: raw.status_text,
        headers,
    })
}

#[cfg(test)]
mod tests;
