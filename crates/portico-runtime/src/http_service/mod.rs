//! The built-in `"http"` service
//!
//! Owns a default client for ad-hoc calls plus a table of named clients that
//! other modules create through the registry. All clients share one pooled
//! transport.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::json;
use tracing::{debug, info};

use portico_core::error::PorticoResult;
use portico_http::{
    ClientConfig, HttpResponse, RequestBody, RequestOptions, ReqwestTransport, ResilientHttpClient,
    Transport, UploadPayload,
};

use crate::manager::{ClearCache, HealthCheck, Service};
use crate::registry::ClientProvider;
use crate::RuntimeResult;

/// Headers the default client sends unless configured otherwise
const DEFAULT_HEADERS: [(&str, &str); 2] = [
    ("Content-Type", "application/json"),
    ("X-Requested-With", "XMLHttpRequest"),
];

/// Shared HTTP service: a default client plus named clients
pub struct HttpService {
    default_client: Arc<ResilientHttpClient>,
    clients: DashMap<String, Arc<ResilientHttpClient>>,
    transport: Arc<dyn Transport>,
}

impl HttpService {
    /// Create the service over a pooled reqwest transport
    pub fn new(config: ClientConfig) -> RuntimeResult<Self> {
        config.validate()?;
        Ok(Self::with_transport(config, Arc::new(ReqwestTransport::new()?)))
    }

    /// Create the service over an explicit transport
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let mut config = config;
        for (name, value) in DEFAULT_HEADERS {
            if !config.headers.keys().any(|existing| existing.eq_ignore_ascii_case(name)) {
                config.headers.insert(name.to_string(), value.to_string());
            }
        }

        Self {
            default_client: Arc::new(ResilientHttpClient::with_transport(config, Arc::clone(&transport))),
            clients: DashMap::new(),
            transport,
        }
    }

    /// Return the client registered as `name`, creating it from `config` if
    /// absent. An existing client is returned as is and `config` is ignored.
    pub fn create_client(&self, name: &str, config: ClientConfig) -> RuntimeResult<Arc<ResilientHttpClient>> {
        match self.clients.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                config.validate()?;
                info!(
                    client = name,
                    base_url = config.base_url.as_deref().unwrap_or(""),
                    timeout_ms = config.timeout.as_millis() as u64,
                    retry = config.retry,
                    "HTTP client created"
                );
                let client = Arc::new(ResilientHttpClient::with_transport(config, Arc::clone(&self.transport)));
                entry.insert(Arc::clone(&client));
                Ok(client)
            },
        }
    }

    pub fn get_client(&self, name: &str) -> Option<Arc<ResilientHttpClient>> {
        self.clients.get(name).map(|client| Arc::clone(client.value()))
    }

    pub fn default_client(&self) -> Arc<ResilientHttpClient> {
        Arc::clone(&self.default_client)
    }

    /// Names of the named clients, sorted
    pub fn list_clients(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Set the bearer token on the named client if it exists, else on the
    /// default client
    pub fn set_auth_token(&self, token: impl Into<String>, client: Option<&str>) {
        match client.and_then(|name| self.get_client(name)) {
            Some(named) => named.set_auth_token(token),
            None => self.default_client.set_auth_token(token),
        }
    }

    /// Clear the bearer token on the named client if it exists, else on the
    /// default client
    pub fn clear_auth_token(&self, client: Option<&str>) {
        match client.and_then(|name| self.get_client(name)) {
            Some(named) => named.clear_auth_token(),
            None => self.default_client.clear_auth_token(),
        }
    }

    /// Clear the caches of the default and every named client
    pub fn clear_all_cache(&self) {
        self.default_client.clear_cache();
        for client in self.clients.iter() {
            client.clear_cache();
        }
        info!("All HTTP client caches cleared");
    }

    /// Drop a named client and its cache. Returns whether it existed.
    pub fn destroy_client(&self, name: &str) -> bool {
        match self.clients.remove(name) {
            Some((_, client)) => {
                client.clear_cache();
                info!(client = name, "HTTP client destroyed");
                true
            },
            None => {
                debug!(client = name, "No HTTP client to destroy");
                false
            },
        }
    }

    pub async fn request(&self, url: &str, options: RequestOptions) -> RuntimeResult<HttpResponse> {
        self.default_client.request(url, options).await
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> RuntimeResult<HttpResponse> {
        self.default_client.get(url, options).await
    }

    pub async fn post(
        &self,
        url: &str,
        body: impl Into<RequestBody>,
        options: RequestOptions,
    ) -> RuntimeResult<HttpResponse> {
        self.default_client.post(url, body, options).await
    }

    pub async fn put(
        &self,
        url: &str,
        body: impl Into<RequestBody>,
        options: RequestOptions,
    ) -> RuntimeResult<HttpResponse> {
        self.default_client.put(url, body, options).await
    }

    pub async fn patch(
        &self,
        url: &str,
        body: impl Into<RequestBody>,
        options: RequestOptions,
    ) -> RuntimeResult<HttpResponse> {
        self.default_client.patch(url, body, options).await
    }

    pub async fn delete(&self, url: &str, options: RequestOptions) -> RuntimeResult<HttpResponse> {
        self.default_client.delete(url, options).await
    }

    pub async fn head(&self, url: &str, options: RequestOptions) -> RuntimeResult<HttpResponse> {
        self.default_client.head(url, options).await
    }

    pub async fn upload(
        &self,
        url: &str,
        payload: UploadPayload,
        options: RequestOptions,
    ) -> RuntimeResult<HttpResponse> {
        self.default_client.upload(url, payload, options).await
    }
}

impl std::fmt::Debug for HttpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpService")
            .field("default_client", &self.default_client)
            .field("clients", &self.list_clients())
            .finish()
    }
}

#[async_trait]
impl HealthCheck for HttpService {
    async fn health_check(&self) -> PorticoResult<serde_json::Value> {
        let config = self.default_client.config();
        Ok(json!({
            "service": "HttpService",
            "clients": self.list_clients(),
            "defaultClient": {
                "timeout": config.timeout.as_millis() as u64,
                "retry": config.retry,
                "cacheSize": self.default_client.cache_stats().total_entries,
            },
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }
}

impl ClearCache for HttpService {
    fn clear_cache(&self) {
        self.clear_all_cache();
    }
}

impl Service for HttpService {
    fn health(&self) -> Option<&dyn HealthCheck> {
        Some(self)
    }

    fn cache(&self) -> Option<&dyn ClearCache> {
        Some(self)
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }
}

impl ClientProvider for HttpService {
    fn create_client(&self, name: &str, config: ClientConfig) -> RuntimeResult<Arc<ResilientHttpClient>> {
        HttpService::create_client(self, name, config)
    }

    fn destroy_client(&self, name: &str) {
        HttpService::destroy_client(self, name);
    }
}
