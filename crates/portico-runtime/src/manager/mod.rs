//! Service manager: named shared services with one-time initialization
//!
//! Services are registered as deferred factories and instantiated together by
//! `init()`, which any number of callers may race; they all share one run.
//! After that, services are looked up by name, broadcast a cache clear, or
//! probed for an aggregated health report.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use portico_core::error::{PorticoError, PorticoResult};
use portico_core::flight::SingleFlight;
use portico_http::ClientConfig;

use crate::http_service::HttpService;
use crate::RuntimeResult;

/// Name under which the built-in HTTP service is registered
pub const HTTP_SERVICE: &str = "http";

/// Optional health probe capability
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Probe the service; any returned details are informational
    async fn health_check(&self) -> PorticoResult<serde_json::Value>;
}

/// Optional cache capability
pub trait ClearCache: Send + Sync {
    fn clear_cache(&self);
}

/// A shared service managed by name.
///
/// Capabilities are opt-in: a service without a health probe reports
/// `unknown`, one without a cache is skipped by `clear_all_cache`.
pub trait Service: Send + Sync + 'static {
    fn health(&self) -> Option<&dyn HealthCheck> {
        None
    }

    fn cache(&self) -> Option<&dyn ClearCache> {
        None
    }

    /// Upcast for typed retrieval through `ServiceManager::get_typed`
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Deferred constructor run by `ServiceManager::init`
pub type ServiceFactory = Box<dyn Fn() -> RuntimeResult<Arc<dyn Service>> + Send + Sync>;

/// Health of a single service as reported by `health_status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceHealth {
    Healthy,
    /// The service has no health probe
    Unknown,
    Error(String),
}

impl ServiceHealth {
    pub fn is_error(&self) -> bool {
        matches!(self, ServiceHealth::Error(_))
    }
}

impl fmt::Display for ServiceHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceHealth::Healthy => write!(f, "healthy"),
            ServiceHealth::Unknown => write!(f, "unknown"),
            ServiceHealth::Error(message) => write!(f, "error: {}", message),
        }
    }
}

impl Serialize for ServiceHealth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Aggregated health of every registered service
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub initialized: bool,
    pub services: BTreeMap<String, ServiceHealth>,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    /// True when no probe reported an error
    pub fn is_healthy(&self) -> bool {
        !self.services.values().any(ServiceHealth::is_error)
    }
}

/// Builder collecting service factories before the manager is shared
#[derive(Default)]
pub struct ServiceManagerBuilder {
    factories: Vec<(String, ServiceFactory)>,
}

impl ServiceManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory to run on `init`
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> RuntimeResult<Arc<dyn Service>> + Send + Sync + 'static,
    {
        self.factories.push((name.into(), Box::new(factory)));
        self
    }

    pub fn build(self) -> ServiceManager {
        ServiceManager {
            inner: Arc::new(Inner {
                factories: self.factories,
                services: RwLock::new(BTreeMap::new()),
                initialized: AtomicBool::new(false),
            }),
            init: SingleFlight::new(),
        }
    }
}

struct Inner {
    factories: Vec<(String, ServiceFactory)>,
    services: RwLock<BTreeMap<String, Arc<dyn Service>>>,
    initialized: AtomicBool,
}

impl Inner {
    /// Run every factory, then install the results in one step
    fn run_factories(&self) -> RuntimeResult<()> {
        info!("Initializing shared services");

        let mut staged: BTreeMap<String, Arc<dyn Service>> = BTreeMap::new();
        for (name, factory) in &self.factories {
            if staged.contains_key(name) {
                return Err(PorticoError::DuplicateService { name: name.clone() });
            }
            let service = factory().map_err(|e| match e {
                e @ PorticoError::ServiceInit { .. } => e,
                e => PorticoError::ServiceInit {
                    name: name.clone(),
                    reason: e.to_string(),
                },
            })?;
            staged.insert(name.clone(), service);
        }

        let mut services = self.services.write();
        if let Some(name) = staged.keys().find(|name| services.contains_key(*name)) {
            return Err(PorticoError::DuplicateService { name: name.clone() });
        }
        services.extend(staged);
        self.initialized.store(true, Ordering::SeqCst);

        let names: Vec<&str> = services.keys().map(String::as_str).collect();
        info!(services = ?names, "Shared services initialized");
        Ok(())
    }
}

/// Registry of named shared services
pub struct ServiceManager {
    inner: Arc<Inner>,
    init: SingleFlight<()>,
}

impl ServiceManager {
    /// Manager with no factories; services may still be added with
    /// `register_service`
    pub fn new() -> Self {
        ServiceManagerBuilder::new().build()
    }

    pub fn builder() -> ServiceManagerBuilder {
        ServiceManagerBuilder::new()
    }

    /// Manager that registers the built-in HTTP service on `init`
    pub fn with_defaults(config: ClientConfig) -> Self {
        Self::builder()
            .register(HTTP_SERVICE, move || {
                let service: Arc<dyn Service> = Arc::new(HttpService::new(config.clone())?);
                Ok(service)
            })
            .build()
    }

    /// Instantiate all registered factories exactly once.
    ///
    /// Concurrent callers share one run. A failed run is not remembered, so
    /// a later call tries again.
    pub async fn init(&self) -> RuntimeResult<()> {
        if self.is_initialized() {
            return Ok(());
        }
        let inner = Arc::clone(&self.inner);
        self.init
            .get_or_try_init(move || async move { inner.run_factories() })
            .await
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// Look up a service by name
    pub fn get_service(&self, name: &str) -> RuntimeResult<Arc<dyn Service>> {
        if !self.is_initialized() {
            warn!(service = name, "Service manager not initialized yet; call init() first");
        }

        self.inner
            .services
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PorticoError::ServiceNotRegistered {
                name: name.to_string(),
            })
    }

    /// Look up a service and downcast it to its concrete type
    pub fn get_typed<S: Service>(&self, name: &str) -> RuntimeResult<Arc<S>> {
        self.get_service(name)?
            .as_any()
            .downcast::<S>()
            .map_err(|_| PorticoError::ServiceTypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<S>(),
            })
    }

    /// The built-in HTTP service
    pub fn http_service(&self) -> RuntimeResult<Arc<HttpService>> {
        self.get_typed(HTTP_SERVICE)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.inner.services.read().contains_key(name)
    }

    /// Registered names in sorted order
    pub fn service_names(&self) -> Vec<String> {
        self.inner.services.read().keys().cloned().collect()
    }

    /// Add an already constructed service
    pub fn register_service(&self, name: impl Into<String>, service: Arc<dyn Service>) -> RuntimeResult<()> {
        let name = name.into();
        let mut services = self.inner.services.write();
        if services.contains_key(&name) {
            return Err(PorticoError::DuplicateService { name });
        }
        info!(service = %name, "Service registered");
        services.insert(name, service);
        Ok(())
    }

    /// Remove a service, returning it if it was registered
    pub fn remove_service(&self, name: &str) -> Option<Arc<dyn Service>> {
        let removed = self.inner.services.write().remove(name);
        if removed.is_some() {
            info!(service = name, "Service removed");
        }
        removed
    }

    fn snapshot(&self) -> Vec<(String, Arc<dyn Service>)> {
        self.inner
            .services
            .read()
            .iter()
            .map(|(name, service)| (name.clone(), Arc::clone(service)))
            .collect()
    }

    /// Ask every service that keeps a cache to clear it
    pub fn clear_all_cache(&self) {
        info!("Clearing all service caches");
        for (name, service) in self.snapshot() {
            if let Some(cache) = service.cache() {
                cache.clear_cache();
                debug!(service = %name, "Service cache cleared");
            }
        }
    }

    /// Probe every service. One failing or panicking probe never affects
    /// the others' entries.
    pub async fn health_status(&self) -> HealthReport {
        let mut services = BTreeMap::new();

        for (name, service) in self.snapshot() {
            let health = match service.health() {
                None => ServiceHealth::Unknown,
                Some(probe) => match AssertUnwindSafe(probe.health_check()).catch_unwind().await {
                    Ok(Ok(_)) => ServiceHealth::Healthy,
                    Ok(Err(e)) => ServiceHealth::Error(e.to_string()),
                    Err(_) => ServiceHealth::Error("health check panicked".to_string()),
                },
            };
            debug!(service = %name, health = %health, "Health probe finished");
            services.insert(name, health);
        }

        HealthReport {
            initialized: self.is_initialized(),
            services,
            timestamp: Utc::now(),
        }
    }
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceManager")
            .field("initialized", &self.is_initialized())
            .field("services", &self.service_names())
            .finish()
    }
}
