//! Publishing and discovering the shared services bundle
//!
//! The host module owns the `ServiceManager` and, once mounted, publishes a
//! `SharedServices` bundle into a `PublicationSlot`. Consumer modules never
//! touch the host directly: a `ServiceConsumer` waits for the bundle to show
//! up in the slot and works through it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use portico_http::{ClientConfig, ResilientHttpClient};

use crate::gate::{port_fn, DiscoveryPort, PublicationSlot, ReadinessGate, WaitOptions};
use crate::http_service::HttpService;
use crate::manager::{HealthReport, Service, ServiceManager};
use crate::registry::{ClientProvider, NamedClientRegistry};
use crate::RuntimeResult;

/// Wait applied when a named client is requested before the HTTP service is
/// published: 50 probes, 100ms apart
pub const CLIENT_PROVIDER_WAIT: WaitOptions = WaitOptions {
    max_wait: Duration::from_secs(5),
    poll_interval: Duration::from_millis(100),
};

/// Handle published by the host for consumer modules
#[derive(Clone)]
pub struct SharedServices {
    manager: Arc<ServiceManager>,
    clients: Arc<NamedClientRegistry>,
}

impl SharedServices {
    pub fn service_manager(&self) -> &Arc<ServiceManager> {
        &self.manager
    }

    pub fn http_service(&self) -> RuntimeResult<Arc<HttpService>> {
        self.manager.http_service()
    }

    pub fn client_registry(&self) -> &Arc<NamedClientRegistry> {
        &self.clients
    }

    /// Create or fetch a named client through the shared HTTP service
    pub async fn create_client(&self, name: &str, config: ClientConfig) -> RuntimeResult<Arc<ResilientHttpClient>> {
        self.clients.create_client(name, config).await
    }

    pub fn get_client(&self, name: &str) -> Option<Arc<ResilientHttpClient>> {
        self.clients.get_client(name)
    }

    /// Clear every shared service's cache
    pub fn clear_cache(&self) {
        self.manager.clear_all_cache();
    }

    pub async fn health_status(&self) -> HealthReport {
        self.manager.health_status().await
    }
}

impl fmt::Debug for SharedServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedServices")
            .field("manager", &self.manager)
            .field("clients", &self.clients.client_names())
            .finish()
    }
}

/// Lifecycle of the module that owns and publishes the shared services
pub struct ServiceHost {
    manager: Arc<ServiceManager>,
    clients: Arc<NamedClientRegistry>,
    slot: Arc<PublicationSlot<SharedServices>>,
}

impl ServiceHost {
    pub fn new(manager: Arc<ServiceManager>) -> Self {
        Self::with_client_wait(manager, CLIENT_PROVIDER_WAIT)
    }

    /// Host whose manager provides the built-in HTTP service
    pub fn with_defaults(config: ClientConfig) -> Self {
        Self::new(Arc::new(ServiceManager::with_defaults(config)))
    }

    /// Host with a custom bound on waiting for the HTTP service when
    /// named clients are requested
    pub fn with_client_wait(manager: Arc<ServiceManager>, client_wait: WaitOptions) -> Self {
        let slot: Arc<PublicationSlot<SharedServices>> = Arc::new(PublicationSlot::new());

        // The bundle in the slot owns the registry, so the port only holds a
        // weak reference back to the slot
        let weak_slot = Arc::downgrade(&slot);
        let port = port_fn(move || {
            let services: SharedServices = weak_slot.upgrade()?.read()?;
            let http = services.manager.http_service().ok()?;
            Some(http as Arc<dyn ClientProvider>)
        });
        let gate = Arc::new(ReadinessGate::new("shared HTTP service", port, client_wait));

        Self {
            manager,
            clients: Arc::new(NamedClientRegistry::new(gate)),
            slot,
        }
    }

    pub async fn bootstrap(&self) -> RuntimeResult<()> {
        info!("Service host bootstrapping");
        Ok(())
    }

    /// Initialize the services once and publish the bundle
    pub async fn mount(&self) -> RuntimeResult<()> {
        info!("Service host mounting");
        self.manager.init().await?;

        let bundle = SharedServices {
            manager: Arc::clone(&self.manager),
            clients: Arc::clone(&self.clients),
        };
        if self.slot.publish(bundle).is_none() {
            info!(services = ?self.manager.service_names(), "Shared services published");
        }
        Ok(())
    }

    /// Withdraw the bundle; consumers that already hold it keep working
    pub async fn unmount(&self) -> RuntimeResult<()> {
        info!("Service host unmounting");
        if self.slot.retract().is_some() {
            info!("Shared services withdrawn");
        }
        Ok(())
    }

    pub fn is_mounted(&self) -> bool {
        self.slot.is_published()
    }

    /// The slot consumers discover the bundle through
    pub fn slot(&self) -> Arc<PublicationSlot<SharedServices>> {
        Arc::clone(&self.slot)
    }

    pub fn service_manager(&self) -> &Arc<ServiceManager> {
        &self.manager
    }

    pub fn client_registry(&self) -> &Arc<NamedClientRegistry> {
        &self.clients
    }

    /// A consumer discovering this host's bundle with default wait bounds
    pub fn consumer(&self, name: impl Into<String>) -> ServiceConsumer {
        ServiceConsumer::new(name, self.slot())
    }
}

impl fmt::Debug for ServiceHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHost")
            .field("mounted", &self.is_mounted())
            .field("manager", &self.manager)
            .finish()
    }
}

/// Consumer-side access to the shared services bundle
pub struct ServiceConsumer {
    name: String,
    gate: ReadinessGate<SharedServices>,
}

impl ServiceConsumer {
    /// Consumer waiting up to 10s, probing every 100ms
    pub fn new(name: impl Into<String>, slot: Arc<PublicationSlot<SharedServices>>) -> Self {
        Self::with_options(name, slot, WaitOptions::default())
    }

    pub fn with_options(
        name: impl Into<String>,
        slot: Arc<PublicationSlot<SharedServices>>,
        options: WaitOptions,
    ) -> Self {
        let name = name.into();
        let port: Arc<dyn DiscoveryPort<SharedServices>> = slot;
        let gate = ReadinessGate::new(format!("shared services ({})", name), port, options);
        Self { name, gate }
    }

    /// Wait for the bundle, sharing any wait already in progress
    pub async fn services(&self) -> RuntimeResult<SharedServices> {
        self.gate.wait().await
    }

    pub async fn get_service(&self, name: &str) -> RuntimeResult<Arc<dyn Service>> {
        let result = async { self.services().await?.service_manager().get_service(name) }.await;
        if let Err(e) = &result {
            error!(consumer = %self.name, service = name, error = %e, "Failed to get service");
        }
        result
    }

    /// Run `call` against the bundle once it is available
    pub async fn call_service<F, Fut, R>(&self, call: F) -> RuntimeResult<R>
    where
        F: FnOnce(SharedServices) -> Fut,
        Fut: Future<Output = RuntimeResult<R>>,
    {
        let result = match self.services().await {
            Ok(services) => call(services).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            error!(consumer = %self.name, error = %e, "Service call failed");
        }
        result
    }

    pub async fn create_client(&self, name: &str, config: ClientConfig) -> RuntimeResult<Arc<ResilientHttpClient>> {
        let name = name.to_string();
        self.call_service(|services| async move { services.create_client(&name, config).await })
            .await
    }

    pub async fn health_status(&self) -> RuntimeResult<HealthReport> {
        self.call_service(|services| async move { Ok(services.health_status().await) })
            .await
    }

    /// Clear every shared cache. Failures are logged, never returned.
    pub async fn clear_all_cache(&self) {
        let cleared = self
            .call_service(|services| async move {
                services.clear_cache();
                Ok(())
            })
            .await;
        if cleared.is_ok() {
            info!(consumer = %self.name, "All shared caches cleared");
        }
    }

    /// Whether the bundle is known or currently published
    pub fn is_available(&self) -> bool {
        self.gate.is_available()
    }

    /// Forget the discovered bundle so the next call waits again
    pub fn reset(&self) {
        info!(consumer = %self.name, "Discovered services forgotten");
        self.gate.reset();
    }

    pub fn set_max_wait(&self, max_wait: Duration) {
        self.gate.set_max_wait(max_wait);
    }

    pub fn set_poll_interval(&self, poll_interval: Duration) {
        self.gate.set_poll_interval(poll_interval);
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ServiceConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConsumer")
            .field("name", &self.name)
            .field("gate", &self.gate)
            .finish()
    }
}
