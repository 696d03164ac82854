//! Named HTTP clients created through a discoverable provider
//!
//! A consumer module cannot construct clients until the host has published
//! its HTTP service. `NamedClientRegistry` waits for that provider through a
//! readiness gate and deduplicates creation per name: every concurrent
//! `create_client` for an unresolved name shares one creation and receives
//! the same instance.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use portico_core::flight::SingleFlight;
use portico_http::{ClientConfig, ResilientHttpClient};

use crate::gate::ReadinessGate;
use crate::RuntimeResult;

/// Something that can create and forget named clients
pub trait ClientProvider: Send + Sync {
    /// Create the named client, or return the existing one
    fn create_client(&self, name: &str, config: ClientConfig) -> RuntimeResult<Arc<ResilientHttpClient>>;

    fn destroy_client(&self, name: &str);
}

type ClientSlot = Arc<SingleFlight<Arc<ResilientHttpClient>>>;

/// Consumer-side table of named clients
pub struct NamedClientRegistry {
    gate: Arc<ReadinessGate<Arc<dyn ClientProvider>>>,
    clients: DashMap<String, ClientSlot>,
}

impl NamedClientRegistry {
    pub fn new(gate: Arc<ReadinessGate<Arc<dyn ClientProvider>>>) -> Self {
        Self {
            gate,
            clients: DashMap::new(),
        }
    }

    /// Return the client for `name`, creating it on first use.
    ///
    /// Only the first resolved `config` counts; later configs for the same
    /// name are ignored. If the provider never becomes available the name
    /// stays unregistered and a later call may try again.
    pub async fn create_client(&self, name: &str, config: ClientConfig) -> RuntimeResult<Arc<ResilientHttpClient>> {
        let slot = Arc::clone(self.clients.entry(name.to_string()).or_default().value());

        if let Some(client) = slot.get() {
            return Ok(client);
        }

        let gate = Arc::clone(&self.gate);
        let client_name = name.to_string();
        let result = slot
            .get_or_try_init(move || async move {
                let provider = gate.wait().await?;
                let client = provider.create_client(&client_name, config)?;
                info!(client = %client_name, "Named HTTP client ready");
                Ok(client)
            })
            .await;

        if result.is_err() {
            // Forget the name unless another caller already started over
            self.clients.remove_if(name, |_, current| {
                Arc::ptr_eq(current, &slot) && current.get().is_none() && !current.is_pending()
            });
        }

        result
    }

    /// The resolved client for `name`, without waiting
    pub fn get_client(&self, name: &str) -> Option<Arc<ResilientHttpClient>> {
        self.clients.get(name).and_then(|slot| slot.get())
    }

    /// Drop `name` so the next `create_client` builds a fresh instance
    pub fn destroy_client(&self, name: &str) {
        let Some((_, slot)) = self.clients.remove(name) else {
            debug!(client = name, "No named client to destroy");
            return;
        };

        if let Some(client) = slot.get() {
            client.clear_cache();
        }
        slot.reset();

        if let Some(provider) = self.gate.cached() {
            provider.destroy_client(name);
        }
        info!(client = name, "Named HTTP client destroyed");
    }

    /// Clear every resolved client's cache and empty the table
    pub fn clear(&self) {
        for entry in self.clients.iter() {
            if let Some(client) = entry.value().get() {
                client.clear_cache();
            }
        }
        self.clients.clear();
        info!("Named HTTP client registry cleared");
    }

    /// Names with a resolved client, sorted
    pub fn client_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .clients
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn gate(&self) -> &ReadinessGate<Arc<dyn ClientProvider>> {
        &self.gate
    }
}

impl std::fmt::Debug for NamedClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedClientRegistry")
            .field("gate", &self.gate)
            .field("clients", &self.client_names())
            .finish()
    }
}
