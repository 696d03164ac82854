//! # portico-runtime
//!
//! Shared-service discovery and lifecycle for Portico modules.
//!
//! ## Architecture
//!
//! - `gate`: Bounded, deduplicated waits for a published value
//! - `manager`: Named service registry with one-time initialization and
//!   aggregated health reporting
//! - `http_service`: The built-in `"http"` service owning the default and
//!   named HTTP clients
//! - `registry`: Consumer-side table of named clients, created through the
//!   shared HTTP service once it is discoverable
//! - `host`: Publishing and discovering the shared services bundle

pub mod gate;
pub mod host;
pub mod http_service;
pub mod manager;
pub mod registry;

// Re-export main types
pub use gate::{port_fn, wait_for, DiscoveryPort, PublicationSlot, ReadinessGate, WaitOptions};
pub use host::{ServiceConsumer, ServiceHost, SharedServices};
pub use http_service::HttpService;
pub use manager::{
    ClearCache, HealthCheck, HealthReport, Service, ServiceFactory, ServiceHealth, ServiceManager,
    ServiceManagerBuilder,
};
pub use registry::{ClientProvider, NamedClientRegistry};

use portico_core::error::PorticoError;

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, PorticoError>;
