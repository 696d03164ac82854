//! Readiness gate: bounded, deduplicated waiting for a published value
//!
//! A `ReadinessGate` watches one subject through a `DiscoveryPort`. The first
//! caller starts a poll loop; every caller arriving while it runs shares that
//! loop. A found value is memoized; a timeout is not, so the next call polls
//! again from scratch.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info};

use portico_core::error::PorticoError;
use portico_core::flight::SingleFlight;
use crate::RuntimeResult;

/// Read-only view of a place where a value may be published
pub trait DiscoveryPort<T>: Send + Sync {
    /// The published value, or `None` if it is not there yet
    fn try_read(&self) -> Option<T>;
}

struct FnPort<F>(F);

impl<T, F> DiscoveryPort<T> for FnPort<F>
where
    F: Fn() -> Option<T> + Send + Sync,
{
    fn try_read(&self) -> Option<T> {
        (self.0)()
    }
}

/// Build a discovery port from a closure
pub fn port_fn<T, F>(read: F) -> Arc<dyn DiscoveryPort<T>>
where
    T: 'static,
    F: Fn() -> Option<T> + Send + Sync + 'static,
{
    Arc::new(FnPort(read))
}

/// Well-known slot where a host publishes a value for consumers to discover
pub struct PublicationSlot<T> {
    value: RwLock<Option<T>>,
}

impl<T: Clone + Send + Sync> PublicationSlot<T> {
    pub fn new() -> Self {
        Self {
            value: RwLock::new(None),
        }
    }

    /// Publish a value, returning whatever was published before
    pub fn publish(&self, value: T) -> Option<T> {
        self.value.write().replace(value)
    }

    /// Withdraw the published value
    pub fn retract(&self) -> Option<T> {
        self.value.write().take()
    }

    pub fn read(&self) -> Option<T> {
        self.value.read().clone()
    }

    pub fn is_published(&self) -> bool {
        self.value.read().is_some()
    }
}

impl<T: Clone + Send + Sync> Default for PublicationSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> DiscoveryPort<T> for PublicationSlot<T> {
    fn try_read(&self) -> Option<T> {
        self.read()
    }
}

/// Bounds for a readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Give up once this much time has elapsed
    pub max_wait: Duration,
    /// Spacing between probes
    pub poll_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl WaitOptions {
    pub fn new(max_wait: Duration, poll_interval: Duration) -> Self {
        Self { max_wait, poll_interval }
    }
}

/// Poll `predicate` every `poll_interval` until it yields or `max_wait`
/// elapses. Not memoized; see `ReadinessGate` for the shared version.
pub async fn wait_for<T, F>(predicate: F, options: WaitOptions, awaited: &str) -> RuntimeResult<T>
where
    F: Fn() -> Option<T>,
{
    let start = Instant::now();
    let mut polls: u32 = 0;

    while start.elapsed() < options.max_wait {
        polls += 1;
        if let Some(value) = predicate() {
            debug!(awaited, polls, "Readiness wait satisfied");
            return Ok(value);
        }
        tokio::time::sleep(options.poll_interval).await;
    }

    Err(PorticoError::ReadinessTimeout {
        awaited: awaited.to_string(),
        waited: options.max_wait,
    })
}

/// Memoizing, deduplicating readiness wait for one subject
pub struct ReadinessGate<T> {
    /// Human description of the subject, used in logs and errors
    awaited: String,
    port: Arc<dyn DiscoveryPort<T>>,
    options: RwLock<WaitOptions>,
    flight: SingleFlight<T>,
}

impl<T> ReadinessGate<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(awaited: impl Into<String>, port: Arc<dyn DiscoveryPort<T>>, options: WaitOptions) -> Self {
        Self {
            awaited: awaited.into(),
            port,
            options: RwLock::new(options),
            flight: SingleFlight::new(),
        }
    }

    /// Wait for the subject, sharing any wait already in progress
    pub async fn wait(&self) -> RuntimeResult<T> {
        let port = Arc::clone(&self.port);
        let options = self.options();
        let awaited = self.awaited.clone();

        self.flight
            .get_or_try_init(move || async move {
                info!(awaited = %awaited, "Waiting for shared service");
                let result = wait_for(move || port.try_read(), options, &awaited).await;
                match &result {
                    Ok(_) => info!(awaited = %awaited, "Shared service ready"),
                    Err(e) => error!(awaited = %awaited, error = %e, "Shared service wait failed"),
                }
                result
            })
            .await
    }

    /// Value found by an earlier wait, without waiting
    pub fn cached(&self) -> Option<T> {
        self.flight.get()
    }

    /// Whether the subject is known or currently published
    pub fn is_available(&self) -> bool {
        self.flight.get().is_some() || self.port.try_read().is_some()
    }

    /// Forget the cached value and any in-flight wait
    pub fn reset(&self) {
        debug!(awaited = %self.awaited, "Readiness gate reset");
        self.flight.reset();
    }

    pub fn options(&self) -> WaitOptions {
        *self.options.read()
    }

    /// Applies to waits started after this call
    pub fn set_max_wait(&self, max_wait: Duration) {
        self.options.write().max_wait = max_wait;
        info!(awaited = %self.awaited, max_wait_ms = max_wait.as_millis() as u64, "Max wait updated");
    }

    /// Applies to waits started after this call
    pub fn set_poll_interval(&self, poll_interval: Duration) {
        self.options.write().poll_interval = poll_interval;
        info!(
            awaited = %self.awaited,
            poll_interval_ms = poll_interval.as_millis() as u64,
            "Poll interval updated"
        );
    }

    pub fn awaited(&self) -> &str {
        &self.awaited
    }
}

impl<T> fmt::Debug for ReadinessGate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessGate")
            .field("awaited", &self.awaited)
            .field("options", &*self.options.read())
            .field("flight", &self.flight)
            .finish()
    }
}

#[cfg(test)]
mod tests;
