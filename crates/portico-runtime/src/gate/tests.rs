//! Unit tests for the readiness gate

use super::*;
use portico_core::error::ErrorKind;

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio_test::{assert_pending, assert_ready, task};

/// Port that publishes a value once a deadline passes, counting probes
struct DelayedPort {
    available_at: Option<Instant>,
    reads: AtomicUsize,
}

impl DelayedPort {
    fn after(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            available_at: Some(Instant::now() + delay),
            reads: AtomicUsize::new(0),
        })
    }

    fn never() -> Arc<Self> {
        Arc::new(Self {
            available_at: None,
            reads: AtomicUsize::new(0),
        })
    }

    fn port(self: &Arc<Self>) -> Arc<dyn DiscoveryPort<&'static str>> {
        Arc::clone(self) as Arc<dyn DiscoveryPort<&'static str>>
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl DiscoveryPort<&'static str> for DelayedPort {
    fn try_read(&self) -> Option<&'static str> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.available_at {
            Some(at) if Instant::now() >= at => Some("services"),
            _ => None,
        }
    }
}

fn options(max_wait_ms: u64, poll_ms: u64) -> WaitOptions {
    WaitOptions::new(Duration::from_millis(max_wait_ms), Duration::from_millis(poll_ms))
}

#[tokio::test(start_paused = true)]
async fn test_wait_resolves_once_published() {
    let port = DelayedPort::after(Duration::from_millis(250));
    let gate = ReadinessGate::new("shared services", port.port(), options(1000, 100));

    assert_eq!(gate.wait().await.unwrap(), "services");
    // Probes at 0, 100, 200 and 300ms
    assert_eq!(port.reads(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_waits_share_one_poll_loop() {
    let port = DelayedPort::after(Duration::from_millis(250));
    let gate = Arc::new(ReadinessGate::new("shared services", port.port(), options(1000, 100)));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let gate = Arc::clone(&gate);
        handles.push(tokio::spawn(async move { gate.wait().await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "services");
    }

    assert_eq!(port.reads(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_found_value_is_memoized() {
    let port = DelayedPort::after(Duration::ZERO);
    let gate = ReadinessGate::new("shared services", port.port(), options(1000, 100));

    gate.wait().await.unwrap();
    gate.wait().await.unwrap();
    gate.wait().await.unwrap();

    assert_eq!(port.reads(), 1);
    assert_eq!(gate.cached(), Some("services"));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_boundary_and_fresh_retry() {
    let port = DelayedPort::never();
    let gate = ReadinessGate::new("shared HTTP service", port.port(), options(500, 100));

    let started = Instant::now();
    let err = gate.wait().await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(500), "failed too early: {:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(600), "failed too late: {:?}", elapsed);
    assert_eq!(err.kind(), ErrorKind::ReadinessTimeout);
    match &err {
        PorticoError::ReadinessTimeout { awaited, waited } => {
            assert_eq!(awaited, "shared HTTP service");
            assert_eq!(*waited, Duration::from_millis(500));
        }
        other => panic!("Expected ReadinessTimeout, got {:?}", other),
    }
    assert_eq!(port.reads(), 5);

    // The failure was not cached: a second call polls again
    assert!(gate.wait().await.is_err());
    assert_eq!(port.reads(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_reset_forces_repoll() {
    let slot = Arc::new(PublicationSlot::new());
    slot.publish(1u32);
    let port: Arc<dyn DiscoveryPort<u32>> = slot.clone();
    let gate = ReadinessGate::new("bundle", port, options(1000, 100));

    assert_eq!(gate.wait().await.unwrap(), 1);

    slot.publish(2);
    assert_eq!(gate.wait().await.unwrap(), 1);

    gate.reset();
    assert_eq!(gate.cached(), None);
    assert_eq!(gate.wait().await.unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slot_published_during_wait() {
    let slot = Arc::new(PublicationSlot::<String>::new());
    let port: Arc<dyn DiscoveryPort<String>> = slot.clone();
    let gate = Arc::new(ReadinessGate::new("bundle", port, options(2000, 100)));

    let waiter = {
        let gate = Arc::clone(&gate);
        tokio::spawn(async move { gate.wait().await })
    };

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert!(!gate.is_available());
    slot.publish("ready".to_string());
    assert!(gate.is_available());

    assert_eq!(waiter.await.unwrap().unwrap(), "ready");
}

#[tokio::test(start_paused = true)]
async fn test_wait_is_pending_until_published() {
    let slot = Arc::new(PublicationSlot::<u8>::new());
    let port: Arc<dyn DiscoveryPort<u8>> = slot.clone();
    let gate = ReadinessGate::new("bundle", port, options(1000, 100));

    let mut waiting = task::spawn(gate.wait());
    assert_pending!(waiting.poll());

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_pending!(waiting.poll());

    slot.publish(7);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(waiting.is_woken());
    assert_eq!(assert_ready!(waiting.poll()).unwrap(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_wait_keeps_polling() {
    let slot = Arc::new(PublicationSlot::<&'static str>::new());
    let port: Arc<dyn DiscoveryPort<&'static str>> = slot.clone();
    let gate = ReadinessGate::new("shared services", port, options(500, 100));

    let abandoned = tokio::time::timeout(Duration::from_millis(150), gate.wait()).await;
    assert!(abandoned.is_err());

    slot.publish("services");
    tokio::time::sleep(Duration::from_millis(2000)).await;

    // The poll loop ran on without a waiter and found the value
    assert_eq!(gate.cached(), Some("services"));
    assert_eq!(gate.wait().await.unwrap(), "services");
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_wait_times_out_on_its_own() {
    let port = DelayedPort::never();
    let gate = ReadinessGate::new("shared services", port.port(), options(500, 100));

    let abandoned = tokio::time::timeout(Duration::from_millis(150), gate.wait()).await;
    assert!(abandoned.is_err());
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(port.reads(), 5);

    // The finished timeout is not cached; the next call polls from scratch
    assert!(gate.wait().await.is_err());
    assert_eq!(port.reads(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_tuning_applies_to_next_wait() {
    let port = DelayedPort::never();
    let gate = ReadinessGate::new("tuned", port.port(), options(10_000, 100));

    gate.set_max_wait(Duration::from_millis(300));
    gate.set_poll_interval(Duration::from_millis(150));
    assert_eq!(gate.options(), options(300, 150));

    assert!(gate.wait().await.is_err());
    // Probes at 0 and 150ms; at 300ms the bound is reached
    assert_eq!(port.reads(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_with_closure() {
    let calls = AtomicUsize::new(0);
    let value = wait_for(
        || (calls.fetch_add(1, Ordering::SeqCst) >= 2).then_some(42),
        options(1000, 10),
        "answer",
    )
    .await
    .unwrap();

    assert_eq!(value, 42);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_port_fn_and_slot_retract() {
    let slot = Arc::new(PublicationSlot::new());
    let reader = {
        let slot = Arc::clone(&slot);
        port_fn(move || slot.read().map(|v: u8| v * 2))
    };

    assert_eq!(reader.try_read(), None);
    slot.publish(21);
    assert_eq!(reader.try_read(), Some(42));
    assert_eq!(slot.retract(), Some(21));
    assert!(!slot.is_published());
}
