//! Single-flight state slot for lazily initialized subjects
//!
//! A `SingleFlight<T>` holds one of three states: `Idle`, `Pending` (a shared
//! handle to the one operation currently running) or `Ready` (the memoized
//! value). Every caller that arrives while an operation is pending awaits the
//! same handle and observes the same result. Failures are never memoized: the
//! slot falls back to `Idle` so the next caller starts a fresh attempt.
//!
//! Operations run as Tokio tasks. A caller that stops waiting does not stop
//! the operation; it finishes on its own and settles the slot.

use std::future::Future;
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::error::{PorticoError, PorticoResult};

type SharedOperation<T> = Shared<BoxFuture<'static, PorticoResult<T>>>;

enum Slot<T> {
    Idle,
    Pending(SharedOperation<T>),
    Ready(T),
}

struct State<T> {
    slot: Slot<T>,
    /// Bumped on every new operation and on reset; a finishing operation
    /// only writes back when its generation is still current.
    generation: u64,
}

/// Memoizing slot that deduplicates concurrent initialization
pub struct SingleFlight<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an idle slot
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                slot: Slot::Idle,
                generation: 0,
            })),
        }
    }

    /// Memoized value, if an operation already succeeded
    pub fn get(&self) -> Option<T> {
        match &self.state.lock().slot {
            Slot::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Whether an operation is currently in flight
    pub fn is_pending(&self) -> bool {
        matches!(self.state.lock().slot, Slot::Pending(_))
    }

    /// Return the memoized value, join the in-flight operation, or start one.
    ///
    /// `init` is only invoked when the slot is idle. It runs under the slot's
    /// lock, so it must only build the future and never touch this slot.
    /// Must be called from within a Tokio runtime.
    pub async fn get_or_try_init<F, Fut>(&self, init: F) -> PorticoResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PorticoResult<T>> + Send + 'static,
    {
        let operation = {
            let mut state = self.state.lock();
            match &state.slot {
                Slot::Ready(value) => return Ok(value.clone()),
                Slot::Pending(operation) => operation.clone(),
                Slot::Idle => {
                    state.generation += 1;
                    let operation =
                        Self::track(Arc::downgrade(&self.state), state.generation, init());
                    state.slot = Slot::Pending(operation.clone());
                    operation
                },
            }
        };

        operation.await
    }

    /// Drop the memoized value and forget any in-flight operation.
    ///
    /// Callers already awaiting the old operation still receive its result,
    /// but that result is no longer written back into the slot.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.slot = Slot::Idle;
    }

    /// Spawn `fut` so it runs to completion even when every caller stops
    /// waiting, and hand out a shared handle to its result
    fn track<Fut>(state: Weak<Mutex<State<T>>>, generation: u64, fut: Fut) -> SharedOperation<T>
    where
        Fut: Future<Output = PorticoResult<T>> + Send + 'static,
    {
        let task = {
            let state = state.clone();
            tokio::spawn(async move {
                let result = fut.await;
                Self::settle(&state, generation, &result);
                result
            })
        };

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    let result = Err(PorticoError::Interrupted { message: e.to_string() });
                    Self::settle(&state, generation, &result);
                    result
                },
            }
        }
        .boxed()
        .shared()
    }

    fn settle(state: &Weak<Mutex<State<T>>>, generation: u64, result: &PorticoResult<T>) {
        let Some(state) = state.upgrade() else {
            return;
        };
        let mut state = state.lock();
        if state.generation == generation {
            state.slot = match result {
                Ok(value) => Slot::Ready(value.clone()),
                Err(_) => Slot::Idle,
            };
        }
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state.lock().slot {
            Slot::Idle => "idle",
            Slot::Pending(_) => "pending",
            Slot::Ready(_) => "ready",
        };
        f.debug_struct("SingleFlight").field("state", &state).finish()
    }
}
