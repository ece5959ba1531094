use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::error::PayloadError;

type SharedLoad<T> = Shared<BoxFuture<'static, Result<Arc<T>, PayloadError>>>;

/// Observable state of a lazily loaded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Loaded,
    /// The last attempt failed; the next `ensure_loaded` retries.
    Failed(PayloadError),
}

enum Slot<T> {
    NotLoaded,
    Loading(SharedLoad<T>),
    Loaded(Arc<T>),
    Failed(PayloadError),
}

/// A payload fetched at most once and kept for the life of its record.
///
/// Concurrent callers of [`LazyPayload::ensure_loaded`] share one in-flight
/// future, so a payload is never fetched twice while a fetch is pending or
/// after it has succeeded. The lock is never held across an await point.
pub struct LazyPayload<T> {
    slot: Mutex<Slot<T>>,
}

impl<T> Default for LazyPayload<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(Slot::NotLoaded),
        }
    }
}

impl<T> std::fmt::Debug for LazyPayload<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyPayload")
            .field("state", &self.state())
            .finish()
    }
}

impl<T> LazyPayload<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> LoadState {
        match &*self.lock() {
            Slot::NotLoaded => LoadState::NotLoaded,
            Slot::Loading(_) => LoadState::Loading,
            Slot::Loaded(_) => LoadState::Loaded,
            Slot::Failed(err) => LoadState::Failed(err.clone()),
        }
    }

    /// The payload, if a load has completed successfully.
    pub fn get(&self) -> Option<Arc<T>> {
        match &*self.lock() {
            Slot::Loaded(value) => Some(Arc::clone(value)),
            _ => None,
        }
    }
}

impl<T: Send + Sync + 'static> LazyPayload<T> {
    /// Return the cached payload, join a load already in flight, or start
    /// one with `start`.
    ///
    /// `start` is only invoked when the slot is `NotLoaded` or `Failed`.
    pub async fn ensure_loaded<F, Fut>(&self, start: F) -> Result<Arc<T>, PayloadError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PayloadError>> + Send + 'static,
    {
        let load = {
            let mut slot = self.lock();
            match &*slot {
                Slot::Loaded(value) => return Ok(Arc::clone(value)),
                Slot::Loading(load) => load.clone(),
                Slot::NotLoaded | Slot::Failed(_) => {
                    let load = start().map(|result| result.map(Arc::new)).boxed().shared();
                    *slot = Slot::Loading(load.clone());
                    load
                }
            }
        };

        let outcome = load.clone().await;

        // The first waiter to finish records the outcome for this attempt.
        let mut slot = self.lock();
        if let Slot::Loading(current) = &*slot {
            if current.ptr_eq(&load) {
                *slot = match &outcome {
                    Ok(value) => Slot::Loaded(Arc::clone(value)),
                    Err(err) => Slot::Failed(err.clone()),
                };
            }
        }
        outcome
    }
}
