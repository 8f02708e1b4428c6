//! Single-shot, cancellable result of an asynchronous cache operation
//!
//! A [`Fetch`] starts pending and resolves at most once: it succeeds with a
//! value, fails with an optional error, or is cancelled. Listeners can be
//! attached at any time; listeners attached after resolution are invoked
//! right away with the stored outcome. Cancellation fires no listeners.

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::debug;

use crate::error::CacheError;

type SuccessCallback<T> = Box<dyn FnOnce(T) + Send>;
type FailureCallback = Box<dyn FnOnce(Option<CacheError>) + Send>;
type Canceller = Box<dyn FnOnce() + Send>;

enum Listener<T> {
    Success(SuccessCallback<T>),
    Failure(FailureCallback),
}

enum State<T> {
    Pending(Vec<Listener<T>>),
    Succeeded(T),
    Failed(Option<CacheError>),
    Cancelled,
}

/// Terminal outcome of a [`Fetch`]
#[derive(Debug, Clone)]
pub enum FetchOutcome<T> {
    Succeeded(T),
    /// `None` marks a failure that should not be surfaced to the user
    Failed(Option<CacheError>),
    Cancelled,
}

impl<T> FetchOutcome<T> {
    pub fn value(self) -> Option<T> {
        match self {
            FetchOutcome::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&CacheError> {
        match self {
            FetchOutcome::Failed(err) => err.as_ref(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchOutcome::Cancelled)
    }
}

struct Inner<T> {
    state: Mutex<State<T>>,
    canceller: Mutex<Option<Canceller>>,
    resolved: Notify,
}

/// Handle to a pending or resolved cache result
///
/// Clones share the same underlying state.
pub struct Fetch<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Clone + Send + 'static> Fetch<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Pending(Vec::new())),
                canceller: Mutex::new(None),
                resolved: Notify::new(),
            }),
        }
    }

    /// Call `callback` with the value once the fetch succeeds
    pub fn on_success<F>(self, callback: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        let callback: SuccessCallback<T> = Box::new(callback);
        let replay = {
            let mut state = self.state();
            match &mut *state {
                State::Pending(listeners) => {
                    listeners.push(Listener::Success(callback));
                    None
                }
                State::Succeeded(value) => Some((callback, value.clone())),
                State::Failed(_) | State::Cancelled => None,
            }
        };
        if let Some((callback, value)) = replay {
            callback(value);
        }
        self
    }

    /// Call `callback` with the error once the fetch fails
    pub fn on_failure<F>(self, callback: F) -> Self
    where
        F: FnOnce(Option<CacheError>) + Send + 'static,
    {
        let callback: FailureCallback = Box::new(callback);
        let replay = {
            let mut state = self.state();
            match &mut *state {
                State::Pending(listeners) => {
                    listeners.push(Listener::Failure(callback));
                    None
                }
                State::Failed(error) => Some((callback, error.clone())),
                State::Succeeded(_) | State::Cancelled => None,
            }
        };
        if let Some((callback, error)) = replay {
            callback(error);
        }
        self
    }

    /// Resolve with `value`; ignored unless the fetch is still pending
    pub fn succeed(&self, value: T) {
        let listeners = {
            let mut state = self.state();
            let listeners = match &mut *state {
                State::Pending(listeners) => mem::take(listeners),
                _ => return,
            };
            *state = State::Succeeded(value.clone());
            listeners
        };
        self.finish();

        for listener in listeners {
            if let Listener::Success(callback) = listener {
                callback(value.clone());
            }
        }
    }

    /// Resolve with a failure; ignored unless the fetch is still pending
    pub fn fail(&self, error: Option<CacheError>) {
        let listeners = {
            let mut state = self.state();
            let listeners = match &mut *state {
                State::Pending(listeners) => mem::take(listeners),
                _ => return,
            };
            *state = State::Failed(error.clone());
            listeners
        };
        self.finish();

        for listener in listeners {
            if let Listener::Failure(callback) = listener {
                callback(error.clone());
            }
        }
    }

    /// Abandon the fetch, stopping the work behind it
    ///
    /// No listener is called. Has no effect once the fetch resolved.
    pub fn cancel(&self) {
        let listeners = {
            let mut state = self.state();
            let listeners = match &mut *state {
                State::Pending(listeners) => mem::take(listeners),
                _ => return,
            };
            *state = State::Cancelled;
            listeners
        };
        drop(listeners);
        self.inner.resolved.notify_waiters();
        debug!("Fetch cancelled");

        let canceller = self.canceller().take();
        if let Some(canceller) = canceller {
            canceller();
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.state(), State::Pending(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.state(), State::Cancelled)
    }

    /// Outcome if the fetch already resolved
    pub fn try_outcome(&self) -> Option<FetchOutcome<T>> {
        match &*self.state() {
            State::Pending(_) => None,
            State::Succeeded(value) => Some(FetchOutcome::Succeeded(value.clone())),
            State::Failed(error) => Some(FetchOutcome::Failed(error.clone())),
            State::Cancelled => Some(FetchOutcome::Cancelled),
        }
    }

    /// Wait for the fetch to resolve
    pub async fn outcome(&self) -> FetchOutcome<T> {
        loop {
            let resolved = self.inner.resolved.notified();
            if let Some(outcome) = self.try_outcome() {
                return outcome;
            }
            resolved.await;
        }
    }

    /// Run `canceller` when this fetch gets cancelled
    pub(crate) fn set_canceller<F>(&self, canceller: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = self.canceller();
        if !self.is_pending() {
            drop(slot);
            if self.is_cancelled() {
                canceller();
            }
            return;
        }
        *slot = Some(Box::new(canceller));
    }

    fn finish(&self) {
        self.inner.resolved.notify_waiters();
        // Nothing left to cancel
        drop(self.canceller().take());
    }

    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn canceller(&self) -> MutexGuard<'_, Option<Canceller>> {
        self.inner
            .canceller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Send + 'static> Default for Fetch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Fetch<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Fetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.state.try_lock().as_deref() {
            Ok(State::Pending(_)) => "pending",
            Ok(State::Succeeded(_)) => "succeeded",
            Ok(State::Failed(_)) => "failed",
            Ok(State::Cancelled) => "cancelled",
            Err(_) => "locked",
        };
        f.debug_struct("Fetch").field("state", &state).finish()
    }
}
