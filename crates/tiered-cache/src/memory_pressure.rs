//! Low-memory signals
//!
//! A [`Cache`](crate::Cache) subscribes to a [`MemoryPressureSource`] and drops
//! its memory tiers whenever the source fires. How the platform detects low
//! memory is up to the source; [`MemoryPressureNotifier`] is a plain fan-out
//! that the host application triggers itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Callback run when memory runs low
pub type MemoryPressureCallback = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`MemoryPressureSource::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub trait MemoryPressureSource: Send + Sync {
    fn subscribe(&self, callback: MemoryPressureCallback) -> SubscriptionId;

    /// Stop calling the callback registered under `id`; unknown ids are ignored
    fn unsubscribe(&self, id: SubscriptionId);
}

/// In-process memory-pressure source
#[derive(Default)]
pub struct MemoryPressureNotifier {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriptionId, MemoryPressureCallback>>,
}

impl MemoryPressureNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every subscribed callback
    pub fn notify(&self) {
        // Callbacks may unsubscribe, so they run outside the lock
        let callbacks: Vec<_> = self.subscribers().values().cloned().collect();
        debug!(subscribers = callbacks.len(), "Memory pressure");
        for callback in callbacks {
            callback();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<SubscriptionId, MemoryPressureCallback>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryPressureSource for MemoryPressureNotifier {
    fn subscribe(&self, callback: MemoryPressureCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers().insert(id, callback);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers().remove(&id);
    }
}

impl std::fmt::Debug for MemoryPressureNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPressureNotifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
