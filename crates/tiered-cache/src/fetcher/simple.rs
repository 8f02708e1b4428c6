//! Fetcher backed by a value producer

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use super::{CancelFlag, Fetcher};
use crate::error::{CacheError, Result};

/// Produces the value by calling a closure, only when the cache misses
pub struct SimpleFetcher<T> {
    key: String,
    producer: Arc<dyn Fn() -> T + Send + Sync>,
    cancel: Arc<CancelFlag>,
}

impl<T> SimpleFetcher<T> {
    pub fn new<F>(key: impl Into<String>, producer: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            producer: Arc::new(producer),
            cancel: Arc::new(CancelFlag::default()),
        }
    }
}

impl<T: Send + 'static> Fetcher<T> for SimpleFetcher<T> {
    fn key(&self) -> &str {
        &self.key
    }

    fn fetch(&self) -> BoxFuture<'static, Result<T>> {
        let producer = self.producer.clone();
        let cancel = self.cancel.clone();
        async move {
            if cancel.is_cancelled() {
                return Err(CacheError::Cancelled);
            }
            Ok(producer())
        }
        .boxed()
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}
