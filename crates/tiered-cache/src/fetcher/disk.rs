//! Fetcher reading bytes from an arbitrary file

use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

use super::{CancelFlag, Fetcher};
use crate::codec::{decode_blocking, CacheValue};
use crate::error::Result;

/// Loads and decodes the file at `path`; the path doubles as the cache key
pub struct DiskFetcher<T> {
    path: PathBuf,
    key: String,
    cancel: Arc<CancelFlag>,
    _value: PhantomData<fn() -> T>,
}

impl<T> DiskFetcher<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let key = path.to_string_lossy().into_owned();
        Self {
            path,
            key,
            cancel: Arc::new(CancelFlag::default()),
            _value: PhantomData,
        }
    }
}

impl<T: CacheValue> Fetcher<T> for DiskFetcher<T> {
    fn key(&self) -> &str {
        &self.key
    }

    fn fetch(&self) -> BoxFuture<'static, Result<T>> {
        let path = self.path.clone();
        let key = self.key.clone();
        let cancel = self.cancel.clone();
        async move {
            cancel
                .run(async move {
                    let data = tokio::fs::read(&path).await.map_err(|e| {
                        debug!(path = ?path, error = %e, "Failed to read file");
                        e
                    })?;
                    decode_blocking(data, key).await
                })
                .await
        }
        .boxed()
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}
