//! Two-tier cache orchestration
//!
//! A [`Cache`] holds, per [`Format`], an in-memory tier and a [`DiskCache`].
//! Lookups try memory first, then disk, and [`Cache::fetch_with`] falls back
//! to a [`Fetcher`] when both miss. Every operation returns a [`Fetch`]
//! immediately; the work runs on the tokio runtime the cache was created on
//! and on each format's disk queue.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use file_blob_cache::path::filename_for_key;
use file_blob_cache::{CacheStats, DiskCache};
use futures::future::join_all;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::codec::{decode_blocking, CacheValue};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::fetch::Fetch;
use crate::fetcher::{DiskFetcher, Fetcher, NetworkFetcher, SimpleFetcher};
use crate::format::{Format, ORIGINAL_FORMAT};
use crate::memory_pressure::{MemoryPressureSource, SubscriptionId};

type MemoryTier<T> = moka::sync::Cache<String, T>;

/// Both tiers of one format
struct FormatCache<T> {
    format: Format<T>,
    memory: MemoryTier<T>,
    /// Shared with any earlier registration of the same name
    disk: Arc<DiskCache>,
}

impl<T: CacheValue> FormatCache<T> {
    /// Put `value` in memory and queue its write to disk
    fn insert(&self, key: &str, value: T) {
        self.disk.set_data(self.encoder(value.clone(), key), key);
        self.memory.insert(key.to_string(), value);
    }

    /// Lazily encodes `value` on the disk queue
    fn encoder(&self, value: T, key: &str) -> impl FnOnce() -> Option<Vec<u8>> + Send + 'static {
        let format = self.format.clone();
        let key = key.to_string();
        move || match format.encode(&value) {
            Ok(data) => Some(data),
            Err(e) => {
                error!(key = %key, format_name = format.name(), error = %e, "Failed to encode value");
                None
            }
        }
    }

    /// Serve `key` from memory, refreshing its disk access date
    fn fetch_from_memory(&self, key: &str, fetch: &Fetch<T>) -> bool {
        let Some(value) = self.memory.get(key) else {
            return false;
        };
        debug!(key = %key, format_name = self.format.name(), "Memory hit");
        let encoder = self.encoder(value.clone(), key);
        fetch.succeed(value);
        self.disk.update_access_date(encoder, key);
        true
    }

    /// Read and decode `key` from disk, promoting it to memory
    async fn load(&self, key: &str) -> Result<T> {
        let data = self.disk.fetch_data(key).await.map_err(|e| {
            if e.is_not_found() {
                CacheError::ObjectNotFound(key.to_string())
            } else {
                warn!(key = %key, format_name = self.format.name(), error = %e, "Disk read failed");
                CacheError::from(e)
            }
        })?;

        let source = self.disk.path_for_key(key).display().to_string();
        let value: T = decode_blocking(data, source).await?;
        debug!(key = %key, format_name = self.format.name(), "Disk hit");
        self.memory.insert(key.to_string(), value.clone());
        Ok(value)
    }

    /// Apply the format on the blocking pool; identity formats pass through
    async fn prepare(&self, value: T) -> Result<T> {
        if self.format.is_identity() {
            return Ok(value);
        }
        let format = self.format.clone();
        tokio::task::spawn_blocking(move || format.apply(value).decompress())
            .await
            .map_err(|e| CacheError::Runtime(e.to_string()))
    }
}

struct Subscription {
    source: Arc<dyn MemoryPressureSource>,
    id: SubscriptionId,
}

struct Inner<T> {
    config: CacheConfig,
    path: PathBuf,
    formats: RwLock<HashMap<String, Arc<FormatCache<T>>>>,
    runtime: Handle,
    client: reqwest::Client,
    memory_pressure: Mutex<Option<Subscription>>,
}

impl<T: CacheValue> Inner<T> {
    fn clear_memory(&self) {
        let formats = self.formats.read().unwrap_or_else(PoisonError::into_inner);
        for cache in formats.values() {
            cache.memory.invalidate_all();
        }
        debug!(name = %self.config.name, formats = formats.len(), "Cleared memory tiers");
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        let subscription = self
            .memory_pressure
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscription) = subscription {
            subscription.source.unsubscribe(subscription.id);
        }
    }
}

/// Named, two-tier cache of `T` values
///
/// Clones share the same tiers. Must be created inside a tokio runtime.
pub struct Cache<T> {
    inner: Arc<Inner<T>>,
}

impl<T: CacheValue> Cache<T> {
    /// Cache `name` under the default root directory
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::with_config(CacheConfig::new(name))
    }

    pub fn with_config(config: CacheConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| CacheError::Runtime(e.to_string()))?;
        let path = config.cache_path();

        let cache = Self {
            inner: Arc::new(Inner {
                config,
                path,
                formats: RwLock::new(HashMap::new()),
                runtime,
                client: reqwest::Client::new(),
                memory_pressure: Mutex::new(None),
            }),
        };
        let original_capacity = cache.inner.config.original_disk_capacity;
        cache.add_format(Format::new(ORIGINAL_FORMAT).with_disk_capacity(original_capacity))?;

        info!(name = %cache.name(), path = ?cache.path(), "Cache ready");
        Ok(cache)
    }

    /// Clear the memory tiers whenever `source` signals low memory
    ///
    /// Replaces any previous source. The subscription ends when the last
    /// handle to the cache is dropped.
    pub fn with_memory_pressure(self, source: Arc<dyn MemoryPressureSource>) -> Self {
        let weak = Arc::downgrade(&self.inner);
        let id = source.subscribe(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.clear_memory();
            }
        }));

        let previous = self
            .inner
            .memory_pressure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Subscription { source, id });
        if let Some(previous) = previous {
            previous.source.unsubscribe(previous.id);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Directory holding one subdirectory per format
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn has_format(&self, name: &str) -> bool {
        self.formats().contains_key(name)
    }

    pub fn format_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.formats().keys().cloned().collect();
        names.sort();
        names
    }

    /// Register `format`, replacing any format with the same name
    ///
    /// A replacement keeps the disk tier of the name, adopting the new
    /// capacity, and starts an empty memory tier. [`ORIGINAL_FORMAT`] only
    /// accepts identity replacements.
    pub fn add_format(&self, format: Format<T>) -> Result<()> {
        if format.name() == ORIGINAL_FORMAT && !format.is_identity() {
            return Err(CacheError::InvalidFormat(format!(
                "{} must not transform values",
                ORIGINAL_FORMAT
            )));
        }

        let mut formats = self.formats_mut();
        let name = format.name().to_string();
        let disk = match formats.get(&name) {
            Some(existing) => {
                debug!(name = %self.name(), format_name = %name, capacity = format.disk_capacity(), "Replacing format");
                existing.disk.set_capacity(format.disk_capacity());
                existing.disk.clone()
            }
            None => {
                let dir = self.inner.path.join(filename_for_key(&name));
                if let Err(e) = std::fs::create_dir_all(&dir) {
                    warn!(path = ?dir, error = %e, "Failed to create format directory");
                }
                debug!(name = %self.name(), format_name = %name, capacity = format.disk_capacity(), "Adding format");
                Arc::new(DiskCache::new(dir, format.disk_capacity())?)
            }
        };

        let cache = FormatCache {
            format,
            memory: self.memory_tier(),
            disk,
        };
        formats.insert(name, Arc::new(cache));
        Ok(())
    }

    /// Store `value` under `key` in both tiers of `format`
    ///
    /// The fetch succeeds with the formatted value as soon as it is in memory;
    /// the disk write completes in the background.
    pub fn set(&self, value: T, key: &str, format: &str) -> Fetch<T> {
        let fetch = Fetch::new();
        let cache = match self.format_cache(format) {
            Ok(cache) => cache,
            Err(e) => {
                fetch.fail(Some(e));
                return fetch;
            }
        };

        if cache.format.is_identity() {
            cache.insert(key, value.clone());
            fetch.succeed(value);
            return fetch;
        }

        let key = key.to_string();
        let resolver = fetch.clone();
        let task = self.inner.runtime.spawn(async move {
            match cache.prepare(value).await {
                Ok(value) => {
                    cache.insert(&key, value.clone());
                    resolver.succeed(value);
                }
                Err(e) => {
                    error!(key = %key, error = %e, "Failed to format value");
                    resolver.fail(Some(e));
                }
            }
        });
        fetch.set_canceller(move || task.abort());
        fetch
    }

    /// Look `key` up in memory, then on disk
    ///
    /// Fails with [`CacheError::ObjectNotFound`] when neither tier has it.
    pub fn fetch(&self, key: &str, format: &str) -> Fetch<T> {
        let fetch = Fetch::new();
        let cache = match self.format_cache(format) {
            Ok(cache) => cache,
            Err(e) => {
                fetch.fail(Some(e));
                return fetch;
            }
        };
        if cache.fetch_from_memory(key, &fetch) {
            return fetch;
        }

        let key = key.to_string();
        let resolver = fetch.clone();
        let task = self.inner.runtime.spawn(async move {
            match cache.load(&key).await {
                Ok(value) => resolver.succeed(value),
                Err(e) => resolver.fail(Some(e)),
            }
        });
        fetch.set_canceller(move || task.abort());
        fetch
    }

    /// Look the fetcher's key up, running `fetcher` when both tiers miss
    ///
    /// A fetched value is formatted, stored in both tiers and delivered.
    /// Cancelling the returned fetch cancels the fetcher.
    pub fn fetch_with<F>(&self, fetcher: F, format: &str) -> Fetch<T>
    where
        F: Fetcher<T> + 'static,
    {
        let fetcher: Arc<dyn Fetcher<T>> = Arc::new(fetcher);
        let fetch = Fetch::new();
        let cache = match self.format_cache(format) {
            Ok(cache) => cache,
            Err(e) => {
                fetch.fail(Some(e));
                return fetch;
            }
        };

        let key = fetcher.key().to_string();
        if cache.fetch_from_memory(&key, &fetch) {
            return fetch;
        }

        let resolver = fetch.clone();
        let source = fetcher.clone();
        self.inner.runtime.spawn(async move {
            let miss = match cache.load(&key).await {
                Ok(value) => {
                    resolver.succeed(value);
                    return;
                }
                Err(e) => e,
            };
            debug!(key = %key, reason = %miss, "Cache miss, running fetcher");

            let fetched = async {
                let value = source.fetch().await?;
                cache.prepare(value).await
            }
            .await;

            match fetched {
                Ok(value) => {
                    if !resolver.is_pending() {
                        debug!(key = %key, "Discarding value of cancelled fetch");
                        return;
                    }
                    cache.insert(&key, value.clone());
                    resolver.succeed(value);
                }
                Err(CacheError::Cancelled) => {
                    debug!(key = %key, "Fetcher cancelled");
                    resolver.fail(None);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Fetcher failed");
                    resolver.fail(Some(e));
                }
            }
        });
        fetch.set_canceller(move || fetcher.cancel());
        fetch
    }

    /// [`Cache::fetch_with`] a [`SimpleFetcher`] calling `producer` on a miss
    pub fn fetch_value<P>(&self, key: &str, producer: P, format: &str) -> Fetch<T>
    where
        P: Fn() -> T + Send + Sync + 'static,
    {
        self.fetch_with(SimpleFetcher::new(key, producer), format)
    }

    /// [`Cache::fetch_with`] a [`DiskFetcher`] reading `path` on a miss
    pub fn fetch_path(&self, path: impl Into<PathBuf>, format: &str) -> Fetch<T> {
        self.fetch_with(DiskFetcher::new(path), format)
    }

    /// [`Cache::fetch_with`] a [`NetworkFetcher`] downloading `url` on a miss
    pub fn fetch_url(&self, url: Url, format: &str) -> Fetch<T> {
        let client = self.inner.client.clone();
        self.fetch_with(NetworkFetcher::with_client(url, client), format)
    }

    /// Drop `key` from both tiers of `format`; unknown formats are ignored
    pub fn remove(&self, key: &str, format: &str) {
        let Ok(cache) = self.format_cache(format) else {
            return;
        };
        cache.memory.invalidate(key);
        cache.disk.remove_data(key);
    }

    /// Empty every tier of every format and delete the cache directory
    ///
    /// Memory is cleared right away. The disk work runs in the background
    /// whether or not the returned future is awaited, waiting at most
    /// `remove_all_timeout` for the disk queues. Failures are logged.
    pub fn remove_all(&self) -> impl Future<Output = ()> + Send + 'static {
        let caches = self.format_caches();
        for cache in &caches {
            cache.memory.invalidate_all();
        }

        let clears: Vec<_> = caches.iter().map(|cache| cache.disk.remove_all_data()).collect();
        let path = self.inner.path.clone();
        let timeout = self.inner.config.remove_all_timeout;

        let task = self.inner.runtime.spawn(async move {
            match tokio::time::timeout(timeout, join_all(clears)).await {
                Ok(results) => {
                    for result in results {
                        if let Err(e) = result {
                            warn!(path = ?path, error = %e, "Failed to clear disk cache");
                        }
                    }
                }
                Err(_) => warn!(path = ?path, ?timeout, "Timed out clearing disk caches"),
            }

            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = ?path, error = %e, "Failed to remove cache directory"),
            }

            for cache in &caches {
                cache.disk.calculate_size();
            }
            info!(path = ?path, "Removed all cached data");
        });

        async move {
            if let Err(e) = task.await {
                error!(error = %e, "Remove all task failed");
            }
        }
    }

    /// Bytes on disk across every format
    pub fn size(&self) -> impl Future<Output = Result<u64>> + Send + 'static {
        let sizes: Vec<_> = self
            .format_caches()
            .iter()
            .map(|cache| cache.disk.size())
            .collect();

        async move {
            let mut total: u64 = 0;
            for size in join_all(sizes).await {
                total = total.saturating_add(size?);
            }
            Ok(total)
        }
    }

    /// Resolves once every disk write queued so far has run
    pub fn flush(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let flushes: Vec<_> = self
            .format_caches()
            .iter()
            .map(|cache| cache.disk.flush())
            .collect();

        async move {
            for result in join_all(flushes).await {
                result?;
            }
            Ok(())
        }
    }

    /// Disk statistics per format name
    pub fn stats(&self) -> impl Future<Output = Result<BTreeMap<String, CacheStats>>> + Send + 'static {
        let pending: Vec<_> = self
            .format_caches()
            .iter()
            .map(|cache| {
                let name = cache.format.name().to_string();
                let stats = cache.disk.stats();
                async move { stats.await.map(|stats| (name, stats)) }
            })
            .collect();

        async move {
            join_all(pending)
                .await
                .into_iter()
                .map(|result| result.map_err(CacheError::from))
                .collect()
        }
    }

    /// Drop every value held in memory; disk tiers are untouched
    pub fn on_memory_warning(&self) {
        self.inner.clear_memory();
    }

    fn memory_tier(&self) -> MemoryTier<T> {
        let mut builder = moka::sync::Cache::builder();
        if let Some(capacity) = self.inner.config.memory_capacity {
            builder = builder.max_capacity(capacity);
        }
        builder.build()
    }

    fn format_cache(&self, name: &str) -> Result<Arc<FormatCache<T>>> {
        self.formats().get(name).cloned().ok_or_else(|| {
            warn!(name = %self.name(), format_name = %name, "Format not found");
            CacheError::FormatNotFound(name.to_string())
        })
    }

    fn format_caches(&self) -> Vec<Arc<FormatCache<T>>> {
        self.formats().values().cloned().collect()
    }

    fn formats(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<FormatCache<T>>>> {
        self.inner
            .formats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn formats_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<FormatCache<T>>>> {
        self.inner
            .formats
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Clone for Cache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Cache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.inner.config.name)
            .field("path", &self.inner.path)
            .finish()
    }
}
