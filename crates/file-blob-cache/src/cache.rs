//! Disk cache with serialized access and LRU eviction
//!
//! A [`DiskCache`] owns one directory. All reads, writes and evictions for that
//! directory run on a single worker thread in submission order, so the running
//! size counter never races with the files it describes. Different disk caches
//! have independent workers and evict in parallel.

use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::error::{DiskCacheError, Result};
use crate::fs::{catch_not_found, file_size, list_entries, remove_path, touch, write_atomic};
use crate::path::filename_for_key;
use crate::queue::SerialQueue;
use crate::types::CacheStats;

/// Prefix of the worker thread names
const QUEUE_NAME_PREFIX: &str = "file-blob-cache";

/// A capacity-bounded directory of blobs addressed by key
pub struct DiskCache {
    path: PathBuf,
    /// Last capacity requested through the public API
    capacity: Arc<AtomicU64>,
    queue: SerialQueue<DiskState>,
}

impl DiskCache {
    /// Create a disk cache over `path` holding at most `capacity` bytes
    ///
    /// The current size is recomputed from disk in the background, followed by
    /// an eviction pass in case the directory grew beyond `capacity`.
    pub fn new(path: impl Into<PathBuf>, capacity: u64) -> Result<Self> {
        let path = path.into();
        let dir_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let queue_name = format!("{}.{}", QUEUE_NAME_PREFIX, dir_name);

        let state = DiskState {
            path: path.clone(),
            size: 0,
            capacity,
        };
        let queue = SerialQueue::spawn(queue_name, state)?;
        queue.submit(|state| {
            state.calculate_size();
            state.control_capacity();
        })?;

        Ok(Self {
            path,
            capacity: Arc::new(AtomicU64::new(capacity)),
            queue,
        })
    }

    /// Directory owned by this cache
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location of the file storing `key`
    pub fn path_for_key(&self, key: &str) -> PathBuf {
        path_for_key(&self.path, key)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Change the byte budget, evicting right away if the cache is now over it
    pub fn set_capacity(&self, capacity: u64) {
        self.capacity.store(capacity, Ordering::Relaxed);
        self.submit("set capacity", move |state| {
            state.capacity = capacity;
            state.control_capacity();
        });
    }

    /// Store the bytes produced by `producer` under `key`
    ///
    /// `producer` runs on the disk queue, and only there. When it yields
    /// nothing the write is skipped.
    pub fn set_data<F>(&self, producer: F, key: &str)
    where
        F: FnOnce() -> Option<Vec<u8>> + Send + 'static,
    {
        let key = key.to_string();
        self.submit("set data", move |state| match producer() {
            Some(data) => state.set_data_sync(&data, &key),
            None => error!(key = %key, "Failed to get data for key"),
        });
    }

    /// Read the bytes stored under `key`
    ///
    /// A read hit also refreshes the file's modification time, after the bytes
    /// have been handed back.
    pub fn fetch_data(&self, key: &str) -> impl Future<Output = Result<Vec<u8>>> + Send + 'static {
        let key = key.to_string();
        let (reply_tx, reply_rx) = oneshot::channel();
        let submitted = self.queue.submit(move |state| {
            let path = path_for_key(&state.path, &key);
            match fs::read(&path) {
                Ok(data) => {
                    let _ = reply_tx.send(Ok(data));
                    state.update_disk_access_date(&path);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(key = %key, "Disk cache miss");
                    let _ = reply_tx.send(Err(DiskCacheError::NotFound(path)));
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to read cached file");
                    let _ = reply_tx.send(Err(e.into()));
                }
            }
        });

        async move {
            submitted?;
            reply_rx.await.map_err(|_| DiskCacheError::QueueClosed)?
        }
    }

    /// Refresh the modification time of `key`, writing it from `producer` if
    /// the file is gone
    pub fn update_access_date<F>(&self, producer: F, key: &str)
    where
        F: FnOnce() -> Option<Vec<u8>> + Send + 'static,
    {
        let key = key.to_string();
        self.submit("update access date", move |state| {
            let path = path_for_key(&state.path, &key);
            if path.is_file() && state.update_disk_access_date(&path) {
                return;
            }
            match producer() {
                Some(data) => state.set_data_sync(&data, &key),
                None => error!(key = %key, "Failed to get data for key"),
            }
        });
    }

    /// Delete the file stored under `key`, if any
    pub fn remove_data(&self, key: &str) {
        let key = key.to_string();
        self.submit("remove data", move |state| {
            let path = path_for_key(&state.path, &key);
            state.remove_file_at_path(&path);
        });
    }

    /// Delete every file in the cache directory
    ///
    /// The returned future resolves once the directory has been emptied; the
    /// removal happens whether or not it is awaited.
    pub fn remove_all_data(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let (reply_tx, reply_rx) = oneshot::channel();
        let submitted = self.queue.submit(move |state| {
            state.remove_all();
            state.calculate_size();
            let _ = reply_tx.send(());
            state.calculate_size();
        });

        async move {
            submitted?;
            reply_rx.await.map_err(|_| DiskCacheError::QueueClosed)
        }
    }

    /// Total bytes currently tracked, read on the disk queue
    pub fn size(&self) -> impl Future<Output = Result<u64>> + Send + 'static {
        self.queue.call(|state| state.size)
    }

    /// Entry count, size and age of the cache, read on the disk queue
    pub fn stats(&self) -> impl Future<Output = Result<CacheStats>> + Send + 'static {
        self.queue.call(|state| state.stats())
    }

    /// Recompute the tracked size from the files on disk
    pub fn calculate_size(&self) {
        self.submit("calculate size", |state| {
            state.calculate_size();
            state.control_capacity();
        });
    }

    /// Resolves once every previously submitted operation has run
    pub fn flush(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        self.queue.call(|_| ())
    }

    fn submit<F>(&self, operation: &'static str, job: F)
    where
        F: FnOnce(&mut DiskState) + Send + 'static,
    {
        if let Err(e) = self.queue.submit(job) {
            error!(path = ?self.path, operation, error = %e, "Failed to submit disk operation");
        }
    }
}

impl std::fmt::Debug for DiskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskCache")
            .field("path", &self.path)
            .field("capacity", &self.capacity())
            .finish()
    }
}

fn path_for_key(dir: &Path, key: &str) -> PathBuf {
    dir.join(filename_for_key(key))
}

/// State owned by the disk queue
struct DiskState {
    path: PathBuf,
    size: u64,
    capacity: u64,
}

impl DiskState {
    fn set_data_sync(&mut self, data: &[u8], key: &str) {
        let path = path_for_key(&self.path, key);

        let previous_size = match file_size(&path) {
            Ok(size) => size,
            Err(e) => {
                error!(key = %key, error = %e, "Failed to read size of previous file");
                None
            }
        };

        if let Err(e) = write_atomic(&self.path, &path, data) {
            error!(key = %key, error = %e, "Failed to write key");
            return;
        }

        if let Some(previous_size) = previous_size {
            self.subtract_size(previous_size);
        }
        self.size = self.size.saturating_add(data.len() as u64);
        self.update_disk_access_date(&path);
        debug!(key = %key, size = data.len(), total = self.size, "Stored blob");

        self.control_capacity();
    }

    /// Returns `true` if the modification time was updated
    fn update_disk_access_date(&self, path: &Path) -> bool {
        match touch(path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                error!(path = ?path, error = %e, "Failed to update access date");
                false
            }
        }
    }

    fn remove_file_at_path(&mut self, path: &Path) {
        let size = match file_size(path) {
            Ok(Some(size)) => size,
            Ok(None) => {
                debug!(path = ?path, "File not found");
                return;
            }
            Err(e) => {
                error!(path = ?path, error = %e, "Failed to remove file");
                return;
            }
        };

        match catch_not_found(|| fs::remove_file(path)) {
            Ok(Some(())) => self.subtract_size(size),
            Ok(None) => debug!(path = ?path, "File not found"),
            Err(e) => error!(path = ?path, error = %e, "Failed to remove file"),
        }
    }

    fn remove_all(&mut self) {
        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return,
            Err(e) => {
                error!(path = ?self.path, error = %e, "Failed to list directory");
                return;
            }
        };

        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    error!(path = ?self.path, error = %e, "Failed to list directory");
                    continue;
                }
            };
            if let Err(e) = remove_path(&path) {
                error!(path = ?path, error = %e, "Failed to remove path");
            }
        }
        info!(path = ?self.path, "Removed all cached files");
    }

    fn calculate_size(&mut self) {
        self.size = 0;
        match list_entries(&self.path) {
            Ok(entries) => self.size = entries.iter().map(|e| e.size).sum(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "Cache directory does not exist yet");
            }
            Err(e) => error!(path = ?self.path, error = %e, "Failed to list directory"),
        }
    }

    /// Evict least recently modified files until the size fits the capacity
    fn control_capacity(&mut self) {
        if self.size <= self.capacity {
            return;
        }

        let entries = match list_entries(&self.path) {
            Ok(entries) => entries,
            Err(e) => {
                error!(path = ?self.path, error = %e, "Failed to list directory");
                return;
            }
        };

        let mut evicted = 0;
        for entry in entries {
            self.remove_file_at_path(&entry.path);
            evicted += 1;
            if self.size <= self.capacity {
                break;
            }
        }
        debug!(
            path = ?self.path,
            evicted,
            size = self.size,
            capacity = self.capacity,
            "Evicted least recently used files"
        );
    }

    fn subtract_size(&mut self, size: u64) {
        if self.size >= size {
            self.size -= size;
        } else {
            error!(
                tracked = self.size,
                subtracted = size,
                "Disk cache size is smaller than size to subtract"
            );
            self.size = 0;
        }
    }

    fn stats(&self) -> CacheStats {
        let entries = match list_entries(&self.path) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    error!(path = ?self.path, error = %e, "Failed to list directory");
                }
                Vec::new()
            }
        };
        CacheStats {
            entries: entries.len(),
            total_size: self.size,
            capacity: self.capacity,
            oldest_modified: entries.first().map(|e| e.modified),
        }
    }
}
