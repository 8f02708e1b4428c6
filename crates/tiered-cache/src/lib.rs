//! Two-tier value cache
//!
//! Values live in an in-memory tier backed by a capacity-bounded disk tier
//! (see `file-blob-cache`). A [`Cache`] is split into [`Format`]s, each with its
//! own transform, memory tier and disk directory. Lookups that miss both tiers
//! can fall back to a [`Fetcher`], whose result is stored before it is handed
//! back.
//!
//! Every cache operation returns a [`Fetch`]: attach callbacks with
//! [`Fetch::on_success`] / [`Fetch::on_failure`], or await
//! [`Fetch::outcome`].

mod cache;
mod codec;
mod config;
mod error;
mod fetch;
pub mod fetcher;
mod format;
mod memory_pressure;

pub use cache::Cache;
pub use codec::{CacheValue, CodecError, Json};
pub use config::{default_root_dir, CacheConfig};
pub use error::{CacheError, Result};
pub use fetch::{Fetch, FetchOutcome};
pub use fetcher::{DiskFetcher, Fetcher, NetworkFetcher, SimpleFetcher};
pub use format::{Format, ORIGINAL_FORMAT};
pub use memory_pressure::{
    MemoryPressureCallback, MemoryPressureNotifier, MemoryPressureSource, SubscriptionId,
};

pub use file_blob_cache::{CacheStats, DiskCache, DiskCacheError};
