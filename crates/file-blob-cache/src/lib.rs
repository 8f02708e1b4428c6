//! File-based blob cache with LRU eviction
//!
//! Stores binary blobs on disk, one file per key, under a byte budget. All
//! operations on a cache directory are serialized on a dedicated worker, and
//! the least recently modified files are evicted whenever the budget is
//! exceeded.

mod cache;
mod error;
mod fs;
pub mod path;
mod queue;
mod types;

pub use cache::DiskCache;
pub use error::{DiskCacheError, Result};
pub use types::{CacheEntry, CacheStats};
