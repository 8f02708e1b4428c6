//! Cache types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A file tracked by a disk cache, as seen when listing its directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub size: u64,
    /// Last modification time, the LRU ordering signal
    pub modified: DateTime<Utc>,
}

/// Statistics about a disk cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub capacity: u64,
    pub oldest_modified: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_size, 0);
        assert_eq!(stats.capacity, 0);
        assert!(stats.oldest_modified.is_none());
    }

    #[test]
    fn test_stats_serialization() {
        let stats = CacheStats {
            entries: 3,
            total_size: 4096,
            capacity: 1 << 20,
            oldest_modified: Some(Utc::now()),
        };

        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["entries"], 3);
        assert_eq!(value["capacity"], 1 << 20);
        assert!(value["oldest_modified"].is_string());

        let empty = serde_json::to_value(CacheStats::default()).unwrap();
        assert!(empty["oldest_modified"].is_null());
    }
}
