//! Cache configuration

use std::path::PathBuf;
use std::time::Duration;

use file_blob_cache::path::filename_for_key;

/// Subdirectory of the platform cache directory holding every cache
pub const DEFAULT_ROOT_DIR_NAME: &str = "tiered-cache";

pub const DEFAULT_CACHE_NAME: &str = "default";

/// Longest `remove_all` waits for the disk tiers to empty
pub const DEFAULT_REMOVE_ALL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Namespace of the cache; names its directory under `root_dir`
    pub name: String,
    pub root_dir: PathBuf,
    pub remove_all_timeout: Duration,
    /// Maximum entries per memory tier, unbounded when `None`
    pub memory_capacity: Option<u64>,
    /// Disk budget in bytes of the original format
    pub original_disk_capacity: u64,
}

impl CacheConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root_dir: default_root_dir(),
            remove_all_timeout: DEFAULT_REMOVE_ALL_TIMEOUT,
            memory_capacity: None,
            original_disk_capacity: u64::MAX,
        }
    }

    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = root_dir.into();
        self
    }

    pub fn with_remove_all_timeout(mut self, timeout: Duration) -> Self {
        self.remove_all_timeout = timeout;
        self
    }

    pub fn with_memory_capacity(mut self, capacity: u64) -> Self {
        self.memory_capacity = Some(capacity);
        self
    }

    pub fn with_original_disk_capacity(mut self, capacity: u64) -> Self {
        self.original_disk_capacity = capacity;
        self
    }

    /// Directory holding every format of this cache
    pub fn cache_path(&self) -> PathBuf {
        self.root_dir.join(filename_for_key(&self.name))
    }

    /// Read `CACHE_NAME`, `CACHE_DIR`, `CACHE_MEMORY_CAPACITY` and
    /// `CACHE_REMOVE_ALL_TIMEOUT_SECS`, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let name = var("CACHE_NAME")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_CACHE_NAME.to_string());

        let root_dir = var("CACHE_DIR")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_root_dir);

        let memory_capacity = var("CACHE_MEMORY_CAPACITY").and_then(|s| s.parse::<u64>().ok());

        let remove_all_timeout = var("CACHE_REMOVE_ALL_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REMOVE_ALL_TIMEOUT);

        Self {
            name,
            root_dir,
            remove_all_timeout,
            memory_capacity,
            original_disk_capacity: u64::MAX,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_NAME)
    }
}

/// `<platform cache dir>/tiered-cache`, or under the temp dir when the
/// platform has no cache dir
pub fn default_root_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(DEFAULT_ROOT_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.name, "default");
        assert_eq!(config.remove_all_timeout, Duration::from_secs(60));
        assert_eq!(config.memory_capacity, None);
        assert_eq!(config.original_disk_capacity, u64::MAX);
        assert!(config.root_dir.ends_with("tiered-cache"));
        assert!(config.cache_path().ends_with("tiered-cache/default"));
    }

    #[test]
    fn test_from_vars() {
        let config = CacheConfig::from_vars(vars(&[
            ("CACHE_NAME", "images"),
            ("CACHE_DIR", "/var/cache/app"),
            ("CACHE_MEMORY_CAPACITY", "500"),
            ("CACHE_REMOVE_ALL_TIMEOUT_SECS", "5"),
        ]));

        assert_eq!(config.name, "images");
        assert_eq!(config.root_dir, PathBuf::from("/var/cache/app"));
        assert_eq!(config.memory_capacity, Some(500));
        assert_eq!(config.remove_all_timeout, Duration::from_secs(5));
        assert_eq!(config.cache_path(), PathBuf::from("/var/cache/app/images"));
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = CacheConfig::from_vars(vars(&[
            ("CACHE_NAME", ""),
            ("CACHE_MEMORY_CAPACITY", "lots"),
            ("CACHE_REMOVE_ALL_TIMEOUT_SECS", "-1"),
        ]));

        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_builders() {
        let config = CacheConfig::new("thumbs")
            .with_root_dir("/tmp/caches")
            .with_memory_capacity(10)
            .with_remove_all_timeout(Duration::from_millis(250))
            .with_original_disk_capacity(4096);

        assert_eq!(config.cache_path(), PathBuf::from("/tmp/caches/thumbs"));
        assert_eq!(config.memory_capacity, Some(10));
        assert_eq!(config.remove_all_timeout, Duration::from_millis(250));
        assert_eq!(config.original_disk_capacity, 4096);
    }
}
