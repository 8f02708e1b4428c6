//! Core types for the tiered cache CLI

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use tiered_cache::{CacheConfig, CacheStats, FetchOutcome};
use url::Url;

/// Configuration for the CLI
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub cache: CacheConfig,
    /// Disk budget of the original format, in bytes
    pub max_disk_size: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            max_disk_size: 1024 * 1024 * 1024, // 1GB
        }
    }
}

impl FetchConfig {
    /// Cache configuration with the disk budget applied to the original format
    pub fn cache_config(&self) -> CacheConfig {
        self.cache
            .clone()
            .with_original_disk_capacity(self.max_disk_size)
    }
}

/// Where a value comes from on a cache miss
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Url(Url),
    Path(PathBuf),
}

impl Source {
    /// HTTP(S) URLs are downloaded, anything else is read as a file path
    pub fn parse(raw: &str) -> Self {
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Source::Url(url),
            _ => Source::Path(PathBuf::from(raw)),
        }
    }

    /// Key the fetched value is cached under
    pub fn key(&self) -> String {
        match self {
            Source::Url(url) => url.as_str().to_string(),
            Source::Path(path) => path.to_string_lossy().into_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Ok,
    Failed,
    Cancelled,
}

/// One line of output per fetched source or key
#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub source: String,
    pub key: String,
    pub status: FetchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchReport {
    pub fn new(source: String, key: String, outcome: FetchOutcome<Vec<u8>>) -> Self {
        let (status, size, error) = match outcome {
            FetchOutcome::Succeeded(data) => (FetchStatus::Ok, Some(data.len()), None),
            FetchOutcome::Failed(err) => (FetchStatus::Failed, None, err.map(|e| e.to_string())),
            FetchOutcome::Cancelled => (FetchStatus::Cancelled, None, None),
        };
        Self {
            source,
            key,
            status,
            size,
            error,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == FetchStatus::Ok
    }
}

/// Output of the `stats` command
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub name: String,
    pub path: PathBuf,
    pub total_size: u64,
    pub formats: BTreeMap<String, CacheStats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiered_cache::CacheError;

    #[test]
    fn test_default_config() {
        let config = FetchConfig::default();
        assert_eq!(config.max_disk_size, 1024 * 1024 * 1024);
        assert_eq!(config.cache.name, "default");
        assert_eq!(config.cache_config().original_disk_capacity, 1024 * 1024 * 1024);
    }

    #[test]
    fn test_source_parse() {
        let url = Source::parse("https://example.com/a.png");
        assert!(matches!(url, Source::Url(_)));
        assert_eq!(url.key(), "https://example.com/a.png");

        let path = Source::parse("/tmp/photo.jpg");
        assert_eq!(path, Source::Path(PathBuf::from("/tmp/photo.jpg")));
        assert_eq!(path.key(), "/tmp/photo.jpg");

        // Non-HTTP schemes are treated as paths
        assert!(matches!(Source::parse("file:///tmp/x"), Source::Path(_)));
        assert!(matches!(Source::parse("relative/file"), Source::Path(_)));
    }

    #[test]
    fn test_report_serialization() {
        let ok = FetchReport::new(
            "a".to_string(),
            "a".to_string(),
            FetchOutcome::Succeeded(vec![1, 2, 3]),
        );
        assert!(ok.is_ok());
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["size"], 3);
        assert!(json.get("error").is_none());

        let failed = FetchReport::new(
            "b".to_string(),
            "b".to_string(),
            FetchOutcome::Failed(Some(CacheError::InvalidStatusCode(500))),
        );
        assert!(!failed.is_ok());
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "Invalid status code: 500");

        let cancelled = FetchReport::new("c".to_string(), "c".to_string(), FetchOutcome::Cancelled);
        assert_eq!(serde_json::to_value(&cancelled).unwrap()["status"], "cancelled");
    }
}
