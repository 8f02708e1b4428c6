//! CLI commands, each working on an open cache

use tiered_cache::{Cache, ORIGINAL_FORMAT};
use tracing::{info, warn};

use crate::error::{FetchCliError, Result};
use crate::types::{FetchReport, Source, StatsReport};

/// Fetch every source through the cache, downloading or reading it on a miss
pub async fn fetch_sources(cache: &Cache<Vec<u8>>, sources: &[String]) -> Vec<FetchReport> {
    // Start every fetch before waiting on any of them
    let pending: Vec<_> = sources
        .iter()
        .map(|raw| {
            let source = Source::parse(raw);
            let fetch = match &source {
                Source::Url(url) => cache.fetch_url(url.clone(), ORIGINAL_FORMAT),
                Source::Path(path) => cache.fetch_path(path.clone(), ORIGINAL_FORMAT),
            };
            (raw.clone(), source.key(), fetch)
        })
        .collect();

    let mut reports = Vec::with_capacity(pending.len());
    for (raw, key, fetch) in pending {
        let report = FetchReport::new(raw, key, fetch.outcome().await);
        match &report.error {
            Some(error) => warn!(source = %report.source, error = %error, "Fetch failed"),
            None => info!(source = %report.source, size = ?report.size, "Fetched"),
        }
        reports.push(report);
    }
    reports
}

/// Look keys up in the cache without fetching anything
pub async fn get_keys(cache: &Cache<Vec<u8>>, keys: &[String]) -> Vec<FetchReport> {
    let pending: Vec<_> = keys
        .iter()
        .map(|key| (key.clone(), cache.fetch(key, ORIGINAL_FORMAT)))
        .collect();

    let mut reports = Vec::with_capacity(pending.len());
    for (key, fetch) in pending {
        reports.push(FetchReport::new(key.clone(), key, fetch.outcome().await));
    }
    reports
}

pub async fn remove_keys(cache: &Cache<Vec<u8>>, keys: &[String]) -> Result<()> {
    for key in keys {
        cache.remove(key, ORIGINAL_FORMAT);
    }
    cache.flush().await?;
    info!(count = keys.len(), "Removed keys");
    Ok(())
}

pub async fn stats(cache: &Cache<Vec<u8>>) -> Result<StatsReport> {
    let formats = cache.stats().await?;
    let total_size = cache.size().await?;
    Ok(StatsReport {
        name: cache.name().to_string(),
        path: cache.path().to_path_buf(),
        total_size,
        formats,
    })
}

pub async fn clear(cache: &Cache<Vec<u8>>) {
    cache.remove_all().await;
}

/// Fail when any report is not a success
pub fn check_reports(reports: &[FetchReport]) -> Result<()> {
    let failed = reports.iter().filter(|report| !report.is_ok()).count();
    if failed > 0 {
        return Err(FetchCliError::Incomplete {
            failed,
            total: reports.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FetchStatus;
    use tempfile::tempdir;
    use tiered_cache::CacheConfig;

    fn test_cache(root: &std::path::Path) -> Cache<Vec<u8>> {
        Cache::with_config(CacheConfig::new("cli").with_root_dir(root)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_then_get() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("blob.bin");
        std::fs::write(&file, [1u8, 2, 3, 4]).unwrap();
        let cache = test_cache(&dir.path().join("root"));

        let sources = vec![file.to_string_lossy().into_owned()];
        let reports = fetch_sources(&cache, &sources).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, FetchStatus::Ok);
        assert_eq!(reports[0].size, Some(4));
        check_reports(&reports).unwrap();

        cache.flush().await.unwrap();
        cache.on_memory_warning();
        let reports = get_keys(&cache, &sources).await;
        assert_eq!(reports[0].size, Some(4));
    }

    #[tokio::test]
    async fn test_missing_source_is_reported() {
        let dir = tempdir().unwrap();
        let cache = test_cache(dir.path());

        let sources = vec![dir.path().join("nope").to_string_lossy().into_owned()];
        let reports = fetch_sources(&cache, &sources).await;
        assert_eq!(reports[0].status, FetchStatus::Failed);
        assert!(reports[0].error.is_some());

        let err = check_reports(&reports).unwrap_err();
        assert!(matches!(err, FetchCliError::Incomplete { failed: 1, total: 1 }));
    }

    #[tokio::test]
    async fn test_stats_remove_and_clear() {
        let dir = tempdir().unwrap();
        let cache = test_cache(&dir.path().join("root"));
        cache.set(vec![0u8; 10], "a", ORIGINAL_FORMAT);
        cache.set(vec![0u8; 5], "b", ORIGINAL_FORMAT);

        let report = stats(&cache).await.unwrap();
        assert_eq!(report.name, "cli");
        assert_eq!(report.total_size, 15);
        assert_eq!(report.formats[ORIGINAL_FORMAT].entries, 2);

        remove_keys(&cache, &["a".to_string()]).await.unwrap();
        assert_eq!(stats(&cache).await.unwrap().total_size, 5);

        clear(&cache).await;
        assert!(!cache.path().exists());
        assert_eq!(stats(&cache).await.unwrap().total_size, 0);
    }
}
