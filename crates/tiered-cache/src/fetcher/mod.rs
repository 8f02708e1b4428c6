//! Fetchers produce values for keys missing from the cache
//!
//! The cache only depends on the [`Fetcher`] trait. Three implementations
//! ship with the crate: [`SimpleFetcher`] (a value producer), [`DiskFetcher`]
//! (bytes from an arbitrary file) and [`NetworkFetcher`] (HTTP GET).

mod disk;
mod network;
mod simple;

pub use disk::DiskFetcher;
pub use network::NetworkFetcher;
pub use simple::SimpleFetcher;

use std::future::Future;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::{CacheError, Result};

/// Source of values for a single key
pub trait Fetcher<T>: Send + Sync {
    /// Key the fetched value is stored under
    fn key(&self) -> &str;

    /// Start producing the value
    ///
    /// Resolves to [`CacheError::Cancelled`] when [`Fetcher::cancel`] is called
    /// before the value arrives.
    fn fetch(&self) -> BoxFuture<'static, Result<T>>;

    /// Abandon in-flight work; results arriving afterwards are discarded
    fn cancel(&self);
}

/// Cancellation state shared between a fetcher and the futures it starts
///
/// Once cancelled, stays cancelled.
#[derive(Debug, Default)]
pub(crate) struct CancelFlag {
    token: CancellationToken,
}

impl CancelFlag {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    /// Run `future` until it completes or [`CancelFlag::cancel`] is called
    pub(crate) async fn run<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(CacheError::Cancelled),
            result = future => {
                if self.is_cancelled() {
                    return Err(CacheError::Cancelled);
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_completes() {
        let flag = CancelFlag::default();
        let value = flag.run(async { Ok(5) }).await.unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_future() {
        let flag = Arc::new(CancelFlag::default());
        let canceller = flag.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result: Result<()> = flag
            .run(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(CacheError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelled_flag_rejects_new_work() {
        let flag = CancelFlag::default();
        flag.cancel();
        assert!(flag.is_cancelled());

        let result = flag.run(async { Ok(1) }).await;
        assert!(matches!(result, Err(CacheError::Cancelled)));
    }
}
