//! Fetcher downloading values over HTTP

use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::{CancelFlag, Fetcher};
use crate::codec::{decode_blocking, CacheValue};
use crate::error::{CacheError, Result};

/// GETs `url` and decodes the body; the URL doubles as the cache key
pub struct NetworkFetcher<T> {
    url: Url,
    key: String,
    client: Client,
    cancel: Arc<CancelFlag>,
    _value: PhantomData<fn() -> T>,
}

impl<T> NetworkFetcher<T> {
    pub fn new(url: Url) -> Self {
        Self::with_client(url, Client::new())
    }

    /// Use a preconfigured client (timeouts, user agent, proxies)
    pub fn with_client(url: Url, client: Client) -> Self {
        let key = url.as_str().to_string();
        Self {
            url,
            key,
            client,
            cancel: Arc::new(CancelFlag::default()),
            _value: PhantomData,
        }
    }
}

impl<T: CacheValue> Fetcher<T> for NetworkFetcher<T> {
    fn key(&self) -> &str {
        &self.key
    }

    fn fetch(&self) -> BoxFuture<'static, Result<T>> {
        let url = self.url.clone();
        let client = self.client.clone();
        let cancel = self.cancel.clone();
        async move { cancel.run(download(client, url)).await }.boxed()
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}

async fn download<T: CacheValue>(client: Client, url: Url) -> Result<T> {
    debug!(url = %url, "Fetching");

    let mut response = client.get(url.clone()).send().await.map_err(|e| {
        debug!(url = %url, error = %e, "Request failed");
        CacheError::from(e)
    })?;

    let status = response.status();
    if !status.is_success() {
        debug!(url = %url, status = %status, "Invalid status code");
        return Err(CacheError::InvalidStatusCode(status.as_u16()));
    }

    let expected = response.content_length();
    let mut data = Vec::with_capacity(expected.unwrap_or_default().min(MAX_PREALLOC) as usize);
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => data.extend_from_slice(&chunk),
            Ok(None) => break,
            // The connection closed before the declared length arrived
            Err(e) if !is_valid_length(expected, data.len()) => {
                debug!(url = %url, error = %e, "Body ended early");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if !is_valid_length(expected, data.len()) {
        let err = CacheError::MissingData {
            expected: expected.unwrap_or_default(),
            received: data.len() as u64,
        };
        debug!(url = %url, error = %err, "Incomplete body");
        return Err(err);
    }

    debug!(url = %url, size = data.len(), "Fetched");
    decode_blocking(data, format!("URL {}", url)).await
}

/// Upper bound on the buffer reserved up front from `Content-Length`
const MAX_PREALLOC: u64 = 8 * 1024 * 1024;

/// A body is complete when it is at least as long as the declared length
fn is_valid_length(expected: Option<u64>, received: usize) -> bool {
    match expected {
        Some(expected) => received as u64 >= expected,
        None => true,
    }
}
