//! Error types for the tiered cache

use std::fmt;
use std::io;
use std::sync::Arc;

use file_blob_cache::DiskCacheError;

use crate::codec::CodecError;

/// Errors delivered to fetch failure callbacks
///
/// Cloneable so a stored failure can be replayed to listeners registered after
/// the fetch resolved.
#[derive(Debug, Clone)]
pub enum CacheError {
    /// The requested format was never added to the cache
    FormatNotFound(String),
    /// The format cannot be registered under its name
    InvalidFormat(String),
    /// The key is in neither the memory nor the disk tier
    ObjectNotFound(String),
    /// The server answered with a non-success status
    InvalidStatusCode(u16),
    /// The body was shorter than the declared content length
    MissingData { expected: u64, received: u64 },
    /// The bytes could not be decoded into a value
    InvalidData(String),
    /// The fetch was cancelled; never surfaced to failure callbacks
    Cancelled,
    Io(Arc<io::Error>),
    Http(Arc<reqwest::Error>),
    Disk(DiskCacheError),
    /// The cache was used outside a tokio runtime
    Runtime(String),
}

impl CacheError {
    pub fn is_format_not_found(&self) -> bool {
        matches!(self, CacheError::FormatNotFound(_))
    }

    pub fn is_object_not_found(&self) -> bool {
        matches!(self, CacheError::ObjectNotFound(_))
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::FormatNotFound(name) => write!(f, "Format {} not found", name),
            CacheError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),
            CacheError::ObjectNotFound(key) => write!(f, "Object not found for key {}", key),
            CacheError::InvalidStatusCode(code) => write!(f, "Invalid status code: {}", code),
            CacheError::MissingData { expected, received } => write!(
                f,
                "Request expected {} bytes and received {} bytes",
                expected, received
            ),
            CacheError::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
            CacheError::Cancelled => write!(f, "Fetch cancelled"),
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::Http(err) => write!(f, "HTTP error: {}", err),
            CacheError::Disk(err) => write!(f, "Disk cache error: {}", err),
            CacheError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
            CacheError::Http(err) => Some(err.as_ref()),
            CacheError::Disk(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for CacheError {
    fn from(err: io::Error) -> Self {
        CacheError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Http(Arc::new(err))
    }
}

impl From<DiskCacheError> for CacheError {
    fn from(err: DiskCacheError) -> Self {
        CacheError::Disk(err)
    }
}

impl From<CodecError> for CacheError {
    fn from(err: CodecError) -> Self {
        CacheError::InvalidData(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
