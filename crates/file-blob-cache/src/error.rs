//! Error types for the file blob cache

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum DiskCacheError {
    /// No file is stored for the requested key
    NotFound(PathBuf),
    Io(Arc<io::Error>),
    /// The worker behind the disk queue is gone
    QueueClosed,
}

impl DiskCacheError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DiskCacheError::NotFound(_))
    }
}

impl fmt::Display for DiskCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskCacheError::NotFound(path) => write!(f, "File not found: {}", path.display()),
            DiskCacheError::Io(err) => write!(f, "IO error: {}", err),
            DiskCacheError::QueueClosed => write!(f, "Disk cache queue closed"),
        }
    }
}

impl std::error::Error for DiskCacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiskCacheError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for DiskCacheError {
    fn from(err: io::Error) -> Self {
        DiskCacheError::Io(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, DiskCacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = DiskCacheError::NotFound(PathBuf::from("/cache/abc"));
        assert_eq!(format!("{}", err), "File not found: /cache/abc");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_io_error_has_source() {
        let err = DiskCacheError::from(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert!(!err.is_not_found());
        assert!(std::error::Error::source(&err).is_some());
        assert!(format!("{}", err).contains("denied"));
    }

    #[test]
    fn test_queue_closed_display() {
        let err = DiskCacheError::QueueClosed;
        assert_eq!(format!("{}", err), "Disk cache queue closed");
    }
}
