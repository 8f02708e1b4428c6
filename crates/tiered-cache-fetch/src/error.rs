//! Error types for the tiered cache CLI

use std::fmt;

use tiered_cache::CacheError;

#[derive(Debug)]
pub enum FetchCliError {
    Cache(CacheError),
    Json(serde_json::Error),
    Config(String),
    /// Some sources or keys could not be fetched
    Incomplete { failed: usize, total: usize },
}

impl fmt::Display for FetchCliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchCliError::Cache(err) => write!(f, "Cache error: {}", err),
            FetchCliError::Json(err) => write!(f, "JSON error: {}", err),
            FetchCliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            FetchCliError::Incomplete { failed, total } => {
                write!(f, "{} of {} fetches failed", failed, total)
            }
        }
    }
}

impl std::error::Error for FetchCliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchCliError::Cache(err) => Some(err),
            FetchCliError::Json(err) => Some(err),
            FetchCliError::Config(_) | FetchCliError::Incomplete { .. } => None,
        }
    }
}

impl From<CacheError> for FetchCliError {
    fn from(err: CacheError) -> Self {
        FetchCliError::Cache(err)
    }
}

impl From<serde_json::Error> for FetchCliError {
    fn from(err: serde_json::Error) -> Self {
        FetchCliError::Json(err)
    }
}

impl From<tracing_subscriber::filter::ParseError> for FetchCliError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        FetchCliError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FetchCliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_display() {
        let err = FetchCliError::from(CacheError::FormatNotFound("thumb".to_string()));
        assert_eq!(format!("{}", err), "Cache error: Format thumb not found");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_config_error_display() {
        let err = FetchCliError::Config("bad filter".to_string());
        assert_eq!(format!("{}", err), "Configuration error: bad filter");
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn test_incomplete_display() {
        let err = FetchCliError::Incomplete {
            failed: 2,
            total: 5,
        };
        assert_eq!(format!("{}", err), "2 of 5 fetches failed");
    }
}
