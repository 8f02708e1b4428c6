//! Formats: named value transforms with their own disk budget

use std::fmt;
use std::sync::Arc;

use crate::codec::{CacheValue, CodecError};

/// Name of the format every cache starts with
pub const ORIGINAL_FORMAT: &str = "original";

type Transform<T> = Arc<dyn Fn(T) -> T + Send + Sync>;
type Encoder<T> = Arc<dyn Fn(&T) -> Result<Vec<u8>, CodecError> + Send + Sync>;

/// A named transform applied to values before they are cached
///
/// Each format gets its own memory tier and disk directory inside a cache.
pub struct Format<T> {
    name: String,
    disk_capacity: u64,
    transform: Option<Transform<T>>,
    encoder: Option<Encoder<T>>,
}

impl<T: CacheValue> Format<T> {
    /// Identity format with an unbounded disk budget
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            disk_capacity: u64::MAX,
            transform: None,
            encoder: None,
        }
    }

    pub fn with_disk_capacity(mut self, disk_capacity: u64) -> Self {
        self.disk_capacity = disk_capacity;
        self
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Serialize values of this format with `encoder` instead of the value codec
    pub fn with_encoder<F>(mut self, encoder: F) -> Self
    where
        F: Fn(&T) -> Result<Vec<u8>, CodecError> + Send + Sync + 'static,
    {
        self.encoder = Some(Arc::new(encoder));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn disk_capacity(&self) -> u64 {
        self.disk_capacity
    }

    /// `true` when applying this format leaves values untouched
    pub fn is_identity(&self) -> bool {
        self.transform.is_none()
    }

    pub fn apply(&self, value: T) -> T {
        match &self.transform {
            Some(transform) => transform(value),
            None => value,
        }
    }

    /// Bytes stored on disk for `value`
    pub fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        match &self.encoder {
            Some(encoder) => encoder(value),
            None => value.encode(),
        }
    }
}

impl<T> Clone for Format<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            disk_capacity: self.disk_capacity,
            transform: self.transform.clone(),
            encoder: self.encoder.clone(),
        }
    }
}

impl<T> fmt::Debug for Format<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Format")
            .field("name", &self.name)
            .field("disk_capacity", &self.disk_capacity)
            .field("identity", &self.transform.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_format_is_identity() {
        let format = Format::<String>::new(ORIGINAL_FORMAT);
        assert_eq!(format.name(), "original");
        assert_eq!(format.disk_capacity(), u64::MAX);
        assert!(format.is_identity());
        assert_eq!(format.apply("value".to_string()), "value");
    }

    #[test]
    fn test_transform_is_applied() {
        let format = Format::<String>::new("upper")
            .with_transform(|s| s.to_uppercase())
            .with_disk_capacity(1024);

        assert!(!format.is_identity());
        assert_eq!(format.disk_capacity(), 1024);
        assert_eq!(format.apply("shout".to_string()), "SHOUT");
    }

    #[test]
    fn test_custom_encoder() {
        let plain = Format::<String>::new("plain");
        assert_eq!(plain.encode(&"abc".to_string()).unwrap(), b"abc");

        let reversed = Format::<String>::new("reversed")
            .with_encoder(|s| Ok(s.chars().rev().collect::<String>().into_bytes()));
        assert_eq!(reversed.encode(&"abc".to_string()).unwrap(), b"cba");
    }

    #[test]
    fn test_clone_shares_transform() {
        let format = Format::<Vec<u8>>::new("double").with_transform(|mut v| {
            v.extend_from_slice(&v.clone());
            v
        });
        let cloned = format.clone();
        assert_eq!(cloned.apply(vec![1, 2]), vec![1, 2, 1, 2]);
        assert!(format!("{:?}", cloned).contains("double"));
    }
}
