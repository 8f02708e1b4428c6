//! Value codec
//!
//! Anything stored in a [`Cache`](crate::Cache) converts to and from bytes
//! through [`CacheValue`]. The bytes of the original format on disk are
//! exactly what [`CacheValue::encode`] returns.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;

/// Failure to convert a value to or from bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecError(String);

impl CodecError {
    pub fn new(msg: impl Into<String>) -> Self {
        CodecError(msg.into())
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CodecError {}

/// A value that can live in both tiers of the cache
pub trait CacheValue: Clone + Send + Sync + 'static {
    fn encode(&self) -> Result<Vec<u8>, CodecError>;

    fn decode(bytes: &[u8]) -> Result<Self, CodecError>;

    /// Post-decode step for values that need preparation before use, such as
    /// images that should be decompressed off the caller's thread
    fn decompress(self) -> Self {
        self
    }
}

impl CacheValue for Vec<u8> {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.clone())
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(bytes.to_vec())
    }
}

impl CacheValue for String {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.as_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        String::from_utf8(bytes.to_vec()).map_err(|e| CodecError::new(e.to_string()))
    }
}

/// Stores any serde type as JSON
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T> CacheValue for Json<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(&self.0).map_err(|e| CodecError::new(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes)
            .map(Json)
            .map_err(|e| CodecError::new(e.to_string()))
    }
}

/// Decode `data` on the blocking pool and run the decompression hook
///
/// `source` names where the bytes came from, for the error message.
pub(crate) async fn decode_blocking<T: CacheValue>(data: Vec<u8>, source: String) -> crate::Result<T> {
    let decoded = tokio::task::spawn_blocking(move || T::decode(&data).map(CacheValue::decompress))
        .await
        .map_err(|e| CacheError::Runtime(e.to_string()))?;
    decoded.map_err(|e| {
        CacheError::InvalidData(format!("Failed to convert value from data at {}: {}", source, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Thumbnail {
        width: u32,
        height: u32,
        url: String,
    }

    #[test]
    fn test_bytes_codec() {
        let value = vec![0u8, 1, 2, 255];
        let encoded = value.encode().unwrap();
        assert_eq!(Vec::<u8>::decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_string_rejects_invalid_utf8() {
        assert_eq!(String::decode(b"hello").unwrap(), "hello");
        assert!(String::decode(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_json_codec() {
        let value = Json(Thumbnail {
            width: 64,
            height: 48,
            url: "https://example.com/a.png".to_string(),
        });

        let encoded = value.encode().unwrap();
        let json = String::from_utf8(encoded.clone()).unwrap();
        assert!(json.contains("\"width\":64"));

        let decoded = Json::<Thumbnail>::decode(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[tokio::test]
    async fn test_decode_blocking_reports_source() {
        let value: String = decode_blocking(b"ok".to_vec(), "k".to_string()).await.unwrap();
        assert_eq!(value, "ok");

        let err = decode_blocking::<String>(vec![0xff], "/tmp/bad".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidData(ref msg) if msg.contains("/tmp/bad")));
    }

    #[test]
    fn test_json_rejects_garbage() {
        let err = Json::<Thumbnail>::decode(b"not json").unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
