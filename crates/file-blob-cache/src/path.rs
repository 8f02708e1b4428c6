//! Key to filename mapping
//!
//! Keys are arbitrary strings (URLs, paths, identifiers). Each key maps to a
//! single filename inside the cache directory: the percent-escaped key when it
//! fits, otherwise a SHA-256 digest of the key.

use sha2::{Digest, Sha256};

/// Maximum filename length in bytes on common filesystems
pub const NAME_MAX: usize = 255;

/// Longest key extension carried over onto a hashed filename
const MAX_EXTENSION_LEN: usize = 16;

/// Map a key to a filesystem-safe filename
pub fn filename_for_key(key: &str) -> String {
    let escaped = escape_filename(key);
    if escaped.len() < NAME_MAX && !is_reserved(&escaped) {
        return escaped;
    }
    hashed_filename(key)
}

/// Percent-escape every byte outside `[A-Za-z0-9_.~-]`
pub fn escape_filename(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

/// Fixed-length filename derived from the key's digest
pub fn hashed_filename(key: &str) -> String {
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    match key_extension(key) {
        Some(ext) => format!("{}.{}", digest, ext),
        None => digest,
    }
}

fn is_reserved(name: &str) -> bool {
    matches!(name, "" | "." | "..")
}

fn key_extension(key: &str) -> Option<&str> {
    let (_, ext) = key.rsplit_once('.')?;
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_plain_key_is_unchanged() {
        assert_eq!(filename_for_key("avatar-42_large.png"), "avatar-42_large.png");
    }

    #[test]
    fn test_disallowed_characters_are_escaped() {
        let name = filename_for_key("https://example.com/a/b.jpg");
        assert!(!name.contains('/'));
        assert!(!name.contains(':'));
        assert_eq!(name, "https%3A%2F%2Fexample.com%2Fa%2Fb.jpg");
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let key = "https://example.com/image?size=large";
        assert_eq!(filename_for_key(key), filename_for_key(key));

        let long = "x/".repeat(400);
        assert_eq!(filename_for_key(&long), filename_for_key(&long));
    }

    #[test]
    fn test_distinct_keys_map_to_distinct_names() {
        let keys = [
            "a",
            "A",
            "a/b",
            "a%2Fb",
            "a b",
            "a+b",
            "ä",
            "https://example.com/1.png",
            "https://example.com/2.png",
        ];
        let names: HashSet<String> = keys.iter().map(|k| filename_for_key(k)).collect();
        assert_eq!(names.len(), keys.len());
    }

    #[test]
    fn test_long_key_falls_back_to_hash() {
        let key = "k".repeat(NAME_MAX);
        let name = filename_for_key(&key);
        assert_eq!(name.len(), 64);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_escaping_counts_toward_length_limit() {
        // 100 slashes escape to 300 bytes
        let key = "/".repeat(100);
        let name = filename_for_key(&key);
        assert_eq!(name.len(), 64);
    }

    #[test]
    fn test_length_boundary() {
        let fits = "k".repeat(NAME_MAX - 1);
        assert_eq!(filename_for_key(&fits), fits);

        let too_long = "k".repeat(NAME_MAX);
        assert_ne!(filename_for_key(&too_long), too_long);
    }

    #[test]
    fn test_long_keys_differing_in_last_byte_do_not_collide() {
        let base = "https://example.com/".to_string() + &"segment/".repeat(60);
        let names: HashSet<String> = (0..200)
            .map(|i| filename_for_key(&format!("{}{}", base, i)))
            .collect();
        assert_eq!(names.len(), 200);
    }

    #[test]
    fn test_hashed_name_keeps_extension() {
        let key = format!("https://example.com/{}/photo.jpg", "p".repeat(300));
        let name = filename_for_key(&key);
        assert!(name.ends_with(".jpg"));
        assert_eq!(name.len(), 64 + 4);
    }

    #[test]
    fn test_hashed_name_skips_unsafe_extension() {
        let key = format!("{}.jpg?width=100", "p".repeat(300));
        let name = filename_for_key(&key);
        assert_eq!(name.len(), 64);
    }

    #[test]
    fn test_reserved_names_are_hashed() {
        for key in ["", ".", ".."] {
            let name = filename_for_key(key);
            assert!(name.len() >= 64, "key {:?} mapped to {:?}", key, name);
        }
        assert_ne!(filename_for_key("."), filename_for_key(".."));
    }
}
