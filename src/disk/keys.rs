//! Key Path Mapping
//!
//! Turns logical keys into file names and back. Every byte other than ASCII
//! alphanumerics and `- _ . ~` is percent-encoded, so separators and `%`
//! never appear raw. A leading `.` is also escaped, which rules out `.`,
//! `..` and hidden names; hidden names are reserved for temp files.
//!
//! Keys whose readable form would not fit in a file name (together with the
//! temp-file affixes) are stored under `%%` + the hex SHA-256 of the key.
//! A readable name never contains `%%`, since every `%` it holds starts an
//! escape.

use sha2::{Digest, Sha256};

use crate::error::{CacheError, Result};

/// Longest file name accepted by common filesystems.
pub const MAX_NAME_LEN: usize = 255;

const TEMP_PREFIX: &str = ".";
const TEMP_SUFFIX: &str = ".part";

/// Longest readable segment; leaves room for the temp-file affixes.
pub const MAX_SEGMENT_LEN: usize = MAX_NAME_LEN - TEMP_PREFIX.len() - TEMP_SUFFIX.len();

const ESCAPED_DOT: &str = "%2E";
const HASHED_PREFIX: &str = "%%";

// == Encode ==
/// Maps a key to a single, filesystem-safe path segment.
///
/// Distinct keys always produce distinct segments. Only the empty key is
/// rejected; over-long keys get a hashed name.
pub fn encode_key(key: &str) -> Result<String> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key must not be empty".into()));
    }

    let encoded = urlencoding::encode(key);
    let segment = match encoded.strip_prefix('.') {
        Some(rest) => format!("{ESCAPED_DOT}{rest}"),
        None => encoded.into_owned(),
    };

    if segment.len() > MAX_SEGMENT_LEN {
        return Ok(hashed_segment(key));
    }
    Ok(segment)
}

fn hashed_segment(key: &str) -> String {
    format!("{HASHED_PREFIX}{}", hex::encode(Sha256::digest(key.as_bytes())))
}

// == Decode ==
/// Inverse of [`encode_key`]. Returns `None` for hashed names and for names
/// this module could not have produced (temp files, foreign files, invalid
/// escapes).
pub fn decode_key(segment: &str) -> Option<String> {
    if segment.is_empty() || is_reserved_name(segment) || is_hashed_name(segment) {
        return None;
    }
    let key = urlencoding::decode(segment).ok()?.into_owned();
    // Reject names that decode but would re-encode differently
    match encode_key(&key) {
        Ok(canonical) if canonical == segment => Some(key),
        _ => None,
    }
}

/// Names starting with `.` are never produced by [`encode_key`].
pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with('.')
}

/// Names produced for keys too long to store readably.
pub fn is_hashed_name(name: &str) -> bool {
    name.starts_with(HASHED_PREFIX)
}

/// Hidden sibling a record is written to before being renamed into place.
pub(crate) fn temp_name(segment: &str) -> String {
    format!("{TEMP_PREFIX}{segment}{TEMP_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_keys_pass_through() {
        assert_eq!(encode_key("avatar_42").unwrap(), "avatar_42");
        assert_eq!(encode_key("photo.jpg").unwrap(), "photo.jpg");
    }

    #[test]
    fn test_separators_are_escaped() {
        let segment = encode_key("https://example.com/a/b.png?x=1").unwrap();
        assert!(!segment.contains('/'));
        assert!(!segment.contains(':'));
        assert!(!segment.contains('?'));
        assert_eq!(
            decode_key(&segment).as_deref(),
            Some("https://example.com/a/b.png?x=1")
        );
    }

    #[test]
    fn test_traversal_names_are_neutralised() {
        assert_eq!(encode_key(".").unwrap(), "%2E");
        assert_eq!(encode_key("..").unwrap(), "%2E.");
        assert_eq!(encode_key(".hidden").unwrap(), "%2Ehidden");
        assert_eq!(encode_key("../etc/passwd").unwrap(), "%2E.%2Fetc%2Fpasswd");
        assert_eq!(decode_key("%2E.").as_deref(), Some(".."));
    }

    #[test]
    fn test_percent_is_escaped() {
        // "%2E" as a literal key must not collide with "."
        let literal = encode_key("%2E").unwrap();
        assert_eq!(literal, "%252E");
        assert_ne!(literal, encode_key(".").unwrap());
        assert_eq!(decode_key(&literal).as_deref(), Some("%2E"));
    }

    #[test]
    fn test_unicode_roundtrip() {
        let segment = encode_key("снимок 📷").unwrap();
        assert!(segment.is_ascii());
        assert_eq!(decode_key(&segment).as_deref(), Some("снимок 📷"));
    }

    #[test]
    fn test_empty_key_is_invalid() {
        assert!(matches!(encode_key(""), Err(CacheError::InvalidKey(_))));
    }

    #[test]
    fn test_long_keys_get_hashed_names() {
        let longest = "a".repeat(MAX_SEGMENT_LEN);
        assert_eq!(encode_key(&longest).unwrap(), longest);

        let hashed = encode_key(&"a".repeat(MAX_SEGMENT_LEN + 1)).unwrap();
        assert!(is_hashed_name(&hashed));
        assert_eq!(hashed.len(), HASHED_PREFIX.len() + 64);
        assert_eq!(decode_key(&hashed), None);

        // 100 slashes triple in size once escaped
        let slashes = encode_key(&"/".repeat(100)).unwrap();
        assert!(is_hashed_name(&slashes));
        assert_ne!(slashes, encode_key(&"/".repeat(101)).unwrap());
        assert_eq!(slashes, encode_key(&"/".repeat(100)).unwrap());
    }

    #[test]
    fn test_temp_name_fits_for_every_segment() {
        let longest = encode_key(&"a".repeat(MAX_SEGMENT_LEN)).unwrap();
        assert_eq!(temp_name(&longest).len(), MAX_NAME_LEN);
        assert!(is_reserved_name(&temp_name(&longest)));

        let hashed = encode_key(&"a".repeat(4 * MAX_NAME_LEN)).unwrap();
        assert!(temp_name(&hashed).len() <= MAX_NAME_LEN);
    }

    #[test]
    fn test_readable_names_never_look_hashed() {
        assert_eq!(encode_key("%%").unwrap(), "%25%25");
        assert!(!is_hashed_name(&encode_key("%%abc").unwrap()));
    }

    #[test]
    fn test_decode_rejects_foreign_names() {
        assert_eq!(decode_key(".photo.jpg.part"), None);
        assert_eq!(decode_key(""), None);
        assert_eq!(decode_key("%FF"), None);
        // Decodes fine but is not the canonical encoding of "a b"
        assert_eq!(decode_key("a b"), None);
        assert_eq!(decode_key("%61"), None);
    }
}
