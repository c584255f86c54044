//! Codec Module
//!
//! Converts cached values to and from the bytes stored on disk. A codec is
//! chosen per cache instance at construction time.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CacheError, Result};

// == Codec Trait ==
/// Byte serialization for cached values.
///
/// Round-tripping must preserve value equality, otherwise a disk hit returns
/// something other than what was saved.
pub trait Codec<V>: Send + Sync + 'static {
    fn encode(&self, value: &V) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<V>;
}

// == Bincode ==
/// Compact binary encoding for any serde type. The default codec.
pub struct BincodeCodec<V>(PhantomData<fn() -> V>);

impl<V> BincodeCodec<V> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<V> Default for BincodeCodec<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for BincodeCodec<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BincodeCodec")
    }
}

impl<V> Codec<V> for BincodeCodec<V>
where
    V: Serialize + DeserializeOwned + 'static,
{
    fn encode(&self, value: &V) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| CacheError::EncodeFailed(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<V> {
        bincode::deserialize(bytes).map_err(|e| CacheError::DecodeFailed(e.to_string()))
    }
}

// == JSON ==
/// Human-readable JSON encoding for any serde type.
pub struct JsonCodec<V>(PhantomData<fn() -> V>);

impl<V> JsonCodec<V> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<V> Default for JsonCodec<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for JsonCodec<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<V> Codec<V> for JsonCodec<V>
where
    V: Serialize + DeserializeOwned + 'static,
{
    fn encode(&self, value: &V) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CacheError::EncodeFailed(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<V> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::DecodeFailed(e.to_string()))
    }
}

// == Raw Bytes ==
/// Stores `Vec<u8>` payloads verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawCodec;

impl Codec<Vec<u8>> for RawCodec {
    fn encode(&self, value: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

// == UTF-8 Strings ==
/// Stores strings as plain UTF-8 text.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8Codec;

impl Codec<String> for Utf8Codec {
    fn encode(&self, value: &String) -> Result<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec()).map_err(|e| CacheError::DecodeFailed(e.to_string()))
    }
}

// == Function Pair ==
type EncodeFn<V> = Box<dyn Fn(&V) -> Option<Vec<u8>> + Send + Sync>;
type DecodeFn<V> = Box<dyn Fn(&[u8]) -> Option<V> + Send + Sync>;

/// Caller-supplied encode/decode pair.
///
/// Used when a value type needs its own on-disk representation, e.g. a
/// multi-frame image that must not be flattened to a single frame.
pub struct FnCodec<V> {
    encode: EncodeFn<V>,
    decode: DecodeFn<V>,
}

impl<V> FnCodec<V> {
    pub fn new<E, D>(encode: E, decode: D) -> Self
    where
        E: Fn(&V) -> Option<Vec<u8>> + Send + Sync + 'static,
        D: Fn(&[u8]) -> Option<V> + Send + Sync + 'static,
    {
        Self {
            encode: Box::new(encode),
            decode: Box::new(decode),
        }
    }
}

impl<V> fmt::Debug for FnCodec<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnCodec")
    }
}

impl<V: 'static> Codec<V> for FnCodec<V> {
    fn encode(&self, value: &V) -> Result<Vec<u8>> {
        (self.encode)(value)
            .ok_or_else(|| CacheError::EncodeFailed("custom encoder returned nothing".into()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<V> {
        (self.decode)(bytes)
            .ok_or_else(|| CacheError::DecodeFailed("custom decoder returned nothing".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Thumbnail {
        width: u32,
        height: u32,
        frames: Vec<Vec<u8>>,
    }

    fn sample() -> Thumbnail {
        Thumbnail {
            width: 64,
            height: 48,
            frames: vec![vec![1, 2, 3], vec![4, 5]],
        }
    }

    #[test]
    fn test_bincode_roundtrip() {
        let codec = BincodeCodec::<Thumbnail>::new();
        let bytes = codec.encode(&sample()).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_bincode_rejects_truncated_input() {
        let codec = BincodeCodec::<Thumbnail>::new();
        let bytes = codec.encode(&sample()).unwrap();
        let result = codec.decode(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(CacheError::DecodeFailed(_))));
    }

    #[test]
    fn test_json_is_readable() {
        let codec = JsonCodec::<Thumbnail>::new();
        let bytes = codec.encode(&sample()).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"width\":64"));
        assert_eq!(codec.decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_raw_is_passthrough() {
        let payload = vec![0u8, 255, 7];
        assert_eq!(RawCodec.encode(&payload).unwrap(), payload);
        assert_eq!(RawCodec.decode(&payload).unwrap(), payload);
    }

    #[test]
    fn test_utf8_rejects_invalid_bytes() {
        assert_eq!(Utf8Codec.encode(&"héllo".to_string()).unwrap(), "héllo".as_bytes());
        assert!(matches!(
            Utf8Codec.decode(&[0xff, 0xfe]),
            Err(CacheError::DecodeFailed(_))
        ));
    }

    #[test]
    fn test_fn_codec_maps_none_to_errors() {
        let codec = FnCodec::new(
            |v: &u32| (*v != 0).then(|| v.to_be_bytes().to_vec()),
            |b: &[u8]| <[u8; 4]>::try_from(b).ok().map(u32::from_be_bytes),
        );

        assert_eq!(codec.decode(&codec.encode(&42).unwrap()).unwrap(), 42);
        assert!(matches!(codec.encode(&0), Err(CacheError::EncodeFailed(_))));
        assert!(matches!(codec.decode(&[1]), Err(CacheError::DecodeFailed(_))));
    }
}
