//! Value Codec
//!
//! Byte encodings used by adapters that persist entries outside the process.

use serde::{de::DeserializeOwned, Serialize};

use crate::cache::CacheValue;
use crate::error::{CacheError, Result};

/// Encodes any serializable item as self-describing JSON bytes.
pub fn encode<T: Serialize>(item: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(item).map_err(|e| CacheError::Serialization(e.to_string()))
}

/// Decodes bytes written by [`encode`].
///
/// Truncated or foreign data yields [`CacheError::CorruptEntry`].
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| CacheError::CorruptEntry(e.to_string()))
}

// == Wire Format ==
// Integers travel as plain decimal text so a backend's native counter
// commands operate on them directly. Everything else uses the tagged JSON
// form, which never parses as a bare integer.

/// Encodes a value for a networked backend.
pub fn encode_wire(value: &CacheValue) -> Result<Vec<u8>> {
    match value {
        CacheValue::Int(i) => Ok(i.to_string().into_bytes()),
        other => encode(other),
    }
}

/// Decodes a value read from a networked backend.
///
/// Data not written by this crate is surfaced as raw bytes.
pub fn decode_wire(data: &[u8]) -> CacheValue {
    if let Some(i) = std::str::from_utf8(data)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
    {
        return CacheValue::Int(i);
    }
    decode(data).unwrap_or_else(|_| CacheValue::Bytes(data.to_vec()))
}
