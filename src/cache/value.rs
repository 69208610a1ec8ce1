//! Cache Value Module
//!
//! The typed payload stored under a key, plus the string/number/bool views
//! callers use to read it back.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Cache Value ==
/// A value held by any cache adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum CacheValue {
    /// UTF-8 text
    Str(String),
    /// Signed integer, usable as a counter
    Int(i64),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Any serde-serializable structure
    Json(serde_json::Value),
}

impl CacheValue {
    // == Structured Values ==
    /// Wraps any serializable value as a JSON payload.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(CacheValue::Json)
            .map_err(|e| CacheError::Serialization(e.to_string()))
    }

    /// Deserializes the payload into `T`.
    ///
    /// Scalar variants are first lifted to their JSON form, so a stored
    /// `Int(3)` can be read back as `u8` and a `Str` as `String`.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_json()).map_err(|e| CacheError::Type(e.to_string()))
    }

    // == JSON Mapping ==
    /// Converts an arbitrary JSON value, keeping integers and strings as
    /// their scalar variants.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => CacheValue::Str(s),
            serde_json::Value::Number(n) if n.is_i64() => match n.as_i64() {
                Some(i) => CacheValue::Int(i),
                None => CacheValue::Json(serde_json::Value::Number(n)),
            },
            other => CacheValue::Json(other),
        }
    }

    /// Renders the value as JSON. Bytes that are valid UTF-8 become a string.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CacheValue::Str(s) => serde_json::Value::String(s.clone()),
            CacheValue::Int(i) => serde_json::Value::from(*i),
            CacheValue::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => serde_json::Value::String(s.to_string()),
                Err(_) => serde_json::Value::from(b.clone()),
            },
            CacheValue::Json(v) => v.clone(),
        }
    }

    // == Views ==
    /// Returns the value as text.
    pub fn as_string(&self) -> String {
        match self {
            CacheValue::Str(s) => s.clone(),
            CacheValue::Int(i) => i.to_string(),
            CacheValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            CacheValue::Json(serde_json::Value::String(s)) => s.clone(),
            CacheValue::Json(v) => v.to_string(),
        }
    }

    /// Returns the value as an integer if it is one or parses as one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CacheValue::Int(i) => Some(*i),
            CacheValue::Json(v) => v.as_i64(),
            _ => self.as_string().trim().parse().ok(),
        }
    }

    /// Returns the value as a float if it is numeric or parses as one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CacheValue::Int(i) => Some(*i as f64),
            CacheValue::Json(v) if v.is_number() => v.as_f64(),
            _ => self.as_string().trim().parse().ok(),
        }
    }

    /// Returns the value as a boolean (`true`/`false`/`1`/`0`).
    pub fn as_bool(&self) -> Option<bool> {
        if let CacheValue::Json(serde_json::Value::Bool(b)) = self {
            return Some(*b);
        }
        match self.as_string().trim() {
            "true" | "TRUE" | "True" | "1" | "t" | "T" => Some(true),
            "false" | "FALSE" | "False" | "0" | "f" | "F" => Some(false),
            _ => None,
        }
    }

    /// Returns the raw bytes of a bytes or string value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            CacheValue::Bytes(b) => Some(b),
            CacheValue::Str(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    // == Counter Arithmetic ==
    /// Adds `delta` to an integer-like value, keeping its variant.
    ///
    /// Fails with [`CacheError::Type`] when the value is not an integer or
    /// the result overflows.
    pub fn add(&self, delta: i64) -> Result<CacheValue> {
        let current = self
            .as_i64()
            .ok_or_else(|| CacheError::Type(format!("{} is not an integer", self.describe())))?;

        let next = current
            .checked_add(delta)
            .ok_or_else(|| CacheError::Type(format!("counter overflow at {}", current)))?;

        Ok(match self {
            CacheValue::Int(_) => CacheValue::Int(next),
            CacheValue::Str(_) => CacheValue::Str(next.to_string()),
            CacheValue::Bytes(_) => CacheValue::Bytes(next.to_string().into_bytes()),
            CacheValue::Json(_) => CacheValue::Json(serde_json::Value::from(next)),
        })
    }

    fn describe(&self) -> String {
        match self {
            CacheValue::Str(s) => format!("string {:?}", s),
            CacheValue::Int(i) => format!("integer {}", i),
            CacheValue::Bytes(b) => format!("{} bytes", b.len()),
            CacheValue::Json(v) => format!("json {}", v),
        }
    }
}

// == Conversions ==
impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        CacheValue::Str(value)
    }
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        CacheValue::Str(value.to_string())
    }
}

impl From<i64> for CacheValue {
    fn from(value: i64) -> Self {
        CacheValue::Int(value)
    }
}

impl From<i32> for CacheValue {
    fn from(value: i32) -> Self {
        CacheValue::Int(value as i64)
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(value: Vec<u8>) -> Self {
        CacheValue::Bytes(value)
    }
}

impl From<serde_json::Value> for CacheValue {
    fn from(value: serde_json::Value) -> Self {
        CacheValue::from_json(value)
    }
}
