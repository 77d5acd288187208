//! Canonical JSON serialization for deterministic hashing.
//!
//! Every byte that reaches SHA-256 goes through this serializer. Canonical
//! JSON here means:
//!
//! - object keys sorted lexicographically (UTF-8 byte order), recursively
//! - no insignificant whitespace
//! - UTF-8 output
//! - sequences keep their declared order; callers serialize sets as sorted
//!   sequences before they get here
//! - `null` preserved for declared optional fields
//! - **integers only**; floats are rejected outright
//!
//! The float ban is what makes hashes byte-identical across hosts: float
//! stringification is the one part of JSON that implementations disagree on.
//! Every quantity Hardstop hashes is an integer (scores, counts, percent
//! values, millisecond durations) or a string.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors that can occur during canonical JSON serialization.
#[derive(Debug, Error)]
pub enum CanonicalJsonError {
    /// Serde JSON conversion failed.
    #[error("serde_json error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Float values are not allowed in canonical JSON. Use integers for all
    /// numeric values (millisecond durations, percent confidences, scores).
    #[error("float values are not allowed in canonical JSON (use integers)")]
    FloatNotAllowed,

    /// UTF-8 encoding error (should never happen with valid JSON).
    #[error("UTF-8 encoding error")]
    Utf8Error,
}

/// Serialize `value` into canonical JSON bytes.
///
/// # Errors
///
/// Returns [`CanonicalJsonError::Serde`] if serialization fails, or
/// [`CanonicalJsonError::FloatNotAllowed`] if the value contains floats.
#[must_use = "canonical bytes should be used for hashing"]
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalJsonError> {
    let v = serde_json::to_value(value)?;
    let mut out = Vec::<u8>::new();
    write_value(&v, &mut out)?;
    Ok(out)
}

/// Same as [`to_canonical_bytes`], but returns a UTF-8 String.
///
/// # Errors
///
/// Returns the same errors as [`to_canonical_bytes`], plus
/// [`CanonicalJsonError::Utf8Error`] if UTF-8 conversion fails.
#[must_use = "canonical string should be used for hashing"]
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String, CanonicalJsonError> {
    let bytes = to_canonical_bytes(value)?;
    String::from_utf8(bytes).map_err(|_| CanonicalJsonError::Utf8Error)
}

fn write_value(v: &Value, out: &mut Vec<u8>) -> Result<(), CanonicalJsonError> {
    match v {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => {
            use std::io::Write;
            if let Some(i) = n.as_i64() {
                write!(out, "{i}").map_err(|_| CanonicalJsonError::Utf8Error)?;
            } else if let Some(u) = n.as_u64() {
                write!(out, "{u}").map_err(|_| CanonicalJsonError::Utf8Error)?;
            } else {
                // serde_json::Number only stores a float when the value does
                // not fit i64/u64.
                return Err(CanonicalJsonError::FloatNotAllowed);
            }
        }
        Value::String(s) => {
            // serde_json's string writer: quotes + escaping, no whitespace.
            serde_json::to_writer(&mut *out, s)?;
        }
        Value::Array(arr) => {
            out.push(b'[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => write_object(map, out)?,
    }
    Ok(())
}

fn write_object(map: &Map<String, Value>, out: &mut Vec<u8>) -> Result<(), CanonicalJsonError> {
    out.push(b'{');

    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    for (i, k) in keys.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        serde_json::to_writer(&mut *out, *k)?;
        out.push(b':');
        if let Some(val) = map.get(*k) {
            write_value(val, out)?;
        }
    }

    out.push(b'}');
    Ok(())
}
