//! Canonical CBOR encoding for deterministic serialization.
//!
//! Implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! Op payloads and the dscache table are encoded through this module, so
//! the same value produces identical bytes (and identical hashes) on
//! every platform.

use ciborium::value::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Errors from canonical encoding and decoding.
#[derive(Debug, Error)]
pub enum CanonicalError {
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("decoding error: {0}")]
    Decoding(String),

    #[error("floats are not permitted in canonical encoding")]
    Float,

    #[error("unsupported CBOR value type")]
    Unsupported,
}

/// Encode any serde value to canonical CBOR bytes.
pub fn to_canonical_vec<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    let cbor = Value::serialized(value).map_err(|e| CanonicalError::Encoding(e.to_string()))?;
    encode_value_canonical(&cbor)
}

/// Decode canonical CBOR bytes back into a serde value.
pub fn from_canonical_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CanonicalError> {
    ciborium::from_reader(bytes).map_err(|e| CanonicalError::Decoding(e.to_string()))
}

/// Encode a CBOR Value to canonical bytes.
pub fn encode_value_canonical(value: &Value) -> Result<Vec<u8>, CanonicalError> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value)?;
    Ok(buf)
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<(), CanonicalError> {
    match value {
        Value::Integer(i) => {
            encode_integer(buf, *i);
            Ok(())
        }
        Value::Bytes(b) => {
            encode_bytes(buf, b);
            Ok(())
        }
        Value::Text(s) => {
            encode_text(buf, s);
            Ok(())
        }
        Value::Array(arr) => encode_array(buf, arr),
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => {
            buf.push(if *b { 0xf5 } else { 0xf4 });
            Ok(())
        }
        Value::Null => {
            buf.push(0xf6);
            Ok(())
        }
        Value::Float(_) => Err(CanonicalError::Float),
        _ => Err(CanonicalError::Unsupported),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffffffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) -> Result<(), CanonicalError> {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item)?;
    }
    Ok(())
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(
    buf: &mut Vec<u8>,
    entries: &[(Value, Value)],
) -> Result<(), CanonicalError> {
    let mut key_value_pairs: Vec<(Vec<u8>, &Value)> = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let mut key_buf = Vec::new();
        encode_value_to(&mut key_buf, k)?;
        key_value_pairs.push((key_buf, v));
    }

    // Lexicographic order of encoded key bytes
    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, key_value_pairs.len() as u64);
    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        size: i64,
        tags: Vec<String>,
    }

    #[test]
    fn test_canonical_deterministic() {
        let s = Sample {
            name: "world_bank".into(),
            size: 1234,
            tags: vec!["econ".into(), "gdp".into()],
        };
        let b1 = to_canonical_vec(&s).unwrap();
        let b2 = to_canonical_vec(&s).unwrap();
        assert_eq!(b1, b2);
    }

    #[test]
    fn test_canonical_roundtrip() {
        let s = Sample {
            name: "pop".into(),
            size: -7,
            tags: vec![],
        };
        let bytes = to_canonical_vec(&s).unwrap();
        let back: Sample = from_canonical_slice(&bytes).unwrap();
        assert_eq!(s, back);
    }

    #[test]
    fn test_integer_encoding() {
        let mut buf = Vec::new();

        // 0-23: single byte
        encode_uint(&mut buf, 0, 0);
        assert_eq!(buf, vec![0x00]);

        buf.clear();
        encode_uint(&mut buf, 0, 23);
        assert_eq!(buf, vec![0x17]);

        // 24-255: two bytes
        buf.clear();
        encode_uint(&mut buf, 0, 24);
        assert_eq!(buf, vec![0x18, 24]);

        // 256-65535: three bytes
        buf.clear();
        encode_uint(&mut buf, 0, 65535);
        assert_eq!(buf, vec![0x19, 0xff, 0xff]);
    }

    #[test]
    fn test_map_key_ordering() {
        let entries = vec![
            (Value::Integer(8.into()), Value::Integer(80.into())),
            (Value::Integer(0.into()), Value::Integer(0.into())),
            (Value::Integer(5.into()), Value::Integer(50.into())),
        ];
        let mut buf = Vec::new();
        encode_map_canonical(&mut buf, &entries).unwrap();

        // Map header (3 entries), then keys in order 0, 5, 8
        assert_eq!(buf[0], 0xa3);
        assert_eq!(buf[1], 0x00);
        assert_eq!(buf[3], 0x05);
        assert_eq!(buf[6], 0x08);
    }

    #[test]
    fn test_floats_rejected() {
        let v = Value::Float(1.5);
        assert!(matches!(
            encode_value_canonical(&v),
            Err(CanonicalError::Float)
        ));
    }

    #[test]
    fn test_negative_integer_encoding() {
        // -1 encodes as major type 1, value 0
        let mut buf = Vec::new();
        encode_integer(&mut buf, (-1i64).into());
        assert_eq!(buf, vec![0x20]);

        buf.clear();
        encode_integer(&mut buf, (-25i64).into());
        assert_eq!(buf, vec![0x38, 24]);
    }
}
