//! CBOR encoding and decoding for CTAP messages using cbor4ii
//!
//! CTAP2 requests and responses are CBOR maps keyed by small integers, with
//! nested maps keyed by text. Responses must use canonical key order: shorter
//! encodings first, so positive integer keys precede negative ones.

use crate::status::{Result, StatusCode};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Dynamic CBOR value
pub type Value = cbor4ii::core::Value;

/// Encode a value to CBOR bytes
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    cbor4ii::serde::to_writer(&mut buffer, value).map_err(|_| StatusCode::InvalidCbor)?;
    Ok(buffer)
}

/// Decode CBOR bytes to a value
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T> {
    cbor4ii::serde::from_slice(data).map_err(|_| StatusCode::InvalidCbor)
}

/// Decode a dynamic value into a typed one
pub fn from_value<T: for<'de> Deserialize<'de>>(value: &Value) -> Result<T> {
    decode(&encode(value)?)
}

/// Append a CBOR head (major type plus argument) in its shortest form
fn write_head(out: &mut Vec<u8>, major: u8, arg: u64) {
    let major = major << 5;
    match arg {
        0..=23 => out.push(major | arg as u8),
        24..=0xff => out.extend_from_slice(&[major | 24, arg as u8]),
        0x100..=0xffff => {
            out.push(major | 25);
            out.extend_from_slice(&(arg as u16).to_be_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(major | 26);
            out.extend_from_slice(&(arg as u32).to_be_bytes());
        }
        _ => {
            out.push(major | 27);
            out.extend_from_slice(&arg.to_be_bytes());
        }
    }
}

fn write_int(out: &mut Vec<u8>, value: i64) {
    if value >= 0 {
        write_head(out, 0, value as u64);
    } else {
        write_head(out, 1, (-1 - value) as u64);
    }
}

/// i32 ordered the way its CBOR encoding sorts
///
/// Non-negative keys come first in ascending order, then negative keys in
/// descending order (-1 encodes as 0x20, -2 as 0x21).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CborOrderedI32(i32);

impl PartialOrd for CborOrderedI32 {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CborOrderedI32 {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        use core::cmp::Ordering;

        match (self.0 >= 0, other.0 >= 0) {
            (true, true) => self.0.cmp(&other.0),
            (false, false) => other.0.cmp(&self.0),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
        }
    }
}

/// Builder for integer-keyed CBOR maps in canonical order
#[derive(Debug, Default)]
pub struct MapBuilder {
    entries: BTreeMap<CborOrderedI32, Vec<u8>>,
}

impl MapBuilder {
    /// Create a new map builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an integer key and serializable value
    pub fn insert<T: Serialize>(self, key: i32, value: T) -> Result<Self> {
        let encoded = encode(&value)?;
        Ok(self.insert_raw(key, encoded))
    }

    /// Insert an optional value (only if Some)
    pub fn insert_opt<T: Serialize>(self, key: i32, value: Option<T>) -> Result<Self> {
        match value {
            Some(v) => self.insert(key, v),
            None => Ok(self),
        }
    }

    /// Insert a CBOR byte string
    pub fn insert_bytes(self, key: i32, bytes: &[u8]) -> Result<Self> {
        self.insert(key, serde_bytes::Bytes::new(bytes))
    }

    /// Insert a value that is already CBOR encoded
    pub fn insert_raw(mut self, key: i32, encoded: Vec<u8>) -> Self {
        self.entries.insert(CborOrderedI32(key), encoded);
        self
    }

    /// Encode the map
    pub fn build(self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        write_head(&mut out, 5, self.entries.len() as u64);
        for (key, value) in self.entries {
            write_int(&mut out, key.0 as i64);
            out.extend_from_slice(&value);
        }
        Ok(out)
    }

    /// Encode the map and decode it back into a dynamic value for nesting
    pub fn build_value(self) -> Result<Value> {
        decode(&self.build()?)
    }
}

/// Look up a text key in a decoded CBOR map
pub fn map_get<'a>(entries: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    entries.iter().find_map(|(k, v)| match k {
        Value::Text(text) if text == key => Some(v),
        _ => None,
    })
}

/// Look up an integer key in a decoded CBOR map
pub fn map_get_int(entries: &[(Value, Value)], key: i64) -> Option<&Value> {
    entries.iter().find_map(|(k, v)| match k {
        Value::Integer(i) if *i == key as i128 => Some(v),
        _ => None,
    })
}

/// Borrow the entries of a map value
pub fn as_map(value: &Value) -> Result<&[(Value, Value)]> {
    match value {
        Value::Map(entries) => Ok(entries),
        _ => Err(StatusCode::CborUnexpectedType),
    }
}

/// Borrow a text value
pub fn as_text(value: &Value) -> Result<&str> {
    match value {
        Value::Text(text) => Ok(text),
        _ => Err(StatusCode::CborUnexpectedType),
    }
}

/// Borrow a byte string value
pub fn as_bytes(value: &Value) -> Result<&[u8]> {
    match value {
        Value::Bytes(bytes) => Ok(bytes),
        _ => Err(StatusCode::CborUnexpectedType),
    }
}

/// Read a boolean value
pub fn as_bool(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        _ => Err(StatusCode::CborUnexpectedType),
    }
}

/// Read an integer value that fits in i64
pub fn as_int(value: &Value) -> Result<i64> {
    match value {
        Value::Integer(i) => i64::try_from(*i).map_err(|_| StatusCode::CborUnexpectedType),
        _ => Err(StatusCode::CborUnexpectedType),
    }
}

/// Parsed integer-keyed request map
#[derive(Debug)]
pub struct MapParser {
    map: BTreeMap<i32, Value>,
}

impl MapParser {
    /// Parse from CBOR bytes; anything but an integer-keyed map is `InvalidCbor`
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let map: BTreeMap<i32, Value> = decode(data)?;
        Ok(Self { map })
    }

    /// Get a required value by key
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: i32) -> Result<T> {
        let value = self.map.get(&key).ok_or(StatusCode::MissingParameter)?;
        from_value(value).map_err(|_| StatusCode::CborUnexpectedType)
    }

    /// Get an optional value by key
    pub fn get_opt<T: for<'de> Deserialize<'de>>(&self, key: i32) -> Result<Option<T>> {
        match self.map.get(&key) {
            Some(value) => from_value(value)
                .map(Some)
                .map_err(|_| StatusCode::CborUnexpectedType),
            None => Ok(None),
        }
    }

    /// Check if a key exists
    pub fn contains_key(&self, key: i32) -> bool {
        self.map.contains_key(&key)
    }

    /// Borrow the dynamic value under a key
    pub fn get_raw(&self, key: i32) -> Option<&Value> {
        self.map.get(&key)
    }

    /// Get a required byte string
    pub fn get_bytes(&self, key: i32) -> Result<Vec<u8>> {
        let value = self.map.get(&key).ok_or(StatusCode::MissingParameter)?;
        as_bytes(value).map(<[u8]>::to_vec)
    }

    /// Get an optional byte string
    pub fn get_bytes_opt(&self, key: i32) -> Result<Option<Vec<u8>>> {
        self.map
            .get(&key)
            .map(|value| as_bytes(value).map(<[u8]>::to_vec))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_string() {
        let encoded = encode(&"Hello, CTAP!").unwrap();
        let decoded: String = decode(&encoded).unwrap();
        assert_eq!(decoded, "Hello, CTAP!");
    }

    #[test]
    fn test_head_encoding() {
        let mut out = Vec::new();
        write_int(&mut out, 10);
        write_int(&mut out, 24);
        write_int(&mut out, 4096);
        write_int(&mut out, -1);
        write_int(&mut out, -25);
        assert_eq!(
            out,
            vec![0x0a, 0x18, 0x18, 0x19, 0x10, 0x00, 0x20, 0x38, 0x18]
        );
    }

    #[test]
    fn test_map_builder() {
        let cbor = MapBuilder::new()
            .insert(1, "test")
            .unwrap()
            .insert(2, 42i32)
            .unwrap()
            .insert_bytes(3, &[1, 2, 3])
            .unwrap()
            .build()
            .unwrap();

        let parser = MapParser::from_bytes(&cbor).unwrap();
        let s: String = parser.get(1).unwrap();
        let i: i32 = parser.get(2).unwrap();

        assert_eq!(s, "test");
        assert_eq!(i, 42);
        assert_eq!(parser.get_bytes(3).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_map_builder_optional() {
        let cbor = MapBuilder::new()
            .insert(1, "required")
            .unwrap()
            .insert_opt(2, Some(42i32))
            .unwrap()
            .insert_opt::<i32>(3, None)
            .unwrap()
            .build()
            .unwrap();

        let parser = MapParser::from_bytes(&cbor).unwrap();
        assert!(parser.contains_key(1));
        assert!(parser.contains_key(2));
        assert!(!parser.contains_key(3));
    }

    #[test]
    fn test_map_parser_missing_key() {
        let cbor = MapBuilder::new().insert(1, "test").unwrap().build().unwrap();

        let parser = MapParser::from_bytes(&cbor).unwrap();
        let result: Result<String> = parser.get(99);
        assert_eq!(result.unwrap_err(), StatusCode::MissingParameter);
        assert_eq!(parser.get_bytes_opt(99).unwrap(), None);
    }

    #[test]
    fn test_map_parser_wrong_type() {
        let cbor = MapBuilder::new().insert(1, "text").unwrap().build().unwrap();

        let parser = MapParser::from_bytes(&cbor).unwrap();
        assert_eq!(
            parser.get_bytes(1).unwrap_err(),
            StatusCode::CborUnexpectedType
        );
    }

    #[test]
    fn test_map_parser_rejects_non_map() {
        let array = encode(&vec![1, 2, 3]).unwrap();
        assert_eq!(
            MapParser::from_bytes(&array).unwrap_err(),
            StatusCode::InvalidCbor
        );
        assert_eq!(
            MapParser::from_bytes(&[0xff, 0xff]).unwrap_err(),
            StatusCode::InvalidCbor
        );
    }

    #[test]
    fn test_canonical_key_order() {
        let cbor = MapBuilder::new()
            .insert(-3, 0)
            .unwrap()
            .insert(-1, 0)
            .unwrap()
            .insert(3, 0)
            .unwrap()
            .insert(1, 0)
            .unwrap()
            .insert(-2, 0)
            .unwrap()
            .build()
            .unwrap();

        // Keys 1, 3, -1, -2, -3 each followed by the value 0
        assert_eq!(
            cbor,
            vec![0xa5, 0x01, 0x00, 0x03, 0x00, 0x20, 0x00, 0x21, 0x00, 0x22, 0x00]
        );
    }

    #[test]
    fn test_text_key_lookup() {
        let value = Value::Map(vec![
            (Value::Text("id".into()), Value::Text("example.com".into())),
            (Value::Integer(3), Value::Bool(true)),
        ]);
        let entries = as_map(&value).unwrap();

        assert_eq!(as_text(map_get(entries, "id").unwrap()).unwrap(), "example.com");
        assert!(as_bool(map_get_int(entries, 3).unwrap()).unwrap());
        assert!(map_get(entries, "name").is_none());
    }
}
