//! Order-preserving key encoder.
//!
//! ## Layout
//!
//! Every value starts with a one-byte tag. Tags are chosen so that the
//! cross-kind order falls out of the first byte:
//!
//! | tag  | kind    | payload                                          |
//! |------|---------|--------------------------------------------------|
//! | 0x00 | end     | closes an array or map                           |
//! | 0x01 | null    | none                                             |
//! | 0x02 | false   | none                                             |
//! | 0x03 | true    | none                                             |
//! | 0x04 | number  | 8 bytes, IEEE-754 bits with sign-flip transform  |
//! | 0x05 | string  | UTF-8 bytes, `0x00` escaped as `0x00 0xFF`, then `0x00` |
//! | 0x06 | array   | encoded elements, then `0x00`                    |
//! | 0x07 | map     | encoded key/value pairs sorted by key, then `0x00` |
//!
//! Every encoding is self-delimiting, so a concatenation of encodings compares
//! element by element. The end marker is lower than every tag, which makes a
//! shorter array sort before any longer array it prefixes.

use crate::error::{CodecError, CodecResult};
use crate::key::CollatedKey;
use crate::value::Value;

pub(crate) const TAG_END: u8 = 0x00;
pub(crate) const TAG_NULL: u8 = 0x01;
pub(crate) const TAG_FALSE: u8 = 0x02;
pub(crate) const TAG_TRUE: u8 = 0x03;
pub(crate) const TAG_NUMBER: u8 = 0x04;
pub(crate) const TAG_STRING: u8 = 0x05;
pub(crate) const TAG_ARRAY: u8 = 0x06;
pub(crate) const TAG_MAP: u8 = 0x07;

/// Escape byte following an embedded `0x00` inside a string.
pub(crate) const STRING_ESCAPE: u8 = 0xFF;

/// Encode a single value into a collated key.
///
/// # Errors
///
/// Returns an error if the value contains NaN or a map with duplicate keys.
pub fn encode_key(value: &Value) -> CodecResult<CollatedKey> {
    let mut builder = KeyBuilder::new();
    builder.add_value(value)?;
    builder.build()
}

/// Encode a compound key such as `[type, field, doc_id]`.
///
/// The parts are encoded as one array, so the compound key orders by its
/// first part, then its second, and so on.
///
/// # Errors
///
/// Returns an error if any part cannot be encoded.
pub fn encode_compound(parts: &[Value]) -> CodecResult<CollatedKey> {
    let mut builder = KeyBuilder::new();
    builder.begin_array();
    for part in parts {
        builder.add_value(part)?;
    }
    builder.end_array()?;
    builder.build()
}

/// An open container in a [`KeyBuilder`].
#[derive(Debug)]
enum Frame {
    Array(Vec<u8>),
    Map {
        entries: Vec<(Vec<u8>, Vec<u8>)>,
        pending_key: Option<Vec<u8>>,
    },
}

/// Incremental builder for collated keys.
///
/// Values are appended in order; `begin_array`/`end_array` and
/// `begin_map`/`end_map` bracket containers. Inside a map, appended items
/// alternate between key and value. Map entries are buffered and written in
/// key order when the map is closed.
///
/// ```
/// use arbordb_codec::KeyBuilder;
///
/// let mut builder = KeyBuilder::new();
/// builder.begin_array();
/// builder.add_string("user").add_number(7.0).unwrap();
/// builder.end_array().unwrap();
/// let key = builder.build().unwrap();
/// assert_eq!(key.to_json().unwrap(), r#"["user",7]"#);
/// ```
#[derive(Debug, Default)]
pub struct KeyBuilder {
    root: Vec<u8>,
    stack: Vec<Frame>,
}

impl KeyBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder whose buffer starts with already-encoded bytes.
    ///
    /// The bytes are taken verbatim and are not validated.
    pub fn from_encoded(bytes: &[u8]) -> Self {
        Self {
            root: bytes.to_vec(),
            stack: Vec::new(),
        }
    }

    /// Returns the current nesting depth.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Append null.
    pub fn add_null(&mut self) -> &mut Self {
        self.emit(vec![TAG_NULL]);
        self
    }

    /// Append a boolean.
    pub fn add_bool(&mut self, value: bool) -> &mut Self {
        self.emit(vec![if value { TAG_TRUE } else { TAG_FALSE }]);
        self
    }

    /// Append a number.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::NaNForbidden`] for NaN.
    pub fn add_number(&mut self, value: f64) -> CodecResult<&mut Self> {
        let bytes = encode_number(value)?;
        self.emit(bytes);
        Ok(self)
    }

    /// Append a string.
    pub fn add_string(&mut self, value: &str) -> &mut Self {
        self.emit(encode_string(value));
        self
    }

    /// Append an already-encoded key verbatim.
    pub fn add_encoded(&mut self, key: &CollatedKey) -> &mut Self {
        self.emit(key.as_bytes().to_vec());
        self
    }

    /// Append an arbitrary value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value contains NaN or a map with duplicate keys.
    pub fn add_value(&mut self, value: &Value) -> CodecResult<&mut Self> {
        match value {
            Value::Null => {
                self.add_null();
            }
            Value::Bool(b) => {
                self.add_bool(*b);
            }
            Value::Number(n) => {
                self.add_number(*n)?;
            }
            Value::Text(s) => {
                self.add_string(s);
            }
            Value::Array(items) => {
                self.begin_array();
                for item in items {
                    self.add_value(item)?;
                }
                self.end_array()?;
            }
            Value::Map(pairs) => {
                self.begin_map();
                for (k, v) in pairs {
                    self.add_value(k)?;
                    self.add_value(v)?;
                }
                self.end_map()?;
            }
        }
        Ok(self)
    }

    /// Open an array.
    pub fn begin_array(&mut self) -> &mut Self {
        self.stack.push(Frame::Array(vec![TAG_ARRAY]));
        self
    }

    /// Close the innermost array.
    ///
    /// # Errors
    ///
    /// Returns an error if the innermost open container is not an array.
    pub fn end_array(&mut self) -> CodecResult<&mut Self> {
        match self.stack.pop() {
            Some(Frame::Array(mut bytes)) => {
                bytes.push(TAG_END);
                self.emit(bytes);
                Ok(self)
            }
            Some(frame) => {
                self.stack.push(frame);
                Err(CodecError::unbalanced("end_array inside a map"))
            }
            None => Err(CodecError::unbalanced("end_array without begin_array")),
        }
    }

    /// Open a map.
    pub fn begin_map(&mut self) -> &mut Self {
        self.stack.push(Frame::Map {
            entries: Vec::new(),
            pending_key: None,
        });
        self
    }

    /// Close the innermost map, writing its entries in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the innermost container is not a map, if a key has
    /// no value, or if two entries share a key.
    pub fn end_map(&mut self) -> CodecResult<&mut Self> {
        match self.stack.pop() {
            Some(Frame::Map {
                mut entries,
                pending_key: None,
            }) => {
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                if entries.windows(2).any(|w| w[0].0 == w[1].0) {
                    return Err(CodecError::DuplicateMapKey);
                }
                let mut bytes = vec![TAG_MAP];
                for (k, v) in entries {
                    bytes.extend_from_slice(&k);
                    bytes.extend_from_slice(&v);
                }
                bytes.push(TAG_END);
                self.emit(bytes);
                Ok(self)
            }
            Some(frame @ Frame::Map { .. }) => {
                self.stack.push(frame);
                Err(CodecError::unbalanced("map key has no value"))
            }
            Some(frame) => {
                self.stack.push(frame);
                Err(CodecError::unbalanced("end_map inside an array"))
            }
            None => Err(CodecError::unbalanced("end_map without begin_map")),
        }
    }

    /// Finish building and return the key.
    ///
    /// # Errors
    ///
    /// Returns an error if any container is still open.
    pub fn build(self) -> CodecResult<CollatedKey> {
        if !self.stack.is_empty() {
            return Err(CodecError::unbalanced(format!(
                "{} container(s) still open",
                self.stack.len()
            )));
        }
        Ok(CollatedKey::from_raw(self.root))
    }

    /// Returns the bytes written at the top level so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.root
    }

    fn emit(&mut self, bytes: Vec<u8>) {
        match self.stack.last_mut() {
            None => self.root.extend_from_slice(&bytes),
            Some(Frame::Array(buf)) => buf.extend_from_slice(&bytes),
            Some(Frame::Map {
                entries,
                pending_key,
            }) => match pending_key.take() {
                None => *pending_key = Some(bytes),
                Some(key) => entries.push((key, bytes)),
            },
        }
    }
}

/// Encodes a number so that byte order equals numeric order.
///
/// Positive numbers get their sign bit set; negative numbers have every bit
/// inverted, which reverses their magnitude order and puts them below zero.
fn encode_number(value: f64) -> CodecResult<Vec<u8>> {
    if value.is_nan() {
        return Err(CodecError::NaNForbidden);
    }
    // Fold -0.0 into 0.0
    let value = if value == 0.0 { 0.0 } else { value };
    let bits = value.to_bits();
    let ordered = if bits >> 63 == 1 {
        !bits
    } else {
        bits | (1 << 63)
    };
    let mut bytes = Vec::with_capacity(9);
    bytes.push(TAG_NUMBER);
    bytes.extend_from_slice(&ordered.to_be_bytes());
    Ok(bytes)
}

pub(crate) fn decode_number(ordered: u64) -> f64 {
    let bits = if ordered >> 63 == 1 {
        ordered & !(1 << 63)
    } else {
        !ordered
    };
    f64::from_bits(bits)
}

fn encode_string(value: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(value.len() + 2);
    bytes.push(TAG_STRING);
    for &b in value.as_bytes() {
        bytes.push(b);
        if b == 0 {
            bytes.push(STRING_ESCAPE);
        }
    }
    bytes.push(TAG_END);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(value: impl Into<Value>) -> Vec<u8> {
        encode_key(&value.into()).unwrap().as_bytes().to_vec()
    }

    #[test]
    fn scalar_layout() {
        assert_eq!(enc(()), vec![TAG_NULL]);
        assert_eq!(enc(false), vec![TAG_FALSE]);
        assert_eq!(enc(true), vec![TAG_TRUE]);
        assert_eq!(enc("ab"), vec![TAG_STRING, b'a', b'b', TAG_END]);
    }

    #[test]
    fn embedded_nul_is_escaped() {
        assert_eq!(
            enc("a\0b"),
            vec![TAG_STRING, b'a', 0x00, STRING_ESCAPE, b'b', TAG_END]
        );
        assert!(enc("a") < enc("a\0"));
        assert!(enc("a\0") < enc("a\u{1}"));
    }

    #[test]
    fn numbers_sort_numerically() {
        let values = [f64::NEG_INFINITY, -1e10, -2.5, -1.0, 0.0, 1e-9, 1.0, 2.0, 1e300, f64::INFINITY];
        for pair in values.windows(2) {
            assert!(enc(pair[0]) < enc(pair[1]), "{} !< {}", pair[0], pair[1]);
        }
        assert_eq!(enc(-0.0), enc(0.0));
    }

    #[test]
    fn number_roundtrip_bits() {
        for n in [-3.75, 0.0, 12345.678, f64::MIN_POSITIVE] {
            let bytes = enc(n);
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[1..]);
            assert_eq!(decode_number(u64::from_be_bytes(raw)), n);
        }
    }

    #[test]
    fn nan_is_rejected() {
        assert_eq!(
            encode_key(&Value::Number(f64::NAN)),
            Err(CodecError::NaNForbidden)
        );
    }

    #[test]
    fn map_entries_written_in_key_order() {
        let mut builder = KeyBuilder::new();
        builder.begin_map();
        builder.add_string("b").add_null();
        builder.add_string("a").add_bool(true);
        builder.end_map().unwrap();
        let key = builder.build().unwrap();

        let sorted = encode_key(&Value::map(vec![
            (Value::from("a"), Value::Bool(true)),
            (Value::from("b"), Value::Null),
        ]))
        .unwrap();
        assert_eq!(key, sorted);
    }

    #[test]
    fn duplicate_map_key_is_rejected() {
        let mut builder = KeyBuilder::new();
        builder.begin_map();
        builder.add_string("k").add_null();
        builder.add_string("k").add_bool(false);
        assert_eq!(builder.end_map().unwrap_err(), CodecError::DuplicateMapKey);
    }

    #[test]
    fn unbalanced_builders_fail() {
        let mut builder = KeyBuilder::new();
        assert!(builder.end_array().is_err());
        assert!(builder.end_map().is_err());

        let mut builder = KeyBuilder::new();
        builder.begin_map();
        builder.add_string("key");
        assert!(builder.end_map().is_err());

        let mut builder = KeyBuilder::new();
        builder.begin_array();
        assert!(builder.end_map().is_err());
        assert_eq!(builder.depth(), 1);
        assert!(builder.build().is_err());
    }

    #[test]
    fn compound_key_orders_by_parts() {
        let a = encode_compound(&["post".into(), 1.into(), "doc-b".into()]).unwrap();
        let b = encode_compound(&["post".into(), 2.into(), "doc-a".into()]).unwrap();
        let c = encode_compound(&["user".into(), 0.into(), "doc-a".into()]).unwrap();
        assert!(a < b);
        assert!(b < c);
    }
}
