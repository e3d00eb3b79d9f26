//! Reader for collated keys.

use crate::encoder::{
    decode_number, STRING_ESCAPE, TAG_ARRAY, TAG_END, TAG_FALSE, TAG_MAP, TAG_NULL, TAG_NUMBER,
    TAG_STRING, TAG_TRUE,
};
use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// The kind of the next item in a collated key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTag {
    /// End of the current array or map.
    EndSequence,
    /// Null.
    Null,
    /// Boolean false.
    False,
    /// Boolean true.
    True,
    /// Number.
    Number,
    /// String.
    String,
    /// Start of an array.
    Array,
    /// Start of a map.
    Map,
}

impl KeyTag {
    fn from_byte(tag: u8, offset: usize) -> CodecResult<Self> {
        Ok(match tag {
            TAG_END => KeyTag::EndSequence,
            TAG_NULL => KeyTag::Null,
            TAG_FALSE => KeyTag::False,
            TAG_TRUE => KeyTag::True,
            TAG_NUMBER => KeyTag::Number,
            TAG_STRING => KeyTag::String,
            TAG_ARRAY => KeyTag::Array,
            TAG_MAP => KeyTag::Map,
            _ => return Err(CodecError::InvalidTag { tag, offset }),
        })
    }
}

/// Deepest array/map nesting a [`KeyReader`] accepts.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Sequential reader over the bytes of a collated key.
#[derive(Debug, Clone)]
pub struct KeyReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> KeyReader<'a> {
    /// Create a reader over encoded key bytes.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            depth: 0,
        }
    }

    /// Returns true once every byte has been consumed.
    pub fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Returns the kind of the next item without consuming it.
    ///
    /// # Errors
    ///
    /// Returns an error at end of input or on an unknown tag.
    pub fn peek_tag(&self) -> CodecResult<KeyTag> {
        let tag = *self.bytes.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        KeyTag::from_byte(tag, self.pos)
    }

    /// Reads the next complete value.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are truncated or malformed.
    pub fn read_value(&mut self) -> CodecResult<Value> {
        match self.peek_tag()? {
            KeyTag::EndSequence => Err(CodecError::InvalidTag {
                tag: TAG_END,
                offset: self.pos,
            }),
            KeyTag::Null => {
                self.pos += 1;
                Ok(Value::Null)
            }
            KeyTag::False | KeyTag::True => self.read_bool().map(Value::Bool),
            KeyTag::Number => self.read_number().map(Value::Number),
            KeyTag::String => self.read_string().map(Value::Text),
            KeyTag::Array => {
                self.enter_sequence()?;
                let mut items = Vec::new();
                while !self.exit_sequence()? {
                    items.push(self.read_value()?);
                }
                Ok(Value::Array(items))
            }
            KeyTag::Map => {
                self.enter_sequence()?;
                let mut pairs = Vec::new();
                while !self.exit_sequence()? {
                    let key = self.read_value()?;
                    let value = self.read_value()?;
                    pairs.push((key, value));
                }
                Ok(Value::Map(pairs))
            }
        }
    }

    /// Reads a boolean.
    ///
    /// # Errors
    ///
    /// Returns an error if the next item is not a boolean.
    pub fn read_bool(&mut self) -> CodecResult<bool> {
        let value = match self.peek_tag()? {
            KeyTag::True => true,
            KeyTag::False => false,
            _ => return Err(self.invalid_here()),
        };
        self.pos += 1;
        Ok(value)
    }

    /// Reads a number.
    ///
    /// # Errors
    ///
    /// Returns an error if the next item is not a complete number.
    pub fn read_number(&mut self) -> CodecResult<f64> {
        if self.peek_tag()? != KeyTag::Number {
            return Err(self.invalid_here());
        }
        let start = self.pos + 1;
        let raw: [u8; 8] = self
            .bytes
            .get(start..start + 8)
            .and_then(|s| s.try_into().ok())
            .ok_or(CodecError::UnexpectedEof)?;
        self.pos = start + 8;
        Ok(decode_number(u64::from_be_bytes(raw)))
    }

    /// Reads a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the next item is not a terminated UTF-8 string.
    pub fn read_string(&mut self) -> CodecResult<String> {
        if self.peek_tag()? != KeyTag::String {
            return Err(self.invalid_here());
        }
        let mut pos = self.pos + 1;
        let mut out = Vec::new();
        loop {
            let b = *self.bytes.get(pos).ok_or(CodecError::UnexpectedEof)?;
            pos += 1;
            if b != 0 {
                out.push(b);
                continue;
            }
            if self.bytes.get(pos) == Some(&STRING_ESCAPE) {
                out.push(0);
                pos += 1;
            } else {
                break;
            }
        }
        self.pos = pos;
        String::from_utf8(out).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Consumes the tag opening an array or map.
    ///
    /// # Errors
    ///
    /// Returns an error if the next item is not an array or map, or if it
    /// would nest deeper than [`MAX_NESTING_DEPTH`].
    pub fn enter_sequence(&mut self) -> CodecResult<()> {
        match self.peek_tag()? {
            KeyTag::Array | KeyTag::Map => {
                if self.depth >= MAX_NESTING_DEPTH {
                    return Err(CodecError::NestingTooDeep {
                        limit: MAX_NESTING_DEPTH,
                    });
                }
                self.depth += 1;
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.invalid_here()),
        }
    }

    /// Consumes the end marker if it is next. Returns whether it was.
    ///
    /// # Errors
    ///
    /// Returns an error at end of input or on an unknown tag.
    pub fn exit_sequence(&mut self) -> CodecResult<bool> {
        if self.peek_tag()? == KeyTag::EndSequence {
            self.pos += 1;
            self.depth = self.depth.saturating_sub(1);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn invalid_here(&self) -> CodecError {
        CodecError::InvalidTag {
            tag: self.bytes[self.pos],
            offset: self.pos,
        }
    }
}

/// Decodes every top-level value in a key.
///
/// # Errors
///
/// Returns an error if the bytes are truncated or malformed.
pub fn decode_key(bytes: &[u8]) -> CodecResult<Vec<Value>> {
    let mut reader = KeyReader::new(bytes);
    let mut values = Vec::new();
    while !reader.at_end() {
        values.push(reader.read_value()?);
    }
    Ok(values)
}

/// Renders encoded key bytes as JSON text.
///
/// A key holding several top-level values renders them comma-separated.
///
/// # Errors
///
/// Returns an error if the bytes are truncated or malformed.
pub fn to_json(bytes: &[u8]) -> CodecResult<String> {
    let parts: Vec<String> = decode_key(bytes)?
        .iter()
        .map(|v| v.to_json().to_string())
        .collect();
    Ok(parts.join(","))
}
