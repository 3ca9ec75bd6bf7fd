//! Bencode serialization (BEP-3).
//!
//! Content descriptors and assembled metadata blobs arrive bencoded.
//! This module provides a [`Value`] tree, a decoder with bounded nesting,
//! an encoder, and [`raw_entry`], which locates the exact byte span a
//! top-level dictionary entry occupies in the input. Fingerprints are
//! digests of that exact span, so the descriptor layer must never have
//! to re-serialize what a peer sent.

use bytes::Bytes;
use std::collections::BTreeMap;
use thiserror::Error;

const MAX_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum BencodeError {
    #[error("truncated input")]
    Truncated,

    #[error("malformed integer")]
    BadInteger,

    #[error("malformed string length")]
    BadLength,

    #[error("unexpected byte 0x{0:02x}")]
    Unexpected(u8),

    #[error("trailing bytes after value")]
    TrailingData,

    #[error("nesting deeper than {MAX_DEPTH} levels")]
    TooDeep,
}

/// A decoded bencode value.
///
/// Dictionary keys are byte strings and sort lexicographically, which is
/// also the canonical encoding order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    Bytes(Bytes),
    List(Vec<Value>),
    Dict(BTreeMap<Bytes, Value>),
}

impl Value {
    pub fn string(s: &str) -> Self {
        Value::Bytes(Bytes::copy_from_slice(s.as_bytes()))
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Bytes, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Dictionary lookup; `None` if this is not a dictionary or the key
    /// is absent.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.as_dict()?.get(key)
    }
}

/// Decodes a complete bencode value, rejecting trailing bytes.
pub fn decode(data: &[u8]) -> Result<Value, BencodeError> {
    let mut parser = Parser { data, pos: 0 };
    let value = parser.value(0)?;
    if parser.pos != data.len() {
        return Err(BencodeError::TrailingData);
    }
    Ok(value)
}

/// Encodes a value in canonical form.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Integer(i) => {
            out.push(b'i');
            out.extend_from_slice(i.to_string().as_bytes());
            out.push(b'e');
        }
        Value::Bytes(b) => {
            out.extend_from_slice(b.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(b);
        }
        Value::List(items) => {
            out.push(b'l');
            for item in items {
                encode_into(item, out);
            }
            out.push(b'e');
        }
        Value::Dict(map) => {
            out.push(b'd');
            for (key, val) in map {
                out.extend_from_slice(key.len().to_string().as_bytes());
                out.push(b':');
                out.extend_from_slice(key);
                encode_into(val, out);
            }
            out.push(b'e');
        }
    }
}

/// Returns the raw byte span of the value stored under `key` in a
/// top-level dictionary, without building a `Value` tree for the rest
/// of the input.
pub fn raw_entry<'a>(data: &'a [u8], key: &[u8]) -> Result<Option<&'a [u8]>, BencodeError> {
    let mut parser = Parser { data, pos: 0 };
    if parser.peek()? != b'd' {
        return Err(BencodeError::Unexpected(data[0]));
    }
    parser.pos += 1;

    while parser.peek()? != b'e' {
        let entry_key = parser.byte_string()?;
        let start = parser.pos;
        parser.skip_value(0)?;
        if entry_key == key {
            return Ok(Some(&data[start..parser.pos]));
        }
    }

    Ok(None)
}

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Result<u8, BencodeError> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(BencodeError::Truncated)
    }

    fn value(&mut self, depth: usize) -> Result<Value, BencodeError> {
        if depth > MAX_DEPTH {
            return Err(BencodeError::TooDeep);
        }

        match self.peek()? {
            b'i' => self.integer().map(Value::Integer),
            b'0'..=b'9' => self.byte_string().map(|b| Value::Bytes(Bytes::copy_from_slice(b))),
            b'l' => {
                self.pos += 1;
                let mut items = Vec::new();
                while self.peek()? != b'e' {
                    items.push(self.value(depth + 1)?);
                }
                self.pos += 1;
                Ok(Value::List(items))
            }
            b'd' => {
                self.pos += 1;
                let mut map = BTreeMap::new();
                while self.peek()? != b'e' {
                    let key = Bytes::copy_from_slice(self.byte_string()?);
                    let val = self.value(depth + 1)?;
                    map.insert(key, val);
                }
                self.pos += 1;
                Ok(Value::Dict(map))
            }
            other => Err(BencodeError::Unexpected(other)),
        }
    }

    /// Advances past one value without materializing it.
    fn skip_value(&mut self, depth: usize) -> Result<(), BencodeError> {
        if depth > MAX_DEPTH {
            return Err(BencodeError::TooDeep);
        }

        match self.peek()? {
            b'i' => {
                self.integer()?;
            }
            b'0'..=b'9' => {
                self.byte_string()?;
            }
            b'l' => {
                self.pos += 1;
                while self.peek()? != b'e' {
                    self.skip_value(depth + 1)?;
                }
                self.pos += 1;
            }
            b'd' => {
                self.pos += 1;
                while self.peek()? != b'e' {
                    self.byte_string()?;
                    self.skip_value(depth + 1)?;
                }
                self.pos += 1;
            }
            other => return Err(BencodeError::Unexpected(other)),
        }

        Ok(())
    }

    fn integer(&mut self) -> Result<i64, BencodeError> {
        self.pos += 1; // 'i'
        let start = self.pos;
        while self.peek()? != b'e' {
            self.pos += 1;
        }
        let digits = &self.data[start..self.pos];
        self.pos += 1; // 'e'
        parse_integer(digits)
    }

    fn byte_string(&mut self) -> Result<&'a [u8], BencodeError> {
        let start = self.pos;
        while self.peek()? != b':' {
            self.pos += 1;
        }
        let len = parse_length(&self.data[start..self.pos])?;
        self.pos += 1; // ':'

        if self.data.len() - self.pos < len {
            return Err(BencodeError::Truncated);
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }
}

fn parse_integer(digits: &[u8]) -> Result<i64, BencodeError> {
    if digits.is_empty() || digits == b"-" {
        return Err(BencodeError::BadInteger);
    }
    // Canonical form forbids leading zeros and negative zero.
    let magnitude = if digits[0] == b'-' { &digits[1..] } else { digits };
    if magnitude.len() > 1 && magnitude[0] == b'0' {
        return Err(BencodeError::BadInteger);
    }
    if digits == b"-0" {
        return Err(BencodeError::BadInteger);
    }

    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(BencodeError::BadInteger)
}

fn parse_length(digits: &[u8]) -> Result<usize, BencodeError> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(BencodeError::BadLength);
    }
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(BencodeError::BadLength)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_scalars() {
        assert_eq!(decode(b"i42e").unwrap().as_integer(), Some(42));
        assert_eq!(decode(b"i-7e").unwrap().as_integer(), Some(-7));
        assert_eq!(decode(b"i0e").unwrap().as_integer(), Some(0));
        assert_eq!(decode(b"4:spam").unwrap().as_str(), Some("spam"));
        assert_eq!(decode(b"0:").unwrap().as_bytes().unwrap().len(), 0);
    }

    #[test]
    fn decodes_nested_structures() {
        let value = decode(b"d4:infod6:lengthi1024e4:name4:a.oge3:numi2ee").unwrap();
        let info = value.get(b"info").unwrap();
        assert_eq!(info.get(b"length").and_then(Value::as_integer), Some(1024));
        assert_eq!(info.get(b"name").and_then(Value::as_str), Some("a.og"));
        assert_eq!(value.get(b"num").and_then(Value::as_integer), Some(2));

        let list = decode(b"l4:spami42ee").unwrap();
        assert_eq!(list.as_list().unwrap().len(), 2);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(decode(b"i42"), Err(BencodeError::Truncated)));
        assert!(matches!(decode(b"i042e"), Err(BencodeError::BadInteger)));
        assert!(matches!(decode(b"i-0e"), Err(BencodeError::BadInteger)));
        assert!(matches!(decode(b"ie"), Err(BencodeError::BadInteger)));
        assert!(matches!(decode(b"5:spam"), Err(BencodeError::Truncated)));
        assert!(matches!(decode(b"x"), Err(BencodeError::Unexpected(b'x'))));
        assert!(matches!(decode(b"i1ei2e"), Err(BencodeError::TrailingData)));
    }

    #[test]
    fn rejects_excessive_nesting() {
        let mut input = vec![b'l'; 80];
        input.extend(vec![b'e'; 80]);
        assert!(matches!(decode(&input), Err(BencodeError::TooDeep)));
    }

    #[test]
    fn encode_round_trips() {
        let inputs: &[&[u8]] = &[
            b"i42e",
            b"4:spam",
            b"l4:spami42ee",
            b"d3:bari1e3:foo3:baze",
        ];
        for input in inputs {
            let value = decode(input).unwrap();
            assert_eq!(encode(&value).as_slice(), *input);
        }
    }

    #[test]
    fn raw_entry_returns_exact_span() {
        let data = b"d8:announce3:url4:infod6:lengthi10e4:name1:fee";
        let info = raw_entry(data, b"info").unwrap().unwrap();
        assert_eq!(info, b"d6:lengthi10e4:name1:fe");
        assert_eq!(raw_entry(data, b"missing").unwrap(), None);
        assert!(raw_entry(b"i1e", b"info").is_err());
    }
}
