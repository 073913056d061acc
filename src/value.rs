//! Self-describing record value type.
//!
//! Every record the row tier stores — whether inserted through the
//! schema-bearing `Table` façade or the schemaless `Collection` façade —
//! is a [`Record`]: an ordered sequence of `(field, Value)` pairs. The
//! [`Value`] enum covers scalars and simple nesting, and both types
//! implement [`Encode`]/[`Decode`] from [`crate::encoding`] so that the
//! append engine, the WAL, and SSTable entries all share one on-disk
//! representation rather than reaching for an external format.
//!
//! # Wire format
//!
//! `Value` is encoded as `[u8 tag][payload]`:
//!
//! | Tag | Variant | Payload |
//! |-----|---------|---------|
//! | 0 | `Null` | none |
//! | 1 | `Bool` | 1 byte |
//! | 2 | `Int` | 8 bytes, LE `i64` |
//! | 3 | `Float` | 8 bytes, LE `f64` bits |
//! | 4 | `Str` | `[u32 len][utf-8 bytes]` |
//! | 5 | `List` | `[u32 count][Value]…` |
//! | 6 | `Map` | `[u32 count][(String, Value)]…` |
//!
//! `Record` is encoded as a `Map`'s payload: `[u32 count][(String, Value)]…`,
//! with field order preserved exactly as inserted.

use std::collections::BTreeMap;

use crate::encoding::{Decode, Encode, EncodingError, decode_from_slice, encode_to_vec, require};

/// A single scalar or nested value stored in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Value {
    /// The type tag name used by schema validation (`int`/`integer`,
    /// `float`/`double`, `string`/`object`, `bool`/`boolean`).
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "object",
        }
    }

    /// Numeric view used by ordering comparisons (`$gt`/`$lt`/…) and
    /// columnar aggregation; returns `None` for non-numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Total order over [`Value`] used by [`crate::btree::BTreeIndex`] keys
/// and the `$gt`/`$lt`/`$gte`/`$lte` predicate operators.
///
/// Comparison across distinct variants (e.g. `Str` vs `Int`) is
/// considered non-comparable and returns `None` — the B-tree drops such
/// inserts silently per spec, and the predicate matcher treats them as
/// a non-match.
impl Value {
    pub fn partial_compare(&self, other: &Value) -> Option<std::cmp::Ordering> {
        use std::cmp::Ordering;
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            _ => None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Encode / Decode
// ------------------------------------------------------------------------------------------------

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_STR: u8 = 4;
const TAG_LIST: u8 = 5;
const TAG_MAP: u8 = 6;

impl Encode for Value {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        match self {
            Value::Null => buf.push(TAG_NULL),
            Value::Bool(b) => {
                buf.push(TAG_BOOL);
                b.encode_to(buf)?;
            }
            Value::Int(v) => {
                buf.push(TAG_INT);
                v.encode_to(buf)?;
            }
            Value::Float(v) => {
                buf.push(TAG_FLOAT);
                v.to_bits().encode_to(buf)?;
            }
            Value::Str(s) => {
                buf.push(TAG_STR);
                s.encode_to(buf)?;
            }
            Value::List(items) => {
                buf.push(TAG_LIST);
                crate::encoding::encode_vec(items, buf)?;
            }
            Value::Map(entries) => {
                buf.push(TAG_MAP);
                encode_entries(entries, buf)?;
            }
        }
        Ok(())
    }
}

impl Decode for Value {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        require(buf, 1)?;
        let tag = buf[0];
        let rest = &buf[1..];
        let (value, consumed) = match tag {
            TAG_NULL => (Value::Null, 0),
            TAG_BOOL => {
                let (v, n) = bool::decode_from(rest)?;
                (Value::Bool(v), n)
            }
            TAG_INT => {
                let (v, n) = i64::decode_from(rest)?;
                (Value::Int(v), n)
            }
            TAG_FLOAT => {
                let (bits, n) = u64::decode_from(rest)?;
                (Value::Float(f64::from_bits(bits)), n)
            }
            TAG_STR => {
                let (s, n) = String::decode_from(rest)?;
                (Value::Str(s), n)
            }
            TAG_LIST => {
                let (items, n) = crate::encoding::decode_vec::<Value>(rest)?;
                (Value::List(items), n)
            }
            TAG_MAP => {
                let (entries, n) = decode_entries(rest)?;
                (Value::Map(entries), n)
            }
            other => {
                return Err(EncodingError::InvalidTag {
                    tag: other as u32,
                    type_name: "Value",
                });
            }
        };
        Ok((value, 1 + consumed))
    }
}

impl Encode for (String, Value) {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.0.encode_to(buf)?;
        self.1.encode_to(buf)
    }
}

impl Decode for (String, Value) {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (key, key_len) = String::decode_from(buf)?;
        let (value, val_len) = Value::decode_from(&buf[key_len..])?;
        Ok(((key, value), key_len + val_len))
    }
}

fn encode_entries(entries: &[(String, Value)], buf: &mut Vec<u8>) -> Result<(), EncodingError> {
    crate::encoding::encode_vec(entries, buf)
}

fn decode_entries(buf: &[u8]) -> Result<(Vec<(String, Value)>, usize), EncodingError> {
    crate::encoding::decode_vec::<(String, Value)>(buf)
}

// ------------------------------------------------------------------------------------------------
// Record
// ------------------------------------------------------------------------------------------------

/// An ordered field map — the unit the row tier reads, writes, and
/// scans. Field insertion order is preserved; [`Record::get`] is a
/// linear scan, appropriate for the small field counts typical of
/// document/row records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Record { fields: Vec::new() }
    }

    pub fn from_fields(fields: Vec<(String, Value)>) -> Self {
        Record { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        if let Some(entry) = self.fields.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value;
        } else {
            self.fields.push((key.to_string(), value));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(idx).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convenience view for callers that want ordinary map semantics
    /// (e.g. the columnar adapter gathering one value per column).
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.fields.iter().cloned().collect()
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodingError> {
        encode_to_vec(&Value::Map(self.fields.clone()))
    }

    pub fn decode(buf: &[u8]) -> Result<Record, EncodingError> {
        let (value, _) = decode_from_slice::<Value>(buf)?;
        match value {
            Value::Map(fields) => Ok(Record { fields }),
            _ => Err(EncodingError::Custom(
                "expected a Map value at record root".to_string(),
            )),
        }
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.set(&k, v);
        }
        record
    }
}
