//! Dynamic cache values

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// A value stored in the cache
///
/// Booleans are their own variant and never take the integer fast path.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CacheValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<CacheValue>),
    Map(BTreeMap<String, CacheValue>),
}

impl CacheValue {
    /// Short name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Returns the integer if this is an `Int`
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string slice if this is a `Str`
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the raw bytes if this is a `Bytes`
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Finds the first nested part a text format (JSON, YAML) cannot carry
    /// faithfully: byte blobs and non-finite floats.
    pub fn find_non_text(&self) -> Option<&'static str> {
        match self {
            Self::Bytes(_) => Some("bytes"),
            Self::Float(f) if !f.is_finite() => Some("non-finite float"),
            Self::List(items) => items.iter().find_map(Self::find_non_text),
            Self::Map(entries) => entries.values().find_map(Self::find_non_text),
            _ => None,
        }
    }
}

impl fmt::Display for CacheValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{}", x),
            Self::Str(s) => write!(f, "{:?}", s),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for CacheValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for CacheValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for CacheValue {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<u32> for CacheValue {
    fn from(n: u32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for CacheValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for CacheValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for CacheValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<&[u8]> for CacheValue {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl From<Vec<CacheValue>> for CacheValue {
    fn from(items: Vec<CacheValue>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, CacheValue>> for CacheValue {
    fn from(entries: BTreeMap<String, CacheValue>) -> Self {
        Self::Map(entries)
    }
}

impl<T: Into<CacheValue>> From<Option<T>> for CacheValue {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

impl Serialize for CacheValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(n) => serializer.serialize_i64(*n),
            Self::Float(x) => serializer.serialize_f64(*x),
            Self::Str(s) => serializer.serialize_str(s),
            Self::Bytes(b) => serializer.serialize_bytes(b),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

struct CacheValueVisitor;

impl<'de> Visitor<'de> for CacheValueVisitor {
    type Value = CacheValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a cacheable value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<CacheValue, E> {
        Ok(CacheValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<CacheValue, E> {
        Ok(CacheValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<CacheValue, E> {
        // Beyond i64 there is no integer variant; keep the magnitude as a float
        Ok(i64::try_from(v).map_or(CacheValue::Float(v as f64), CacheValue::Int))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<CacheValue, E> {
        Ok(CacheValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<CacheValue, E> {
        Ok(CacheValue::Str(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<CacheValue, E> {
        Ok(CacheValue::Str(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<CacheValue, E> {
        Ok(CacheValue::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<CacheValue, E> {
        Ok(CacheValue::Bytes(v))
    }

    fn visit_none<E: de::Error>(self) -> Result<CacheValue, E> {
        Ok(CacheValue::Null)
    }

    fn visit_unit<E: de::Error>(self) -> Result<CacheValue, E> {
        Ok(CacheValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<CacheValue, D::Error> {
        CacheValue::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<CacheValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(CacheValue::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<CacheValue, A::Error> {
        let mut entries = BTreeMap::new();
        while let Some((k, v)) = map.next_entry::<String, CacheValue>()? {
            entries.insert(k, v);
        }
        Ok(CacheValue::Map(entries))
    }
}

impl<'de> Deserialize<'de> for CacheValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CacheValueVisitor)
    }
}
