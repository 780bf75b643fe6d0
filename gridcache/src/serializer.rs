//! Value serializers
//!
//! A serializer turns a [`CacheValue`] into bytes ready for compression and
//! back. Implementations are stateless, so one instance is shared by every
//! concurrent operation of a cache.

use crate::error::{CacheError, Result};
use crate::registry::{Options, parse_options};
use crate::value::CacheValue;
use serde::Deserialize;
use std::fmt::Debug;

/// Serializer strategy
pub trait Serializer: Send + Sync + Debug {
    /// Registry name of this serializer
    fn name(&self) -> &'static str;

    /// Convert a value to its transportable form
    fn serialize(&self, value: &CacheValue) -> Result<Vec<u8>>;

    /// Rebuild a value from its transportable form
    fn deserialize(&self, data: &[u8]) -> Result<CacheValue>;
}

fn reject_non_text(format: &str, value: &CacheValue) -> Result<()> {
    match value.find_non_text() {
        Some(part) => Err(CacheError::Encoding(format!(
            "{} cannot represent {}",
            format, part
        ))),
        None => Ok(()),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct JsonOptions {
    pretty: bool,
}

/// JSON serializer (human readable, JSON-representable values only)
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer {
    pretty: bool,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit indented JSON
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn from_options(options: &Options) -> Result<Self> {
        let opts: JsonOptions = parse_options("json serializer", options)?;
        Ok(Self::new().pretty(opts.pretty))
    }
}

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn serialize(&self, value: &CacheValue) -> Result<Vec<u8>> {
        reject_non_text("JSON", value)?;
        let result = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        result.map_err(|e| CacheError::Encoding(e.to_string()))
    }

    fn deserialize(&self, data: &[u8]) -> Result<CacheValue> {
        serde_json::from_slice(data).map_err(|e| CacheError::Decoding(e.to_string()))
    }
}

/// MessagePack serializer (compact binary, supports byte blobs)
#[derive(Debug, Clone, Default)]
pub struct MsgPackSerializer;

impl MsgPackSerializer {
    pub fn new() -> Self {
        Self
    }

    pub fn from_options(options: &Options) -> Result<Self> {
        if let Some(key) = options.keys().next() {
            return Err(CacheError::Configuration(format!(
                "msgpack serializer: unknown option '{}'",
                key
            )));
        }
        Ok(Self)
    }
}

impl Serializer for MsgPackSerializer {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn serialize(&self, value: &CacheValue) -> Result<Vec<u8>> {
        rmp_serde::to_vec(value).map_err(|e| CacheError::Encoding(e.to_string()))
    }

    fn deserialize(&self, data: &[u8]) -> Result<CacheValue> {
        rmp_serde::from_slice(data).map_err(|e| CacheError::Decoding(e.to_string()))
    }
}

/// YAML serializer (structured text)
#[derive(Debug, Clone, Default)]
pub struct YamlSerializer;

impl YamlSerializer {
    pub fn new() -> Self {
        Self
    }

    pub fn from_options(options: &Options) -> Result<Self> {
        if let Some(key) = options.keys().next() {
            return Err(CacheError::Configuration(format!(
                "yaml serializer: unknown option '{}'",
                key
            )));
        }
        Ok(Self)
    }
}

impl Serializer for YamlSerializer {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn serialize(&self, value: &CacheValue) -> Result<Vec<u8>> {
        reject_non_text("YAML", value)?;
        serde_yaml::to_string(value)
            .map(String::into_bytes)
            .map_err(|e| CacheError::Encoding(e.to_string()))
    }

    fn deserialize(&self, data: &[u8]) -> Result<CacheValue> {
        serde_yaml::from_slice(data).map_err(|e| CacheError::Decoding(e.to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PassthroughOptions {
    text: bool,
}

/// Identity serializer for payloads that are already storable
///
/// In byte mode (the default) only `Bytes` are accepted and returned. In text
/// mode only `Str` is accepted and stored payloads must be valid UTF-8.
#[derive(Debug, Clone, Default)]
pub struct PassthroughSerializer {
    text: bool,
}

impl PassthroughSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store and return strings instead of raw bytes
    pub fn text(mut self, text: bool) -> Self {
        self.text = text;
        self
    }

    pub fn from_options(options: &Options) -> Result<Self> {
        let opts: PassthroughOptions = parse_options("passthrough serializer", options)?;
        Ok(Self::new().text(opts.text))
    }
}

impl Serializer for PassthroughSerializer {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn serialize(&self, value: &CacheValue) -> Result<Vec<u8>> {
        match (self.text, value) {
            (false, CacheValue::Bytes(b)) => Ok(b.clone()),
            (true, CacheValue::Str(s)) => Ok(s.as_bytes().to_vec()),
            (text, other) => Err(CacheError::Encoding(format!(
                "passthrough serializer ({} mode) cannot store {}",
                if text { "text" } else { "bytes" },
                other.kind()
            ))),
        }
    }

    fn deserialize(&self, data: &[u8]) -> Result<CacheValue> {
        if self.text {
            String::from_utf8(data.to_vec())
                .map(CacheValue::Str)
                .map_err(|e| CacheError::Decoding(e.to_string()))
        } else {
            Ok(CacheValue::Bytes(data.to_vec()))
        }
    }
}
