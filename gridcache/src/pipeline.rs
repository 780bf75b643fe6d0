//! Value pipeline: serialize → compress on write, decompress → deserialize on read
//!
//! Integers skip both stages and travel as decimal text. With the default
//! [`WireFormat::Inferred`] the reader recognises them by trying an integer
//! parse first, which means any payload that happens to look like an integer
//! comes back as one. [`WireFormat::Tagged`] removes that ambiguity with a
//! one-byte type prefix, at the cost of wire compatibility.

use crate::compression::Compressor;
use crate::error::{CacheError, Result};
use crate::serializer::Serializer;
use crate::value::CacheValue;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Tag of a decimal integer payload in [`WireFormat::Tagged`]
pub const TAG_INTEGER: u8 = 0x01;
/// Tag of a serialized + compressed payload in [`WireFormat::Tagged`]
pub const TAG_ENCODED: u8 = 0x02;

/// How payload types are recognised on read
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Integers stored as bare decimal text, detected by parsing (legacy)
    #[default]
    Inferred,
    /// Every payload starts with a type tag byte
    Tagged,
}

/// What to do when a stored payload does not deserialize
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecodeMode {
    /// Surface the failure as [`CacheError::Decoding`]
    #[default]
    Strict,
    /// Log it and return the decompressed bytes unchanged
    Lenient,
}

/// Serializer + compressor composition with the integer fast path
#[derive(Debug, Clone)]
pub struct ValuePipeline {
    serializer: Arc<dyn Serializer>,
    compressor: Arc<dyn Compressor>,
    wire_format: WireFormat,
    decode_mode: DecodeMode,
}

impl ValuePipeline {
    pub fn new(serializer: Arc<dyn Serializer>, compressor: Arc<dyn Compressor>) -> Self {
        Self {
            serializer,
            compressor,
            wire_format: WireFormat::default(),
            decode_mode: DecodeMode::default(),
        }
    }

    pub fn with_wire_format(mut self, wire_format: WireFormat) -> Self {
        self.wire_format = wire_format;
        self
    }

    pub fn with_decode_mode(mut self, decode_mode: DecodeMode) -> Self {
        self.decode_mode = decode_mode;
        self
    }

    pub fn serializer(&self) -> &dyn Serializer {
        self.serializer.as_ref()
    }

    pub fn compressor(&self) -> &dyn Compressor {
        self.compressor.as_ref()
    }

    pub fn wire_format(&self) -> WireFormat {
        self.wire_format
    }

    pub fn decode_mode(&self) -> DecodeMode {
        self.decode_mode
    }

    /// Turn a value into the payload stored remotely
    pub fn encode(&self, value: &CacheValue) -> Result<Vec<u8>> {
        if let CacheValue::Int(n) = value {
            let text = n.to_string().into_bytes();
            return Ok(match self.wire_format {
                WireFormat::Inferred => text,
                WireFormat::Tagged => tagged(TAG_INTEGER, &text),
            });
        }

        let serialized = self.serializer.serialize(value)?;
        let compressed = self.compressor.compress(&serialized)?;
        debug!(
            "Encoded {} via {}+{}: {} bytes",
            value.kind(),
            self.serializer.name(),
            self.compressor.name(),
            compressed.len()
        );

        Ok(match self.wire_format {
            WireFormat::Inferred => compressed,
            WireFormat::Tagged => tagged(TAG_ENCODED, &compressed),
        })
    }

    /// Rebuild a value from a stored payload
    pub fn decode(&self, payload: &[u8]) -> Result<CacheValue> {
        match self.wire_format {
            WireFormat::Inferred => match parse_integer(payload) {
                Some(n) => Ok(CacheValue::Int(n)),
                None => self.decode_encoded(payload),
            },
            WireFormat::Tagged => match payload.split_first() {
                Some((&TAG_INTEGER, text)) => parse_integer(text).map(CacheValue::Int).ok_or_else(
                    || CacheError::Decoding("integer payload is not a decimal number".to_string()),
                ),
                Some((&TAG_ENCODED, body)) => self.decode_encoded(body),
                Some((tag, _)) => Err(CacheError::Decoding(format!(
                    "unknown payload tag 0x{:02x}",
                    tag
                ))),
                None => Err(CacheError::Decoding("empty payload".to_string())),
            },
        }
    }

    fn decode_encoded(&self, payload: &[u8]) -> Result<CacheValue> {
        let decompressed = self.compressor.decompress(payload)?;
        match self.serializer.deserialize(&decompressed) {
            Ok(value) => Ok(value),
            Err(e) if self.decode_mode == DecodeMode::Lenient => {
                warn!(
                    "Returning raw payload ({} bytes) that {} could not deserialize: {}",
                    decompressed.len(),
                    self.serializer.name(),
                    e
                );
                Ok(CacheValue::Bytes(decompressed))
            }
            Err(e) => Err(e),
        }
    }
}

fn tagged(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(tag);
    out.extend_from_slice(body);
    out
}

/// Decimal integer parse tolerant of surrounding ASCII whitespace
pub fn parse_integer(payload: &[u8]) -> Option<i64> {
    std::str::from_utf8(payload).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{NoopCompressor, ZstdCompressor};
    use crate::registry::Options;
    use crate::serializer::{JsonSerializer, MsgPackSerializer, PassthroughSerializer};
    use std::collections::BTreeMap;

    fn json_zstd() -> ValuePipeline {
        ValuePipeline::new(
            Arc::new(JsonSerializer::new()),
            Arc::new(ZstdCompressor::new()),
        )
    }

    fn text_noop() -> ValuePipeline {
        ValuePipeline::new(
            Arc::new(PassthroughSerializer::new().text(true)),
            Arc::new(NoopCompressor::new()),
        )
    }

    #[test]
    fn test_integers_round_trip_for_every_strategy() {
        let serializers = crate::registry::serializers();
        let compressors = crate::registry::compressors();
        let text_mode = Options::from_iter([("text".to_string(), serde_json::json!(true))]);

        // One value from each serializer's own domain
        let strategies = [
            ("json", Options::new(), CacheValue::from("héllo")),
            (
                "msgpack",
                Options::new(),
                CacheValue::List(vec![CacheValue::Bytes(vec![0, 255]), CacheValue::Float(1.5)]),
            ),
            (
                "yaml",
                Options::new(),
                CacheValue::Map(BTreeMap::from([("flag".to_string(), CacheValue::Bool(true))])),
            ),
            ("passthrough", Options::new(), CacheValue::Bytes(b"\x00raw\xff".to_vec())),
            ("passthrough", text_mode, CacheValue::from("plain text")),
        ];

        for (serializer_name, serializer_opts, own_value) in &strategies {
            for compressor_name in ["none", "lz4", "zstd"] {
                for wire_format in [WireFormat::Inferred, WireFormat::Tagged] {
                    let pipeline = ValuePipeline::new(
                        serializers.build(serializer_name, serializer_opts).unwrap(),
                        compressors.build(compressor_name, &Options::new()).unwrap(),
                    )
                    .with_wire_format(wire_format);
                    let label = format!("{}+{} {:?}", serializer_name, compressor_name, wire_format);

                    for n in [i64::MIN, 0, i64::MAX] {
                        let encoded = pipeline.encode(&CacheValue::Int(n)).unwrap();
                        assert_eq!(
                            pipeline.decode(&encoded).unwrap(),
                            CacheValue::Int(n),
                            "{}",
                            label
                        );
                    }

                    let encoded = pipeline.encode(own_value).unwrap();
                    assert_eq!(&pipeline.decode(&encoded).unwrap(), own_value, "{}", label);
                }
            }
        }
    }

    #[test]
    fn test_integer_fast_path() {
        let pipeline = json_zstd();
        let encoded = pipeline.encode(&CacheValue::Int(-1234)).unwrap();
        assert_eq!(encoded, b"-1234");
        assert_eq!(pipeline.decode(&encoded).unwrap(), CacheValue::Int(-1234));
    }

    #[test]
    fn test_bool_is_not_an_integer() {
        let pipeline = json_zstd();
        let encoded = pipeline.encode(&CacheValue::Bool(true)).unwrap();
        assert_ne!(encoded, b"1");
        assert_eq!(pipeline.decode(&encoded).unwrap(), CacheValue::Bool(true));
    }

    #[test]
    fn test_structured_roundtrip() {
        let pipeline = json_zstd();
        let value = CacheValue::Map(BTreeMap::from([
            ("id".to_string(), CacheValue::Int(7)),
            ("tags".to_string(), CacheValue::List(vec!["x".into()])),
        ]));
        let encoded = pipeline.encode(&value).unwrap();
        assert_eq!(pipeline.decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_numeric_string_reads_back_as_integer() {
        let pipeline = text_noop();
        let encoded = pipeline.encode(&CacheValue::from("42")).unwrap();
        assert_eq!(pipeline.decode(&encoded).unwrap(), CacheValue::Int(42));
    }

    #[test]
    fn test_whitespace_around_integers() {
        assert_eq!(parse_integer(b" 42\n"), Some(42));
        assert_eq!(parse_integer(b"+7"), Some(7));
        assert_eq!(parse_integer(b"4 2"), None);
        assert_eq!(parse_integer(&[0xff]), None);
    }

    #[test]
    fn test_tagged_keeps_numeric_strings() {
        let pipeline = text_noop().with_wire_format(WireFormat::Tagged);
        let encoded = pipeline.encode(&CacheValue::from("42")).unwrap();
        assert_eq!(encoded[0], TAG_ENCODED);
        assert_eq!(pipeline.decode(&encoded).unwrap(), CacheValue::from("42"));

        let encoded = pipeline.encode(&CacheValue::Int(42)).unwrap();
        assert_eq!(encoded, b"\x0142");
        assert_eq!(pipeline.decode(&encoded).unwrap(), CacheValue::Int(42));
    }

    #[test]
    fn test_tagged_rejects_unknown_and_empty() {
        let pipeline = json_zstd().with_wire_format(WireFormat::Tagged);
        assert!(matches!(
            pipeline.decode(b"\x09abc").unwrap_err(),
            CacheError::Decoding(_)
        ));
        assert!(matches!(pipeline.decode(b"").unwrap_err(), CacheError::Decoding(_)));
        assert!(matches!(
            pipeline.decode(b"\x01abc").unwrap_err(),
            CacheError::Decoding(_)
        ));
    }

    #[test]
    fn test_strict_mode_surfaces_decoding_errors() {
        let pipeline = ValuePipeline::new(
            Arc::new(JsonSerializer::new()),
            Arc::new(NoopCompressor::new()),
        );
        let err = pipeline.decode(b"<html>not json</html>").unwrap_err();
        assert!(matches!(err, CacheError::Decoding(_)));
    }

    #[test]
    fn test_lenient_mode_returns_raw_payload() {
        let pipeline = ValuePipeline::new(
            Arc::new(JsonSerializer::new()),
            Arc::new(NoopCompressor::new()),
        )
        .with_decode_mode(DecodeMode::Lenient);
        let value = pipeline.decode(b"<html>not json</html>").unwrap();
        assert_eq!(value, CacheValue::Bytes(b"<html>not json</html>".to_vec()));
    }

    #[test]
    fn test_lenient_mode_still_fails_on_bad_compression() {
        let pipeline = json_zstd().with_decode_mode(DecodeMode::Lenient);
        assert!(matches!(
            pipeline.decode(b"not zstd").unwrap_err(),
            CacheError::Decoding(_)
        ));
    }

    #[test]
    fn test_encoding_errors_propagate() {
        let err = json_zstd().encode(&CacheValue::Bytes(vec![1])).unwrap_err();
        assert!(matches!(err, CacheError::Encoding(_)));
    }

    #[test]
    fn test_msgpack_bytes_roundtrip() {
        let pipeline = ValuePipeline::new(
            Arc::new(MsgPackSerializer::new()),
            Arc::new(ZstdCompressor::new()),
        );
        let value = CacheValue::Bytes(vec![0, 1, 2, 255]);
        let encoded = pipeline.encode(&value).unwrap();
        assert_eq!(pipeline.decode(&encoded).unwrap(), value);
    }
}
