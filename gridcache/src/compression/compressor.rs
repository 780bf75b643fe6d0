use crate::error::{CacheError, Result};
use crate::registry::{Options, parse_options};
use serde::Deserialize;
use std::fmt::Debug;
use std::io::{Read, Write};
use tracing::debug;

/// Compressor strategy
///
/// `decompress(compress(b)) == b` must hold for every byte string.
pub trait Compressor: Send + Sync + Debug {
    /// Registry name of this compressor
    fn name(&self) -> &'static str;

    /// Compress a serialized payload
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Reverse [`Compressor::compress`]
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Calculate compression ratio
pub fn compression_ratio(original: usize, compressed: usize) -> f64 {
    if compressed == 0 {
        return 1.0;
    }
    original as f64 / compressed as f64
}

/// No compression
#[derive(Debug, Clone, Default)]
pub struct NoopCompressor;

impl NoopCompressor {
    pub fn new() -> Self {
        Self
    }

    pub fn from_options(options: &Options) -> Result<Self> {
        if let Some(key) = options.keys().next() {
            return Err(CacheError::Configuration(format!(
                "noop compressor: unknown option '{}'",
                key
            )));
        }
        Ok(Self)
    }
}

impl Compressor for NoopCompressor {
    fn name(&self) -> &'static str {
        "none"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Lz4Options {
    level: u32,
}

impl Default for Lz4Options {
    fn default() -> Self {
        Self { level: 4 }
    }
}

/// LZ4 - Fast compression/decompression
#[derive(Debug, Clone)]
pub struct Lz4Compressor {
    level: u32,
}

impl Default for Lz4Compressor {
    fn default() -> Self {
        Self {
            level: Lz4Options::default().level,
        }
    }
}

impl Lz4Compressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(level: u32) -> Self {
        Self { level }
    }

    pub fn from_options(options: &Options) -> Result<Self> {
        let opts: Lz4Options = parse_options("lz4 compressor", options)?;
        Ok(Self::with_level(opts.level))
    }
}

impl Compressor for Lz4Compressor {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let to_err = |e: std::io::Error| CacheError::Compression(format!("lz4: {}", e));

        let mut encoder = lz4::EncoderBuilder::new()
            .level(self.level)
            .build(Vec::new())
            .map_err(to_err)?;

        encoder.write_all(data).map_err(to_err)?;
        let (compressed, result) = encoder.finish();
        result.map_err(to_err)?;

        debug!(
            "LZ4 compressed: {} → {} bytes (ratio: {:.2}x)",
            data.len(),
            compressed.len(),
            compression_ratio(data.len(), compressed.len())
        );

        Ok(compressed)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let to_err = |e: std::io::Error| CacheError::Decoding(format!("lz4: {}", e));

        let mut decoder = lz4::Decoder::new(data).map_err(to_err)?;
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).map_err(to_err)?;

        debug!(
            "LZ4 decompressed: {} → {} bytes",
            data.len(),
            decompressed.len()
        );
        Ok(decompressed)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ZstdOptions {
    level: i32,
}

impl Default for ZstdOptions {
    fn default() -> Self {
        // Balanced compression
        Self { level: 3 }
    }
}

/// Zstandard - Better compression ratio
#[derive(Debug, Clone)]
pub struct ZstdCompressor {
    level: i32,
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self {
            level: ZstdOptions::default().level,
        }
    }
}

impl ZstdCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compression level, 1-22
    pub fn with_level(level: i32) -> Self {
        Self { level }
    }

    pub fn from_options(options: &Options) -> Result<Self> {
        let opts: ZstdOptions = parse_options("zstd compressor", options)?;
        if !(1..=22).contains(&opts.level) {
            return Err(CacheError::Configuration(format!(
                "zstd compressor: level {} outside 1-22",
                opts.level
            )));
        }
        Ok(Self::with_level(opts.level))
    }
}

impl Compressor for ZstdCompressor {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let compressed = zstd::encode_all(data, self.level)
            .map_err(|e| CacheError::Compression(format!("zstd: {}", e)))?;

        debug!(
            "Zstd compressed: {} → {} bytes (ratio: {:.2}x)",
            data.len(),
            compressed.len(),
            compression_ratio(data.len(), compressed.len())
        );

        Ok(compressed)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let decompressed =
            zstd::decode_all(data).map_err(|e| CacheError::Decoding(format!("zstd: {}", e)))?;

        debug!(
            "Zstd decompressed: {} → {} bytes",
            data.len(),
            decompressed.len()
        );
        Ok(decompressed)
    }
}
