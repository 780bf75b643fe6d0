//! Payload compression

mod compressor;

pub use compressor::{Compressor, Lz4Compressor, NoopCompressor, ZstdCompressor, compression_ratio};
