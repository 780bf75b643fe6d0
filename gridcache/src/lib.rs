//! # gridcache
//!
//! Versioned key/value cache client for distributed in-memory data grids
//!
//! ## Features
//!
//! - 🔑 **Versioned keys**: every key lives under `prefix:version:`, so bumping
//!   the version retires a whole cache generation
//! - 🧩 **Pluggable strategies**: JSON, MessagePack, YAML or passthrough
//!   serializers; LZ4 or Zstandard compression, selected by name
//! - 🔢 **Integer fast path**: integers are stored as plain decimal text and
//!   can be incremented atomically on the grid
//! - 🌐 **Single or sharded**: one grid map, or keys spread over several by
//!   CRC16 hash slot
//! - 🔄 **Async/Await**: built on Tokio; every remote call is time-bounded
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gridcache::{GridCache, SettingsFile, Timeout};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = SettingsFile::from_file("gridcache.yaml")?;
//!     let cache = GridCache::from_settings(settings.cache("default")?).await?;
//!
//!     cache.set("user:1", "John Doe", Timeout::Default).await?;
//!     let value = cache.get("user:1").await?;
//!     println!("Value: {:?}", value);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod compression;
pub mod config;
pub mod error;
pub mod key;
pub mod pipeline;
pub mod registry;
pub mod serializer;
pub mod store;
pub mod topology;
pub mod value;

pub use cache::{CacheBuilder, GridCache, Timeout};
pub use compression::{Compressor, Lz4Compressor, NoopCompressor, ZstdCompressor};
pub use config::{Backend, CacheOptions, CacheSettings, Location, SettingsFile};
pub use error::{CacheError, Result};
pub use key::{KeyCodec, KeyInput, VersionedKey};
pub use pipeline::{DecodeMode, ValuePipeline, WireFormat};
pub use registry::{Options, Registry};
pub use serializer::{
    JsonSerializer, MsgPackSerializer, PassthroughSerializer, Serializer, YamlSerializer,
};
pub use store::{Capabilities, GridConfig, GridMap, MemoryMap, MemoryStats, RemoteMap};
pub use topology::{ShardedTopology, SingleTopology, Topology};
pub use value::CacheValue;

#[cfg(test)]
mod tests;
