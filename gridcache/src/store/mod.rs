//! Remote map contract
//!
//! The data grid is an external key/value store. The cache only needs a small
//! set of per-map primitives from it; batched and scanning primitives are
//! optional and must be declared through [`Capabilities`] so the cache can
//! fall back or refuse instead of degrading silently.

mod grid;
mod memory;


pub use grid::{GridConfig, GridMap};
pub use memory::{MemoryMap, MemoryStats};

use crate::error::{CacheError, Result};
use async_trait::async_trait;
use std::fmt::Debug;

/// Optional primitives a map handle provides natively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `get_all`, `put_all` and `remove_all` in one round trip
    pub batch: bool,
    /// `keys` by prefix
    pub scan: bool,
    /// `clear` of the whole map
    pub clear: bool,
    /// Atomic `incr`
    pub incr: bool,
}

impl Capabilities {
    /// Every optional primitive available
    pub const ALL: Self = Self {
        batch: true,
        scan: true,
        clear: true,
        incr: true,
    };

    /// Only the single-key primitives
    pub const BASIC: Self = Self {
        batch: false,
        scan: false,
        clear: false,
        incr: false,
    };
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::BASIC
    }
}

/// Handle to one named map of the data grid
///
/// `ttl_secs` of `None` stores without expiry; expiry is enforced by the map,
/// never by the cache.
#[async_trait]
pub trait RemoteMap: Send + Sync + Debug {
    /// Name of the map on the grid
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>) -> Result<()>;

    /// Store only if absent, as one atomic remote call. Returns whether the
    /// value was stored.
    async fn put_if_absent(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>)
    -> Result<bool>;

    /// Returns whether a value was removed
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Values for `keys`, in the same order
    async fn get_all(&self, _keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        Err(CacheError::not_supported("batched get"))
    }

    async fn put_all(&self, _entries: Vec<(String, Vec<u8>)>, _ttl_secs: Option<u64>) -> Result<()> {
        Err(CacheError::not_supported("batched put"))
    }

    /// Returns the number of keys removed
    async fn remove_all(&self, _keys: &[String]) -> Result<usize> {
        Err(CacheError::not_supported("batched remove"))
    }

    /// Keys starting with `prefix`
    async fn keys(&self, _prefix: &str) -> Result<Vec<String>> {
        Err(CacheError::not_supported("key scan"))
    }

    /// Remove every entry; returns how many were removed
    async fn clear(&self) -> Result<usize> {
        Err(CacheError::not_supported("map clear"))
    }

    /// Atomically add `delta` to the decimal integer at `key` (absent counts
    /// as 0) and return the new value
    async fn incr(&self, _key: &str, _delta: i64) -> Result<i64> {
        Err(CacheError::not_supported("atomic increment"))
    }
}
