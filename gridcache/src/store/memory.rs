use super::{Capabilities, RemoteMap};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Stored value with its expiry deadline
#[derive(Debug, Clone)]
struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(data: Vec<u8>, ttl_secs: Option<u64>) -> Self {
        Self {
            data,
            // A deadline past what `Instant` can hold never expires
            expires_at: ttl_secs
                .and_then(|secs| Instant::now().checked_add(Duration::from_secs(secs))),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires| Instant::now() >= expires)
    }
}

/// Operation counters of a [`MemoryMap`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryStats {
    /// Single-key reads
    pub gets: u64,
    /// Single-key writes, including `put_if_absent`
    pub puts: u64,
    /// Single-key removals
    pub removes: u64,
    /// Batched calls (`get_all`, `put_all`, `remove_all`)
    pub batch_calls: u64,
    /// Reads that found a live entry
    pub hits: u64,
    /// Reads that found nothing
    pub misses: u64,
}

/// In-process map honouring the [`RemoteMap`] contract
///
/// Entries live in a radix trie so prefix scans stay cheap. Expired entries
/// are invisible and dropped lazily on access. Clones share the same data.
#[derive(Debug, Clone)]
pub struct MemoryMap {
    name: String,
    data: Arc<RwLock<Trie<String, StoredValue>>>,
    stats: Arc<RwLock<MemoryStats>>,
    capabilities: Capabilities,
}

impl Default for MemoryMap {
    fn default() -> Self {
        Self::new("map")
    }
}

impl MemoryMap {
    /// Create an empty map with every optional primitive enabled
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Arc::new(RwLock::new(Trie::new())),
            stats: Arc::new(RwLock::new(MemoryStats::default())),
            capabilities: Capabilities::ALL,
        }
    }

    /// Restrict the primitives this map declares (and accepts)
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn stats(&self) -> MemoryStats {
        self.stats.read().clone()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.data.read().iter().filter(|(_, v)| !v.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw payload at `key`, bypassing counters
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        self.data
            .read()
            .get(key)
            .filter(|v| !v.is_expired())
            .map(|v| v.data.clone())
    }

    fn require(&self, enabled: bool, what: &str) -> Result<()> {
        if enabled {
            Ok(())
        } else {
            Err(CacheError::not_supported(format!(
                "{} on map '{}'",
                what, self.name
            )))
        }
    }

    fn read_live(&self, data: &mut Trie<String, StoredValue>, key: &str) -> Option<Vec<u8>> {
        let mut stats = self.stats.write();
        match data.get(key) {
            Some(value) if value.is_expired() => {
                debug!("Key expired: {}", key);
                data.remove(key);
                stats.misses += 1;
                None
            }
            Some(value) => {
                stats.hits += 1;
                Some(value.data.clone())
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    fn remove_live(data: &mut Trie<String, StoredValue>, key: &str) -> bool {
        data.remove(key).is_some_and(|v| !v.is_expired())
    }
}

#[async_trait]
impl RemoteMap for MemoryMap {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        debug!("GET key={}", key);
        let mut data = self.data.write();
        self.stats.write().gets += 1;
        Ok(self.read_live(&mut data, key))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>) -> Result<()> {
        debug!("PUT key={}, size={}, ttl={:?}", key, value.len(), ttl_secs);
        self.data
            .write()
            .insert(key.to_string(), StoredValue::new(value, ttl_secs));
        self.stats.write().puts += 1;
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl_secs: Option<u64>,
    ) -> Result<bool> {
        debug!("PUTIFABSENT key={}, size={}", key, value.len());
        let mut data = self.data.write();
        self.stats.write().puts += 1;

        if data.get(key).is_some_and(|v| !v.is_expired()) {
            return Ok(false);
        }
        data.insert(key.to_string(), StoredValue::new(value, ttl_secs));
        Ok(true)
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        debug!("REMOVE key={}", key);
        let removed = Self::remove_live(&mut self.data.write(), key);
        self.stats.write().removes += 1;
        Ok(removed)
    }

    async fn get_all(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        self.require(self.capabilities.batch, "batched get")?;
        debug!("GETALL count={}", keys.len());

        let mut data = self.data.write();
        self.stats.write().batch_calls += 1;
        Ok(keys
            .iter()
            .map(|key| self.read_live(&mut data, key))
            .collect())
    }

    async fn put_all(&self, entries: Vec<(String, Vec<u8>)>, ttl_secs: Option<u64>) -> Result<()> {
        self.require(self.capabilities.batch, "batched put")?;
        debug!("PUTALL count={}, ttl={:?}", entries.len(), ttl_secs);

        let mut data = self.data.write();
        for (key, value) in entries {
            data.insert(key, StoredValue::new(value, ttl_secs));
        }
        self.stats.write().batch_calls += 1;
        Ok(())
    }

    async fn remove_all(&self, keys: &[String]) -> Result<usize> {
        self.require(self.capabilities.batch, "batched remove")?;
        debug!("REMOVEALL count={}", keys.len());

        let mut data = self.data.write();
        let count = keys
            .iter()
            .filter(|key| Self::remove_live(&mut data, key))
            .count();
        self.stats.write().batch_calls += 1;
        Ok(count)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.require(self.capabilities.scan, "key scan")?;
        debug!("KEYS prefix={}", prefix);

        let data = self.data.read();
        let keys = if prefix.is_empty() {
            data.iter()
                .filter(|(_, v)| !v.is_expired())
                .map(|(k, _)| k.clone())
                .collect()
        } else {
            data.get_raw_descendant(prefix)
                .map(|subtrie| {
                    subtrie
                        .iter()
                        .filter(|(k, v)| k.starts_with(prefix) && !v.is_expired())
                        .map(|(k, _)| k.clone())
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(keys)
    }

    async fn clear(&self) -> Result<usize> {
        self.require(self.capabilities.clear, "map clear")?;

        let mut data = self.data.write();
        let count = data.iter().filter(|(_, v)| !v.is_expired()).count();
        *data = Trie::new();
        debug!("CLEAR map={} removed={}", self.name, count);
        Ok(count)
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        self.require(self.capabilities.incr, "atomic increment")?;
        debug!("INCR key={}, delta={}", key, delta);

        let mut data = self.data.write();
        let (current, expires_at) = match data.get(key) {
            Some(value) if !value.is_expired() => {
                let current = std::str::from_utf8(&value.data)
                    .ok()
                    .and_then(|s| s.trim().parse::<i64>().ok())
                    .ok_or_else(|| {
                        CacheError::Server(format!("value at '{}' is not an integer", key))
                    })?;
                (current, value.expires_at)
            }
            _ => (0, None),
        };

        let new_value = current
            .checked_add(delta)
            .ok_or_else(|| CacheError::Server(format!("increment overflows at '{}'", key)))?;
        data.insert(
            key.to_string(),
            StoredValue {
                data: new_value.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(new_value)
    }
}
