//! Common test utilities

use async_trait::async_trait;
use gridcache::{
    CacheBuilder, CacheError, Capabilities, GridCache, MemoryMap, RemoteMap, Result,
    ShardedTopology, SingleTopology,
};
use mockito::{Server, ServerGuard};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Create a mock grid member for testing
#[allow(dead_code)] // Used by other test modules
pub async fn create_mock_server() -> ServerGuard {
    Server::new_async().await
}

/// Successful command response body
#[allow(dead_code)]
pub fn ok_body(payload: serde_json::Value) -> String {
    serde_json::json!({"success": true, "payload": payload, "error": null}).to_string()
}

/// Builder over a single in-process map
#[allow(dead_code)]
pub fn memory_builder(map: &MemoryMap) -> CacheBuilder {
    GridCache::builder(Arc::new(SingleTopology::new(Arc::new(map.clone()))))
}

/// Cache over a single in-process map
#[allow(dead_code)]
pub fn memory_cache(map: &MemoryMap) -> GridCache {
    memory_builder(map).build()
}

/// Cache over `shards` in-process maps, returned alongside it
#[allow(dead_code)]
pub fn sharded_cache(shards: usize) -> (GridCache, Vec<MemoryMap>) {
    let maps: Vec<MemoryMap> = (0..shards)
        .map(|i| MemoryMap::new(format!("shard-{}", i)))
        .collect();
    let connections = maps
        .iter()
        .map(|m| Arc::new(m.clone()) as Arc<dyn RemoteMap>)
        .collect();
    let topology = ShardedTopology::new(connections).unwrap();
    (GridCache::builder(Arc::new(topology)).build(), maps)
}

/// Map whose every call stalls for `delay` before reaching the inner map
#[allow(dead_code)]
#[derive(Debug)]
pub struct SlowMap {
    pub inner: MemoryMap,
    pub delay: Duration,
}

#[async_trait]
impl RemoteMap for SlowMap {
    fn name(&self) -> &str {
        "slow"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::BASIC
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.put(key, value, ttl_secs).await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl_secs: Option<u64>,
    ) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.put_if_absent(key, value, ttl_secs).await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.remove(key).await
    }
}

/// Single-key map refusing writes to the listed versioned keys
#[allow(dead_code)]
#[derive(Debug)]
pub struct FlakyMap {
    pub inner: MemoryMap,
    pub rejected: HashSet<String>,
}

#[async_trait]
impl RemoteMap for FlakyMap {
    fn name(&self) -> &str {
        "flaky"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::BASIC
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>) -> Result<()> {
        if self.rejected.contains(key) {
            return Err(CacheError::Server(format!("write to '{}' rejected", key)));
        }
        self.inner.put(key, value, ttl_secs).await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl_secs: Option<u64>,
    ) -> Result<bool> {
        self.inner.put_if_absent(key, value, ttl_secs).await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.inner.remove(key).await
    }
}
