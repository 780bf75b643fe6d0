//! Key → connection resolution
//!
//! A [`Topology`] owns the map handles a cache talks to and decides which one
//! serves a given versioned key. [`ShardedTopology`] uses the CRC16 hash slot
//! of the key, so `{tag}` sections pin related keys to one shard.

use crate::error::{CacheError, Result};
use crate::key::VersionedKey;
use crate::store::RemoteMap;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

/// Total number of hash slots
pub const TOTAL_SLOTS: u16 = 16384;

/// CRC16 lookup table (Redis-compatible)
const CRC16_TABLE: [u16; 256] = [
    0x0000, 0x1021, 0x2042, 0x3063, 0x4084, 0x50a5, 0x60c6, 0x70e7, 0x8108, 0x9129, 0xa14a, 0xb16b,
    0xc18c, 0xd1ad, 0xe1ce, 0xf1ef, 0x1231, 0x0210, 0x3273, 0x2252, 0x52b5, 0x4294, 0x72f7, 0x62d6,
    0x9339, 0x8318, 0xb37b, 0xa35a, 0xd3bd, 0xc39c, 0xf3ff, 0xe3de, 0x2462, 0x3443, 0x0420, 0x1401,
    0x64e6, 0x74c7, 0x44a4, 0x5485, 0xa56a, 0xb54b, 0x8528, 0x9509, 0xe5ee, 0xf5cf, 0xc5ac, 0xd58d,
    0x3653, 0x2672, 0x1611, 0x0630, 0x76d7, 0x66f6, 0x5695, 0x46b4, 0xb75b, 0xa77a, 0x9719, 0x8738,
    0xf7df, 0xe7fe, 0xd79d, 0xc7bc, 0x48c4, 0x58e5, 0x6886, 0x78a7, 0x0840, 0x1861, 0x2802, 0x3823,
    0xc9cc, 0xd9ed, 0xe98e, 0xf9af, 0x8948, 0x9969, 0xa90a, 0xb92b, 0x5af5, 0x4ad4, 0x7ab7, 0x6a96,
    0x1a71, 0x0a50, 0x3a33, 0x2a12, 0xdbfd, 0xcbdc, 0xfbbf, 0xeb9e, 0x9b79, 0x8b58, 0xbb3b, 0xab1a,
    0x6ca6, 0x7c87, 0x4ce4, 0x5cc5, 0x2c22, 0x3c03, 0x0c60, 0x1c41, 0xedae, 0xfd8f, 0xcdec, 0xddcd,
    0xad2a, 0xbd0b, 0x8d68, 0x9d49, 0x7e97, 0x6eb6, 0x5ed5, 0x4ef4, 0x3e13, 0x2e32, 0x1e51, 0x0e70,
    0xff9f, 0xefbe, 0xdfdd, 0xcffc, 0xbf1b, 0xaf3a, 0x9f59, 0x8f78, 0x9188, 0x81a9, 0xb1ca, 0xa1eb,
    0xd10c, 0xc12d, 0xf14e, 0xe16f, 0x1080, 0x00a1, 0x30c2, 0x20e3, 0x5004, 0x4025, 0x7046, 0x6067,
    0x83b9, 0x9398, 0xa3fb, 0xb3da, 0xc33d, 0xd31c, 0xe37f, 0xf35e, 0x02b1, 0x1290, 0x22f3, 0x32d2,
    0x4235, 0x5214, 0x6277, 0x7256, 0xb5ea, 0xa5cb, 0x95a8, 0x8589, 0xf56e, 0xe54f, 0xd52c, 0xc50d,
    0x34e2, 0x24c3, 0x14a0, 0x0481, 0x7466, 0x6447, 0x5424, 0x4405, 0xa7db, 0xb7fa, 0x8799, 0x97b8,
    0xe75f, 0xf77e, 0xc71d, 0xd73c, 0x26d3, 0x36f2, 0x0691, 0x16b0, 0x6657, 0x7676, 0x4615, 0x5634,
    0xd94c, 0xc96d, 0xf90e, 0xe92f, 0x99c8, 0x89e9, 0xb98a, 0xa9ab, 0x5844, 0x4865, 0x7806, 0x6827,
    0x18c0, 0x08e1, 0x3882, 0x28a3, 0xcb7d, 0xdb5c, 0xeb3f, 0xfb1e, 0x8bf9, 0x9bd8, 0xabbb, 0xbb9a,
    0x4a75, 0x5a54, 0x6a37, 0x7a16, 0x0af1, 0x1ad0, 0x2ab3, 0x3a92, 0xfd2e, 0xed0f, 0xdd6c, 0xcd4d,
    0xbdaa, 0xad8b, 0x9de8, 0x8dc9, 0x7c26, 0x6c07, 0x5c64, 0x4c45, 0x3ca2, 0x2c83, 0x1ce0, 0x0cc1,
    0xef1f, 0xff3e, 0xcf5d, 0xdf7c, 0xaf9b, 0xbfba, 0x8fd9, 0x9ff8, 0x6e17, 0x7e36, 0x4e55, 0x5e74,
    0x2e93, 0x3eb2, 0x0ed1, 0x1ef0,
];

fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        let idx = ((crc >> 8) ^ u16::from(byte)) as usize;
        crc = (crc << 8) ^ CRC16_TABLE[idx];
    }
    crc
}

/// Non-empty `{tag}` section of a key, if any
fn extract_hash_tag(key: &str) -> Option<&str> {
    let start = key.find('{')?;
    let rest = &key[start + 1..];
    let end = rest.find('}')?;
    let tag = &rest[..end];
    (!tag.is_empty()).then_some(tag)
}

/// Hash slot of a key (CRC16 mod 16384)
///
/// ```
/// use gridcache::topology::hash_slot;
///
/// let slot = hash_slot("app:1:user:1001");
/// assert!(slot < 16384);
///
/// // Hash tags pin keys to the same slot
/// assert_eq!(
///     hash_slot("app:1:user:{1001}:profile"),
///     hash_slot("app:1:user:{1001}:settings")
/// );
/// ```
pub fn hash_slot(key: &str) -> u16 {
    let hash_key = extract_hash_tag(key).unwrap_or(key);
    crc16(hash_key.as_bytes()) % TOTAL_SLOTS
}

/// Connection layout of a cache
#[async_trait]
pub trait Topology: Send + Sync + Debug {
    /// Every map handle, indexed by shard
    fn connections(&self) -> &[Arc<dyn RemoteMap>];

    /// Shard index serving `key`
    fn shard_for(&self, key: &str) -> usize;

    /// Map handle serving `key`
    fn resolve(&self, key: &str) -> &Arc<dyn RemoteMap> {
        &self.connections()[self.shard_for(key)]
    }

    /// Group keys by shard, keeping their relative order
    fn partition(&self, keys: Vec<VersionedKey>) -> Vec<(usize, Vec<VersionedKey>)> {
        let mut groups: BTreeMap<usize, Vec<VersionedKey>> = BTreeMap::new();
        for key in keys {
            groups
                .entry(self.shard_for(key.as_str()))
                .or_default()
                .push(key);
        }
        groups.into_iter().collect()
    }

    /// Remove every entry, or only the keys under `namespace`
    async fn clear(&self, namespace: Option<&str>) -> Result<usize>;
}

/// Clear one map handle
///
/// A namespaced clear needs a key scan; a full clear needs the native map
/// clear.
pub async fn clear_connection(map: &dyn RemoteMap, namespace: Option<&str>) -> Result<usize> {
    let capabilities = map.capabilities();
    match namespace {
        None => {
            if !capabilities.clear {
                return Err(CacheError::not_supported(format!(
                    "clear on map '{}'",
                    map.name()
                )));
            }
            map.clear().await
        }
        Some(prefix) => {
            if !capabilities.scan {
                return Err(CacheError::not_supported(format!(
                    "versioned clear needs a key scan on map '{}'",
                    map.name()
                )));
            }
            let keys = map.keys(prefix).await?;
            debug!(
                "Clearing {} key(s) under '{}' on map '{}'",
                keys.len(),
                prefix,
                map.name()
            );
            if keys.is_empty() {
                return Ok(0);
            }
            if capabilities.batch {
                map.remove_all(&keys).await
            } else {
                let mut removed = 0;
                for key in &keys {
                    if map.remove(key).await? {
                        removed += 1;
                    }
                }
                Ok(removed)
            }
        }
    }
}

/// Every key on one map handle
#[derive(Debug, Clone)]
pub struct SingleTopology {
    connections: Vec<Arc<dyn RemoteMap>>,
}

impl SingleTopology {
    pub fn new(map: Arc<dyn RemoteMap>) -> Self {
        Self {
            connections: vec![map],
        }
    }
}

#[async_trait]
impl Topology for SingleTopology {
    fn connections(&self) -> &[Arc<dyn RemoteMap>] {
        &self.connections
    }

    fn shard_for(&self, _key: &str) -> usize {
        0
    }

    async fn clear(&self, namespace: Option<&str>) -> Result<usize> {
        clear_connection(self.connections[0].as_ref(), namespace).await
    }
}

/// Keys spread over independent map handles by hash slot
#[derive(Debug, Clone)]
pub struct ShardedTopology {
    connections: Vec<Arc<dyn RemoteMap>>,
}

impl ShardedTopology {
    pub fn new(connections: Vec<Arc<dyn RemoteMap>>) -> Result<Self> {
        if connections.is_empty() {
            return Err(CacheError::Configuration(
                "sharded topology needs at least one connection".to_string(),
            ));
        }
        Ok(Self { connections })
    }
}

#[async_trait]
impl Topology for ShardedTopology {
    fn connections(&self) -> &[Arc<dyn RemoteMap>] {
        &self.connections
    }

    fn shard_for(&self, key: &str) -> usize {
        usize::from(hash_slot(key)) % self.connections.len()
    }

    async fn clear(&self, namespace: Option<&str>) -> Result<usize> {
        let results = join_all(
            self.connections
                .iter()
                .map(|map| clear_connection(map.as_ref(), namespace)),
        )
        .await;

        let mut removed = 0;
        for result in results {
            removed += result?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyCodec;
    use crate::store::{Capabilities, MemoryMap};

    fn memory_maps(n: usize) -> Vec<Arc<dyn RemoteMap>> {
        (0..n)
            .map(|i| Arc::new(MemoryMap::new(format!("shard-{}", i))) as Arc<dyn RemoteMap>)
            .collect()
    }

    #[test]
    fn test_crc16_reference_values() {
        // CRC-16/XMODEM check value
        assert_eq!(crc16(b"123456789"), 0x31c3);
        assert_eq!(hash_slot("foo"), 12182);
    }

    #[test]
    fn test_hash_tag() {
        let slot1 = hash_slot("user:{1001}:profile");
        let slot2 = hash_slot("user:{1001}:settings");
        let slot3 = hash_slot("{1001}");
        assert_eq!(slot1, slot2);
        assert_eq!(slot1, slot3);
        assert_ne!(slot1, hash_slot("user:{1002}:profile"));

        // Empty tags hash the whole key
        assert_eq!(extract_hash_tag("a{}b"), None);
        assert_eq!(extract_hash_tag("a{b"), None);
    }

    #[test]
    fn test_hash_slot_distribution() {
        let mut slots = std::collections::HashSet::new();
        for i in 0..1000 {
            slots.insert(hash_slot(&format!("key:{}", i)));
        }
        assert!(slots.len() > 100);
    }

    #[test]
    fn test_single_topology_resolves_everything_to_one_map() {
        let topology = SingleTopology::new(Arc::new(MemoryMap::default()));
        assert_eq!(topology.shard_for("a"), 0);
        assert_eq!(topology.shard_for("zzz"), 0);
        assert_eq!(topology.resolve("a").name(), "map");
    }

    #[test]
    fn test_sharded_topology_is_stable() {
        let topology = ShardedTopology::new(memory_maps(3)).unwrap();
        for i in 0..100 {
            let key = format!(":1:key:{}", i);
            let shard = topology.shard_for(&key);
            assert!(shard < 3);
            assert_eq!(topology.shard_for(&key), shard);
        }
    }

    #[test]
    fn test_sharded_topology_requires_connections() {
        assert!(matches!(
            ShardedTopology::new(Vec::new()).unwrap_err(),
            CacheError::Configuration(_)
        ));
    }

    #[test]
    fn test_partition_preserves_relative_order() {
        let topology = ShardedTopology::new(memory_maps(4)).unwrap();
        let codec = KeyCodec::default();
        let keys = codec.make_keys((0..50).map(|i| format!("k{}", i)), None);

        let groups = topology.partition(keys.clone());
        let total: usize = groups.iter().map(|(_, keys)| keys.len()).sum();
        assert_eq!(total, 50);

        for (shard, group) in &groups {
            assert!(group.iter().all(|k| topology.shard_for(k.as_str()) == *shard));
            let positions: Vec<usize> = group
                .iter()
                .map(|k| keys.iter().position(|o| o == k).unwrap())
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[tokio::test]
    async fn test_clear_by_namespace() {
        let map = MemoryMap::default();
        map.put(":1:a", b"1".to_vec(), None).await.unwrap();
        map.put(":1:b", b"2".to_vec(), None).await.unwrap();
        map.put(":2:a", b"3".to_vec(), None).await.unwrap();

        let topology = SingleTopology::new(Arc::new(map.clone()));
        assert_eq!(topology.clear(Some(":1:")).await.unwrap(), 2);
        assert_eq!(map.len(), 1);
        assert!(map.peek(":2:a").is_some());

        assert_eq!(topology.clear(None).await.unwrap(), 1);
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn test_clear_by_namespace_without_batch() {
        let map = MemoryMap::default().with_capabilities(Capabilities {
            scan: true,
            ..Capabilities::BASIC
        });
        map.put(":1:a", b"1".to_vec(), None).await.unwrap();
        map.put(":2:a", b"2".to_vec(), None).await.unwrap();

        assert_eq!(clear_connection(&map, Some(":1:")).await.unwrap(), 1);
        assert_eq!(map.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_without_primitives_is_not_supported() {
        let map = MemoryMap::default().with_capabilities(Capabilities::BASIC);
        assert!(matches!(
            clear_connection(&map, None).await.unwrap_err(),
            CacheError::NotSupported(_)
        ));
        assert!(matches!(
            clear_connection(&map, Some(":1:")).await.unwrap_err(),
            CacheError::NotSupported(_)
        ));
    }

    #[tokio::test]
    async fn test_sharded_clear_sums_all_shards() {
        let maps = memory_maps(3);
        let topology = ShardedTopology::new(maps.clone()).unwrap();
        for i in 0..30 {
            let key = format!(":1:k{}", i);
            topology
                .resolve(&key)
                .put(&key, b"x".to_vec(), None)
                .await
                .unwrap();
        }
        assert_eq!(topology.clear(None).await.unwrap(), 30);
    }
}
