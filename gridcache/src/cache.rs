//! Cache client facade
//!
//! Every operation runs the same steps: version the key, resolve the map
//! handle serving it, encode or decode the value, then make the remote call
//! bounded by the operation timeout.

use crate::compression::{Compressor, NoopCompressor};
use crate::error::{CacheError, Result};
use crate::key::{KeyCodec, KeyInput, VersionedKey};
use crate::pipeline::{DecodeMode, ValuePipeline, WireFormat};
use crate::serializer::{MsgPackSerializer, Serializer};
use crate::store::RemoteMap;
use crate::topology::Topology;
use crate::value::CacheValue;
use futures::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, Span, debug, info};

/// Default expiry of stored entries, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 1000;

/// Default bound on a single remote call
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Expiry of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// The cache's configured default
    #[default]
    Default,
    /// Never expire
    Never,
    /// Expire after this many seconds; `0` expires immediately
    Seconds(u64),
}

impl From<u64> for Timeout {
    fn from(secs: u64) -> Self {
        Self::Seconds(secs)
    }
}

/// Whole seconds, fractions truncated
impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Self::Seconds(duration.as_secs())
    }
}

impl From<Option<u64>> for Timeout {
    fn from(secs: Option<u64>) -> Self {
        secs.map_or(Self::Never, Self::Seconds)
    }
}

/// Builder for [`GridCache`]
#[derive(Debug)]
pub struct CacheBuilder {
    topology: Arc<dyn Topology>,
    serializer: Option<Arc<dyn Serializer>>,
    compressor: Option<Arc<dyn Compressor>>,
    key_prefix: String,
    version: i64,
    default_timeout: Option<u64>,
    operation_timeout: Duration,
    wire_format: WireFormat,
    decode_mode: DecodeMode,
    span: Option<Span>,
}

impl CacheBuilder {
    pub fn new(topology: Arc<dyn Topology>) -> Self {
        Self {
            topology,
            serializer: None,
            compressor: None,
            key_prefix: String::new(),
            version: 1,
            default_timeout: Some(DEFAULT_TIMEOUT_SECS),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            wire_format: WireFormat::default(),
            decode_mode: DecodeMode::default(),
            span: None,
        }
    }

    /// Serializer for non-integer values (MessagePack if unset)
    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Compressor for serialized payloads (none if unset)
    pub fn compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Version applied to keys that carry none
    pub fn version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    /// Expiry used by [`Timeout::Default`]; `None` never expires
    pub fn default_timeout(mut self, secs: Option<u64>) -> Self {
        self.default_timeout = secs;
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn wire_format(mut self, wire_format: WireFormat) -> Self {
        self.wire_format = wire_format;
        self
    }

    pub fn decode_mode(mut self, decode_mode: DecodeMode) -> Self {
        self.decode_mode = decode_mode;
        self
    }

    /// Span every operation of the cache runs under
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> GridCache {
        let serializer = self
            .serializer
            .unwrap_or_else(|| Arc::new(MsgPackSerializer::new()));
        let compressor = self
            .compressor
            .unwrap_or_else(|| Arc::new(NoopCompressor::new()));
        let pipeline = ValuePipeline::new(serializer, compressor)
            .with_wire_format(self.wire_format)
            .with_decode_mode(self.decode_mode);

        info!(
            "Cache ready: {} connection(s), serializer={}, compressor={}, wire={:?}",
            self.topology.connections().len(),
            pipeline.serializer().name(),
            pipeline.compressor().name(),
            pipeline.wire_format()
        );

        GridCache {
            topology: self.topology,
            codec: KeyCodec::new(self.key_prefix, self.version),
            pipeline,
            default_timeout: self.default_timeout,
            operation_timeout: self.operation_timeout,
            span: self.span.unwrap_or_else(Span::none),
        }
    }
}

/// Versioned key/value cache over a data grid
///
/// Cheap to clone; clones share the same connections and strategies.
///
/// ```no_run
/// use gridcache::{GridCache, GridConfig, GridMap, SingleTopology, Timeout};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let map = GridMap::connect(GridConfig::new(["127.0.0.1:5701"])).await?;
/// let cache = GridCache::builder(Arc::new(SingleTopology::new(Arc::new(map))))
///     .key_prefix("app")
///     .build();
///
/// cache.set("greeting", "hello", Timeout::Seconds(60)).await?;
/// let value = cache.get("greeting").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct GridCache {
    topology: Arc<dyn Topology>,
    codec: KeyCodec,
    pipeline: ValuePipeline,
    default_timeout: Option<u64>,
    operation_timeout: Duration,
    span: Span,
}

impl GridCache {
    pub fn builder(topology: Arc<dyn Topology>) -> CacheBuilder {
        CacheBuilder::new(topology)
    }

    pub fn key_codec(&self) -> &KeyCodec {
        &self.codec
    }

    pub fn pipeline(&self) -> &ValuePipeline {
        &self.pipeline
    }

    pub fn topology(&self) -> &Arc<dyn Topology> {
        &self.topology
    }

    /// Bind a key to the cache's prefix and version
    pub fn make_key(&self, key: impl Into<KeyInput>, version: Option<i64>) -> VersionedKey {
        self.codec.make_key(key, version)
    }

    /// Seconds of expiry sent to the store, `None` for no expiry
    pub fn ttl_secs(&self, timeout: Timeout) -> Option<u64> {
        match timeout {
            Timeout::Default => self.default_timeout,
            Timeout::Never => None,
            Timeout::Seconds(secs) => Some(secs),
        }
    }

    async fn remote<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.operation_timeout, call)
            .await
            .map_err(|_| CacheError::Timeout)?
    }

    /// Store `value` only if `key` is absent
    ///
    /// Returns whether the value was stored. The check and the write are one
    /// atomic remote call; the entry expires after the default timeout.
    pub async fn add(
        &self,
        key: impl Into<KeyInput>,
        value: impl Into<CacheValue>,
    ) -> Result<bool> {
        let key = self.make_key(key, None);
        let value = value.into();
        async {
            let payload = self.pipeline.encode(&value)?;
            let map = self.topology.resolve(key.as_str());
            let stored = self
                .remote(map.put_if_absent(
                    key.as_str(),
                    payload,
                    self.ttl_secs(Timeout::Default),
                ))
                .await?;
            debug!("ADD key={} stored={}", key, stored);
            Ok(stored)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Value at `key`, `None` when absent or expired
    pub async fn get(&self, key: impl Into<KeyInput>) -> Result<Option<CacheValue>> {
        let key = self.make_key(key, None);
        async {
            let map = self.topology.resolve(key.as_str());
            let payload = self.remote(map.get(key.as_str())).await?;
            debug!("GET key={} hit={}", key, payload.is_some());
            payload.map(|p| self.pipeline.decode(&p)).transpose()
        }
        .instrument(self.span.clone())
        .await
    }

    /// Value at `key`, or `default` when absent
    pub async fn get_or(
        &self,
        key: impl Into<KeyInput>,
        default: impl Into<CacheValue>,
    ) -> Result<CacheValue> {
        Ok(self.get(key).await?.unwrap_or_else(|| default.into()))
    }

    /// Whether a live entry exists at `key`, without decoding it
    pub async fn has_key(&self, key: impl Into<KeyInput>) -> Result<bool> {
        let key = self.make_key(key, None);
        async {
            let map = self.topology.resolve(key.as_str());
            Ok(self.remote(map.get(key.as_str())).await?.is_some())
        }
        .instrument(self.span.clone())
        .await
    }

    /// Store `value` at `key`, replacing any previous value
    pub async fn set(
        &self,
        key: impl Into<KeyInput>,
        value: impl Into<CacheValue>,
        timeout: impl Into<Timeout>,
    ) -> Result<()> {
        let key = self.make_key(key, None);
        let value = value.into();
        let ttl = self.ttl_secs(timeout.into());
        async {
            let payload = self.pipeline.encode(&value)?;
            let map = self.topology.resolve(key.as_str());
            self.remote(map.put(key.as_str(), payload, ttl)).await?;
            debug!("SET key={} ttl={:?}", key, ttl);
            Ok(())
        }
        .instrument(self.span.clone())
        .await
    }

    /// Remove `key`; returns whether something was removed
    pub async fn delete(&self, key: impl Into<KeyInput>) -> Result<bool> {
        let key = self.make_key(key, None);
        async {
            let map = self.topology.resolve(key.as_str());
            let removed = self.remote(map.remove(key.as_str())).await?;
            debug!("DELETE key={} removed={}", key, removed);
            Ok(removed)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Present values for `keys`, keyed by the caller's original key
    ///
    /// Shards that declare batching are read in one round trip each.
    pub async fn get_many<I, K>(&self, keys: I) -> Result<HashMap<String, CacheValue>>
    where
        I: IntoIterator<Item = K>,
        K: Into<KeyInput>,
    {
        let keys = self.codec.make_keys(keys, None);
        async {
            let groups = self.topology.partition(keys);
            let reads = groups.iter().map(|(shard, keys)| {
                let map = &self.topology.connections()[*shard];
                self.read_shard(map.as_ref(), keys)
            });

            let mut found = HashMap::new();
            for (result, (_, keys)) in join_all(reads).await.into_iter().zip(&groups) {
                for (key, payload) in keys.iter().zip(result?) {
                    if let Some(payload) = payload {
                        found.insert(key.original().to_string(), self.pipeline.decode(&payload)?);
                    }
                }
            }
            debug!("GET_MANY found={}", found.len());
            Ok(found)
        }
        .instrument(self.span.clone())
        .await
    }

    async fn read_shard(
        &self,
        map: &dyn RemoteMap,
        keys: &[VersionedKey],
    ) -> Result<Vec<Option<Vec<u8>>>> {
        if map.capabilities().batch {
            let names: Vec<String> = keys.iter().map(|k| k.as_str().to_string()).collect();
            return self.remote(map.get_all(&names)).await;
        }

        let mut payloads = Vec::with_capacity(keys.len());
        for key in keys {
            payloads.push(self.remote(map.get(key.as_str())).await?);
        }
        Ok(payloads)
    }

    /// Store several entries with one expiry
    ///
    /// Every value is encoded before anything is written. When writes fail,
    /// the error is [`CacheError::PartialWrite`] naming the original keys that
    /// were not stored.
    pub async fn set_many<I, K, V>(&self, entries: I, timeout: impl Into<Timeout>) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<KeyInput>,
        V: Into<CacheValue>,
    {
        let ttl = self.ttl_secs(timeout.into());
        let entries: Vec<(VersionedKey, CacheValue)> = entries
            .into_iter()
            .map(|(key, value)| (self.make_key(key, None), value.into()))
            .collect();

        async {
            let mut payloads: HashMap<VersionedKey, Vec<u8>> = HashMap::new();
            let mut keys = Vec::with_capacity(entries.len());
            for (key, value) in &entries {
                let payload = self.pipeline.encode(value)?;
                if payloads.insert(key.clone(), payload).is_none() {
                    keys.push(key.clone());
                }
            }

            let mut groups = Vec::new();
            for (shard, keys) in self.topology.partition(keys) {
                let batch: Vec<(VersionedKey, Vec<u8>)> = keys
                    .into_iter()
                    .filter_map(|key| payloads.remove(key.as_str()).map(|p| (key, p)))
                    .collect();
                groups.push((shard, batch));
            }

            let writes = groups.into_iter().map(|(shard, batch)| {
                let map = &self.topology.connections()[shard];
                self.write_shard(map.as_ref(), batch, ttl)
            });

            let mut failed = Vec::new();
            let mut first_error = None;
            for (keys, error) in join_all(writes).await.into_iter().flatten() {
                failed.extend(keys);
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }

            debug!("SET_MANY count={} failed={}", entries.len(), failed.len());
            match first_error {
                None => Ok(()),
                Some(source) => Err(CacheError::PartialWrite {
                    failed,
                    source: Box::new(source),
                }),
            }
        }
        .instrument(self.span.clone())
        .await
    }

    /// Write one shard's entries; on failure, the original keys not written
    async fn write_shard(
        &self,
        map: &dyn RemoteMap,
        batch: Vec<(VersionedKey, Vec<u8>)>,
        ttl: Option<u64>,
    ) -> Option<(Vec<String>, CacheError)> {
        if map.capabilities().batch {
            let originals: Vec<String> = batch.iter().map(|(k, _)| k.original().to_string()).collect();
            let entries = batch
                .into_iter()
                .map(|(key, payload)| (key.into_string(), payload))
                .collect();
            return self
                .remote(map.put_all(entries, ttl))
                .await
                .err()
                .map(|e| (originals, e));
        }

        let mut failed = Vec::new();
        let mut first_error = None;
        for (key, payload) in batch {
            if let Err(e) = self.remote(map.put(key.as_str(), payload, ttl)).await {
                failed.push(key.original().to_string());
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        first_error.map(|e| (failed, e))
    }

    /// Remove several keys; returns how many were removed
    pub async fn delete_many<I, K>(&self, keys: I) -> Result<usize>
    where
        I: IntoIterator<Item = K>,
        K: Into<KeyInput>,
    {
        let keys = self.codec.make_keys(keys, None);
        async {
            let groups = self.topology.partition(keys);
            let removals = groups.iter().map(|(shard, keys)| {
                let map = &self.topology.connections()[*shard];
                self.remove_shard(map.as_ref(), keys)
            });

            let mut removed = 0;
            for result in join_all(removals).await {
                removed += result?;
            }
            debug!("DELETE_MANY removed={}", removed);
            Ok(removed)
        }
        .instrument(self.span.clone())
        .await
    }

    async fn remove_shard(&self, map: &dyn RemoteMap, keys: &[VersionedKey]) -> Result<usize> {
        if map.capabilities().batch {
            let names: Vec<String> = keys.iter().map(|k| k.as_str().to_string()).collect();
            return self.remote(map.remove_all(&names)).await;
        }

        let mut removed = 0;
        for key in keys {
            if self.remote(map.remove(key.as_str())).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every entry, or only the entries of `version`
    pub async fn clear(&self, version: Option<i64>) -> Result<usize> {
        let namespace = version.map(|v| self.codec.namespace(v));
        async {
            let removed = self
                .remote(self.topology.clear(namespace.as_deref()))
                .await?;
            info!("Cleared {} entries (version={:?})", removed, version);
            Ok(removed)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Atomically add `delta` to the integer at `key` and return the result
    ///
    /// An absent key counts as 0. Needs the store's increment primitive and
    /// the inferred wire format, where integers are stored as plain text.
    pub async fn incr(&self, key: impl Into<KeyInput>, delta: i64) -> Result<i64> {
        let key = self.make_key(key, None);
        async {
            if self.pipeline.wire_format() == WireFormat::Tagged {
                return Err(CacheError::not_supported(
                    "increment of tagged payloads",
                ));
            }
            let map = self.topology.resolve(key.as_str());
            if !map.capabilities().incr {
                return Err(CacheError::not_supported(format!(
                    "atomic increment on map '{}'",
                    map.name()
                )));
            }
            let value = self.remote(map.incr(key.as_str(), delta)).await?;
            debug!("INCR key={} delta={} value={}", key, delta, value);
            Ok(value)
        }
        .instrument(self.span.clone())
        .await
    }

    pub async fn decr(&self, key: impl Into<KeyInput>, delta: i64) -> Result<i64> {
        self.incr(key, negate(delta)?).await
    }

    /// Move the entry at `key` to version `version + delta`
    ///
    /// Returns the new version. The stored payload is copied as is, then the
    /// old entry removed; the copy gets the default timeout.
    pub async fn incr_version(&self, key: impl Into<KeyInput>, delta: i64) -> Result<i64> {
        let old_key = self.make_key(key, None);
        async {
            let old_map = self.topology.resolve(old_key.as_str());
            let payload = self
                .remote(old_map.get(old_key.as_str()))
                .await?
                .ok_or_else(|| CacheError::KeyNotFound(old_key.to_string()))?;

            if delta == 0 {
                return Ok(old_key.version());
            }

            let new_version = old_key.version().checked_add(delta).ok_or_else(|| {
                CacheError::InvalidArgument(format!("version overflow for '{}'", old_key))
            })?;
            let new_key = self.make_key(old_key.original(), Some(new_version));

            let new_map = self.topology.resolve(new_key.as_str());
            self.remote(new_map.put(
                new_key.as_str(),
                payload,
                self.ttl_secs(Timeout::Default),
            ))
            .await?;
            self.remote(old_map.remove(old_key.as_str())).await?;

            debug!("INCR_VERSION {} -> {}", old_key, new_key);
            Ok(new_version)
        }
        .instrument(self.span.clone())
        .await
    }

    pub async fn decr_version(&self, key: impl Into<KeyInput>, delta: i64) -> Result<i64> {
        self.incr_version(key, negate(delta)?).await
    }
}

fn negate(delta: i64) -> Result<i64> {
    delta
        .checked_neg()
        .ok_or_else(|| CacheError::InvalidArgument(format!("cannot negate delta {}", delta)))
}
