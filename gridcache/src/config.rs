//! Cache settings
//!
//! Host applications describe their caches in a YAML (or JSON) document:
//!
//! ```yaml
//! caches:
//!   default:
//!     BACKEND: gridcache.GridCache
//!     LOCATION: ["10.0.0.1:5701", "10.0.0.2:5701"]
//!     TIMEOUT: 300
//!     KEY_PREFIX: app
//!     OPTIONS:
//!       SERIALIZER_CLASS: json
//!       COMPRESSOR_CLASS: zstd
//!       COMPRESSOR_CLASS_KWARGS: { level: 9 }
//!       PASSWORD: dev-pass
//! ```

use crate::cache::{CacheBuilder, DEFAULT_OPERATION_TIMEOUT, DEFAULT_TIMEOUT_SECS, GridCache};
use crate::compression::Compressor;
use crate::error::{CacheError, Result};
use crate::pipeline::{DecodeMode, WireFormat};
use crate::registry::{self, Options};
use crate::serializer::Serializer;
use crate::store::{GridConfig, GridMap, RemoteMap};
use crate::topology::{ShardedTopology, SingleTopology, Topology};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Connection layout named by `BACKEND`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// One map handle for every key
    Single,
    /// One map handle per location, keys spread by hash slot
    Sharded,
}

impl Backend {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "gridcache.gridcache" | "gridcache" | "single" => Ok(Self::Single),
            "gridcache.shardedgridcache" | "shardedgridcache" | "sharded" => Ok(Self::Sharded),
            _ => Err(CacheError::Configuration(format!(
                "unknown cache backend '{}'",
                name
            ))),
        }
    }
}

/// `LOCATION`: a list of addresses, or one string of `;`/`,` separated ones
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Location {
    One(String),
    Many(Vec<String>),
}

impl Location {
    pub fn addresses(&self) -> Vec<String> {
        let parts: Vec<&str> = match self {
            Self::One(location) => location.split([';', ',']).collect(),
            Self::Many(locations) => locations.iter().map(String::as_str).collect(),
        };
        parts
            .into_iter()
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// `OPTIONS` of one cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
pub struct CacheOptions {
    #[serde(default = "default_serializer")]
    pub serializer_class: String,
    #[serde(default)]
    pub serializer_class_kwargs: Options,
    #[serde(default = "default_compressor")]
    pub compressor_class: String,
    #[serde(default)]
    pub compressor_class_kwargs: Options,
    #[serde(default, alias = "GROUP_PASSWORD")]
    pub password: Option<String>,
    #[serde(default = "default_group_name")]
    pub group_name: String,
    #[serde(default = "default_map_key")]
    pub map_key: String,
    #[serde(default = "default_connection_attempt_limit")]
    pub connection_attempt_limit: u32,
    /// Per-call bound in seconds
    #[serde(default)]
    pub socket_timeout: Option<f64>,
    #[serde(default)]
    pub wire_format: WireFormat,
    #[serde(default)]
    pub lenient_decode: bool,
}

fn default_serializer() -> String {
    "msgpack".to_string()
}

fn default_compressor() -> String {
    "none".to_string()
}

fn default_group_name() -> String {
    "dev".to_string()
}

fn default_map_key() -> String {
    "map".to_string()
}

fn default_connection_attempt_limit() -> u32 {
    1
}

fn default_backend() -> String {
    "gridcache.GridCache".to_string()
}

fn default_timeout() -> Option<u64> {
    Some(DEFAULT_TIMEOUT_SECS)
}

fn default_version() -> i64 {
    1
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            serializer_class: default_serializer(),
            serializer_class_kwargs: Options::new(),
            compressor_class: default_compressor(),
            compressor_class_kwargs: Options::new(),
            password: None,
            group_name: default_group_name(),
            map_key: default_map_key(),
            connection_attempt_limit: default_connection_attempt_limit(),
            socket_timeout: None,
            wire_format: WireFormat::default(),
            lenient_decode: false,
        }
    }
}

/// Settings of one named cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
pub struct CacheSettings {
    #[serde(default = "default_backend")]
    pub backend: String,
    pub location: Location,
    /// Default expiry in seconds; `null` never expires
    #[serde(default = "default_timeout")]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub key_prefix: String,
    #[serde(default = "default_version")]
    pub version: i64,
    #[serde(default)]
    pub options: CacheOptions,
}

impl CacheSettings {
    /// Settings for the given location with every default applied
    pub fn new(location: Location) -> Self {
        Self {
            backend: default_backend(),
            location,
            timeout: default_timeout(),
            key_prefix: String::new(),
            version: default_version(),
            options: CacheOptions::default(),
        }
    }

    pub fn backend(&self) -> Result<Backend> {
        Backend::parse(&self.backend)
    }

    pub fn addresses(&self) -> Vec<String> {
        self.location.addresses()
    }

    /// Per-call bound on remote operations
    pub fn operation_timeout(&self) -> Result<Duration> {
        let Some(secs) = self.options.socket_timeout else {
            return Ok(DEFAULT_OPERATION_TIMEOUT);
        };
        let invalid = || {
            CacheError::Configuration(format!(
                "SOCKET_TIMEOUT must be a positive number of seconds, got {}",
                secs
            ))
        };
        match Duration::try_from_secs_f64(secs) {
            Ok(timeout) if !timeout.is_zero() => Ok(timeout),
            _ => Err(invalid()),
        }
    }

    pub fn serializer(&self) -> Result<Arc<dyn Serializer>> {
        registry::serializers().build(
            &self.options.serializer_class,
            &self.options.serializer_class_kwargs,
        )
    }

    pub fn compressor(&self) -> Result<Arc<dyn Compressor>> {
        registry::compressors().build(
            &self.options.compressor_class,
            &self.options.compressor_class_kwargs,
        )
    }

    /// Grid connection parameters for `addresses`
    pub fn grid_config(&self, addresses: Vec<String>) -> Result<GridConfig> {
        let mut config = GridConfig::new(addresses)
            .with_group_name(self.options.group_name.clone())
            .with_map_name(self.options.map_key.clone())
            .with_connection_attempt_limit(self.options.connection_attempt_limit)
            .with_timeout(self.operation_timeout()?);
        if let Some(ref password) = self.options.password {
            config = config.with_group_password(password.clone());
        }
        Ok(config)
    }

    /// Check everything that can be checked without touching the network
    pub fn validate(&self) -> Result<()> {
        self.backend()?;
        // `prefix:version:` scans would also match a prefix like `prefix:version`
        if self.key_prefix.contains(':') {
            return Err(CacheError::Configuration(format!(
                "KEY_PREFIX must not contain ':', got '{}'",
                self.key_prefix
            )));
        }
        if self.addresses().is_empty() {
            return Err(CacheError::Configuration(
                "LOCATION names no address".to_string(),
            ));
        }
        self.serializer()?;
        self.compressor()?;
        self.operation_timeout()?;
        Ok(())
    }

    /// Connect the map handles named by `LOCATION`
    pub async fn connect_topology(&self) -> Result<Arc<dyn Topology>> {
        let addresses = self.addresses();
        match self.backend()? {
            Backend::Single => {
                let map = GridMap::connect(self.grid_config(addresses)?).await?;
                Ok(Arc::new(SingleTopology::new(Arc::new(map))))
            }
            Backend::Sharded => {
                let configs = addresses
                    .into_iter()
                    .map(|address| self.grid_config(vec![address]))
                    .collect::<Result<Vec<_>>>()?;
                let maps = join_all(configs.into_iter().map(GridMap::connect))
                    .await
                    .into_iter()
                    .map(|map| map.map(|m| Arc::new(m) as Arc<dyn RemoteMap>))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(ShardedTopology::new(maps)?))
            }
        }
    }

    /// Apply strategies, key scheme and timeouts to a builder
    pub fn configure(&self, builder: CacheBuilder) -> Result<CacheBuilder> {
        let decode_mode = if self.options.lenient_decode {
            DecodeMode::Lenient
        } else {
            DecodeMode::Strict
        };
        Ok(builder
            .serializer(self.serializer()?)
            .compressor(self.compressor()?)
            .key_prefix(self.key_prefix.clone())
            .version(self.version)
            .default_timeout(self.timeout)
            .operation_timeout(self.operation_timeout()?)
            .wire_format(self.options.wire_format)
            .decode_mode(decode_mode))
    }
}

impl GridCache {
    /// Build a cache from settings, connecting to the grid
    ///
    /// Strategy names and options are checked before any connection attempt.
    pub async fn from_settings(settings: &CacheSettings) -> Result<Self> {
        settings.validate()?;
        let topology = settings.connect_topology().await?;
        info!(
            "Connected cache backend {} at {:?}",
            settings.backend, settings.addresses()
        );
        let span = tracing::info_span!("gridcache", prefix = %settings.key_prefix);
        Ok(settings
            .configure(GridCache::builder(topology))?
            .span(span)
            .build())
    }
}

/// Settings document holding named caches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub caches: BTreeMap<String, CacheSettings>,
}

impl SettingsFile {
    /// Load settings from a `.json` file, or YAML for any other extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| CacheError::Configuration(format!("invalid settings: {}", e)))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| CacheError::Configuration(format!("invalid settings: {}", e)))
    }

    /// Settings of the cache called `name`
    pub fn cache(&self, name: &str) -> Result<&CacheSettings> {
        self.caches
            .get(name)
            .ok_or_else(|| CacheError::Configuration(format!("no cache named '{}'", name)))
    }
}
