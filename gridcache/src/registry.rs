//! Name-to-factory registries for serializers and compressors
//!
//! Settings name a strategy (`SERIALIZER_CLASS: msgpack`) and pass constructor
//! options (`SERIALIZER_CLASS_KWARGS`). The registry resolves the pair once at
//! startup into a shared instance; unknown names fail with
//! [`CacheError::Configuration`].

use crate::compression::{Compressor, Lz4Compressor, NoopCompressor, ZstdCompressor};
use crate::error::{CacheError, Result};
use crate::serializer::{
    JsonSerializer, MsgPackSerializer, PassthroughSerializer, Serializer, YamlSerializer,
};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Constructor options passed to a strategy factory
pub type Options = serde_json::Map<String, serde_json::Value>;

/// Factory building a strategy from its options
pub type Factory<T> = fn(&Options) -> Result<Arc<T>>;

/// Parse an options object into a typed struct, reporting problems as
/// configuration errors
pub fn parse_options<T: DeserializeOwned>(what: &str, options: &Options) -> Result<T> {
    serde_json::from_value(serde_json::Value::Object(options.clone()))
        .map_err(|e| CacheError::Configuration(format!("{}: {}", what, e)))
}

/// Case-insensitive name → factory map
pub struct Registry<T: ?Sized> {
    kind: &'static str,
    factories: HashMap<String, Factory<T>>,
}

impl<T: ?Sized> Registry<T> {
    /// Create an empty registry; `kind` is used in error messages
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            factories: HashMap::new(),
        }
    }

    /// Register a factory under one or more names, replacing earlier entries
    pub fn register(&mut self, names: &[&str], factory: Factory<T>) -> &mut Self {
        for name in names {
            self.factories.insert(name.to_ascii_lowercase(), factory);
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_ascii_lowercase())
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve `name` and construct the strategy with `options`
    pub fn build(&self, name: &str, options: &Options) -> Result<Arc<T>> {
        let factory = self
            .factories
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| {
                CacheError::Configuration(format!("unknown {} '{}'", self.kind, name))
            })?;
        factory(options)
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("names", &self.names())
            .finish()
    }
}

/// Registry pre-populated with the built-in serializers
pub fn serializers() -> Registry<dyn Serializer> {
    let mut registry: Registry<dyn Serializer> = Registry::new("serializer");
    registry
        .register(&["json", "JSONSerializer"], |opts| {
            Ok(Arc::new(JsonSerializer::from_options(opts)?))
        })
        .register(&["msgpack", "messagepack", "MSGPackSerializer"], |opts| {
            Ok(Arc::new(MsgPackSerializer::from_options(opts)?))
        })
        .register(&["yaml", "YAMLSerializer"], |opts| {
            Ok(Arc::new(YamlSerializer::from_options(opts)?))
        })
        .register(&["passthrough", "dummy", "raw", "DummySerializer"], |opts| {
            Ok(Arc::new(PassthroughSerializer::from_options(opts)?))
        });
    registry
}

/// Registry pre-populated with the built-in compressors
pub fn compressors() -> Registry<dyn Compressor> {
    let mut registry: Registry<dyn Compressor> = Registry::new("compressor");
    registry
        .register(&["none", "noop", "identity", "NoopCompressor"], |opts| {
            Ok(Arc::new(NoopCompressor::from_options(opts)?))
        })
        .register(&["lz4", "Lz4Compressor"], |opts| {
            Ok(Arc::new(Lz4Compressor::from_options(opts)?))
        })
        .register(&["zstd", "ZstdCompressor"], |opts| {
            Ok(Arc::new(ZstdCompressor::from_options(opts)?))
        });
    registry
}
