//! Key versioning
//!
//! Every logical key is bound to a cache version before it reaches the store.
//! The versioned form is `prefix:version:key`, so bumping the version moves a
//! whole cache generation to a fresh namespace.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use tracing::warn;

/// Longest key accepted without a portability warning
pub const MAX_PORTABLE_KEY_LEN: usize = 250;

/// A logical key bound to a cache version
///
/// Equality and hashing only look at the versioned string, so a
/// `VersionedKey` can stand in for that plain string in map lookups.
#[derive(Debug, Clone, Eq)]
pub struct VersionedKey {
    original: String,
    version: i64,
    versioned: String,
}

impl VersionedKey {
    /// The caller-supplied key
    pub fn original(&self) -> &str {
        &self.original
    }

    /// The version this key was bound to
    pub fn version(&self) -> i64 {
        self.version
    }

    /// The key as sent to the store
    pub fn as_str(&self) -> &str {
        &self.versioned
    }

    pub fn into_string(self) -> String {
        self.versioned
    }
}

impl PartialEq for VersionedKey {
    fn eq(&self, other: &Self) -> bool {
        self.versioned == other.versioned
    }
}

impl PartialEq<str> for VersionedKey {
    fn eq(&self, other: &str) -> bool {
        self.versioned == other
    }
}

impl PartialEq<&str> for VersionedKey {
    fn eq(&self, other: &&str) -> bool {
        self.versioned == *other
    }
}

impl PartialEq<String> for VersionedKey {
    fn eq(&self, other: &String) -> bool {
        &self.versioned == other
    }
}

impl Hash for VersionedKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.versioned.hash(state);
    }
}

impl Borrow<str> for VersionedKey {
    fn borrow(&self) -> &str {
        &self.versioned
    }
}

impl AsRef<str> for VersionedKey {
    fn as_ref(&self) -> &str {
        &self.versioned
    }
}

impl fmt::Display for VersionedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.versioned)
    }
}

/// Anything a cache operation accepts as a key
///
/// Plain strings pick up the version of the call (or the default version);
/// `(key, version)` tuples pin a version; an existing [`VersionedKey`] is used
/// as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyInput {
    Plain { key: String, version: Option<i64> },
    Prepared(VersionedKey),
}

impl From<&str> for KeyInput {
    fn from(key: &str) -> Self {
        Self::Plain {
            key: key.to_string(),
            version: None,
        }
    }
}

impl From<String> for KeyInput {
    fn from(key: String) -> Self {
        Self::Plain { key, version: None }
    }
}

impl From<&String> for KeyInput {
    fn from(key: &String) -> Self {
        Self::from(key.as_str())
    }
}

impl From<(&str, i64)> for KeyInput {
    fn from((key, version): (&str, i64)) -> Self {
        Self::Plain {
            key: key.to_string(),
            version: Some(version),
        }
    }
}

impl From<(String, i64)> for KeyInput {
    fn from((key, version): (String, i64)) -> Self {
        Self::Plain {
            key,
            version: Some(version),
        }
    }
}

impl From<VersionedKey> for KeyInput {
    fn from(key: VersionedKey) -> Self {
        Self::Prepared(key)
    }
}

impl From<&VersionedKey> for KeyInput {
    fn from(key: &VersionedKey) -> Self {
        Self::Prepared(key.clone())
    }
}

/// Deterministic `(key, version)` → [`VersionedKey`] codec
#[derive(Debug, Clone)]
pub struct KeyCodec {
    prefix: String,
    default_version: i64,
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self::new("", 1)
    }
}

impl KeyCodec {
    pub fn new(prefix: impl Into<String>, default_version: i64) -> Self {
        Self {
            prefix: prefix.into(),
            default_version,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn default_version(&self) -> i64 {
        self.default_version
    }

    /// Bind `key` to a version
    ///
    /// An explicit `version` wins over a version carried by the key input,
    /// which wins over the default. Already versioned keys are returned
    /// unchanged so a key is never prefixed twice.
    pub fn make_key(&self, key: impl Into<KeyInput>, version: Option<i64>) -> VersionedKey {
        match key.into() {
            KeyInput::Prepared(key) => key,
            KeyInput::Plain {
                key,
                version: carried,
            } => {
                let version = version.or(carried).unwrap_or(self.default_version);
                check_key(&key);
                VersionedKey {
                    versioned: format!("{}{}", self.namespace(version), key),
                    original: key,
                    version,
                }
            }
        }
    }

    /// [`KeyCodec::make_key`] over a sequence, preserving order
    pub fn make_keys<I, K>(&self, keys: I, version: Option<i64>) -> Vec<VersionedKey>
    where
        I: IntoIterator<Item = K>,
        K: Into<KeyInput>,
    {
        keys.into_iter()
            .map(|key| self.make_key(key, version))
            .collect()
    }

    /// Prefix shared by every key of `version`
    ///
    /// Only unique to this codec while the prefix holds no `:`. Settings
    /// validation rejects such prefixes; builders do not check.
    pub fn namespace(&self, version: i64) -> String {
        format!("{}:{}:", self.prefix, version)
    }
}

fn check_key(key: &str) {
    if key.len() > MAX_PORTABLE_KEY_LEN {
        warn!(
            "Cache key longer than {} bytes may not be portable: {}...",
            MAX_PORTABLE_KEY_LEN,
            key.chars().take(32).collect::<String>()
        );
    } else if key.chars().any(|c| c.is_control() || c == ' ') {
        warn!("Cache key contains spaces or control characters: {:?}", key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_format() {
        let codec = KeyCodec::new("app", 3);
        let key = codec.make_key("user:1", None);
        assert_eq!(key.as_str(), "app:3:user:1");
        assert_eq!(key.original(), "user:1");
        assert_eq!(key.version(), 3);
    }

    #[test]
    fn test_empty_prefix() {
        let key = KeyCodec::default().make_key("k", None);
        assert_eq!(key, ":1:k");
    }

    #[test]
    fn test_make_key_is_idempotent() {
        let codec = KeyCodec::new("p", 1);
        let once = codec.make_key("k", Some(2));
        let twice = codec.make_key(once.clone(), Some(2));
        assert_eq!(once, twice);
        assert_eq!(twice.as_str(), "p:2:k");

        // A different version argument does not re-prefix a prepared key
        let again = codec.make_key(&once, Some(9));
        assert_eq!(again.as_str(), "p:2:k");
    }

    #[test]
    fn test_versions_do_not_collide() {
        let codec = KeyCodec::new("p", 1);
        assert_ne!(codec.make_key("k", Some(1)), codec.make_key("k", Some(2)));
    }

    #[test]
    fn test_deterministic() {
        let codec = KeyCodec::new("p", 1);
        assert_eq!(codec.make_key("k", None), codec.make_key("k".to_string(), None));
    }

    #[test]
    fn test_version_precedence() {
        let codec = KeyCodec::new("p", 1);
        assert_eq!(codec.make_key(("k", 5), None).as_str(), "p:5:k");
        assert_eq!(codec.make_key(("k", 5), Some(7)).as_str(), "p:7:k");
    }

    #[test]
    fn test_make_keys_preserves_order() {
        let codec = KeyCodec::new("p", 1);
        let keys = codec.make_keys(["c", "a", "b"], None);
        let originals: Vec<&str> = keys.iter().map(VersionedKey::original).collect();
        assert_eq!(originals, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_equality_with_strings() {
        let key = KeyCodec::new("p", 1).make_key("k", None);
        assert_eq!(key, "p:1:k");
        assert_eq!(key, "p:1:k".to_string());
        assert!(key != "k");
    }

    #[test]
    fn test_hash_lookup_by_str() {
        let codec = KeyCodec::new("p", 1);
        let set: HashSet<VersionedKey> = codec.make_keys(["a", "b"], None).into_iter().collect();
        assert!(set.contains("p:1:a"));
        assert!(!set.contains("p:2:a"));
    }

    #[test]
    fn test_namespace() {
        let codec = KeyCodec::new("p", 1);
        let key = codec.make_key("k", Some(4));
        assert!(key.as_str().starts_with(&codec.namespace(4)));
    }

    #[test]
    fn test_long_keys_are_accepted() {
        let long = "x".repeat(MAX_PORTABLE_KEY_LEN + 10);
        let key = KeyCodec::default().make_key(long.as_str(), None);
        assert_eq!(key.original(), long);
    }
}
