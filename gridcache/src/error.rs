//! Error types for gridcache

use thiserror::Error;

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Cache error types
#[derive(Error, Debug)]
pub enum CacheError {
    /// Unresolvable strategy name, unknown backend or malformed options
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Remote store unreachable or connection attempt limit exceeded
    #[error("Connection error: {0}")]
    Connection(String),

    /// A value could not be serialized
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// A stored payload could not be decompressed or deserialized
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// A payload could not be compressed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Operation timeout
    #[error("Operation timeout")]
    Timeout,

    /// The backing store does not provide the primitive this operation needs
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// An argument outside the range an operation accepts
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Key not found
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Some entries of a multi-key write were not stored
    #[error("Partial write: {} key(s) not stored: {source}", failed.len())]
    PartialWrite {
        /// Original keys that were not written
        failed: Vec<String>,
        /// First failure encountered
        #[source]
        source: Box<CacheError>,
    },

    /// Server returned an error
    #[error("Server error: {0}")]
    Server(String),

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Settings file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// Shorthand for a [`CacheError::NotSupported`] naming the missing primitive
    pub fn not_supported(what: impl Into<String>) -> Self {
        Self::NotSupported(what.into())
    }

    /// Whether this error was caused by an exceeded deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}
