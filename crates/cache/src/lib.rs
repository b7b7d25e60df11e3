//! Cache key derivation for analysis results
//!
//! An analysis result is reusable iff the content bytes and the full
//! processing configuration that produced it are unchanged. This crate turns
//! `(ContentIdentity, ProcessingConfig)` into a fixed-length digest that the
//! stores use as the sole criterion for reuse.
//!
//! Key derivation is deterministic: configuration is re-serialized with
//! recursively sorted object keys before hashing, so field insertion order
//! never changes the key.

use thiserror::Error;

pub mod config;
pub mod identity;
pub mod key;

pub use config::ProcessingConfig;
pub use identity::{ContentFingerprint, ContentIdentity};
pub use key::CacheKey;

/// Key derivation errors
#[derive(Error, Debug)]
pub enum KeyError {
    /// The content behind a locator could not be fingerprinted. Never mapped
    /// to a placeholder fingerprint: distinct unreadable subjects must not
    /// collide on one cache key.
    #[error("content unavailable: {locator}: {source}")]
    ContentUnavailable {
        locator: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for key derivation
pub type KeyResult<T> = Result<T, KeyError>;
