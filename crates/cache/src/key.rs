//! Cache key digest

use crate::{ContentIdentity, KeyResult, ProcessingConfig};
use serde::{Deserialize, Serialize};

/// Fixed-length digest of `(ContentIdentity, ProcessingConfig)`.
///
/// The sole lookup handle across the derived stores. Immutable once
/// computed; only ever recomputed from its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for one subject + configuration pair.
    ///
    /// The locator, the resolved content fingerprint and the canonical
    /// config encoding are folded into a single blake3 digest. Fails with
    /// `ContentUnavailable` when the identity cannot be fingerprinted.
    pub fn derive(identity: &ContentIdentity, config: &ProcessingConfig) -> KeyResult<Self> {
        let fingerprint = identity.resolve()?;

        let payload = ProcessingConfig::from_value(serde_json::json!({
            "locator": identity.locator,
            "fingerprint": serde_json::to_value(&fingerprint)?,
            "config": config.as_value(),
        }));

        let digest = blake3::hash(&payload.canonical_bytes());
        Ok(Self(digest.to_hex().to_string()))
    }

    /// Hex form of the digest (64 lowercase characters)
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContentFingerprint;
    use serde_json::json;

    fn identity() -> ContentIdentity {
        ContentIdentity::with_fingerprint(
            "/videos/clip.mp4",
            ContentFingerprint::Stat {
                size: 1024,
                mtime_ms: 1_700_000_000_000,
            },
        )
    }

    #[test]
    fn test_derive_is_deterministic() {
        let config = ProcessingConfig::from_value(json!({"model": "llava:13b", "width": 1280}));
        let a = CacheKey::derive(&identity(), &config).unwrap();
        let b = CacheKey::derive(&identity(), &config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_derive_ignores_field_insertion_order() {
        // serde_json::Map preserves nothing here, so construct two values
        // whose textual forms differ in order.
        let a: serde_json::Value =
            serde_json::from_str(r#"{"model": "llava:13b", "width": 1280}"#).unwrap();
        let b: serde_json::Value =
            serde_json::from_str(r#"{"width": 1280, "model": "llava:13b"}"#).unwrap();

        let ka = CacheKey::derive(&identity(), &ProcessingConfig::from_value(a)).unwrap();
        let kb = CacheKey::derive(&identity(), &ProcessingConfig::from_value(b)).unwrap();
        assert_eq!(ka, kb);
    }

    #[test]
    fn test_derive_is_sensitive_to_config_changes() {
        let base = ProcessingConfig::from_value(json!({"model": "llava:13b", "width": 1280}));
        let changed = ProcessingConfig::from_value(json!({"model": "llava:34b", "width": 1280}));

        let ka = CacheKey::derive(&identity(), &base).unwrap();
        let kb = CacheKey::derive(&identity(), &changed).unwrap();
        assert_ne!(ka, kb);
    }

    #[test]
    fn test_derive_is_sensitive_to_fingerprint_changes() {
        let config = ProcessingConfig::from_value(json!({"model": "llava:13b"}));
        let touched = ContentIdentity::with_fingerprint(
            "/videos/clip.mp4",
            ContentFingerprint::Stat {
                size: 1024,
                mtime_ms: 1_700_000_000_001,
            },
        );

        let ka = CacheKey::derive(&identity(), &config).unwrap();
        let kb = CacheKey::derive(&touched, &config).unwrap();
        assert_ne!(ka, kb);
    }

    #[test]
    fn test_derive_is_sensitive_to_locator() {
        let config = ProcessingConfig::from_value(json!({"model": "llava:13b"}));
        let fp = ContentFingerprint::Stat {
            size: 1024,
            mtime_ms: 1_700_000_000_000,
        };
        let other = ContentIdentity::with_fingerprint("/videos/other.mp4", fp);

        let ka = CacheKey::derive(&identity(), &config).unwrap();
        let kb = CacheKey::derive(&other, &config).unwrap();
        assert_ne!(ka, kb);
    }

    #[test]
    fn test_kind_scoping_separates_key_spaces() {
        use video_insight_common::AnalysisKind;

        let config = ProcessingConfig::from_value(json!({"model": "llava:13b"}));
        let ka =
            CacheKey::derive(&identity(), &config.for_kind(AnalysisKind::Keyframes)).unwrap();
        let kb =
            CacheKey::derive(&identity(), &config.for_kind(AnalysisKind::Embeddings)).unwrap();
        assert_ne!(ka, kb);
    }

    #[test]
    fn test_derive_missing_content_propagates() {
        let config = ProcessingConfig::from_value(json!({}));
        let missing = ContentIdentity::new("/nonexistent/clip.mp4");
        assert!(CacheKey::derive(&missing, &config).is_err());
    }
}
