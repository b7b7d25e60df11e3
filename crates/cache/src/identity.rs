//! Content identity and fingerprinting

use crate::{KeyError, KeyResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Best-available fingerprint of a subject's bytes.
///
/// Stat-based fingerprints (size + mtime) are cheap and cover the common
/// case; a strong content digest can be substituted when one is already
/// known. Collisions across different content are tolerated as a rare false
/// cache hit, not guarded against structurally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFingerprint {
    /// Filesystem metadata fingerprint
    Stat { size: u64, mtime_ms: i64 },
    /// Pre-computed strong hash of the content bytes (hex)
    Digest(String),
}

/// What is being analyzed: a content locator plus a fingerprint of its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentIdentity {
    /// File path or durable content locator
    pub locator: String,

    /// Fingerprint, if already resolved. `None` means the fingerprint is
    /// obtained from the filesystem at key derivation time.
    pub fingerprint: Option<ContentFingerprint>,
}

impl ContentIdentity {
    /// Identity whose fingerprint is resolved lazily from the locator path
    #[must_use]
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            fingerprint: None,
        }
    }

    /// Identity with a pre-resolved fingerprint (no I/O during derivation)
    #[must_use]
    pub fn with_fingerprint(locator: impl Into<String>, fingerprint: ContentFingerprint) -> Self {
        Self {
            locator: locator.into(),
            fingerprint: Some(fingerprint),
        }
    }

    /// Resolve the fingerprint, reading filesystem metadata if none was
    /// supplied. Fails with `ContentUnavailable` when the locator cannot be
    /// stat'ed; the failure propagates to the caller instead of being folded
    /// into a shared placeholder key.
    pub fn resolve(&self) -> KeyResult<ContentFingerprint> {
        if let Some(fp) = &self.fingerprint {
            return Ok(fp.clone());
        }

        let meta = std::fs::metadata(Path::new(&self.locator)).map_err(|source| {
            KeyError::ContentUnavailable {
                locator: self.locator.clone(),
                source,
            }
        })?;

        let mtime_ms = meta
            .modified()
            .map_err(|source| KeyError::ContentUnavailable {
                locator: self.locator.clone(),
                source,
            })?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        Ok(ContentFingerprint::Stat {
            size: meta.len(),
            mtime_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_supplied_fingerprint() {
        let fp = ContentFingerprint::Digest("abc123".to_string());
        let identity = ContentIdentity::with_fingerprint("/nonexistent/video.mp4", fp.clone());
        assert_eq!(identity.resolve().unwrap(), fp);
    }

    #[test]
    fn test_resolve_missing_file_is_content_unavailable() {
        let identity = ContentIdentity::new("/nonexistent/video.mp4");
        let err = identity.resolve().unwrap_err();
        assert!(matches!(err, KeyError::ContentUnavailable { .. }));
    }

    #[test]
    fn test_resolve_stats_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"not really a video").unwrap();

        let identity = ContentIdentity::new(path.to_string_lossy());
        match identity.resolve().unwrap() {
            ContentFingerprint::Stat { size, mtime_ms } => {
                assert_eq!(size, 18);
                assert!(mtime_ms > 0);
            }
            other => panic!("expected stat fingerprint, got {other:?}"),
        }
    }
}
