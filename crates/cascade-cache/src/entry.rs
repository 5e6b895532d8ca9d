use cascade_core::types::{CacheTier, SourceName};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Identifies a cached value: a source plus the IP address it describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source: SourceName,
    pub ip: String,
}

impl CacheKey {
    #[must_use]
    pub fn new(source: SourceName, ip: impl Into<String>) -> Self {
        Self { source, ip: ip.into() }
    }

    /// Two-character shard prefix derived from a stable hash of the IP,
    /// used to keep any one L3 directory from holding too many files.
    #[must_use]
    pub fn shard_prefix(&self) -> String {
        let digest = Sha256::digest(self.ip.as_bytes());
        hex::encode(&digest[..1])
    }
}

/// A value plus the instant it stops being fresh.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// What a successful `get` returns: the value and which tier served it.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub value: serde_json::Value,
    pub tier: CacheTier,
}
