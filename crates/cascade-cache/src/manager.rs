//! Read-through cache manager (§4.4).
//!
//! Read strategy: L1 → L2 → L3, promoting to every higher tier hit
//! during the lookup. Write strategy: write-through to L2 and L3, and to
//! L1 when it is enabled. An entry is fresh when `now < expires_at`.

use cascade_core::types::{CacheTier, SourceName};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::instrument;

use crate::entry::{CacheEntry, CacheHit, CacheKey};
use crate::error::{CacheError, Result};
use crate::l1::L1Cache;
use crate::l2::L2Store;
use crate::l3::L3Store;

pub struct CacheManager {
    l1: Option<L1Cache>,
    l2: L2Store,
    l3: L3Store,
}

impl CacheManager {
    #[must_use]
    pub fn new(l2: L2Store, l3: L3Store, enable_l1: bool) -> Self {
        Self { l1: enable_l1.then(L1Cache::new), l2, l3 }
    }

    /// Reads a raw JSON value through all enabled tiers, in order.
    /// Returns `None` on a clean miss or an expired entry.
    #[instrument(skip(self), fields(source = %key.source, ip = %key.ip))]
    pub async fn get_raw(&self, key: &CacheKey) -> Result<Option<CacheHit>> {
        let now = Utc::now();

        if let Some(l1) = &self.l1 {
            if let Some(entry) = l1.get(key) {
                if entry.is_fresh(now) {
                    return Ok(Some(CacheHit { value: entry.value, tier: CacheTier::L1 }));
                }
            }
        }

        if let Some(entry) = self.l2.get(key).await? {
            if entry.is_fresh(now) {
                self.promote(key, &entry, CacheTier::L2).await;
                return Ok(Some(CacheHit { value: entry.value, tier: CacheTier::L2 }));
            }
        }

        if let Some(entry) = self.l3.get(key).await? {
            if entry.is_fresh(now) {
                self.promote(key, &entry, CacheTier::L3).await;
                return Ok(Some(CacheHit { value: entry.value, tier: CacheTier::L3 }));
            }
        }

        Ok(None)
    }

    /// Writes a raw JSON value to every enabled tier with the given TTL.
    #[instrument(skip(self, value), fields(source = %key.source, ip = %key.ip, ttl_secs))]
    pub async fn put_raw(&self, key: &CacheKey, value: serde_json::Value, ttl_secs: u64) -> Result<()> {
        let expires_at = Utc::now() + chrono::Duration::seconds(ttl_secs as i64);
        let entry = CacheEntry { value, expires_at };

        self.l2.put(key, &entry).await?;
        self.l3.put(key, &entry).await?;
        if let Some(l1) = &self.l1 {
            l1.put(key.clone(), entry);
        }

        Ok(())
    }

    /// Typed convenience wrapper over [`Self::get_raw`].
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<(T, CacheTier)>> {
        let Some(hit) = self.get_raw(key).await? else { return Ok(None) };
        let value: T = serde_json::from_value(hit.value).map_err(|error| CacheError::Deserialize {
            source_name: key.source.as_str(),
            key: key.ip.clone(),
            error,
        })?;
        Ok(Some((value, hit.tier)))
    }

    /// Typed convenience wrapper over [`Self::put_raw`].
    pub async fn put<T: Serialize>(&self, key: &CacheKey, value: &T, ttl_secs: u64) -> Result<()> {
        let json = serde_json::to_value(value).map_err(|error| CacheError::Serialize {
            source_name: key.source.as_str(),
            key: key.ip.clone(),
            error,
        })?;
        self.put_raw(key, json, ttl_secs).await
    }

    /// Backfills every tier above the one that satisfied the read. An L3
    /// hit writes through to L2 as well as L1, so the next read doesn't
    /// re-descend to disk.
    async fn promote(&self, key: &CacheKey, entry: &CacheEntry, hit_tier: CacheTier) {
        if hit_tier == CacheTier::L3 {
            if let Err(error) = self.l2.put(key, entry).await {
                tracing::warn!(%error, source = %key.source, ip = %key.ip, "failed to backfill L2 on L3 hit");
            }
        }
        if let Some(l1) = &self.l1 {
            l1.put(key.clone(), entry.clone());
        }
    }

    /// Sweeps expired L2 rows. L3 entries are not swept proactively; they
    /// serve as the backfill archive and are cheap to leave in place.
    pub async fn purge_expired_l2(&self, now: DateTime<Utc>) -> Result<u64> {
        self.l2.purge_expired(now).await
    }
}
