//! L1: optional in-memory fast tier.
//!
//! Process-local and never authoritative; a restart simply empties it.
//! Populated on promotion from L2/L3 and consulted first on every read.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::entry::{CacheEntry, CacheKey};

pub struct L1Cache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl L1Cache {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned()
    }

    pub fn put(&self, key: CacheKey, entry: CacheEntry) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).insert(key, entry);
    }
}

impl Default for L1Cache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::types::SourceName;
    use chrono::Utc;

    #[test]
    fn put_then_get_round_trips() {
        let cache = L1Cache::new();
        let key = CacheKey::new(SourceName::Cymru, "1.2.3.4");
        let entry = CacheEntry { value: serde_json::json!({"asn": 64512}), expires_at: Utc::now() };
        cache.put(key.clone(), entry);
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn miss_on_unknown_key() {
        let cache = L1Cache::new();
        let key = CacheKey::new(SourceName::Cymru, "9.9.9.9");
        assert!(cache.get(&key).is_none());
    }
}
