//! L3: sharded on-disk tier.
//!
//! Last-resort cache and canonical archive during large backfills.
//! Layout: `<cache_root>/<source>/<shard>/<ip>.json`. Writes land in a
//! sibling temp file first and are renamed into place so a reader never
//! observes a partially written entry.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::instrument;

use crate::entry::{CacheEntry, CacheKey};
use crate::error::{CacheError, Result};

#[derive(serde::Serialize, serde::Deserialize)]
struct L3Envelope {
    value: serde_json::Value,
    expires_at: DateTime<Utc>,
}

pub struct L3Store {
    root: PathBuf,
}

impl L3Store {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(key.source.as_str())
            .join(key.shard_prefix())
            .join(format!("{}.json", key.ip))
    }

    #[instrument(skip(self), fields(source = %key.source, ip = %key.ip))]
    pub async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let path = self.path_for(key);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::L3 { path: path.display().to_string(), source }),
        };

        let envelope: L3Envelope = serde_json::from_slice(&raw).map_err(|error| CacheError::Deserialize {
            source_name: key.source.as_str(),
            key: key.ip.clone(),
            error,
        })?;

        Ok(Some(CacheEntry { value: envelope.value, expires_at: envelope.expires_at }))
    }

    #[instrument(skip(self, entry), fields(source = %key.source, ip = %key.ip))]
    pub async fn put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        let path = self.path_for(key);
        let dir = path.parent().expect("path_for always has a parent directory");
        fs::create_dir_all(dir)
            .await
            .map_err(|source| CacheError::L3 { path: dir.display().to_string(), source })?;

        let envelope = L3Envelope { value: entry.value.clone(), expires_at: entry.expires_at };
        let bytes = serde_json::to_vec(&envelope).map_err(|error| CacheError::Serialize {
            source_name: key.source.as_str(),
            key: key.ip.clone(),
            error,
        })?;

        let tmp_path = tmp_path_for(&path);
        fs::write(&tmp_path, &bytes)
            .await
            .map_err(|source| CacheError::L3 { path: tmp_path.display().to_string(), source })?;
        fs::rename(&tmp_path, &path)
            .await
            .map_err(|source| CacheError::L3 { path: path.display().to_string(), source })?;

        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("entry");
    path.with_file_name(format!(".{file_name}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::types::SourceName;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = L3Store::new(dir.path());
        let key = CacheKey::new(SourceName::Cymru, "203.0.113.9");
        let entry = CacheEntry { value: serde_json::json!({"asn": 64512}), expires_at: Utc::now() };

        store.put(&key, &entry).await.unwrap();
        let fetched = store.get(&key).await.unwrap().unwrap();
        assert_eq!(fetched.value, entry.value);
    }

    #[tokio::test]
    async fn miss_on_unknown_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = L3Store::new(dir.path());
        let key = CacheKey::new(SourceName::Greynoise, "198.51.100.1");
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn no_temp_file_left_behind_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = L3Store::new(dir.path());
        let key = CacheKey::new(SourceName::Cymru, "203.0.113.10");
        let entry = CacheEntry { value: serde_json::json!({"asn": 64513}), expires_at: Utc::now() };
        store.put(&key, &entry).await.unwrap();

        let shard_dir = dir.path().join("cymru").join(key.shard_prefix());
        let mut read_dir = fs::read_dir(&shard_dir).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert!(names.iter().all(|n| !n.ends_with(".tmp")));
    }
}
