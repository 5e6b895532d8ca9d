//! Offline geo/ASN source, MaxMind-style (§4.5).
//!
//! Opens two binary databases lazily and validates each on open: file
//! exists, size clears a conservative minimum, the embedded build
//! timestamp is recent, and a canary IP resolves to the expected
//! country. A database that fails validation is treated as unusable;
//! lookups against it simply return `None`, same as a miss.
//!
//! Reads are lock-free in the common case (`RwLock::read`); only the
//! rare auto-update path takes a write lock to swap the reader.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cascade_core::types::MaxmindRecord;
use maxminddb::Reader;
use tracing::{debug, error, instrument, warn};

use crate::error::{ClientError, Result};

const CITY_MIN_BYTES: u64 = 50 * 1024 * 1024;
const ASN_MIN_BYTES: u64 = 3 * 1024 * 1024;
const MAX_BUILD_AGE_DAYS: u64 = 30;
const AUTO_UPDATE_AGE_DAYS: u64 = 7;
const CANARY_IP: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);
const CANARY_EXPECTED_COUNTRY: &str = "US";

#[derive(Debug, Clone)]
pub struct MaxmindConfig {
    pub city_db_path: PathBuf,
    pub asn_db_path: PathBuf,
    /// Vendor license key; when present and the databases are stale,
    /// [`MaxmindSource::maybe_auto_update`] attempts a refresh.
    pub license_key: Option<String>,
}

pub struct MaxmindSource {
    config: MaxmindConfig,
    city: RwLock<Option<Reader<Vec<u8>>>>,
    asn: RwLock<Option<Reader<Vec<u8>>>>,
}

impl MaxmindSource {
    /// Opens and validates both databases. Never fails: an unusable
    /// database is logged and becomes a permanent miss until the process
    /// restarts or [`Self::maybe_auto_update`] replaces it.
    #[must_use]
    pub fn open(config: MaxmindConfig) -> Self {
        let city = open_validated(&config.city_db_path, CITY_MIN_BYTES, true);
        let asn = open_validated(&config.asn_db_path, ASN_MIN_BYTES, false);
        Self { config, city: RwLock::new(city), asn: RwLock::new(asn) }
    }

    #[instrument(skip(self), fields(ip = %ip))]
    #[must_use]
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MaxmindRecord> {
        let mut record = MaxmindRecord::default();
        let mut found = false;

        if let Some(reader) = self.city.read().unwrap_or_else(|e| e.into_inner()).as_ref() {
            if let Ok(Some(value)) = reader.lookup::<serde_json::Value>(ip.into()) {
                apply_city_fields(&mut record, &value);
                found = true;
            }
        }

        if let Some(reader) = self.asn.read().unwrap_or_else(|e| e.into_inner()).as_ref() {
            if let Ok(Some(value)) = reader.lookup::<serde_json::Value>(ip.into()) {
                apply_asn_fields(&mut record, &value);
                found = true;
            }
        }

        if found && !record.is_empty() {
            Some(record)
        } else {
            None
        }
    }

    /// Downloads a fresh copy of each database when a license key is
    /// configured and the current copy is more than 7 days old.
    /// Update failures are logged but never disable the source: the
    /// cascade keeps using whatever was previously loaded.
    pub async fn maybe_auto_update(&self) {
        let Some(license_key) = self.config.license_key.as_deref() else { return };

        for (path, min_bytes, is_city, lock) in [
            (&self.config.city_db_path, CITY_MIN_BYTES, true, &self.city),
            (&self.config.asn_db_path, ASN_MIN_BYTES, false, &self.asn),
        ] {
            if !is_stale(path) {
                continue;
            }
            if let Err(e) = self.update_one(path, min_bytes, is_city, lock, license_key).await {
                error!(path = %path.display(), error = %e, "geo/ASN database auto-update failed");
            }
        }
    }

    async fn update_one(
        &self,
        path: &Path,
        min_bytes: u64,
        is_city: bool,
        lock: &RwLock<Option<Reader<Vec<u8>>>>,
        license_key: &str,
    ) -> Result<()> {
        let edition = if is_city { "GeoLite2-City" } else { "GeoLite2-ASN" };
        let url = format!(
            "https://download.maxmind.com/app/geoip_download?edition_id={edition}&license_key={license_key}&suffix=mmdb"
        );

        debug!(edition, "downloading fresh geo/ASN database");
        let bytes = reqwest::get(&url).await?.bytes().await?;

        let tmp_path = path.with_extension("mmdb.new");
        tokio::fs::write(&tmp_path, &bytes).await.map_err(|source| ClientError::DbIo {
            path: tmp_path.display().to_string(),
            source,
        })?;

        if (bytes.len() as u64) < min_bytes {
            return Err(ClientError::DbValidation {
                path: tmp_path.display().to_string(),
                reason: format!("downloaded size {} below minimum {min_bytes}", bytes.len()),
            });
        }

        let previous_path = path.with_extension("mmdb.previous");
        if path.exists() {
            tokio::fs::rename(path, &previous_path).await.ok();
        }
        tokio::fs::rename(&tmp_path, path).await.map_err(|source| ClientError::DbIo {
            path: path.display().to_string(),
            source,
        })?;

        let reader = Reader::open_readfile(path).map_err(ClientError::DbLookup)?;
        *lock.write().unwrap_or_else(|e| e.into_inner()) = Some(reader);
        debug!(edition, "geo/ASN database auto-update complete");
        Ok(())
    }
}

fn open_validated(path: &Path, min_bytes: u64, check_canary: bool) -> Option<Reader<Vec<u8>>> {
    match validate(path, min_bytes, check_canary) {
        Ok(reader) => Some(reader),
        Err(e) => {
            error!(path = %path.display(), error = %e, "geo/ASN database failed validation, source disabled");
            None
        }
    }
}

fn validate(path: &Path, min_bytes: u64, check_canary: bool) -> Result<Reader<Vec<u8>>> {
    let metadata = std::fs::metadata(path).map_err(|source| ClientError::DbIo {
        path: path.display().to_string(),
        source,
    })?;

    if metadata.len() < min_bytes {
        return Err(ClientError::DbValidation {
            path: path.display().to_string(),
            reason: format!("size {} below minimum {min_bytes}", metadata.len()),
        });
    }

    let reader = Reader::open_readfile(path)?;

    let build_time = UNIX_EPOCH + Duration::from_secs(reader.metadata.build_epoch);
    let age = SystemTime::now()
        .duration_since(build_time)
        .unwrap_or(Duration::ZERO);
    if age > Duration::from_secs(MAX_BUILD_AGE_DAYS * 24 * 60 * 60) {
        return Err(ClientError::DbValidation {
            path: path.display().to_string(),
            reason: format!("build is {} days old, exceeds {MAX_BUILD_AGE_DAYS}", age.as_secs() / 86_400),
        });
    }

    if check_canary {
        let value = reader
            .lookup::<serde_json::Value>(CANARY_IP.into())?
            .ok_or_else(|| ClientError::DbValidation {
                path: path.display().to_string(),
                reason: "canary IP 8.8.8.8 not found".to_string(),
            })?;
        let country = value.pointer("/country/iso_code").and_then(|v| v.as_str());
        if country != Some(CANARY_EXPECTED_COUNTRY) {
            return Err(ClientError::DbValidation {
                path: path.display().to_string(),
                reason: format!("canary IP resolved to {country:?}, expected {CANARY_EXPECTED_COUNTRY:?}"),
            });
        }
    }

    Ok(reader)
}

fn is_stale(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else { return true };
    let Ok(modified) = metadata.modified() else { return true };
    let age = SystemTime::now().duration_since(modified).unwrap_or(Duration::ZERO);
    if age <= Duration::from_secs(AUTO_UPDATE_AGE_DAYS * 24 * 60 * 60) {
        return false;
    }
    warn!(path = %path.display(), "geo/ASN database is stale, attempting auto-update");
    true
}

fn apply_city_fields(record: &mut MaxmindRecord, value: &serde_json::Value) {
    record.country_code = value
        .pointer("/country/iso_code")
        .and_then(|v| v.as_str())
        .map(String::from);
    record.country_name = value
        .pointer("/country/names/en")
        .and_then(|v| v.as_str())
        .map(String::from);
    record.city = value
        .pointer("/city/names/en")
        .and_then(|v| v.as_str())
        .map(String::from);
    record.latitude = value.pointer("/location/latitude").and_then(serde_json::Value::as_f64);
    record.longitude = value.pointer("/location/longitude").and_then(serde_json::Value::as_f64);
}

fn apply_asn_fields(record: &mut MaxmindRecord, value: &serde_json::Value) {
    if record.asn.is_none() {
        record.asn = value.pointer("/autonomous_system_number").and_then(serde_json::Value::as_i64);
    }
    if record.asn_org.is_none() {
        record.asn_org = value
            .pointer("/autonomous_system_organization")
            .and_then(|v| v.as_str())
            .map(String::from);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_database_file_is_treated_as_unusable() {
        let source = MaxmindSource::open(MaxmindConfig {
            city_db_path: PathBuf::from("/nonexistent/city.mmdb"),
            asn_db_path: PathBuf::from("/nonexistent/asn.mmdb"),
            license_key: None,
        });
        assert!(source.lookup(Ipv4Addr::new(1, 1, 1, 1)).is_none());
    }
}
