//! TOML-backed cascade configuration (§6 "Configuration").
//!
//! Secrets fields hold *references* (`env:...`, `file:...`, ...), never
//! plaintext; they are resolved through [`cascade_secrets`] at startup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level cascade configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Per-sensor feature flag: when false, ASN-inventory rows are never
    /// created or updated, though `current_asn` is still recorded on the
    /// IP-inventory row.
    #[serde(default = "default_true")]
    pub enable_asn_inventory: bool,

    /// Root directory for the L3 sharded on-disk cache tier.
    pub cache_root: PathBuf,

    /// Whether the L1 in-memory cache tier is enabled.
    #[serde(default = "default_true")]
    pub enable_l1_cache: bool,

    pub secrets: SecretsConfig,

    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    /// Default scanner-intel daily request budget.
    #[serde(default = "default_daily_budget_limit")]
    pub daily_budget_limit: u64,

    /// Rows per progress update in batch drivers (§4.10).
    #[serde(default = "default_commit_interval")]
    pub commit_interval: usize,

    pub maxmind: MaxmindPathConfig,
}

/// Secret *references*, resolved through the secrets resolver (§4.2); never
/// plaintext (§9 "Secrets coupling").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Inventory store connection string reference.
    pub database_url: String,

    /// Scanner-intel API key reference. Absent means the scanner-intel
    /// source is permanently skipped (`no_api_key`).
    #[serde(default)]
    pub greynoise_api_key: Option<String>,

    /// Offline geo/ASN vendor license key reference, used only for
    /// auto-update.
    #[serde(default)]
    pub maxmind_license_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_greynoise_rate")]
    pub greynoise_rate_per_sec: u32,
    #[serde(default = "default_greynoise_burst")]
    pub greynoise_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            greynoise_rate_per_sec: default_greynoise_rate(),
            greynoise_burst: default_greynoise_burst(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxmindPathConfig {
    pub city_db_path: PathBuf,
    pub asn_db_path: PathBuf,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            enable_asn_inventory: true,
            cache_root: PathBuf::from("./cascade-cache"),
            enable_l1_cache: true,
            secrets: SecretsConfig {
                database_url: String::from("env:CASCADE_DATABASE_URL"),
                greynoise_api_key: None,
                maxmind_license_key: None,
            },
            rate_limits: RateLimitConfig::default(),
            daily_budget_limit: default_daily_budget_limit(),
            commit_interval: default_commit_interval(),
            maxmind: MaxmindPathConfig {
                city_db_path: PathBuf::from("./GeoLite2-City.mmdb"),
                asn_db_path: PathBuf::from("./GeoLite2-ASN.mmdb"),
            },
        }
    }
}

impl CascadeConfig {
    /// Load config from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
        } else {
            Ok(Self::default())
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_daily_budget_limit() -> u64 {
    10_000
}

const fn default_commit_interval() -> usize {
    100
}

const fn default_greynoise_rate() -> u32 {
    10
}

const fn default_greynoise_burst() -> u32 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = CascadeConfig::default();
        assert!(config.enable_asn_inventory);
        assert_eq!(config.daily_budget_limit, 10_000);
        assert_eq!(config.commit_interval, 100);
        assert_eq!(config.rate_limits.greynoise_rate_per_sec, 10);
        assert_eq!(config.rate_limits.greynoise_burst, 10);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = CascadeConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: CascadeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.daily_budget_limit, config.daily_budget_limit);
        assert_eq!(parsed.secrets.database_url, config.secrets.database_url);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = CascadeConfig::load(std::path::Path::new("/nonexistent/cascade.toml")).unwrap();
        assert!(config.enable_asn_inventory);
    }
}
