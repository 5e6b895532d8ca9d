use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enrichment::EnrichmentRecord;

/// One IP-inventory entry (§3). Identity is the dotted-quad address text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpRecord {
    pub ip: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub observation_count: i64,
    pub enrichment: EnrichmentRecord,
    pub enrichment_ts: DateTime<Utc>,
}

impl IpRecord {
    #[must_use]
    pub fn current_asn(&self) -> Option<i64> {
        self.enrichment.current_asn()
    }

    #[must_use]
    pub fn geo_country(&self) -> String {
        self.enrichment.geo_country()
    }

    #[must_use]
    pub fn is_bogon(&self) -> bool {
        self.enrichment.is_bogon()
    }

    #[must_use]
    pub fn is_scanner(&self) -> bool {
        self.enrichment.is_scanner()
    }

    #[must_use]
    pub fn enrichment_completeness(&self) -> f64 {
        self.enrichment.meta.completeness_percent()
    }
}

/// One ASN-inventory entry (§3). Identity is the integer ASN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsnRecord {
    pub asn_number: i64,
    pub organization_name: Option<String>,
    pub country_code: Option<String>,
    pub rir_registry: Option<RirRegistry>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub unique_ip_count: i64,
    pub total_session_count: i64,
}

/// Regional Internet Registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RirRegistry {
    Arin,
    Ripe,
    Apnic,
    Lacnic,
    Afrinic,
}

impl RirRegistry {
    /// Parse the lowercase registry abbreviation Team Cymru's bulk whois
    /// returns (e.g. `"arin"`) into a typed registry.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arin" => Some(Self::Arin),
            "ripe" | "ripencc" | "ripe ncc" => Some(Self::Ripe),
            "apnic" => Some(Self::Apnic),
            "lacnic" => Some(Self::Lacnic),
            "afrinic" => Some(Self::Afrinic),
            _ => None,
        }
    }
}

/// Subset of a honeypot session's summary the cascade reads to decide
/// whether an IP is worth a scanner-intel lookup (§3 "Session summary").
/// This is the cascade's only view into session data; it does not own or
/// fetch it (Open Question resolution #2 in SPEC_FULL.md).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ActivityContext {
    pub command_count: u32,
    pub file_download_count: u32,
    pub duration_seconds: u64,
    pub unique_commands: u32,
    pub vt_flagged: bool,
}

impl ActivityContext {
    /// The activity filter from §4.7: any one of these thresholds admits
    /// the scanner-intel source.
    #[must_use]
    pub fn admits_scanner_intel(&self) -> bool {
        self.command_count >= 10
            || self.file_download_count >= 5
            || self.vt_flagged
            || self.duration_seconds >= 300
            || self.unique_commands >= 5
    }
}
