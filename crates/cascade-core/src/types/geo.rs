use serde::{Deserialize, Serialize};

/// Offline geo/ASN source output (§4.5, MaxMind-style). Any field may be
/// absent depending on which databases had a record for the address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaxmindRecord {
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub asn: Option<i64>,
    #[serde(default)]
    pub asn_org: Option<String>,
}

impl MaxmindRecord {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.country_code.is_none()
            && self.country_name.is_none()
            && self.city.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.asn.is_none()
            && self.asn_org.is_none()
    }
}

/// Bulk ASN source output (§4.6, Team Cymru-style).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CymruRecord {
    #[serde(default)]
    pub asn: Option<i64>,
    #[serde(default)]
    pub bgp_prefix: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub registry: Option<String>,
    #[serde(default)]
    pub allocated_date: Option<String>,
}

/// Scanner-intel source output (§4.7, GreyNoise-style). `extra` preserves
/// vendor-defined fields verbatim without widening this struct per source
/// change (source-specific payloads are stored verbatim, never merged).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GreynoiseRecord {
    pub noise: bool,
    #[serde(default)]
    pub classification: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
