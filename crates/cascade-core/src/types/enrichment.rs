use serde::{Deserialize, Serialize};

use super::geo::{CymruRecord, GreynoiseRecord, MaxmindRecord};
use super::meta::EnrichmentMeta;
use super::validation::ValidationRecord;

/// The enrichment attached to one IP, as a closed record rather than the
/// untyped map the source system used: each source gets an optional,
/// strongly-typed field plus a mandatory `_meta`. Serialized as JSON at the
/// storage boundary only (§9 "Dynamic JSON everywhere").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub validation: ValidationRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxmind: Option<MaxmindRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cymru: Option<CymruRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greynoise: Option<GreynoiseRecord>,
    #[serde(rename = "_meta")]
    pub meta: EnrichmentMeta,
}

impl EnrichmentRecord {
    #[must_use]
    pub fn bogon(validation: ValidationRecord, meta: EnrichmentMeta) -> Self {
        Self {
            validation,
            maxmind: None,
            cymru: None,
            greynoise: None,
            meta,
        }
    }

    /// `current_asn`: `maxmind.asn` if present, else `cymru.asn` (§3 invariant,
    /// §4.9 merge policy).
    #[must_use]
    pub fn current_asn(&self) -> Option<i64> {
        self.maxmind
            .as_ref()
            .and_then(|m| m.asn)
            .or_else(|| self.cymru.as_ref().and_then(|c| c.asn))
    }

    /// `geo_country`: prefers `maxmind.country_code`, then
    /// `cymru.country_code`, else `"XX"` (§4.9 merge policy).
    #[must_use]
    pub fn geo_country(&self) -> String {
        self.maxmind
            .as_ref()
            .and_then(|m| m.country_code.clone())
            .or_else(|| self.cymru.as_ref().and_then(|c| c.country_code.clone()))
            .unwrap_or_else(|| "XX".to_string())
    }

    #[must_use]
    pub fn is_bogon(&self) -> bool {
        self.validation.is_bogon
    }

    #[must_use]
    pub fn is_scanner(&self) -> bool {
        self.greynoise.as_ref().is_some_and(|g| g.noise)
    }

    /// Source names actually present in the record (not merely attempted).
    #[must_use]
    pub fn enrichment_sources(&self) -> Vec<&'static str> {
        let mut sources = Vec::new();
        if self.maxmind.is_some() {
            sources.push("maxmind");
        }
        if self.cymru.is_some() {
            sources.push("cymru");
        }
        if self.greynoise.is_some() {
            sources.push("greynoise");
        }
        sources
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maxmind.is_none() && self.cymru.is_none() && self.greynoise.is_none()
    }
}
