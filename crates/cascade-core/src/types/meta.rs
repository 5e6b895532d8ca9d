use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current enrichment schema version, bumped whenever the shape of
/// [`super::enrichment::EnrichmentRecord`] changes in a way downstream
/// consumers should know about.
pub const ENRICHMENT_VERSION: u32 = 1;

/// One of the three external sources the cascade may attempt, in the fixed
/// order maxmind -> cymru -> greynoise (§5 ordering guarantees).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceName {
    Maxmind,
    Cymru,
    Greynoise,
}

impl SourceName {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Maxmind => "maxmind",
            Self::Cymru => "cymru",
            Self::Greynoise => "greynoise",
        }
    }
}

impl std::fmt::Display for SourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which cache tier satisfied a read, recorded under `_meta.cache_hits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    L1,
    L2,
    L3,
    /// Not a cache hit at all; the source's own database/transport answered.
    DbQuery,
}

/// Bookkeeping attached to every enrichment, describing exactly what the
/// cascade attempted, succeeded at, failed at, or skipped (§3, §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentMeta {
    pub enrichment_version: u32,
    pub enrichment_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub sources_attempted: Vec<SourceName>,
    #[serde(default)]
    pub sources_succeeded: Vec<SourceName>,
    #[serde(default)]
    pub sources_failed: Vec<SourceName>,
    #[serde(default)]
    pub sources_skipped: Vec<SourceName>,
    #[serde(default)]
    pub skip_reasons: HashMap<SourceName, String>,
    #[serde(default)]
    pub failure_reasons: HashMap<SourceName, String>,
    #[serde(default)]
    pub cache_hits: HashMap<SourceName, CacheTier>,
    pub total_duration_ms: u64,
}

impl EnrichmentMeta {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            enrichment_version: ENRICHMENT_VERSION,
            enrichment_timestamp: now,
            sources_attempted: Vec::new(),
            sources_succeeded: Vec::new(),
            sources_failed: Vec::new(),
            sources_skipped: Vec::new(),
            skip_reasons: HashMap::new(),
            failure_reasons: HashMap::new(),
            cache_hits: HashMap::new(),
            total_duration_ms: 0,
        }
    }

    pub fn record_attempt(&mut self, source: SourceName) {
        if !self.sources_attempted.contains(&source) {
            self.sources_attempted.push(source);
        }
    }

    pub fn record_success(&mut self, source: SourceName) {
        self.record_attempt(source);
        if !self.sources_succeeded.contains(&source) {
            self.sources_succeeded.push(source);
        }
    }

    pub fn record_failure(&mut self, source: SourceName, reason: impl Into<String>) {
        self.record_attempt(source);
        if !self.sources_failed.contains(&source) {
            self.sources_failed.push(source);
        }
        self.failure_reasons.insert(source, reason.into());
    }

    pub fn record_skip(&mut self, source: SourceName, reason: impl Into<String>) {
        if !self.sources_skipped.contains(&source) {
            self.sources_skipped.push(source);
        }
        self.skip_reasons.insert(source, reason.into());
    }

    pub fn record_cache_hit(&mut self, source: SourceName, tier: CacheTier) {
        self.cache_hits.insert(source, tier);
    }

    /// `enrichment_completeness` (§3, §8 invariant 9): succeeded / (attempted
    /// - skipped), clamped to `[0, 100]`.
    #[must_use]
    pub fn completeness_percent(&self) -> f64 {
        let attempted = self.sources_attempted.len();
        let skipped = self.sources_skipped.len();
        let denom = attempted.saturating_sub(skipped);
        if denom == 0 {
            return 0.0;
        }
        let pct = (self.sources_succeeded.len() as f64 / denom as f64) * 100.0;
        pct.clamp(0.0, 100.0)
    }
}
