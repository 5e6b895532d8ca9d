//! Cascade orchestrator (§4.9): the single entry point that composes every
//! source behind the freshness check, strict maxmind -> cymru -> greynoise
//! ordering, and the inventory's one-transaction upsert.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use cascade_cache::{CacheKey, CacheManager};
use cascade_client::{GreynoiseFailure, GreynoiseSource, MaxmindSource};
use cascade_core::types::{
    ActivityContext, CacheTier, CymruRecord, EnrichmentMeta, EnrichmentRecord, GreynoiseRecord, IpRecord,
    SourceName, ValidationRecord,
};
use cascade_core::CascadeObserver;
use cascade_recon::{BulkWhoisTransport, DnsTxtTransport, TxtOutcome};
use cascade_store::Store;
use chrono::{DateTime, Utc};
use tracing::{instrument, warn};

use crate::error::Result;

/// Holds every dependency the cascade needs for the lifetime of the
/// process (§9 "Global mutable clients" — explicit dependencies, no
/// process-wide singletons).
pub struct Cascade {
    pub(crate) store: Store,
    pub(crate) cache: Arc<CacheManager>,
    pub(crate) maxmind: MaxmindSource,
    pub(crate) bulk_whois: BulkWhoisTransport,
    pub(crate) dns_txt: DnsTxtTransport,
    pub(crate) greynoise: Option<GreynoiseSource>,
    pub(crate) enable_asn_inventory: bool,
    pub(crate) observer: Arc<dyn CascadeObserver>,
}

impl Cascade {
    /// Entry point (§4.9). Sources are attempted strictly in the order
    /// maxmind -> cymru -> greynoise; individual source failures are
    /// recorded in `_meta` and never abort the call.
    #[instrument(skip(self, activity), fields(ip = %ip))]
    pub async fn enrich_ip(&self, ip: &str, activity: Option<ActivityContext>) -> Result<IpRecord> {
        let now = Utc::now();

        if let Some(existing) = self.store.get_ip(ip).await? {
            if self.is_fresh(&existing.enrichment, existing.enrichment_ts, now) {
                return Ok(self.store.touch_ip(ip, 1).await?);
            }
        }

        let start = Instant::now();
        let mut meta = EnrichmentMeta::new(now);

        let Ok(ipv4) = ip.parse::<Ipv4Addr>() else {
            return self.finish_bogon(ip, ValidationRecord::malformed(), meta, start, true).await;
        };

        let validation = cascade_core::bogon::classify(ipv4);
        if validation.is_bogon {
            return self.finish_bogon(ip, validation, meta, start, false).await;
        }

        meta.record_attempt(SourceName::Maxmind);
        self.observer.source_attempted(SourceName::Maxmind);
        let maxmind_record = match self.maxmind.lookup(ipv4) {
            Some(record) => {
                meta.record_success(SourceName::Maxmind);
                meta.record_cache_hit(SourceName::Maxmind, CacheTier::DbQuery);
                self.observer.source_succeeded(SourceName::Maxmind);
                Some(record)
            }
            None => {
                meta.record_failure(SourceName::Maxmind, "ip_not_found_or_db_unavailable");
                self.observer.source_failed(SourceName::Maxmind);
                None
            }
        };

        let cymru_record = if maxmind_record.as_ref().and_then(|m| m.asn).is_none() {
            self.lookup_cymru(ip, ipv4, &mut meta).await?
        } else {
            None
        };

        let greynoise_record = match &self.greynoise {
            Some(greynoise) if activity.is_some_and(|a| a.admits_scanner_intel()) => {
                self.lookup_greynoise(ip, greynoise, &mut meta).await
            }
            Some(_) => {
                meta.record_skip(SourceName::Greynoise, "low_activity_filter");
                None
            }
            None => {
                meta.record_skip(SourceName::Greynoise, "no_api_key");
                None
            }
        };

        meta.total_duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.observer.enrichment_duration_ms(meta.total_duration_ms);

        let enrichment = EnrichmentRecord {
            validation,
            maxmind: maxmind_record,
            cymru: cymru_record,
            greynoise: greynoise_record,
            meta,
        };

        self.upsert(ip, &enrichment, 1).await
    }

    async fn finish_bogon(
        &self,
        ip: &str,
        validation: ValidationRecord,
        mut meta: EnrichmentMeta,
        start: Instant,
        malformed: bool,
    ) -> Result<IpRecord> {
        let reason = if malformed { "malformed_input" } else { "bogon_detected" };
        for source in [SourceName::Maxmind, SourceName::Cymru, SourceName::Greynoise] {
            meta.record_skip(source, reason);
        }
        meta.total_duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let enrichment = EnrichmentRecord::bogon(validation, meta);
        self.upsert(ip, &enrichment, 1).await
    }

    /// Freshness decision (§4.8). The greynoise clause only binds when a
    /// scanner-intel source is actually configured (Open Question
    /// resolution #3 in SPEC_FULL.md).
    fn is_fresh(&self, enrichment: &EnrichmentRecord, enrichment_ts: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        is_fresh(enrichment, enrichment_ts, now, self.greynoise.is_some())
    }

    /// Bulk ASN source with its cache wrapper (§4.6, §4.9 step 5). A
    /// well-formed not-routed answer is cached and recorded as a failure
    /// with reason `nxdomain_or_timeout`; a genuinely unparseable answer
    /// is recorded the same way in `_meta` but never cached, so the next
    /// call retries it.
    async fn lookup_cymru(&self, ip: &str, ipv4: Ipv4Addr, meta: &mut EnrichmentMeta) -> Result<Option<CymruRecord>> {
        meta.record_attempt(SourceName::Cymru);
        self.observer.source_attempted(SourceName::Cymru);

        let key = CacheKey::new(SourceName::Cymru, ip);
        match self.cache.get::<Option<CymruRecord>>(&key).await {
            Ok(Some((cached, tier))) => {
                meta.record_cache_hit(SourceName::Cymru, tier);
                return Ok(match cached {
                    Some(record) => {
                        meta.record_success(SourceName::Cymru);
                        self.observer.source_succeeded(SourceName::Cymru);
                        Some(record)
                    }
                    None => {
                        meta.record_failure(SourceName::Cymru, "nxdomain_or_timeout");
                        self.observer.source_failed(SourceName::Cymru);
                        None
                    }
                });
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "cymru cache read failed, falling through to live lookup"),
        }

        match self.dns_txt.lookup(ipv4).await {
            TxtOutcome::Routed(record) => {
                self.cache_put_or_warn(&key, &Some(record.clone()), cascade_cache::ttl::CYMRU_TTL_SECS)
                    .await;
                meta.record_success(SourceName::Cymru);
                self.observer.source_succeeded(SourceName::Cymru);
                Ok(Some(record))
            }
            TxtOutcome::NotRouted => {
                self.cache_put_or_warn(&key, &Option::<CymruRecord>::None, cascade_cache::ttl::CYMRU_TTL_SECS)
                    .await;
                meta.record_failure(SourceName::Cymru, "nxdomain_or_timeout");
                self.observer.source_failed(SourceName::Cymru);
                Ok(None)
            }
            TxtOutcome::Unparseable => {
                meta.record_failure(SourceName::Cymru, "nxdomain_or_timeout");
                self.observer.source_failed(SourceName::Cymru);
                Ok(None)
            }
        }
    }

    /// Scanner-intel source with its cache wrapper (§4.7, §4.9 step 6).
    /// Only called once the activity filter and a configured API key have
    /// already been confirmed by the caller.
    async fn lookup_greynoise(
        &self,
        ip: &str,
        greynoise: &GreynoiseSource,
        meta: &mut EnrichmentMeta,
    ) -> Option<GreynoiseRecord> {
        let key = CacheKey::new(SourceName::Greynoise, ip);
        match self.cache.get::<GreynoiseRecord>(&key).await {
            Ok(Some((record, tier))) => {
                meta.record_cache_hit(SourceName::Greynoise, tier);
                meta.record_success(SourceName::Greynoise);
                self.observer.source_succeeded(SourceName::Greynoise);
                return Some(record);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "scanner-intel cache read failed, falling through to live lookup"),
        }

        match greynoise.lookup(ip).await {
            Ok(Some(record)) => {
                self.cache_put_or_warn(&key, &record, cascade_cache::ttl::GREYNOISE_TTL_SECS).await;
                meta.record_success(SourceName::Greynoise);
                self.observer.source_succeeded(SourceName::Greynoise);
                Some(record)
            }
            Ok(None) => {
                meta.record_failure(SourceName::Greynoise, "not_found");
                self.observer.source_failed(SourceName::Greynoise);
                None
            }
            Err(GreynoiseFailure::DailyBudgetExhausted) => {
                meta.record_skip(SourceName::Greynoise, GreynoiseFailure::DailyBudgetExhausted.reason());
                None
            }
            Err(failure) => {
                meta.record_failure(SourceName::Greynoise, failure.reason());
                self.observer.source_failed(SourceName::Greynoise);
                None
            }
        }
    }

    async fn cache_put_or_warn<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl_secs: u64) {
        if let Err(e) = self.cache.put(key, value, ttl_secs).await {
            warn!(error = %e, source = %key.source, "failed to write cache entry");
        }
    }

    /// The single transaction step (§4.9 step 8): `ensure_asn` then
    /// `upsert_ip`, with retry-once-on-race handled inside the store.
    pub(crate) async fn upsert(&self, ip: &str, enrichment: &EnrichmentRecord, observation_delta: i64) -> Result<IpRecord> {
        Ok(self
            .store
            .upsert_ip_with_policy(ip, enrichment, observation_delta, self.enable_asn_inventory)
            .await?)
    }
}

/// Free-function core of [`Cascade::is_fresh`], so the rule can be tested
/// without standing up a real cascade and its database connections.
fn is_fresh(enrichment: &EnrichmentRecord, enrichment_ts: DateTime<Utc>, now: DateTime<Utc>, greynoise_configured: bool) -> bool {
    if enrichment.is_empty() {
        return false;
    }
    let age = now - enrichment_ts;
    let cymru_or_maxmind_fresh =
        (enrichment.maxmind.is_some() || enrichment.cymru.is_some()) && age < chrono::Duration::days(90);
    let greynoise_fresh = !greynoise_configured || (enrichment.greynoise.is_some() && age < chrono::Duration::days(7));

    cymru_or_maxmind_fresh && greynoise_fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::types::{CymruRecord, MaxmindRecord};

    fn meta_now(now: DateTime<Utc>) -> EnrichmentMeta {
        EnrichmentMeta::new(now)
    }

    fn with_maxmind(now: DateTime<Utc>) -> EnrichmentRecord {
        EnrichmentRecord {
            validation: ValidationRecord::default(),
            maxmind: Some(MaxmindRecord { asn: Some(64512), ..Default::default() }),
            cymru: None,
            greynoise: None,
            meta: meta_now(now),
        }
    }

    #[test]
    fn empty_enrichment_is_never_fresh() {
        let now = Utc::now();
        let enrichment = EnrichmentRecord::bogon(ValidationRecord::default(), meta_now(now));
        assert!(!is_fresh(&enrichment, now, now, false));
    }

    #[test]
    fn maxmind_only_is_fresh_within_ninety_days_when_greynoise_unconfigured() {
        let now = Utc::now();
        let enrichment = with_maxmind(now);
        let ts = now - chrono::Duration::days(89);
        assert!(is_fresh(&enrichment, ts, now, false));
    }

    #[test]
    fn maxmind_only_expires_past_ninety_days() {
        let now = Utc::now();
        let enrichment = with_maxmind(now);
        let ts = now - chrono::Duration::days(91);
        assert!(!is_fresh(&enrichment, ts, now, false));
    }

    #[test]
    fn greynoise_configured_but_missing_from_record_is_not_fresh() {
        let now = Utc::now();
        let enrichment = with_maxmind(now);
        let ts = now - chrono::Duration::days(1);
        assert!(!is_fresh(&enrichment, ts, now, true));
    }

    #[test]
    fn greynoise_configured_and_present_but_stale_is_not_fresh() {
        let now = Utc::now();
        let mut enrichment = with_maxmind(now);
        enrichment.greynoise = Some(cascade_core::types::GreynoiseRecord::default());
        let ts = now - chrono::Duration::days(8);
        assert!(!is_fresh(&enrichment, ts, now, true));
    }

    #[test]
    fn greynoise_configured_and_fresh_is_fresh() {
        let now = Utc::now();
        let mut enrichment = with_maxmind(now);
        enrichment.greynoise = Some(cascade_core::types::GreynoiseRecord::default());
        let ts = now - chrono::Duration::days(1);
        assert!(is_fresh(&enrichment, ts, now, true));
    }

    #[test]
    fn cymru_only_counts_toward_freshness_same_as_maxmind() {
        let now = Utc::now();
        let enrichment = EnrichmentRecord {
            validation: ValidationRecord::default(),
            maxmind: None,
            cymru: Some(CymruRecord { asn: Some(64512), ..Default::default() }),
            greynoise: None,
            meta: meta_now(now),
        };
        let ts = now - chrono::Duration::days(1);
        assert!(is_fresh(&enrichment, ts, now, false));
    }
}
