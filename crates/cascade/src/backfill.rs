//! ASN-inventory backfill driver (§4.10): walks IP-inventory rows whose
//! enrichment is missing or stale and fills in bulk ASN attribution.
//!
//! Takes out a named Postgres advisory lock so only one driver runs at a
//! time across however many processes share the inventory database; a
//! second invocation exits immediately rather than racing the first.

use cascade_core::types::{CymruRecord, IpRecord, SourceName};
use cascade_core::{ProgressSink, ProgressUpdate};
use cascade_recon::TxtOutcome;
use chrono::Utc;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::orchestrator::Cascade;

const BATCH_SIZE: i64 = 1000;
const BULK_THRESHOLD: usize = 100;
const BATCH_PAUSE: std::time::Duration = std::time::Duration::from_secs(1);
const LOCK_KEY: i64 = 7_735_162_390_213_456; // arbitrary key identifying the backfill driver

#[derive(Debug, Default, Clone, Copy)]
pub struct BackfillSummary {
    pub batches_processed: u64,
    pub ips_updated: u64,
    pub ips_failed: u64,
}

impl Cascade {
    /// Runs one full backfill pass: batches of up to 1000 rows, each
    /// resolved through the bulk TCP transport (batches of 500 or more
    /// stale rows) or concurrent DNS TXT lookups (smaller batches), with
    /// a short pause between batches to stay polite to `whois.cymru.com`.
    #[instrument(skip(self, progress))]
    pub async fn run_backfill(&self, progress: &dyn ProgressSink) -> Result<BackfillSummary> {
        if !self.try_acquire_backfill_lock().await? {
            info!("backfill already running elsewhere, skipping");
            return Ok(BackfillSummary::default());
        }

        let result = self.run_backfill_locked(progress).await;

        if let Err(e) = self.release_backfill_lock().await {
            warn!(error = %e, "failed to release backfill advisory lock");
        }

        result
    }

    async fn run_backfill_locked(&self, progress: &dyn ProgressSink) -> Result<BackfillSummary> {
        let mut summary = BackfillSummary::default();

        loop {
            let batch = self.store.select_backfill_batch(BATCH_SIZE).await?;
            if batch.is_empty() {
                break;
            }

            let outcomes = self.resolve_batch(&batch).await;

            for record in &batch {
                let Ok(ipv4) = record.ip.parse::<Ipv4Addr>() else {
                    summary.ips_failed += 1;
                    continue;
                };
                let outcome = outcomes.get(&ipv4.to_string()).cloned().flatten();
                match self.apply_backfill(record, outcome).await {
                    Ok(()) => summary.ips_updated += 1,
                    Err(e) => {
                        warn!(ip = %record.ip, error = %e, "backfill upsert failed");
                        summary.ips_failed += 1;
                    }
                }
            }

            summary.batches_processed += 1;
            progress.report(ProgressUpdate {
                phase: "backfill".to_string(),
                ips_processed: summary.ips_updated + summary.ips_failed,
                ips_total: summary.ips_updated + summary.ips_failed,
                errors: summary.ips_failed,
                timestamp: Utc::now(),
            });

            if (batch.len() as i64) < BATCH_SIZE {
                break;
            }
            tokio::time::sleep(BATCH_PAUSE).await;
        }

        Ok(summary)
    }

    async fn resolve_batch(&self, batch: &[IpRecord]) -> HashMap<String, Option<CymruRecord>> {
        let ips: Vec<Ipv4Addr> = batch.iter().filter_map(|r| r.ip.parse().ok()).collect();

        if ips.len() >= BULK_THRESHOLD {
            let ip_strings: Vec<String> = ips.iter().map(ToString::to_string).collect();
            let mut merged = HashMap::with_capacity(ips.len());
            for chunk in ip_strings.chunks(cascade_recon::bulk_whois::MAX_BATCH_SIZE) {
                match self.bulk_whois.bulk_lookup(chunk).await {
                    Ok(partial) => merged.extend(partial),
                    Err(e) => warn!(error = %e, batch_size = chunk.len(), "bulk whois batch failed, skipping"),
                }
            }
            merged
        } else {
            self.dns_txt
                .bulk_lookup(&ips)
                .await
                .into_iter()
                .map(|(ip, outcome)| {
                    let record = match outcome {
                        TxtOutcome::Routed(record) => Some(record),
                        TxtOutcome::NotRouted | TxtOutcome::Unparseable => None,
                    };
                    (ip, record)
                })
                .collect()
        }
    }

    /// Merges a resolved `cymru` attribution into an existing record
    /// without disturbing `maxmind`/`greynoise` or bumping
    /// `observation_count` (the IP wasn't freshly observed, just backfilled).
    async fn apply_backfill(&self, record: &IpRecord, cymru: Option<CymruRecord>) -> Result<()> {
        let mut enrichment = record.enrichment.clone();
        if cymru.is_some() {
            enrichment.cymru = cymru;
            enrichment.meta.record_success(SourceName::Cymru);
        } else {
            enrichment.meta.record_failure(SourceName::Cymru, "nxdomain_or_timeout");
        }
        self.upsert(&record.ip, &enrichment, 0).await?;
        Ok(())
    }

    async fn try_acquire_backfill_lock(&self) -> Result<bool> {
        let (acquired,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .bind(LOCK_KEY)
            .fetch_one(self.store.pool())
            .await?;
        Ok(acquired)
    }

    async fn release_backfill_lock(&self) -> Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(LOCK_KEY)
            .execute(self.store.pool())
            .await?;
        Ok(())
    }
}
