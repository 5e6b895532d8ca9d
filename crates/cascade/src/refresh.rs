//! Three-pass refresh driver (§4.10): a scheduled sweep over the whole
//! IP-inventory, as opposed to [`crate::backfill`]'s targeted pass over
//! stale rows only.
//!
//! Pass 1 re-runs the offline source (cheap, local, no network). Pass 2
//! re-runs the bulk ASN source in 500-IP chunks for rows still missing
//! attribution. Pass 3 reapplies the merge policy and, since this is a
//! deliberate scheduled sweep rather than a per-session request, attempts
//! the scanner-intel source for every row regardless of the real-time
//! activity filter — the daily budget still bounds how many calls go out.

use std::net::Ipv4Addr;

use cascade_core::types::{IpRecord, SourceName};
use cascade_core::{ProgressSink, ProgressUpdate};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::orchestrator::Cascade;

const PAGE_SIZE: i64 = 1000;

#[derive(Debug, Default, Clone, Copy)]
pub struct RefreshSummary {
    pub rows_seen: u64,
    pub maxmind_updated: u64,
    pub cymru_updated: u64,
    pub greynoise_updated: u64,
    pub errors: u64,
}

impl Cascade {
    /// Runs all three passes in order. `commit_interval` controls how
    /// often each pass reports progress (§6 configuration).
    #[instrument(skip(self, progress))]
    pub async fn run_refresh(&self, progress: &dyn ProgressSink, commit_interval: usize) -> Result<RefreshSummary> {
        let mut summary = RefreshSummary::default();

        self.refresh_pass_offline(progress, commit_interval, &mut summary).await?;
        self.refresh_pass_bulk_asn(progress, commit_interval, &mut summary).await?;
        self.refresh_pass_merge_and_scanner(progress, commit_interval, &mut summary).await?;

        Ok(summary)
    }

    async fn refresh_pass_offline(
        &self,
        progress: &dyn ProgressSink,
        commit_interval: usize,
        summary: &mut RefreshSummary,
    ) -> Result<()> {
        let mut after: Option<String> = None;
        let mut processed = 0u64;

        loop {
            let page = self.store.list_ips(after.as_deref(), PAGE_SIZE).await?;
            if page.is_empty() {
                break;
            }

            for record in &page {
                summary.rows_seen += 1;
                let Ok(ipv4) = record.ip.parse::<Ipv4Addr>() else { continue };
                if let Some(maxmind) = self.maxmind.lookup(ipv4) {
                    let mut enrichment = record.enrichment.clone();
                    enrichment.maxmind = Some(maxmind);
                    enrichment.meta.record_success(SourceName::Maxmind);
                    if self.upsert(&record.ip, &enrichment, 0).await.is_ok() {
                        summary.maxmind_updated += 1;
                    } else {
                        summary.errors += 1;
                    }
                }

                processed += 1;
                if processed as usize % commit_interval == 0 {
                    progress.report(ProgressUpdate {
                        phase: "refresh:offline".to_string(),
                        ips_processed: processed,
                        ips_total: 0,
                        errors: summary.errors,
                        timestamp: Utc::now(),
                    });
                }
            }

            after = page.last().map(|r| r.ip.clone());
            if (page.len() as i64) < PAGE_SIZE {
                break;
            }
        }

        info!(processed, "offline refresh pass complete");
        Ok(())
    }

    async fn refresh_pass_bulk_asn(
        &self,
        progress: &dyn ProgressSink,
        commit_interval: usize,
        summary: &mut RefreshSummary,
    ) -> Result<()> {
        let mut pending: Vec<IpRecord> = Vec::new();
        let mut processed = 0u64;
        let mut after: Option<String> = None;

        loop {
            let page = self.store.list_ips(after.as_deref(), PAGE_SIZE).await?;
            if page.is_empty() {
                break;
            }

            pending.extend(page.iter().filter(|r| r.current_asn().is_none()).cloned());
            after = page.last().map(|r| r.ip.clone());

            while pending.len() >= cascade_recon::bulk_whois::MAX_BATCH_SIZE {
                let chunk: Vec<IpRecord> = pending.drain(..cascade_recon::bulk_whois::MAX_BATCH_SIZE).collect();
                processed += self.apply_bulk_asn_chunk(&chunk, summary).await?;
                if processed as usize % commit_interval < chunk.len() {
                    progress.report(ProgressUpdate {
                        phase: "refresh:bulk_asn".to_string(),
                        ips_processed: processed,
                        ips_total: 0,
                        errors: summary.errors,
                        timestamp: Utc::now(),
                    });
                }
            }

            if (page.len() as i64) < PAGE_SIZE {
                break;
            }
        }

        if !pending.is_empty() {
            processed += self.apply_bulk_asn_chunk(&pending, summary).await?;
        }

        info!(processed, "bulk ASN refresh pass complete");
        Ok(())
    }

    async fn apply_bulk_asn_chunk(&self, chunk: &[IpRecord], summary: &mut RefreshSummary) -> Result<u64> {
        let ip_strings: Vec<String> = chunk.iter().map(|r| r.ip.clone()).collect();
        let results = match self.bulk_whois.bulk_lookup(&ip_strings).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, batch_size = chunk.len(), "bulk ASN refresh batch failed, skipping");
                summary.errors += chunk.len() as u64;
                return Ok(chunk.len() as u64);
            }
        };

        for record in chunk {
            if let Some(Some(cymru)) = results.get(&record.ip) {
                let mut enrichment = record.enrichment.clone();
                enrichment.cymru = Some(cymru.clone());
                enrichment.meta.record_success(SourceName::Cymru);
                if self.upsert(&record.ip, &enrichment, 0).await.is_ok() {
                    summary.cymru_updated += 1;
                } else {
                    summary.errors += 1;
                }
            }
        }

        Ok(chunk.len() as u64)
    }

    async fn refresh_pass_merge_and_scanner(
        &self,
        progress: &dyn ProgressSink,
        commit_interval: usize,
        summary: &mut RefreshSummary,
    ) -> Result<()> {
        let Some(greynoise) = &self.greynoise else {
            info!("no scanner-intel source configured, skipping merge-and-scanner pass");
            return Ok(());
        };

        let mut processed = 0u64;
        let mut after: Option<String> = None;

        loop {
            let page = self.store.list_ips(after.as_deref(), PAGE_SIZE).await?;
            if page.is_empty() {
                break;
            }

            for record in &page {
                if record.enrichment.greynoise.is_none() {
                    match greynoise.lookup(&record.ip).await {
                        Ok(Some(observed)) => {
                            let mut enrichment = record.enrichment.clone();
                            enrichment.greynoise = Some(observed);
                            enrichment.meta.record_success(SourceName::Greynoise);
                            if self.upsert(&record.ip, &enrichment, 0).await.is_ok() {
                                summary.greynoise_updated += 1;
                            } else {
                                summary.errors += 1;
                            }
                        }
                        Ok(None) => {}
                        Err(failure) => {
                            warn!(ip = %record.ip, reason = failure.reason(), "scanner-intel refresh lookup failed");
                        }
                    }
                }

                processed += 1;
                if processed as usize % commit_interval == 0 {
                    progress.report(ProgressUpdate {
                        phase: "refresh:merge_and_scanner".to_string(),
                        ips_processed: processed,
                        ips_total: 0,
                        errors: summary.errors,
                        timestamp: Utc::now(),
                    });
                }
            }

            after = page.last().map(|r| r.ip.clone());
            if (page.len() as i64) < PAGE_SIZE {
                break;
            }
        }

        info!(processed, "merge-and-scanner refresh pass complete");
        Ok(())
    }
}
