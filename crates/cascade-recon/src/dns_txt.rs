//! Concurrent reverse-DNS TXT transport (§4.6), used for small real-time
//! lookups rather than large batches.
//!
//! For IP `a.b.c.d`, queries the TXT record of
//! `d.c.b.a.origin.asn.cymru.com`. NXDOMAIN and a well-formed `NA` answer
//! are not the same outcome: the former is a lookup failure (never
//! cached), the latter means "not globally routed" and is cached as a
//! null record. See [`TxtOutcome`].

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::parse::{parse_txt_outcome, TxtOutcome};

const DEFAULT_CONCURRENCY: usize = 10;
const QUERY_TIMEOUT: Duration = Duration::from_secs(3);
const TIMEOUT_BACKOFF: Duration = Duration::from_millis(500);

pub struct DnsTxtTransport {
    resolver: TokioAsyncResolver,
    semaphore: Arc<Semaphore>,
}

impl Default for DnsTxtTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl DnsTxtTransport {
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Looks up a single IP. A well-formed `NA` answer is reported as
    /// [`TxtOutcome::NotRouted`], not a failure: the caller caches it as a
    /// null record. A genuinely malformed answer, NXDOMAIN, or a timeout
    /// is [`TxtOutcome::Unparseable`] and must not be cached.
    pub async fn lookup(&self, ip: Ipv4Addr) -> TxtOutcome {
        let Ok(_permit) = self.semaphore.acquire().await else {
            return TxtOutcome::Unparseable;
        };
        let query = cymru_query_name(ip);

        match timeout(QUERY_TIMEOUT, self.resolver.txt_lookup(query.clone())).await {
            Ok(Ok(response)) => response
                .iter()
                .map(|txt| {
                    let joined = txt
                        .iter()
                        .map(|chunk| String::from_utf8_lossy(chunk).to_string())
                        .collect::<Vec<_>>()
                        .join("");
                    parse_txt_outcome(&joined)
                })
                .find(|outcome| !matches!(outcome, TxtOutcome::Unparseable))
                .unwrap_or(TxtOutcome::Unparseable),
            Ok(Err(e)) => {
                debug!(ip = %ip, error = %e, "cymru TXT lookup returned no record (NXDOMAIN or similar)");
                TxtOutcome::Unparseable
            }
            Err(_) => {
                warn!(ip = %ip, "cymru TXT lookup timed out, backing off");
                tokio::time::sleep(TIMEOUT_BACKOFF).await;
                TxtOutcome::Unparseable
            }
        }
    }

    /// Looks up many IPs concurrently, bounded by the configured
    /// semaphore.
    pub async fn bulk_lookup(&self, ips: &[Ipv4Addr]) -> HashMap<String, TxtOutcome> {
        let futures = ips.iter().map(|ip| {
            let ip = *ip;
            async move { (ip.to_string(), self.lookup(ip).await) }
        });
        futures_util::future::join_all(futures).await.into_iter().collect()
    }
}

fn cymru_query_name(ip: Ipv4Addr) -> String {
    let [a, b, c, d] = ip.octets();
    format!("{d}.{c}.{b}.{a}.origin.asn.cymru.com")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_name_reverses_octets() {
        let ip: Ipv4Addr = "1.2.3.4".parse().unwrap();
        assert_eq!(cymru_query_name(ip), "4.3.2.1.origin.asn.cymru.com");
    }
}
