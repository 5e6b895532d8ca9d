//! Bulk TCP whois transport (§4.6), the primary transport for backfill
//! and batched lookups.
//!
//! Opens a single TCP connection, sends a framed `begin/verbose/.../end`
//! query for up to [`MAX_BATCH_SIZE`] IPs, and parses the newline- and
//! pipe-delimited response once the peer closes the connection.

use std::collections::HashMap;
use std::time::Duration;

use cascade_core::types::CymruRecord;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument};

use crate::error::{ReconError, Result};
use crate::parse::parse_line;

const CYMRU_HOST: &str = "whois.cymru.com";
const CYMRU_PORT: u16 = 43;
pub const MAX_BATCH_SIZE: usize = 500;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct BulkWhoisTransport {
    host: String,
    port: u16,
    timeout: Duration,
}

impl Default for BulkWhoisTransport {
    fn default() -> Self {
        Self { host: CYMRU_HOST.to_string(), port: CYMRU_PORT, timeout: DEFAULT_TIMEOUT }
    }
}

impl BulkWhoisTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Looks up ASN attribution for up to [`MAX_BATCH_SIZE`] IPs in one
    /// TCP round trip. A timeout or connection error aborts the whole
    /// batch; the caller decides whether to retry.
    #[instrument(skip(self, ips), fields(batch_size = ips.len()))]
    pub async fn bulk_lookup(&self, ips: &[String]) -> Result<HashMap<String, Option<CymruRecord>>> {
        debug_assert!(ips.len() <= MAX_BATCH_SIZE, "batch exceeds Cymru's 500-IP limit");

        timeout(self.timeout, self.bulk_lookup_inner(ips))
            .await
            .map_err(|_| ReconError::Timeout(self.timeout))?
    }

    async fn bulk_lookup_inner(&self, ips: &[String]) -> Result<HashMap<String, Option<CymruRecord>>> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|source| ReconError::Connect { host: self.host.clone(), port: self.port, source })?;

        let mut query = String::from("begin\nverbose\n");
        for ip in ips {
            query.push_str(ip);
            query.push('\n');
        }
        query.push_str("end\n");

        stream.write_all(query.as_bytes()).await?;
        stream.shutdown().await?;

        let mut raw = String::new();
        stream.read_to_string(&mut raw).await?;

        let mut results = HashMap::with_capacity(ips.len());
        for line in raw.lines() {
            if let Some((ip, record)) = parse_line(line) {
                results.insert(ip, record);
            }
        }
        debug!(parsed = results.len(), "bulk whois batch parsed");
        Ok(results)
    }
}
