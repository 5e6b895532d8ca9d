//! Bulk ASN attribution source, Team Cymru-style (§4.6).
//!
//! Two independent transports share the same `|`-delimited wire format:
//! [`bulk_whois`] for large batches (backfill), [`dns_txt`] for small
//! real-time lookups. Neither transport caches; the orchestrator's cache
//! wrapper sits in front of both.

pub mod bulk_whois;
pub mod dns_txt;
mod error;
mod parse;

pub use bulk_whois::BulkWhoisTransport;
pub use dns_txt::DnsTxtTransport;
pub use error::{ReconError, Result};
pub use parse::{parse_line, parse_txt_outcome, TxtOutcome};
