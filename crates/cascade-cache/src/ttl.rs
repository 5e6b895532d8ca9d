//! TTL policy constants for cached source records (§4.3 "Cache entry").
//!
//! Offline geo/ASN lookups are not cached by this crate at all: the
//! database itself is the cache, and the cascade persists the result
//! directly into the IP-inventory. The TTLs below apply to the other
//! two sources.

use cascade_core::types::SourceName;

/// Bulk ASN ("cymru") records: BGP attribution churns slowly.
pub const CYMRU_TTL_SECS: u64 = 90 * 24 * 60 * 60;

/// Scanner-intel ("greynoise") records: classification can flip quickly.
pub const GREYNOISE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// TTL, in seconds, for entries from a given source. Returns `None` for
/// sources this cache never stores (the offline source).
#[must_use]
pub const fn ttl_for_source(source: SourceName) -> Option<u64> {
    match source {
        SourceName::Cymru => Some(CYMRU_TTL_SECS),
        SourceName::Greynoise => Some(GREYNOISE_TTL_SECS),
        SourceName::Maxmind => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cymru_outlives_greynoise() {
        assert!(CYMRU_TTL_SECS > GREYNOISE_TTL_SECS);
    }

    #[test]
    fn maxmind_has_no_ttl_here() {
        assert_eq!(ttl_for_source(SourceName::Maxmind), None);
    }

    #[test]
    fn cymru_and_greynoise_have_ttls() {
        assert_eq!(ttl_for_source(SourceName::Cymru), Some(CYMRU_TTL_SECS));
        assert_eq!(ttl_for_source(SourceName::Greynoise), Some(GREYNOISE_TTL_SECS));
    }
}
