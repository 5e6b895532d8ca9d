//! Parsing shared by both transports for the `|`-delimited Team Cymru
//! record format:
//!
//! ```text
//! AS      | IP         | BGP Prefix   | CC | Registry | Allocated
//! 13335   | 1.0.0.1    | 1.0.0.0/24   | US | arin     | 2010-07-14
//! ```
//!
//! A field equal to `NA` maps to null; the whole record is null if the
//! ASN field is `NA` (the address is not globally routed).

use cascade_core::types::CymruRecord;

/// Parses one record line. Returns `None` if the line has fewer than six
/// `|`-separated fields (this also filters the header line, which reads
/// as text rather than a parseable ASN).
#[must_use]
pub fn parse_line(line: &str) -> Option<(String, Option<CymruRecord>)> {
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    let [asn, ip, bgp_prefix, cc, registry, allocated] = fields[..] else {
        return None;
    };

    if asn != "NA" && asn.parse::<i64>().is_err() {
        return None;
    }

    let ip = ip.to_string();
    if asn == "NA" {
        return Some((ip, None));
    }

    let asn_number: i64 = asn.parse().ok()?;
    Some((
        ip,
        Some(CymruRecord {
            asn: Some(asn_number),
            bgp_prefix: non_na(bgp_prefix),
            country_code: non_na(cc),
            registry: non_na(registry),
            allocated_date: non_na(allocated),
        }),
    ))
}

fn non_na(field: &str) -> Option<String> {
    if field == "NA" || field.is_empty() {
        None
    } else {
        Some(field.to_string())
    }
}

/// Result of parsing one origin-ASN TXT answer (§4.6 DNS transport). The
/// wire tuple omits the `IP` field the bulk format carries, since the
/// query name already encodes the address: `ASN | BGP Prefix | CC |
/// Registry | Allocated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxtOutcome {
    /// A routed address with ASN attribution.
    Routed(CymruRecord),
    /// A well-formed answer whose ASN field is `NA`: not globally
    /// routed. Distinct from [`TxtOutcome::Unparseable`] so the caller
    /// can cache this result instead of treating it as a failure.
    NotRouted,
    /// Fewer than five fields, or a non-numeric, non-`NA` ASN field.
    Unparseable,
}

/// Parses a single TXT-record value (five `|`-separated fields, no `IP`
/// column).
#[must_use]
pub fn parse_txt_outcome(value: &str) -> TxtOutcome {
    let fields: Vec<&str> = value.split('|').map(str::trim).collect();
    let [asn, bgp_prefix, cc, registry, allocated] = fields[..] else {
        return TxtOutcome::Unparseable;
    };

    if asn == "NA" {
        return TxtOutcome::NotRouted;
    }

    let Ok(asn_number) = asn.parse::<i64>() else {
        return TxtOutcome::Unparseable;
    };

    TxtOutcome::Routed(CymruRecord {
        asn: Some(asn_number),
        bgp_prefix: non_na(bgp_prefix),
        country_code: non_na(cc),
        registry: non_na(registry),
        allocated_date: non_na(allocated),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_routed_record() {
        let (ip, record) =
            parse_line("13335   | 1.0.0.1    | 1.0.0.0/24   | US | arin     | 2010-07-14").unwrap();
        assert_eq!(ip, "1.0.0.1");
        let record = record.unwrap();
        assert_eq!(record.asn, Some(13335));
        assert_eq!(record.bgp_prefix.as_deref(), Some("1.0.0.0/24"));
        assert_eq!(record.country_code.as_deref(), Some("US"));
        assert_eq!(record.registry.as_deref(), Some("arin"));
        assert_eq!(record.allocated_date.as_deref(), Some("2010-07-14"));
    }

    #[test]
    fn na_asn_yields_null_record() {
        let (ip, record) = parse_line("NA | 10.0.0.1 | NA | NA | NA | NA").unwrap();
        assert_eq!(ip, "10.0.0.1");
        assert!(record.is_none());
    }

    #[test]
    fn header_line_is_skipped() {
        assert!(parse_line("AS      | IP         | BGP Prefix   | CC | Registry | Allocated").is_none());
    }

    #[test]
    fn short_line_is_skipped() {
        assert!(parse_line("13335 | 1.0.0.1").is_none());
    }

    #[test]
    fn na_field_other_than_asn_maps_to_none() {
        let (_, record) = parse_line("13335 | 1.0.0.1 | NA | US | arin | NA").unwrap();
        let record = record.unwrap();
        assert_eq!(record.bgp_prefix, None);
        assert_eq!(record.allocated_date, None);
        assert_eq!(record.country_code.as_deref(), Some("US"));
    }

    #[test]
    fn txt_routed_answer_parses() {
        let outcome = parse_txt_outcome("13335 | 1.0.0.0/24 | US | arin | 2010-07-14");
        assert_eq!(
            outcome,
            TxtOutcome::Routed(CymruRecord {
                asn: Some(13335),
                bgp_prefix: Some("1.0.0.0/24".to_string()),
                country_code: Some("US".to_string()),
                registry: Some("arin".to_string()),
                allocated_date: Some("2010-07-14".to_string()),
            })
        );
    }

    #[test]
    fn txt_na_answer_is_not_routed() {
        assert_eq!(parse_txt_outcome("NA | NA | NA | NA | NA"), TxtOutcome::NotRouted);
    }

    #[test]
    fn txt_malformed_answer_is_unparseable() {
        assert_eq!(parse_txt_outcome("garbage"), TxtOutcome::Unparseable);
    }
}
