mod enrichment;
mod geo;
mod ip_record;
mod meta;
mod validation;

pub use enrichment::EnrichmentRecord;
pub use geo::{CymruRecord, GreynoiseRecord, MaxmindRecord};
pub use ip_record::{ActivityContext, AsnRecord, IpRecord, RirRegistry};
pub use meta::{CacheTier, EnrichmentMeta, SourceName, ENRICHMENT_VERSION};
pub use validation::ValidationRecord;
