//! Multi-source IP enrichment cascade for honeypot analytics.
//!
//! Composes an offline geo/ASN database, a bulk ASN whois/DNS source, and
//! a scanner-intel HTTP source behind one freshness-checked, cached,
//! strictly-ordered [`Cascade::enrich_ip`] call. See [`orchestrator`] for
//! the algorithm, [`backfill`] and [`refresh`] for the batch drivers.

mod backfill;
pub mod config;
mod error;
mod orchestrator;
mod refresh;

pub use backfill::BackfillSummary;
pub use config::{CascadeConfig, MaxmindPathConfig, RateLimitConfig, SecretsConfig};
pub use error::{Error, Result};
pub use orchestrator::Cascade;
pub use refresh::RefreshSummary;

use std::sync::Arc;

use cascade_cache::{CacheManager, L2Store, L3Store};
use cascade_client::{DailyBudget, GreynoiseSource, MaxmindConfig, MaxmindSource};
use cascade_core::{CascadeObserver, NullObserver};
use cascade_recon::{BulkWhoisTransport, DnsTxtTransport};
use cascade_store::Store;
use sqlx::postgres::PgPoolOptions;

impl Cascade {
    /// Wires every composed crate together from a resolved configuration
    /// (§6 "Configuration", §9 "Global mutable clients" — explicit
    /// construction, no ambient singletons).
    pub async fn new(config: &CascadeConfig) -> Result<Self> {
        Self::with_observer(config, Arc::new(NullObserver)).await
    }

    pub async fn with_observer(config: &CascadeConfig, observer: Arc<dyn CascadeObserver>) -> Result<Self> {
        let database_url = cascade_secrets::resolve(&config.secrets.database_url).await?;
        let pool = PgPoolOptions::new().connect(&database_url).await?;

        let store = Store::new(pool.clone());
        store.migrate().await?;

        let l2 = L2Store::new(pool);
        l2.migrate().await?;
        let l3 = L3Store::new(&config.cache_root);
        let cache = Arc::new(CacheManager::new(l2, l3, config.enable_l1_cache));

        let maxmind_license = match &config.secrets.maxmind_license_key {
            Some(reference) => Some(cascade_secrets::resolve(reference).await?),
            None => None,
        };
        let maxmind = MaxmindSource::open(MaxmindConfig {
            city_db_path: config.maxmind.city_db_path.clone(),
            asn_db_path: config.maxmind.asn_db_path.clone(),
            license_key: maxmind_license,
        });
        maxmind.maybe_auto_update().await;

        let greynoise = match &config.secrets.greynoise_api_key {
            Some(reference) => {
                let daily_budget = Arc::new(DailyBudget::with_limit(Arc::clone(&cache), config.daily_budget_limit));
                Some(GreynoiseSource::with_rate(
                    reference.clone(),
                    daily_budget,
                    config.rate_limits.greynoise_rate_per_sec,
                    config.rate_limits.greynoise_burst,
                ))
            }
            None => None,
        };

        Ok(Self {
            store,
            cache,
            maxmind,
            bulk_whois: BulkWhoisTransport::new(),
            dns_txt: DnsTxtTransport::default(),
            greynoise,
            enable_asn_inventory: config.enable_asn_inventory,
            observer,
        })
    }
}
