//! The two atomic operations the cascade composes within one
//! transaction (§4.8): `ensure_asn` then `upsert_ip`.

use cascade_core::types::{AsnRecord, EnrichmentRecord, IpRecord, RirRegistry};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;

use crate::error::{Result, StoreError};

pub struct Store {
    pool: PgPool,
}

impl Store {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        crate::schema::migrate(&self.pool).await
    }

    /// Exposes the underlying pool for operations the store itself
    /// doesn't model, such as the backfill driver's advisory lock.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn get_ip(&self, ip: &str) -> Result<Option<IpRecord>> {
        let row = sqlx::query_as::<_, IpRow>(
            "SELECT ip, first_seen, last_seen, observation_count, enrichment, enrichment_ts FROM ip_inventory WHERE ip = $1",
        )
        .bind(ip)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// `upsert_ip` (§4.8): create if absent, otherwise bump
    /// `last_seen`/`observation_count` and replace the enrichment.
    /// Ensures the owning ASN row exists in the same transaction, and
    /// retries once if a concurrent writer raced the same key.
    #[instrument(skip(self, enrichment), fields(ip = %ip))]
    pub async fn upsert_ip(
        &self,
        ip: &str,
        enrichment: &EnrichmentRecord,
        observation_delta: i64,
    ) -> Result<IpRecord> {
        self.upsert_ip_with_policy(ip, enrichment, observation_delta, true).await
    }

    /// Same as [`Self::upsert_ip`], but when `enable_asn_inventory` is
    /// false the ASN-inventory table is never touched and `current_asn`
    /// stays null on the IP row, so the per-sensor feature flag (§6) never
    /// forces an ASN row into existence.
    #[instrument(skip(self, enrichment), fields(ip = %ip))]
    pub async fn upsert_ip_with_policy(
        &self,
        ip: &str,
        enrichment: &EnrichmentRecord,
        observation_delta: i64,
        enable_asn_inventory: bool,
    ) -> Result<IpRecord> {
        match self
            .try_upsert_ip(ip, enrichment, observation_delta, enable_asn_inventory)
            .await
        {
            Ok(record) => Ok(record),
            Err(StoreError::Database(e)) if is_conflict(&e) => {
                tracing::warn!(ip, "upsert race detected, retrying once");
                self.try_upsert_ip(ip, enrichment, observation_delta, enable_asn_inventory)
                    .await
                    .map_err(|_| StoreError::RaceExhausted { entity: "ip_inventory", key: ip.to_string() })
            }
            Err(e) => Err(e),
        }
    }

    async fn try_upsert_ip(
        &self,
        ip: &str,
        enrichment: &EnrichmentRecord,
        observation_delta: i64,
        enable_asn_inventory: bool,
    ) -> Result<IpRecord> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let existing = sqlx::query_as::<_, (i64, Option<i64>)>(
            "SELECT observation_count, current_asn FROM ip_inventory WHERE ip = $1 FOR UPDATE",
        )
        .bind(ip)
        .fetch_optional(&mut *tx)
        .await?;

        let new_asn = enable_asn_inventory.then(|| enrichment.current_asn()).flatten();
        let previous_asn = existing.as_ref().and_then(|(_, asn)| *asn);
        let is_new_ip_for_asn = new_asn.is_some() && new_asn != previous_asn;

        if let Some(asn) = new_asn {
            let (org, country, rir) = asn_metadata(enrichment, asn);
            ensure_asn_tx(&mut tx, asn, org, country, rir, is_new_ip_for_asn, now).await?;
        }

        let enrichment_json = serde_json::to_value(enrichment)?;

        let row: IpRow = if let Some((observation_count, _)) = existing {
            sqlx::query_as(
                r"
                UPDATE ip_inventory
                SET last_seen = $2,
                    observation_count = $3,
                    enrichment = $4,
                    enrichment_ts = $2,
                    current_asn = $5
                WHERE ip = $1
                RETURNING ip, first_seen, last_seen, observation_count, enrichment, enrichment_ts
                ",
            )
            .bind(ip)
            .bind(now)
            .bind(observation_count + observation_delta)
            .bind(&enrichment_json)
            .bind(new_asn)
            .fetch_one(&mut *tx)
            .await?
        } else {
            sqlx::query_as(
                r"
                INSERT INTO ip_inventory (ip, first_seen, last_seen, observation_count, enrichment, enrichment_ts, current_asn)
                VALUES ($1, $2, $2, $3, $4, $2, $5)
                RETURNING ip, first_seen, last_seen, observation_count, enrichment, enrichment_ts
                ",
            )
            .bind(ip)
            .bind(now)
            .bind(observation_delta)
            .bind(&enrichment_json)
            .bind(new_asn)
            .fetch_one(&mut *tx)
            .await?
        };

        tx.commit().await?;
        row.try_into()
    }

    /// Advances `last_seen`/`observation_count` only, leaving `enrichment`
    /// and `enrichment_ts` untouched. Used by the orchestrator's freshness
    /// short-circuit (§4.9 step 1), where no new enrichment was computed.
    #[instrument(skip(self), fields(ip = %ip))]
    pub async fn touch_ip(&self, ip: &str, observation_delta: i64) -> Result<IpRecord> {
        let now = Utc::now();
        let row: IpRow = sqlx::query_as(
            r"
            UPDATE ip_inventory
            SET last_seen = $2, observation_count = observation_count + $3
            WHERE ip = $1
            RETURNING ip, first_seen, last_seen, observation_count, enrichment, enrichment_ts
            ",
        )
        .bind(ip)
        .bind(now)
        .bind(observation_delta)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    /// `ensure_asn` (§4.8) as a standalone call, for the backfill driver
    /// replaying IP-inventory rows outside the per-IP upsert path.
    #[instrument(skip(self))]
    pub async fn ensure_asn(
        &self,
        asn_number: i64,
        organization_name: Option<&str>,
        country_code: Option<&str>,
        rir_registry: Option<RirRegistry>,
    ) -> Result<AsnRecord> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let record = ensure_asn_tx(&mut tx, asn_number, organization_name, country_code, rir_registry, false, now).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Keyset-paginated listing of every IP-inventory row, ordered by
    /// address text, for the refresh driver's full sweep (§4.10). Pass
    /// the last `ip` seen as `after` to fetch the next page.
    pub async fn list_ips(&self, after: Option<&str>, limit: i64) -> Result<Vec<IpRecord>> {
        let rows = sqlx::query_as::<_, IpRow>(
            r"
            SELECT ip, first_seen, last_seen, observation_count, enrichment, enrichment_ts
            FROM ip_inventory
            WHERE ($1::TEXT IS NULL OR ip > $1)
            ORDER BY ip
            LIMIT $2
            ",
        )
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Selects IPs due for backfill: missing or stale `enrichment_ts`,
    /// observed recently, most-active first (§4.10).
    pub async fn select_backfill_batch(&self, limit: i64) -> Result<Vec<IpRecord>> {
        let rows = sqlx::query_as::<_, IpRow>(
            r"
            SELECT ip, first_seen, last_seen, observation_count, enrichment, enrichment_ts
            FROM ip_inventory
            WHERE (enrichment_ts IS NULL OR enrichment_ts < $1)
              AND last_seen >= $2
            ORDER BY observation_count DESC, last_seen DESC
            LIMIT $3
            ",
        )
        .bind(Utc::now() - chrono::Duration::days(90))
        .bind(Utc::now() - chrono::Duration::days(30))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

async fn ensure_asn_tx(
    tx: &mut Transaction<'_, Postgres>,
    asn_number: i64,
    organization_name: Option<&str>,
    country_code: Option<&str>,
    rir_registry: Option<RirRegistry>,
    bump_unique_ip: bool,
    now: DateTime<Utc>,
) -> Result<AsnRecord> {
    let existing = sqlx::query_as::<_, AsnRow>(
        "SELECT asn_number, organization_name, country_code, rir_registry, first_seen, last_seen, unique_ip_count, total_session_count FROM asn_inventory WHERE asn_number = $1 FOR UPDATE",
    )
    .bind(asn_number)
    .fetch_optional(&mut **tx)
    .await?;

    let rir_str = rir_registry.map(|r| format!("{r:?}").to_uppercase());
    let increment = i64::from(bump_unique_ip);

    let row: AsnRow = if existing.is_some() {
        sqlx::query_as(
            r"
            UPDATE asn_inventory
            SET organization_name = COALESCE(organization_name, $2),
                country_code = COALESCE(country_code, $3),
                rir_registry = COALESCE(rir_registry, $4),
                last_seen = $5,
                unique_ip_count = unique_ip_count + $6
            WHERE asn_number = $1
            RETURNING asn_number, organization_name, country_code, rir_registry, first_seen, last_seen, unique_ip_count, total_session_count
            ",
        )
        .bind(asn_number)
        .bind(organization_name)
        .bind(country_code)
        .bind(&rir_str)
        .bind(now)
        .bind(increment)
        .fetch_one(&mut **tx)
        .await?
    } else {
        sqlx::query_as(
            r"
            INSERT INTO asn_inventory (asn_number, organization_name, country_code, rir_registry, first_seen, last_seen, unique_ip_count, total_session_count)
            VALUES ($1, $2, $3, $4, $5, $5, $6, 0)
            RETURNING asn_number, organization_name, country_code, rir_registry, first_seen, last_seen, unique_ip_count, total_session_count
            ",
        )
        .bind(asn_number)
        .bind(organization_name)
        .bind(country_code)
        .bind(&rir_str)
        .bind(now)
        .bind(increment)
        .fetch_one(&mut **tx)
        .await?
    };

    row.try_into()
}

fn asn_metadata(enrichment: &EnrichmentRecord, asn: i64) -> (Option<&str>, Option<&str>, Option<RirRegistry>) {
    let org = enrichment
        .maxmind
        .as_ref()
        .filter(|m| m.asn == Some(asn))
        .and_then(|m| m.asn_org.as_deref());
    let country = enrichment.maxmind.as_ref().and_then(|m| m.country_code.as_deref()).or_else(|| {
        enrichment.cymru.as_ref().and_then(|c| c.country_code.as_deref())
    });
    let rir = enrichment
        .cymru
        .as_ref()
        .and_then(|c| c.registry.as_deref())
        .and_then(RirRegistry::parse);
    (org, country, rir)
}

fn is_conflict(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[derive(sqlx::FromRow)]
struct IpRow {
    ip: String,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    observation_count: i64,
    enrichment: serde_json::Value,
    enrichment_ts: DateTime<Utc>,
}

impl TryFrom<IpRow> for IpRecord {
    type Error = StoreError;

    fn try_from(row: IpRow) -> Result<Self> {
        Ok(Self {
            ip: row.ip,
            first_seen: row.first_seen,
            last_seen: row.last_seen,
            observation_count: row.observation_count,
            enrichment: serde_json::from_value(row.enrichment)?,
            enrichment_ts: row.enrichment_ts,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AsnRow {
    asn_number: i64,
    organization_name: Option<String>,
    country_code: Option<String>,
    rir_registry: Option<String>,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    unique_ip_count: i64,
    total_session_count: i64,
}

impl TryFrom<AsnRow> for AsnRecord {
    type Error = StoreError;

    fn try_from(row: AsnRow) -> Result<Self> {
        Ok(Self {
            asn_number: row.asn_number,
            organization_name: row.organization_name,
            country_code: row.country_code,
            rir_registry: row.rir_registry.as_deref().and_then(RirRegistry::parse),
            first_seen: row.first_seen,
            last_seen: row.last_seen,
            unique_ip_count: row.unique_ip_count,
            total_session_count: row.total_session_count,
        })
    }
}
