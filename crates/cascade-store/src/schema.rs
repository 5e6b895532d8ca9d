//! Table definitions for the two inventories (§4.8).
//!
//! `ip_inventory.current_asn` is a nullable foreign key into
//! `asn_inventory`; [`crate::Store::upsert_ip`] always runs `ensure_asn`
//! first in the same transaction so the FK is never violated.

use sqlx::PgPool;

use crate::error::Result;

pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS asn_inventory (
            asn_number BIGINT PRIMARY KEY,
            organization_name TEXT,
            country_code TEXT,
            rir_registry TEXT,
            first_seen TIMESTAMPTZ NOT NULL,
            last_seen TIMESTAMPTZ NOT NULL,
            unique_ip_count BIGINT NOT NULL DEFAULT 0,
            total_session_count BIGINT NOT NULL DEFAULT 0
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS ip_inventory (
            ip TEXT PRIMARY KEY,
            first_seen TIMESTAMPTZ NOT NULL,
            last_seen TIMESTAMPTZ NOT NULL,
            observation_count BIGINT NOT NULL DEFAULT 0,
            enrichment JSONB NOT NULL,
            enrichment_ts TIMESTAMPTZ NOT NULL,
            current_asn BIGINT REFERENCES asn_inventory(asn_number)
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS ip_inventory_enrichment_ts_idx ON ip_inventory (enrichment_ts)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS ip_inventory_observation_last_seen_idx ON ip_inventory (observation_count DESC, last_seen DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
