use anyhow::Result;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::domain::EnergyRecord;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SiteEnergyTotals {
    pub site_id: String,
    pub total_generated_kwh: f64,
    pub total_consumed_kwh: f64,
    pub total_net_kwh: f64,
    pub anomaly_count: i64,
}

/// Fetch the time-ordered readings for a single site.
pub async fn site_history(
    pool: &PgPool,
    site_id: &str,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<EnergyRecord>> {
    let rows = sqlx::query_as::<_, EnergyRecord>(
        r#"
        SELECT
            site_id,
            ts,
            energy_generated_kwh,
            energy_consumed_kwh,
            net_energy_kwh,
            anomaly
        FROM energy_readings
        WHERE site_id = $1
          AND ts >= $2
          AND ts <  $3
        ORDER BY ts
        "#,
    )
    .bind(site_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Per-site energy totals and anomaly counts over a window.
pub async fn site_totals(
    pool: &PgPool,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<SiteEnergyTotals>> {
    let rows = sqlx::query_as::<_, SiteEnergyTotals>(
        r#"
        SELECT
            site_id,
            SUM(energy_generated_kwh)                        AS total_generated_kwh,
            SUM(energy_consumed_kwh)                         AS total_consumed_kwh,
            SUM(net_energy_kwh)                              AS total_net_kwh,
            SUM(CASE WHEN anomaly THEN 1 ELSE 0 END)         AS anomaly_count
        FROM energy_readings
        WHERE ts >= $1
          AND ts <  $2
        GROUP BY site_id
        ORDER BY site_id
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
