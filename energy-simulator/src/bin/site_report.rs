use anyhow::{bail, Context, Result};
use energy_client::db::{site_history, site_totals};
use energy_simulator::{config::AppConfig, observability};
use sqlx::postgres::PgPoolOptions;
use std::env;
use time::{Duration, OffsetDateTime};

const DEFAULT_WINDOW_HOURS: i64 = 24;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // usage: site_report [hours] [site_id]
    let args: Vec<String> = env::args().skip(1).collect();
    let hours = match args.first() {
        Some(h) => h.parse::<i64>().with_context(|| format!("invalid hours '{h}'"))?,
        None => DEFAULT_WINDOW_HOURS,
    };
    let site = args.get(1);

    let cfg = AppConfig::load()?;
    let questdb = cfg
        .questdb
        .as_ref()
        .context("site_report requires a [questdb] section in the config")?;

    let pool = PgPoolOptions::new()
        .max_connections(questdb.max_connections)
        .connect(&questdb.uri)
        .await?;

    let end = OffsetDateTime::now_utc();
    let start = window_start(end, hours)?;

    if let Some(site_id) = site {
        let rows = site_history(&pool, site_id, start, end).await?;
        for r in &rows {
            tracing::info!(
                site_id = %r.site_id,
                ts = %r.timestamp,
                generated_kwh = r.energy_generated,
                consumed_kwh = r.energy_consumed,
                net_kwh = r.net_energy,
                anomaly = r.anomaly,
                "reading"
            );
        }
        tracing::info!(site_id = %site_id, readings = rows.len(), hours, "site history");
        return Ok(());
    }

    let totals = site_totals(&pool, start, end).await?;
    for t in &totals {
        tracing::info!(
            site_id = %t.site_id,
            generated_kwh = t.total_generated_kwh,
            consumed_kwh = t.total_consumed_kwh,
            net_kwh = t.total_net_kwh,
            anomalies = t.anomaly_count,
            "site totals"
        );
    }
    tracing::info!(sites = totals.len(), hours, "site report complete");

    Ok(())
}

/// Start of a trailing window of `hours` ending at `end`.
fn window_start(end: OffsetDateTime, hours: i64) -> Result<OffsetDateTime> {
    if hours <= 0 {
        bail!("hours must be positive, got {hours}");
    }
    hours
        .checked_mul(3_600)
        .map(Duration::seconds)
        .and_then(|window| end.checked_sub(window))
        .with_context(|| format!("a {hours} hour window is out of range"))
}
