use energy_client::domain::EnergyRecord;
use futures::StreamExt;
use sqlx::{postgres::PgPool, Postgres, QueryBuilder};

use crate::pipeline::{Envelope, PipelineError, Sink, SinkStats};

/// Inserts derived energy records into `energy_readings` over pgwire.
///
/// Failed batch inserts are logged and counted; the sink moves on to the next
/// batch without retrying.
pub struct QuestDbEnergySink {
    pool: PgPool,
    batch_size: usize,
}

impl QuestDbEnergySink {
    pub fn new(pool: PgPool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
        }
    }

    async fn flush_batch(&self, batch: &[Envelope<EnergyRecord>], stats: &mut SinkStats) {
        if batch.is_empty() {
            return;
        }

        match self.insert_batch(batch).await {
            Ok(()) => {
                metrics::counter!("questdb_ingested_records_total").increment(batch.len() as u64);

                // Approximate end-to-end latency from earliest received_at to now.
                if let Some(min_received) = batch.iter().map(|e| e.received_at).min() {
                    if let Ok(dur) = std::time::SystemTime::now().duration_since(min_received) {
                        metrics::histogram!("ingest_end_to_end_latency_seconds").record(dur.as_secs_f64());
                    }
                }

                tracing::info!(records = batch.len(), "stored energy records");
                stats.written += batch.len() as u64;
            }
            Err(e) => {
                tracing::error!(error = %e, records = batch.len(), "failed to store energy records");
                metrics::counter!("questdb_sink_errors_total").increment(1);
                stats.failed += batch.len() as u64;
            }
        }
    }

    async fn insert_batch(&self, batch: &[Envelope<EnergyRecord>]) -> Result<(), sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO energy_readings (ts, site_id, energy_generated_kwh, energy_consumed_kwh, net_energy_kwh, anomaly) ",
        );

        builder.push("VALUES ");
        builder.push_values(batch, |mut b, env| {
            let r = &env.payload;
            b.push_bind(r.timestamp)
                .push_bind(&r.site_id)
                .push_bind(r.energy_generated)
                .push_bind(r.energy_consumed)
                .push_bind(r.net_energy)
                .push_bind(r.anomaly);
        });

        let query = builder.build();
        query.execute(&self.pool).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl Sink<EnergyRecord> for QuestDbEnergySink {
    async fn run<S>(&self, mut input: S) -> Result<SinkStats, PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<EnergyRecord>, PipelineError>> + Send + Unpin + 'static,
    {
        let mut stats = SinkStats::default();
        let mut buffer: Vec<Envelope<EnergyRecord>> = Vec::with_capacity(self.batch_size);

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(error = %e, "skipping record rejected upstream of QuestDbEnergySink");
                    stats.rejected += 1;
                    continue;
                }
            };

            buffer.push(env);
            if buffer.len() >= self.batch_size {
                self.flush_batch(&buffer, &mut stats).await;
                buffer.clear();
            }
        }

        self.flush_batch(&buffer, &mut stats).await;

        Ok(stats)
    }
}
