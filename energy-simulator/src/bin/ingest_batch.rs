use anyhow::{bail, Result};
use energy_client::domain::{EnergyRecord, Measurement};
use energy_simulator::{
    config::{AppConfig, SinkKind},
    observability,
    pipeline::{EnvelopeStream, Pipeline, Source},
    sinks::{object_store::s3_operator, QuestDbEnergySink},
    sources::{BatchFileSource, BatchObjectSource},
    transform,
};
use sqlx::postgres::PgPoolOptions;
use std::{env, path::PathBuf, sync::Arc};

enum BatchSource {
    File(BatchFileSource),
    Object(BatchObjectSource),
}

#[async_trait::async_trait]
impl Source<Measurement> for BatchSource {
    async fn stream(&self) -> EnvelopeStream<Measurement> {
        match self {
            Self::File(s) => s.stream().await,
            Self::Object(s) => s.stream().await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: ingest_batch <batch file path or object key>");
    }
    let target = &args[1];

    let cfg = AppConfig::load()?;
    let Some(questdb) = &cfg.questdb else {
        bail!("ingest_batch requires a [questdb] section in the config");
    };

    let source = match cfg.sink.kind {
        SinkKind::Local => {
            let direct = PathBuf::from(target);
            let path = if direct.exists() {
                direct
            } else {
                cfg.sink.local_path.join(target)
            };
            BatchSource::File(BatchFileSource::new(path))
        }
        SinkKind::S3 => {
            let Some(s3) = &cfg.sink.s3 else {
                bail!("sink.kind = \"s3\" requires [sink.s3]");
            };
            BatchSource::Object(BatchObjectSource::new(s3_operator(s3)?, target.as_str()))
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(questdb.max_connections)
        .connect(&questdb.uri)
        .await?;

    let pipeline: Pipeline<_, Measurement, EnergyRecord, _> = Pipeline {
        source,
        transform: Arc::new(transform::EnergyRecordDerivation),
        sink: QuestDbEnergySink::new(pool, cfg.ingest.batch_size),
    };

    let stats = pipeline.run().await?;
    tracing::info!(
        batch = %target,
        written = stats.written,
        rejected = stats.rejected,
        failed = stats.failed,
        "batch ingested"
    );

    Ok(())
}
