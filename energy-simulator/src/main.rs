use anyhow::Result;
use energy_client::domain::Measurement;
use energy_simulator::{
    config::{AppConfig, SinkKind},
    generator::RecordGenerator,
    metrics_server,
    observability,
    sinks::{BatchSink, LocalFileSink, ObjectStoreSink, SinkError},
    uploader::UploaderLoop,
};
use tokio_util::sync::CancellationToken;

enum SimulatorSink {
    Local(LocalFileSink),
    ObjectStore(ObjectStoreSink),
}

#[async_trait::async_trait]
impl BatchSink for SimulatorSink {
    async fn flush(&self, batch: &[Measurement]) -> Result<Option<String>, SinkError> {
        match self {
            Self::Local(s) => s.flush(batch).await,
            Self::ObjectStore(s) => s.flush(batch).await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let sink = match cfg.sink.kind {
        SinkKind::Local => SimulatorSink::Local(LocalFileSink::new(&cfg.sink.local_path).await?),
        SinkKind::S3 => {
            let s3 = cfg
                .sink
                .s3
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("sink.kind = \"s3\" requires [sink.s3]"))?;
            SimulatorSink::ObjectStore(ObjectStoreSink::s3(s3)?)
        }
    };

    // The signal task only flips the token; the loop owns the buffer and the final flush.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received, finishing current batch"),
            Err(e) => tracing::error!(error = %e, "failed to listen for interrupt"),
        }
        on_signal.cancel();
    });

    let generator = RecordGenerator::new(cfg.generator_config());
    let summary = UploaderLoop::new(generator, sink, cfg.uploader_config())
        .run(cancel)
        .await;

    tracing::info!(
        generated = summary.generated,
        delivered = summary.delivered,
        flushes = summary.flushes,
        failed_flushes = summary.failed_flushes,
        undelivered = summary.undelivered,
        stop_reason = ?summary.stop_reason,
        "simulation complete"
    );

    Ok(())
}
