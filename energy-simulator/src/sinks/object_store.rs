use energy_client::domain::Measurement;
use opendal::Operator;
use time::OffsetDateTime;

use super::{BatchKeys, BatchSink, SinkError};
use crate::config::S3Config;

/// Puts each batch as one JSON object through an OpenDAL operator.
pub struct ObjectStoreSink {
    operator: Operator,
    keys: BatchKeys,
}

impl ObjectStoreSink {
    pub fn new(operator: Operator, prefix: Option<String>) -> Self {
        Self {
            operator,
            keys: BatchKeys::new(prefix),
        }
    }

    /// Sink backed by an S3 bucket. Credentials come from the usual AWS
    /// environment variables / profile.
    pub fn s3(cfg: &S3Config) -> Result<Self, SinkError> {
        let operator = s3_operator(cfg)?;
        tracing::info!(bucket = %cfg.bucket, region = %cfg.region, "object store sink initialized");
        Ok(Self::new(operator, cfg.prefix.clone()))
    }
}

pub fn s3_operator(cfg: &S3Config) -> Result<Operator, opendal::Error> {
    let mut builder = opendal::services::S3::default()
        .bucket(&cfg.bucket)
        .region(&cfg.region);

    if let Some(endpoint) = &cfg.endpoint {
        builder = builder.endpoint(endpoint);
    }

    Ok(Operator::new(builder)?.finish())
}

#[async_trait::async_trait]
impl BatchSink for ObjectStoreSink {
    async fn flush(&self, batch: &[Measurement]) -> Result<Option<String>, SinkError> {
        if batch.is_empty() {
            tracing::info!("no new data to upload");
            return Ok(None);
        }

        let body = serde_json::to_vec_pretty(batch)?;
        let key = self.keys.next(OffsetDateTime::now_utc())?;

        self.operator
            .write_with(&key, body)
            .content_type("application/json")
            .await?;

        tracing::info!(key = %key, records = batch.len(), "batch uploaded to object store");
        Ok(Some(key))
    }
}
