use energy_client::domain::Measurement;
use opendal::Operator;

use super::batch_stream;
use crate::pipeline::{EnvelopeStream, PipelineError, Source};

/// A flushed batch object read through an OpenDAL operator.
pub struct BatchObjectSource {
    operator: Operator,
    key: String,
}

impl BatchObjectSource {
    pub fn new(operator: Operator, key: impl Into<String>) -> Self {
        Self {
            operator,
            key: key.into(),
        }
    }
}

#[async_trait::async_trait]
impl Source<Measurement> for BatchObjectSource {
    async fn stream(&self) -> EnvelopeStream<Measurement> {
        let operator = self.operator.clone();
        let key = self.key.clone();
        batch_stream(key.clone(), async move {
            match operator.read(&key).await {
                Ok(buf) => Ok(buf.to_vec()),
                Err(e) if e.kind() == opendal::ErrorKind::NotFound => {
                    Err(PipelineError::Source(format!("batch object {key} does not exist")))
                }
                Err(e) => Err(PipelineError::Source(format!("failed to read batch object {key}: {e}"))),
            }
        })
    }
}
