use std::path::PathBuf;

use energy_client::domain::Measurement;

use super::batch_stream;
use crate::pipeline::{EnvelopeStream, PipelineError, Source};

/// A flushed batch file on local disk.
pub struct BatchFileSource {
    path: PathBuf,
}

impl BatchFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Source<Measurement> for BatchFileSource {
    async fn stream(&self) -> EnvelopeStream<Measurement> {
        let path = self.path.clone();
        let name = path.display().to_string();
        batch_stream(name, async move {
            tokio::fs::read(&path)
                .await
                .map_err(|e| PipelineError::Source(format!("failed to read batch file {}: {e}", path.display())))
        })
    }
}
