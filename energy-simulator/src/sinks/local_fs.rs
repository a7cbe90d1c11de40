use std::path::{Path, PathBuf};

use energy_client::domain::Measurement;
use time::OffsetDateTime;

use super::{BatchKeys, BatchSink, SinkError};

/// Writes each batch as a pretty-printed JSON file under a local directory.
pub struct LocalFileSink {
    dir: PathBuf,
    keys: BatchKeys,
}

impl LocalFileSink {
    /// Creates `dir` (and parents) if it does not exist yet.
    pub async fn new<P: Into<PathBuf>>(dir: P) -> Result<Self, SinkError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|source| SinkError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        tracing::info!(path = %dir.display(), "local batch directory ready");

        Ok(Self {
            dir,
            keys: BatchKeys::default(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait::async_trait]
impl BatchSink for LocalFileSink {
    async fn flush(&self, batch: &[Measurement]) -> Result<Option<String>, SinkError> {
        if batch.is_empty() {
            tracing::info!("no new data to save");
            return Ok(None);
        }

        let body = serde_json::to_vec_pretty(batch)?;
        let key = self.keys.next(OffsetDateTime::now_utc())?;
        let path = self.dir.join(&key);

        tokio::fs::write(&path, body).await.map_err(|source| SinkError::Io {
            path: path.display().to_string(),
            source,
        })?;

        tracing::info!(path = %path.display(), records = batch.len(), "batch saved locally");
        Ok(Some(key))
    }
}
