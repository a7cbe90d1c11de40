pub mod local_fs;
pub mod object_store;
pub mod questdb;

use std::sync::Mutex;

use energy_client::domain::Measurement;
use time::{
    format_description::BorrowedFormatItem, macros::format_description, OffsetDateTime, UtcOffset,
};

pub use local_fs::LocalFileSink;
pub use object_store::ObjectStoreSink;
pub use questdb::QuestDbEnergySink;

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("object store error: {0}")]
    ObjectStore(#[from] opendal::Error),
    #[error("failed to format batch key: {0}")]
    Key(#[from] time::error::Format),
}

/// Destination for one flushed batch of measurements.
///
/// A batch is written as a single unit (one file or one object) holding a JSON
/// array. Flushing an empty batch writes nothing and returns `Ok(None)`;
/// otherwise the returned key names the written unit.
#[async_trait::async_trait]
pub trait BatchSink: Send + Sync {
    async fn flush(&self, batch: &[Measurement]) -> Result<Option<String>, SinkError>;
}

const SECOND_STAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]_[month]_[day]_[hour]_[minute]_[second]");

fn second_stamp(at: OffsetDateTime) -> Result<String, SinkError> {
    Ok(at.to_offset(UtcOffset::UTC).format(SECOND_STAMP)?)
}

fn with_prefix(prefix: Option<&str>, name: String) -> String {
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(p) => format!("{p}/{name}"),
        None => name,
    }
}

/// Hands out batch keys of the form `YYYY_MM_DD_HH_MM_SS_data.json` (UTC,
/// optionally under `prefix/`), adding a `_N` sequence suffix when two flushes land in
/// the same second so the later batch does not overwrite the earlier one.
#[derive(Debug, Default)]
pub struct BatchKeys {
    prefix: Option<String>,
    last: Mutex<Option<(String, u32)>>,
}

impl BatchKeys {
    pub fn new(prefix: Option<String>) -> Self {
        Self {
            prefix,
            last: Mutex::new(None),
        }
    }

    pub fn next(&self, at: OffsetDateTime) -> Result<String, SinkError> {
        let stamp = second_stamp(at)?;
        let seq = {
            let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
            let seq = match last.as_ref() {
                Some((prev, n)) if *prev == stamp => n + 1,
                _ => 0,
            };
            *last = Some((stamp.clone(), seq));
            seq
        };

        let name = if seq == 0 {
            format!("{stamp}_data.json")
        } else {
            format!("{stamp}_{seq}_data.json")
        };
        Ok(with_prefix(self.prefix.as_deref(), name))
    }
}
