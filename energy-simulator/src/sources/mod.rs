pub mod batch_file;
pub mod batch_object;

use std::future::Future;

use energy_client::domain::Measurement;

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError};

pub use batch_file::BatchFileSource;
pub use batch_object::BatchObjectSource;

/// Turn the raw bytes of one flushed batch into a stream of measurements.
///
/// A batch that cannot be read or is not a JSON array yields a single error.
/// Elements that do not parse as a measurement yield an error each, and the
/// rest of the batch still flows.
pub(crate) fn batch_stream<F>(name: String, read: F) -> EnvelopeStream<Measurement>
where
    F: Future<Output = Result<Vec<u8>, PipelineError>> + Send + 'static,
{
    let s = async_stream::stream! {
        let bytes = match read.await {
            Ok(b) => b,
            Err(e) => {
                yield Err(e);
                return;
            }
        };

        let items: Vec<serde_json::Value> = match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(e) => {
                metrics::counter!("ingest_batch_parse_errors_total").increment(1);
                yield Err(PipelineError::Source(format!("{name} is not a JSON array of records: {e}")));
                return;
            }
        };

        tracing::info!(batch = %name, records = items.len(), "processing batch");

        for (idx, item) in items.into_iter().enumerate() {
            match serde_json::from_value::<Measurement>(item) {
                Ok(m) => {
                    yield Ok(Envelope::now(m));
                }
                Err(e) => {
                    metrics::counter!("ingest_record_parse_errors_total").increment(1);
                    yield Err(PipelineError::Source(format!("{name}[{idx}]: invalid record: {e}")));
                }
            }
        }
    };

    Box::pin(s)
}
