pub mod config;
pub mod generator;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod transform;
pub mod uploader;

pub use pipeline::{Envelope, Pipeline};
pub use uploader::{RunSummary, UploaderLoop};
