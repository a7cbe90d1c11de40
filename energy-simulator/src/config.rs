use serde::Deserialize;
use std::{fs, path::PathBuf, time::Duration};

use crate::generator::{GeneratorConfig, KwhRange};
use crate::uploader::UploaderConfig;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{field}: bounds must be finite numbers")]
    NonFinite { field: &'static str },
    #[error("{field}: min {min} is greater than max {max}")]
    InvertedRange { field: &'static str, min: f64, max: f64 },
    #[error("{field} must be within [0, 1], got {value}")]
    Probability { field: &'static str, value: f64 },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("{0} must allow strictly negative values")]
    FaultNotNegative(&'static str),
    #[error("sink.kind = \"s3\" requires a [sink.s3] section")]
    MissingS3,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestDbConfig {
    pub uri: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorSection {
    #[serde(default = "default_site_count")]
    pub site_count: u32,
    #[serde(default = "default_generated_kwh")]
    pub generated_kwh: KwhRange,
    #[serde(default = "default_consumed_kwh")]
    pub consumed_kwh: KwhRange,
    #[serde(default = "default_fault_probability")]
    pub fault_probability: f64,
    #[serde(default = "default_fault_kwh")]
    pub fault_kwh: KwhRange,
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            site_count: default_site_count(),
            generated_kwh: default_generated_kwh(),
            consumed_kwh: default_consumed_kwh(),
            fault_probability: default_fault_probability(),
            fault_kwh: default_fault_kwh(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploaderSection {
    #[serde(default = "default_generation_interval_ms")]
    pub generation_interval_ms: u64,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Overall run time; unset means run until interrupted.
    pub time_budget_secs: Option<u64>,
    #[serde(default = "default_budget_margin_secs")]
    pub budget_margin_secs: u64,
}

impl Default for UploaderSection {
    fn default() -> Self {
        Self {
            generation_interval_ms: default_generation_interval_ms(),
            flush_interval_ms: default_flush_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            time_budget_secs: None,
            budget_margin_secs: default_budget_margin_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    #[default]
    Local,
    S3,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub endpoint: Option<String>,
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,
    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,
    pub s3: Option<S3Config>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::default(),
            local_path: default_local_path(),
            s3: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub generator: GeneratorSection,
    #[serde(default)]
    pub uploader: UploaderSection,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    pub questdb: Option<QuestDbConfig>,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("SIMULATOR_CONFIG").unwrap_or_else(|_| "simulator-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config {path}: {e}"))?;
        let cfg = Self::from_toml(&contents)?;
        Ok(cfg)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.generator;
        if g.site_count == 0 {
            return Err(ConfigError::Zero("generator.site_count"));
        }
        check_range("generator.generated_kwh", g.generated_kwh)?;
        check_range("generator.consumed_kwh", g.consumed_kwh)?;
        check_range("generator.fault_kwh", g.fault_kwh)?;
        if g.fault_kwh.min >= 0.0 {
            return Err(ConfigError::FaultNotNegative("generator.fault_kwh"));
        }
        if !(0.0..=1.0).contains(&g.fault_probability) {
            return Err(ConfigError::Probability {
                field: "generator.fault_probability",
                value: g.fault_probability,
            });
        }

        let u = &self.uploader;
        if u.generation_interval_ms == 0 {
            return Err(ConfigError::Zero("uploader.generation_interval_ms"));
        }
        if u.flush_interval_ms == 0 {
            return Err(ConfigError::Zero("uploader.flush_interval_ms"));
        }
        if u.poll_interval_ms == 0 {
            return Err(ConfigError::Zero("uploader.poll_interval_ms"));
        }

        if self.sink.kind == SinkKind::S3 && self.sink.s3.is_none() {
            return Err(ConfigError::MissingS3);
        }
        if self.ingest.batch_size == 0 {
            return Err(ConfigError::Zero("ingest.batch_size"));
        }

        Ok(())
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        let g = &self.generator;
        GeneratorConfig {
            site_count: g.site_count,
            generated_kwh: g.generated_kwh,
            consumed_kwh: g.consumed_kwh,
            fault_probability: g.fault_probability,
            fault_kwh: g.fault_kwh,
        }
    }

    pub fn uploader_config(&self) -> UploaderConfig {
        let u = &self.uploader;
        UploaderConfig {
            generation_interval: Duration::from_millis(u.generation_interval_ms),
            flush_interval: Duration::from_millis(u.flush_interval_ms),
            poll_interval: Duration::from_millis(u.poll_interval_ms),
            time_budget: u.time_budget_secs.map(Duration::from_secs),
            budget_margin: Duration::from_secs(u.budget_margin_secs),
        }
    }
}

fn check_range(field: &'static str, range: KwhRange) -> Result<(), ConfigError> {
    if !range.min.is_finite() || !range.max.is_finite() {
        return Err(ConfigError::NonFinite { field });
    }
    if !(range.min <= range.max) {
        return Err(ConfigError::InvertedRange {
            field,
            min: range.min,
            max: range.max,
        });
    }
    Ok(())
}

fn default_max_connections() -> u32 {
    4
}

fn default_site_count() -> u32 {
    100
}

fn default_generated_kwh() -> KwhRange {
    KwhRange::new(10.0, 200.0)
}

fn default_consumed_kwh() -> KwhRange {
    KwhRange::new(5.0, 180.0)
}

fn default_fault_probability() -> f64 {
    0.1
}

fn default_fault_kwh() -> KwhRange {
    KwhRange::new(-2.0, 0.0)
}

fn default_generation_interval_ms() -> u64 {
    3_000
}

fn default_flush_interval_ms() -> u64 {
    60_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_budget_margin_secs() -> u64 {
    15
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_local_path() -> PathBuf {
    PathBuf::from("data")
}

fn default_batch_size() -> usize {
    500
}
