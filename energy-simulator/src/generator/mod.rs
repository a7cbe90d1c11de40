use energy_client::domain::{round_kwh, Measurement};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Deserialize;
use time::OffsetDateTime;

/// Smallest fault reading; used when a sampled fault rounds to zero.
const MIN_FAULT_KWH: f64 = -0.01;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct KwhRange {
    pub min: f64,
    pub max: f64,
}

impl KwhRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Knobs for synthetic measurements. Ranges are assumed validated
/// (finite, `min <= max`, fault range reaching below zero).
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Sites are numbered `1..=site_count`.
    pub site_count: u32,
    pub generated_kwh: KwhRange,
    pub consumed_kwh: KwhRange,
    /// Chance, applied to each energy field independently, of replacing
    /// the reading with a fault value.
    pub fault_probability: f64,
    pub fault_kwh: KwhRange,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            site_count: 100,
            generated_kwh: KwhRange::new(10.0, 200.0),
            consumed_kwh: KwhRange::new(5.0, 180.0),
            fault_probability: 0.1,
            fault_kwh: KwhRange::new(-2.0, 0.0),
        }
    }
}

pub fn site_id(number: u32) -> String {
    format!("SITECA{number:03}")
}

/// Produces one synthetic `Measurement` per call.
pub struct RecordGenerator<R = StdRng> {
    config: GeneratorConfig,
    rng: R,
}

impl RecordGenerator<StdRng> {
    pub fn new(config: GeneratorConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }
}

impl<R: Rng> RecordGenerator<R> {
    pub fn with_rng(config: GeneratorConfig, rng: R) -> Self {
        Self { config, rng }
    }

    pub fn generate(&mut self) -> Measurement {
        let site_number = self.rng.gen_range(1..=self.config.site_count.max(1));
        let now = OffsetDateTime::now_utc();
        // Batches carry whole seconds.
        let timestamp = now - time::Duration::nanoseconds(now.nanosecond() as i64);

        let energy_generated = self.reading(self.config.generated_kwh);
        let energy_consumed = self.reading(self.config.consumed_kwh);

        Measurement {
            site_id: site_id(site_number),
            timestamp,
            energy_generated,
            energy_consumed,
        }
    }

    fn reading(&mut self, range: KwhRange) -> f64 {
        if self.rng.gen_bool(self.config.fault_probability) {
            return self.fault();
        }
        let raw = self.rng.gen_range(range.min..=range.max);
        round_kwh(raw).clamp(range.min, range.max)
    }

    fn fault(&mut self) -> f64 {
        let fault = self.config.fault_kwh;
        let upper = fault.max.min(0.0);
        let value = round_kwh(self.rng.gen_range(fault.min..=upper));
        if value >= 0.0 {
            MIN_FAULT_KWH
        } else {
            value
        }
    }
}
