use time::OffsetDateTime;

use super::Measurement;

/// Row stored in `energy_readings`, keyed by `(site_id, ts)`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct EnergyRecord {
    pub site_id: String,
    #[sqlx(rename = "ts")]
    pub timestamp: OffsetDateTime,
    #[sqlx(rename = "energy_generated_kwh")]
    pub energy_generated: f64,
    #[sqlx(rename = "energy_consumed_kwh")]
    pub energy_consumed: f64,
    #[sqlx(rename = "net_energy_kwh")]
    pub net_energy: f64,
    pub anomaly: bool,
}

/// Round a kWh value to 2 decimal places, half away from zero.
pub fn round_kwh(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl EnergyRecord {
    /// Derive the stored row: net energy is generated minus consumed (rounded),
    /// and any negative reading marks the row as an anomaly.
    pub fn from_measurement(m: &Measurement) -> Self {
        Self {
            site_id: m.site_id.clone(),
            timestamp: m.timestamp,
            energy_generated: m.energy_generated,
            energy_consumed: m.energy_consumed,
            net_energy: round_kwh(m.energy_generated - m.energy_consumed),
            anomaly: m.energy_generated < 0.0 || m.energy_consumed < 0.0,
        }
    }
}

impl From<Measurement> for EnergyRecord {
    fn from(m: Measurement) -> Self {
        Self::from_measurement(&m)
    }
}
