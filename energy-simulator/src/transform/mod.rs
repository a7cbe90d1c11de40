use crate::pipeline::{Envelope, PipelineError, Transform};
use energy_client::domain::{EnergyRecord, Measurement};
use time::macros::datetime;

/// Pure validation of a `Measurement` record.
///
/// Rules:
/// - site_id must be non-empty.
/// - timestamp must be within a broad sanity window [2000-01-01, 2100-01-01].
/// - energy values must be finite.
///
/// Negative energy values are accepted; they become anomalies downstream.
pub fn validate_measurement(m: &Measurement) -> Result<(), PipelineError> {
    if m.site_id.trim().is_empty() {
        return Err(PipelineError::Transform("site_id must not be empty".to_string()));
    }

    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if m.timestamp < min_ts || m.timestamp > max_ts {
        return Err(PipelineError::Transform("timestamp out of allowed range".to_string()));
    }

    if !m.energy_generated.is_finite() || !m.energy_consumed.is_finite() {
        return Err(PipelineError::Transform("energy values must be finite".to_string()));
    }

    Ok(())
}

/// Validate and derive the stored row (net energy, anomaly flag).
pub fn derive_energy_record(env: Envelope<Measurement>) -> Result<Envelope<EnergyRecord>, PipelineError> {
    validate_measurement(&env.payload)?;
    Ok(env.map(EnergyRecord::from))
}

#[derive(Clone, Default)]
pub struct EnergyRecordDerivation;

#[async_trait::async_trait]
impl Transform<Measurement, EnergyRecord> for EnergyRecordDerivation {
    async fn apply(
        &self,
        input: Envelope<Measurement>,
    ) -> Result<Envelope<EnergyRecord>, PipelineError> {
        match derive_energy_record(input) {
            Ok(env) => {
                if env.payload.anomaly {
                    metrics::counter!("ingest_anomalies_total").increment(1);
                }
                Ok(env)
            }
            Err(e) => {
                metrics::counter!("validation_measurement_rejected_total").increment(1);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(ts: time::OffsetDateTime, generated: f64, consumed: f64) -> Envelope<Measurement> {
        Envelope::now(Measurement {
            site_id: "SITECA001".to_string(),
            timestamp: ts,
            energy_generated: generated,
            energy_consumed: consumed,
        })
    }

    #[test]
    fn derives_net_energy_and_anomaly() {
        let env = envelope(datetime!(2024-01-01 00:00:00 UTC), 120.0, 90.0);
        let rec = derive_energy_record(env).unwrap().payload;
        assert_eq!(rec.net_energy, 30.0);
        assert!(!rec.anomaly);

        let env = envelope(datetime!(2024-01-01 00:00:00 UTC), -1.2, 90.0);
        let rec = derive_energy_record(env).unwrap().payload;
        assert_eq!(rec.net_energy, -91.2);
        assert!(rec.anomaly);
    }

    #[test]
    fn keeps_received_at() {
        let env = envelope(datetime!(2024-01-01 00:00:00 UTC), 1.0, 1.0);
        let received_at = env.received_at;
        assert_eq!(derive_energy_record(env).unwrap().received_at, received_at);
    }

    #[test]
    fn rejects_out_of_range_timestamp() {
        let env = envelope(datetime!(1800-01-01 00:00:00 UTC), 1.0, 1.0);
        assert!(matches!(derive_energy_record(env), Err(PipelineError::Transform(_))));
    }

    #[test]
    fn rejects_empty_site_and_non_finite_values() {
        let mut env = envelope(datetime!(2024-01-01 00:00:00 UTC), 1.0, 1.0);
        env.payload.site_id = " ".to_string();
        assert!(derive_energy_record(env).is_err());

        let env = envelope(datetime!(2024-01-01 00:00:00 UTC), f64::NAN, 1.0);
        assert!(derive_energy_record(env).is_err());
    }

    #[tokio::test]
    async fn transform_applies_derivation() {
        let env = envelope(datetime!(2024-01-01 00:00:00 UTC), 10.0, -0.5);
        let out = EnergyRecordDerivation.apply(env).await.unwrap();
        assert!(out.payload.anomaly);
        assert_eq!(out.payload.net_energy, 10.5);
    }
}
