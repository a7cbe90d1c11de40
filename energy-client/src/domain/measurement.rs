use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One synthetic reading for a site, as written into a flushed batch.
///
/// JSON shape: `{"site_id": "SITECA042", "timestamp": 1708400000,
/// "energy_generated_kwh": 120.5, "energy_consumed_kwh": 90.25}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub site_id: String,
    #[serde(with = "time::serde::timestamp")]
    pub timestamp: OffsetDateTime,
    #[serde(rename = "energy_generated_kwh")]
    pub energy_generated: f64,
    #[serde(rename = "energy_consumed_kwh")]
    pub energy_consumed: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn serializes_with_kwh_keys_and_unix_seconds() {
        let m = Measurement {
            site_id: "SITECA001".to_string(),
            timestamp: datetime!(2024-02-20 03:33:20 UTC),
            energy_generated: 120.5,
            energy_consumed: 90.25,
        };

        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["site_id"], "SITECA001");
        assert_eq!(json["timestamp"], 1708400000);
        assert_eq!(json["energy_generated_kwh"], 120.5);
        assert_eq!(json["energy_consumed_kwh"], 90.25);
    }

    #[test]
    fn parses_integer_energy_values() {
        let raw = r#"{"site_id":"SITE001","timestamp":1708400000,"energy_generated_kwh":120,"energy_consumed_kwh":90}"#;
        let m: Measurement = serde_json::from_str(raw).unwrap();
        assert_eq!(m.energy_generated, 120.0);
        assert_eq!(m.timestamp.unix_timestamp(), 1708400000);
    }
}
