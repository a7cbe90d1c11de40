pub mod energy_record;
pub mod measurement;

pub use energy_record::{round_kwh, EnergyRecord};
pub use measurement::Measurement;
