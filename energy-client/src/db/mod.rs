pub mod energy_reading_queries;

pub use energy_reading_queries::{site_history, site_totals, SiteEnergyTotals};
