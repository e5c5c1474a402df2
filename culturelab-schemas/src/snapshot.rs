use serde::{Deserialize, Serialize};

/// One completed tick, as seen by display and plotting collaborators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CultureSnapshot {
    pub tick: u64,
    pub elapsed_h: f64,
    pub temperature_c: f64,
    pub ph: f64,
    pub ph_setpoint: f64,
    pub do_percent: f64,
    pub do_setpoint: f64,
    pub glucose: f64,
    pub waste: f64,
    pub co2_percent: f64,
    pub osmolality: f64,
    pub biomass: f64,
    pub viability_percent: f64,
    pub growth_rate: f64,
    pub stress: f64,
    pub doubling_time_h: f64,
    pub volume_ml: f64,
    pub stirring_rpm: f64,
    pub aeration_lpm: f64,
}
