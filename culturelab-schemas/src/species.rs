//! Defines the kinetic description of an organism or strain as stored in the knowledge base.
//! Profiles are pure data: every species grows by the same algorithm, differing only in the
//! parameters below.

use serde::{Deserialize, Serialize};

/// A generic struct to define a minimum and maximum tolerance range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceRange<T> {
    pub min: T,
    pub max: T,
}

impl ToleranceRange<f64> {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Immutable kinetic parameters for one organism or strain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesProfile {
    /// A unique, machine-readable identifier (e.g., "ECOLI-K12").
    pub species_id: String,
    /// A human-readable name (e.g., "Escherichia coli K-12").
    pub species_name: String,
    /// Doubling time under ideal conditions, in hours.
    pub doubling_time_h: f64,
    /// The optimal temperature for growth, in °C.
    pub optimal_temperature: f64,
    /// The optimal pH for growth.
    pub optimal_ph: f64,
    /// The viable temperature range for the organism.
    pub temperature_range: ToleranceRange<f64>,
    /// The viable pH range for the organism.
    pub ph_range: ToleranceRange<f64>,
    /// Carrying capacity, in cells per vessel.
    pub max_density: f64,
    /// Glucose drawn from the medium, in mg/L per cell per hour.
    pub glucose_consumption_rate: f64,
    /// Dissolved-oxygen saturation drawn, as a fraction per cell per hour.
    pub oxygen_consumption_rate: f64,
    /// Acidic waste secreted, in mg/L per cell per hour.
    pub waste_production_rate: f64,
    /// Viability below which death accelerates.
    pub viability_threshold: f64,
    /// Viability below which an extra fraction of cells is lost every tick.
    pub apoptosis_threshold: f64,
}

impl SpeciesProfile {
    /// Builds a profile for an organism that is not in the knowledge base, from the
    /// optimum temperature and pH entered by the operator. Every other parameter takes
    /// a generic mesophile value.
    pub fn from_optima(species_id: &str, optimal_temperature: f64, optimal_ph: f64) -> Self {
        Self {
            species_id: species_id.to_string(),
            species_name: format!("{} (custom)", species_id),
            doubling_time_h: 1.0,
            optimal_temperature,
            optimal_ph,
            temperature_range: ToleranceRange {
                min: optimal_temperature - 15.0,
                max: optimal_temperature + 10.0,
            },
            ph_range: ToleranceRange {
                min: optimal_ph - 2.0,
                max: optimal_ph + 2.0,
            },
            max_density: 1e9,
            glucose_consumption_rate: 1e-7,
            oxygen_consumption_rate: 1e-10,
            waste_production_rate: 5e-10,
            viability_threshold: 0.5,
            apoptosis_threshold: 0.2,
        }
    }
}
