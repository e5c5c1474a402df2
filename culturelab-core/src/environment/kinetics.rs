//! Rate laws shared by both environment representations.
//!
//! All rates are per simulated hour. Relaxation uses the exact first-order solution
//! `value += (target - value) * (1 - e^(-k·dt))`, so a zero-length tick changes nothing.

use culturelab_schemas::environment::Compound;

/// Antibiotic half-life of roughly seven hours, about 1% per default tick.
pub const ANTIBIOTIC_DECAY_PER_H: f64 = 0.1;
pub const TOXIN_DECAY_PER_H: f64 = 0.05;
pub const GROWTH_FACTOR_DECAY_PER_H: f64 = 0.02;
/// Jacket or incubator pull toward the temperature target.
pub const THERMAL_RELAXATION_PER_H: f64 = 2.0;
pub const PH_RELAXATION_PER_H: f64 = 1.5;

/// Oxygen transfer through the liquid surface alone.
pub const SURFACE_KLA_PER_H: f64 = 0.5;
/// Additional transfer per litre-per-minute of sparged gas.
pub const SPARGE_KLA_PER_LPM: f64 = 4.0;
pub const REFERENCE_STIRRING_RPM: f64 = 200.0;
/// O2 fraction of air; an inlet at this fraction saturates the medium at 100%.
pub const AIR_O2_FRACTION: f64 = 0.2095;

pub const NEUTRAL_PH: f64 = 7.0;
pub const BICARBONATE_PKA: f64 = 6.1;
/// CO2 solubility, mM per mmHg.
pub const CO2_SOLUBILITY: f64 = 0.0307;
pub const ATMOSPHERIC_MMHG: f64 = 760.0;
/// pH drop per mg/L of accumulated acidic waste.
pub const WASTE_ACIDITY: f64 = 0.01;
pub const MIN_PH: f64 = 4.0;
pub const MAX_PH: f64 = 9.0;

pub const GLUCOSE_MOLAR_MASS: f64 = 180.16;

/// Fraction of the gap to the target closed over `dt_h` hours at `rate_per_h`.
pub fn relaxation_factor(rate_per_h: f64, dt_h: f64) -> f64 {
    if dt_h <= 0.0 || rate_per_h <= 0.0 {
        return 0.0;
    }
    1.0 - (-rate_per_h * dt_h).exp()
}

pub fn relax(value: f64, target: f64, rate_per_h: f64, dt_h: f64) -> f64 {
    value + (target - value) * relaxation_factor(rate_per_h, dt_h)
}

/// Volumetric oxygen transfer coefficient for the given aeration and stirring.
pub fn oxygen_transfer_rate(aeration_lpm: f64, stirring_rpm: f64) -> f64 {
    let agitation = 1.0 + stirring_rpm.max(0.0) / REFERENCE_STIRRING_RPM;
    SURFACE_KLA_PER_H + SPARGE_KLA_PER_LPM * aeration_lpm.max(0.0) * agitation
}

/// Dissolved-oxygen saturation, as a fraction of air saturation, for an inlet O2 fraction.
pub fn oxygen_saturation(inlet_o2_fraction: f64) -> f64 {
    (inlet_o2_fraction / AIR_O2_FRACTION).clamp(0.0, 1.0 / AIR_O2_FRACTION)
}

/// The pH the medium buffers toward.
///
/// With a bicarbonate buffer this is Henderson–Hasselbalch on the headspace CO2;
/// without one the medium drifts back to neutral. Acidic waste lowers either.
pub fn equilibrium_ph(co2_fraction: f64, bicarbonate_mm: f64, waste: f64) -> f64 {
    let base = if bicarbonate_mm > 0.0 {
        // Floor at ambient air CO2 so the log stays finite.
        let pco2 = co2_fraction.max(0.0004) * ATMOSPHERIC_MMHG;
        BICARBONATE_PKA + (bicarbonate_mm / (CO2_SOLUBILITY * pco2)).log10()
    } else {
        NEUTRAL_PH
    };
    (base - WASTE_ACIDITY * waste.max(0.0)).clamp(MIN_PH, MAX_PH)
}

/// First-order decay rate of a compound, if it decays on its own.
pub fn decay_rate(compound: Compound) -> Option<f64> {
    match compound {
        Compound::Antibiotics => Some(ANTIBIOTIC_DECAY_PER_H),
        Compound::Toxins => Some(TOXIN_DECAY_PER_H),
        Compound::GrowthFactors => Some(GROWTH_FACTOR_DECAY_PER_H),
        Compound::Glucose | Compound::Oxygen | Compound::Waste => None,
    }
}

/// Per-compound diffusion coefficients for plate grids, in grid cells² per hour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffusionCoefficients {
    pub glucose: f64,
    pub oxygen: f64,
    pub antibiotics: f64,
    pub toxins: f64,
    pub waste: f64,
    pub growth_factors: f64,
}

impl Default for DiffusionCoefficients {
    fn default() -> Self {
        Self {
            glucose: 0.1,
            oxygen: 0.3,
            antibiotics: 0.05,
            toxins: 0.08,
            waste: 0.02,
            growth_factors: 0.15,
        }
    }
}

impl DiffusionCoefficients {
    pub fn get(&self, compound: Compound) -> f64 {
        match compound {
            Compound::Glucose => self.glucose,
            Compound::Oxygen => self.oxygen,
            Compound::Antibiotics => self.antibiotics,
            Compound::Toxins => self.toxins,
            Compound::Waste => self.waste,
            Compound::GrowthFactors => self.growth_factors,
        }
    }
}

/// Largest Laplacian weight per explicit sub-step; the 5-point stencil is stable below 0.25.
pub const MAX_DIFFUSION_WEIGHT: f64 = 0.2;

/// Splits `coefficient * dt_h` into sub-steps that keep the explicit scheme stable.
pub fn diffusion_substeps(coefficient: f64, dt_h: f64) -> (usize, f64) {
    let total = coefficient * dt_h;
    if total <= 0.0 || !total.is_finite() {
        return (0, 0.0);
    }
    let steps = (total / MAX_DIFFUSION_WEIGHT).ceil().max(1.0) as usize;
    (steps, total / steps as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relaxation_is_idle_for_zero_dt() {
        assert_eq!(relax(3.0, 10.0, 5.0, 0.0), 3.0);
    }

    #[test]
    fn relaxation_never_overshoots() {
        let v = relax(0.0, 1.0, 1000.0, 10.0);
        assert!(v <= 1.0 && v > 0.999);
    }

    #[test]
    fn five_percent_co2_buffers_near_physiological_ph() {
        let ph = equilibrium_ph(0.05, 24.0, 0.0);
        assert!((ph - 7.41).abs() < 0.02, "pH {ph}");
    }

    #[test]
    fn more_co2_lowers_equilibrium_ph() {
        assert!(equilibrium_ph(0.10, 24.0, 0.0) < equilibrium_ph(0.05, 24.0, 0.0));
    }

    #[test]
    fn unbuffered_medium_drifts_to_neutral() {
        assert_eq!(equilibrium_ph(0.05, 0.0, 0.0), NEUTRAL_PH);
    }

    #[test]
    fn substeps_keep_weight_stable() {
        let (n, w) = diffusion_substeps(0.3, 1.0);
        assert_eq!(n, 2);
        assert!(w <= MAX_DIFFUSION_WEIGHT);
        assert_eq!(diffusion_substeps(0.3, 0.0), (0, 0.0));
    }
}
