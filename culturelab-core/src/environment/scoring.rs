//! Stress and growth-potential scores: the only way the environment reaches a population.

use culturelab_schemas::species::{SpeciesProfile, ToleranceRange};

/// Dissolved oxygen below this saturation fraction counts as a shortfall.
pub const OXYGEN_FLOOR: f64 = 0.2;
/// Glucose below this many mg/L counts as a shortfall.
pub const GLUCOSE_FLOOR: f64 = 5.0;
/// Growth-factor level at which supplementation is adequate.
pub const GROWTH_FACTOR_REFERENCE: f64 = 1.0;

const TEMPERATURE_STRESS_SPAN: f64 = 20.0;
const PH_STRESS_SPAN: f64 = 3.0;
const TOXIN_STRESS_SPAN: f64 = 5.0;
const ANTIBIOTIC_STRESS_SPAN: f64 = 2.0;
const WASTE_STRESS_SPAN: f64 = 10.0;

const TEMPERATURE_OPTIMUM_SPAN: f64 = 10.0;
const PH_OPTIMUM_SPAN: f64 = 2.0;

const GLUCOSE_WEIGHT: f64 = 1.0;
const OXYGEN_WEIGHT: f64 = 0.5;
const GROWTH_FACTOR_WEIGHT: f64 = 0.8;
const TEMPERATURE_WEIGHT: f64 = 1.0;
const PH_WEIGHT: f64 = 1.0;

/// A flat view of the conditions at one point (or averaged over a plate).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    pub temperature: f64,
    pub ph: f64,
    pub oxygen: f64,
    pub glucose: f64,
    pub antibiotics: f64,
    pub toxins: f64,
    pub waste: f64,
    pub growth_factors: f64,
}

/// The species-specific reference point the scores are measured against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthOptimum {
    pub temperature: f64,
    pub ph: f64,
    pub temperature_range: ToleranceRange<f64>,
    pub ph_range: ToleranceRange<f64>,
}

impl From<&SpeciesProfile> for GrowthOptimum {
    fn from(profile: &SpeciesProfile) -> Self {
        Self {
            temperature: profile.optimal_temperature,
            ph: profile.optimal_ph,
            temperature_range: profile.temperature_range,
            ph_range: profile.ph_range,
        }
    }
}

fn shortfall(value: f64, floor: f64) -> f64 {
    ((floor - value) / floor).max(0.0)
}

fn adequacy(value: f64, reference: f64) -> f64 {
    (value / reference).clamp(0.0, 1.0)
}

/// Mean of the per-factor stress terms, each clamped to `[0, 1]`. 0 means no stress.
///
/// Conditions outside a species' viable range saturate that factor.
pub fn stress(reading: &Reading, optimum: &GrowthOptimum) -> f64 {
    let temperature = if optimum.temperature_range.contains(reading.temperature) {
        (reading.temperature - optimum.temperature).abs() / TEMPERATURE_STRESS_SPAN
    } else {
        1.0
    };
    let ph = if optimum.ph_range.contains(reading.ph) {
        (reading.ph - optimum.ph).abs() / PH_STRESS_SPAN
    } else {
        1.0
    };

    let terms = [
        temperature,
        ph,
        reading.toxins / TOXIN_STRESS_SPAN,
        reading.antibiotics / ANTIBIOTIC_STRESS_SPAN,
        reading.waste / WASTE_STRESS_SPAN,
        shortfall(reading.oxygen, OXYGEN_FLOOR),
        shortfall(reading.glucose, GLUCOSE_FLOOR),
    ];
    let total: f64 = terms.iter().map(|t| sanitize(*t).clamp(0.0, 1.0)).sum();
    (total / terms.len() as f64).clamp(0.0, 1.0)
}

/// Weighted mean of the favourable factors, discounted by `1 - stress`.
pub fn growth_potential(reading: &Reading, optimum: &GrowthOptimum) -> f64 {
    let factors = [
        (adequacy(reading.glucose, GLUCOSE_FLOOR), GLUCOSE_WEIGHT),
        (adequacy(reading.oxygen, OXYGEN_FLOOR), OXYGEN_WEIGHT),
        (
            adequacy(reading.growth_factors, GROWTH_FACTOR_REFERENCE),
            GROWTH_FACTOR_WEIGHT,
        ),
        (
            (1.0 - (reading.temperature - optimum.temperature).abs() / TEMPERATURE_OPTIMUM_SPAN)
                .max(0.0),
            TEMPERATURE_WEIGHT,
        ),
        (
            (1.0 - (reading.ph - optimum.ph).abs() / PH_OPTIMUM_SPAN).max(0.0),
            PH_WEIGHT,
        ),
    ];
    let weight: f64 = factors.iter().map(|(_, w)| w).sum();
    let favourable: f64 = factors.iter().map(|(f, w)| sanitize(*f) * w).sum::<f64>() / weight;
    (favourable * (1.0 - stress(reading, optimum))).clamp(0.0, 1.0)
}

// NaN from a corrupted reading scores as the worst case rather than leaking through.
fn sanitize(value: f64) -> f64 {
    if value.is_nan() {
        1.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimum() -> GrowthOptimum {
        GrowthOptimum {
            temperature: 37.0,
            ph: 7.0,
            temperature_range: ToleranceRange { min: 20.0, max: 45.0 },
            ph_range: ToleranceRange { min: 5.0, max: 9.0 },
        }
    }

    fn ideal() -> Reading {
        Reading {
            temperature: 37.0,
            ph: 7.0,
            oxygen: 1.0,
            glucose: 4000.0,
            growth_factors: 1.0,
            ..Reading::default()
        }
    }

    #[test]
    fn ideal_conditions_have_no_stress_and_full_potential() {
        assert_eq!(stress(&ideal(), &optimum()), 0.0);
        assert!((growth_potential(&ideal(), &optimum()) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn antibiotic_term_saturates() {
        let reading = Reading { antibiotics: 50.0, ..ideal() };
        assert!((stress(&reading, &optimum()) - 1.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_temperature_saturates_its_term() {
        let reading = Reading { temperature: 50.0, ..ideal() };
        assert!((stress(&reading, &optimum()) - 1.0 / 7.0).abs() < 1e-12);
        assert!(growth_potential(&reading, &optimum()) < 0.8);
    }

    #[test]
    fn missing_growth_factors_costs_their_weight() {
        let reading = Reading { growth_factors: 0.0, ..ideal() };
        let expected = (1.0 + 0.5 + 1.0 + 1.0) / 4.3;
        assert!((growth_potential(&reading, &optimum()) - expected).abs() < 1e-12);
    }

    #[test]
    fn nan_reading_stays_in_range() {
        let reading = Reading { toxins: f64::NAN, ..ideal() };
        let s = stress(&reading, &optimum());
        assert!((0.0..=1.0).contains(&s));
        let g = growth_potential(&reading, &optimum());
        assert!((0.0..=1.0).contains(&g));
    }
}
