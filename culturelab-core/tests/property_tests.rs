//! Invariants that must hold for any input in range.

use culturelab_core::{
    control::{ErrorSense, PiGains, PiLoop},
    environment::{Chemistry, Concentrations, EnvironmentState, Flux, GrowthOptimum},
    population::{Population, PopulationId},
    vessel::{Controls, Vessel},
};
use culturelab_schemas::{
    environment::{Compound, GasMix},
    species::SpeciesProfile,
};
use proptest::prelude::*;
use std::sync::Arc;

fn chemistry_strategy() -> impl Strategy<Value = Chemistry> {
    (
        0.0..60.0f64,
        4.0..9.0f64,
        prop::array::uniform6(0.0..50.0f64),
        1.0..1000.0f64,
        0.0..0.2f64,
    )
        .prop_map(|(temperature_c, ph, c, volume_ml, co2_fraction)| Chemistry {
            temperature_c,
            ph,
            co2_fraction,
            volume_ml,
            concentrations: Concentrations {
                glucose: c[0],
                oxygen: c[1] / 50.0,
                antibiotics: c[2],
                toxins: c[3],
                waste: c[4],
                growth_factors: c[5],
                ..Concentrations::default()
            },
            ..Chemistry::default()
        })
}

fn all_non_negative(env: &EnvironmentState) -> bool {
    Compound::ALL.iter().all(|c| env.concentration(*c) >= 0.0)
        && match env.as_plate() {
            Some(plate) => Compound::ALL
                .iter()
                .all(|c| plate.field(*c).values().iter().all(|v| *v >= 0.0)),
            None => true,
        }
}

// ============================================================================
// Environment
// ============================================================================

proptest! {
    #[test]
    fn concentrations_stay_non_negative(
        chemistry in chemistry_strategy(),
        uptake in 0.0..100.0f64,
        dt in 0.0..5.0f64,
        plate in any::<bool>(),
    ) {
        let mut env = if plate {
            EnvironmentState::plate(&chemistry, 5, 4).unwrap()
        } else {
            EnvironmentState::well_mixed(&chemistry).unwrap()
        };
        env.apply_flux(&Flux { glucose: uptake, oxygen: uptake, waste: 0.0 });
        prop_assert!(all_non_negative(&env));
        env.update(dt).unwrap();
        prop_assert!(all_non_negative(&env));
    }

    #[test]
    fn zero_update_changes_nothing(chemistry in chemistry_strategy(), plate in any::<bool>()) {
        let mut env = if plate {
            EnvironmentState::plate(&chemistry, 4, 4).unwrap()
        } else {
            EnvironmentState::well_mixed(&chemistry).unwrap()
        };
        let before = env.clone();
        prop_assert_eq!(env.update(0.0).unwrap(), 0);
        prop_assert_eq!(env, before);
    }

    #[test]
    fn scores_are_normalized(chemistry in chemistry_strategy(), t in 0.0..60.0f64, ph in 4.0..9.0f64) {
        let env = EnvironmentState::well_mixed(&chemistry).unwrap();
        let optimum = GrowthOptimum::from(&SpeciesProfile::from_optima("ANY", t, ph));
        let stress = env.stress(&optimum);
        let potential = env.growth_potential(&optimum);
        prop_assert!((0.0..=1.0).contains(&stress));
        prop_assert!((0.0..=1.0).contains(&potential));
    }
}

// ============================================================================
// Population
// ============================================================================

proptest! {
    #[test]
    fn population_stays_in_bounds(
        chemistry in chemistry_strategy(),
        cells in 0.0..2e9f64,
        dts in prop::collection::vec(0.0..5.0f64, 1..30),
    ) {
        let env = EnvironmentState::well_mixed(&chemistry).unwrap();
        let profile = Arc::new(SpeciesProfile::from_optima("ANY", 37.0, 7.2));
        let max_density = profile.max_density;
        let mut pop = Population::new(PopulationId(1), profile, cells);
        for dt in dts {
            pop.step(&env, dt);
            prop_assert!(pop.cell_count() >= 0.0);
            prop_assert!((0.0..=1.0).contains(&pop.viability()));
            prop_assert!(pop.cell_count() <= max_density.max(cells));
        }
    }

    #[test]
    fn zero_step_changes_nothing(chemistry in chemistry_strategy(), cells in 0.0..1e9f64) {
        let env = EnvironmentState::well_mixed(&chemistry).unwrap();
        let mut pop = Population::new(PopulationId(1), Arc::new(SpeciesProfile::from_optima("ANY", 37.0, 7.2)), cells);
        let before = pop.clone();
        prop_assert_eq!(pop.step(&env, 0.0), Flux::default());
        prop_assert_eq!(pop, before);
    }
}

// ============================================================================
// Control
// ============================================================================

proptest! {
    #[test]
    fn sustained_error_never_escapes_the_actuator_range(
        measured in -1000.0..1000.0f64,
        start in 0.0..20.0f64,
        reverse in any::<bool>(),
        gaps in prop::collection::vec(0.0..20.0f64, 1..200),
    ) {
        let gains = PiGains::ph_co2();
        let sense = if reverse { ErrorSense::Reverse } else { ErrorSense::Direct };
        let mut pi = PiLoop::new(gains, sense, 7.0);
        pi.set_automatic(true);
        let mut actuator = start;
        let mut now = 0.0;
        for gap in gaps {
            now += gap;
            let next = pi.evaluate(Some(measured), actuator, now).unwrap().unwrap();
            prop_assert!((gains.output_min..=gains.output_max).contains(&next));
            prop_assert!((next - actuator).abs() <= gains.slew_limit + 1e-12);
            prop_assert!(pi.state().integral.abs() <= gains.integral_limit);
            actuator = next;
        }
    }

    #[test]
    fn gas_mix_is_stored_at_exactly_one_hundred(
        o2 in 0.0..60.0f64,
        co2 in 0.0..30.0f64,
        offset in -0.5..0.5f64,
    ) {
        let mut vessel = Vessel::new(
            "gas",
            EnvironmentState::well_mixed(&Chemistry::default()).unwrap(),
            Controls::default(),
        );
        let mix = GasMix { o2, co2, n2: 100.0 - o2 - co2 + offset };
        vessel.set_controls(None, None, Some(mix)).unwrap();
        let stored = vessel.effective_controls().inlet_gas;
        prop_assert!((stored.total() - 100.0).abs() < 1e-9);
        prop_assert!(stored.n2 >= 0.0);
    }

    #[test]
    fn gas_mix_outside_tolerance_is_rejected(
        o2 in 0.0..60.0f64,
        co2 in 0.0..30.0f64,
        offset in 0.6..10.0f64,
        low in any::<bool>(),
    ) {
        let mut vessel = Vessel::new(
            "gas",
            EnvironmentState::well_mixed(&Chemistry::default()).unwrap(),
            Controls::default(),
        );
        let offset = if low { -offset } else { offset };
        let mix = GasMix { o2, co2, n2: 100.0 - o2 - co2 + offset };
        prop_assert!(vessel.set_controls(None, None, Some(mix)).is_err());
        prop_assert_eq!(vessel.effective_controls().inlet_gas, GasMix::default());
    }
}
