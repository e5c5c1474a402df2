//! Growth and death of one inoculated species inside a vessel.

use crate::environment::{EnvironmentState, Flux, GrowthOptimum};
use culturelab_schemas::species::SpeciesProfile;
use std::sync::Arc;

/// Viability lost per hour at full stress.
pub const DEATH_RATE_PER_H: f64 = 0.5;
/// Multiplier on the death rate once viability falls under the species threshold.
pub const ACCELERATED_DEATH_FACTOR: f64 = 3.0;
/// Extra fraction of cells cleared per hour once viability falls under the apoptosis threshold.
pub const APOPTOSIS_CLEARANCE_PER_H: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PopulationId(pub u32);

impl std::fmt::Display for PopulationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pop-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    id: PopulationId,
    species: Arc<SpeciesProfile>,
    cell_count: f64,
    viability: f64,
    growth_rate: f64,
    stress_level: f64,
}

impl Population {
    pub fn new(id: PopulationId, species: Arc<SpeciesProfile>, initial_cells: f64) -> Self {
        Self {
            id,
            species,
            cell_count: initial_cells.max(0.0),
            viability: 1.0,
            growth_rate: 0.0,
            stress_level: 0.0,
        }
    }

    pub fn id(&self) -> PopulationId {
        self.id
    }

    pub fn species(&self) -> &SpeciesProfile {
        &self.species
    }

    pub fn cell_count(&self) -> f64 {
        self.cell_count
    }

    pub fn viability(&self) -> f64 {
        self.viability
    }

    /// Realized specific growth rate over the last tick, per hour.
    pub fn growth_rate(&self) -> f64 {
        self.growth_rate
    }

    pub fn stress_level(&self) -> f64 {
        self.stress_level
    }

    /// Adds (or, when negative, removes) cells immediately. Added cells are viable.
    pub fn add_cells(&mut self, delta: f64) {
        let before = self.cell_count;
        let after = (before + delta).max(0.0);
        if delta > 0.0 {
            self.viability = ((self.viability * before + delta) / after).clamp(0.0, 1.0);
        }
        self.cell_count = after;
    }

    /// Advances the population by `dt_h` hours against a fixed view of `env`.
    ///
    /// Returns this population's consumption and production over the tick; the caller
    /// decides when to apply it.
    pub fn step(&mut self, env: &EnvironmentState, dt_h: f64) -> Flux {
        if !(dt_h > 0.0) {
            return Flux::default();
        }

        let optimum = GrowthOptimum::from(self.species.as_ref());
        let gp = env.growth_potential(&optimum);
        let st = env.stress(&optimum);
        self.stress_level = st;

        let n0 = self.cell_count;
        if n0 <= 0.0 {
            self.cell_count = 0.0;
            self.growth_rate = 0.0;
            return Flux::default();
        }

        let mu = std::f64::consts::LN_2 / self.species.doubling_time_h * gp;
        let headroom = (1.0 - n0 / self.species.max_density).max(0.0);
        let mu = mu * headroom;
        // Exact exponential over the tick, capped so the culture never passes capacity.
        let born = (n0 * ((mu * dt_h).exp() - 1.0))
            .max(0.0)
            .min((self.species.max_density - n0).max(0.0));

        let mut death_rate = DEATH_RATE_PER_H * st;
        if self.viability < self.species.viability_threshold {
            death_rate *= ACCELERATED_DEATH_FACTOR;
        }
        let viability = (self.viability - death_rate * dt_h).clamp(0.0, 1.0);
        let mut died = n0 * (self.viability - viability).max(0.0);
        if viability < self.species.apoptosis_threshold {
            died += n0 * (APOPTOSIS_CLEARANCE_PER_H * dt_h).min(1.0);
        }
        let died = died.min(n0);

        let survivors = n0 - died;
        let count = (survivors + born).max(0.0);
        // Newborn cells are viable; dead ones are cleared from the count.
        let viable = viability * survivors + born;
        self.viability = if count > 0.0 {
            (viable / count).clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.cell_count = count;
        self.growth_rate = born / (n0 * dt_h);

        Flux {
            glucose: self.species.glucose_consumption_rate * n0 * dt_h,
            oxygen: self.species.oxygen_consumption_rate * n0 * dt_h,
            waste: self.species.waste_production_rate * n0 * dt_h,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Chemistry, Concentrations};
    use culturelab_schemas::species::ToleranceRange;

    fn profile() -> SpeciesProfile {
        SpeciesProfile {
            species_id: "TEST".into(),
            species_name: "Test organism".into(),
            doubling_time_h: 1.0,
            optimal_temperature: 37.0,
            optimal_ph: 7.2,
            temperature_range: ToleranceRange { min: 20.0, max: 45.0 },
            ph_range: ToleranceRange { min: 5.0, max: 9.0 },
            max_density: 1e9,
            glucose_consumption_rate: 1e-8,
            oxygen_consumption_rate: 1e-12,
            waste_production_rate: 1e-11,
            viability_threshold: 0.5,
            apoptosis_threshold: 0.2,
        }
    }

    fn ideal_env() -> EnvironmentState {
        EnvironmentState::well_mixed(&Chemistry {
            ph: 7.2,
            concentrations: Concentrations {
                glucose: 4000.0,
                oxygen: 1.0,
                growth_factors: 1.0,
                ..Concentrations::default()
            },
            ..Chemistry::default()
        })
        .unwrap()
    }

    fn hostile_env() -> EnvironmentState {
        EnvironmentState::well_mixed(&Chemistry {
            temperature_c: 60.0,
            ph: 4.0,
            concentrations: Concentrations {
                antibiotics: 100.0,
                toxins: 100.0,
                waste: 100.0,
                ..Concentrations::default()
            },
            ..Chemistry::default()
        })
        .unwrap()
    }

    #[test]
    fn doubles_in_one_doubling_time_under_ideal_conditions() {
        let mut pop = Population::new(PopulationId(1), Arc::new(profile()), 1e3);
        pop.step(&ideal_env(), 1.0);
        assert!((pop.cell_count() - 2e3).abs() < 1.0);
        assert!((pop.growth_rate() - 1.0).abs() < 1e-3);
        assert_eq!(pop.viability(), 1.0);
    }

    #[test]
    fn zero_dt_is_a_no_op() {
        let mut pop = Population::new(PopulationId(1), Arc::new(profile()), 1e6);
        let before = pop.clone();
        let flux = pop.step(&hostile_env(), 0.0);
        assert_eq!(pop, before);
        assert_eq!(flux, Flux::default());
    }

    #[test]
    fn empty_population_reports_no_growth() {
        let mut pop = Population::new(PopulationId(1), Arc::new(profile()), 0.0);
        pop.step(&ideal_env(), 1.0);
        assert_eq!(pop.cell_count(), 0.0);
        assert_eq!(pop.growth_rate(), 0.0);
        pop.add_cells(500.0);
        assert_eq!(pop.cell_count(), 500.0);
        assert_eq!(pop.viability(), 1.0);
    }

    #[test]
    fn hostile_conditions_collapse_viability() {
        let mut pop = Population::new(PopulationId(1), Arc::new(profile()), 1e6);
        let env = hostile_env();
        for _ in 0..200 {
            pop.step(&env, 0.1);
            assert!((0.0..=1.0).contains(&pop.viability()));
            assert!(pop.cell_count() >= 0.0);
        }
        assert!(pop.cell_count() < 1e5);
        assert!(pop.stress_level() > 0.5);
    }

    #[test]
    fn undefined_growth_rate_adds_no_cells() {
        let mut broken = profile();
        broken.doubling_time_h = 0.0;
        let mut pop = Population::new(PopulationId(1), Arc::new(broken), 1e6);
        let env = hostile_env();
        assert_eq!(env.growth_potential(&GrowthOptimum::from(pop.species())), 0.0);
        pop.step(&env, 0.1);
        assert!(pop.cell_count() <= 1e6);
        assert_eq!(pop.growth_rate(), 0.0);
    }

    #[test]
    fn flux_scales_with_cells_at_tick_start() {
        let mut pop = Population::new(PopulationId(1), Arc::new(profile()), 1e6);
        let flux = pop.step(&ideal_env(), 0.5);
        assert!((flux.glucose - 1e-8 * 1e6 * 0.5).abs() < 1e-12);
    }
}
