//! The culture vessel: one environment, its populations, and the actuator settings.

use crate::{
    environment::{EnvironmentState, Flux},
    error::CultureError,
    population::{Population, PopulationId},
};
use culturelab_schemas::{
    environment::{Compound, GasMix},
    snapshot::CultureSnapshot,
    species::SpeciesProfile,
};
use std::sync::Arc;

/// Allowed deviation of an inlet gas mix from 100%, in percentage points.
pub const GAS_MIX_TOLERANCE: f64 = 0.5;

/// Actuator settings and setpoints currently in effect.
#[derive(Debug, Clone, PartialEq)]
pub struct Controls {
    pub stirring_rpm: f64,
    pub aeration_lpm: f64,
    pub inlet_gas: GasMix,
    pub temperature_c: f64,
    pub ph_setpoint: f64,
    /// Dissolved-oxygen setpoint, percent of air saturation.
    pub do_setpoint: f64,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            stirring_rpm: 200.0,
            aeration_lpm: 0.5,
            inlet_gas: GasMix::default(),
            temperature_c: 37.0,
            ph_setpoint: 7.2,
            do_setpoint: 40.0,
        }
    }
}

/// Changes waiting for the start of the next tick.
#[derive(Debug, Clone, Default, PartialEq)]
struct StagedControls {
    stirring_rpm: Option<f64>,
    aeration_lpm: Option<f64>,
    inlet_gas: Option<GasMix>,
    temperature_c: Option<f64>,
    ph_setpoint: Option<f64>,
    do_setpoint: Option<f64>,
}

impl StagedControls {
    fn overlay(&self, controls: &mut Controls) {
        if let Some(v) = self.stirring_rpm {
            controls.stirring_rpm = v;
        }
        if let Some(v) = self.aeration_lpm {
            controls.aeration_lpm = v;
        }
        if let Some(v) = self.inlet_gas {
            controls.inlet_gas = v;
        }
        if let Some(v) = self.temperature_c {
            controls.temperature_c = v;
        }
        if let Some(v) = self.ph_setpoint {
            controls.ph_setpoint = v;
        }
        if let Some(v) = self.do_setpoint {
            controls.do_setpoint = v;
        }
    }
}

pub struct Vessel {
    id: String,
    environment: EnvironmentState,
    populations: Vec<Population>,
    controls: Controls,
    staged: StagedControls,
    next_population_id: u32,
    tick: u64,
    elapsed_h: f64,
    clamp_events: u64,
    skipped_updates: u64,
    last_snapshot: CultureSnapshot,
}

impl Vessel {
    pub fn new(id: &str, environment: EnvironmentState, controls: Controls) -> Self {
        let mut vessel = Self {
            id: id.to_string(),
            environment,
            populations: Vec::new(),
            controls,
            staged: StagedControls::default(),
            next_population_id: 1,
            tick: 0,
            elapsed_h: 0.0,
            clamp_events: 0,
            skipped_updates: 0,
            last_snapshot: CultureSnapshot::default(),
        };
        vessel.push_controls_to_environment();
        vessel.last_snapshot = vessel.snapshot();
        vessel
    }

    /// Adds a new population of `initial_cells` cells delivered in `inoculum_volume_ml`.
    ///
    /// The inoculum liquid joins the vessel and dilutes the medium.
    pub fn inoculate(
        &mut self,
        species: Arc<SpeciesProfile>,
        initial_cells: f64,
        inoculum_volume_ml: f64,
    ) -> Result<PopulationId, CultureError> {
        if !(inoculum_volume_ml > 0.0) {
            return Err(CultureError::InvalidVolume(inoculum_volume_ml));
        }
        if !(initial_cells >= 0.0) || !initial_cells.is_finite() {
            return Err(CultureError::InvalidSetting {
                key: "inoculum_cells".to_string(),
                reason: format!("{} is not a cell count", initial_cells),
            });
        }
        let density = initial_cells / inoculum_volume_ml;
        self.environment.add_volume(inoculum_volume_ml)?;

        let id = PopulationId(self.next_population_id);
        self.next_population_id += 1;
        tracing::info!(
            vessel = %self.id,
            population = %id,
            species = %species.species_id,
            cells = initial_cells,
            cells_per_ml = density,
            volume_ml = self.environment.volume_ml(),
            "inoculated"
        );
        self.populations.push(Population::new(id, species, initial_cells));
        self.last_snapshot = self.snapshot();
        Ok(id)
    }

    /// Stages new actuator settings for the next tick. Omitted values are kept.
    ///
    /// A gas mix must sum to 100 ± 0.5 %; it is stored normalized to exactly 100.
    /// Nothing is staged if any argument is invalid.
    pub fn set_controls(
        &mut self,
        stirring_rpm: Option<f64>,
        aeration_lpm: Option<f64>,
        inlet_gases: Option<GasMix>,
    ) -> Result<(), CultureError> {
        let stirring_rpm = stirring_rpm
            .map(|v| non_negative("stirring_rpm", v))
            .transpose()?;
        let aeration_lpm = aeration_lpm
            .map(|v| non_negative("aeration_lpm", v))
            .transpose()?;
        let inlet_gas = inlet_gases
            .map(|mix| {
                mix.normalized(GAS_MIX_TOLERANCE)
                    .ok_or(CultureError::InvalidGasMix {
                        total: mix.total(),
                        tolerance: GAS_MIX_TOLERANCE,
                    })
            })
            .transpose()?;

        if stirring_rpm.is_some() {
            self.staged.stirring_rpm = stirring_rpm;
        }
        if aeration_lpm.is_some() {
            self.staged.aeration_lpm = aeration_lpm;
        }
        if inlet_gas.is_some() {
            self.staged.inlet_gas = inlet_gas;
        }
        Ok(())
    }

    /// Stages a named setpoint-style parameter for the next tick.
    pub fn apply_runtime_parameter(&mut self, key: &str, value: f64) -> Result<(), CultureError> {
        if !value.is_finite() {
            return Err(CultureError::InvalidSetting {
                key: key.to_string(),
                reason: "not a finite number".to_string(),
            });
        }
        match key {
            "temperature_c" => self.staged.temperature_c = Some(value),
            "ph_setpoint" => self.staged.ph_setpoint = Some(value),
            "do_setpoint" => self.staged.do_setpoint = Some(value.max(0.0)),
            "stirring_rpm" => self.set_controls(Some(value), None, None)?,
            "aeration_lpm" => self.set_controls(None, Some(value), None)?,
            other => return Err(CultureError::UnknownParameter(other.to_string())),
        }
        Ok(())
    }

    pub fn apply_runtime_gas_mix(&mut self, fractions: GasMix) -> Result<(), CultureError> {
        self.set_controls(None, None, Some(fractions))
    }

    /// Feeds glucose immediately. Returns the concentration increase in mg/L.
    pub fn add_glucose_mg(&mut self, amount_mg: f64) -> Result<f64, CultureError> {
        self.add_compound(Compound::Glucose, amount_mg, None)
    }

    pub fn add_compound(
        &mut self,
        compound: Compound,
        amount_mg: f64,
        at: Option<(usize, usize)>,
    ) -> Result<f64, CultureError> {
        if !amount_mg.is_finite() {
            return Err(CultureError::InvalidSetting {
                key: compound.name().to_string(),
                reason: "amount is not a finite number".to_string(),
            });
        }
        let delta = match at {
            Some((x, y)) => self.environment.dose_at(compound, amount_mg, x, y)?,
            None => self.environment.dose(compound, amount_mg)?,
        };
        tracing::debug!(vessel = %self.id, compound = compound.name(), amount_mg, delta, "dosed");
        self.last_snapshot = self.snapshot();
        Ok(delta)
    }

    /// Adds cells at once, split across populations by their current share.
    ///
    /// A negative delta removes cells the same way.
    pub fn add_biomass(&mut self, cell_delta: f64) -> Result<(), CultureError> {
        if !cell_delta.is_finite() {
            return Err(CultureError::InvalidSetting {
                key: "biomass".to_string(),
                reason: "not a finite number".to_string(),
            });
        }
        if self.populations.is_empty() {
            return Err(CultureError::InvalidSetting {
                key: "biomass".to_string(),
                reason: "no population has been inoculated".to_string(),
            });
        }
        let total = self.biomass();
        if total > 0.0 {
            for population in &mut self.populations {
                let share = population.cell_count() / total;
                population.add_cells(cell_delta * share);
            }
        } else {
            self.populations[0].add_cells(cell_delta);
        }
        self.last_snapshot = self.snapshot();
        Ok(())
    }

    /// Advances the vessel by `dt_h` simulated hours and returns the new snapshot.
    ///
    /// Every population grows against the environment as it stood before any of this
    /// tick's uptake; the combined flux is applied afterwards.
    pub fn step(&mut self, dt_h: f64) -> &CultureSnapshot {
        if !(dt_h > 0.0) || !dt_h.is_finite() {
            return &self.last_snapshot;
        }

        self.apply_staged();

        match self.environment.update(dt_h) {
            Ok(clamped) => self.clamp_events += clamped as u64,
            Err(e) => {
                self.skipped_updates += 1;
                tracing::warn!(vessel = %self.id, tick = self.tick, error = %e, "environment update skipped");
            }
        }

        let environment = &self.environment;
        let mut flux = Flux::default();
        for population in &mut self.populations {
            flux.merge(&population.step(environment, dt_h));
        }
        self.clamp_events += self.environment.apply_flux(&flux) as u64;

        self.tick += 1;
        self.elapsed_h += dt_h;
        self.last_snapshot = self.snapshot();
        tracing::debug!(
            vessel = %self.id,
            tick = self.tick,
            biomass = self.last_snapshot.biomass,
            ph = self.last_snapshot.ph,
            do_percent = self.last_snapshot.do_percent,
            "tick complete"
        );
        &self.last_snapshot
    }

    fn apply_staged(&mut self) {
        let staged = std::mem::take(&mut self.staged);
        if staged == StagedControls::default() {
            return;
        }
        staged.overlay(&mut self.controls);
        self.push_controls_to_environment();
    }

    fn push_controls_to_environment(&mut self) {
        let controls = &self.controls;
        self.environment.set_gas(&controls.inlet_gas);
        self.environment
            .set_mixing(controls.aeration_lpm, controls.stirring_rpm);
        self.environment.set_temperature_target(controls.temperature_c);
        self.environment.set_ph_setpoint(controls.ph_setpoint);
    }

    fn snapshot(&self) -> CultureSnapshot {
        let biomass = self.biomass();
        let weighted = |f: fn(&Population) -> f64| {
            if biomass > 0.0 {
                self.populations
                    .iter()
                    .map(|p| f(p) * p.cell_count())
                    .sum::<f64>()
                    / biomass
            } else {
                0.0
            }
        };
        let growth_rate = weighted(Population::growth_rate);
        let stress = if biomass > 0.0 {
            weighted(Population::stress_level)
        } else {
            self.populations
                .iter()
                .map(Population::stress_level)
                .fold(0.0, f64::max)
        };

        CultureSnapshot {
            tick: self.tick,
            elapsed_h: self.elapsed_h,
            temperature_c: self.environment.temperature(),
            ph: self.environment.ph(),
            ph_setpoint: self.controls.ph_setpoint,
            do_percent: self.environment.oxygen() * 100.0,
            do_setpoint: self.controls.do_setpoint,
            glucose: self.environment.concentration(Compound::Glucose),
            waste: self.environment.concentration(Compound::Waste),
            co2_percent: self.environment.co2_fraction() * 100.0,
            osmolality: self.environment.osmolality(),
            biomass,
            viability_percent: weighted(Population::viability) * 100.0,
            growth_rate,
            stress,
            // Zero while the culture is not growing.
            doubling_time_h: if growth_rate > 0.0 {
                std::f64::consts::LN_2 / growth_rate
            } else {
                0.0
            },
            volume_ml: self.environment.volume_ml(),
            stirring_rpm: self.controls.stirring_rpm,
            aeration_lpm: self.controls.aeration_lpm,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn environment(&self) -> &EnvironmentState {
        &self.environment
    }

    pub fn populations(&self) -> &[Population] {
        &self.populations
    }

    pub fn population(&self, id: PopulationId) -> Option<&Population> {
        self.populations.iter().find(|p| p.id() == id)
    }

    pub fn biomass(&self) -> f64 {
        self.populations.iter().map(Population::cell_count).sum()
    }

    /// Controls applied at the start of the last tick.
    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    /// Controls that will be in force next tick, staged changes included.
    pub fn effective_controls(&self) -> Controls {
        let mut controls = self.controls.clone();
        self.staged.overlay(&mut controls);
        controls
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn elapsed_h(&self) -> f64 {
        self.elapsed_h
    }

    /// Values clamped to zero so far. Clamping is normal near depletion.
    pub fn clamp_events(&self) -> u64 {
        self.clamp_events
    }

    /// Ticks whose environment update was dropped after a numeric fault.
    pub fn skipped_updates(&self) -> u64 {
        self.skipped_updates
    }

    pub fn latest_snapshot(&self) -> &CultureSnapshot {
        &self.last_snapshot
    }
}

fn non_negative(key: &str, value: f64) -> Result<f64, CultureError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(CultureError::InvalidSetting {
            key: key.to_string(),
            reason: format!("{} must be a non-negative number", value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Chemistry;

    fn vessel() -> Vessel {
        let env = EnvironmentState::well_mixed(&Chemistry::default()).unwrap();
        Vessel::new("V-1", env, Controls::default())
    }

    #[test]
    fn staged_controls_wait_for_the_next_tick() {
        let mut v = vessel();
        v.set_controls(Some(400.0), None, None).unwrap();
        assert_eq!(v.controls().stirring_rpm, 200.0);
        assert_eq!(v.effective_controls().stirring_rpm, 400.0);
        v.step(0.1);
        assert_eq!(v.controls().stirring_rpm, 400.0);
    }

    #[test]
    fn partial_update_keeps_other_controls() {
        let mut v = vessel();
        v.set_controls(None, Some(1.5), None).unwrap();
        v.step(0.1);
        assert_eq!(v.controls().aeration_lpm, 1.5);
        assert_eq!(v.controls().stirring_rpm, 200.0);
        assert_eq!(v.controls().inlet_gas, GasMix::default());
    }

    #[test]
    fn bad_gas_mix_stages_nothing() {
        let mut v = vessel();
        let err = v
            .set_controls(Some(300.0), None, Some(GasMix { o2: 30.0, co2: 5.0, n2: 74.0 }))
            .unwrap_err();
        assert!(matches!(err, CultureError::InvalidGasMix { .. }));
        assert_eq!(v.effective_controls().stirring_rpm, 200.0);
    }

    #[test]
    fn inoculum_volume_must_be_positive() {
        let mut v = vessel();
        let species = Arc::new(SpeciesProfile::from_optima("X", 37.0, 7.2));
        assert!(matches!(
            v.inoculate(species.clone(), 1e6, 0.0),
            Err(CultureError::InvalidVolume(_))
        ));
        let a = v.inoculate(species.clone(), 1e6, 1.0).unwrap();
        let b = v.inoculate(species, 1e6, 1.0).unwrap();
        assert_ne!(a, b);
        assert_eq!(v.environment().volume_ml(), 102.0);
    }

    #[test]
    fn unknown_runtime_parameter_is_rejected() {
        let mut v = vessel();
        assert!(matches!(
            v.apply_runtime_parameter("flux_capacitor", 1.21),
            Err(CultureError::UnknownParameter(_))
        ));
    }

    #[test]
    fn biomass_addition_needs_a_population() {
        let mut v = vessel();
        assert!(v.add_biomass(1e5).is_err());
        let species = Arc::new(SpeciesProfile::from_optima("X", 37.0, 7.2));
        v.inoculate(species, 1e5, 1.0).unwrap();
        v.add_biomass(1e5).unwrap();
        assert_eq!(v.biomass(), 2e5);
    }

    #[test]
    fn faulty_environment_update_is_skipped_and_counted() {
        let mut v = vessel();
        let species = Arc::new(SpeciesProfile::from_optima("X", 37.0, 7.2));
        v.inoculate(species, 1e6, 1.0).unwrap();
        v.environment.set_temperature_target(f64::NAN);
        let temperature = v.environment().temperature();

        v.step(0.1);
        v.step(0.1);

        assert_eq!(v.skipped_updates(), 2);
        assert_eq!(v.tick(), 2);
        assert_eq!(v.environment().temperature(), temperature);
        assert!(v.latest_snapshot().temperature_c.is_finite());
        assert!(v.biomass() > 1e6);
    }

    #[test]
    fn zero_step_changes_nothing() {
        let mut v = vessel();
        v.set_controls(Some(400.0), None, None).unwrap();
        let before = v.latest_snapshot().clone();
        let after = v.step(0.0).clone();
        assert_eq!(before, after);
        assert_eq!(v.tick(), 0);
        assert_eq!(v.controls().stirring_rpm, 200.0);
    }
}
