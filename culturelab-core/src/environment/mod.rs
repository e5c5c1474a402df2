//! Physicochemical state of a culture vessel.
//!
//! A vessel holds either a well-mixed environment (one value per compound) or a plate
//! grid (one 2-D field per compound). Both sit behind [`EnvironmentState`], which is
//! what populations and controllers see.

pub mod grid;
pub mod kinetics;
pub mod scoring;
pub mod well_mixed;

pub use grid::{Field, PlateGrid};
pub use scoring::{GrowthOptimum, Reading};
pub use well_mixed::WellMixed;

use crate::error::CultureError;
use culturelab_schemas::environment::{Compound, GasMix};
use std::collections::BTreeMap;

/// Concentrations of the tracked compounds, plus any others by name.
///
/// Glucose, antibiotics, toxins, waste and growth factors are in mg/L; oxygen is a
/// fraction of air saturation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Concentrations {
    pub glucose: f64,
    pub oxygen: f64,
    pub antibiotics: f64,
    pub toxins: f64,
    pub waste: f64,
    pub growth_factors: f64,
    pub extra: BTreeMap<String, f64>,
}

impl Concentrations {
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

    pub fn slot_mut(&mut self, compound: Compound) -> &mut f64 {
        match compound {
            Compound::Glucose => &mut self.glucose,
            Compound::Oxygen => &mut self.oxygen,
            Compound::Antibiotics => &mut self.antibiotics,
            Compound::Toxins => &mut self.toxins,
            Compound::Waste => &mut self.waste,
            Compound::GrowthFactors => &mut self.growth_factors,
        }
    }

    /// Clamps every value to be non-negative and returns how many needed it.
    pub fn clamp_non_negative(&mut self) -> usize {
        let mut clamped = 0;
        for compound in Compound::ALL {
            clamped += clamp_slot(self.slot_mut(compound));
        }
        for value in self.extra.values_mut() {
            clamped += clamp_slot(value);
        }
        clamped
    }

    /// Multiplies every dissolved compound by `factor`. Oxygen saturation is left alone.
    pub fn dilute(&mut self, factor: f64) {
        for compound in Compound::ALL {
            if compound != Compound::Oxygen {
                *self.slot_mut(compound) *= factor;
            }
        }
        for value in self.extra.values_mut() {
            *value *= factor;
        }
    }
}

pub(crate) fn clamp_slot(value: &mut f64) -> usize {
    if *value < 0.0 || value.is_nan() {
        *value = 0.0;
        1
    } else {
        0
    }
}

/// Initial physicochemical conditions for a new environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Chemistry {
    pub temperature_c: f64,
    pub ph: f64,
    pub ph_setpoint: f64,
    pub co2_fraction: f64,
    pub inlet_o2_fraction: f64,
    pub osmolality: f64,
    pub volume_ml: f64,
    pub bicarbonate_mm: f64,
    pub aeration_lpm: f64,
    pub stirring_rpm: f64,
    pub concentrations: Concentrations,
}

impl Default for Chemistry {
    fn default() -> Self {
        Self {
            temperature_c: 37.0,
            ph: 7.2,
            ph_setpoint: 7.2,
            co2_fraction: 0.05,
            inlet_o2_fraction: kinetics::AIR_O2_FRACTION,
            osmolality: 300.0,
            volume_ml: 100.0,
            bicarbonate_mm: 24.0,
            aeration_lpm: 0.5,
            stirring_rpm: 200.0,
            concentrations: Concentrations {
                glucose: 4500.0,
                oxygen: 1.0,
                growth_factors: 1.0,
                ..Concentrations::default()
            },
        }
    }
}

/// Scalar state shared by both representations.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Physical {
    pub(crate) temperature: f64,
    pub(crate) temperature_target: f64,
    pub(crate) ph: f64,
    pub(crate) ph_setpoint: f64,
    pub(crate) co2: f64,
    pub(crate) inlet_o2: f64,
    pub(crate) osmolality: f64,
    pub(crate) volume_ml: f64,
    pub(crate) bicarbonate_mm: f64,
    pub(crate) aeration_lpm: f64,
    pub(crate) stirring_rpm: f64,
}

impl Physical {
    fn from_chemistry(chemistry: &Chemistry) -> Result<Self, CultureError> {
        if !(chemistry.volume_ml > 0.0) {
            return Err(CultureError::InvalidVolume(chemistry.volume_ml));
        }
        Ok(Self {
            temperature: chemistry.temperature_c,
            temperature_target: chemistry.temperature_c,
            ph: chemistry.ph,
            ph_setpoint: chemistry.ph_setpoint,
            co2: chemistry.co2_fraction.clamp(0.0, 1.0),
            inlet_o2: chemistry.inlet_o2_fraction.clamp(0.0, 1.0),
            osmolality: chemistry.osmolality.max(0.0),
            volume_ml: chemistry.volume_ml,
            bicarbonate_mm: chemistry.bicarbonate_mm.max(0.0),
            aeration_lpm: chemistry.aeration_lpm.max(0.0),
            stirring_rpm: chemistry.stirring_rpm.max(0.0),
        })
    }

    /// Temperature and pH relaxation. `waste` is the (mean) acidic waste level.
    fn relax(&mut self, waste: f64, dt_h: f64) {
        self.temperature = kinetics::relax(
            self.temperature,
            self.temperature_target,
            kinetics::THERMAL_RELAXATION_PER_H,
            dt_h,
        );
        let ph_target = kinetics::equilibrium_ph(self.co2, self.bicarbonate_mm, waste);
        self.ph = kinetics::relax(self.ph, ph_target, kinetics::PH_RELAXATION_PER_H, dt_h);
    }

    fn validate(&self) -> Result<(), CultureError> {
        if !(self.volume_ml > 0.0) || !self.volume_ml.is_finite() {
            return Err(CultureError::RuntimeComputation(format!(
                "volume became {}",
                self.volume_ml
            )));
        }
        let scalars = [self.temperature, self.ph, self.co2, self.osmolality];
        if scalars.iter().any(|v| !v.is_finite()) {
            return Err(CultureError::RuntimeComputation(
                "non-finite physical state".to_string(),
            ));
        }
        Ok(())
    }

    /// mg added to the vessel → mg/L change in concentration.
    fn mass_to_concentration(&self, amount_mg: f64) -> Result<f64, CultureError> {
        if !(self.volume_ml > 0.0) {
            return Err(CultureError::InvalidVolume(self.volume_ml));
        }
        Ok(amount_mg * 1000.0 / self.volume_ml)
    }
}

/// Compound deltas over one tick, summed across all populations of a vessel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Flux {
    /// mg/L of glucose consumed.
    pub glucose: f64,
    /// Saturation fraction of oxygen consumed.
    pub oxygen: f64,
    /// mg/L of waste produced.
    pub waste: f64,
}

impl Flux {
    pub fn merge(&mut self, other: &Flux) {
        self.glucose += other.glucose;
        self.oxygen += other.oxygen;
        self.waste += other.waste;
    }
}

/// The environment contract shared by well-mixed vessels and plate grids.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvironmentState {
    WellMixed(WellMixed),
    Plate(PlateGrid),
}

impl EnvironmentState {
    pub fn well_mixed(chemistry: &Chemistry) -> Result<Self, CultureError> {
        Ok(Self::WellMixed(WellMixed::new(chemistry)?))
    }

    pub fn plate(chemistry: &Chemistry, width: usize, height: usize) -> Result<Self, CultureError> {
        Ok(Self::Plate(PlateGrid::new(chemistry, width, height)?))
    }

    fn physical(&self) -> &Physical {
        match self {
            Self::WellMixed(env) => &env.physical,
            Self::Plate(env) => &env.physical,
        }
    }

    fn physical_mut(&mut self) -> &mut Physical {
        match self {
            Self::WellMixed(env) => &mut env.physical,
            Self::Plate(env) => &mut env.physical,
        }
    }

    /// Advances relaxation (and diffusion on plates) by `dt_h` hours.
    ///
    /// The update is computed on a copy and committed only if the result is sound, so
    /// a numeric fault leaves the previous state in place. Returns the number of values
    /// that had to be clamped to zero.
    pub fn update(&mut self, dt_h: f64) -> Result<usize, CultureError> {
        if !(dt_h > 0.0) {
            return Ok(0);
        }
        let mut next = self.clone();
        let clamped = match &mut next {
            Self::WellMixed(env) => env.update(dt_h),
            Self::Plate(env) => env.update(dt_h),
        };
        next.physical().validate()?;
        *self = next;
        Ok(clamped)
    }

    /// Applies the combined population flux. Returns the number of clamped values.
    pub fn apply_flux(&mut self, flux: &Flux) -> usize {
        match self {
            Self::WellMixed(env) => env.apply_flux(flux),
            Self::Plate(env) => env.apply_flux(flux),
        }
    }

    /// Conditions as a population experiences them. Plates report their mean.
    pub fn reading(&self) -> Reading {
        match self {
            Self::WellMixed(env) => env.reading(),
            Self::Plate(env) => env.mean_reading(),
        }
    }

    pub fn stress(&self, optimum: &GrowthOptimum) -> f64 {
        scoring::stress(&self.reading(), optimum)
    }

    pub fn growth_potential(&self, optimum: &GrowthOptimum) -> f64 {
        scoring::growth_potential(&self.reading(), optimum)
    }

    /// Adds `amount_mg` of a compound spread through the whole volume.
    ///
    /// Oxygen is not dosed by mass; use the gas mix.
    pub fn dose(&mut self, compound: Compound, amount_mg: f64) -> Result<f64, CultureError> {
        let delta = self.physical().mass_to_concentration(amount_mg)?;
        match self {
            Self::WellMixed(env) => {
                let slot = env.concentrations.slot_mut(compound);
                *slot = (*slot + delta).max(0.0);
            }
            Self::Plate(env) => env.add_uniform(compound, delta),
        }
        if compound == Compound::Glucose {
            let physical = self.physical_mut();
            physical.osmolality =
                (physical.osmolality + delta / kinetics::GLUCOSE_MOLAR_MASS).max(0.0);
        }
        Ok(delta)
    }

    /// Adds `amount_mg` at one plate cell. Well-mixed vessels ignore the position.
    pub fn dose_at(
        &mut self,
        compound: Compound,
        amount_mg: f64,
        x: usize,
        y: usize,
    ) -> Result<f64, CultureError> {
        if let Self::Plate(env) = self {
            return env.dose_at(compound, amount_mg, x, y);
        }
        self.dose(compound, amount_mg)
    }

    /// Adds a compound outside the tracked set, by name.
    pub fn dose_extra(&mut self, name: &str, amount_mg: f64) -> Result<f64, CultureError> {
        let delta = self.physical().mass_to_concentration(amount_mg)?;
        let extra = match self {
            Self::WellMixed(env) => &mut env.concentrations.extra,
            Self::Plate(env) => &mut env.extra,
        };
        let slot = extra.entry(name.to_string()).or_insert(0.0);
        *slot = (*slot + delta).max(0.0);
        Ok(delta)
    }

    /// Sets the headspace composition directly from an already validated mix.
    pub fn set_gas(&mut self, mix: &GasMix) {
        let physical = self.physical_mut();
        physical.co2 = (mix.co2 / 100.0).clamp(0.0, 1.0);
        physical.inlet_o2 = (mix.o2 / 100.0).clamp(0.0, 1.0);
    }

    pub fn set_mixing(&mut self, aeration_lpm: f64, stirring_rpm: f64) {
        let physical = self.physical_mut();
        physical.aeration_lpm = aeration_lpm.max(0.0);
        physical.stirring_rpm = stirring_rpm.max(0.0);
    }

    pub fn set_temperature_target(&mut self, celsius: f64) {
        self.physical_mut().temperature_target = celsius;
    }

    pub fn set_ph_setpoint(&mut self, ph: f64) {
        self.physical_mut().ph_setpoint = ph;
    }

    /// Merges `added_ml` of compound-free liquid into the vessel, diluting everything.
    pub fn add_volume(&mut self, added_ml: f64) -> Result<(), CultureError> {
        let physical = self.physical();
        let total = physical.volume_ml + added_ml;
        if !(added_ml >= 0.0) || !(total > 0.0) {
            return Err(CultureError::InvalidVolume(added_ml));
        }
        let factor = physical.volume_ml / total;
        match self {
            Self::WellMixed(env) => env.concentrations.dilute(factor),
            Self::Plate(env) => env.dilute(factor),
        }
        let physical = self.physical_mut();
        physical.osmolality *= factor;
        physical.volume_ml = total;
        Ok(())
    }

    pub fn temperature(&self) -> f64 {
        self.physical().temperature
    }

    pub fn temperature_target(&self) -> f64 {
        self.physical().temperature_target
    }

    pub fn ph(&self) -> f64 {
        self.physical().ph
    }

    pub fn ph_setpoint(&self) -> f64 {
        self.physical().ph_setpoint
    }

    /// Mean dissolved oxygen, as a fraction of air saturation.
    pub fn oxygen(&self) -> f64 {
        self.reading().oxygen
    }

    pub fn co2_fraction(&self) -> f64 {
        self.physical().co2
    }

    pub fn osmolality(&self) -> f64 {
        self.physical().osmolality
    }

    pub fn volume_ml(&self) -> f64 {
        self.physical().volume_ml
    }

    /// Concentration of a tracked compound (plate mean for grids).
    pub fn concentration(&self, compound: Compound) -> f64 {
        match self {
            Self::WellMixed(env) => env.concentrations.get(compound),
            Self::Plate(env) => env.field(compound).mean(),
        }
    }

    pub fn extra(&self, name: &str) -> Option<f64> {
        match self {
            Self::WellMixed(env) => env.concentrations.extra.get(name).copied(),
            Self::Plate(env) => env.extra.get(name).copied(),
        }
    }

    pub fn as_plate(&self) -> Option<&PlateGrid> {
        match self {
            Self::Plate(env) => Some(env),
            Self::WellMixed(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_volume_is_rejected() {
        let chemistry = Chemistry { volume_ml: 0.0, ..Chemistry::default() };
        assert!(matches!(
            EnvironmentState::well_mixed(&chemistry),
            Err(CultureError::InvalidVolume(_))
        ));
    }

    #[test]
    fn faulty_update_keeps_the_previous_state() {
        let chemistry = Chemistry::default();
        let envs = [
            EnvironmentState::well_mixed(&chemistry).unwrap(),
            EnvironmentState::plate(&chemistry, 5, 5).unwrap(),
        ];
        for mut env in envs {
            env.physical_mut().volume_ml = 0.0;
            let before = env.clone();
            let err = env.update(0.5).unwrap_err();
            assert!(matches!(err, CultureError::RuntimeComputation(_)));
            assert_eq!(env, before);
        }
    }

    #[test]
    fn non_finite_target_is_not_committed() {
        let mut env = EnvironmentState::well_mixed(&Chemistry::default()).unwrap();
        env.apply_flux(&Flux { glucose: 0.0, oxygen: 0.5, waste: 3.0 });
        let (temperature, ph, oxygen) = (env.temperature(), env.ph(), env.oxygen());
        env.set_temperature_target(f64::NAN);
        assert!(matches!(env.update(0.5), Err(CultureError::RuntimeComputation(_))));
        assert_eq!(env.temperature(), temperature);
        assert_eq!(env.ph(), ph);
        assert_eq!(env.oxygen(), oxygen);
    }

    #[test]
    fn glucose_dose_converts_mass_to_concentration() {
        let chemistry = Chemistry { volume_ml: 10.0, ..Chemistry::default() };
        let mut env = EnvironmentState::well_mixed(&chemistry).unwrap();
        let before = env.concentration(Compound::Glucose);
        let delta = env.dose(Compound::Glucose, 10.0).unwrap();
        assert_eq!(delta, 1000.0);
        assert_eq!(env.concentration(Compound::Glucose), before + 1000.0);
        assert!(env.osmolality() > chemistry.osmolality);
    }

    #[test]
    fn adding_volume_dilutes() {
        let mut env = EnvironmentState::well_mixed(&Chemistry::default()).unwrap();
        env.add_volume(100.0).unwrap();
        assert_eq!(env.volume_ml(), 200.0);
        assert_eq!(env.concentration(Compound::Glucose), 2250.0);
        assert_eq!(env.concentration(Compound::Oxygen), 1.0);
    }

    #[test]
    fn extra_compounds_are_tracked_by_name() {
        let mut env = EnvironmentState::well_mixed(&Chemistry::default()).unwrap();
        env.dose_extra("lactate", 5.0).unwrap();
        assert_eq!(env.extra("lactate"), Some(50.0));
        assert_eq!(env.extra("glutamine"), None);
    }

    #[test]
    fn clamp_counts_negative_slots() {
        let mut c = Concentrations { glucose: -1.0, waste: -0.5, ..Concentrations::default() };
        c.extra.insert("x".into(), -2.0);
        assert_eq!(c.clamp_non_negative(), 3);
        assert_eq!(c.glucose, 0.0);
    }
}
