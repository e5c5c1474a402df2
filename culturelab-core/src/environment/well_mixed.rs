use super::{kinetics, Chemistry, Concentrations, Flux, Physical, Reading};
use crate::error::CultureError;
use culturelab_schemas::environment::Compound;

/// A stirred vessel: one value per compound.
#[derive(Debug, Clone, PartialEq)]
pub struct WellMixed {
    pub(crate) physical: Physical,
    pub(crate) concentrations: Concentrations,
}

impl WellMixed {
    pub fn new(chemistry: &Chemistry) -> Result<Self, CultureError> {
        let mut concentrations = chemistry.concentrations.clone();
        concentrations.clamp_non_negative();
        Ok(Self {
            physical: Physical::from_chemistry(chemistry)?,
            concentrations,
        })
    }

    /// Degradation and replenishment toward each quantity's target.
    pub(crate) fn update(&mut self, dt_h: f64) -> usize {
        for compound in Compound::ALL {
            if let Some(rate) = kinetics::decay_rate(compound) {
                let slot = self.concentrations.slot_mut(compound);
                *slot = kinetics::relax(*slot, 0.0, rate, dt_h);
            }
        }

        let saturation = kinetics::oxygen_saturation(self.physical.inlet_o2);
        let kla = kinetics::oxygen_transfer_rate(self.physical.aeration_lpm, self.physical.stirring_rpm);
        self.concentrations.oxygen = kinetics::relax(self.concentrations.oxygen, saturation, kla, dt_h);

        self.physical.relax(self.concentrations.waste, dt_h);
        self.concentrations.clamp_non_negative()
    }

    pub(crate) fn apply_flux(&mut self, flux: &Flux) -> usize {
        self.concentrations.glucose -= flux.glucose;
        self.concentrations.oxygen -= flux.oxygen;
        self.concentrations.waste += flux.waste;
        self.concentrations.clamp_non_negative()
    }

    pub fn reading(&self) -> Reading {
        let c = &self.concentrations;
        Reading {
            temperature: self.physical.temperature,
            ph: self.physical.ph,
            oxygen: c.oxygen,
            glucose: c.glucose,
            antibiotics: c.antibiotics,
            toxins: c.toxins,
            waste: c.waste,
            growth_factors: c.growth_factors,
        }
    }

    pub fn concentrations(&self) -> &Concentrations {
        &self.concentrations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vessel() -> WellMixed {
        WellMixed::new(&Chemistry {
            concentrations: Concentrations {
                glucose: 100.0,
                oxygen: 0.3,
                antibiotics: 10.0,
                growth_factors: 1.0,
                ..Concentrations::default()
            },
            ..Chemistry::default()
        })
        .unwrap()
    }

    #[test]
    fn antibiotics_decay_about_one_percent_per_default_tick() {
        let mut env = vessel();
        env.update(0.1);
        let lost = 1.0 - env.concentrations.antibiotics / 10.0;
        assert!((lost - 0.01).abs() < 0.001, "lost {lost}");
    }

    #[test]
    fn oxygen_recovers_toward_air_saturation() {
        let mut env = vessel();
        for _ in 0..50 {
            env.update(0.1);
        }
        assert!((env.concentrations.oxygen - 1.0).abs() < 0.01);
    }

    #[test]
    fn temperature_follows_its_target() {
        let mut env = vessel();
        env.physical.temperature_target = 30.0;
        for _ in 0..40 {
            env.update(0.1);
        }
        assert!((env.physical.temperature - 30.0).abs() < 0.01);
    }

    #[test]
    fn flux_never_drives_concentrations_negative() {
        let mut env = vessel();
        let clamped = env.apply_flux(&Flux { glucose: 500.0, oxygen: 2.0, waste: 1.0 });
        assert_eq!(clamped, 2);
        assert_eq!(env.concentrations.glucose, 0.0);
        assert_eq!(env.concentrations.oxygen, 0.0);
        assert_eq!(env.concentrations.waste, 1.0);
    }
}
