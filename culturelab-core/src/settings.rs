//! Turns the operator's applied settings into validated initial conditions.
//!
//! Critical identity fields (species, medium, vessel) must resolve or the start is
//! blocked. Other fields fall back to their documented defaults with a warning.

use crate::{
    environment::{Chemistry, Concentrations},
    error::CultureError,
    knowledge::KnowledgeBase,
    vessel::{Controls, GAS_MIX_TOLERANCE},
};
use culturelab_schemas::{
    environment::{GasMix, MediumProfile},
    settings::AppliedSettings,
    species::SpeciesProfile,
};
use std::sync::Arc;

pub const DEFAULT_TEMPERATURE_C: f64 = 37.0;
pub const DEFAULT_PH_SETPOINT: f64 = 7.2;
pub const DEFAULT_DO_SETPOINT: f64 = 40.0;
pub const DEFAULT_STIRRING_RPM: f64 = 200.0;
pub const DEFAULT_AERATION_LPM: f64 = 0.5;
pub const DEFAULT_VOLUME_ML: f64 = 100.0;
pub const DEFAULT_INOCULUM_CELLS: f64 = 1e6;
pub const DEFAULT_INOCULUM_VOLUME_ML: f64 = 1.0;
pub const DEFAULT_HOURS_PER_TICK: f64 = 0.1;
pub const DEFAULT_GRID_SIDE: usize = 32;
pub const MAX_GRID_SIDE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VesselKind {
    Bioreactor,
    Plate,
}

impl VesselKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bioreactor" | "well_mixed" | "flask" => Some(Self::Bioreactor),
            "plate" | "petri" | "grid" => Some(Self::Plate),
            _ => None,
        }
    }
}

/// Everything needed to construct and inoculate a fresh vessel.
#[derive(Debug, Clone)]
pub struct ExperimentPlan {
    pub species: Arc<SpeciesProfile>,
    pub medium: MediumProfile,
    pub vessel: VesselKind,
    pub chemistry: Chemistry,
    pub controls: Controls,
    pub inoculum_cells: f64,
    pub inoculum_volume_ml: f64,
    pub hours_per_tick: f64,
    pub auto_ph: bool,
    pub auto_do: bool,
    pub grid_width: usize,
    pub grid_height: usize,
    /// Non-critical values that were replaced by their defaults.
    pub warnings: Vec<String>,
}

/// Collects violations and warnings while reading one settings map.
struct Reader<'a> {
    settings: &'a AppliedSettings,
    violations: Vec<String>,
    warnings: Vec<String>,
}

impl<'a> Reader<'a> {
    fn number(&mut self, key: &str, default: f64, valid: impl Fn(f64) -> bool) -> f64 {
        match self.settings.number(key) {
            None => default,
            Some(Some(v)) if v.is_finite() && valid(v) => v,
            Some(Some(v)) => {
                self.warnings
                    .push(format!("{} = {} is out of range, using {}", key, v, default));
                default
            }
            Some(None) => {
                self.warnings
                    .push(format!("{} is not a number, using {}", key, default));
                default
            }
        }
    }

    /// Like `number`, but a bad value blocks the start instead of falling back.
    fn strict_number(&mut self, key: &str, default: f64, valid: impl Fn(f64) -> bool) -> f64 {
        match self.settings.number(key) {
            None => default,
            Some(Some(v)) if v.is_finite() && valid(v) => v,
            Some(Some(v)) => {
                self.violations.push(format!("{} must be positive, got {}", key, v));
                default
            }
            Some(None) => {
                self.violations.push(format!("{} is not a number", key));
                default
            }
        }
    }

    fn flag(&mut self, key: &str, default: bool) -> bool {
        match self.settings.flag(key) {
            None => default,
            Some(Some(v)) => v,
            Some(None) => {
                self.warnings
                    .push(format!("{} is not a yes/no value, using {}", key, default));
                default
            }
        }
    }

    fn optional_number(&mut self, key: &str) -> Option<f64> {
        match self.settings.number(key) {
            Some(Some(v)) if v.is_finite() => Some(v),
            Some(_) => {
                self.warnings.push(format!("{} is not a number, ignored", key));
                None
            }
            None => None,
        }
    }

    fn grid_side(&mut self, key: &str) -> usize {
        let side = self.number(key, DEFAULT_GRID_SIDE as f64, |v| {
            (3.0..=MAX_GRID_SIDE as f64).contains(&v) && v.fract() == 0.0
        });
        side as usize
    }
}

impl ExperimentPlan {
    /// Validates `settings` against `knowledge`.
    ///
    /// # Errors
    ///
    /// Returns `CultureError::StartBlocked` listing every violation found, not just the
    /// first one.
    pub fn from_settings(
        settings: &AppliedSettings,
        knowledge: &KnowledgeBase,
    ) -> Result<Self, CultureError> {
        let mut r = Reader {
            settings,
            violations: Vec::new(),
            warnings: Vec::new(),
        };

        let custom_temperature = r.optional_number("custom_optimal_temperature");
        let custom_ph = r.optional_number("custom_optimal_ph");
        let species = match settings.text("species") {
            None => {
                r.violations.push("species is required".to_string());
                None
            }
            Some(name) => match knowledge.resolve(&name) {
                Ok(profile) => Some(profile),
                Err(e) => match (custom_temperature, custom_ph) {
                    (Some(t), Some(ph)) => {
                        r.warnings.push(format!(
                            "species '{}' is not in the knowledge base, using custom optima {} C / pH {}",
                            name, t, ph
                        ));
                        Some(Arc::new(SpeciesProfile::from_optima(&name, t, ph)))
                    }
                    _ => {
                        r.violations.push(e.to_string());
                        None
                    }
                },
            },
        };

        let medium = match settings.text("medium") {
            None => {
                r.violations.push("medium is required".to_string());
                None
            }
            Some(name) => match knowledge.resolve_medium(&name) {
                Ok(medium) => Some(medium.clone()),
                Err(e) => {
                    r.violations.push(e.to_string());
                    None
                }
            },
        };

        let vessel = match settings.text("vessel") {
            None => {
                r.violations.push("vessel is required".to_string());
                None
            }
            Some(raw) => {
                let kind = VesselKind::parse(&raw);
                if kind.is_none() {
                    r.violations.push(format!(
                        "vessel '{}' is not recognised (expected bioreactor or plate)",
                        raw
                    ));
                }
                kind
            }
        };

        let temperature_c = r.number("temperature_c", DEFAULT_TEMPERATURE_C, |v| (0.0..=100.0).contains(&v));
        let ph_setpoint = r.number("ph_setpoint", DEFAULT_PH_SETPOINT, |v| (0.0..=14.0).contains(&v));
        let do_setpoint = r.number("do_setpoint", DEFAULT_DO_SETPOINT, |v| (0.0..=500.0).contains(&v));
        let stirring_rpm = r.number("stirring_rpm", DEFAULT_STIRRING_RPM, |v| v >= 0.0);
        let aeration_lpm = r.number("aeration_lpm", DEFAULT_AERATION_LPM, |v| v >= 0.0);
        let inoculum_cells = r.number("inoculum_cells", DEFAULT_INOCULUM_CELLS, |v| v >= 0.0);
        let hours_per_tick = r.number("hours_per_tick", DEFAULT_HOURS_PER_TICK, |v| v > 0.0);
        let auto_ph = r.flag("auto_ph", false);
        let auto_do = r.flag("auto_do", false);
        let grid_width = r.grid_side("grid_width");
        let grid_height = r.grid_side("grid_height");

        let volume_ml = r.strict_number("volume_ml", DEFAULT_VOLUME_ML, |v| v > 0.0);
        let inoculum_volume_ml =
            r.strict_number("inoculum_volume_ml", DEFAULT_INOCULUM_VOLUME_ML, |v| v > 0.0);

        let defaults = GasMix::default();
        let requested = GasMix {
            o2: r.number("gas_o2", defaults.o2, |v| v >= 0.0),
            co2: r.number("gas_co2", defaults.co2, |v| v >= 0.0),
            n2: r.number("gas_n2", defaults.n2, |v| v >= 0.0),
        };
        let inlet_gas = match requested.normalized(GAS_MIX_TOLERANCE) {
            Some(mix) => mix,
            None => {
                r.violations.push(format!(
                    "gas fractions must sum to 100 (±{}), got {:.3}",
                    GAS_MIX_TOLERANCE,
                    requested.total()
                ));
                defaults
            }
        };

        let (medium_glucose, medium_osmolality) = medium
            .as_ref()
            .map_or((0.0, 300.0), |m| (m.glucose.value, m.osmolality.value));
        let glucose = r.number("glucose", medium_glucose, |v| v >= 0.0);
        let osmolality = r.number("osmolality", medium_osmolality, |v| v >= 0.0);

        let (species, medium, vessel) = match (species, medium, vessel) {
            (Some(s), Some(m), Some(v)) if r.violations.is_empty() => (s, m, v),
            _ => return Err(CultureError::StartBlocked(r.violations)),
        };

        for warning in &r.warnings {
            tracing::warn!(setting_warning = %warning, "setting replaced by its default");
        }

        let chemistry = Chemistry {
            temperature_c,
            ph: ph_setpoint,
            ph_setpoint,
            co2_fraction: inlet_gas.co2 / 100.0,
            inlet_o2_fraction: inlet_gas.o2 / 100.0,
            osmolality,
            volume_ml,
            bicarbonate_mm: medium.bicarbonate.value,
            aeration_lpm,
            stirring_rpm,
            concentrations: Concentrations {
                glucose,
                oxygen: 1.0,
                growth_factors: medium.growth_factors,
                ..Concentrations::default()
            },
        };
        let controls = Controls {
            stirring_rpm,
            aeration_lpm,
            inlet_gas,
            temperature_c,
            ph_setpoint,
            do_setpoint,
        };

        Ok(Self {
            species,
            medium,
            vessel,
            chemistry,
            controls,
            inoculum_cells,
            inoculum_volume_ml,
            hours_per_tick,
            auto_ph,
            auto_do,
            grid_width,
            grid_height,
            warnings: r.warnings,
        })
    }
}
