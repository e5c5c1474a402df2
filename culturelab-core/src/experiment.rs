use crate::{
    control::{DoAerationController, PhCo2Controller, PiLoop, VesselController},
    environment::EnvironmentState,
    error::CultureError,
    knowledge::KnowledgeBase,
    logger::TimeSeriesLogger,
    settings::{ExperimentPlan, VesselKind},
    vessel::Vessel,
};
use culturelab_schemas::{
    command::{ControllerKind, RuntimeCommand},
    settings::AppliedSettings,
    snapshot::CultureSnapshot,
};
use serde_json::Value;

/// A fluent builder for starting an `Experiment`.
///
/// Every start validates the currently applied settings and constructs a fresh
/// vessel and fresh controllers; nothing from an earlier run is carried over.
#[derive(Default)]
pub struct ExperimentBuilder {
    settings: Option<AppliedSettings>,
    knowledge: Option<KnowledgeBase>,
    vessel_id: Option<String>,
    log_path: Option<String>,
}

impl ExperimentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the applied settings the experiment starts from.
    pub fn with_settings(mut self, settings: AppliedSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Sets the reference data used to resolve species and media.
    pub fn with_knowledge_base(mut self, knowledge: KnowledgeBase) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn with_vessel_id(mut self, id: &str) -> Self {
        self.vessel_id = Some(id.to_string());
        self
    }

    /// Configures the experiment to write one CSV row per tick to the given file.
    pub fn with_timeseries_logging_to_file(mut self, path: &str) -> Self {
        self.log_path = Some(path.to_string());
        self
    }

    /// Consumes the builder and returns a running `Experiment`.
    ///
    /// # Errors
    ///
    /// Returns `CultureError::StartBlocked` when the settings have violations, or an
    /// I/O error when the time-series file cannot be created.
    pub fn build(self) -> Result<Experiment, CultureError> {
        let settings = self.settings.unwrap_or_default();
        let knowledge = self.knowledge.unwrap_or_default();
        let plan = ExperimentPlan::from_settings(&settings, &knowledge)?;

        let environment = match plan.vessel {
            VesselKind::Bioreactor => EnvironmentState::well_mixed(&plan.chemistry)?,
            VesselKind::Plate => {
                EnvironmentState::plate(&plan.chemistry, plan.grid_width, plan.grid_height)?
            }
        };
        let vessel_id = self.vessel_id.unwrap_or_else(|| "vessel-1".to_string());
        let mut vessel = Vessel::new(&vessel_id, environment, plan.controls.clone());
        vessel.inoculate(
            plan.species.clone(),
            plan.inoculum_cells,
            plan.inoculum_volume_ml,
        )?;

        let mut ph = PhCo2Controller::new(plan.controls.ph_setpoint);
        ph.pi_mut().set_automatic(plan.auto_ph);
        let mut dissolved_oxygen = DoAerationController::new(plan.controls.do_setpoint);
        dissolved_oxygen.pi_mut().set_automatic(plan.auto_do);

        let mut logger = match self.log_path {
            Some(path) => Some(TimeSeriesLogger::new(&path)?),
            None => None,
        };
        if let Some(logger) = &mut logger {
            logger.log_snapshot(vessel.latest_snapshot())?;
        }

        tracing::info!(
            vessel = %vessel_id,
            species = %plan.species.species_id,
            medium = %plan.medium.medium_id,
            kind = ?plan.vessel,
            hours_per_tick = plan.hours_per_tick,
            auto_ph = plan.auto_ph,
            auto_do = plan.auto_do,
            "experiment started"
        );

        Ok(Experiment {
            vessel,
            ph,
            dissolved_oxygen,
            hours_per_tick: plan.hours_per_tick,
            paused: false,
            logger,
            warnings: plan.warnings,
        })
    }
}

/// A running experiment: one vessel and its two control loops, advanced by an
/// external scheduler one tick at a time.
pub struct Experiment {
    vessel: Vessel,
    ph: PhCo2Controller,
    dissolved_oxygen: DoAerationController,
    hours_per_tick: f64,
    paused: bool,
    logger: Option<TimeSeriesLogger>,
    warnings: Vec<String>,
}

/// Final counters of a stopped experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentSummary {
    pub vessel_id: String,
    pub ticks: u64,
    pub elapsed_h: f64,
    pub final_snapshot: CultureSnapshot,
    pub clamp_events: u64,
    pub skipped_updates: u64,
    pub ph_faults: u64,
    pub do_faults: u64,
    pub rows_logged: u64,
}

impl Experiment {
    /// Advances one tick at wall-clock time `now_s`: the vessel steps first, then each
    /// controller reads the result and stages its actuator for the next tick.
    ///
    /// Returns `None` while paused.
    pub fn tick(&mut self, now_s: f64) -> Result<Option<&CultureSnapshot>, CultureError> {
        if self.paused {
            return Ok(None);
        }
        self.vessel.step(self.hours_per_tick);
        self.ph.tick(&mut self.vessel, now_s);
        self.dissolved_oxygen.tick(&mut self.vessel, now_s);

        if let Some(logger) = &mut self.logger {
            logger.log_snapshot(self.vessel.latest_snapshot())?;
        }
        Ok(Some(self.vessel.latest_snapshot()))
    }

    pub fn pause(&mut self) {
        if !self.paused {
            tracing::info!(vessel = %self.vessel.id(), tick = self.vessel.tick(), "paused");
        }
        self.paused = true;
    }

    /// Resumes ticking. Time spent paused is never simulated after the fact.
    pub fn resume(&mut self) {
        if self.paused {
            self.ph.pi_mut().rearm();
            self.dissolved_oxygen.pi_mut().rearm();
            tracing::info!(vessel = %self.vessel.id(), tick = self.vessel.tick(), "resumed");
        }
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Ends the run and discards all runtime state.
    pub fn stop(self) -> ExperimentSummary {
        let summary = ExperimentSummary {
            vessel_id: self.vessel.id().to_string(),
            ticks: self.vessel.tick(),
            elapsed_h: self.vessel.elapsed_h(),
            final_snapshot: self.vessel.latest_snapshot().clone(),
            clamp_events: self.vessel.clamp_events(),
            skipped_updates: self.vessel.skipped_updates(),
            ph_faults: self.ph.pi().fault_count(),
            do_faults: self.dissolved_oxygen.pi().fault_count(),
            rows_logged: self.logger.as_ref().map_or(0, TimeSeriesLogger::rows),
        };
        tracing::info!(
            vessel = %summary.vessel_id,
            ticks = summary.ticks,
            biomass = summary.final_snapshot.biomass,
            "experiment stopped"
        );
        summary
    }

    /// Dispatches an operator command.
    ///
    /// Setpoint-style commands take effect at the start of the next tick; additions
    /// take effect at once.
    pub fn apply(&mut self, command: RuntimeCommand) -> Result<(), CultureError> {
        tracing::debug!(vessel = %self.vessel.id(), ?command, "runtime command");
        match command {
            RuntimeCommand::SetParameter { key, value } => self.set_parameter(&key, &value),
            RuntimeCommand::SetGasMix { fractions } => self.vessel.apply_runtime_gas_mix(fractions),
            RuntimeCommand::AddGlucose { amount_mg } => {
                self.vessel.add_glucose_mg(amount_mg).map(|_| ())
            }
            RuntimeCommand::AddBiomass { cell_delta } => self.vessel.add_biomass(cell_delta),
            RuntimeCommand::AddCompound { compound, amount_mg, at } => {
                self.vessel.add_compound(compound, amount_mg, at).map(|_| ())
            }
            RuntimeCommand::SetAutomatic { controller, enabled } => {
                self.controller_mut(controller).set_automatic(enabled);
                Ok(())
            }
        }
    }

    fn set_parameter(&mut self, key: &str, value: &Value) -> Result<(), CultureError> {
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|v| v.is_finite());

        // Setpoints feed the loops directly; a loop without a usable setpoint sits out
        // ticks until a valid one arrives.
        let loop_kind = match key {
            "ph_setpoint" => Some(ControllerKind::PhCo2),
            "do_setpoint" => Some(ControllerKind::DoAeration),
            _ => None,
        };
        if let Some(kind) = loop_kind {
            let raw = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let Some(setpoint) = self.controller_mut(kind).set_setpoint_text(&raw) else {
                tracing::warn!(key, value = %raw, "setpoint is not a number; loop suspended");
                return Ok(());
            };
            // DO is a saturation percentage and cannot go below zero.
            let setpoint = match kind {
                ControllerKind::DoAeration => setpoint.max(0.0),
                ControllerKind::PhCo2 => setpoint,
            };
            self.controller_mut(kind).set_setpoint(setpoint);
            return self.vessel.apply_runtime_parameter(key, setpoint);
        }

        match number {
            Some(v) => self.vessel.apply_runtime_parameter(key, v),
            None => Err(CultureError::InvalidSetting {
                key: key.to_string(),
                reason: format!("{} is not a number", value),
            }),
        }
    }

    fn controller_mut(&mut self, kind: ControllerKind) -> &mut PiLoop {
        match kind {
            ControllerKind::PhCo2 => self.ph.pi_mut(),
            ControllerKind::DoAeration => self.dissolved_oxygen.pi_mut(),
        }
    }

    pub fn controller(&self, kind: ControllerKind) -> &PiLoop {
        match kind {
            ControllerKind::PhCo2 => self.ph.pi(),
            ControllerKind::DoAeration => self.dissolved_oxygen.pi(),
        }
    }

    pub fn vessel(&self) -> &Vessel {
        &self.vessel
    }

    pub fn hours_per_tick(&self) -> f64 {
        self.hours_per_tick
    }

    /// Settings that were replaced by their defaults at start.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// The snapshot of the latest completed tick.
    pub fn latest_snapshot(&self) -> &CultureSnapshot {
        self.vessel.latest_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use culturelab_schemas::{
        environment::{GasMix, MediumProfile, Measurement},
        species::SpeciesProfile,
    };

    fn kb() -> KnowledgeBase {
        let mut kb = KnowledgeBase::new();
        kb.insert_species(SpeciesProfile::from_optima("HEK293", 37.0, 7.2))
            .unwrap();
        kb.insert_medium(MediumProfile {
            medium_id: "DMEM".into(),
            medium_name: "DMEM".into(),
            glucose: Measurement { value: 4500.0, unit: "mg/L".into() },
            osmolality: Measurement { value: 330.0, unit: "mOsm/kg".into() },
            bicarbonate: Measurement { value: 44.0, unit: "mM".into() },
            growth_factors: 1.0,
        });
        kb
    }

    fn start(settings: AppliedSettings) -> Experiment {
        ExperimentBuilder::new()
            .with_settings(settings)
            .with_knowledge_base(kb())
            .build()
            .unwrap()
    }

    fn settings() -> AppliedSettings {
        AppliedSettings::new()
            .with("species", "HEK293")
            .with("medium", "DMEM")
            .with("vessel", "bioreactor")
    }

    #[test]
    fn blocked_start_lists_violations() {
        let err = ExperimentBuilder::new().with_knowledge_base(kb()).build().err().unwrap();
        assert!(matches!(err, CultureError::StartBlocked(v) if v.len() == 3));
    }

    #[test]
    fn paused_experiment_does_not_advance() {
        let mut exp = start(settings());
        exp.tick(0.0).unwrap();
        exp.pause();
        assert!(exp.tick(1.0).unwrap().is_none());
        assert_eq!(exp.vessel().tick(), 1);
        exp.resume();
        exp.tick(3600.0).unwrap();
        assert_eq!(exp.vessel().tick(), 2);
    }

    #[test]
    fn resume_does_not_feed_pause_time_to_the_loops() {
        let mut exp = start(settings().with("auto_ph", true));
        exp.tick(0.0).unwrap();
        let first_error = exp.controller(ControllerKind::PhCo2).state().last_error;
        exp.pause();
        exp.resume();
        exp.tick(10_000.0).unwrap();
        let state = exp.controller(ControllerKind::PhCo2).state();
        assert_eq!(state.last_tick_s, Some(10_000.0));
        // Both evaluations used the nominal interval, not the paused gap.
        let expected = (first_error + state.last_error) * crate::control::NOMINAL_DT_S;
        assert!((state.integral - expected).abs() < 1e-12);
    }

    #[test]
    fn setpoint_commands_reach_both_vessel_and_loop() {
        let mut exp = start(settings());
        exp.apply(RuntimeCommand::SetParameter {
            key: "ph_setpoint".into(),
            value: Value::from(6.9),
        })
        .unwrap();
        assert_eq!(exp.controller(ControllerKind::PhCo2).state().setpoint, Some(6.9));
        assert_eq!(exp.vessel().effective_controls().ph_setpoint, 6.9);
        assert_eq!(exp.vessel().controls().ph_setpoint, 7.2);
    }

    #[test]
    fn negative_do_setpoint_is_clamped_for_loop_and_vessel() {
        let mut exp = start(settings());
        exp.apply(RuntimeCommand::SetParameter {
            key: "do_setpoint".into(),
            value: Value::from(-10.0),
        })
        .unwrap();
        assert_eq!(exp.controller(ControllerKind::DoAeration).state().setpoint, Some(0.0));
        assert_eq!(exp.vessel().effective_controls().do_setpoint, 0.0);
        exp.tick(0.0).unwrap();
        assert_eq!(exp.latest_snapshot().do_setpoint, 0.0);
    }

    #[test]
    fn non_numeric_setpoint_suspends_the_loop() {
        let mut exp = start(settings().with("auto_ph", true));
        exp.apply(RuntimeCommand::SetParameter {
            key: "ph_setpoint".into(),
            value: Value::from("abc"),
        })
        .unwrap();
        exp.tick(0.0).unwrap();
        exp.tick(1.0).unwrap();
        assert_eq!(exp.controller(ControllerKind::PhCo2).fault_count(), 2);
        assert_eq!(exp.vessel().tick(), 2);
    }

    #[test]
    fn commands_are_dispatched() {
        let mut exp = start(settings());
        let before = exp.latest_snapshot().glucose;
        exp.apply(RuntimeCommand::AddGlucose { amount_mg: 10.0 }).unwrap();
        assert!(exp.latest_snapshot().glucose > before);

        let bad = exp.apply(RuntimeCommand::SetGasMix {
            fractions: GasMix { o2: 90.0, co2: 5.0, n2: 74.0 },
        });
        assert!(matches!(bad, Err(CultureError::InvalidGasMix { .. })));

        exp.apply(RuntimeCommand::SetAutomatic {
            controller: ControllerKind::DoAeration,
            enabled: true,
        })
        .unwrap();
        assert!(exp.controller(ControllerKind::DoAeration).is_automatic());
    }

    #[test]
    fn stop_reports_counters() {
        let mut exp = start(settings());
        for t in 0..5 {
            exp.tick(t as f64).unwrap();
        }
        let summary = exp.stop();
        assert_eq!(summary.ticks, 5);
        assert!((summary.elapsed_h - 0.5).abs() < 1e-12);
        assert!(summary.final_snapshot.biomass > 1e6);
    }
}
