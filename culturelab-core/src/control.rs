//! Closed-loop regulation of pH (by CO2 dosing) and dissolved oxygen (by aeration).
//!
//! Each loop is a discrete-time PI controller in incremental form: the output is a
//! change to the current actuator value, bounded per tick, and the actuator itself is
//! bounded to its physical range.

use crate::{error::ControllerFault, vessel::Vessel};

/// Bounds on the time between evaluations, in wall-clock seconds.
pub const MIN_DT_S: f64 = 0.2;
pub const MAX_DT_S: f64 = 5.0;
/// Interval assumed for the first evaluation after (re-)enabling.
pub const NOMINAL_DT_S: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PiGains {
    pub kp: f64,
    pub ki: f64,
    /// Anti-windup band: the integral is held within `±integral_limit`.
    pub integral_limit: f64,
    /// Largest actuator change per evaluation.
    pub slew_limit: f64,
    pub output_min: f64,
    pub output_max: f64,
}

impl PiGains {
    /// CO2 percent per pH unit, for the pH loop.
    pub fn ph_co2() -> Self {
        Self {
            kp: 2.0,
            ki: 0.002,
            integral_limit: 25.0,
            slew_limit: 0.5,
            output_min: 0.0,
            output_max: 20.0,
        }
    }

    /// Litres per minute per percent DO, for the oxygen loop.
    pub fn do_aeration() -> Self {
        Self {
            kp: 0.01,
            ki: 0.0005,
            integral_limit: 200.0,
            slew_limit: 0.05,
            output_min: 0.0,
            output_max: 5.0,
        }
    }
}

/// Which way round the error is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSense {
    /// `setpoint - measured`: raise the actuator when the value is low.
    Direct,
    /// `measured - setpoint`: raise the actuator when the value is high.
    Reverse,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerState {
    pub setpoint: Option<f64>,
    pub integral: f64,
    pub last_error: f64,
    pub last_tick_s: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PiLoop {
    gains: PiGains,
    sense: ErrorSense,
    state: ControllerState,
    automatic: bool,
    faults: u64,
}

impl PiLoop {
    pub fn new(gains: PiGains, sense: ErrorSense, setpoint: f64) -> Self {
        Self {
            gains,
            sense,
            state: ControllerState {
                setpoint: Some(setpoint),
                ..ControllerState::default()
            },
            automatic: false,
            faults: 0,
        }
    }

    pub fn gains(&self) -> &PiGains {
        &self.gains
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn is_automatic(&self) -> bool {
        self.automatic
    }

    pub fn fault_count(&self) -> u64 {
        self.faults
    }

    /// Switches automatic mode. Entering it starts from a clean integral.
    pub fn set_automatic(&mut self, enabled: bool) {
        if enabled && !self.automatic {
            self.reset();
        }
        self.automatic = enabled;
    }

    pub fn reset(&mut self) {
        self.state.integral = 0.0;
        self.state.last_error = 0.0;
        self.state.last_tick_s = None;
    }

    /// Forgets the last evaluation time so a pause is not read as elapsed control time.
    pub fn rearm(&mut self) {
        self.state.last_tick_s = None;
    }

    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.state.setpoint = Some(setpoint);
    }

    /// Accepts a setpoint as entered by the operator. Unparseable text leaves the loop
    /// without a setpoint, so it sits out ticks until a valid one arrives.
    pub fn set_setpoint_text(&mut self, raw: &str) -> Option<f64> {
        self.state.setpoint = raw.trim().parse::<f64>().ok().filter(|v| v.is_finite());
        self.state.setpoint
    }

    /// One PI evaluation. Returns the new actuator value, or `None` in manual mode.
    pub fn evaluate(
        &mut self,
        measured: Option<f64>,
        actuator: f64,
        now_s: f64,
    ) -> Result<Option<f64>, ControllerFault> {
        if !self.automatic {
            return Ok(None);
        }
        let setpoint = self
            .state
            .setpoint
            .filter(|v| v.is_finite())
            .ok_or(ControllerFault::InvalidSetpoint)?;
        let measured = measured
            .filter(|v| v.is_finite())
            .ok_or(ControllerFault::MissingMeasurement)?;

        let dt = match self.state.last_tick_s {
            Some(last) => (now_s - last).clamp(MIN_DT_S, MAX_DT_S),
            None => NOMINAL_DT_S,
        };
        self.state.last_tick_s = Some(now_s);

        let error = match self.sense {
            ErrorSense::Direct => setpoint - measured,
            ErrorSense::Reverse => measured - setpoint,
        };
        let g = &self.gains;
        self.state.integral =
            (self.state.integral + error * dt).clamp(-g.integral_limit, g.integral_limit);
        self.state.last_error = error;

        let delta = (g.kp * error + g.ki * self.state.integral).clamp(-g.slew_limit, g.slew_limit);
        let base = if actuator.is_finite() { actuator } else { g.output_min };
        Ok(Some((base + delta).clamp(g.output_min, g.output_max)))
    }
}

/// A PI loop bound to one vessel measurement and one vessel actuator.
pub trait VesselController {
    fn name(&self) -> &'static str;

    fn pi(&self) -> &PiLoop;

    fn pi_mut(&mut self) -> &mut PiLoop;

    /// The regulated variable as currently measured.
    fn measure(&self, vessel: &Vessel) -> Option<f64>;

    /// The actuator value that will be in force next tick.
    fn actuator(&self, vessel: &Vessel) -> f64;

    /// Stages a new actuator value on the vessel for the next tick.
    fn actuate(&self, vessel: &mut Vessel, value: f64) -> Result<(), crate::error::CultureError>;

    /// Evaluates the loop once. Faults skip this tick only and are logged, never raised.
    fn tick(&mut self, vessel: &mut Vessel, now_s: f64) -> Option<f64> {
        let measured = self.measure(vessel);
        let actuator = self.actuator(vessel);
        let name = self.name();
        match self.pi_mut().evaluate(measured, actuator, now_s) {
            Ok(Some(value)) => match self.actuate(vessel, value) {
                Ok(()) => Some(value),
                Err(e) => {
                    self.pi_mut().faults += 1;
                    tracing::warn!(controller = name, error = %e, "actuator write rejected");
                    None
                }
            },
            Ok(None) => None,
            Err(fault) => {
                self.pi_mut().faults += 1;
                tracing::warn!(controller = name, fault = %fault, "controller skipped this tick");
                None
            }
        }
    }
}

/// Holds pH at its setpoint by adjusting the CO2 fraction of the inlet gas.
#[derive(Debug, Clone, PartialEq)]
pub struct PhCo2Controller {
    pi: PiLoop,
}

impl PhCo2Controller {
    pub fn new(setpoint: f64) -> Self {
        Self {
            pi: PiLoop::new(PiGains::ph_co2(), ErrorSense::Reverse, setpoint),
        }
    }
}

impl VesselController for PhCo2Controller {
    fn name(&self) -> &'static str {
        "ph_co2"
    }

    fn pi(&self) -> &PiLoop {
        &self.pi
    }

    fn pi_mut(&mut self) -> &mut PiLoop {
        &mut self.pi
    }

    fn measure(&self, vessel: &Vessel) -> Option<f64> {
        Some(vessel.environment().ph())
    }

    fn actuator(&self, vessel: &Vessel) -> f64 {
        vessel.effective_controls().inlet_gas.co2
    }

    fn actuate(&self, vessel: &mut Vessel, value: f64) -> Result<(), crate::error::CultureError> {
        let mix = vessel.effective_controls().inlet_gas.with_co2(value);
        vessel.apply_runtime_gas_mix(mix)
    }
}

/// Holds dissolved oxygen at its setpoint by adjusting the aeration rate.
#[derive(Debug, Clone, PartialEq)]
pub struct DoAerationController {
    pi: PiLoop,
}

impl DoAerationController {
    pub fn new(setpoint_percent: f64) -> Self {
        Self {
            pi: PiLoop::new(PiGains::do_aeration(), ErrorSense::Direct, setpoint_percent),
        }
    }
}

impl VesselController for DoAerationController {
    fn name(&self) -> &'static str {
        "do_aeration"
    }

    fn pi(&self) -> &PiLoop {
        &self.pi
    }

    fn pi_mut(&mut self) -> &mut PiLoop {
        &mut self.pi
    }

    fn measure(&self, vessel: &Vessel) -> Option<f64> {
        Some(vessel.environment().oxygen() * 100.0)
    }

    fn actuator(&self, vessel: &Vessel) -> f64 {
        vessel.effective_controls().aeration_lpm
    }

    fn actuate(&self, vessel: &mut Vessel, value: f64) -> Result<(), crate::error::CultureError> {
        vessel.set_controls(None, Some(value), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ph_loop() -> PiLoop {
        let mut pi = PiLoop::new(PiGains::ph_co2(), ErrorSense::Reverse, 7.0);
        pi.set_automatic(true);
        pi
    }

    #[test]
    fn manual_mode_does_nothing() {
        let mut pi = PiLoop::new(PiGains::ph_co2(), ErrorSense::Reverse, 7.0);
        assert_eq!(pi.evaluate(Some(8.0), 5.0, 0.0), Ok(None));
    }

    #[test]
    fn high_ph_raises_co2_within_slew_limit() {
        let mut pi = ph_loop();
        let out = pi.evaluate(Some(8.0), 5.0, 0.0).unwrap().unwrap();
        assert_eq!(out, 5.5);
    }

    #[test]
    fn small_error_moves_proportionally() {
        let mut pi = ph_loop();
        let out = pi.evaluate(Some(7.1), 5.0, 0.0).unwrap().unwrap();
        let expected = 5.0 + 2.0 * 0.1 + 0.002 * 0.1 * NOMINAL_DT_S;
        assert!((out - expected).abs() < 1e-12);
    }

    #[test]
    fn elapsed_time_is_clamped() {
        let mut pi = ph_loop();
        pi.evaluate(Some(7.1), 5.0, 0.0).unwrap();
        pi.evaluate(Some(7.1), 5.0, 1000.0).unwrap();
        let expected = 0.1 * NOMINAL_DT_S + 0.1 * MAX_DT_S;
        assert!((pi.state().integral - expected).abs() < 1e-12);
    }

    #[test]
    fn integral_stays_in_its_band() {
        let mut pi = ph_loop();
        let mut co2 = 0.0;
        for t in 0..10_000 {
            co2 = pi.evaluate(Some(9.0), co2, t as f64).unwrap().unwrap();
        }
        assert_eq!(pi.state().integral, 25.0);
        assert_eq!(co2, 20.0);
    }

    #[test]
    fn bad_inputs_fault_without_touching_state() {
        let mut pi = ph_loop();
        assert_eq!(pi.evaluate(None, 5.0, 0.0), Err(ControllerFault::MissingMeasurement));
        assert_eq!(pi.set_setpoint_text("seven"), None);
        assert_eq!(pi.evaluate(Some(7.5), 5.0, 1.0), Err(ControllerFault::InvalidSetpoint));
        assert_eq!(pi.state().integral, 0.0);
        assert_eq!(pi.set_setpoint_text(" 7.0 "), Some(7.0));
        assert!(pi.evaluate(Some(7.5), 5.0, 2.0).unwrap().is_some());
    }

    #[test]
    fn re_enabling_clears_the_integral() {
        let mut pi = ph_loop();
        pi.evaluate(Some(8.0), 5.0, 0.0).unwrap();
        assert!(pi.state().integral > 0.0);
        pi.set_automatic(false);
        assert!(pi.state().integral > 0.0);
        pi.set_automatic(true);
        assert_eq!(pi.state().integral, 0.0);
        assert_eq!(pi.state().last_tick_s, None);
    }
}
