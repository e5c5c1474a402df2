use crate::environment::{Compound, GasMix};
use serde::{Deserialize, Serialize};

/// Commands an operator may issue at any point during a run.
///
/// Setpoint-style commands are staged for the next tick; additions are applied at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeCommand {
    SetParameter {
        key: String,
        value: serde_json::Value,
    },
    SetGasMix {
        fractions: GasMix,
    },
    AddGlucose {
        amount_mg: f64,
    },
    AddBiomass {
        cell_delta: f64,
    },
    AddCompound {
        compound: Compound,
        amount_mg: f64,
        /// Grid cell for plate experiments; ignored by well-mixed vessels.
        #[serde(default)]
        at: Option<(usize, usize)>,
    },
    SetAutomatic {
        controller: ControllerKind,
        enabled: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    PhCo2,
    DoAeration,
}

/// A runtime command scheduled to fire at a given tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledCommand {
    pub at_tick: u64,
    pub command: RuntimeCommand,
}
