//! Simulation and closed-loop control of virtual cell-culture vessels.

pub mod control;
pub mod environment;
pub mod error;
pub mod experiment;
pub mod knowledge;
pub mod logger;
pub mod population;
pub mod settings;
pub mod vessel;

pub use error::CultureError;
pub use experiment::{Experiment, ExperimentBuilder, ExperimentSummary};
pub use knowledge::KnowledgeBase;
pub use vessel::Vessel;
