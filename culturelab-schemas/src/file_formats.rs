use crate::{
    command::ScheduledCommand,
    environment::MediumProfile,
    species::SpeciesProfile,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SpeciesFile {
    pub schema_version: String,
    pub species: Vec<SpeciesProfile>,
}

#[derive(Debug, Deserialize)]
pub struct MediumFile {
    pub schema_version: String,
    pub media: Vec<MediumProfile>,
}

#[derive(Debug, Deserialize)]
pub struct CommandFile {
    pub schema_version: String,
    pub commands: Vec<ScheduledCommand>,
}
