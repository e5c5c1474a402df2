use anyhow::{Context, Result};
use culturelab_schemas::{
    command::ScheduledCommand, file_formats::CommandFile, settings::AppliedSettings,
};
use serde::Deserialize;
use std::{fs, path::Path};

/// On-disk form of the applied settings.
#[derive(Debug, Deserialize)]
struct SettingsFile {
    #[allow(dead_code)]
    schema_version: String,
    settings: AppliedSettings,
}

/// Loads the flat settings map from a YAML file.
pub fn load_settings(path: &Path) -> Result<AppliedSettings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {:?}", path))?;
    let file: SettingsFile = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse YAML from {:?}", path))?;
    tracing::info!(path = %path.display(), keys = file.settings.values.len(), "settings loaded");
    Ok(file.settings)
}

/// Loads a schedule of runtime commands, ordered by the tick they fire on.
pub fn load_command_schedule(path: &Path) -> Result<Vec<ScheduledCommand>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read command file: {:?}", path))?;
    let file: CommandFile = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse YAML from {:?}", path))?;
    let mut commands = file.commands;
    commands.sort_by_key(|c| c.at_tick);
    tracing::info!(path = %path.display(), commands = commands.len(), "command schedule loaded");
    Ok(commands)
}
