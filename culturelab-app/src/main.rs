use anyhow::{Context, Result};
use clap::Parser;
use culturelab_core::KnowledgeBase;
use std::fs;
use std::path::{Path, PathBuf};

mod config;
mod plotting;
mod workflow;

/// Runs a virtual cell-culture experiment from a settings file.
#[derive(Debug, Parser)]
#[command(name = "culturelab", version, about)]
struct Args {
    /// Knowledge-base directory holding `species/` and `media/` YAML files
    #[arg(long, default_value = "./data/knowledge_base")]
    kb: String,

    /// Applied settings (YAML)
    #[arg(long, short)]
    settings: PathBuf,

    /// Runtime commands to replay at given ticks (YAML)
    #[arg(long)]
    commands: Option<PathBuf>,

    /// Number of ticks to run
    #[arg(long, default_value_t = 240)]
    ticks: u64,

    /// Wall-clock pause between ticks, in milliseconds
    #[arg(long, default_value_t = 0)]
    pace_ms: u64,

    /// Parent directory for run outputs
    #[arg(long, default_value = "./data/runs")]
    output_dir: String,

    /// Skip PNG chart generation
    #[arg(long)]
    no_plots: bool,

    /// Log filter, e.g. `info` or `culturelab_core=debug`
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(args.log_level.as_str())
        .with_target(false)
        .init();

    println!("--- CultureLab ---");

    let kb = KnowledgeBase::load(&args.kb)
        .with_context(|| format!("Failed to load knowledge base from '{}'", args.kb))?;
    println!("Known species: {}", kb.species_ids().join(", "));

    let settings = config::load_settings(&args.settings)?;
    let schedule = match &args.commands {
        Some(path) => config::load_command_schedule(path)?,
        None => Vec::new(),
    };

    let output_dir = format!(
        "{}/run_{}",
        args.output_dir,
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    );
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir))?;

    // Keep the inputs next to the outputs for traceability
    fs::copy(&args.settings, Path::new(&output_dir).join("settings.yaml"))
        .context("Failed to copy settings file")?;
    if let Some(path) = &args.commands {
        fs::copy(path, Path::new(&output_dir).join("commands.yaml"))
            .context("Failed to copy command file")?;
    }

    let options = workflow::RunOptions {
        ticks: args.ticks,
        pace_ms: args.pace_ms,
        output_dir: output_dir.clone(),
        plots: !args.no_plots,
    };
    workflow::run_experiment(settings, kb, &schedule, &options)?;

    println!("\nExperiment complete. Results are in '{}'", output_dir);

    Ok(())
}
