use crate::plotting;
use anyhow::{Context, Result};
use culturelab_core::{ExperimentBuilder, ExperimentSummary, KnowledgeBase};
use culturelab_schemas::{command::ScheduledCommand, settings::AppliedSettings};
use serde::Serialize;
use std::{
    fs,
    path::Path,
    thread,
    time::{Duration, Instant},
};

/// How a run is paced and where its outputs go.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub ticks: u64,
    pub pace_ms: u64,
    pub output_dir: String,
    pub plots: bool,
}

#[derive(Debug, Serialize)]
struct SummaryReport<'a> {
    vessel_id: &'a str,
    ticks: u64,
    elapsed_h: f64,
    final_biomass: f64,
    final_viability_percent: f64,
    final_ph: f64,
    final_do_percent: f64,
    final_glucose: f64,
    clamp_events: u64,
    skipped_updates: u64,
    ph_faults: u64,
    do_faults: u64,
    warnings: &'a [String],
}

/// Runs one experiment to completion, replaying scheduled commands on their ticks.
///
/// Ticks are paced, never caught up: a slow tick simply delays the next one.
pub fn run_experiment(
    settings: AppliedSettings,
    kb: KnowledgeBase,
    schedule: &[ScheduledCommand],
    options: &RunOptions,
) -> Result<ExperimentSummary> {
    println!("\n--- [Workflow] Starting Experiment ---");

    let log_path = Path::new(&options.output_dir).join("timeseries.csv");
    let log_path = log_path
        .to_str()
        .context("Output path is not valid UTF-8")?
        .to_string();

    let mut experiment = ExperimentBuilder::new()
        .with_settings(settings)
        .with_knowledge_base(kb)
        .with_timeseries_logging_to_file(&log_path)
        .build()?;

    for warning in experiment.warnings() {
        println!("  ! {}", warning);
    }

    let clock = Instant::now();
    let pace = Duration::from_millis(options.pace_ms);
    let mut pending = schedule.iter().peekable();

    for _ in 0..options.ticks {
        let tick = experiment.vessel().tick();
        while let Some(scheduled) = pending.next_if(|c| c.at_tick <= tick) {
            if let Err(e) = experiment.apply(scheduled.command.clone()) {
                tracing::warn!(tick, error = %e, "scheduled command rejected");
                println!("  ! tick {}: command rejected: {}", tick, e);
            }
        }

        let now_s = clock.elapsed().as_secs_f64();
        if let Some(snapshot) = experiment.tick(now_s)? {
            if snapshot.tick % 10 == 0 {
                println!(
                    "  t={:>6.2} h | cells {:>10.3e} | viab {:>5.1}% | pH {:>5.2} | DO {:>5.1}% | glc {:>8.1}",
                    snapshot.elapsed_h,
                    snapshot.biomass,
                    snapshot.viability_percent,
                    snapshot.ph,
                    snapshot.do_percent,
                    snapshot.glucose,
                );
            }
        }
        if !pace.is_zero() {
            thread::sleep(pace);
        }
    }

    let warnings = experiment.warnings().to_vec();
    let summary = experiment.stop();
    write_report(&options.output_dir, &summary, &warnings)?;

    if options.plots {
        plotting::generate_all_plots(&options.output_dir, &log_path)?;
    }

    Ok(summary)
}

fn write_report(output_dir: &str, summary: &ExperimentSummary, warnings: &[String]) -> Result<()> {
    let snapshot = &summary.final_snapshot;
    let report = SummaryReport {
        vessel_id: &summary.vessel_id,
        ticks: summary.ticks,
        elapsed_h: summary.elapsed_h,
        final_biomass: snapshot.biomass,
        final_viability_percent: snapshot.viability_percent,
        final_ph: snapshot.ph,
        final_do_percent: snapshot.do_percent,
        final_glucose: snapshot.glucose,
        clamp_events: summary.clamp_events,
        skipped_updates: summary.skipped_updates,
        ph_faults: summary.ph_faults,
        do_faults: summary.do_faults,
        warnings,
    };
    let path = Path::new(output_dir).join("summary.json");
    fs::write(&path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("Failed to write {:?}", path))?;

    println!("\n========================================");
    println!("          EXPERIMENT SUMMARY");
    println!("========================================");
    println!("Vessel: {}", summary.vessel_id);
    println!("Duration: {} ticks ({:.2} h simulated)", summary.ticks, summary.elapsed_h);
    println!("----------------------------------------");
    println!("  - Final biomass:    {:>12.3e} cells", snapshot.biomass);
    println!("  - Viability:        {:>12.1} %", snapshot.viability_percent);
    println!("  - pH / setpoint:    {:>8.2} / {:.2}", snapshot.ph, snapshot.ph_setpoint);
    println!("  - DO / setpoint:    {:>8.1} / {:.1} %", snapshot.do_percent, snapshot.do_setpoint);
    println!("  - Glucose:          {:>12.1} mg/L", snapshot.glucose);
    println!("  - Waste:            {:>12.3}", snapshot.waste);
    println!("----------------------------------------");
    println!("  - Clamp events:     {}", summary.clamp_events);
    println!("  - Skipped updates:  {}", summary.skipped_updates);
    println!("  - Controller faults (pH / DO): {} / {}", summary.ph_faults, summary.do_faults);
    println!("  - Rows logged:      {}", summary.rows_logged);
    println!("========================================");
    Ok(())
}
