//! This module is responsible for generating all visualizations from the experiment time series.

use anyhow::Result;
use culturelab_core::logger;
use culturelab_schemas::snapshot::CultureSnapshot;
use plotters::prelude::*;

/// One line on a chart, read from each snapshot.
struct Series {
    label: &'static str,
    color: RGBColor,
    dashed: bool,
    value: fn(&CultureSnapshot) -> f64,
}

/// The main function to generate and save all plots for a run.
pub fn generate_all_plots(output_dir: &str, log_path: &str) -> Result<()> {
    println!("[Plotting] Generating graphs from experiment data...");

    let data = logger::read_snapshots(log_path)?;

    if data.len() < 2 {
        println!("[Plotting] Warning: Not enough data to plot.");
        return Ok(());
    }

    plot_series(
        &format!("{}/1_biomass.png", output_dir),
        "Biomass Over Time",
        "Cells",
        &data,
        &[Series {
            label: "Total cells",
            color: GREEN,
            dashed: false,
            value: |d| d.biomass,
        }],
    )?;
    plot_series(
        &format!("{}/2_viability_stress.png", output_dir),
        "Viability and Stress",
        "Percent",
        &data,
        &[
            Series {
                label: "Viability (%)",
                color: BLUE,
                dashed: false,
                value: |d| d.viability_percent,
            },
            Series {
                label: "Stress (%)",
                color: RED,
                dashed: false,
                value: |d| d.stress * 100.0,
            },
        ],
    )?;
    plot_series(
        &format!("{}/3_ph_control.png", output_dir),
        "pH Control",
        "pH",
        &data,
        &[
            Series {
                label: "pH",
                color: RED,
                dashed: false,
                value: |d| d.ph,
            },
            Series {
                label: "Setpoint",
                color: BLACK,
                dashed: true,
                value: |d| d.ph_setpoint,
            },
        ],
    )?;
    plot_series(
        &format!("{}/4_do_control.png", output_dir),
        "Dissolved Oxygen Control",
        "DO (% air saturation)",
        &data,
        &[
            Series {
                label: "DO",
                color: BLUE,
                dashed: false,
                value: |d| d.do_percent,
            },
            Series {
                label: "Setpoint",
                color: BLACK,
                dashed: true,
                value: |d| d.do_setpoint,
            },
        ],
    )?;
    plot_series(
        &format!("{}/5_glucose_waste.png", output_dir),
        "Glucose and Waste",
        "Concentration",
        &data,
        &[
            Series {
                label: "Glucose",
                color: MAGENTA,
                dashed: false,
                value: |d| d.glucose,
            },
            Series {
                label: "Waste",
                color: BLACK,
                dashed: false,
                value: |d| d.waste,
            },
        ],
    )?;
    plot_series(
        &format!("{}/6_actuators.png", output_dir),
        "Actuators",
        "Value",
        &data,
        &[
            Series {
                label: "Inlet CO2 (%)",
                color: RED,
                dashed: false,
                value: |d| d.co2_percent,
            },
            Series {
                label: "Aeration (L/min)",
                color: CYAN,
                dashed: false,
                value: |d| d.aeration_lpm,
            },
        ],
    )?;

    println!("[Plotting] Graphs have been saved to '{}'.", output_dir);
    Ok(())
}

/// Draws a line chart of one or more series against simulated time.
fn plot_series(
    path: &str,
    caption: &str,
    y_desc: &str,
    data: &[CultureSnapshot],
    series: &[Series],
) -> Result<()> {
    let root = BitMapBackend::new(path, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let max_hours = data.last().map_or(1.0, |d| d.elapsed_h).max(1e-6);
    let (low, high) = series
        .iter()
        .flat_map(|s| data.iter().map(move |d| (s.value)(d)))
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !low.is_finite() || !high.is_finite() {
        return Ok(());
    }
    let pad = ((high - low) * 0.1).max(1e-3);

    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 40).into_font())
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(70)
        .build_cartesian_2d(0f64..max_hours, (low - pad)..(high + pad))?;

    chart
        .configure_mesh()
        .x_desc("Time (hours)")
        .y_desc(y_desc)
        .draw()?;

    for s in series {
        let color = s.color;
        let points = data.iter().map(|d| (d.elapsed_h, (s.value)(d)));
        let annotation = if s.dashed {
            chart.draw_series(DashedLineSeries::new(points, 5, 5, color.stroke_width(2)))?
        } else {
            chart.draw_series(LineSeries::new(points, color.stroke_width(2)))?
        };
        annotation
            .label(s.label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}
