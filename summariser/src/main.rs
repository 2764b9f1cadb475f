use anyhow::Context;
use chrono::Utc;
use hpath_model::{load_simulation_outputs, Config, SharedParams};
use log::debug;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;

/// Environment variable name to set a custom simulation output file path
const SIM_OUTPUT_PATH_ENV: &str = "SIM_OUTPUT_PATH";
/// Default path for the simulation output file, one replication per line
const DEFAULT_SIM_OUTPUT_PATH: &str = "sim_output.jsonl";
/// Environment variable name to set the simulation horizon, in hours
const SIM_HOURS_ENV: &str = "SIM_HOURS";
const DEFAULT_SIM_HOURS: u32 = 24;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let output_path = std::env::var(SIM_OUTPUT_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_SIM_OUTPUT_PATH));
    let sim_hours = match std::env::var(SIM_HOURS_ENV) {
        Ok(hours) => hours
            .parse()
            .with_context(|| format!("Invalid {SIM_HOURS_ENV} value `{hours}`"))?,
        Err(_) => DEFAULT_SIM_HOURS,
    };
    let confidence_intervals = std::env::var("CONFIDENCE_INTERVALS").is_ok();

    debug!("Loading simulation output from {}", output_path.display());
    let outputs = load_simulation_outputs(&output_path).with_context(|| {
        format!(
            "Failed to load simulation output from {}",
            output_path.display()
        )
    })?;

    let shared = SharedParams {
        sim_hours,
        num_reps: outputs.len() as u32,
        confidence_intervals,
    };
    let config = Config::new(
        output_path.display().to_string(),
        output_path.display().to_string(),
        &shared,
        BTreeMap::new(),
    );

    let report = hpath_summariser::report_for_outputs(&config, &outputs)
        .context("Failed to compute KPIs")?;
    log::info!(
        "Overall TAT {:.2}h, lab TAT {:.2}h over {} replications",
        report.overall_tat,
        report.lab_tat,
        outputs.len()
    );

    let report_file = File::create_new(format!(
        "summariser-report-{}.json",
        Utc::now().format("%Y-%m-%dT%H.%M.%S%.fZ")
    ))?;

    serde_json::to_writer_pretty(report_file, &report)?;

    Ok(())
}
