use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufRead, Read, Write};
use std::path::Path;

mod config;
mod error;
mod report;
mod scenario;
mod trace;

pub use config::{Config, ParamsError, SharedParams};
pub use error::{ErrorBody, ErrorEnvelope, ErrorKind, Failure};
pub use report::{
    AxisValue, ChartBounds, ChartData, DayThresholds, LabProgress, MultiChartData, MultiReport,
    Progress, Report,
};
pub use scenario::{
    aggregate_status, AnalysisId, MultiScenarioAnalysis, Scenario, ScenarioId, ScenarioStatus,
};
pub use trace::{
    is_bootstrap, is_eligible, MonitorTrace, NamedTrace, ResourceTraces, Sample,
    SimulationOutput, SpecimenRecord, Stage, TraceError, TrackedStage, BOOTSTRAP_MARKER,
    QC_END, RECEPTION_START, REPORT_END, TOTAL_WIP,
};

/// Append a value to a file as one JSON line
///
/// The value will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_json_line<T: Serialize>(value: &T, path: impl AsRef<Path>) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_json(value, &mut file)?;
    let _ = file.write("\n".as_bytes())?;
    Ok(())
}

/// Serialize a value to a writer
pub fn store_json<T: Serialize, W: Write>(value: &T, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, value)?;
    Ok(())
}

/// Load a simulation output, as recorded from an engine run, from a reader
pub fn load_simulation_output<R: Read>(reader: R) -> anyhow::Result<SimulationOutput> {
    load_json(reader)
}

fn load_json<T: DeserializeOwned, R: Read>(reader: R) -> anyhow::Result<T> {
    let reader = std::io::BufReader::new(reader);
    let value: T = serde_json::from_reader(reader)?;
    Ok(value)
}

/// Load scenarios from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_json_line].
pub fn load_scenarios(path: impl AsRef<Path>) -> anyhow::Result<Vec<Scenario>> {
    load_json_lines(path)
}

/// Load the outputs of every replication of a run, one JSON object per line.
pub fn load_simulation_outputs(path: impl AsRef<Path>) -> anyhow::Result<Vec<SimulationOutput>> {
    load_json_lines(path)
}

fn load_json_lines<T: DeserializeOwned>(path: impl AsRef<Path>) -> anyhow::Result<Vec<T>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut values = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        values.push(serde_json::from_str(&line)?);
    }
    Ok(values)
}
