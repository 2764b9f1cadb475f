use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Substring that marks a specimen as part of the warm-up population seeded into the lab before
/// the simulation starts.
pub const BOOTSTRAP_MARKER: &str = "init";

/// Name of the pseudo-stage that tracks work in progress across the whole lab.
pub const TOTAL_WIP: &str = "Total";

/// Event marking that a specimen's report was signed out.
pub const REPORT_END: &str = "report_end";
/// Event marking that a specimen was received by the lab.
pub const RECEPTION_START: &str = "reception_start";
/// Event marking the end of the lab's quality check, which ends the lab component of the TAT.
pub const QC_END: &str = "qc_end";

#[derive(Error, Debug, PartialEq)]
pub enum TraceError {
    #[error("Trace sample {index} has a non-finite timestamp or value")]
    NotFinite { index: usize },
    #[error("Trace sample {index} has a negative timestamp {t}")]
    NegativeTime { index: usize, t: f64 },
    #[error("Trace timestamps decrease at sample {index}: {previous} then {t}")]
    Decreasing { index: usize, previous: f64, t: f64 },
    #[error("Trace has no samples")]
    Empty,
    #[error("Trace starts at {t} but must start at simulation time 0")]
    NoInitialSample { t: f64 },
}

/// One observation of a monitored quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Simulation time in hours
    pub t: f64,
    pub value: f64,
}

/// Time series of one monitored quantity, as recorded by the simulation engine.
///
/// Samples are ordered by non-decreasing time. The trace is a right-continuous step function: a
/// value holds from its timestamp until the next sample replaces it. Several samples may share a
/// timestamp, the last of them is the value that holds afterwards.
///
/// Serialised as a list of `[t, value]` pairs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct MonitorTrace {
    samples: Vec<Sample>,
}

impl MonitorTrace {
    pub fn new(samples: Vec<(f64, f64)>) -> Result<Self, TraceError> {
        let mut previous: Option<f64> = None;
        for (index, &(t, value)) in samples.iter().enumerate() {
            if !t.is_finite() || !value.is_finite() {
                return Err(TraceError::NotFinite { index });
            }
            if t < 0.0 {
                return Err(TraceError::NegativeTime { index, t });
            }
            if let Some(previous) = previous {
                if t < previous {
                    return Err(TraceError::Decreasing { index, previous, t });
                }
            }
            previous = Some(t);
        }

        Ok(Self {
            samples: samples
                .into_iter()
                .map(|(t, value)| Sample { t, value })
                .collect(),
        })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Check that the trace covers its domain from simulation time 0.
    pub fn ensure_starts_at_zero(&self) -> Result<(), TraceError> {
        match self.samples.first() {
            None => Err(TraceError::Empty),
            Some(first) if first.t > 0.0 => Err(TraceError::NoInitialSample { t: first.t }),
            Some(_) => Ok(()),
        }
    }

    /// The value that holds at time `t`, which is the last sample at or before `t`.
    pub fn value_at(&self, t: f64) -> Option<f64> {
        let after = self.samples.partition_point(|s| s.t <= t);
        after.checked_sub(1).map(|i| self.samples[i].value)
    }

    /// Mean of the step function over `[first sample, until]`, weighting each value by how long it
    /// held.
    ///
    /// Returns `None` for an empty trace. If `until` is not after the first sample then the value
    /// at the first sample's time is returned.
    pub fn time_weighted_mean(&self, until: f64) -> Option<f64> {
        let start = self.samples.first()?.t;
        if until <= start {
            return self.value_at(start);
        }

        let mut area = 0.0;
        for (i, sample) in self.samples.iter().enumerate() {
            if sample.t >= until {
                break;
            }
            let next = self
                .samples
                .get(i + 1)
                .map(|s| s.t)
                .unwrap_or(until)
                .min(until);
            area += sample.value * (next - sample.t);
        }

        Some(area / (until - start))
    }

    /// Collapse samples sharing a timestamp into the last of them.
    ///
    /// Engines commonly record a final sample at exactly the end of the simulation, duplicating the
    /// timestamp of the last real change.
    pub fn dedup_last(&self) -> MonitorTrace {
        let mut samples: Vec<Sample> = Vec::with_capacity(self.samples.len());
        for sample in &self.samples {
            match samples.last_mut() {
                Some(last) if last.t == sample.t => *last = *sample,
                _ => samples.push(*sample),
            }
        }
        MonitorTrace { samples }
    }
}

impl TryFrom<Vec<(f64, f64)>> for MonitorTrace {
    type Error = TraceError;

    fn try_from(samples: Vec<(f64, f64)>) -> Result<Self, Self::Error> {
        MonitorTrace::new(samples)
    }
}

impl From<MonitorTrace> for Vec<(f64, f64)> {
    fn from(trace: MonitorTrace) -> Self {
        trace.samples.into_iter().map(|s| (s.t, s.value)).collect()
    }
}

/// A trace with the name of the quantity it monitors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTrace {
    pub name: String,
    pub trace: MonitorTrace,
}

/// The monitored quantities of one lab resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTraces {
    pub name: String,
    /// Allocated capacity over time, following the staff or machine rota
    pub capacity: MonitorTrace,
    /// Quantity of the resource claimed by tasks
    pub claimed: MonitorTrace,
    /// Number of tasks waiting for the resource
    pub queue_length: MonitorTrace,
}

/// Lifecycle event timestamps of one specimen, in simulation hours, keyed by event name such as
/// `reception_start` or `qc_end`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecimenRecord {
    events: BTreeMap<String, f64>,
}

impl SpecimenRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event(mut self, event: impl Into<String>, t: f64) -> Self {
        self.events.insert(event.into(), t);
        self
    }

    pub fn insert(&mut self, event: impl Into<String>, t: f64) {
        self.events.insert(event.into(), t);
    }

    pub fn get(&self, event: &str) -> Option<f64> {
        self.events.get(event).copied()
    }

    pub fn events(&self) -> impl Iterator<Item = (&str, f64)> {
        self.events.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Elapsed time between two events, if both were recorded.
    pub fn duration(&self, from: &str, to: &str) -> Option<f64> {
        Some(self.get(to)? - self.get(from)?)
    }
}

/// Whether the identifier belongs to a warm-up specimen rather than one that arrived during the
/// simulation.
pub fn is_bootstrap(specimen_id: &str) -> bool {
    specimen_id.contains(BOOTSTRAP_MARKER)
}

/// Whether a specimen counts towards TAT statistics: it arrived during the simulation and its
/// report was completed.
pub fn is_eligible(specimen_id: &str, record: &SpecimenRecord) -> bool {
    !is_bootstrap(specimen_id) && record.get(REPORT_END).is_some()
}

/// Everything the simulation engine records during one replication.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulationOutput {
    /// Work in progress per stage, the [TOTAL_WIP] pseudo-stage first then stages in process order
    pub wips: Vec<NamedTrace>,
    /// Resource traces, in the engine's resource order
    pub resources: Vec<ResourceTraces>,
    /// Specimen records keyed by specimen identifier
    pub specimens: BTreeMap<String, SpecimenRecord>,
}

impl SimulationOutput {
    /// Stages the engine tracked work in progress for, in the engine's order, leaving out the
    /// [TOTAL_WIP] pseudo-stage.
    pub fn stages(&self) -> Vec<TrackedStage> {
        self.wips
            .iter()
            .filter(|wip| wip.name != TOTAL_WIP)
            .map(|wip| TrackedStage::from_wip_name(&wip.name))
            .unique_by(|stage| stage.event_key.clone())
            .collect()
    }
}

/// A stage as named by the engine, with the prefix of its `<key>_start` and `<key>_end` specimen
/// events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedStage {
    pub name: String,
    pub event_key: String,
}

impl TrackedStage {
    /// Known stage names use their [Stage::event_key], any other name is lower-cased with
    /// everything but letters and digits removed, so `Decalc` records `decalc_start`.
    pub fn from_wip_name(name: &str) -> Self {
        let event_key = match name.parse::<Stage>() {
            Ok(stage) => stage.event_key().to_string(),
            Err(_) => name
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase(),
        };

        Self {
            name: name.to_string(),
            event_key,
        }
    }

    pub fn start_event(&self) -> String {
        format!("{}_start", self.event_key)
    }

    pub fn end_event(&self) -> String {
        format!("{}_end", self.event_key)
    }
}

impl From<Stage> for TrackedStage {
    fn from(stage: Stage) -> Self {
        Self {
            name: stage.to_string(),
            event_key: stage.event_key().to_string(),
        }
    }
}

/// The stages of the histopathology process, in process order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Reception,
    Cutup,
    Processing,
    Microtomy,
    Staining,
    Labelling,
    Scanning,
    Qc,
    Reporting,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::Reception,
        Stage::Cutup,
        Stage::Processing,
        Stage::Microtomy,
        Stage::Staining,
        Stage::Labelling,
        Stage::Scanning,
        Stage::Qc,
        Stage::Reporting,
    ];

    /// Prefix of the stage's `<key>_start` and `<key>_end` specimen events.
    pub fn event_key(&self) -> &'static str {
        match self {
            Stage::Reception => "reception",
            Stage::Cutup => "cutup",
            Stage::Processing => "processing",
            Stage::Microtomy => "microtomy",
            Stage::Staining => "staining",
            Stage::Labelling => "labelling",
            Stage::Scanning => "scanning",
            Stage::Qc => "qc",
            Stage::Reporting => "report",
        }
    }

    pub fn start_event(&self) -> String {
        format!("{}_start", self.event_key())
    }

    pub fn end_event(&self) -> String {
        format!("{}_end", self.event_key())
    }
}

impl FromStr for Stage {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Reception" => Ok(Stage::Reception),
            "Cut-up" => Ok(Stage::Cutup),
            "Processing" => Ok(Stage::Processing),
            "Microtomy" => Ok(Stage::Microtomy),
            "Staining" => Ok(Stage::Staining),
            "Labelling" => Ok(Stage::Labelling),
            "Scanning" => Ok(Stage::Scanning),
            "QC" => Ok(Stage::Qc),
            "Reporting" => Ok(Stage::Reporting),
            _ => Err("Unknown stage name"),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Reception => write!(f, "Reception"),
            Stage::Cutup => write!(f, "Cut-up"),
            Stage::Processing => write!(f, "Processing"),
            Stage::Microtomy => write!(f, "Microtomy"),
            Stage::Staining => write!(f, "Staining"),
            Stage::Labelling => write!(f, "Labelling"),
            Stage::Scanning => write!(f, "Scanning"),
            Stage::Qc => write!(f, "QC"),
            Stage::Reporting => write!(f, "Reporting"),
        }
    }
}
