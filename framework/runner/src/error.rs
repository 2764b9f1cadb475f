use hpath_core::prelude::JobCancelledError;
use hpath_model::{AnalysisId, ErrorKind, Failure, ParamsError, ScenarioId, ScenarioStatus};
use hpath_summariser::{AggregateError, KpiError};
use std::time::Duration;
use thiserror::Error;

/// Failure to turn one uploaded scenario into a [hpath_model::Config].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Error when reading {file_name} (scenario {scenario}): {reason}")]
    Decode {
        scenario: String,
        file_name: String,
        reason: String,
    },
    #[error("Error when parsing {file_name} (scenario {scenario}): {source}")]
    Parse {
        scenario: String,
        file_name: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration in {file_name} (scenario {scenario}): {reason}")]
    Invalid {
        scenario: String,
        file_name: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Decode { .. } | ConfigError::Parse { .. } => ErrorKind::ConfigParse,
            ConfigError::Invalid { .. } => ErrorKind::Validation,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum StoreError {
    #[error("Scenario {0} not found")]
    ScenarioNotFound(ScenarioId),
    #[error("Analysis {0} not found")]
    AnalysisNotFound(AnalysisId),
    #[error("Scenario {scenario_id} cannot move from {from} to {to}")]
    IllegalTransition {
        scenario_id: ScenarioId,
        from: ScenarioStatus,
        to: ScenarioStatus,
    },
    #[error("Result store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum QueueError {
    #[error("Work queue cannot take {requested} more jobs, {available} of {capacity} slots free")]
    Full {
        capacity: usize,
        available: usize,
        requested: usize,
    },
    #[error("Work queue is closed")]
    Closed,
}

/// Failure reported by a simulation engine.
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Engine failed on replication {replication}: {message}")]
    Engine { replication: u32, message: String },
    #[error("Could not run the engine: {0}")]
    Io(#[from] std::io::Error),
    #[error("Engine was stopped during replication {replication}")]
    Interrupted { replication: u32 },
    #[error("Engine produced invalid output on replication {replication}: {source}")]
    InvalidOutput {
        replication: u32,
        #[source]
        source: serde_json::Error,
    },
}

/// Why a scenario's job ended without a report.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error(transparent)]
    Kpi(#[from] KpiError),
    #[error("Job exceeded its time limit of {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Cancelled(#[from] JobCancelledError),
    #[error("Job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Simulation(_) | JobError::Panicked(_) => ErrorKind::Simulation,
            JobError::Kpi(_) => ErrorKind::Kpi,
            JobError::Timeout(_) => ErrorKind::Timeout,
            JobError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    pub fn to_failure(&self) -> Failure {
        Failure::new(self.kind(), self.to_string())
    }
}

/// Rejection of a whole submission. Nothing from a rejected submission is stored or queued.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Invalid shared parameters: {0}")]
    Params(#[from] ParamsError),
    #[error("{} of the submitted scenarios failed: {}", .0.len(), join_errors(.0))]
    Config(Vec<ConfigError>),
    #[error("Submission has no scenarios")]
    Empty,
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SubmitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubmitError::Params(_) | SubmitError::Empty => ErrorKind::Validation,
            // Parse failures take precedence so the user fixes the unreadable files first
            SubmitError::Config(errors) => errors
                .iter()
                .map(ConfigError::kind)
                .find(|kind| *kind == ErrorKind::ConfigParse)
                .unwrap_or(ErrorKind::Validation),
            SubmitError::Queue(_) => ErrorKind::QueueDispatch,
            SubmitError::Store(_) => ErrorKind::Store,
        }
    }
}

/// Failure to read the results of a scenario or analysis.
#[derive(Error, Debug)]
pub enum ResultsError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Scenario {scenario_id} has no results yet, it is {status}")]
    NotReady {
        scenario_id: ScenarioId,
        status: ScenarioStatus,
    },
    #[error("Scenario {scenario_id} failed: {failure}")]
    Failed {
        scenario_id: ScenarioId,
        failure: Failure,
    },
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}
