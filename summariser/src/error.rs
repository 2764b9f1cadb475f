use hpath_model::{ScenarioId, TraceError};
use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KpiError {
    #[error("Invalid trace `{name}`: {source}")]
    Trace {
        name: String,
        #[source]
        source: TraceError,
    },
    #[error("No eligible specimen completed within the simulation horizon")]
    NoEligibleSpecimens,
    #[error("No replication output to summarise")]
    NoReplications,
    #[error("Replication {replication} does not match the first replication: {detail}")]
    ReplicationMismatch { replication: usize, detail: String },
    #[error("Frame operation failed: {0}")]
    Frame(#[from] PolarsError),
}

impl KpiError {
    pub(crate) fn trace(name: &str, source: TraceError) -> Self {
        KpiError::Trace {
            name: name.to_string(),
            source,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum AggregateError {
    #[error("Analysis has no member scenarios")]
    Empty,
    #[error("Members are not finished yet: {pending:?}")]
    NotReady { pending: Vec<ScenarioId> },
    #[error("Members failed: {failed:?}")]
    MemberFailed { failed: Vec<ScenarioId> },
    #[error("Report of scenario {scenario_id} does not match the first report: {detail}")]
    ShapeMismatch {
        scenario_id: ScenarioId,
        detail: String,
    },
}
