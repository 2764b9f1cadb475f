use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::Config;
use crate::error::Failure;

/// Identifier of a scenario, assigned by the result store when the scenario is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(pub u64);

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a multi-scenario analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisId(pub u64);

impl fmt::Display for AnalysisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a scenario.
///
/// `Pending` is the initial status, `Done` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl ScenarioStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScenarioStatus::Done | ScenarioStatus::Error)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    ///
    /// A pending scenario may fail without ever running, for example when it is cancelled while
    /// still queued, but it can never complete without running first.
    pub fn can_transition_to(self, next: ScenarioStatus) -> bool {
        use ScenarioStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Pending, Error) | (Running, Done) | (Running, Error)
        )
    }
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioStatus::Pending => write!(f, "PENDING"),
            ScenarioStatus::Running => write!(f, "RUNNING"),
            ScenarioStatus::Done => write!(f, "DONE"),
            ScenarioStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Derive the status of a multi-scenario analysis from the status of its members.
///
/// - `Error` if any member failed, even while others are still in progress
/// - `Done` if every member is done
/// - `Running` once any member has started or finished
/// - `Pending` otherwise, including for an analysis without members
pub fn aggregate_status<I>(members: I) -> ScenarioStatus
where
    I: IntoIterator<Item = ScenarioStatus>,
{
    let mut any = false;
    let mut all_done = true;
    let mut started = false;

    for status in members {
        any = true;
        match status {
            ScenarioStatus::Error => return ScenarioStatus::Error,
            ScenarioStatus::Done => started = true,
            ScenarioStatus::Running => {
                started = true;
                all_done = false;
            }
            ScenarioStatus::Pending => all_done = false,
        }
    }

    if any && all_done {
        ScenarioStatus::Done
    } else if started {
        ScenarioStatus::Running
    } else {
        ScenarioStatus::Pending
    }
}

/// A unit of work: one configuration simulated for every replication and summarised into a report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub scenario_id: ScenarioId,
    pub config: Config,
    pub status: ScenarioStatus,
    pub created_at: DateTime<Utc>,
    /// Key under which the store saved the report, set when the scenario completes
    pub result_ref: Option<String>,
    /// Captured failure, set when the scenario ends in [ScenarioStatus::Error]
    pub failure: Option<Failure>,
}

impl Scenario {
    pub fn new(scenario_id: ScenarioId, config: Config, created_at: DateTime<Utc>) -> Self {
        Self {
            scenario_id,
            config,
            status: ScenarioStatus::Pending,
            created_at,
            result_ref: None,
            failure: None,
        }
    }
}

/// A batch of scenarios submitted together for comparison.
///
/// The analysis has no execution of its own, its status is always derived from its members with
/// [aggregate_status].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MultiScenarioAnalysis {
    pub analysis_id: AnalysisId,
    pub name: String,
    /// Member scenarios, in submission order
    pub scenario_ids: Vec<ScenarioId>,
    pub created_at: DateTime<Utc>,
}
