use chrono::{DateTime, Utc};
use hpath_model::{
    AnalysisId, ErrorBody, ErrorEnvelope, MultiScenarioAnalysis, Report, Scenario,
    ScenarioId, ScenarioStatus, SharedParams,
};
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::error::{ResultsError, StoreError, SubmitError};

/// One scenario as uploaded by the frontend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadedScenario {
    pub sc_name: String,
    pub file_name: String,
    /// The source file as a data URL, `data:<media type>;base64,<payload>`
    pub file_base64: String,
    /// Decoded size as displayed by the frontend
    #[serde(default)]
    pub decode_len_str: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionRequest {
    /// Name of the multi-scenario analysis, if the submission creates one
    #[serde(default)]
    pub name: Option<String>,
    pub scenarios: Vec<UploadedScenario>,
    pub params: SharedParams,
}

/// A rejected submission: an HTTP-style status and the `{type, msg}` body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: u16,
    pub body: ErrorBody,
}

impl From<&SubmitError> for ApiError {
    fn from(err: &SubmitError) -> Self {
        let kind = err.kind();
        Self {
            status: kind.status_code(),
            body: ErrorBody {
                kind,
                msg: err.to_string(),
            },
        }
    }
}

impl From<&ResultsError> for ErrorEnvelope {
    fn from(err: &ResultsError) -> Self {
        match err {
            ResultsError::Store(StoreError::ScenarioNotFound(_))
            | ResultsError::Store(StoreError::AnalysisNotFound(_)) => {
                ErrorEnvelope::not_found(err.to_string())
            }
            ResultsError::NotReady { .. } => ErrorEnvelope {
                code: 409,
                name: "Conflict".to_string(),
                description: err.to_string(),
            },
            _ => ErrorEnvelope::internal(err.to_string()),
        }
    }
}

/// Row of the scenario listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Tabled)]
pub struct ScenarioRow {
    pub scenario_id: ScenarioId,
    pub name: String,
    pub file_name: String,
    pub status: ScenarioStatus,
    pub created_at: DateTime<Utc>,
    #[tabled(display = "short_fingerprint")]
    pub fingerprint: String,
    /// Overall mean TAT in hours, once the scenario is done
    #[tabled(display = "optional_float2")]
    pub overall_tat: Option<f64>,
    #[tabled(display = "failure_message")]
    pub failure: Option<String>,
}

fn short_fingerprint(fingerprint: &str) -> String {
    fingerprint.chars().take(12).collect()
}

fn optional_float2(n: &Option<f64>) -> String {
    n.map(|n| format!("{:.2}", n)).unwrap_or_default()
}

fn failure_message(failure: &Option<String>) -> String {
    failure.clone().unwrap_or_default()
}

impl ScenarioRow {
    pub fn new(scenario: &Scenario, report: Option<&Report>) -> Self {
        Self {
            scenario_id: scenario.scenario_id,
            name: scenario.config.name.clone(),
            file_name: scenario.config.file_name.clone(),
            status: scenario.status,
            created_at: scenario.created_at,
            fingerprint: scenario.config.fingerprint(),
            overall_tat: report.map(|r| r.overall_tat),
            failure: scenario.failure.as_ref().map(ToString::to_string),
        }
    }
}

/// Row of the analysis listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Tabled)]
pub struct AnalysisRow {
    pub analysis_id: AnalysisId,
    pub name: String,
    #[tabled(display = "member_ids")]
    pub scenario_ids: Vec<ScenarioId>,
    pub status: ScenarioStatus,
    pub created_at: DateTime<Utc>,
}

fn member_ids(ids: &[ScenarioId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl AnalysisRow {
    pub fn new(analysis: &MultiScenarioAnalysis, status: ScenarioStatus) -> Self {
        Self {
            analysis_id: analysis.analysis_id,
            name: analysis.name.clone(),
            scenario_ids: analysis.scenario_ids.clone(),
            status,
            created_at: analysis.created_at,
        }
    }
}
