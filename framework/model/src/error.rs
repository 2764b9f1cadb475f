use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of failure kinds reported to clients.
///
/// The serialised form is the stable discriminant that clients match on, never a type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The uploaded source file could not be decoded or read
    ConfigParse,
    /// The configuration was readable but semantically invalid
    Validation,
    /// The work queue could not accept the submission
    QueueDispatch,
    /// The result store was unavailable or rejected an operation
    Store,
    /// The simulation engine failed during a run
    Simulation,
    /// The KPI computation failed on the engine's output
    Kpi,
    /// The job exceeded its time budget
    Timeout,
    /// The job was cancelled, for example because its scenario was deleted
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigParse => "config_parse",
            ErrorKind::Validation => "validation",
            ErrorKind::QueueDispatch => "queue_dispatch",
            ErrorKind::Store => "store",
            ErrorKind::Simulation => "simulation",
            ErrorKind::Kpi => "kpi",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// Whether the client caused the failure, as opposed to the service being unavailable.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ErrorKind::ConfigParse | ErrorKind::Validation)
    }

    /// HTTP-style status code for a failure of this kind at submission time.
    pub fn status_code(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            503
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure captured against a scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Body returned when a submission is rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub msg: String,
}

/// Uniform envelope for failures that escape every other handler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorEnvelope {
    pub code: u16,
    pub name: String,
    pub description: String,
}

impl ErrorEnvelope {
    pub fn internal(description: impl Into<String>) -> Self {
        Self {
            code: 500,
            name: "Internal Server Error".to_string(),
            description: description.into(),
        }
    }

    pub fn not_found(description: impl Into<String>) -> Self {
        Self {
            code: 404,
            name: "Not Found".to_string(),
            description: description.into(),
        }
    }
}
