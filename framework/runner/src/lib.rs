//! Job orchestration for histopathology lab simulations.
//!
//! Uploaded scenarios are validated into configurations, queued, simulated on a pool of workers
//! by a [SimulationEngine](adapter::SimulationEngine) and summarised into reports held by a
//! [ResultStore](store::ResultStore). The [Orchestrator](orchestrator::Orchestrator) ties these
//! together behind the operations the frontend calls.

mod adapter;
mod api;
mod cli;
mod config;
mod error;
mod executor;
mod job;
mod orchestrator;
mod pool;
mod progress;
mod queue;
mod store;
mod validate;

pub mod prelude {
    pub use crate::adapter::{
        engine_path, ProcessEngine, SimulationAdapter, SimulationEngine, HPATH_ENGINE_PATH_ENV,
    };
    pub use crate::api::{AnalysisRow, ApiError, ScenarioRow, SubmissionRequest, UploadedScenario};
    pub use crate::cli::RunnerCli;
    pub use crate::config::{RunnerConfig, DEFAULT_JOB_TIMEOUT, DEFAULT_QUEUE_CAPACITY};
    pub use crate::error::{
        ConfigError, JobError, QueueError, ResultsError, SimulationError, StoreError, SubmitError,
    };
    pub use crate::executor::Executor;
    pub use crate::job::{CancelRegistry, Job, JobRunner};
    pub use crate::orchestrator::Orchestrator;
    pub use crate::pool::WorkerPool;
    pub use crate::progress::wait_for_scenarios;
    pub use crate::queue::{Reservation, WorkQueue};
    pub use crate::store::{InMemoryStore, ResultStore};
    pub use crate::validate::{parse_submission, parse_upload, to_data_url};
}
