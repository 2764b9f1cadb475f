use hpath_model::{
    aggregate_status, AnalysisId, Config, ErrorKind, Failure, MultiReport, Report, ScenarioId,
    ScenarioStatus,
};
use hpath_summariser::{aggregate, Member};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::adapter::{SimulationAdapter, SimulationEngine};
use crate::api::{AnalysisRow, ScenarioRow, SubmissionRequest};
use crate::config::RunnerConfig;
use crate::error::{ResultsError, StoreError, SubmitError};
use crate::executor::Executor;
use crate::job::{CancelRegistry, Job, JobRunner};
use crate::pool::WorkerPool;
use crate::queue::WorkQueue;
use crate::store::ResultStore;
use crate::validate::parse_submission;

/// The simulation service: accepts submissions, runs them on a worker pool and answers status
/// and result queries from the result store.
pub struct Orchestrator {
    store: Arc<dyn ResultStore>,
    queue: Arc<WorkQueue<Job>>,
    registry: Arc<CancelRegistry>,
    pool: Mutex<Option<WorkerPool>>,
}

impl Orchestrator {
    /// Start the worker pool and return the service ready for submissions.
    pub fn start(
        config: RunnerConfig,
        store: Arc<dyn ResultStore>,
        engine: Arc<dyn SimulationEngine>,
    ) -> anyhow::Result<Self> {
        let queue = WorkQueue::new(config.queue_capacity);
        let registry = Arc::new(CancelRegistry::default());
        let runner = JobRunner {
            store: store.clone(),
            adapter: SimulationAdapter::new(engine),
            executor: Executor::new()?,
            registry: registry.clone(),
            timeout: config.job_timeout,
        };
        let pool = WorkerPool::start(config.workers, queue.clone(), move |job: Job| {
            runner.execute(job)
        })?;

        Ok(Self {
            store,
            queue,
            registry,
            pool: Mutex::new(Some(pool)),
        })
    }

    /// Validate and queue every scenario of a submission.
    ///
    /// Either every scenario is created and queued or, on any failure, none is.
    pub fn submit(&self, request: &SubmissionRequest) -> Result<Vec<ScenarioId>, SubmitError> {
        let configs = parse_submission(request)?;
        let (scenario_ids, _) = self.dispatch(configs, None)?;
        Ok(scenario_ids)
    }

    /// Like [Orchestrator::submit], also grouping the scenarios into an analysis.
    pub fn submit_multi(&self, request: &SubmissionRequest) -> Result<AnalysisId, SubmitError> {
        let configs = parse_submission(request)?;
        let name = request
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("Comparison of {} scenarios", configs.len()));

        let (_, analysis_id) = self.dispatch(configs, Some(name))?;
        analysis_id.ok_or_else(|| {
            StoreError::Unavailable("the analysis was not created".to_string()).into()
        })
    }

    /// Queue already validated configurations.
    pub fn submit_configs(&self, configs: Vec<Config>) -> Result<Vec<ScenarioId>, SubmitError> {
        if configs.is_empty() {
            return Err(SubmitError::Empty);
        }
        let (scenario_ids, _) = self.dispatch(configs, None)?;
        Ok(scenario_ids)
    }

    fn dispatch(
        &self,
        configs: Vec<Config>,
        analysis_name: Option<String>,
    ) -> Result<(Vec<ScenarioId>, Option<AnalysisId>), SubmitError> {
        // Room is held before anything is created so a full queue leaves no trace
        let reservation = self.queue.reserve(configs.len())?;
        let scenarios = self.store.create_scenarios(configs)?;
        let scenario_ids = scenarios.iter().map(|s| s.scenario_id).collect::<Vec<_>>();

        let analysis_id = match analysis_name {
            Some(name) => match self.store.create_analysis(name, scenario_ids.clone()) {
                Ok(analysis) => Some(analysis.analysis_id),
                Err(e) => {
                    self.roll_back(&scenario_ids);
                    return Err(e.into());
                }
            },
            None => None,
        };

        let jobs = scenarios
            .into_iter()
            .map(|scenario| Job {
                scenario_id: scenario.scenario_id,
                cancel: self.registry.register(scenario.scenario_id),
                config: scenario.config,
            })
            .collect();
        if let Err(e) = reservation.commit(jobs) {
            self.roll_back(&scenario_ids);
            return Err(e.into());
        }

        log::info!(
            "Accepted {} scenarios {:?}{}, {} jobs waiting",
            scenario_ids.len(),
            scenario_ids,
            analysis_id
                .map(|id| format!(" as analysis {id}"))
                .unwrap_or_default(),
            self.queue.len()
        );
        Ok((scenario_ids, analysis_id))
    }

    fn roll_back(&self, scenario_ids: &[ScenarioId]) {
        for scenario_id in scenario_ids {
            self.registry.remove(*scenario_id);
        }
        if let Err(e) = self.store.delete_scenarios(scenario_ids) {
            log::error!("Failed to roll back scenarios {scenario_ids:?}: {e}");
        }
    }

    pub fn scenario_status(&self, scenario_id: ScenarioId) -> Result<ScenarioStatus, StoreError> {
        Ok(self.store.scenario(scenario_id)?.status)
    }

    /// Status of an analysis, derived from its members. A member that no longer exists counts as
    /// failed.
    pub fn analysis_status(&self, analysis_id: AnalysisId) -> Result<ScenarioStatus, StoreError> {
        let analysis = self.store.analysis(analysis_id)?;
        Ok(aggregate_status(self.member_statuses(&analysis.scenario_ids)?))
    }

    fn member_statuses(
        &self,
        scenario_ids: &[ScenarioId],
    ) -> Result<Vec<ScenarioStatus>, StoreError> {
        scenario_ids
            .iter()
            .map(|id| match self.store.scenario(*id) {
                Ok(scenario) => Ok(scenario.status),
                Err(StoreError::ScenarioNotFound(_)) => Ok(ScenarioStatus::Error),
                Err(e) => Err(e),
            })
            .collect()
    }

    /// The report of a done scenario.
    pub fn scenario_results(&self, scenario_id: ScenarioId) -> Result<Report, ResultsError> {
        let scenario = self.store.scenario(scenario_id)?;
        match scenario.status {
            ScenarioStatus::Done => {
                self.store
                    .report(scenario_id)?
                    .ok_or(ResultsError::NotReady {
                        scenario_id,
                        status: scenario.status,
                    })
            }
            ScenarioStatus::Error => Err(ResultsError::Failed {
                scenario_id,
                failure: scenario
                    .failure
                    .unwrap_or_else(|| Failure::new(ErrorKind::Store, "no failure recorded")),
            }),
            status => Err(ResultsError::NotReady {
                scenario_id,
                status,
            }),
        }
    }

    /// The comparative report of an analysis whose members are all done.
    pub fn analysis_results(&self, analysis_id: AnalysisId) -> Result<MultiReport, ResultsError> {
        let analysis = self.store.analysis(analysis_id)?;

        let mut members = Vec::with_capacity(analysis.scenario_ids.len());
        for scenario_id in analysis.scenario_ids {
            let member = match self.store.scenario(scenario_id) {
                Ok(scenario) if scenario.status == ScenarioStatus::Done => Member {
                    scenario_id,
                    status: scenario.status,
                    report: self.store.report(scenario_id)?,
                },
                Ok(scenario) => Member {
                    scenario_id,
                    status: scenario.status,
                    report: None,
                },
                Err(StoreError::ScenarioNotFound(_)) => Member {
                    scenario_id,
                    status: ScenarioStatus::Error,
                    report: None,
                },
                Err(e) => return Err(e.into()),
            };
            members.push(member);
        }

        Ok(aggregate(&members)?)
    }

    /// Every scenario, newest first.
    pub fn list_scenarios(&self) -> Result<Vec<ScenarioRow>, StoreError> {
        self.store
            .list_scenarios()?
            .iter()
            .map(|scenario| {
                let report = match scenario.status {
                    ScenarioStatus::Done => self.store.report(scenario.scenario_id)?,
                    _ => None,
                };
                Ok(ScenarioRow::new(scenario, report.as_ref()))
            })
            .collect()
    }

    /// Member scenarios of an analysis, in submission order.
    pub fn analysis_members(&self, analysis_id: AnalysisId) -> Result<Vec<ScenarioId>, StoreError> {
        Ok(self.store.analysis(analysis_id)?.scenario_ids)
    }

    pub fn list_analyses(&self) -> Result<Vec<AnalysisRow>, StoreError> {
        self.store
            .list_analyses()?
            .iter()
            .map(|analysis| {
                let status = aggregate_status(self.member_statuses(&analysis.scenario_ids)?);
                Ok(AnalysisRow::new(analysis, status))
            })
            .collect()
    }

    /// Delete a scenario, cancelling its job if it is queued or running.
    pub fn delete_scenario(&self, scenario_id: ScenarioId) -> Result<(), StoreError> {
        let scenario = self.store.scenario(scenario_id)?;

        if self.registry.cancel(scenario_id) {
            log::info!("Cancelled job of scenario {scenario_id}");
        }
        if !scenario.status.is_terminal() {
            let failure = Failure::new(ErrorKind::Cancelled, "Scenario deleted");
            // The job may have finished meanwhile, its outcome then stands until deletion
            if let Err(e) = self.store.mark_error(scenario_id, failure) {
                log::debug!("Scenario {scenario_id} ended before it could be cancelled: {e}");
            }
        }

        self.store.delete_scenarios(&[scenario_id])
    }

    /// Drop all queued work, cancel running jobs and clear the store.
    pub fn reset(&self) -> Result<(), StoreError> {
        let dropped = self.queue.drain();
        let cancelled = self.registry.cancel_all();
        log::info!(
            "Reset dropped {} queued jobs and cancelled {} jobs",
            dropped.len(),
            cancelled.len()
        );
        self.store.clear()
    }

    /// Liveness check.
    pub fn ping(&self) -> &'static str {
        "PONG"
    }

    /// Stop accepting work, cancel what is in flight and wait for the workers to stop.
    pub fn shutdown(&self) -> anyhow::Result<()> {
        self.queue.close();
        self.registry.cancel_all();
        if let Some(pool) = self.pool.lock().take() {
            pool.join()?;
            log::info!("Worker pool stopped");
        }
        Ok(())
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        // Workers hold their own reference to the queue, closing it lets them exit
        self.queue.close();
        self.registry.cancel_all();
    }
}
