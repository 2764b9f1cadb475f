use hpath_core::prelude::{CancelHandle, CancelListener};
use hpath_model::{Config, ScenarioId, ScenarioStatus};
use hpath_summariser::report_for_outputs;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::adapter::SimulationAdapter;
use crate::executor::Executor;
use crate::store::ResultStore;

/// One scenario waiting to be simulated.
#[derive(Debug)]
pub struct Job {
    pub scenario_id: ScenarioId,
    pub config: Config,
    pub cancel: CancelListener,
}

/// Cancel handles of the scenarios that are queued or running.
#[derive(Debug, Default)]
pub struct CancelRegistry {
    handles: Mutex<HashMap<ScenarioId, CancelHandle>>,
}

impl CancelRegistry {
    /// Register a scenario and get the listener its job should watch.
    pub fn register(&self, scenario_id: ScenarioId) -> CancelListener {
        let handle = CancelHandle::new();
        let listener = handle.new_listener();
        self.handles.lock().insert(scenario_id, handle);
        listener
    }

    pub fn remove(&self, scenario_id: ScenarioId) -> Option<CancelHandle> {
        self.handles.lock().remove(&scenario_id)
    }

    /// Cancel one scenario's job, returns false if it had no job in flight.
    pub fn cancel(&self, scenario_id: ScenarioId) -> bool {
        match self.remove(scenario_id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every job in flight and return the ids of their scenarios.
    pub fn cancel_all(&self) -> Vec<ScenarioId> {
        self.handles
            .lock()
            .drain()
            .map(|(scenario_id, handle)| {
                handle.cancel();
                scenario_id
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything a worker needs to take a scenario from pending to a terminal status.
pub struct JobRunner {
    pub(crate) store: Arc<dyn ResultStore>,
    pub(crate) adapter: SimulationAdapter,
    pub(crate) executor: Executor,
    pub(crate) registry: Arc<CancelRegistry>,
    pub(crate) timeout: Duration,
}

impl JobRunner {
    /// Run one job to completion.
    ///
    /// Failures never escape: they are recorded against the scenario and the worker moves on. The
    /// store refuses to overwrite a terminal status, so the outcome of a job whose scenario was
    /// cancelled or deleted meanwhile is discarded.
    pub fn execute(&self, job: Job) {
        let Job {
            scenario_id,
            config,
            cancel,
        } = job;

        if cancel.is_cancelled() {
            log::warn!("Skipping scenario {scenario_id}, it was cancelled while queued");
            self.registry.remove(scenario_id);
            return;
        }
        if let Err(e) = self
            .store
            .update_status(scenario_id, ScenarioStatus::Running)
        {
            log::warn!("Not running scenario {scenario_id}: {e}");
            self.registry.remove(scenario_id);
            return;
        }

        log::info!(
            "Running scenario {scenario_id} ({}) with {} replications over {} hours",
            config.name,
            config.num_reps,
            config.sim_hours
        );
        let started = Instant::now();

        let adapter = self.adapter.clone();
        let result = self
            .executor
            .execute_blocking(self.timeout, cancel, move |abandon| {
                let outputs = adapter.run_replications(&config, &abandon)?;
                Ok(report_for_outputs(&config, &outputs)?)
            });

        let stored = match result {
            Ok(report) => {
                log::info!(
                    "Scenario {scenario_id} done in {:.1}s, overall TAT {:.2}h",
                    started.elapsed().as_secs_f64(),
                    report.overall_tat
                );
                self.store.save_result(scenario_id, report)
            }
            Err(e) => {
                log::error!("Scenario {scenario_id} failed: {e}");
                self.store.mark_error(scenario_id, e.to_failure())
            }
        };
        if let Err(e) = stored {
            log::debug!("Discarding outcome of scenario {scenario_id}: {e}");
        }

        self.registry.remove(scenario_id);
    }
}
