use chrono::Utc;
use hpath_model::{
    append_json_line, AnalysisId, Config, Failure, MultiScenarioAnalysis, Report, Scenario,
    ScenarioId, ScenarioStatus,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::error::StoreError;

/// Persistence for scenarios, analyses and reports.
///
/// The store is the single source of truth for scenario status. Every status change goes through
/// it and it refuses changes the lifecycle does not permit, so a terminal scenario is never
/// overwritten no matter how many writers race on it.
pub trait ResultStore: Send + Sync {
    /// Create one pending scenario per configuration, in order.
    fn create_scenarios(&self, configs: Vec<Config>) -> Result<Vec<Scenario>, StoreError>;

    /// Remove scenarios and their reports. Unknown ids are ignored.
    fn delete_scenarios(&self, scenario_ids: &[ScenarioId]) -> Result<(), StoreError>;

    fn update_status(
        &self,
        scenario_id: ScenarioId,
        status: ScenarioStatus,
    ) -> Result<(), StoreError>;

    /// Store the report of a running scenario and mark it done, as one change.
    fn save_result(&self, scenario_id: ScenarioId, report: Report) -> Result<(), StoreError>;

    /// Mark a pending or running scenario as failed.
    fn mark_error(&self, scenario_id: ScenarioId, failure: Failure) -> Result<(), StoreError>;

    fn create_analysis(
        &self,
        name: String,
        scenario_ids: Vec<ScenarioId>,
    ) -> Result<MultiScenarioAnalysis, StoreError>;

    fn scenario(&self, scenario_id: ScenarioId) -> Result<Scenario, StoreError>;

    fn analysis(&self, analysis_id: AnalysisId) -> Result<MultiScenarioAnalysis, StoreError>;

    /// The stored report, present only once the scenario is done.
    fn report(&self, scenario_id: ScenarioId) -> Result<Option<Report>, StoreError>;

    /// Every scenario, newest first.
    fn list_scenarios(&self) -> Result<Vec<Scenario>, StoreError>;

    /// Every analysis, newest first.
    fn list_analyses(&self) -> Result<Vec<MultiScenarioAnalysis>, StoreError>;

    /// Remove everything. Identifiers are not reused afterwards.
    fn clear(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct StoreState {
    last_scenario_id: u64,
    last_analysis_id: u64,
    scenarios: BTreeMap<ScenarioId, Scenario>,
    analyses: BTreeMap<AnalysisId, MultiScenarioAnalysis>,
    reports: HashMap<String, Report>,
}

impl StoreState {
    fn scenario_mut(&mut self, scenario_id: ScenarioId) -> Result<&mut Scenario, StoreError> {
        self.scenarios
            .get_mut(&scenario_id)
            .ok_or(StoreError::ScenarioNotFound(scenario_id))
    }
}

fn check_transition(scenario: &Scenario, to: ScenarioStatus) -> Result<(), StoreError> {
    if scenario.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(StoreError::IllegalTransition {
            scenario_id: scenario.scenario_id,
            from: scenario.status,
            to,
        })
    }
}

/// A [ResultStore] held in memory.
///
/// With a journal configured, every scenario that reaches a terminal status is also appended to
/// the journal file as one JSON line, readable with [hpath_model::load_scenarios].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    journal: Option<PathBuf>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(path: impl Into<PathBuf>) -> Self {
        Self {
            state: RwLock::default(),
            journal: Some(path.into()),
        }
    }

    fn record(&self, scenario: &Scenario) {
        if let Some(journal) = &self.journal {
            if let Err(e) = append_json_line(scenario, journal) {
                log::warn!(
                    "Failed to journal scenario {} to {}: {e:?}",
                    scenario.scenario_id,
                    journal.display()
                );
            }
        }
    }
}

impl ResultStore for InMemoryStore {
    fn create_scenarios(&self, configs: Vec<Config>) -> Result<Vec<Scenario>, StoreError> {
        let mut state = self.state.write();
        let created_at = Utc::now();

        let scenarios = configs
            .into_iter()
            .map(|config| {
                state.last_scenario_id += 1;
                Scenario::new(ScenarioId(state.last_scenario_id), config, created_at)
            })
            .collect::<Vec<_>>();
        for scenario in &scenarios {
            state.scenarios.insert(scenario.scenario_id, scenario.clone());
        }

        Ok(scenarios)
    }

    fn delete_scenarios(&self, scenario_ids: &[ScenarioId]) -> Result<(), StoreError> {
        let mut state = self.state.write();
        for scenario_id in scenario_ids {
            if let Some(scenario) = state.scenarios.remove(scenario_id) {
                if let Some(result_ref) = scenario.result_ref {
                    state.reports.remove(&result_ref);
                }
            }
        }
        Ok(())
    }

    fn update_status(
        &self,
        scenario_id: ScenarioId,
        status: ScenarioStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let scenario = state.scenario_mut(scenario_id)?;
        // Terminal statuses are only set together with their report or failure
        if status.is_terminal() {
            return Err(StoreError::IllegalTransition {
                scenario_id,
                from: scenario.status,
                to: status,
            });
        }
        check_transition(scenario, status)?;
        scenario.status = status;
        Ok(())
    }

    fn save_result(&self, scenario_id: ScenarioId, report: Report) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let scenario = state.scenario_mut(scenario_id)?;
        check_transition(scenario, ScenarioStatus::Done)?;

        let result_ref = format!("report-{scenario_id}");
        scenario.status = ScenarioStatus::Done;
        scenario.result_ref = Some(result_ref.clone());
        let scenario = scenario.clone();
        state.reports.insert(result_ref, report);
        drop(state);

        self.record(&scenario);
        Ok(())
    }

    fn mark_error(&self, scenario_id: ScenarioId, failure: Failure) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let scenario = state.scenario_mut(scenario_id)?;
        check_transition(scenario, ScenarioStatus::Error)?;

        scenario.status = ScenarioStatus::Error;
        scenario.failure = Some(failure);
        let scenario = scenario.clone();
        drop(state);

        self.record(&scenario);
        Ok(())
    }

    fn create_analysis(
        &self,
        name: String,
        scenario_ids: Vec<ScenarioId>,
    ) -> Result<MultiScenarioAnalysis, StoreError> {
        let mut state = self.state.write();
        if let Some(missing) = scenario_ids
            .iter()
            .find(|id| !state.scenarios.contains_key(*id))
        {
            return Err(StoreError::ScenarioNotFound(*missing));
        }

        state.last_analysis_id += 1;
        let analysis = MultiScenarioAnalysis {
            analysis_id: AnalysisId(state.last_analysis_id),
            name,
            scenario_ids,
            created_at: Utc::now(),
        };
        state
            .analyses
            .insert(analysis.analysis_id, analysis.clone());

        Ok(analysis)
    }

    fn scenario(&self, scenario_id: ScenarioId) -> Result<Scenario, StoreError> {
        self.state
            .read()
            .scenarios
            .get(&scenario_id)
            .cloned()
            .ok_or(StoreError::ScenarioNotFound(scenario_id))
    }

    fn analysis(&self, analysis_id: AnalysisId) -> Result<MultiScenarioAnalysis, StoreError> {
        self.state
            .read()
            .analyses
            .get(&analysis_id)
            .cloned()
            .ok_or(StoreError::AnalysisNotFound(analysis_id))
    }

    fn report(&self, scenario_id: ScenarioId) -> Result<Option<Report>, StoreError> {
        let state = self.state.read();
        let scenario = state
            .scenarios
            .get(&scenario_id)
            .ok_or(StoreError::ScenarioNotFound(scenario_id))?;

        Ok(scenario
            .result_ref
            .as_ref()
            .and_then(|result_ref| state.reports.get(result_ref))
            .cloned())
    }

    fn list_scenarios(&self) -> Result<Vec<Scenario>, StoreError> {
        Ok(self.state.read().scenarios.values().rev().cloned().collect())
    }

    fn list_analyses(&self) -> Result<Vec<MultiScenarioAnalysis>, StoreError> {
        Ok(self.state.read().analyses.values().rev().cloned().collect())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut state = self.state.write();
        state.scenarios.clear();
        state.analyses.clear();
        state.reports.clear();
        Ok(())
    }
}
