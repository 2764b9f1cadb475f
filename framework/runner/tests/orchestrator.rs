use hpath_core::prelude::CancelListener;
use hpath_model::DayThresholds;
use hpath_model::{
    AnalysisId, Config, ErrorKind, MonitorTrace, NamedTrace, ResourceTraces, ScenarioId,
    ScenarioStatus, SharedParams, SimulationOutput, SpecimenRecord, Stage, TOTAL_WIP,
};
use hpath_runner::prelude::*;
use hpath_summariser::AggregateError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const RESOURCE: &str = "Cut-up assistant";

/// Engine producing a small, fully determined lab day from its parameters:
/// - `staff`: capacity of the only resource
/// - `sleep_ms`: time spent on each replication
/// - `gated`: hold each replication until the scenario is let through with [LabEngine::open]
/// - `ignore_cancel`: keep running after being cancelled
/// - `fail`: fail every replication
#[derive(Default)]
struct LabEngine {
    running: AtomicUsize,
    peak: AtomicUsize,
    opened: Mutex<HashSet<String>>,
}

impl LabEngine {
    fn open(&self, scenario: &str) {
        self.opened.lock().insert(scenario.to_string());
    }

    /// Most replications ever running at the same time
    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn hold(
        &self,
        config: &Config,
        replication: u32,
        cancel: &CancelListener,
    ) -> Result<(), SimulationError> {
        let sleep = Duration::from_millis(
            config
                .params
                .get("sleep_ms")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
        );
        let flag = |name: &str| config.params.get(name).and_then(|v| v.as_bool()) == Some(true);

        let started = Instant::now();
        while started.elapsed() < sleep
            || (flag("gated") && !self.opened.lock().contains(&config.name))
        {
            if cancel.is_cancelled() && !flag("ignore_cancel") {
                return Err(SimulationError::Interrupted { replication });
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }

    fn simulate(
        &self,
        config: &Config,
        replication: u32,
        cancel: &CancelListener,
    ) -> Result<SimulationOutput, SimulationError> {
        self.hold(config, replication, cancel)?;
        if config.params.get("fail").and_then(|v| v.as_bool()) == Some(true) {
            return Err(SimulationError::Engine {
                replication,
                message: "the rota has no staff".to_string(),
            });
        }
        let staff = config
            .params
            .get("staff")
            .and_then(|v| v.as_f64())
            .unwrap_or(2.0);

        let mut wips = vec![NamedTrace {
            name: TOTAL_WIP.to_string(),
            trace: trace(&[(0.0, 0.0), (1.0, 4.0), (20.0, 1.0)]),
        }];
        wips.extend(Stage::ALL.iter().map(|stage| NamedTrace {
            name: stage.to_string(),
            trace: trace(&[(0.0, 0.0), (2.0, 1.0)]),
        }));

        let mut specimens = BTreeMap::new();
        for i in 0..8 {
            let mut record = SpecimenRecord::new();
            let mut t = i as f64;
            for stage in Stage::ALL {
                record.insert(stage.start_event(), t);
                t += 1.0 + replication as f64 + i as f64 / staff;
                record.insert(stage.end_event(), t);
            }
            specimens.insert(format!("specimen.{i}"), record);
        }
        specimens.insert(
            "init.specimen.0".to_string(),
            SpecimenRecord::new().with_event("reception_start", 0.0),
        );

        Ok(SimulationOutput {
            wips,
            resources: vec![ResourceTraces {
                name: RESOURCE.to_string(),
                capacity: trace(&[(0.0, staff)]),
                claimed: trace(&[(0.0, 0.0), (8.0, staff / 2.0), (16.0, 0.0)]),
                queue_length: trace(&[(0.0, 0.0), (9.0, 2.0), (10.0, 0.0)]),
            }],
            specimens,
        })
    }
}

fn trace(samples: &[(f64, f64)]) -> MonitorTrace {
    MonitorTrace::new(samples.to_vec()).unwrap()
}

impl SimulationEngine for LabEngine {
    fn run(
        &self,
        config: &Config,
        replication: u32,
        cancel: &CancelListener,
    ) -> Result<SimulationOutput, SimulationError> {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        let result = self.simulate(config, replication, cancel);
        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn start_with(
    engine: Arc<LabEngine>,
    workers: usize,
    queue_capacity: usize,
    job_timeout: Duration,
) -> Orchestrator {
    env_logger::try_init().ok();

    Orchestrator::start(
        RunnerConfig::default()
            .with_workers(workers)
            .with_queue_capacity(queue_capacity)
            .with_job_timeout(job_timeout),
        Arc::new(InMemoryStore::new()),
        engine,
    )
    .unwrap()
}

fn start(workers: usize, queue_capacity: usize, job_timeout: Duration) -> Orchestrator {
    start_with(
        Arc::new(LabEngine::default()),
        workers,
        queue_capacity,
        job_timeout,
    )
}

fn upload(name: &str, contents: &str) -> UploadedScenario {
    UploadedScenario {
        sc_name: name.to_string(),
        file_name: format!("{name}.toml"),
        file_base64: to_data_url(contents),
        decode_len_str: format!("{} B", contents.len()),
    }
}

fn request_with(
    scenarios: Vec<UploadedScenario>,
    sim_hours: u32,
    num_reps: u32,
) -> SubmissionRequest {
    SubmissionRequest {
        name: None,
        scenarios,
        params: SharedParams {
            sim_hours,
            num_reps,
            confidence_intervals: true,
        },
    }
}

fn request(scenarios: Vec<UploadedScenario>) -> SubmissionRequest {
    request_with(scenarios, 24, 2)
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(30);
    while !condition() {
        assert!(Instant::now() < deadline, "Timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn wait_for_status(orchestrator: &Orchestrator, scenario_id: ScenarioId, status: ScenarioStatus) {
    wait_until(&format!("scenario {scenario_id} to be {status}"), || {
        orchestrator.scenario_status(scenario_id) == Ok(status)
    });
}

fn wait_for_analysis(orchestrator: &Orchestrator, analysis_id: AnalysisId, status: ScenarioStatus) {
    wait_until(&format!("analysis {analysis_id} to be {status}"), || {
        orchestrator.analysis_status(analysis_id) == Ok(status)
    });
}

#[test]
fn scenario_goes_pending_running_done() {
    let engine = Arc::new(LabEngine::default());
    let orchestrator = start_with(engine.clone(), 1, 16, Duration::from_secs(60));

    // Occupy the only worker so the next scenario has to wait in the queue
    let busy = orchestrator
        .submit(&request_with(vec![upload("busy", "gated = true\n")], 24, 1))
        .unwrap();
    wait_for_status(&orchestrator, busy[0], ScenarioStatus::Running);

    let ids = orchestrator
        .submit(&request_with(
            vec![upload("baseline", "staff = 4.0\ngated = true\n")],
            24,
            1,
        ))
        .unwrap();
    let id = ids[0];
    assert_eq!(orchestrator.scenario_status(id), Ok(ScenarioStatus::Pending));
    assert!(matches!(
        orchestrator.scenario_results(id),
        Err(ResultsError::NotReady {
            status: ScenarioStatus::Pending,
            ..
        })
    ));

    engine.open("busy");
    wait_for_status(&orchestrator, id, ScenarioStatus::Running);
    assert!(matches!(
        orchestrator.scenario_results(id),
        Err(ResultsError::NotReady {
            status: ScenarioStatus::Running,
            ..
        })
    ));

    engine.open("baseline");
    wait_for_status(&orchestrator, id, ScenarioStatus::Done);

    let report = orchestrator.scenario_results(id).unwrap();
    for chart in [
        &report.wip_by_stage,
        &report.hourly_utilization_by_resource,
        &report.hourly_q_length_by_resource,
    ] {
        assert_eq!(chart.x.len(), 25);
        assert!(chart.y.iter().all(|series| series.len() == 25));
    }
    assert_eq!(
        report.tat_by_stage.labels(),
        Stage::ALL.iter().map(|s| s.to_string()).collect::<Vec<_>>()
    );
    // A single replication has no spread
    assert_eq!(report.overall_tat_min, Some(report.overall_tat));
    assert_eq!(report.overall_tat_max, Some(report.overall_tat));

    orchestrator.shutdown().unwrap();
}

#[test]
fn timed_out_runs_stay_within_the_worker_count() {
    let engine = Arc::new(LabEngine::default());
    let orchestrator = start_with(engine.clone(), 2, 16, Duration::from_millis(50));

    let ids = orchestrator
        .submit(&request_with(
            (0..6)
                .map(|i| {
                    upload(
                        &format!("stubborn {i}"),
                        "sleep_ms = 300\nignore_cancel = true\n",
                    )
                })
                .collect(),
            24,
            1,
        ))
        .unwrap();

    for id in &ids {
        wait_for_status(&orchestrator, *id, ScenarioStatus::Error);
        match orchestrator.scenario_results(*id) {
            Err(ResultsError::Failed { failure, .. }) => {
                assert_eq!(failure.kind, ErrorKind::Timeout)
            }
            other => panic!("Expected a timeout, got {other:?}"),
        }
    }
    assert!(engine.peak() <= 2, "peak of {} runs", engine.peak());

    orchestrator.shutdown().unwrap();
}

#[test]
fn scenario_runs_to_completion() {
    let orchestrator = start(2, 16, Duration::from_secs(60));

    let ids = orchestrator
        .submit(&request(vec![upload("baseline", "staff = 4.0\nsleep_ms = 200\n")]))
        .unwrap();
    assert_eq!(ids.len(), 1);
    let id = ids[0];

    wait_for_status(&orchestrator, id, ScenarioStatus::Running);
    assert!(matches!(
        orchestrator.scenario_results(id),
        Err(ResultsError::NotReady { .. })
    ));
    wait_for_status(&orchestrator, id, ScenarioStatus::Done);

    let report = orchestrator.scenario_results(id).unwrap();
    assert!(report.overall_tat >= 0.0);
    assert!(report.lab_tat <= report.overall_tat);
    for (_, proportion) in report.progress.iter().chain(report.lab_progress.iter()) {
        assert!((0.0..=1.0).contains(&proportion));
    }
    let hourly = &report.hourly_utilization_by_resource;
    assert_eq!(hourly.x.len(), 25);
    assert_eq!(hourly.series(RESOURCE).map(|s| s.len()), Some(25));
    assert_eq!(report.hourly_q_length_by_resource.x.len(), 25);

    // Replications differ so the bounds have width
    let (min, max) = (report.overall_tat_min.unwrap(), report.overall_tat_max.unwrap());
    assert!(min < report.overall_tat && report.overall_tat < max);

    let rows = orchestrator.list_scenarios().unwrap();
    assert_eq!(rows[0].scenario_id, id);
    assert_eq!(rows[0].status, ScenarioStatus::Done);
    assert_eq!(rows[0].overall_tat, Some(report.overall_tat));

    orchestrator.shutdown().unwrap();
}

#[test]
fn failing_scenario_leaves_siblings_running() {
    let orchestrator = start(2, 16, Duration::from_secs(60));

    let ids = orchestrator
        .submit(&request(vec![
            upload("baseline", "staff = 4.0\n"),
            upload("broken", "fail = true\n"),
            upload("more staff", "staff = 8.0\n"),
        ]))
        .unwrap();

    wait_for_status(&orchestrator, ids[0], ScenarioStatus::Done);
    wait_for_status(&orchestrator, ids[1], ScenarioStatus::Error);
    wait_for_status(&orchestrator, ids[2], ScenarioStatus::Done);

    match orchestrator.scenario_results(ids[1]) {
        Err(ResultsError::Failed {
            scenario_id,
            failure,
        }) => {
            assert_eq!(scenario_id, ids[1]);
            assert_eq!(failure.kind, ErrorKind::Simulation);
            assert!(failure.message.contains("the rota has no staff"));
        }
        other => panic!("Expected a failure, got {other:?}"),
    }

    orchestrator.shutdown().unwrap();
}

#[test]
fn invalid_submission_creates_nothing() {
    let orchestrator = start(1, 16, Duration::from_secs(60));

    let err = orchestrator
        .submit(&request(vec![
            upload("baseline", "staff = 4.0\n"),
            upload("negative", "staff = -1\n"),
        ]))
        .unwrap_err();

    let api_error = ApiError::from(&err);
    assert_eq!(api_error.status, 400);
    assert_eq!(api_error.body.kind, ErrorKind::Validation);
    assert!(api_error.body.msg.contains("negative.toml"));
    assert!(orchestrator.list_scenarios().unwrap().is_empty());

    orchestrator.shutdown().unwrap();
}

#[test]
fn full_queue_rejects_the_whole_batch() {
    let orchestrator = start(1, 2, Duration::from_secs(60));

    let err = orchestrator
        .submit(&request(vec![
            upload("a", "staff = 1.0\n"),
            upload("b", "staff = 2.0\n"),
            upload("c", "staff = 3.0\n"),
        ]))
        .unwrap_err();

    assert!(matches!(err, SubmitError::Queue(QueueError::Full { .. })));
    let api_error = ApiError::from(&err);
    assert_eq!(api_error.status, 503);
    assert_eq!(api_error.body.kind, ErrorKind::QueueDispatch);
    assert!(orchestrator.list_scenarios().unwrap().is_empty());

    // A batch that fits is still accepted
    let ids = orchestrator
        .submit(&request(vec![upload("a", "staff = 1.0\n")]))
        .unwrap();
    wait_for_status(&orchestrator, ids[0], ScenarioStatus::Done);

    orchestrator.shutdown().unwrap();
}

#[test]
fn analysis_compares_its_members() {
    let orchestrator = start(2, 16, Duration::from_secs(60));

    let mut submission = request(vec![
        upload("two staff", "staff = 2.0\n"),
        upload("four staff", "staff = 4.0\n"),
    ]);
    submission.name = Some("Staffing".to_string());
    let analysis_id = orchestrator.submit_multi(&submission).unwrap();
    let members = orchestrator.analysis_members(analysis_id).unwrap();
    assert_eq!(members.len(), 2);

    wait_for_analysis(&orchestrator, analysis_id, ScenarioStatus::Done);
    let multi = orchestrator.analysis_results(analysis_id).unwrap();

    assert_eq!(multi.scenario_ids, members);
    assert_eq!(
        multi.mean_tat.labels(),
        members.iter().map(|id| id.to_string()).collect::<Vec<_>>()
    );
    // More staff clears the work faster
    assert!(multi.mean_tat.y[1] < multi.mean_tat.y[0]);
    assert_eq!(multi.utilization[RESOURCE].y.len(), 2);
    assert_eq!(multi.hourly_utilization[RESOURCE].x.len(), 25);
    assert!(multi.mean_tat_bounds.is_some());

    let rows = orchestrator.list_analyses().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "Staffing");
    assert_eq!(rows[0].status, ScenarioStatus::Done);

    orchestrator.shutdown().unwrap();
}

#[test]
fn analysis_with_failed_member_is_an_error() {
    let orchestrator = start(2, 16, Duration::from_secs(60));

    let analysis_id = orchestrator
        .submit_multi(&request(vec![
            upload("baseline", "staff = 4.0\n"),
            upload("broken", "fail = true\n"),
        ]))
        .unwrap();
    let members = orchestrator.analysis_members(analysis_id).unwrap();

    wait_for_analysis(&orchestrator, analysis_id, ScenarioStatus::Error);
    match orchestrator.analysis_results(analysis_id) {
        Err(ResultsError::Aggregate(AggregateError::MemberFailed { failed })) => {
            assert_eq!(failed, vec![members[1]]);
        }
        other => panic!("Expected a failed member, got {other:?}"),
    }

    orchestrator.shutdown().unwrap();
}

#[test]
fn slow_scenario_times_out() {
    let orchestrator = start(1, 16, Duration::from_millis(200));

    let ids = orchestrator
        .submit(&request(vec![
            upload("slow", "sleep_ms = 2000\n"),
            upload("fast", "staff = 4.0\n"),
        ]))
        .unwrap();

    wait_for_status(&orchestrator, ids[0], ScenarioStatus::Error);
    match orchestrator.scenario_results(ids[0]) {
        Err(ResultsError::Failed { failure, .. }) => assert_eq!(failure.kind, ErrorKind::Timeout),
        other => panic!("Expected a timeout, got {other:?}"),
    }

    // The run is stopped and the worker moves on
    wait_for_status(&orchestrator, ids[1], ScenarioStatus::Done);

    orchestrator.shutdown().unwrap();
}

#[test]
fn deleting_a_running_scenario_cancels_it() {
    let orchestrator = start(1, 16, Duration::from_secs(60));

    let ids = orchestrator
        .submit(&request(vec![
            upload("slow", "sleep_ms = 1000\n"),
            upload("queued", "staff = 4.0\n"),
        ]))
        .unwrap();
    wait_for_status(&orchestrator, ids[0], ScenarioStatus::Running);

    orchestrator.delete_scenario(ids[0]).unwrap();
    assert_eq!(
        orchestrator.scenario_status(ids[0]),
        Err(StoreError::ScenarioNotFound(ids[0]))
    );
    assert_eq!(
        orchestrator.delete_scenario(ids[0]),
        Err(StoreError::ScenarioNotFound(ids[0]))
    );

    wait_for_status(&orchestrator, ids[1], ScenarioStatus::Done);

    orchestrator.shutdown().unwrap();
}

#[test]
fn deleting_a_queued_scenario_skips_it() {
    let orchestrator = start(1, 16, Duration::from_secs(60));

    let mut submission = request(vec![
        upload("slow", "sleep_ms = 300\n"),
        upload("queued", "staff = 4.0\n"),
    ]);
    submission.name = Some("Partly deleted".to_string());
    let analysis_id = orchestrator.submit_multi(&submission).unwrap();
    let ids = orchestrator.analysis_members(analysis_id).unwrap();

    wait_for_status(&orchestrator, ids[0], ScenarioStatus::Running);
    assert_eq!(
        orchestrator.scenario_status(ids[1]),
        Ok(ScenarioStatus::Pending)
    );
    orchestrator.delete_scenario(ids[1]).unwrap();

    wait_for_status(&orchestrator, ids[0], ScenarioStatus::Done);
    // A member that no longer exists fails the analysis
    assert_eq!(
        orchestrator.analysis_status(analysis_id),
        Ok(ScenarioStatus::Error)
    );
    assert_eq!(orchestrator.list_scenarios().unwrap().len(), 1);

    orchestrator.shutdown().unwrap();
}

#[test]
fn ping_and_reset() {
    let orchestrator = start(1, 16, Duration::from_secs(60));
    assert_eq!(orchestrator.ping(), "PONG");

    let first = orchestrator
        .submit(&request(vec![
            upload("slow", "sleep_ms = 500\n"),
            upload("queued", "staff = 4.0\n"),
        ]))
        .unwrap();
    wait_for_status(&orchestrator, first[0], ScenarioStatus::Running);

    orchestrator.reset().unwrap();
    assert!(orchestrator.list_scenarios().unwrap().is_empty());
    assert!(orchestrator.list_analyses().unwrap().is_empty());

    let second = orchestrator
        .submit(&request(vec![upload("again", "staff = 4.0\n")]))
        .unwrap();
    assert!(second[0] > first[1]);
    wait_for_status(&orchestrator, second[0], ScenarioStatus::Done);
    assert_eq!(orchestrator.list_scenarios().unwrap().len(), 1);

    orchestrator.shutdown().unwrap();
}
