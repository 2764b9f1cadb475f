use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use hpath_model::ScenarioStatus;
use hpath_runner::prelude::*;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tabled::settings::Style;
use tabled::Table;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = RunnerCli::parse();

    let request: SubmissionRequest = serde_json::from_reader(BufReader::new(
        File::open(&cli.submission)
            .with_context(|| format!("Failed to open {}", cli.submission.display()))?,
    ))
    .with_context(|| format!("Failed to read submission {}", cli.submission.display()))?;

    let engine = match &cli.engine {
        Some(program) => ProcessEngine::new(program, cli.engine_arg.clone()),
        None => ProcessEngine::from_env()?,
    };
    let store: Arc<dyn ResultStore> = match &cli.journal {
        Some(journal) => Arc::new(InMemoryStore::with_journal(journal)),
        None => Arc::new(InMemoryStore::new()),
    };
    let config = cli.runner_config();
    let job_timeout = config.job_timeout;
    let orchestrator = Orchestrator::start(config, store, Arc::new(engine))?;

    let submitted = if cli.multi {
        orchestrator.submit_multi(&request).and_then(|analysis_id| {
            let members = orchestrator.analysis_members(analysis_id)?;
            Ok((Some(analysis_id), members))
        })
    } else {
        orchestrator.submit(&request).map(|ids| (None, ids))
    };
    let (analysis_id, scenario_ids) = match submitted {
        Ok(submitted) => submitted,
        Err(e) => {
            let api_error = ApiError::from(&e);
            eprintln!("{}", serde_json::to_string_pretty(&api_error.body)?);
            orchestrator.shutdown()?;
            anyhow::bail!("Submission rejected with status {}", api_error.status);
        }
    };

    // Every job is bounded by the timeout, give the whole batch as long as it could need
    let limit = job_timeout * scenario_ids.len().max(1) as u32;
    let finished = wait_for_scenarios(&orchestrator, &scenario_ids, limit, !cli.no_progress)?;
    if finished < scenario_ids.len() {
        log::warn!(
            "Only {finished} of {} scenarios finished in time",
            scenario_ids.len()
        );
    }

    let mut table = Table::new(orchestrator.list_scenarios()?);
    table.with(Style::modern());
    println!("{table}");

    let timestamp = Utc::now().format("%Y-%m-%dT%H.%M.%S%.fZ").to_string();
    for scenario_id in &scenario_ids {
        match orchestrator.scenario_results(*scenario_id) {
            Ok(report) => {
                let path = cli
                    .output_dir
                    .join(format!("report-{scenario_id}-{timestamp}.json"));
                write_json(&path, &report)?;
                log::info!("Wrote report for scenario {scenario_id} to {}", path.display());
            }
            Err(e) => log::error!("No report for scenario {scenario_id}: {e}"),
        }
    }

    if let Some(analysis_id) = analysis_id {
        match orchestrator.analysis_results(analysis_id) {
            Ok(multi_report) => {
                let path = cli
                    .output_dir
                    .join(format!("multi-report-{analysis_id}-{timestamp}.json"));
                write_json(&path, &multi_report)?;
                log::info!("Wrote analysis {analysis_id} to {}", path.display());
            }
            Err(e) => log::error!("No comparison for analysis {analysis_id}: {e}"),
        }
    }

    let failed = scenario_ids
        .iter()
        .filter(|id| !matches!(orchestrator.scenario_status(**id), Ok(ScenarioStatus::Done)))
        .count();
    orchestrator.shutdown()?;

    if failed > 0 {
        anyhow::bail!("{failed} of {} scenarios did not complete", scenario_ids.len());
    }

    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let file = File::create_new(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}
