use hpath_model::ScenarioId;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

use crate::orchestrator::Orchestrator;

/// Block until every scenario is terminal, or `limit` elapses, showing how many are finished.
///
/// A scenario that disappears from the store counts as finished. Returns the number of finished
/// scenarios.
pub fn wait_for_scenarios(
    orchestrator: &Orchestrator,
    scenario_ids: &[ScenarioId],
    limit: Duration,
    show_progress: bool,
) -> anyhow::Result<usize> {
    let pb = if show_progress {
        let pb = ProgressBar::new(scenario_ids.len() as u64);
        pb.set_style(
            ProgressStyle::with_template(concat!(
                "{spinner:.green} [{wide_bar:.cyan/blue}] ",
                "{pos}/{len} scenarios [{elapsed_precise}]"
            ))?
            .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let start_time = Instant::now();
    loop {
        let finished = scenario_ids
            .iter()
            .filter(|id| {
                orchestrator
                    .scenario_status(**id)
                    .map(|status| status.is_terminal())
                    .unwrap_or(true)
            })
            .count();
        pb.set_position(finished as u64);

        if finished == scenario_ids.len() || start_time.elapsed() >= limit {
            pb.finish_and_clear();
            return Ok(finished);
        }
        std::thread::sleep(Duration::from_millis(250));
    }
}
