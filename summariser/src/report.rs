use hpath_model::{ChartData, Config, DayThresholds, MultiChartData, Report, SimulationOutput};
use itertools::Itertools;

use crate::analyze::{replication_stats, ReplicationStats};
use crate::error::KpiError;
use crate::kpi::{replication_kpis, RunKpis};

/// Compute the report of a scenario from the outputs of all of its replications.
pub fn report_for_outputs(
    config: &Config,
    outputs: &[SimulationOutput],
) -> Result<Report, KpiError> {
    let runs = outputs
        .iter()
        .map(|output| replication_kpis(output, config.sim_hours))
        .collect::<Result<Vec<_>, _>>()?;
    log::debug!(
        "Computed KPIs for {} replications of {}",
        runs.len(),
        config.name
    );

    build_report(&runs, config.confidence_intervals)
}

/// Combine per replication KPIs into one report.
///
/// Scalars and distributions are averaged across replications, hourly series are averaged hour by
/// hour. Allocation series are taken from the first replication because a rota is identical in
/// every replication. With `confidence_intervals` the `_min`/`_max` fields carry 95% bounds on the
/// averaged values.
pub fn build_report(runs: &[RunKpis], confidence_intervals: bool) -> Result<Report, KpiError> {
    let first = runs.first().ok_or(KpiError::NoReplications)?;

    let overall_tat = scalar_stats(runs, |r| r.overall_tat)?;
    let lab_tat = scalar_stats(runs, |r| r.lab_tat)?;
    let progress = threshold_stats(runs, |r| r.progress.values())?;
    let lab_progress = threshold_stats(runs, |r| r.lab_progress.values())?;

    let mut report = Report {
        overall_tat: overall_tat.mean,
        lab_tat: lab_tat.mean,
        progress: from_stats(&progress, |s| s.mean),
        lab_progress: from_stats(&lab_progress, |s| s.mean),
        tat_by_stage: mean_stage_tats(runs)?,
        resource_allocation: first.resource_allocation.clone(),
        wip_by_stage: mean_multi_chart(runs, "wip_by_stage", |r| &r.wip_by_stage)?,
        utilization_by_resource: mean_chart(runs, "utilization_by_resource", |r| {
            &r.utilization_by_resource
        })?,
        q_length_by_resource: mean_chart(runs, "q_length_by_resource", |r| {
            &r.q_length_by_resource
        })?,
        hourly_utilization_by_resource: mean_multi_chart(
            runs,
            "hourly_utilization_by_resource",
            |r| &r.hourly_utilization_by_resource,
        )?,
        hourly_q_length_by_resource: mean_multi_chart(runs, "hourly_q_length_by_resource", |r| {
            &r.hourly_q_length_by_resource
        })?,
        overall_tat_min: None,
        overall_tat_max: None,
        lab_tat_min: None,
        lab_tat_max: None,
        progress_min: None,
        progress_max: None,
        lab_progress_min: None,
        lab_progress_max: None,
    };

    if confidence_intervals {
        let (min, max) = overall_tat.bounds(0.0, f64::INFINITY);
        report.overall_tat_min = Some(min);
        report.overall_tat_max = Some(max);

        let (min, max) = lab_tat.bounds(0.0, f64::INFINITY);
        report.lab_tat_min = Some(min);
        report.lab_tat_max = Some(max);

        report.progress_min = Some(from_stats(&progress, |s| s.bounds(0.0, 1.0).0));
        report.progress_max = Some(from_stats(&progress, |s| s.bounds(0.0, 1.0).1));
        report.lab_progress_min = Some(from_stats(&lab_progress, |s| s.bounds(0.0, 1.0).0));
        report.lab_progress_max = Some(from_stats(&lab_progress, |s| s.bounds(0.0, 1.0).1));
    }

    Ok(report)
}

fn scalar_stats(
    runs: &[RunKpis],
    value: impl Fn(&RunKpis) -> f64,
) -> Result<ReplicationStats, KpiError> {
    replication_stats(&runs.iter().map(value).collect::<Vec<_>>())
}

/// Stats for every threshold of a distribution, in threshold order.
fn threshold_stats(
    runs: &[RunKpis],
    values: impl Fn(&RunKpis) -> Vec<f64>,
) -> Result<Vec<ReplicationStats>, KpiError> {
    let per_run = runs.iter().map(values).collect::<Vec<_>>();
    let thresholds = per_run.first().map(Vec::len).unwrap_or_default();
    (0..thresholds)
        .map(|i| replication_stats(&per_run.iter().map(|v| v[i]).collect::<Vec<_>>()))
        .collect()
}

fn from_stats<P: DayThresholds>(
    stats: &[ReplicationStats],
    f: impl Fn(&ReplicationStats) -> f64,
) -> P {
    let mut values = stats.iter().map(f);
    P::from_fn(|_| values.next().unwrap_or_default())
}

/// Mean stage TAT across the replications in which the stage was observed, stages in the order
/// they are first seen.
fn mean_stage_tats(runs: &[RunKpis]) -> Result<ChartData, KpiError> {
    let stages = runs
        .iter()
        .flat_map(|r| r.tat_by_stage.labels())
        .unique()
        .collect_vec();

    let mut labels = Vec::new();
    let mut means = Vec::new();
    for label in stages {
        let observed = runs
            .iter()
            .filter_map(|r| {
                r.tat_by_stage
                    .labels()
                    .iter()
                    .position(|l| *l == label)
                    .and_then(|i| r.tat_by_stage.y.get(i).copied())
            })
            .collect::<Vec<_>>();
        if observed.is_empty() {
            continue;
        }
        means.push(replication_stats(&observed)?.mean);
        labels.push(label);
    }

    Ok(ChartData::new(labels, means))
}

fn pointwise_mean(rows: &[&[f64]]) -> Vec<f64> {
    let n = rows.len() as f64;
    match rows.first() {
        None => Vec::new(),
        Some(first) => (0..first.len())
            .map(|i| rows.iter().filter_map(|row| row.get(i)).sum::<f64>() / n)
            .collect(),
    }
}

fn mean_chart(
    runs: &[RunKpis],
    field: &str,
    chart: impl Fn(&RunKpis) -> &ChartData,
) -> Result<ChartData, KpiError> {
    let first = chart(&runs[0]);
    for (replication, run) in runs.iter().enumerate().skip(1) {
        let other = chart(run);
        if other.x != first.x || other.y.len() != first.y.len() {
            return Err(KpiError::ReplicationMismatch {
                replication,
                detail: format!("{field} has labels {:?}", other.labels()),
            });
        }
    }

    let rows = runs.iter().map(|r| chart(r).y.as_slice()).collect_vec();
    Ok(ChartData {
        x: first.x.clone(),
        y: pointwise_mean(&rows),
    })
}

fn mean_multi_chart(
    runs: &[RunKpis],
    field: &str,
    chart: impl Fn(&RunKpis) -> &MultiChartData,
) -> Result<MultiChartData, KpiError> {
    let first = chart(&runs[0]);
    for (replication, run) in runs.iter().enumerate().skip(1) {
        let other = chart(run);
        let points = |c: &MultiChartData| c.y.iter().map(Vec::len).collect_vec();
        if other.labels != first.labels
            || other.x.len() != first.x.len()
            || points(other) != points(first)
        {
            return Err(KpiError::ReplicationMismatch {
                replication,
                detail: format!(
                    "{field} has series {:?} over {} points",
                    other.labels,
                    other.x.len()
                ),
            });
        }
    }

    let y = (0..first.y.len())
        .map(|series| {
            let rows = runs
                .iter()
                .filter_map(|r| chart(r).y.get(series).map(Vec::as_slice))
                .collect_vec();
            pointwise_mean(&rows)
        })
        .collect();

    Ok(MultiChartData {
        x: first.x.clone(),
        labels: first.labels.clone(),
        y,
    })
}
