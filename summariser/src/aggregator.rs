use hpath_model::{
    ChartBounds, ChartData, MultiChartData, MultiReport, Report, ScenarioId, ScenarioStatus,
};
use std::collections::BTreeMap;

use crate::error::AggregateError;

/// A member scenario of an analysis, as read from the result store.
#[derive(Debug, Clone)]
pub struct Member {
    pub scenario_id: ScenarioId,
    pub status: ScenarioStatus,
    /// Present once the scenario is done
    pub report: Option<Report>,
}

fn scenario_labels(reports: &[(ScenarioId, &Report)]) -> Vec<String> {
    reports.iter().map(|(id, _)| id.to_string()).collect()
}

/// Overall mean TAT per scenario, labelled by scenario id.
///
/// Bounds are returned only when every report carries them.
pub fn multi_mean_tats(reports: &[(ScenarioId, &Report)]) -> (ChartData, Option<ChartBounds>) {
    let chart = ChartData::new(
        scenario_labels(reports),
        reports.iter().map(|(_, r)| r.overall_tat).collect(),
    );

    let bounds = reports
        .iter()
        .map(|(_, r)| r.overall_tat_min.zip(r.overall_tat_max))
        .collect::<Option<Vec<_>>>()
        .map(|pairs| {
            let (min, max) = pairs.into_iter().unzip();
            ChartBounds { min, max }
        });

    (chart, bounds)
}

fn check_resources(
    reports: &[(ScenarioId, &Report)],
    resources: impl Fn(&Report) -> Vec<String>,
) -> Result<Vec<String>, AggregateError> {
    let Some((_, first)) = reports.first() else {
        return Err(AggregateError::Empty);
    };
    let expected = resources(first);
    for (scenario_id, report) in &reports[1..] {
        let found = resources(report);
        if found != expected {
            return Err(AggregateError::ShapeMismatch {
                scenario_id: *scenario_id,
                detail: format!("resources {found:?}, expected {expected:?}"),
            });
        }
    }
    Ok(expected)
}

fn missing_value(scenario_id: ScenarioId, chart: &str, resource: &str) -> AggregateError {
    AggregateError::ShapeMismatch {
        scenario_id,
        detail: format!("{chart} has no value for resource {resource}"),
    }
}

/// Mean utilisation per scenario, one bar chart per resource.
///
/// Resources are read from the first report and must be the same in every report.
pub fn multi_mean_util(
    reports: &[(ScenarioId, &Report)],
) -> Result<BTreeMap<String, ChartData>, AggregateError> {
    let resources = check_resources(reports, |r| r.utilization_by_resource.labels())?;
    let labels = scenario_labels(reports);

    let mut charts = BTreeMap::new();
    for (idx, resource) in resources.into_iter().enumerate() {
        let y = reports
            .iter()
            .map(|(scenario_id, r)| {
                r.utilization_by_resource
                    .y
                    .get(idx)
                    .copied()
                    .ok_or_else(|| missing_value(*scenario_id, "utilisation", &resource))
            })
            .collect::<Result<Vec<_>, _>>()?;
        charts.insert(resource, ChartData::new(labels.clone(), y));
    }

    Ok(charts)
}

/// Hourly utilisation with one series per scenario, one chart per resource.
///
/// The hour axis is read from the first report and must have the same length in every report.
pub fn multi_util_hourlies(
    reports: &[(ScenarioId, &Report)],
) -> Result<BTreeMap<String, MultiChartData>, AggregateError> {
    let resources = check_resources(reports, |r| {
        r.hourly_utilization_by_resource.labels.clone()
    })?;
    let hours = &reports[0].1.hourly_utilization_by_resource.x;
    for (scenario_id, report) in reports {
        let hourly = &report.hourly_utilization_by_resource;
        if let Some(series) = hourly.y.iter().find(|y| y.len() != hours.len()) {
            return Err(AggregateError::ShapeMismatch {
                scenario_id: *scenario_id,
                detail: format!(
                    "hourly utilisation has {} points, expected {}",
                    series.len(),
                    hours.len()
                ),
            });
        }
    }
    let labels = scenario_labels(reports);

    let mut charts = BTreeMap::new();
    for (idx, resource) in resources.into_iter().enumerate() {
        let y = reports
            .iter()
            .map(|(scenario_id, r)| {
                r.hourly_utilization_by_resource
                    .y
                    .get(idx)
                    .cloned()
                    .ok_or_else(|| missing_value(*scenario_id, "hourly utilisation", &resource))
            })
            .collect::<Result<Vec<_>, _>>()?;
        charts.insert(
            resource,
            MultiChartData {
                x: hours.clone(),
                labels: labels.clone(),
                y,
            },
        );
    }

    Ok(charts)
}

/// Build the comparative report of an analysis from its members, in member order.
///
/// Fails while any member is not yet terminal, and when any member failed.
pub fn aggregate(members: &[Member]) -> Result<MultiReport, AggregateError> {
    if members.is_empty() {
        return Err(AggregateError::Empty);
    }

    let failed = members
        .iter()
        .filter(|m| m.status == ScenarioStatus::Error)
        .map(|m| m.scenario_id)
        .collect::<Vec<_>>();
    if !failed.is_empty() {
        return Err(AggregateError::MemberFailed { failed });
    }

    // A done member without a stored report is treated as not ready
    let pending = members
        .iter()
        .filter(|m| m.status != ScenarioStatus::Done || m.report.is_none())
        .map(|m| m.scenario_id)
        .collect::<Vec<_>>();
    if !pending.is_empty() {
        return Err(AggregateError::NotReady { pending });
    }

    let reports = members
        .iter()
        .filter_map(|m| m.report.as_ref().map(|r| (m.scenario_id, r)))
        .collect::<Vec<_>>();

    let (mean_tat, mean_tat_bounds) = multi_mean_tats(&reports);
    let utilization = multi_mean_util(&reports)?;
    let hourly_utilization = multi_util_hourlies(&reports)?;
    log::debug!(
        "Aggregated {} scenarios over {} resources",
        reports.len(),
        utilization.len()
    );

    Ok(MultiReport {
        scenario_ids: members.iter().map(|m| m.scenario_id).collect(),
        mean_tat,
        mean_tat_bounds,
        utilization,
        hourly_utilization,
    })
}
