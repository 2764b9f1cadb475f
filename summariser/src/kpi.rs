use hpath_model::{
    ChartData, LabProgress, MonitorTrace, MultiChartData, NamedTrace, Progress, ResourceTraces,
    SimulationOutput, TraceError,
};
use std::collections::BTreeMap;

use crate::analyze::{lab_tat, overall_tat, tat_by_stage, tat_dist};
use crate::error::KpiError;
use crate::frame::{specimen_frame, LAB_TAT_COL, OVERALL_TAT_COL};
use crate::resample::{hour_axis, resample_hourly};

/// KPIs computed from a single replication of a scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct RunKpis {
    pub overall_tat: f64,
    pub lab_tat: f64,
    pub progress: Progress,
    pub lab_progress: LabProgress,
    pub tat_by_stage: ChartData,
    pub resource_allocation: BTreeMap<String, ChartData>,
    pub wip_by_stage: MultiChartData,
    pub utilization_by_resource: ChartData,
    pub q_length_by_resource: ChartData,
    pub hourly_utilization_by_resource: MultiChartData,
    pub hourly_q_length_by_resource: MultiChartData,
}

/// Compute every KPI of one replication's output over a `sim_hours` horizon.
pub fn replication_kpis(output: &SimulationOutput, sim_hours: u32) -> Result<RunKpis, KpiError> {
    let stages = output.stages();
    let frame = specimen_frame(&output.specimens, &stages)?;
    let horizon = f64::from(sim_hours);

    Ok(RunKpis {
        overall_tat: overall_tat(&frame)?,
        lab_tat: lab_tat(&frame)?,
        progress: tat_dist(&frame, OVERALL_TAT_COL)?,
        lab_progress: tat_dist(&frame, LAB_TAT_COL)?,
        tat_by_stage: tat_by_stage(&frame, &stages)?,
        resource_allocation: output
            .resources
            .iter()
            .map(|r| (r.name.clone(), allocation_series(&r.capacity)))
            .collect(),
        wip_by_stage: wip_hourlies(&output.wips, sim_hours)?,
        utilization_by_resource: utilisation_means(&output.resources, horizon)?,
        q_length_by_resource: q_length_means(&output.resources, horizon)?,
        hourly_utilization_by_resource: utilisation_hourlies(&output.resources, sim_hours)?,
        hourly_q_length_by_resource: q_length_hourlies(&output.resources, sim_hours)?,
    })
}

/// Allocated capacity as recorded, keeping only the last change at each timestamp.
pub fn allocation_series(capacity: &MonitorTrace) -> ChartData {
    let deduped = capacity.dedup_last();
    let (t, values): (Vec<f64>, Vec<f64>) =
        deduped.samples().iter().map(|s| (s.t, s.value)).unzip();
    ChartData::new(t, values)
}

fn checked_mean(name: &str, trace: &MonitorTrace, horizon: f64) -> Result<f64, KpiError> {
    trace
        .ensure_starts_at_zero()
        .map_err(|e| KpiError::trace(name, e))?;
    trace
        .time_weighted_mean(horizon)
        .ok_or_else(|| KpiError::trace(name, TraceError::Empty))
}

/// Ratio of a resource quantity's mean to the resource's mean capacity.
///
/// With zero mean capacity the resource never had anything allocated, so `on_zero_capacity`
/// decides the value from the quantity's own mean.
fn capacity_ratios(
    resources: &[ResourceTraces],
    horizon: f64,
    quantity: impl Fn(&ResourceTraces) -> &MonitorTrace,
    on_zero_capacity: impl Fn(f64) -> f64,
) -> Result<ChartData, KpiError> {
    let mut names = Vec::with_capacity(resources.len());
    let mut ratios = Vec::with_capacity(resources.len());
    for resource in resources {
        let capacity = checked_mean(&resource.name, &resource.capacity, horizon)?;
        let mean = checked_mean(&resource.name, quantity(resource), horizon)?;
        let ratio = if capacity == 0.0 {
            log::warn!(
                "Resource {} had no capacity allocated within the horizon",
                resource.name
            );
            on_zero_capacity(mean)
        } else {
            mean / capacity
        };
        names.push(resource.name.clone());
        ratios.push(ratio);
    }

    Ok(ChartData::new(names, ratios))
}

/// Mean claimed quantity over mean capacity, per resource.
pub fn utilisation_means(
    resources: &[ResourceTraces],
    horizon: f64,
) -> Result<ChartData, KpiError> {
    capacity_ratios(resources, horizon, |r| &r.claimed, |_| 0.0)
}

/// Mean queue length over mean capacity, per resource.
pub fn q_length_means(resources: &[ResourceTraces], horizon: f64) -> Result<ChartData, KpiError> {
    capacity_ratios(resources, horizon, |r| &r.queue_length, |mean| mean)
}

fn hourlies<'a>(
    traces: impl Iterator<Item = (&'a str, &'a MonitorTrace)>,
    sim_hours: u32,
) -> Result<MultiChartData, KpiError> {
    let mut labels = Vec::new();
    let mut y = Vec::new();
    for (name, trace) in traces {
        let series = resample_hourly(trace, sim_hours).map_err(|e| KpiError::trace(name, e))?;
        labels.push(name.to_string());
        y.push(series.values);
    }

    Ok(MultiChartData {
        x: hour_axis(sim_hours).into_iter().map(Into::into).collect(),
        labels,
        y,
    })
}

/// Hourly mean WIP per stage, in the engine's stage order.
pub fn wip_hourlies(wips: &[NamedTrace], sim_hours: u32) -> Result<MultiChartData, KpiError> {
    hourlies(wips.iter().map(|w| (w.name.as_str(), &w.trace)), sim_hours)
}

/// Hourly mean claimed quantity per resource.
pub fn utilisation_hourlies(
    resources: &[ResourceTraces],
    sim_hours: u32,
) -> Result<MultiChartData, KpiError> {
    hourlies(
        resources.iter().map(|r| (r.name.as_str(), &r.claimed)),
        sim_hours,
    )
}

/// Hourly mean queue length per resource.
pub fn q_length_hourlies(
    resources: &[ResourceTraces],
    sim_hours: u32,
) -> Result<MultiChartData, KpiError> {
    hourlies(
        resources.iter().map(|r| (r.name.as_str(), &r.queue_length)),
        sim_hours,
    )
}
