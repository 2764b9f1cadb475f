use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::scenario::ScenarioId;

/// A value on a chart's x axis: a category label or a number such as an hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisValue {
    Number(f64),
    Label(String),
}

impl From<f64> for AxisValue {
    fn from(value: f64) -> Self {
        AxisValue::Number(value)
    }
}

impl From<String> for AxisValue {
    fn from(value: String) -> Self {
        AxisValue::Label(value)
    }
}

impl From<&str> for AxisValue {
    fn from(value: &str) -> Self {
        AxisValue::Label(value.to_string())
    }
}

/// Single series chart payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChartData {
    pub x: Vec<AxisValue>,
    pub y: Vec<f64>,
}

impl ChartData {
    pub fn new<X>(x: impl IntoIterator<Item = X>, y: Vec<f64>) -> Self
    where
        X: Into<AxisValue>,
    {
        Self {
            x: x.into_iter().map(Into::into).collect(),
            y,
        }
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Labels of a categorical x axis, numbers are rendered as text.
    pub fn labels(&self) -> Vec<String> {
        self.x
            .iter()
            .map(|x| match x {
                AxisValue::Label(label) => label.clone(),
                AxisValue::Number(n) => n.to_string(),
            })
            .collect()
    }
}

/// Multi series chart payload sharing one x axis. `y[i]` is the series named `labels[i]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MultiChartData {
    pub x: Vec<AxisValue>,
    pub labels: Vec<String>,
    pub y: Vec<Vec<f64>>,
}

impl MultiChartData {
    pub fn series(&self, label: &str) -> Option<&[f64]> {
        self.labels
            .iter()
            .position(|l| l == label)
            .and_then(|i| self.y.get(i))
            .map(Vec::as_slice)
    }
}

/// Fixed schema record holding one proportion per day threshold.
pub trait DayThresholds: Sized {
    /// Day thresholds in increasing order
    const DAYS: &'static [u32];

    /// Build from one value per threshold in [DayThresholds::DAYS] order, `None` on a length
    /// mismatch.
    fn from_values(values: &[f64]) -> Option<Self>;

    fn values(&self) -> Vec<f64>;

    fn from_fn(mut f: impl FnMut(u32) -> f64) -> Self {
        let values: Vec<f64> = Self::DAYS.iter().map(|&days| f(days)).collect();
        match Self::from_values(&values) {
            Some(record) => record,
            None => unreachable!("one value is produced per threshold"),
        }
    }

    fn iter(&self) -> impl Iterator<Item = (u32, f64)> {
        Self::DAYS.iter().copied().zip(self.values())
    }
}

/// Proportion of specimens whose overall TAT is within 7, 10, 12 and 21 days.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Progress {
    #[serde(rename = "7")]
    pub within_7_days: f64,
    #[serde(rename = "10")]
    pub within_10_days: f64,
    #[serde(rename = "12")]
    pub within_12_days: f64,
    #[serde(rename = "21")]
    pub within_21_days: f64,
}

impl DayThresholds for Progress {
    const DAYS: &'static [u32] = &[7, 10, 12, 21];

    fn from_values(values: &[f64]) -> Option<Self> {
        match values {
            &[within_7_days, within_10_days, within_12_days, within_21_days] => Some(Self {
                within_7_days,
                within_10_days,
                within_12_days,
                within_21_days,
            }),
            _ => None,
        }
    }

    fn values(&self) -> Vec<f64> {
        vec![
            self.within_7_days,
            self.within_10_days,
            self.within_12_days,
            self.within_21_days,
        ]
    }
}

/// Proportion of specimens whose lab component is completed within 3 days.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LabProgress {
    #[serde(rename = "3")]
    pub within_3_days: f64,
}

impl DayThresholds for LabProgress {
    const DAYS: &'static [u32] = &[3];

    fn from_values(values: &[f64]) -> Option<Self> {
        match values {
            &[within_3_days] => Some(Self { within_3_days }),
            _ => None,
        }
    }

    fn values(&self) -> Vec<f64> {
        vec![self.within_3_days]
    }
}

/// KPIs for one scenario, shaped for the visualisation frontend.
///
/// TATs are in hours. The `_min`/`_max` fields are only set when the scenario was configured with
/// confidence intervals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub overall_tat: f64,
    pub lab_tat: f64,
    pub progress: Progress,
    pub lab_progress: LabProgress,
    /// Mean time spent in each stage
    pub tat_by_stage: ChartData,
    /// Allocated capacity over time, per resource
    pub resource_allocation: BTreeMap<String, ChartData>,
    /// Hourly mean WIP, one series per stage
    pub wip_by_stage: MultiChartData,
    /// Mean utilisation per resource
    pub utilization_by_resource: ChartData,
    /// Mean queue length per resource, relative to its capacity
    pub q_length_by_resource: ChartData,
    /// Hourly mean utilisation, one series per resource
    pub hourly_utilization_by_resource: MultiChartData,
    /// Hourly mean queue length, one series per resource
    pub hourly_q_length_by_resource: MultiChartData,

    #[serde(default)]
    pub overall_tat_min: Option<f64>,
    #[serde(default)]
    pub overall_tat_max: Option<f64>,
    #[serde(default)]
    pub lab_tat_min: Option<f64>,
    #[serde(default)]
    pub lab_tat_max: Option<f64>,
    #[serde(default)]
    pub progress_min: Option<Progress>,
    #[serde(default)]
    pub progress_max: Option<Progress>,
    #[serde(default)]
    pub lab_progress_min: Option<LabProgress>,
    #[serde(default)]
    pub lab_progress_max: Option<LabProgress>,
}

/// Lower and upper bounds for every bar of a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartBounds {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

/// Comparative KPIs across the scenarios of a multi-scenario analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiReport {
    /// Member scenarios, in the order used on every chart
    pub scenario_ids: Vec<ScenarioId>,
    /// Overall mean TAT per scenario
    pub mean_tat: ChartData,
    /// Bounds on the mean TATs, present when every member report carries them
    #[serde(default)]
    pub mean_tat_bounds: Option<ChartBounds>,
    /// Mean utilisation per scenario, one chart per resource
    pub utilization: BTreeMap<String, ChartData>,
    /// Hourly utilisation with one series per scenario, one chart per resource
    pub hourly_utilization: BTreeMap<String, MultiChartData>,
}
