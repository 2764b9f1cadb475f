//! KPI engine for histopathology lab simulations.
//!
//! Turns the raw traces recorded by the simulation engine into a [Report] per scenario, and the
//! reports of a multi-scenario analysis into a [MultiReport].
//!
//! [Report]: hpath_model::Report
//! [MultiReport]: hpath_model::MultiReport

mod aggregator;
mod analyze;
mod error;
mod frame;
mod kpi;
mod report;
mod resample;

pub use aggregator::{aggregate, multi_mean_tats, multi_mean_util, multi_util_hourlies, Member};
pub use analyze::{
    lab_tat, overall_tat, replication_stats, tat_by_stage, tat_dist, ReplicationStats,
};
pub use error::{AggregateError, KpiError};
pub use frame::{eligible_specimens, specimen_frame, LAB_TAT_COL, OVERALL_TAT_COL, SPECIMEN_COL};
pub use kpi::{
    allocation_series, q_length_hourlies, q_length_means, replication_kpis, utilisation_hourlies,
    utilisation_means, wip_hourlies, RunKpis,
};
pub use report::{build_report, report_for_outputs};
pub use resample::{hour_axis, resample_hourly, HourlySeries};
