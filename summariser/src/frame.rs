use hpath_model::{
    is_eligible, SpecimenRecord, TrackedStage, QC_END, RECEPTION_START, REPORT_END,
};
use polars::prelude::*;
use std::collections::BTreeMap;

use crate::error::KpiError;

/// Column holding the specimen identifier
pub const SPECIMEN_COL: &str = "specimen";
/// Column holding `report_end - reception_start`
pub const OVERALL_TAT_COL: &str = "overall_tat";
/// Column holding `qc_end - reception_start`
pub const LAB_TAT_COL: &str = "lab_tat";

/// Specimens that count towards TAT statistics, in identifier order.
pub fn eligible_specimens(
    specimens: &BTreeMap<String, SpecimenRecord>,
) -> Vec<(&str, &SpecimenRecord)> {
    let eligible = specimens
        .iter()
        .filter(|(id, record)| is_eligible(id, record))
        .map(|(id, record)| (id.as_str(), record))
        .collect::<Vec<_>>();

    log::debug!(
        "{} of {} specimens are eligible for TAT statistics",
        eligible.len(),
        specimens.len()
    );

    eligible
}

/// Build a frame with one row per eligible specimen.
///
/// Columns are [SPECIMEN_COL], [OVERALL_TAT_COL], [LAB_TAT_COL] and one duration column per stage
/// named by its event key. A duration is null when either of its events is missing.
pub fn specimen_frame(
    specimens: &BTreeMap<String, SpecimenRecord>,
    stages: &[TrackedStage],
) -> Result<DataFrame, KpiError> {
    let eligible = eligible_specimens(specimens);
    if eligible.is_empty() {
        return Err(KpiError::NoEligibleSpecimens);
    }

    let duration_column = |name: &str, from: &str, to: &str| -> Column {
        let values = eligible
            .iter()
            .map(|(_, record)| record.duration(from, to))
            .collect::<Vec<Option<f64>>>();
        Series::new(name.into(), values).into()
    };

    let mut columns: Vec<Column> = vec![
        Series::new(
            SPECIMEN_COL.into(),
            eligible.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
        )
        .into(),
        duration_column(OVERALL_TAT_COL, RECEPTION_START, REPORT_END),
        duration_column(LAB_TAT_COL, RECEPTION_START, QC_END),
    ];
    for stage in stages {
        columns.push(duration_column(
            &stage.event_key,
            &stage.start_event(),
            &stage.end_event(),
        ));
    }

    Ok(DataFrame::new(columns)?)
}
