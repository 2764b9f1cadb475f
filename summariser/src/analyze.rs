use hpath_model::{ChartData, DayThresholds, TrackedStage};
use polars::frame::DataFrame;
use polars::prelude::*;

use crate::error::KpiError;
use crate::frame::{LAB_TAT_COL, OVERALL_TAT_COL};

/// z-score of a two sided 95% normal interval
const Z_95: f64 = 1.96;

/// Mean of a duration column, ignoring specimens where the duration is unknown.
fn mean_duration(frame: &DataFrame, column: &str) -> Result<Option<f64>, KpiError> {
    Ok(frame.column(column)?.as_materialized_series().mean())
}

/// Mean time from reception to report sign out, in hours.
pub fn overall_tat(frame: &DataFrame) -> Result<f64, KpiError> {
    mean_duration(frame, OVERALL_TAT_COL)?.ok_or(KpiError::NoEligibleSpecimens)
}

/// Mean time from reception to the end of the lab's quality check, in hours.
pub fn lab_tat(frame: &DataFrame) -> Result<f64, KpiError> {
    mean_duration(frame, LAB_TAT_COL)?.ok_or(KpiError::NoEligibleSpecimens)
}

/// Proportion of eligible specimens whose `column` duration is at most `days * 24` hours, for
/// each of the record's day thresholds.
///
/// Every row of the frame is an eligible specimen. One whose duration is unknown never counts as
/// within a threshold.
pub fn tat_dist<P: DayThresholds>(frame: &DataFrame, column: &str) -> Result<P, KpiError> {
    let eligible = frame.height();

    let mut values = Vec::with_capacity(P::DAYS.len());
    for days in P::DAYS {
        if eligible == 0 {
            values.push(0.0);
            continue;
        }

        let within = frame
            .clone()
            .lazy()
            .filter(col(column).lt_eq(lit(f64::from(*days) * 24.0)))
            .collect()?
            .height();
        values.push(within as f64 / eligible as f64);
    }

    let mut values = values.into_iter();
    Ok(P::from_fn(|_| values.next().unwrap_or_default()))
}

/// Mean duration of every stage that has at least one complete start and end pair, in the order
/// of `stages`.
pub fn tat_by_stage(frame: &DataFrame, stages: &[TrackedStage]) -> Result<ChartData, KpiError> {
    let mut labels = Vec::new();
    let mut means = Vec::new();
    for stage in stages {
        if let Some(mean) = mean_duration(frame, &stage.event_key)? {
            labels.push(stage.name.clone());
            means.push(mean);
        }
    }

    Ok(ChartData::new(labels, means))
}

/// Summary of one KPI across replications.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplicationStats {
    pub mean: f64,
    /// Sample standard deviation, zero with a single replication
    pub std: f64,
    pub count: usize,
}

impl ReplicationStats {
    /// Half width of the 95% normal approximation interval on the mean.
    pub fn half_width(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        Z_95 * self.std / (self.count as f64).sqrt()
    }

    /// Interval bounds on the mean, clamped to `[lower, upper]`.
    pub fn bounds(&self, lower: f64, upper: f64) -> (f64, f64) {
        let half_width = self.half_width();
        (
            (self.mean - half_width).clamp(lower, upper),
            (self.mean + half_width).clamp(lower, upper),
        )
    }
}

pub fn replication_stats(values: &[f64]) -> Result<ReplicationStats, KpiError> {
    let column: Column = Series::new("value".into(), values).into();
    let mean = column.as_materialized_series().mean().ok_or(KpiError::NoReplications)?;
    let std = if values.len() < 2 {
        0.0
    } else {
        column.as_materialized_series().std(1).unwrap_or(0.0)
    };

    Ok(ReplicationStats {
        mean,
        std,
        count: values.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpath_model::{LabProgress, Progress, Stage};

    fn stages() -> Vec<TrackedStage> {
        Stage::ALL.into_iter().map(TrackedStage::from).collect()
    }

    /// Five eligible specimens, the last one without a QC end
    fn tat_frame() -> DataFrame {
        let mut frame = df!(
            OVERALL_TAT_COL => &[Some(100.0), Some(200.0), Some(260.0), Some(400.0), Some(500.0)],
            LAB_TAT_COL => &[Some(20.0), Some(50.0), Some(80.0), Some(100.0), None],
            "reception" => &[Some(1.0), Some(3.0), None, None, None],
        )
        .unwrap();
        for stage in &Stage::ALL[1..] {
            frame
                .with_column(Series::new(stage.event_key().into(), &[None::<f64>; 5]))
                .unwrap();
        }
        frame
    }

    #[test]
    fn tat_means_skip_unknown_durations() -> anyhow::Result<()> {
        let frame = tat_frame();

        assert_eq!(overall_tat(&frame)?, 292.0);
        assert_eq!(lab_tat(&frame)?, 62.5);

        Ok(())
    }

    #[test]
    fn progress_counts_specimens_within_each_threshold() -> anyhow::Result<()> {
        let frame = tat_frame();

        let progress: Progress = tat_dist(&frame, OVERALL_TAT_COL)?;
        // 7 days = 168h, 10 days = 240h, 12 days = 288h, 21 days = 504h
        pretty_assertions::assert_eq!(
            progress,
            Progress {
                within_7_days: 0.2,
                within_10_days: 0.4,
                within_12_days: 0.6,
                within_21_days: 1.0,
            }
        );

        // The specimen without a QC end stays in the denominator
        let lab_progress: LabProgress = tat_dist(&frame, LAB_TAT_COL)?;
        assert_eq!(lab_progress.within_3_days, 0.4);

        Ok(())
    }

    #[test]
    fn progress_is_monotonic_in_threshold() -> anyhow::Result<()> {
        let tats = (0..50).map(|i| Some(i as f64 * 13.7)).collect::<Vec<_>>();
        let frame = df!(OVERALL_TAT_COL => &tats)?;

        let progress: Progress = tat_dist(&frame, OVERALL_TAT_COL)?;
        let values = progress.values();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));

        Ok(())
    }

    #[test]
    fn stages_without_complete_pairs_are_left_out() -> anyhow::Result<()> {
        let chart = tat_by_stage(&tat_frame(), &stages())?;

        assert_eq!(chart.labels(), vec!["Reception".to_string()]);
        assert_eq!(chart.y, vec![2.0]);

        Ok(())
    }

    #[test]
    fn stages_follow_the_given_order() -> anyhow::Result<()> {
        let frame = df!(
            "reception" => &[Some(1.0), Some(3.0)],
            "decalc" => &[Some(10.0), None],
        )?;
        let stages = vec![
            TrackedStage::from_wip_name("Decalc"),
            TrackedStage::from_wip_name("Reception"),
        ];

        let chart = tat_by_stage(&frame, &stages)?;

        assert_eq!(
            chart.labels(),
            vec!["Decalc".to_string(), "Reception".to_string()]
        );
        assert_eq!(chart.y, vec![10.0, 2.0]);

        Ok(())
    }

    #[test]
    fn replication_bounds() -> anyhow::Result<()> {
        let stats = replication_stats(&[1.0, 2.0, 3.0, 4.0])?;
        assert_eq!(stats.mean, 2.5);
        assert!((stats.std - 1.2909944487358056).abs() < 1e-12);

        let (min, max) = stats.bounds(0.0, f64::INFINITY);
        assert!(min < 2.5 && max > 2.5);
        assert!((max - min - 2.0 * Z_95 * stats.std / 2.0).abs() < 1e-12);

        // Clamped to the domain
        let (min, max) = replication_stats(&[0.0, 0.1, 1.0])?.bounds(0.0, 1.0);
        assert_eq!(min, 0.0);
        assert!(max <= 1.0);

        let single = replication_stats(&[7.0])?;
        assert_eq!(single.bounds(0.0, f64::INFINITY), (7.0, 7.0));

        Ok(())
    }
}
