use hpath_model::{MonitorTrace, TraceError};
use itertools::Itertools;
use std::collections::BTreeMap;

/// A trace resampled onto whole simulation hours `0..=sim_hours`.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlySeries {
    pub hours: Vec<f64>,
    pub values: Vec<f64>,
}

/// The hour axis shared by every hourly series of a run.
pub fn hour_axis(sim_hours: u32) -> Vec<f64> {
    (0..=sim_hours).map(f64::from).collect()
}

/// Resample a trace to hourly values over `[0, sim_hours]`.
///
/// Each hour `h` covers the samples in `[h, h + 1)`:
/// - if the hour holds samples, its value is their mean
/// - otherwise nothing changed during the hour, and the value that held at its start is carried
///   forward
///
/// Samples after the horizon are ignored. The trace must start at simulation time 0 so that every
/// hour has a known value.
pub fn resample_hourly(trace: &MonitorTrace, sim_hours: u32) -> Result<HourlySeries, TraceError> {
    trace.ensure_starts_at_zero()?;
    let horizon = f64::from(sim_hours);

    let chunks = trace
        .samples()
        .iter()
        .take_while(|s| s.t <= horizon)
        .chunk_by(|s| s.t.floor() as u32);
    let bucket_means = chunks
        .into_iter()
        .map(|(hour, samples)| {
            let (sum, count) = samples.fold((0.0, 0usize), |(sum, count), s| {
                (sum + s.value, count + 1)
            });
            (hour, sum / count as f64)
        })
        .collect::<BTreeMap<u32, f64>>();

    log::trace!(
        "Resampled {} samples into {} non-empty hours of {}",
        trace.len(),
        bucket_means.len(),
        sim_hours + 1
    );

    let values = (0..=sim_hours)
        .map(|hour| match bucket_means.get(&hour) {
            Some(mean) => Ok(*mean),
            None => trace.value_at(f64::from(hour)).ok_or(TraceError::Empty),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HourlySeries {
        hours: hour_axis(sim_hours),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(samples: &[(f64, f64)]) -> MonitorTrace {
        MonitorTrace::new(samples.to_vec()).unwrap()
    }

    #[test]
    fn hourly_aligned_trace_is_unchanged() {
        let samples: Vec<(f64, f64)> = (0..=24).map(|h| (h as f64, (h * h) as f64)).collect();
        let resampled = resample_hourly(&trace(&samples), 24).unwrap();

        assert_eq!(resampled.hours, hour_axis(24));
        assert_eq!(
            resampled.values,
            samples.iter().map(|(_, v)| *v).collect::<Vec<_>>()
        );
    }

    #[test]
    fn empty_hours_carry_forward_last_value() {
        let resampled = resample_hourly(&trace(&[(0.0, 3.0), (5.0, 8.0)]), 6).unwrap();

        assert_eq!(resampled.values, vec![3.0, 3.0, 3.0, 3.0, 3.0, 8.0, 8.0]);
    }

    #[test]
    fn hours_with_samples_take_their_mean() {
        let resampled =
            resample_hourly(&trace(&[(0.0, 1.0), (0.5, 3.0), (2.25, 4.0), (2.75, 6.0)]), 3)
                .unwrap();

        // hour 1 has no sample and keeps the value that held at its start, the last hour 0 sample
        assert_eq!(resampled.values, vec![2.0, 3.0, 5.0, 6.0]);
    }

    #[test]
    fn covers_full_horizon_and_ignores_later_samples() {
        let resampled =
            resample_hourly(&trace(&[(0.0, 1.0), (24.0, 2.0), (30.0, 9.0)]), 24).unwrap();

        assert_eq!(resampled.values.len(), 25);
        assert_eq!(resampled.hours.first(), Some(&0.0));
        assert_eq!(resampled.hours.last(), Some(&24.0));
        assert_eq!(resampled.values[24], 2.0);
        assert!(resampled.values[..24].iter().all(|v| *v == 1.0));
    }

    #[test]
    fn trace_must_start_at_zero() {
        assert_eq!(
            resample_hourly(&trace(&[(1.0, 1.0)]), 4),
            Err(TraceError::NoInitialSample { t: 1.0 })
        );
        assert_eq!(
            resample_hourly(&MonitorTrace::default(), 4),
            Err(TraceError::Empty)
        );
    }
}
