use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ParamsError {
    #[error("sim_hours must be at least 1")]
    NoHorizon,
    #[error("num_reps must be at least 1")]
    NoReplications,
}

/// Parameters shared by every scenario in one submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SharedParams {
    /// Simulation horizon, in hours of simulated time
    pub sim_hours: u32,
    /// The number of independent replications to run for each scenario
    pub num_reps: u32,
    /// Compute confidence bounds across replications for scalar and distribution KPIs
    ///
    /// Bounds only carry information when `num_reps` is greater than one.
    #[serde(default, alias = "ci")]
    pub confidence_intervals: bool,
}

impl SharedParams {
    /// Check the parameters are usable for every scenario of a submission.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.sim_hours == 0 {
            return Err(ParamsError::NoHorizon);
        }
        if self.num_reps == 0 {
            return Err(ParamsError::NoReplications);
        }
        if self.confidence_intervals && self.num_reps < 2 {
            log::warn!("Confidence bounds requested with a single replication will have no width");
        }
        Ok(())
    }
}

/// Immutable configuration for one scenario.
///
/// Built once the scenario's source file has been decoded and validated, then handed to the
/// simulation engine as-is for every replication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Display name chosen by the user
    pub name: String,
    /// Name of the source file the configuration was read from
    pub file_name: String,
    /// Simulation horizon, in hours
    pub sim_hours: u32,
    /// Number of replications
    pub num_reps: u32,
    /// Whether confidence bounds should be reported
    pub confidence_intervals: bool,
    /// Engine specific parameters, passed through to the simulation engine untouched
    pub params: BTreeMap<String, serde_json::Value>,
}

impl Config {
    pub fn new(
        name: String,
        file_name: String,
        shared: &SharedParams,
        params: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            name,
            file_name,
            sim_hours: shared.sim_hours,
            num_reps: shared.num_reps,
            confidence_intervals: shared.confidence_intervals,
            params,
        }
    }

    /// Compute a fingerprint for this configuration
    ///
    /// Two configurations with the same fingerprint produce the same simulation input. It uses the
    ///     - Scenario name
    ///     - Simulation horizon
    ///     - Replication count
    ///     - Engine parameters, in key order
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.name.as_bytes());
        Digest::update(&mut hasher, self.sim_hours.to_le_bytes());
        Digest::update(&mut hasher, self.num_reps.to_le_bytes());
        self.params
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.to_string().as_bytes());
            });

        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> SharedParams {
        SharedParams {
            sim_hours: 24,
            num_reps: 1,
            confidence_intervals: false,
        }
    }

    #[test]
    fn config_takes_shared_params() {
        let config = Config::new("a".into(), "a.toml".into(), &shared(), BTreeMap::new());

        assert_eq!(config.sim_hours, 24);
        assert_eq!(config.num_reps, 1);
        assert!(!config.confidence_intervals);
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive_to_params() {
        let mut params = BTreeMap::new();
        params.insert("staff".to_string(), serde_json::json!(3));
        let a = Config::new("a".into(), "a.toml".into(), &shared(), params.clone());
        let b = Config::new("a".into(), "other.toml".into(), &shared(), params.clone());
        assert_eq!(a.fingerprint(), b.fingerprint());

        params.insert("staff".to_string(), serde_json::json!(4));
        let c = Config::new("a".into(), "a.toml".into(), &shared(), params);
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn shared_params_need_a_horizon_and_replications() {
        assert_eq!(shared().validate(), Ok(()));

        let mut params = shared();
        params.sim_hours = 0;
        assert_eq!(params.validate(), Err(ParamsError::NoHorizon));

        let mut params = shared();
        params.num_reps = 0;
        assert_eq!(params.validate(), Err(ParamsError::NoReplications));
    }

    #[test]
    fn shared_params_accept_short_ci_key() {
        let params: SharedParams =
            serde_json::from_str(r#"{"sim_hours": 48, "num_reps": 3, "ci": true}"#).unwrap();
        assert!(params.confidence_intervals);

        let params: SharedParams =
            serde_json::from_str(r#"{"sim_hours": 48, "num_reps": 3}"#).unwrap();
        assert!(!params.confidence_intervals);
    }
}
