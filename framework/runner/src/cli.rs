use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{RunnerConfig, DEFAULT_QUEUE_CAPACITY};

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
pub struct RunnerCli {
    /// Submission to run, a JSON document in the shape the frontend posts
    pub submission: PathBuf,

    /// Group the submitted scenarios into a multi-scenario analysis and write its comparative
    /// report as well
    #[clap(long, default_value = "false")]
    pub multi: bool,

    /// Path to the simulation engine executable. Falls back to `HPATH_ENGINE_PATH`.
    #[clap(long)]
    pub engine: Option<PathBuf>,

    /// Extra argument passed to the engine on every run, may be repeated
    #[clap(long, allow_hyphen_values = true)]
    pub engine_arg: Vec<String>,

    /// The number of scenarios to simulate in parallel, defaults to the number of CPUs
    #[clap(long, env = "HPATH_WORKERS")]
    pub workers: Option<usize>,

    /// The maximum number of scenarios waiting to be simulated
    #[clap(long, env = "HPATH_QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// The number of seconds one scenario may run for, all replications included
    #[clap(long, env = "HPATH_JOB_TIMEOUT", default_value_t = 3600)]
    pub job_timeout: u64,

    /// Append every finished scenario to this file as JSON lines
    #[clap(long, env = "HPATH_JOURNAL")]
    pub journal: Option<PathBuf>,

    /// Directory to write reports to
    #[clap(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by
    /// anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,
}

impl RunnerCli {
    pub fn runner_config(&self) -> RunnerConfig {
        let mut config = RunnerConfig::default()
            .with_queue_capacity(self.queue_capacity)
            .with_job_timeout(Duration::from_secs(self.job_timeout));
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        config
    }
}
