use std::time::Duration;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Settings of an [crate::orchestrator::Orchestrator].
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Number of scenarios simulated in parallel
    pub workers: usize,
    /// Maximum number of scenarios waiting to be simulated
    pub queue_capacity: usize,
    /// Time allowed for one scenario, all replications included
    pub job_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }
}

impl RunnerConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_job_timeout(mut self, job_timeout: Duration) -> Self {
        self.job_timeout = job_timeout;
        self
    }
}
