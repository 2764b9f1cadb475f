use anyhow::Context;
use hpath_core::prelude::{CancelHandle, CancelListener, JobCancelledError};
use std::time::Duration;

use crate::error::JobError;

/// Runs blocking jobs under a time limit, racing them against cancellation.
#[derive(Debug)]
pub struct Executor {
    runtime: Option<tokio::runtime::Runtime>,
}

impl Executor {
    pub fn new() -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("executor")
            .enable_all()
            .build()
            .context("Failed to create Tokio runtime")?;

        Ok(Self {
            runtime: Some(runtime),
        })
    }

    /// Run a blocking job in place, blocking until it completes, times out or is cancelled.
    ///
    /// The job is given its own cancel listener which fires when the job is abandoned, either
    /// because `timeout` elapsed or because `cancel` fired. A blocking job cannot be interrupted, so
    /// it must check the listener between steps and stop early. An abandoned job is still waited
    /// for, the caller only gets control back once it has stopped, and whatever it produced is
    /// dropped.
    pub fn execute_blocking<T, F>(
        &self,
        timeout: Duration,
        mut cancel: CancelListener,
        job: F,
    ) -> Result<T, JobError>
    where
        T: Send + 'static,
        F: FnOnce(CancelListener) -> Result<T, JobError> + Send + 'static,
    {
        let Some(runtime) = &self.runtime else {
            return Err(JobCancelledError::default().into());
        };

        let abandon = CancelHandle::new();
        let job_listener = abandon.new_listener();
        runtime.block_on(async move {
            let mut task = tokio::task::spawn_blocking(move || job(job_listener));
            let outcome = tokio::select! {
                result = &mut task => Ok(result),
                _ = tokio::time::sleep(timeout) => Err(JobError::Timeout(timeout)),
                _ = cancel.wait_for_cancel() => Err(JobError::from(JobCancelledError::default())),
            };

            match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(JobError::Panicked(e.to_string())),
                Err(abandoned) => {
                    abandon.cancel();
                    if let Err(e) = task.await {
                        log::warn!("Abandoned job failed while stopping: {e}");
                    }
                    Err(abandoned)
                }
            }
        })
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
