use anyhow::Context;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::queue::WorkQueue;

/// Fixed set of worker threads consuming a [WorkQueue].
///
/// Each worker takes one item at a time and handles it to completion before taking the next. The
/// workers stop once the queue is closed.
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start<T, F>(workers: usize, queue: Arc<WorkQueue<T>>, handle: F) -> anyhow::Result<Self>
    where
        T: Send + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let handle = Arc::new(handle);
        let mut handles = Vec::with_capacity(workers);
        for worker_index in 0..workers {
            let queue = queue.clone();
            let handle = handle.clone();
            let worker_id = format!("worker-{worker_index}");

            handles.push(
                std::thread::Builder::new()
                    .name(worker_id.clone())
                    .spawn(move || {
                        log::trace!("Starting {worker_id}");
                        while let Some(item) = queue.pop() {
                            handle(item);
                        }
                        log::debug!("Stopping {worker_id}");
                    })
                    .with_context(|| format!("Failed to spawn thread for worker {worker_index}"))?,
            );
        }

        log::info!("Started {workers} workers");
        Ok(Self { handles })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to stop. The queue must be closed first or this never returns.
    pub fn join(self) -> anyhow::Result<()> {
        for handle in self.handles {
            handle
                .join()
                .map_err(|e| anyhow::anyhow!("Error joining thread for worker: {:?}", e))?;
        }
        Ok(())
    }
}
