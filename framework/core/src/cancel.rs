use tokio::sync::watch::{self, Receiver, Sender};

/// Cancellation handle owned by whoever may abort a piece of work, for example when the scenario
/// it belongs to is deleted or the service is reset.
///
/// Cancelling is sticky: listeners created after [CancelHandle::cancel] was called observe the
/// cancellation immediately.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: std::sync::Arc<Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        Self {
            sender: std::sync::Arc::new(watch::channel(false).0),
        }
    }

    pub fn cancel(&self) {
        // `send_replace` never fails, even when every listener has already gone away.
        let was_cancelled = self.sender.send_replace(true);
        if was_cancelled {
            log::trace!("Cancel requested for work that was already cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn new_listener(&self) -> CancelListener {
        CancelListener::new(self.sender.subscribe())
    }
}

#[derive(Clone, Debug)]
pub struct CancelListener {
    receiver: Receiver<bool>,
}

impl CancelListener {
    pub(crate) fn new(receiver: Receiver<bool>) -> Self {
        Self { receiver }
    }

    /// Point in time check. Long running blocking work should call this between steps and stop
    /// early when it returns true.
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until cancellation is requested. If the [CancelHandle] is dropped without cancelling
    /// then this never completes, so it is safe to race against the work it guards.
    pub async fn wait_for_cancel(&mut self) {
        if self.receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct JobCancelledError {
    msg: String,
}

impl Default for JobCancelledError {
    fn default() -> Self {
        Self {
            msg: "Job cancelled before it completed".to_string(),
        }
    }
}
