//! Stop signal shared by the coordinator, scheduler and workers

use std::sync::Arc;
use tokio::sync::watch;

/// How far a running crawl has been asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StopSignal {
    Running,
    /// No new pops; in-flight fetches finish normally
    Graceful,
    /// No new pops; in-flight fetches are cancelled and requeued
    Abort,
}

/// Handle for stopping a crawl from another task (e.g. a Ctrl-C handler)
///
/// Signals only escalate: a graceful request after an abort is ignored.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<StopSignal>>,
}

impl ShutdownHandle {
    pub(crate) fn new() -> Self {
        let (sender, _) = watch::channel(StopSignal::Running);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Stops handing out work and lets in-flight fetches drain
    pub fn graceful(&self) {
        self.escalate(StopSignal::Graceful);
    }

    /// Cancels in-flight fetches and stops the crawl
    pub fn abort(&self) {
        self.escalate(StopSignal::Abort);
    }

    pub fn signal(&self) -> StopSignal {
        *self.sender.borrow()
    }

    fn escalate(&self, to: StopSignal) {
        self.sender.send_if_modified(|current| {
            if to > *current {
                *current = to;
                true
            } else {
                false
            }
        });
    }

    /// Clears a previous stop request before a new crawl starts
    pub(crate) fn reset(&self) {
        self.sender.send_replace(StopSignal::Running);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<StopSignal> {
        self.sender.subscribe()
    }
}

/// Resolves once the signal reaches at least `level`
pub(crate) async fn stopped(mut receiver: watch::Receiver<StopSignal>, level: StopSignal) {
    if receiver.wait_for(|signal| *signal >= level).await.is_err() {
        // Sender dropped without reaching `level`
        std::future::pending::<()>().await;
    }
}
