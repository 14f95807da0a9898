use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::trace;

/// Runs short synchronous steps on a tokio runtime.
///
/// A step that needs to wait never sleeps on a worker: it submits its
/// successor with [`StepScheduler::submit_after`]. After
/// [`StepScheduler::shutdown`] starts, new submissions are refused and steps
/// still waiting for their delay are dropped, while steps already running
/// finish.
#[derive(Clone)]
pub struct StepScheduler {
    handle: Handle,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl StepScheduler {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Scheduler on the runtime of the calling task.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Schedules `step` to run after `delay`. Returns `false` when the
    /// scheduler is shutting down and the step was not scheduled.
    pub fn submit_after<F>(
        &self,
        delay: Duration,
        step: F,
    ) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            trace!("step refused: scheduler is shutting down");
            return false;
        }

        if delay.is_zero() {
            self.tracker.spawn_on(async move { step() }, &self.handle);
            return true;
        }

        let token = self.shutdown.clone();
        self.tracker.spawn_on(
            async move {
                tokio::select! {
                    _ = token.cancelled() => {
                        trace!("delayed step dropped by shutdown");
                    }
                    _ = tokio::time::sleep(delay) => step(),
                }
            },
            &self.handle,
        );
        true
    }

    pub fn submit<F>(
        &self,
        step: F,
    ) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_after(Duration::ZERO, step)
    }

    /// Token cancelled when shutdown starts; background loops select on it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Steps spawned and not yet finished (scheduled or running).
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Stops scheduling and waits for in-flight steps to finish.
    pub async fn shutdown(&self) {
        debug!("scheduler shutdown: {} pending steps", self.tracker.len());
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        debug!("scheduler shutdown complete");
    }
}
