//! Run-loop tasks with cooperative cancellation.
//!
//! A [`Task`] is set up once, stepped until its cancellation token fires, then
//! torn down. Cancellation is only observed between steps, so a step that has
//! started always runs to completion.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A unit of work driven by [`spawn`].
pub trait Task: Send + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Called once before the first step.
    fn setup(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// One cycle of work. Implementations should bound any wait so the loop
    /// gets back to checking `cancel`; they may also return early once
    /// `cancel` fires, as long as no started work is abandoned.
    fn step(&mut self, cancel: &CancellationToken) -> impl Future<Output = ()> + Send;

    /// Called once after the last step.
    fn teardown(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Handle to a spawned [`Task`].
pub struct TaskHandle {
    name: String,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Run `task` on the tokio runtime until `cancel` fires.
pub fn spawn<T: Task>(mut task: T, cancel: CancellationToken) -> TaskHandle {
    let name = task.name().to_string();
    let token = cancel.clone();

    let join = tokio::spawn(async move {
        task.setup().await;
        while !token.is_cancelled() {
            task.step(&token).await;
        }
        task.teardown().await;
    });

    TaskHandle { name, cancel, join }
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the task to stop after its current step.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the task to finish its teardown.
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            warn!("Task {} ended abnormally: {e}", self.name);
        } else {
            debug!("Task {} finished", self.name);
        }
    }

    /// Cancel, then wait.
    pub async fn stop(self) {
        self.cancel();
        self.join().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;

    struct Recorder {
        log: Arc<Mutex<Vec<&'static str>>>,
        steps: usize,
        stop_after: usize,
    }

    impl Task for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn setup(&mut self) {
            self.log.lock().push("setup");
        }

        async fn step(&mut self, cancel: &CancellationToken) {
            self.steps += 1;
            self.log.lock().push("step");
            if self.steps == self.stop_after {
                cancel.cancel();
            }
        }

        async fn teardown(&mut self) {
            self.log.lock().push("teardown");
        }
    }

    #[tokio::test]
    async fn runs_setup_steps_teardown_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let task = Recorder { log: log.clone(), steps: 0, stop_after: 3 };

        let handle = spawn(task, CancellationToken::new());
        tokio::time::timeout(Duration::from_secs(5), handle.join()).await.unwrap();

        assert_eq!(*log.lock(), vec!["setup", "step", "step", "step", "teardown"]);
    }

    struct Sleeper {
        finished_steps: Arc<Mutex<usize>>,
    }

    impl Task for Sleeper {
        fn name(&self) -> &str {
            "sleeper"
        }

        async fn step(&mut self, _cancel: &CancellationToken) {
            tokio::time::sleep(Duration::from_millis(50)).await;
            *self.finished_steps.lock() += 1;
        }
    }

    #[tokio::test]
    async fn stop_lets_current_step_finish() {
        let finished = Arc::new(Mutex::new(0));
        let handle = spawn(Sleeper { finished_steps: finished.clone() }, CancellationToken::new());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());
        tokio::time::timeout(Duration::from_secs(5), handle.stop()).await.unwrap();

        assert!(*finished.lock() >= 1);
    }
}
