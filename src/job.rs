use futures::future::FutureExt;
use log::{error, info, warn};
use std::{any::Any, fmt, future::Future, panic::AssertUnwindSafe, sync::Arc};
use tokio::{sync::watch, task};

/// Fault returned by a submitted work unit.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// State in which a job currently resides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Handle exists but no work unit has been submitted yet
    NotStarted,
    /// The work unit is executing on its own task
    Running,
    /// The work unit returned normally
    Completed,
    /// The work unit faulted or explicitly signalled failure
    Failed,
}

impl JobState {
    /// `Completed` and `Failed` admit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Point-in-time view of a job's observable fields.
///
/// Published as one value, so a reader never sees a half-applied update.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub state: JobState,
    pub status_message: String,
    /// Failure records in the order they were recorded.
    pub errors: Vec<String>,
}

impl JobSnapshot {
    fn new() -> Self {
        JobSnapshot {
            state: JobState::NotStarted,
            status_message: String::new(),
            errors: Vec::new(),
        }
    }
}

/// Observable handle to one asynchronously executing unit of work.
///
/// The handle is created first and the work is attached with [`submit`]. The
/// caller keeps the handle and returns to its own control flow immediately;
/// the work runs on its own task and publishes progress through the handle.
/// Handles are cheap to clone and every clone observes the same job.
///
/// [`submit`]: JobHandle::submit
#[derive(Clone)]
pub struct JobHandle {
    name: Arc<str>,
    description: Arc<str>,
    tx: Arc<watch::Sender<JobSnapshot>>,
}

impl JobHandle {
    /// Creates a handle in `NotStarted` with immutable identifying metadata.
    pub fn create(name: &str, description: &str) -> Self {
        let (tx, _) = watch::channel(JobSnapshot::new());

        JobHandle {
            name: Arc::from(name),
            description: Arc::from(description),
            tx: Arc::new(tx),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Latest published snapshot of state, status message and errors.
    pub fn snapshot(&self) -> JobSnapshot {
        self.tx.borrow().clone()
    }

    pub fn state(&self) -> JobState {
        self.tx.borrow().state
    }

    pub fn status_message(&self) -> String {
        self.tx.borrow().status_message.clone()
    }

    /// Failure records accumulated so far, oldest first.
    pub fn errors(&self) -> Vec<String> {
        self.tx.borrow().errors.clone()
    }

    /// Receiver of snapshot updates, for observers that want change
    /// notifications instead of polling the handle.
    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.tx.subscribe()
    }

    /// Waits until the job reaches `Completed` or `Failed` and returns that
    /// state. Intermediate snapshots may be skipped; the terminal one is not.
    pub async fn wait(&self) -> JobState {
        let mut rx = self.tx.subscribe();

        loop {
            let state = rx.borrow_and_update().state;
            if state.is_terminal() {
                return state;
            }

            if rx.changed().await.is_err() {
                return self.state();
            }
        }
    }

    /// Starts executing `work` on its own task and returns immediately.
    ///
    /// The job is `Running` before the work begins. The work unit receives a
    /// [`JobContext`] for status and error reporting. A normal return without
    /// a prior [`JobContext::fail`] completes the job; an `Err` return or a
    /// panic is caught at this boundary, recorded and fails the job. Faults
    /// never reach the caller's task.
    ///
    /// A handle runs at most one work unit; repeated calls are refused.
    pub fn submit<F, Fut>(&self, work: F)
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let mut accepted = false;
        self.tx.send_if_modified(|snapshot| {
            if snapshot.state == JobState::NotStarted {
                snapshot.state = JobState::Running;
                accepted = true;
            }
            accepted
        });

        if !accepted {
            warn!("{} already has a work unit, refusing a second submission", self.name);
            return;
        }

        info!("{:<12} {}", format!("{}", JobState::Running), self.name);

        let ctx = JobContext {
            name: self.name.clone(),
            tx: self.tx.clone(),
        };

        task::spawn(async move {
            let outcome = AssertUnwindSafe(work(ctx.clone())).catch_unwind().await;

            match outcome {
                Ok(Ok(())) => ctx.complete(),
                Ok(Err(err)) => ctx.fail(err),
                Err(panic) => ctx.fail(panic_message(panic)),
            }
        });
    }
}

/// Writer side of a job, handed to the submitted work unit.
#[derive(Clone)]
pub struct JobContext {
    name: Arc<str>,
    tx: Arc<watch::Sender<JobSnapshot>>,
}

impl JobContext {
    /// Replaces the human-readable progress description.
    pub fn set_status(&self, message: impl Into<String>) {
        let message = message.into();

        self.tx.send_if_modified(|snapshot| {
            if snapshot.state.is_terminal() {
                return false;
            }

            snapshot.status_message = message;
            true
        });
    }

    /// Appends a failure record without changing the job's state.
    pub fn record_error(&self, err: impl fmt::Display) {
        let rendered = err.to_string();

        self.tx.send_if_modified(|snapshot| {
            if snapshot.state != JobState::Running {
                return false;
            }

            snapshot.errors.push(rendered);
            true
        });
    }

    /// Appends `err` and moves the job to `Failed` in one visible step.
    /// No-op once the job is terminal.
    pub fn fail(&self, err: impl fmt::Display) {
        let rendered = err.to_string();
        let message = rendered.clone();

        let mut failed = false;
        self.tx.send_if_modified(|snapshot| {
            if snapshot.state != JobState::Running {
                return false;
            }

            snapshot.errors.push(rendered);
            snapshot.state = JobState::Failed;
            failed = true;
            true
        });

        if failed {
            error!("{} failed: {}", self.name, message);
            info!("{:<12} {}", format!("{}", JobState::Failed), self.name);
        }
    }

    fn complete(&self) {
        let mut completed = false;
        self.tx.send_if_modified(|snapshot| {
            if snapshot.state != JobState::Running {
                return false;
            }

            snapshot.state = JobState::Completed;
            completed = true;
            true
        });

        if completed {
            info!("{:<12} {}", format!("{}", JobState::Completed), self.name);
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "work unit panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn completes_on_normal_return() {
        let job = JobHandle::create("copy-image", "Copy a template image");
        assert_eq!(job.state(), JobState::NotStarted);

        job.submit(|ctx| async move {
            ctx.set_status("copying");
            Ok(())
        });

        assert_eq!(job.wait().await, JobState::Completed);
        assert!(job.errors().is_empty());
        assert_eq!(job.status_message(), "copying");
    }

    #[tokio::test]
    async fn running_is_visible_before_the_work_settles() {
        let job = JobHandle::create("held", "");
        let (release_tx, release_rx) = oneshot::channel::<()>();

        job.submit(move |_ctx| async move {
            release_rx.await.ok();
            Ok(())
        });

        assert_eq!(job.state(), JobState::Running);

        release_tx.send(()).unwrap();
        assert_eq!(job.wait().await, JobState::Completed);
    }

    #[tokio::test]
    async fn fails_on_error_return() {
        let job = JobHandle::create("rejected", "");

        job.submit(|_ctx| async move { Err::<(), BoxError>("remote rejected the request".into()) });

        assert_eq!(job.wait().await, JobState::Failed);
        assert_eq!(job.errors(), vec!["remote rejected the request".to_string()]);
    }

    #[tokio::test]
    async fn contains_a_panicking_work_unit() {
        async fn exploding() -> Result<(), BoxError> {
            panic!("boom")
        }

        let job = JobHandle::create("explode", "");
        job.submit(|_ctx| exploding());

        assert_eq!(job.wait().await, JobState::Failed);
        assert_eq!(job.errors(), vec!["boom".to_string()]);
    }

    #[tokio::test]
    async fn explicit_fail_wins_over_normal_return() {
        let job = JobHandle::create("verify", "");

        job.submit(|ctx| async move {
            ctx.fail("storage verification failed");
            Ok(())
        });

        assert_eq!(job.wait().await, JobState::Failed);
        assert_eq!(job.errors(), vec!["storage verification failed".to_string()]);
    }

    #[tokio::test]
    async fn fail_is_a_no_op_once_terminal() {
        let job = JobHandle::create("idempotent", "");

        job.submit(|ctx| async move {
            ctx.fail("first");
            ctx.fail("second");
            Ok(())
        });

        assert_eq!(job.wait().await, JobState::Failed);
        assert_eq!(job.errors(), vec!["first".to_string()]);
    }

    #[tokio::test]
    async fn record_error_does_not_change_state() {
        let job = JobHandle::create("observe", "");
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let mut rx = job.subscribe();

        job.submit(move |ctx| async move {
            ctx.record_error("first page returned garbage");
            release_rx.await.ok();
            Ok(())
        });

        loop {
            {
                let snapshot = rx.borrow_and_update();
                if !snapshot.errors.is_empty() {
                    assert_eq!(snapshot.state, JobState::Running);
                    break;
                }
            }
            rx.changed().await.unwrap();
        }

        release_tx.send(()).unwrap();
        assert_eq!(job.wait().await, JobState::Completed);
    }

    #[tokio::test]
    async fn refuses_a_second_work_unit() {
        let job = JobHandle::create("single", "");
        let (release_tx, release_rx) = oneshot::channel::<()>();

        job.submit(move |_ctx| async move {
            release_rx.await.ok();
            Ok(())
        });

        let second_ran = Arc::new(AtomicBool::new(false));
        let flag = second_ran.clone();
        job.submit(move |_ctx| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        release_tx.send(()).unwrap();
        assert_eq!(job.wait().await, JobState::Completed);
        assert!(!second_ran.load(Ordering::SeqCst));
    }
}
