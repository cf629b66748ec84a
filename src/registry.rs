use super::job::{JobHandle, JobSnapshot};
use futures::lock::Mutex;
use std::{collections::HashMap, sync::Arc};

/// Named collection of job handles.
///
/// Callers register the handles they hand out so an observer can enumerate
/// everything in flight or finished. Registering a second job under the same
/// name replaces the first.
#[derive(Default, Clone)]
pub struct JobRegistry {
    pub(crate) jobs: Arc<Mutex<HashMap<String, JobHandle>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `handle` under its name.
    pub async fn register(&self, handle: JobHandle) {
        self.jobs
            .lock()
            .await
            .insert(handle.name().to_owned(), handle);
    }

    /// Cloned handle for `name`, if one is registered.
    pub async fn get(&self, name: &str) -> Option<JobHandle> {
        self.jobs.lock().await.get(name).cloned()
    }

    /// Latest snapshot of every registered job.
    pub async fn snapshot(&self) -> HashMap<String, JobSnapshot> {
        self.jobs
            .lock()
            .await
            .iter()
            .map(|(name, handle)| (name.clone(), handle.snapshot()))
            .collect()
    }

    /// Drops handles that reached a terminal state.
    pub async fn prune(&self) {
        self.jobs
            .lock()
            .await
            .retain(|_, handle| !handle.state().is_terminal());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobState;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn tracks_and_prunes_jobs() {
        let registry = JobRegistry::new();

        let done = JobHandle::create("done", "finished job");
        done.submit(|_ctx| async move { Ok(()) });
        done.wait().await;

        let held = JobHandle::create("held", "still running");
        let (release_tx, release_rx) = oneshot::channel::<()>();
        held.submit(move |_ctx| async move {
            release_rx.await.ok();
            Ok(())
        });

        registry.register(done.clone()).await;
        registry.register(held.clone()).await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["done"].state, JobState::Completed);
        assert_eq!(snapshot["held"].state, JobState::Running);

        registry.prune().await;
        assert!(registry.get("done").await.is_none());
        assert!(registry.get("held").await.is_some());

        release_tx.send(()).unwrap();
        held.wait().await;
    }

    #[tokio::test]
    async fn a_second_registration_replaces_the_first() {
        let registry = JobRegistry::new();

        registry.register(JobHandle::create("dup", "first")).await;
        registry.register(JobHandle::create("dup", "second")).await;

        let resolved = registry.get("dup").await.unwrap();
        assert_eq!(resolved.description(), "second");
    }
}
