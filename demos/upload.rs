use anyhow::anyhow;
use async_trait::async_trait;
use log::info;
use longop::{
    collect_all, wait_for_completion, JobHandle, JobRegistry, OperationStatus, Page, PageSource,
    PollConfig, StatusSource,
};
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

/// In-memory stand-in for a remote management API: an accepted operation that
/// settles on the third status check, and a three-image listing served in two
/// pages.
struct FakeRemote {
    status_checks: AtomicUsize,
}

#[async_trait]
impl StatusSource for FakeRemote {
    async fn fetch(&self, tracking_id: &str) -> anyhow::Result<OperationStatus> {
        let check = self.status_checks.fetch_add(1, Ordering::SeqCst) + 1;
        info!("status check {} for {}", check, tracking_id);

        if check < 3 {
            Ok(OperationStatus::InProgress)
        } else {
            Ok(OperationStatus::Success)
        }
    }
}

#[async_trait]
impl PageSource for FakeRemote {
    type Item = String;

    async fn first_page(&self) -> anyhow::Result<Page<String>> {
        Ok(Page::with_continuation(
            vec!["image-1".to_owned(), "image-2".to_owned()],
            "token-1",
        ))
    }

    async fn next_page(&self, token: &str) -> anyhow::Result<Page<String>> {
        if token != "token-1" {
            return Err(anyhow!("unknown continuation token {}", token));
        }

        Ok(Page::last(vec!["image-3".to_owned()]))
    }
}

#[tokio::main]
async fn main() {
    std::env::set_var("RUST_LOG", "info");
    pretty_env_logger::init();

    let registry = JobRegistry::new();

    let job = JobHandle::create("TemplateImageUpload", "Upload a template image");
    registry.register(job.clone()).await;

    job.submit(|ctx| async move {
        let remote = FakeRemote {
            status_checks: AtomicUsize::new(0),
        };

        ctx.set_status("Waiting for storage verification to complete");
        let config = PollConfig {
            interval: Duration::from_millis(200),
            max_attempts: 10,
        };
        wait_for_completion(&remote, Some("upload-42"), config).await?;

        ctx.set_status("Listing uploaded images");
        let images = collect_all(&remote).await?;
        info!("remote now holds {} images", images.len());

        ctx.set_status("Upload complete");
        Ok(())
    });

    // The handle is all we keep; the work runs on its own task.
    let outcome = job.wait().await;
    info!("{} finished as {} ({})", job.name(), outcome, job.status_message());
}
