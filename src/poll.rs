use async_trait::async_trait;
use log::debug;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// Status a remote system reports for an accepted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    InProgress,
    Success,
    Failed,
}

/// Remote endpoint that reports the status of a tracked operation.
///
/// Implementors capture their client and any call context; the poller only
/// hands back the tracking identifier the remote issued.
#[async_trait]
pub trait StatusSource {
    async fn fetch(&self, tracking_id: &str) -> anyhow::Result<OperationStatus>;
}

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// Retry budget for [`wait_for_completion`].
///
/// The default is 60 checks 5 seconds apart. The operations being awaited
/// normally settle within minutes, so exhausting that budget is treated as
/// unrecoverable for the call rather than a reason to keep waiting.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Pause before each status fetch.
    pub interval: Duration,
    /// Number of fetches before the wait is abandoned.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Ways a tracked operation can fail to complete.
///
/// Timeout and explicit remote failure stay distinct so a caller can retry a
/// whole higher-level operation after a timeout but abort on a failure the
/// remote side already declared final.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("operation did not complete within {attempts} status checks")]
    TimedOut { attempts: u32 },
    #[error("operation reported status {status:?}")]
    RemoteFailure { status: OperationStatus },
    #[error(transparent)]
    Fetch(#[from] anyhow::Error),
}

/// Polls `source` until the operation behind `tracking_id` completes.
///
/// A missing or empty tracking id means the remote finished the operation
/// synchronously; the wait succeeds without a single fetch. Otherwise the
/// status is fetched every `config.interval`, at most `config.max_attempts`
/// times: `Pending` and `InProgress` keep the loop going, `Success` ends the
/// wait, anything else aborts immediately without consuming the remaining
/// budget. Fetch faults propagate to the caller unchanged.
pub async fn wait_for_completion<S>(
    source: &S,
    tracking_id: Option<&str>,
    config: PollConfig,
) -> Result<(), PollError>
where
    S: StatusSource + ?Sized,
{
    let tracking_id = match tracking_id {
        Some(id) if !id.is_empty() => id,
        _ => return Ok(()),
    };

    for attempt in 1..=config.max_attempts {
        sleep(config.interval).await;

        let status = source.fetch(tracking_id).await?;
        debug!(
            "{} check {}/{}: {:?}",
            tracking_id, attempt, config.max_attempts, status
        );

        match status {
            OperationStatus::Success => return Ok(()),
            OperationStatus::Pending | OperationStatus::InProgress => {}
            _ => return Err(PollError::RemoteFailure { status }),
        }
    }

    Err(PollError::TimedOut {
        attempts: config.max_attempts,
    })
}
