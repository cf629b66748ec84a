mod job;
mod page;
mod poll;
mod registry;
#[cfg(feature = "status-server")]
mod status_server;

pub use job::{BoxError, JobContext, JobHandle, JobSnapshot, JobState};
pub use page::{collect_all, pages, Page, PageSource};
pub use poll::{
    wait_for_completion, OperationStatus, PollConfig, PollError, StatusSource,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL,
};
pub use registry::JobRegistry;
#[cfg(feature = "status-server")]
pub use status_server::{State, StatusServer};
