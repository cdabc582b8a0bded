//! Job queue that drives an external media downloader.

pub mod control;
pub mod error;
pub mod format;
pub mod job;
pub mod manager;
pub mod progress;
pub mod queue;
pub mod runner;
pub mod tool_errors;

pub use error::{JobError, JobResult};
pub use job::{DownloadJob, JobId, JobRequest, JobStatus};
pub use manager::{DownloadManager, QueueSummary};
pub use queue::JobObserver;
