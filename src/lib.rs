pub mod app;
pub mod cli;
pub mod download;
pub mod util;

pub use app::config::Config;
pub use download::{DownloadJob, DownloadManager, JobId, JobRequest, JobStatus};
