use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Stable identifier of a job across all of its runs
pub type JobId = Uuid;

/// Log entry for job events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Log level for entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: LogLevel::Warn,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: LogLevel::Error,
            message: message.into(),
        }
    }
}

/// What the caller asked for. Never changes after enqueue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub url: String,
    pub quality: String,
    pub output_directory: PathBuf,
}

impl JobRequest {
    pub fn new(
        url: impl Into<String>,
        quality: impl Into<String>,
        output_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            url: url.into().trim().to_string(),
            quality: quality.into(),
            output_directory: output_directory.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
    Canceled,
}

impl JobStatus {
    /// No further automatic transition happens from these states
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// States a job can be re-queued from
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Paused | Self::Failed | Self::Canceled)
    }

    /// The run has ended (terminal, or stopped by a pause)
    pub fn is_finished(self) -> bool {
        self.is_terminal() || self == Self::Paused
    }
}

/// Point-in-time copy of one job's state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadJob {
    pub id: JobId,
    pub request: JobRequest,
    pub title: String,
    pub status: JobStatus,
    pub progress_percent: u8,
    pub bytes_downloaded: u64,
    /// 0 means the total is unknown
    pub bytes_total: u64,
    /// Bytes per second, most recent sample
    pub transfer_rate: f64,
    pub error_message: Option<String>,
    pub output_path: Option<PathBuf>,
    /// 1 for the first run, bumped by every retry
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub logs: Vec<LogEntry>,
}

impl DownloadJob {
    pub fn new(request: JobRequest) -> Self {
        let title = title_from_url(&request.url);
        let mut job = Self {
            id: Uuid::new_v4(),
            request,
            title,
            status: JobStatus::Queued,
            progress_percent: 0,
            bytes_downloaded: 0,
            bytes_total: 0,
            transfer_rate: 0.0,
            error_message: None,
            output_path: None,
            attempt: 1,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            logs: Vec::new(),
        };
        job.logs.push(LogEntry::info("Download job created"));
        job
    }

    /// Add an info log entry
    pub fn log_info(&mut self, message: String) {
        self.logs.push(LogEntry::info(message));
    }

    /// Add a warning log entry
    pub fn log_warn(&mut self, message: String) {
        self.logs.push(LogEntry::warn(message));
    }

    /// Add an error log entry
    pub fn log_error(&mut self, message: String) {
        self.logs.push(LogEntry::error(message));
    }

    /// Put the record back to a fresh `Queued` state for another run
    pub fn reset_for_retry(&mut self) {
        self.status = JobStatus::Queued;
        self.progress_percent = 0;
        self.bytes_downloaded = 0;
        self.bytes_total = 0;
        self.transfer_rate = 0.0;
        self.error_message = None;
        self.started_at = None;
        self.finished_at = None;
        self.attempt += 1;
        self.log_info(format!("Re-queued (attempt {})", self.attempt));
    }

    /// Estimated time remaining in seconds
    /// Returns None unless running with a known total and a non-zero rate
    pub fn eta_seconds(&self) -> Option<u64> {
        if self.status != JobStatus::Running || self.bytes_total == 0 {
            return None;
        }

        let remaining = self.bytes_total.saturating_sub(self.bytes_downloaded);
        if remaining == 0 {
            return Some(0);
        }

        if self.transfer_rate > 0.0 {
            Some((remaining as f64 / self.transfer_rate) as u64)
        } else {
            None
        }
    }

    /// Format ETA as human-readable string (e.g., "2h 15m", "45s")
    pub fn eta_display(&self) -> Option<String> {
        let seconds = self.eta_seconds()?;
        Some(format_duration(seconds))
    }
}

/// Placeholder title until the tool reports a destination file
pub fn title_from_url(url: &str) -> String {
    match url::Url::parse(url.trim()) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => format!("Video from {}", host),
            None => "Video Content".to_string(),
        },
        Err(_) => "Video Content".to_string(),
    }
}

/// Format duration in seconds to human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        let mins = seconds / 60;
        let secs = seconds % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else {
        let hours = seconds / 3600;
        let mins = (seconds % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    }
}
