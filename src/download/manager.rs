use super::control::{RunControl, StopReason};
use super::format::{FormatResolver, PresetResolver};
use super::job::{DownloadJob, JobId, JobRequest, JobStatus};
use super::queue::{JobEntry, JobObserver, JobQueue};
use super::runner::{self, Gate, JobRunner, ToolSettings};
use super::error::JobResult;
use crate::app::config::Config;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

pub const DEFAULT_MAX_CONCURRENT: usize = 2;

/// Counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSummary {
    pub total: usize,
    pub queued: usize,
    pub running: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
    pub canceled: usize,
}

impl QueueSummary {
    pub fn from_jobs(jobs: &[DownloadJob]) -> Self {
        let mut summary = Self {
            total: jobs.len(),
            ..Self::default()
        };
        for job in jobs {
            match job.status {
                JobStatus::Queued => summary.queued += 1,
                JobStatus::Running => summary.running += 1,
                JobStatus::Paused => summary.paused += 1,
                JobStatus::Completed => summary.completed += 1,
                JobStatus::Failed => summary.failed += 1,
                JobStatus::Canceled => summary.canceled += 1,
            }
        }
        summary
    }

    /// One-line status, e.g. "3 downloads • 1 active • 1 completed • 1 failed"
    pub fn status_line(&self) -> String {
        if self.total == 0 {
            return "No downloads in queue".to_string();
        }

        let noun = if self.total == 1 { "download" } else { "downloads" };
        let mut parts = vec![format!("{} {}", self.total, noun)];
        if self.running > 0 {
            parts.push(format!("{} active", self.running));
        }
        if self.completed > 0 {
            parts.push(format!("{} completed", self.completed));
        }
        if self.failed > 0 {
            parts.push(format!("{} failed", self.failed));
        }
        parts.join(" • ")
    }
}

/// Owns the job collection and the admission gate; every job runs on its own task
#[derive(Clone)]
pub struct DownloadManager {
    queue: JobQueue,
    runner: Arc<JobRunner>,

    // Swapped wholesale on a limit change; permits already held stay with the old gate
    gate: Arc<watch::Sender<Gate>>,

    active_runs: Arc<RwLock<HashMap<JobId, JoinHandle<()>>>>,
}

impl Default for DownloadManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadManager {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_CONCURRENT, ToolSettings::default())
    }

    pub fn with_config(max_concurrent: usize, tool: ToolSettings) -> Self {
        Self::with_resolver(max_concurrent, tool, Arc::new(PresetResolver))
    }

    /// Create with a custom argument policy
    pub fn with_resolver(
        max_concurrent: usize,
        tool: ToolSettings,
        resolver: Arc<dyn FormatResolver>,
    ) -> Self {
        let (gate, gate_rx) = watch::channel(Gate::new(max_concurrent));

        Self {
            queue: JobQueue::new(),
            runner: Arc::new(JobRunner::new(tool, resolver, gate_rx)),
            gate: Arc::new(gate),
            active_runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::with_config(config.download.max_concurrent, config.tool.to_settings())
    }

    // ========== Job Operations ==========

    /// Record a new job and start its run. Never blocks on admission.
    /// A malformed request is failed on the spot and never runs.
    pub async fn enqueue(&self, request: JobRequest, observer: Option<JobObserver>) -> JobId {
        let entry = Arc::new(JobEntry::new(request, observer));
        let id = entry.id();
        let control = entry.control().await;

        self.queue.add(entry.clone()).await;
        tracing::info!(job_id = %id, "Job queued");

        // Report the initial Queued state before the run can change it
        entry.update(|job| job.log_info("Queued".to_string())).await;
        self.spawn_run(entry, control).await;
        id
    }

    async fn spawn_run(&self, entry: Arc<JobEntry>, control: RunControl) {
        let id = entry.id();
        let request = entry.snapshot().await.request;
        if let Err(e) = runner::validate_request(&request) {
            self.runner.reject(&entry, e).await;
            return;
        }

        let runner = self.runner.clone();
        let handle = tokio::spawn(async move {
            runner.run(entry, control).await;
        });
        // A finished handle from an earlier attempt is simply dropped
        self.active_runs.write().await.insert(id, handle);
    }

    /// Request cancellation. No-op for unknown ids and finished jobs.
    pub async fn cancel(&self, id: JobId) {
        self.request_stop(id, StopReason::Cancel).await;
    }

    /// Stop the run and leave the job resumable. No-op unless Queued or Running.
    pub async fn pause(&self, id: JobId) {
        self.request_stop(id, StopReason::Pause).await;
    }

    async fn request_stop(&self, id: JobId, reason: StopReason) -> bool {
        let Some(entry) = self.queue.get_by_id(id).await else {
            tracing::debug!(job_id = %id, "Stop requested for unknown job");
            return false;
        };

        let job = entry.snapshot().await;
        if job.status.is_finished() {
            return false;
        }

        let requested = entry.control().await.request_stop(reason);
        if requested {
            tracing::info!(job_id = %id, "Stop requested ({:?})", reason);
        }
        requested
    }

    /// Re-queue a Paused, Failed or Canceled job under the same id.
    /// Returns false for unknown ids and other states.
    pub async fn retry(&self, id: JobId) -> bool {
        let Some(entry) = self.queue.get_by_id(id).await else {
            return false;
        };
        let Some(control) = entry.requeue().await else {
            return false;
        };

        tracing::info!(job_id = %id, "Job re-queued");
        self.spawn_run(entry, control).await;
        true
    }

    /// Cancel if still active, then drop the record
    pub async fn remove(&self, id: JobId) -> Option<DownloadJob> {
        self.cancel(id).await;
        self.active_runs.write().await.remove(&id);
        let entry = self.queue.remove(id).await?;
        Some(entry.snapshot().await)
    }

    // ========== Bulk Operations ==========

    /// Pause every queued or running job. Returns the number paused.
    pub async fn pause_all(&self) -> usize {
        let mut paused = 0;
        for entry in self.queue.get_all().await {
            if self.request_stop(entry.id(), StopReason::Pause).await {
                paused += 1;
            }
        }
        paused
    }

    /// Retry every paused or failed job. Returns the number resumed.
    pub async fn resume_all(&self) -> usize {
        let mut resumed = 0;
        for entry in self.queue.get_all().await {
            let status = entry.snapshot().await.status;
            if matches!(status, JobStatus::Paused | JobStatus::Failed) && self.retry(entry.id()).await {
                resumed += 1;
            }
        }
        resumed
    }

    /// Drop completed, failed and canceled records. Returns the number removed.
    pub async fn clear_finished(&self) -> usize {
        let mut cleared = 0;
        for entry in self.queue.get_all().await {
            if entry.snapshot().await.status.is_terminal() {
                self.queue.remove(entry.id()).await;
                self.active_runs.write().await.remove(&entry.id());
                cleared += 1;
            }
        }
        if cleared > 0 {
            tracing::info!("Cleared {} finished jobs", cleared);
        }
        cleared
    }

    /// Wait until no run is in flight
    pub async fn wait_idle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut runs = self.active_runs.write().await;
                runs.drain().map(|(_, handle)| handle).collect()
            };
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!("Job task ended abnormally: {}", e);
                }
            }
        }
    }

    // ========== Concurrency ==========

    /// Install a new admission gate. Running jobs keep their slots; jobs still
    /// waiting move to the new gate.
    pub fn set_concurrency_limit(&self, limit: usize) {
        let next = Gate::new(limit);
        let limit = next.limit;
        let previous = self.gate.send_replace(next).limit;
        tracing::info!("Concurrency limit changed: {} -> {}", previous, limit);
    }

    pub fn concurrency_limit(&self) -> usize {
        self.gate.borrow().limit
    }

    // ========== Queries ==========

    /// Snapshots in creation order
    pub async fn list(&self) -> Vec<DownloadJob> {
        let mut jobs = Vec::new();
        for entry in self.queue.get_all().await {
            jobs.push(entry.snapshot().await);
        }
        jobs
    }

    pub async fn get(&self, id: JobId) -> Option<DownloadJob> {
        let entry = self.queue.get_by_id(id).await?;
        Some(entry.snapshot().await)
    }

    pub async fn len(&self) -> usize {
        self.queue.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.is_empty().await
    }

    pub async fn summary(&self) -> QueueSummary {
        QueueSummary::from_jobs(&self.list().await)
    }

    /// True while any job is Queued or Running
    pub async fn has_unfinished(&self) -> bool {
        self.list().await.iter().any(|job| !job.status.is_finished())
    }

    /// Check the configured downloader and return its version
    pub async fn probe_tool(&self) -> JobResult<String> {
        runner::tool_version(self.runner.tool()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn job(status: JobStatus) -> DownloadJob {
        let mut job = DownloadJob::new(JobRequest::new("https://example.com/v", "Best", "/tmp"));
        job.status = status;
        job
    }

    #[test]
    fn test_summary_line() {
        assert_eq!(QueueSummary::default().status_line(), "No downloads in queue");

        let jobs = vec![
            job(JobStatus::Running),
            job(JobStatus::Completed),
            job(JobStatus::Failed),
        ];
        let summary = QueueSummary::from_jobs(&jobs);
        assert_eq!(summary.status_line(), "3 downloads • 1 active • 1 completed • 1 failed");

        let single = QueueSummary::from_jobs(&[job(JobStatus::Queued)]);
        assert_eq!(single.queued, 1);
        assert_eq!(single.status_line(), "1 download");
    }

    #[tokio::test]
    async fn test_concurrency_limit_is_clamped() {
        let manager = DownloadManager::with_config(0, ToolSettings::default());
        assert_eq!(manager.concurrency_limit(), 1);

        manager.set_concurrency_limit(5);
        assert_eq!(manager.concurrency_limit(), 5);
        manager.set_concurrency_limit(0);
        assert_eq!(manager.concurrency_limit(), 1);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_noops() {
        let manager = DownloadManager::new();
        let id = uuid::Uuid::new_v4();

        manager.cancel(id).await;
        manager.pause(id).await;
        assert!(!manager.retry(id).await);
        assert!(manager.remove(id).await.is_none());
        assert!(manager.get(id).await.is_none());
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_spawning() {
        let manager = DownloadManager::with_config(1, ToolSettings::new("/definitely/not/here"));
        let id = manager
            .enqueue(JobRequest::new("not a url", "Best", "/tmp"), None)
            .await;

        // Failed by the time enqueue returns, with no run started
        let job = manager.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.started_at.is_none());
        assert!(job.error_message.unwrap().contains("not a valid URL"));
        assert!(manager.active_runs.read().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_limit_changes_agree_with_installed_gate() {
        let manager = DownloadManager::with_config(1, ToolSettings::default());
        let mut tasks = Vec::new();
        for limit in 1..=16 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move { manager.set_concurrency_limit(limit) }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let installed = manager.gate.borrow().slots.available_permits();
        assert_eq!(manager.concurrency_limit(), installed);
    }

    #[tokio::test]
    async fn test_missing_tool_fails_with_actionable_message() {
        let temp = tempfile::tempdir().unwrap();
        let manager = DownloadManager::with_config(1, ToolSettings::new("/definitely/not/here"));
        let id = manager
            .enqueue(JobRequest::new("https://example.com/v", "Best", temp.path()), None)
            .await;
        manager.wait_idle().await;

        let job = manager.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().contains("not found"));
        assert!(manager.probe_tool().await.is_err());
    }

    #[tokio::test]
    async fn test_clear_finished_removes_failed() {
        let manager = DownloadManager::with_config(1, ToolSettings::new("/definitely/not/here"));
        let failed = manager
            .enqueue(JobRequest::new("bad", "Best", "/tmp"), None)
            .await;
        manager.wait_idle().await;

        assert_eq!(manager.clear_finished().await, 1);
        assert!(manager.get(failed).await.is_none());
        assert_eq!(manager.summary().await.total, 0);
    }
}
